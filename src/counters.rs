//! Category counters that hand out monotonically increasing marker IDs.
//!
//! The final value of a category is also the length of that category's
//! runtime flag array, so every ID handed out must be paired with exactly one
//! emitted marker.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Counter category. Each category owns an independent ID sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Brace,
    VarDecl,
    FuncEnter,
    Inst,
    Array,
    Ptr,
    Mem,
    Var,
    PtrIndex,
    Int,
    Init,
    MutArr,
    MutPtr,
    IntOpL,
    IntOpR,
    Heap,
    Free,
}

impl Category {
    pub const ALL: [Category; 17] = [
        Category::Brace,
        Category::VarDecl,
        Category::FuncEnter,
        Category::Inst,
        Category::Array,
        Category::Ptr,
        Category::Mem,
        Category::Var,
        Category::PtrIndex,
        Category::Int,
        Category::Init,
        Category::MutArr,
        Category::MutPtr,
        Category::IntOpL,
        Category::IntOpR,
        Category::Heap,
        Category::Free,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Brace => "brace",
            Category::VarDecl => "vardecl",
            Category::FuncEnter => "funcenter",
            Category::Inst => "inst",
            Category::Array => "array",
            Category::Ptr => "ptr",
            Category::Mem => "mem",
            Category::Var => "var",
            Category::PtrIndex => "ptrindex",
            Category::Int => "int",
            Category::Init => "init",
            Category::MutArr => "mutarr",
            Category::MutPtr => "mutptr",
            Category::IntOpL => "intopl",
            Category::IntOpR => "intopr",
            Category::Heap => "heap",
            Category::Free => "free",
        }
    }

    /// Categories whose probes are gated by a `print_flag_<name>` array.
    pub fn has_flag_array(&self) -> bool {
        matches!(
            self,
            Category::Inst
                | Category::Int
                | Category::Mem
                | Category::Var
                | Category::Ptr
                | Category::Free
        )
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Run-scoped counter set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Counters {
    values: BTreeMap<Category, u32>,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the next ID for `category` and advance it.
    pub fn next(&mut self, category: Category) -> u32 {
        let value = self.values.entry(category).or_insert(0);
        let id = *value;
        *value += 1;
        id
    }

    /// Number of IDs handed out so far for `category`.
    pub fn count(&self, category: Category) -> u32 {
        self.values.get(&category).copied().unwrap_or(0)
    }

    /// Snapshot used to roll back a failed match evaluation.
    pub fn snapshot(&self) -> Counters {
        self.clone()
    }

    pub fn restore(&mut self, snapshot: Counters) {
        *self = snapshot;
    }

    pub fn iter(&self) -> impl Iterator<Item = (Category, u32)> + '_ {
        self.values.iter().map(|(c, v)| (*c, *v))
    }
}
