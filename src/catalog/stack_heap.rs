//! Stack-to-heap relocation: the `stack-to-heap` pass.
//!
//! Every eligible array declaration is renamed to a `MUT_` shadow. A relocated
//! array is re-declared under its own name as a heap copy of the shadow;
//! otherwise a `#define` forwards the name to the shadow. The file defining
//! `main` gets every helper macro and the free flag array; any other file
//! that relocates gets `<stdlib.h>` and the helpers it calls.

use crate::catalog::{in_main_file, inserted_anywhere, not_in_main, FILE_START};
use crate::catalog::logging::{declared_name, declared_type};
use crate::catalog::probe::{flag_array, marker};
use crate::config::StackToHeapSection;
use crate::counters::Category;
use crate::pipeline::Pass;
use crate::rule::{Computation, EvalContext, EvalError, Literal, Match, Rule};
use crate::unit::symbols::storage_classes;
use crate::unit::syntax::{ancestors, identifiers_in, named_children};
use crate::unit::{CType, ParsedUnit};
use tree_sitter::Node;
use xxhash_rust::xxh3::xxh3_64_with_seed;

pub const NAME: &str = "stack-to-heap";

const MAX_RANK: usize = 3;

pub const INIT_ARR_1: &str = concat!(
    "#define init_arr_1(arr1, arr2, arr_type) ",
    "  arr_type * arr1 = (arr_type*)malloc(sizeof(arr_type)*(sizeof(arr2) / sizeof(arr2[0])));",
    "  for(int i=0; i<(sizeof(arr2) / sizeof(arr2[0])); i++){ ",
    "    arr1[i] = arr2[i]; ",
    "  } ",
);

pub const INIT_ARR_2: &str = concat!(
    "#define init_arr_2(arr1, arr2, arr_type) ",
    "  arr_type** arr1 = (arr_type**)malloc(sizeof(arr_type*)*(sizeof(arr2) / sizeof(arr2[0])));",
    "  for(int i=0; i<(sizeof(arr2) / sizeof(arr2[0])); i++){ ",
    "    arr1[i] = (arr_type*)malloc(sizeof(arr_type)*(sizeof(arr2[0]) / sizeof(arr2[0][0]))); ",
    "    for(int j=0; j<(sizeof(arr2[0]) / sizeof(arr2[0][0])); j++) ",
    "      arr1[i][j] = arr2[i][j]; ",
    "  } ",
);

pub const INIT_ARR_3: &str = concat!(
    "#define init_arr_3(arr1, arr2, arr_type) ",
    "  arr_type*** arr1 = (arr_type***)malloc(sizeof(arr_type**)*(sizeof(arr2) / sizeof(arr2[0])));",
    "  for(int i=0; i<(sizeof(arr2) / sizeof(arr2[0])); i++){ ",
    "    arr1[i] = (arr_type**)malloc(sizeof(arr_type*)*(sizeof(arr2[0]) / sizeof(arr2[0][0]))); ",
    "    for(int j=0; j<(sizeof(arr2[0]) / sizeof(arr2[0][0])); j++){ ",
    "      arr1[i][j] = (arr_type*)malloc(sizeof(arr_type)*(sizeof(arr2[0][0]) / sizeof(arr2[0][0][0]))); ",
    "      for(int k=0; k<(sizeof(arr2[0][0]) / sizeof(arr2[0][0][0])); k++) ",
    "        arr1[i][j][k] = arr2[i][j][k]; ",
    "    } ",
    "  } ",
);

pub const INIT_ARR_1_UNINIT: &str = concat!(
    "#define init_arr_1_uninit(arr1, arr2, arr_type) ",
    "  arr_type * arr1 = (arr_type*)malloc(sizeof(arr_type)*(sizeof(arr2) / sizeof(arr2[0])));",
    "  ",
);

pub const INIT_ARR_2_UNINIT: &str = concat!(
    "#define init_arr_2_uninit(arr1, arr2, arr_type) ",
    "  arr_type** arr1 = (arr_type**)malloc(sizeof(arr_type*)*(sizeof(arr2) / sizeof(arr2[0])));",
    "  for(int i=0; i<(sizeof(arr2) / sizeof(arr2[0])); i++){ ",
    "    arr1[i] = (arr_type*)malloc(sizeof(arr_type)*(sizeof(arr2[0]) / sizeof(arr2[0][0]))); ",
    "  } ",
);

pub const INIT_ARR_3_UNINIT: &str = concat!(
    "#define init_arr_3_uninit(arr1, arr2, arr_type) ",
    "  arr_type*** arr1 = (arr_type***)malloc(sizeof(arr_type**)*(sizeof(arr2) / sizeof(arr2[0])));",
    "  for(int i=0; i<(sizeof(arr2) / sizeof(arr2[0])); i++){ ",
    "    arr1[i] = (arr_type**)malloc(sizeof(arr_type*)*(sizeof(arr2[0]) / sizeof(arr2[0][0]))); ",
    "    for(int j=0; j<(sizeof(arr2[0]) / sizeof(arr2[0][0])); j++){ ",
    "      arr1[i][j] = (arr_type*)malloc(sizeof(arr_type)*(sizeof(arr2[0][0]) / sizeof(arr2[0][0][0]))); ",
    "    } ",
    "  } ",
);

// Sizes come from the shadow: the relocated name is a pointer by then.
pub const FREE_1: &str = concat!("#define free_1(arr, arr2) ", "  free(arr);");

pub const FREE_2: &str = concat!(
    "#define free_2(arr, arr2) ",
    "  for(int i=0; i<(sizeof(arr2) / sizeof(arr2[0])); i++){ ",
    "    free(arr[i]); ",
    "  } ",
    "  free(arr);",
);

pub const FREE_3: &str = concat!(
    "#define free_3(arr, arr2) ",
    "  for(int i=0; i<(sizeof(arr2) / sizeof(arr2[0])); i++){ ",
    "    for(int j=0; j<(sizeof(arr2[0]) / sizeof(arr2[0][0])); j++){ ",
    "      free(arr[i][j]); ",
    "    } ",
    "    free(arr[i]); ",
    "  } ",
    "  free(arr);",
);

/// Helper macros in block order, each with the call that needs it.
const HELPERS: [(&str, &str); 9] = [
    ("\ninit_arr_1(", INIT_ARR_1),
    ("\ninit_arr_2(", INIT_ARR_2),
    ("\ninit_arr_3(", INIT_ARR_3),
    ("\ninit_arr_1_uninit(", INIT_ARR_1_UNINIT),
    ("\ninit_arr_2_uninit(", INIT_ARR_2_UNINIT),
    ("\ninit_arr_3_uninit(", INIT_ARR_3_UNINIT),
    ("\nfree_1(", FREE_1),
    ("\nfree_2(", FREE_2),
    ("\nfree_3(", FREE_3),
];

const STDLIB: &str = "#include<stdlib.h>\n";

pub fn pass(config: &StackToHeapSection) -> Pass {
    let coin = Coin {
        probability: config.probability,
        seed: config.seed,
    };
    let mut pass = Pass::new(NAME).with(relocation(coin));
    if config.free_on_return {
        pass = pass.with(free_on_return(coin));
    }
    pass.with(helper_block()).anchors_statements()
}

fn relocation(coin: Coin) -> Rule {
    Rule::new("heap-relocate", "(declaration declarator: (_) @root)")
        .bind("decl", declaration)
        .bind("name", declarator_name)
        .filter(in_main_file)
        .filter(not_in_main)
        .filter(eligible)
        .insert_before("name", Literal("MUT_"))
        .insert_after("decl", Relocate { coin })
}

fn free_on_return(coin: Coin) -> Rule {
    Rule::new("heap-free", "(return_statement) @root")
        .filter(in_main_file)
        .filter(not_in_main)
        .insert_before("root", FreeBeforeReturn { coin })
}

fn helper_block() -> Rule {
    Rule::new("heap-helpers", FILE_START)
        .at_start_of_file(HelperMacros)
        .late()
}

fn declaration<'t>(m: &Match<'t>, _unit: &'t ParsedUnit) -> Option<Node<'t>> {
    m.root().parent()
}

fn declarator_name<'t>(m: &Match<'t>, unit: &'t ParsedUnit) -> Option<Node<'t>> {
    let decl = m.root().parent()?;
    unit.declarators(decl)
        .into_iter()
        .find(|d| d.node.id() == m.root().id())
        .map(|d| d.name)
}

fn eligible(m: &Match<'_>, unit: &ParsedUnit) -> bool {
    eligible_declarator(unit, m.root())
}

/// Automatic or static-local array of at most three dimensions, declared
/// directly in a block, with a non-const element type.
fn eligible_declarator(unit: &ParsedUnit, node: Node<'_>) -> bool {
    let Some(decl) = node.parent() else {
        return false;
    };
    if !matches!(decl.parent(), Some(p) if p.kind() == "compound_statement") {
        return false;
    }
    if storage_classes(decl, unit.source()).contains(&"extern") {
        return false;
    }
    declared_type(unit, node).is_some_and(|ty| {
        ty.is_array() && ty.array_rank() <= MAX_RANK && !ty.mentions_const()
    })
}

/// Deterministic per-declarator draw against the configured probability.
#[derive(Debug, Clone, Copy)]
struct Coin {
    probability: u32,
    seed: u64,
}

impl Coin {
    fn relocates(&self, name: &str, offset: usize) -> bool {
        let draw = xxh3_64_with_seed(format!("{name}@{offset}").as_bytes(), self.seed) % 100;
        draw < u64::from(self.probability)
    }
}

/// Whether the array declared by `node` is moved to the heap.
fn relocated(unit: &ParsedUnit, coin: Coin, node: Node<'_>, ty: &CType) -> bool {
    let Some(name) = declared_name(unit, node) else {
        return false;
    };
    let element = ty.element().map(CType::render).unwrap_or_default();
    if element.contains("struct") || element.contains("union") {
        return false;
    }
    coin.relocates(name, node.start_byte())
}

struct Relocate {
    coin: Coin,
}

impl Computation for Relocate {
    fn eval(&self, m: &Match<'_>, cx: &mut EvalContext<'_>) -> Result<Option<String>, EvalError> {
        let unit = cx.unit;
        let root = m.root();
        let (Some(ty), Some(name)) = (declared_type(unit, root), declared_name(unit, root)) else {
            return Ok(None);
        };
        if !relocated(unit, self.coin, root, &ty) {
            return Ok(Some(format!("\n#define {name} MUT_{name}\n")));
        }

        let element = ty.element().map(CType::render).unwrap_or_default();
        let rank = ty.array_rank();
        let uninit = if root.kind() == "init_declarator" { "" } else { "_uninit" };
        let base = ty.innermost_element().unqualified().render();
        let id = cx.counters.next(Category::Heap);
        Ok(Some(format!(
            "\n{}\ninit_arr_{rank}{uninit}({name}, MUT_{name}, {base})",
            marker(Some(id), "VARDECLHEAP", &[&element, name, &rank.to_string()])
        )))
    }
}

struct FreeBeforeReturn {
    coin: Coin,
}

impl FreeBeforeReturn {
    /// Relocated arrays in scope at `ret`, in declaration order.
    fn live_arrays<'t>(&self, unit: &'t ParsedUnit, ret: Node<'t>) -> Vec<(Node<'t>, CType)> {
        let mut found = Vec::new();
        for block in ancestors(ret).filter(|a| a.kind() == "compound_statement") {
            for stmt in named_children(block) {
                if stmt.start_byte() >= ret.start_byte() {
                    break;
                }
                if stmt.kind() != "declaration" {
                    continue;
                }
                for d in unit.declarators(stmt) {
                    if eligible_declarator(unit, d.node) && relocated(unit, self.coin, d.node, &d.ty) {
                        found.push((d.node, d.ty));
                    }
                }
            }
        }
        found.sort_by_key(|(node, _)| node.start_byte());
        found
    }
}

impl Computation for FreeBeforeReturn {
    fn eval(&self, m: &Match<'_>, cx: &mut EvalContext<'_>) -> Result<Option<String>, EvalError> {
        let unit = cx.unit;
        let ret = m.root();
        let returned: Vec<&str> = named_children(ret)
            .into_iter()
            .flat_map(identifiers_in)
            .map(|ident| unit.text(ident))
            .collect();

        let mut out = String::new();
        for (node, ty) in self.live_arrays(unit, ret) {
            let Some(name) = declared_name(unit, node) else {
                continue;
            };
            if returned.contains(&name) {
                continue;
            }
            let element = ty.element().map(CType::render).unwrap_or_default();
            let id = cx.counters.next(Category::Free);
            out.push_str(&format!(
                "{}\nfree_{}({name}, MUT_{name});\n",
                marker(Some(id), "VARREF_FREE", &[&element, name]),
                ty.array_rank()
            ));
        }
        Ok((!out.is_empty()).then_some(out))
    }
}

struct HelperMacros;

impl Computation for HelperMacros {
    fn eval(&self, _m: &Match<'_>, cx: &mut EvalContext<'_>) -> Result<Option<String>, EvalError> {
        let main = cx.unit.defines_main();
        let mut block = String::new();
        for (call, helper) in HELPERS {
            if main || inserted_anywhere(cx.accepted, call) {
                block.push_str(helper);
                block.push('\n');
            }
        }
        if main {
            block.push_str(&flag_array(Category::Free, cx.counters.count(Category::Free)));
        } else if block.is_empty() {
            return Ok(None);
        }
        block.insert_str(0, STDLIB);
        Ok(Some(block))
    }
}
