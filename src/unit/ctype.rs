//! C types as the instrumentation passes see them.
//!
//! Types are rendered the way clang prints them (`int *`, `int [3]`,
//! `int (*)[4]`, `unsigned long`), since those strings end up in markers the
//! runtime parses.

use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Qualifiers {
    pub is_const: bool,
    pub is_volatile: bool,
}

impl Qualifiers {
    pub const NONE: Qualifiers = Qualifiers {
        is_const: false,
        is_volatile: false,
    };

    fn prefix(&self) -> String {
        let mut out = String::new();
        if self.is_const {
            out.push_str("const ");
        }
        if self.is_volatile {
            out.push_str("volatile ");
        }
        out
    }

    fn suffix(&self) -> String {
        let mut out = String::new();
        if self.is_const {
            out.push_str("const");
        }
        if self.is_volatile {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str("volatile");
        }
        out
    }

    fn merge(self, other: Qualifiers) -> Qualifiers {
        Qualifiers {
            is_const: self.is_const || other.is_const,
            is_volatile: self.is_volatile || other.is_volatile,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CType {
    /// Builtin, typedef, struct/union/enum: `int`, `uint8_t`, `struct S`
    Named { name: String, qualifiers: Qualifiers },
    Pointer {
        pointee: Box<CType>,
        qualifiers: Qualifiers,
    },
    /// `size` is the bracket text; `None` for `[]`
    Array {
        element: Box<CType>,
        size: Option<String>,
    },
    Function { ret: Box<CType>, params: Vec<CType> },
}

impl CType {
    pub fn named(name: impl Into<String>) -> Self {
        CType::Named {
            name: name.into(),
            qualifiers: Qualifiers::NONE,
        }
    }

    pub fn int() -> Self {
        CType::named("int")
    }

    pub fn pointer_to(pointee: CType) -> Self {
        CType::Pointer {
            pointee: Box::new(pointee),
            qualifiers: Qualifiers::NONE,
        }
    }

    pub fn array_of(element: CType, size: Option<String>) -> Self {
        CType::Array {
            element: Box::new(element),
            size,
        }
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, CType::Pointer { .. })
    }

    pub fn is_array(&self) -> bool {
        matches!(self, CType::Array { .. })
    }

    pub fn is_function(&self) -> bool {
        matches!(self, CType::Function { .. })
    }

    pub fn is_pointer_like(&self) -> bool {
        self.is_pointer() || self.is_array()
    }

    /// Name of a named type, `None` for derived types.
    pub fn name(&self) -> Option<&str> {
        match self {
            CType::Named { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Pointee of a pointer or element of an array.
    pub fn element(&self) -> Option<&CType> {
        match self {
            CType::Pointer { pointee, .. } => Some(pointee),
            CType::Array { element, .. } => Some(element),
            _ => None,
        }
    }

    /// Number of array dimensions.
    pub fn array_rank(&self) -> usize {
        match self {
            CType::Array { element, .. } => 1 + element.array_rank(),
            _ => 0,
        }
    }

    /// Element type once every array dimension is peeled off.
    pub fn innermost_element(&self) -> &CType {
        match self {
            CType::Array { element, .. } => element.innermost_element(),
            other => other,
        }
    }

    /// Array-to-pointer decay; function-to-pointer decay.
    pub fn decayed(&self) -> CType {
        match self {
            CType::Array { element, .. } => CType::pointer_to((**element).clone()),
            CType::Function { .. } => CType::pointer_to(self.clone()),
            other => other.clone(),
        }
    }

    pub fn qualifiers(&self) -> Qualifiers {
        match self {
            CType::Named { qualifiers, .. } | CType::Pointer { qualifiers, .. } => *qualifiers,
            CType::Array { element, .. } => element.qualifiers(),
            CType::Function { .. } => Qualifiers::NONE,
        }
    }

    /// Add qualifiers to the outermost level (arrays pass them to elements).
    pub fn qualified(self, extra: Qualifiers) -> CType {
        match self {
            CType::Named { name, qualifiers } => CType::Named {
                name,
                qualifiers: qualifiers.merge(extra),
            },
            CType::Pointer {
                pointee,
                qualifiers,
            } => CType::Pointer {
                pointee,
                qualifiers: qualifiers.merge(extra),
            },
            CType::Array { element, size } => CType::Array {
                element: Box::new(element.qualified(extra)),
                size,
            },
            f @ CType::Function { .. } => f,
        }
    }

    /// Outermost qualifiers removed.
    pub fn unqualified(&self) -> CType {
        match self {
            CType::Named { name, .. } => CType::named(name.clone()),
            CType::Pointer { pointee, .. } => CType::Pointer {
                pointee: pointee.clone(),
                qualifiers: Qualifiers::NONE,
            },
            CType::Array { element, size } => CType::Array {
                element: Box::new(element.unqualified()),
                size: size.clone(),
            },
            f @ CType::Function { .. } => f.clone(),
        }
    }

    /// Every `volatile` qualifier removed, at every level.
    pub fn without_volatile(&self) -> CType {
        match self {
            CType::Named { name, qualifiers } => CType::Named {
                name: name.clone(),
                qualifiers: Qualifiers {
                    is_volatile: false,
                    ..*qualifiers
                },
            },
            CType::Pointer {
                pointee,
                qualifiers,
            } => CType::Pointer {
                pointee: Box::new(pointee.without_volatile()),
                qualifiers: Qualifiers {
                    is_volatile: false,
                    ..*qualifiers
                },
            },
            CType::Array { element, size } => CType::Array {
                element: Box::new(element.without_volatile()),
                size: size.clone(),
            },
            CType::Function { ret, params } => CType::Function {
                ret: Box::new(ret.without_volatile()),
                params: params.iter().map(CType::without_volatile).collect(),
            },
        }
    }

    /// Whether `const` appears anywhere in the type.
    pub fn mentions_const(&self) -> bool {
        self.render().contains("const")
    }

    pub fn mentions_union(&self) -> bool {
        self.render().contains("union")
    }

    pub fn mentions_struct(&self) -> bool {
        self.render().contains("struct")
    }

    pub fn render(&self) -> String {
        compose(self, String::new())
    }
}

impl fmt::Display for CType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Build the declarator text inside-out around `inner`.
fn compose(ty: &CType, inner: String) -> String {
    match ty {
        CType::Named { name, qualifiers } => {
            let base = format!("{}{}", qualifiers.prefix(), name);
            if inner.is_empty() {
                base
            } else {
                format!("{base} {inner}")
            }
        }
        CType::Pointer {
            pointee,
            qualifiers,
        } => {
            let mut decl = String::from("*");
            decl.push_str(&qualifiers.suffix());
            if !inner.is_empty() && !qualifiers.suffix().is_empty() {
                decl.push(' ');
            }
            decl.push_str(&inner);
            if matches!(**pointee, CType::Array { .. } | CType::Function { .. }) {
                decl = format!("({decl})");
            }
            compose(pointee, decl)
        }
        CType::Array { element, size } => {
            let decl = format!("{inner}[{}]", size.as_deref().unwrap_or(""));
            compose(element, decl)
        }
        CType::Function { ret, params } => {
            let list = if params.is_empty() {
                "void".to_string()
            } else {
                params.iter().map(CType::render).collect::<Vec<_>>().join(", ")
            };
            compose(ret, format!("{inner}({list})"))
        }
    }
}

/// Integer conversion rank and signedness of a builtin integer type.
pub fn integer_rank(name: &str) -> Option<(u8, bool)> {
    let rank = match name {
        "_Bool" | "bool" => (1, false),
        "char" | "signed char" => (2, true),
        "unsigned char" => (2, false),
        "short" => (3, true),
        "unsigned short" => (3, false),
        "int" => (4, true),
        "unsigned int" => (4, false),
        "long" => (5, true),
        "unsigned long" => (5, false),
        "long long" => (6, true),
        "unsigned long long" => (6, false),
        _ => return None,
    };
    Some(rank)
}

/// Builtin type behind a fixed-width typedef (LP64).
pub fn stdint_builtin(name: &str) -> Option<&'static str> {
    let builtin = match name {
        "int8_t" => "signed char",
        "uint8_t" => "unsigned char",
        "int16_t" => "short",
        "uint16_t" => "unsigned short",
        "int32_t" => "int",
        "uint32_t" => "unsigned int",
        "int64_t" | "intptr_t" | "ptrdiff_t" | "ssize_t" => "long",
        "uint64_t" | "uintptr_t" | "size_t" => "unsigned long",
        _ => return None,
    };
    Some(builtin)
}

pub fn is_floating(name: &str) -> bool {
    matches!(name, "float" | "double" | "long double")
}

/// Canonical spelling of a `sized_type_specifier` (`unsigned` becomes
/// `unsigned int`, `long int` becomes `long`).
pub fn normalize_sized(modifiers: &[&str], base: Option<&str>) -> String {
    let unsigned = modifiers.contains(&"unsigned");
    let signed = modifiers.contains(&"signed");
    let longs = modifiers.iter().filter(|m| **m == "long").count();
    let short = modifiers.contains(&"short");

    let core = match (base, longs, short) {
        (Some("char"), _, _) => {
            return if unsigned {
                "unsigned char".to_string()
            } else if signed {
                "signed char".to_string()
            } else {
                "char".to_string()
            };
        }
        (Some("double"), l, _) if l > 0 => return "long double".to_string(),
        (Some(other), 0, false) if other != "int" => return other.to_string(),
        (_, 0, true) => "short",
        (_, 1, _) => "long",
        (_, l, _) if l >= 2 => "long long",
        _ => "int",
    };

    if unsigned {
        format!("unsigned {core}")
    } else {
        core.to_string()
    }
}
