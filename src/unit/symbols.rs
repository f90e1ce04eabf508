//! Lexical symbol table and expression typing.
//!
//! The grammar carries no types, so declarations are read back into
//! [`CType`]s: file-scope variables, functions, struct/union layouts and
//! typedefs are indexed once per file, while locals are found on demand by
//! walking outward from the use site. Anything the table cannot see (macros,
//! headers) has no type.

use crate::unit::ctype::{integer_rank, is_floating, normalize_sized, stdint_builtin, CType, Qualifiers};
use crate::unit::syntax::{ancestors, field_children, named_children, operator_of, text};
use std::collections::{HashMap, HashSet};
use std::ops::Range;
use tree_sitter::Node;

/// A single declarator of a declaration, with its resolved type.
#[derive(Debug, Clone)]
pub struct Declarator<'t> {
    pub name: Node<'t>,
    pub ty: CType,
    /// The `declarator` child itself (an `init_declarator` when initialized)
    pub node: Node<'t>,
    pub init: Option<Node<'t>>,
}

/// Where a name was bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    Local,
    Parameter,
    Global,
    Function,
    EnumConstant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub kind: BindingKind,
    pub ty: CType,
}

/// File-scope declarations of one translation unit.
#[derive(Debug, Clone, Default)]
pub struct TypeIndex {
    globals: HashMap<String, CType>,
    functions: HashMap<String, CType>,
    records: HashMap<String, Vec<(String, CType)>>,
    typedefs: HashMap<String, CType>,
    enum_constants: HashSet<String>,
    main: Option<Range<usize>>,
}

const MAX_TYPEDEF_DEPTH: usize = 16;

impl TypeIndex {
    pub fn build(root: Node<'_>, source: &str) -> Self {
        let mut index = TypeIndex::default();
        index.collect_records(root, source);
        index.collect_file_scope(root, source);
        index
    }

    /// Byte range of `main`'s definition, if this file defines it.
    pub fn main_range(&self) -> Option<Range<usize>> {
        self.main.clone()
    }

    pub fn global(&self, name: &str) -> Option<&CType> {
        self.globals.get(name)
    }

    pub fn function(&self, name: &str) -> Option<&CType> {
        self.functions.get(name)
    }

    pub fn fields(&self, record: &str) -> Option<&[(String, CType)]> {
        self.records.get(record).map(Vec::as_slice)
    }

    /// Expand typedef names until a non-typedef type is reached.
    pub fn resolve(&self, ty: &CType) -> CType {
        let mut current = ty.clone();
        for _ in 0..MAX_TYPEDEF_DEPTH {
            let CType::Named { name, qualifiers } = &current else {
                break;
            };
            if let Some(target) = self.typedefs.get(name) {
                current = target.clone().qualified(*qualifiers);
            } else if let Some(builtin) = stdint_builtin(name) {
                current = CType::named(builtin).qualified(*qualifiers);
            } else {
                break;
            }
        }
        current
    }

    fn collect_records(&mut self, root: Node<'_>, source: &str) {
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            match node.kind() {
                "struct_specifier" | "union_specifier" => {
                    if let Some(body) = node.child_by_field_name("body") {
                        let key = record_name(node, source);
                        let mut fields = Vec::new();
                        for field in named_children(body) {
                            if field.kind() != "field_declaration" {
                                continue;
                            }
                            let base = declared_base(field, source);
                            for d in field_children(field, "declarator") {
                                if let Some((name, ty)) = unwind(d, base.clone(), source) {
                                    fields.push((text(name, source).to_string(), ty));
                                }
                            }
                        }
                        self.records.insert(key, fields);
                    }
                }
                "enum_specifier" => {
                    if let Some(body) = node.child_by_field_name("body") {
                        for e in named_children(body) {
                            if let Some(name) = e.child_by_field_name("name") {
                                self.enum_constants.insert(text(name, source).to_string());
                            }
                        }
                    }
                }
                "type_definition" => {
                    let base = declared_base(node, source);
                    for d in field_children(node, "declarator") {
                        if let Some((name, ty)) = unwind(d, base.clone(), source) {
                            self.typedefs.insert(text(name, source).to_string(), ty);
                        }
                    }
                }
                _ => {}
            }
            stack.extend(named_children(node));
        }
    }

    fn collect_file_scope(&mut self, node: Node<'_>, source: &str) {
        for child in named_children(node) {
            match child.kind() {
                "function_definition" => {
                    let base = declared_base(child, source);
                    if let Some(d) = child.child_by_field_name("declarator") {
                        if let Some((name, ty)) = unwind(d, base, source) {
                            let name = text(name, source);
                            if name == "main" {
                                self.main = Some(child.byte_range());
                            }
                            self.functions.insert(name.to_string(), ty);
                        }
                    }
                }
                "declaration" => {
                    for d in declarators(child, source) {
                        let name = text(d.name, source).to_string();
                        if d.ty.is_function() {
                            self.functions.insert(name, d.ty);
                        } else {
                            self.globals.insert(name, d.ty);
                        }
                    }
                }
                kind if kind.starts_with("preproc_if") || kind == "preproc_else" || kind == "linkage_specification" || kind == "declaration_list" => {
                    self.collect_file_scope(child, source);
                }
                _ => {}
            }
        }
    }

    /// Resolve `name` as seen from `at`.
    pub fn lookup(&self, name: &str, at: Node<'_>, source: &str) -> Option<Binding> {
        let mut previous = at;
        for scope in ancestors(at) {
            match scope.kind() {
                "compound_statement" | "case_statement" => {
                    let mut found = None;
                    for stmt in named_children(scope) {
                        if stmt.start_byte() >= previous.start_byte() {
                            break;
                        }
                        if stmt.kind() == "declaration" {
                            for d in declarators(stmt, source) {
                                if text(d.name, source) == name {
                                    found = Some(d.ty);
                                }
                            }
                        }
                    }
                    if let Some(ty) = found {
                        return Some(Binding {
                            kind: BindingKind::Local,
                            ty,
                        });
                    }
                }
                "for_statement" => {
                    if let Some(init) = scope.child_by_field_name("initializer") {
                        if init.kind() == "declaration" && init.id() != previous.id() {
                            for d in declarators(init, source) {
                                if text(d.name, source) == name {
                                    return Some(Binding {
                                        kind: BindingKind::Local,
                                        ty: d.ty,
                                    });
                                }
                            }
                        }
                    }
                }
                "function_definition" => {
                    if let Some(ty) = parameter_type(scope, name, source) {
                        return Some(Binding {
                            kind: BindingKind::Parameter,
                            ty,
                        });
                    }
                }
                _ => {}
            }
            previous = scope;
        }

        if let Some(ty) = self.globals.get(name) {
            return Some(Binding {
                kind: BindingKind::Global,
                ty: ty.clone(),
            });
        }
        if let Some(ty) = self.functions.get(name) {
            return Some(Binding {
                kind: BindingKind::Function,
                ty: ty.clone(),
            });
        }
        if self.enum_constants.contains(name) {
            return Some(Binding {
                kind: BindingKind::EnumConstant,
                ty: CType::int(),
            });
        }
        None
    }

    /// Static type of an expression, or `None` when it cannot be known.
    pub fn type_of(&self, expr: Node<'_>, source: &str) -> Option<CType> {
        match expr.kind() {
            "identifier" => self.lookup(text(expr, source), expr, source).map(|b| b.ty),
            "number_literal" => Some(number_type(text(expr, source))),
            "char_literal" | "true" | "false" => Some(CType::int()),
            "null" => Some(CType::pointer_to(CType::named("void"))),
            "string_literal" | "concatenated_string" => {
                let len = string_length(text(expr, source));
                Some(CType::array_of(CType::named("char"), Some(len.to_string())))
            }
            "parenthesized_expression" => {
                let inner = named_children(expr).into_iter().next()?;
                self.type_of(inner, source)
            }
            "subscript_expression" => {
                let base = self.type_of(expr.child_by_field_name("argument")?, source)?;
                let base = self.resolve(&base);
                base.element().cloned()
            }
            "pointer_expression" => {
                let arg = self.type_of(expr.child_by_field_name("argument")?, source)?;
                match operator_of(expr, source)? {
                    "&" => Some(CType::pointer_to(arg)),
                    _ => {
                        let arg = self.resolve(&arg);
                        match arg {
                            CType::Function { .. } => Some(arg),
                            other => other.element().cloned(),
                        }
                    }
                }
            }
            "field_expression" => self.field_type(expr, source),
            "call_expression" => {
                let callee = self.type_of(expr.child_by_field_name("function")?, source)?;
                let callee = self.resolve(&callee);
                let callee = match callee {
                    CType::Pointer { pointee, .. } => self.resolve(&pointee),
                    other => other,
                };
                match callee {
                    CType::Function { ret, .. } => Some(*ret),
                    _ => None,
                }
            }
            "cast_expression" | "compound_literal_expression" => {
                descriptor_type(expr.child_by_field_name("type")?, source)
            }
            "assignment_expression" => self.type_of(expr.child_by_field_name("left")?, source),
            "update_expression" => self.type_of(expr.child_by_field_name("argument")?, source),
            "unary_expression" => {
                let op = operator_of(expr, source)?;
                if op == "!" {
                    return Some(CType::int());
                }
                let arg = self.type_of(expr.child_by_field_name("argument")?, source)?;
                self.promoted(&arg)
            }
            "binary_expression" => self.binary_type(expr, source),
            "conditional_expression" => {
                let branch = expr
                    .child_by_field_name("consequence")
                    .or_else(|| expr.child_by_field_name("alternative"))?;
                self.type_of(branch, source)
            }
            "comma_expression" => self.type_of(expr.child_by_field_name("right")?, source),
            "sizeof_expression" | "alignof_expression" => Some(CType::named("unsigned long")),
            _ => None,
        }
    }

    fn field_type(&self, expr: Node<'_>, source: &str) -> Option<CType> {
        let base = self.type_of(expr.child_by_field_name("argument")?, source)?;
        let base = self.resolve(&base);
        let record = if is_arrow(expr, source) {
            self.resolve(base.element()?)
        } else {
            base
        };
        let record = record.name()?.to_string();
        let field = text(expr.child_by_field_name("field")?, source);
        self.records
            .get(&record)?
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, ty)| ty.clone())
    }

    fn binary_type(&self, expr: Node<'_>, source: &str) -> Option<CType> {
        let op = operator_of(expr, source)?;
        if matches!(op, "==" | "!=" | "<" | ">" | "<=" | ">=" | "&&" | "||") {
            return Some(CType::int());
        }

        let left = self.type_of(expr.child_by_field_name("left")?, source)?;
        let right = self.type_of(expr.child_by_field_name("right")?, source)?;

        if matches!(op, "<<" | ">>") {
            return self.promoted(&left);
        }

        let l = self.resolve(&left).decayed();
        let r = self.resolve(&right).decayed();
        if matches!(op, "+" | "-") {
            match (l.is_pointer(), r.is_pointer()) {
                (true, true) if op == "-" => return Some(CType::named("long")),
                (true, false) => return Some(l),
                (false, true) if op == "+" => return Some(r),
                _ => {}
            }
        }

        self.arithmetic(&l, &r)
    }

    /// Integer promotion of an arithmetic type.
    pub fn promoted(&self, ty: &CType) -> Option<CType> {
        let resolved = self.resolve(ty).unqualified();
        let name = resolved.name()?;
        if is_floating(name) {
            return Some(resolved);
        }
        if name.starts_with("enum ") {
            return Some(CType::int());
        }
        let (rank, _) = integer_rank(name)?;
        if rank < 4 {
            Some(CType::int())
        } else {
            Some(resolved)
        }
    }

    /// Usual arithmetic conversions (LP64).
    fn arithmetic(&self, left: &CType, right: &CType) -> Option<CType> {
        let l = self.promoted(left)?;
        let r = self.promoted(right)?;
        let (ln, rn) = (l.name()?, r.name()?);

        for float in ["long double", "double", "float"] {
            if ln == float || rn == float {
                return Some(CType::named(float));
            }
        }

        let (lrank, lsigned) = integer_rank(ln)?;
        let (rrank, rsigned) = integer_rank(rn)?;
        if lsigned == rsigned {
            return Some(if lrank >= rrank { l } else { r });
        }

        let (srank, sty, urank, uty) = if lsigned {
            (lrank, ln, rrank, rn)
        } else {
            (rrank, rn, lrank, ln)
        };
        if urank >= srank {
            return Some(CType::named(uty));
        }
        if byte_size(srank) > byte_size(urank) {
            return Some(CType::named(sty));
        }
        Some(CType::named(format!("unsigned {sty}")))
    }
}

fn byte_size(rank: u8) -> u8 {
    match rank {
        1 | 2 => 1,
        3 => 2,
        4 => 4,
        _ => 8,
    }
}

fn is_arrow(expr: Node<'_>, source: &str) -> bool {
    if let Some(op) = expr.child_by_field_name("operator") {
        return text(op, source) == "->";
    }
    let mut cursor = expr.walk();
    let found = expr.children(&mut cursor).any(|c| c.kind() == "->");
    found
}

/// `struct S`, `union U`, or a position-keyed name for anonymous records.
fn record_name(node: Node<'_>, source: &str) -> String {
    let keyword = if node.kind() == "union_specifier" {
        "union"
    } else {
        "struct"
    };
    match node.child_by_field_name("name") {
        Some(name) => format!("{keyword} {}", text(name, source)),
        None => format!("{keyword} (anonymous at byte {})", node.start_byte()),
    }
}

/// Base type of a declaration-like node, with its qualifiers applied.
fn declared_base(node: Node<'_>, source: &str) -> CType {
    let base = match node.child_by_field_name("type") {
        Some(ty) => specifier_type(ty, source),
        None => CType::int(),
    };
    base.qualified(qualifiers_of(node, source))
}

fn qualifiers_of(node: Node<'_>, source: &str) -> Qualifiers {
    let mut q = Qualifiers::NONE;
    for child in named_children(node) {
        if child.kind() == "type_qualifier" {
            match text(child, source) {
                "const" => q.is_const = true,
                "volatile" => q.is_volatile = true,
                _ => {}
            }
        }
    }
    q
}

fn specifier_type(ty: Node<'_>, source: &str) -> CType {
    match ty.kind() {
        "sized_type_specifier" => {
            let base = ty.child_by_field_name("type").map(|t| text(t, source));
            let mut cursor = ty.walk();
            let modifiers: Vec<&str> = ty
                .children(&mut cursor)
                .filter(|c| matches!(c.kind(), "signed" | "unsigned" | "long" | "short"))
                .map(|c| text(c, source))
                .collect();
            CType::named(normalize_sized(&modifiers, base))
        }
        "struct_specifier" | "union_specifier" => CType::named(record_name(ty, source)),
        "enum_specifier" => match ty.child_by_field_name("name") {
            Some(name) => CType::named(format!("enum {}", text(name, source))),
            None => CType::named("enum (anonymous)"),
        },
        _ => CType::named(text(ty, source).trim()),
    }
}

/// Walk a declarator from the outside in, wrapping `base` at each level.
/// Returns the declared name (if any) and the full type.
fn unwind<'t>(declarator: Node<'t>, base: CType, source: &str) -> Option<(Node<'t>, CType)> {
    let (name, ty) = unwind_abstract(Some(declarator), base, source);
    name.map(|n| (n, ty))
}

fn unwind_abstract<'t>(
    declarator: Option<Node<'t>>,
    base: CType,
    source: &str,
) -> (Option<Node<'t>>, CType) {
    let mut ty = base;
    let mut node = declarator;
    while let Some(current) = node {
        match current.kind() {
            "identifier" | "field_identifier" | "type_identifier" => return (Some(current), ty),
            "init_declarator" | "attributed_declarator" => {
                node = current.child_by_field_name("declarator");
            }
            "pointer_declarator" | "abstract_pointer_declarator" => {
                ty = CType::Pointer {
                    pointee: Box::new(ty),
                    qualifiers: qualifiers_of(current, source),
                };
                node = current.child_by_field_name("declarator");
            }
            "array_declarator" | "abstract_array_declarator" => {
                let size = current
                    .child_by_field_name("size")
                    .map(|s| text(s, source).to_string());
                ty = CType::array_of(ty, size);
                node = current.child_by_field_name("declarator");
            }
            "function_declarator" | "abstract_function_declarator" => {
                let params = current
                    .child_by_field_name("parameters")
                    .map(|p| parameter_types(p, source))
                    .unwrap_or_default();
                ty = CType::Function {
                    ret: Box::new(ty),
                    params,
                };
                node = current.child_by_field_name("declarator");
            }
            "parenthesized_declarator" | "abstract_parenthesized_declarator" => {
                node = named_children(current).into_iter().next();
            }
            _ => return (None, ty),
        }
    }
    (None, ty)
}

fn parameter_types(list: Node<'_>, source: &str) -> Vec<CType> {
    let params: Vec<CType> = named_children(list)
        .into_iter()
        .filter(|p| p.kind() == "parameter_declaration")
        .map(|p| {
            let base = declared_base(p, source);
            unwind_abstract(p.child_by_field_name("declarator"), base, source).1.decayed()
        })
        .collect();
    if params.len() == 1 && params[0].render() == "void" {
        Vec::new()
    } else {
        params
    }
}

/// Type of a parameter of `def` named `name`.
fn parameter_type(def: Node<'_>, name: &str, source: &str) -> Option<CType> {
    let mut node = def.child_by_field_name("declarator")?;
    let list = loop {
        match node.kind() {
            "function_declarator" => {
                let inner = node.child_by_field_name("declarator")?;
                if matches!(inner.kind(), "identifier" | "parenthesized_declarator") {
                    break node.child_by_field_name("parameters")?;
                }
                node = inner;
            }
            "parenthesized_declarator" => node = named_children(node).into_iter().next()?,
            _ => node = node.child_by_field_name("declarator")?,
        }
    };

    for p in named_children(list) {
        if p.kind() != "parameter_declaration" {
            continue;
        }
        let base = declared_base(p, source);
        if let (Some(n), ty) = unwind_abstract(p.child_by_field_name("declarator"), base, source) {
            if text(n, source) == name {
                return Some(ty.decayed());
            }
        }
    }
    None
}

/// Type named by a `type_descriptor`.
pub fn descriptor_type(descriptor: Node<'_>, source: &str) -> Option<CType> {
    let base = declared_base(descriptor, source);
    Some(unwind_abstract(descriptor.child_by_field_name("declarator"), base, source).1)
}

/// Every declarator of a `declaration` (or `field_declaration`).
pub fn declarators<'t>(decl: Node<'t>, source: &str) -> Vec<Declarator<'t>> {
    let base = declared_base(decl, source);
    field_children(decl, "declarator")
        .into_iter()
        .filter_map(|node| {
            let (name, mut ty) = unwind(node, base.clone(), source)?;
            let init = if node.kind() == "init_declarator" {
                node.child_by_field_name("value")
            } else {
                None
            };
            if let (CType::Array { size, .. }, Some(value)) = (&mut ty, init) {
                if size.is_none() {
                    *size = inferred_length(value, source).map(|n| n.to_string());
                }
            }
            Some(Declarator {
                name,
                ty,
                node,
                init,
            })
        })
        .collect()
}

/// Function type of a `function_definition`.
pub fn function_type(def: Node<'_>, source: &str) -> Option<CType> {
    let base = declared_base(def, source);
    unwind(def.child_by_field_name("declarator")?, base, source).map(|(_, ty)| ty)
}

/// Storage-class keywords of a declaration (`static`, `extern`, ...).
pub fn storage_classes<'s>(decl: Node<'_>, source: &'s str) -> Vec<&'s str> {
    named_children(decl)
        .into_iter()
        .filter(|c| c.kind() == "storage_class_specifier")
        .map(|c| text(c, source))
        .collect()
}

fn inferred_length(value: Node<'_>, source: &str) -> Option<usize> {
    match value.kind() {
        "initializer_list" => Some(named_children(value).len()),
        "string_literal" | "concatenated_string" => Some(string_length(text(value, source))),
        _ => None,
    }
}

/// Element count of a string literal's array, terminator included.
fn string_length(literal: &str) -> usize {
    let mut count = 0;
    let mut in_string = false;
    let mut chars = literal.chars();
    while let Some(c) = chars.next() {
        match (in_string, c) {
            (false, '"') => in_string = true,
            (true, '"') => in_string = false,
            (true, '\\') => {
                chars.next();
                count += 1;
            }
            (true, _) => count += c.len_utf8(),
            _ => {}
        }
    }
    count + 1
}

fn number_type(literal: &str) -> CType {
    let lower = literal.to_ascii_lowercase();
    let is_hex = lower.starts_with("0x");
    let is_float = lower.contains('.')
        || (!is_hex && lower.contains('e'))
        || (is_hex && lower.contains('p'));
    if is_float {
        return if lower.ends_with('f') {
            CType::named("float")
        } else if lower.ends_with('l') {
            CType::named("long double")
        } else {
            CType::named("double")
        };
    }

    let suffix: String = lower
        .chars()
        .rev()
        .take_while(|c| matches!(c, 'u' | 'l'))
        .collect();
    let unsigned = suffix.contains('u');
    let longs = suffix.matches('l').count();
    let name = match (unsigned, longs) {
        (false, 0) => {
            let digits = lower.trim_end_matches(['u', 'l']);
            let value = if is_hex {
                u64::from_str_radix(&digits[2..], 16).ok()
            } else {
                digits.parse::<u64>().ok()
            };
            match value {
                Some(v) if v > i32::MAX as u64 => "long",
                _ => "int",
            }
        }
        (true, 0) => "unsigned int",
        (false, 1) => "long",
        (true, 1) => "unsigned long",
        (false, _) => "long long",
        (true, _) => "unsigned long long",
    };
    CType::named(name)
}
