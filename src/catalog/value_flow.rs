//! Value-flow probes, one rule set per instrument mode.
//!
//! Each probe lands before the statement holding the expression it reports,
//! so the printed value is the one the statement is about to use.

use crate::catalog::logging::{declared_name, declared_type, has_local_storage};
use crate::catalog::probe::{guarded, marker};
use crate::catalog::{
    defines_main, enclosing_slot, in_main_file, is_assignment_target, main_first_statement,
    marker_type, not_in_main, outside_call, outside_declaration, outside_logical_or, under_unary,
};
use crate::config::InstrumentMode;
use crate::counters::Category;
use crate::rule::{Computation, EvalContext, EvalError, Match, Rule, RuleSet};
use crate::unit::symbols::storage_classes;
use crate::unit::syntax::{self, ancestors, enclosing_function, identifiers_in, strip_parens};
use crate::unit::{BindingKind, CType, ParsedUnit};
use tree_sitter::Node;

const INIT_TYPES: [&str; 8] = [
    "int8_t", "int16_t", "int32_t", "int64_t", "uint8_t", "uint16_t", "uint32_t", "uint64_t",
];

const INIT_CANDIDATES: &str = r#"[
  (identifier)
  (field_expression)
  (subscript_expression)
  (pointer_expression)
  (binary_expression)
  (unary_expression)
  (update_expression)
  (cast_expression)
  (conditional_expression)
  (call_expression)
] @root"#;

/// Rule sets contributed to the instrument pass by `mode`.
pub fn rule_sets(mode: InstrumentMode) -> Vec<RuleSet> {
    match mode {
        InstrumentMode::ArrayIndex => vec![array_index().into()],
        InstrumentMode::PointerIndex => vec![pointer_index().into()],
        InstrumentMode::ArrayPointerIndex => vec![array_index().into(), pointer_index().into()],
        InstrumentMode::Memory => vec![memory()],
        InstrumentMode::Pointer => vec![pointer()],
        InstrumentMode::Integer => vec![integer().into()],
        InstrumentMode::Divider => vec![divider().into()],
        InstrumentMode::Init => vec![init().into()],
    }
}

// ---------------------------------------------------------------------------
// pointer

fn pointer() -> RuleSet {
    RuleSet::first_of([
        Rule::new("value-pointer", "(identifier) @root")
            .bind("stmt", enclosing_slot)
            .filter(in_main_file)
            .filter(not_in_main)
            .filter(not_assigned)
            .filter(outside_logical_or)
            .filter(outside_call)
            .filter(outside_declaration)
            .filter(not_taken_or_stepped)
            .filter(dereferenced)
            .filter(pointer_typed)
            .filter(is_local_or_global)
            .insert_before("stmt", PointerRef { assigned: false }),
        Rule::new("value-pointer-assign", "(identifier) @root")
            .bind("stmt", enclosing_slot)
            .filter(in_main_file)
            .filter(not_in_main)
            .filter(assigned)
            .filter(outside_declaration)
            .filter(pointer_typed)
            .insert_before("stmt", PointerRef { assigned: true }),
        Rule::new("value-pointer-subscript", "(subscript_expression) @root")
            .bind("stmt", enclosing_slot)
            .filter(in_main_file)
            .filter(not_in_main)
            .filter(not_assigned)
            .filter(outside_call)
            .filter(not_address_taken)
            .filter(pointer_typed)
            .insert_before("stmt", PointerRef { assigned: false }),
        Rule::new("value-pointer-subscript-assign", "(subscript_expression) @root")
            .bind("stmt", enclosing_slot)
            .filter(in_main_file)
            .filter(not_in_main)
            .filter(assigned)
            .filter(outside_declaration)
            .filter(pointer_typed)
            .insert_before("stmt", PointerRef { assigned: true }),
    ])
}

fn assigned(m: &Match<'_>, _unit: &ParsedUnit) -> bool {
    is_assignment_target(m.root())
}

fn not_assigned(m: &Match<'_>, _unit: &ParsedUnit) -> bool {
    !is_assignment_target(m.root())
}

fn not_address_taken(m: &Match<'_>, unit: &ParsedUnit) -> bool {
    !under_unary(m.root(), "&", unit.source())
}

fn not_taken_or_stepped(m: &Match<'_>, unit: &ParsedUnit) -> bool {
    !["&", "++", "--"]
        .iter()
        .any(|op| under_unary(m.root(), op, unit.source()))
}

/// Under a `*` dereference or a subscript.
fn dereferenced(m: &Match<'_>, unit: &ParsedUnit) -> bool {
    ancestors(m.root()).any(|a| match a.kind() {
        "subscript_expression" => true,
        "pointer_expression" => unit.operator_of(a) == Some("*"),
        _ => false,
    })
}

fn pointer_typed(m: &Match<'_>, unit: &ParsedUnit) -> bool {
    unit.type_of(m.root())
        .is_some_and(|ty| unit.resolve(&ty).is_pointer_like())
}

fn is_local_or_global(m: &Match<'_>, unit: &ParsedUnit) -> bool {
    unit.binding(m.root())
        .is_some_and(|b| matches!(b.kind, BindingKind::Local | BindingKind::Global))
}

struct PointerRef {
    assigned: bool,
}

impl Computation for PointerRef {
    fn eval(&self, m: &Match<'_>, cx: &mut EvalContext<'_>) -> Result<Option<String>, EvalError> {
        let Some(ty) = marker_type(cx.unit, m.root()) else {
            return Ok(None);
        };
        if ty.mentions_union() || ty.mentions_const() {
            return Ok(None);
        }
        let ty = ty.render();
        let expr = cx.unit.text(m.root());
        let id = cx.counters.next(Category::Ptr);
        if self.assigned {
            return Ok(Some(format!("{}\n", marker(Some(id), "VARREF_ASSIGN", &[&ty, expr]))));
        }
        Ok(Some(format!(
            "{}{}",
            marker(Some(id), "VARREF_POINTER", &[&ty, expr]),
            guarded(Category::Ptr, id, &format!("PTR:{id}:%p"), &[expr])
        )))
    }
}

// ---------------------------------------------------------------------------
// memory

fn memory() -> RuleSet {
    RuleSet::first_of([
        memory_access("value-memory-deref", "(pointer_expression) @root", MemoryAccess::Deref)
            .filter(is_deref),
        memory_access(
            "value-memory-field",
            "(field_expression argument: (_) @arg) @root",
            MemoryAccess::Field,
        ),
        memory_access("value-memory-subscript", "(subscript_expression) @root", MemoryAccess::Subscript)
            .filter(outermost_subscript)
            .filter(not_address_taken),
        Rule::new("value-memory-local", "(declaration declarator: (_) @root)")
            .bind("decl", declaration)
            .filter(in_main_file)
            .filter(not_in_main)
            .filter(has_local_storage)
            .filter(not_for_initializer)
            .insert_after("decl", VariableAddress { scope: "LOCAL" }),
        Rule::new(
            "value-memory-global",
            "(translation_unit (declaration declarator: (_) @root))",
        )
        .bind("stmt", main_first_statement)
        .filter(defines_main)
        .filter(in_main_file)
        .filter(is_defined_global)
        .insert_before("stmt", VariableAddress { scope: "GLOBAL" }),
    ])
}

fn memory_access(name: &'static str, query: &str, access: MemoryAccess) -> Rule {
    Rule::new(name, query)
        .bind("stmt", enclosing_slot)
        .filter(in_main_file)
        .filter(not_in_main)
        .filter(outside_logical_or)
        .filter(outside_call)
        .filter(outside_declaration)
        .insert_before("stmt", MemoryRef { access })
}

fn is_deref(m: &Match<'_>, unit: &ParsedUnit) -> bool {
    unit.operator_of(m.root()) == Some("*")
}

fn outermost_subscript(m: &Match<'_>, _unit: &ParsedUnit) -> bool {
    !syntax::has_ancestor_kind(m.root(), &["subscript_expression"])
}

fn declaration<'t>(m: &Match<'t>, _unit: &'t ParsedUnit) -> Option<Node<'t>> {
    m.root().parent()
}

fn not_for_initializer(m: &Match<'_>, _unit: &ParsedUnit) -> bool {
    m.root()
        .parent()
        .and_then(|decl| decl.parent())
        .is_some_and(|p| p.kind() != "for_statement")
}

fn is_defined_global(m: &Match<'_>, unit: &ParsedUnit) -> bool {
    let Some(decl) = m.root().parent() else {
        return false;
    };
    enclosing_function(decl).is_none()
        && !storage_classes(decl, unit.source()).contains(&"extern")
        && declared_type(unit, m.root()).is_some_and(|ty| !ty.is_function())
}

#[derive(Debug, Clone, Copy)]
enum MemoryAccess {
    Deref,
    Field,
    Subscript,
}

struct MemoryRef {
    access: MemoryAccess,
}

impl Computation for MemoryRef {
    fn eval(&self, m: &Match<'_>, cx: &mut EvalContext<'_>) -> Result<Option<String>, EvalError> {
        let root = m.root();
        let text = cx.unit.text(root);
        if !text.contains("_MUT") && !cx.accepted.inserted_within(root.byte_range(), "_MUT") {
            return Ok(None);
        }

        let (node, address) = match self.access {
            MemoryAccess::Deref | MemoryAccess::Subscript => (root, format!("&({text})")),
            MemoryAccess::Field => {
                let arg = m.node("arg")?;
                (arg, cx.unit.text(arg).to_string())
            }
        };
        let Some(ty) = marker_type(cx.unit, node) else {
            return Ok(None);
        };
        if ty.mentions_union() || ty.mentions_const() {
            return Ok(None);
        }
        let ty = ty.render();
        if matches!(self.access, MemoryAccess::Field) && !ty.contains('*') {
            return Ok(None);
        }

        let expr = cx.unit.text(node);
        let id = cx.counters.next(Category::Mem);
        Ok(Some(format!(
            "{}{}",
            marker(Some(id), "VARREF_MEMORY", &[&ty, expr]),
            guarded(
                Category::Mem,
                id,
                &format!("MEM:{id}:%p:%p"),
                &[&address, &format!("({address})+1")]
            )
        )))
    }
}

/// Address and size of a variable, printed once it is in scope.
struct VariableAddress {
    scope: &'static str,
}

impl Computation for VariableAddress {
    fn eval(&self, m: &Match<'_>, cx: &mut EvalContext<'_>) -> Result<Option<String>, EvalError> {
        let unit = cx.unit;
        let (Some(ty), Some(name)) = (declared_type(unit, m.root()), declared_name(unit, m.root())) else {
            return Ok(None);
        };
        let ty = ty.without_volatile().render();
        if ty.contains("(anonymous") {
            return Ok(None);
        }
        let id = cx.counters.next(Category::Var);
        let scope = self.scope;
        Ok(Some(format!(
            "\n{}if (print_flag_var[{id}]!=2) {{printf(\"{scope}:{id}:%p:%d\\n\",&({name}),(int)sizeof({ty}));print_flag_var[{id}]++;}}\n",
            marker(Some(id), "VARDECL", &[&ty, name]),
        )))
    }
}

// ---------------------------------------------------------------------------
// integer and divider

const OPERANDS: &str = "(binary_expression left: (_) @left right: (_) @right) @root";

fn integer() -> Rule {
    Rule::new("value-integer", OPERANDS)
        .bind("stmt", enclosing_slot)
        .filter(in_main_file)
        .filter(arithmetic_operator)
        .filter(outside_logical_or)
        .filter(not_loop_header)
        .filter(outside_call)
        .insert_before("stmt", IntegerOperands)
}

fn divider() -> Rule {
    Rule::new("value-divider", OPERANDS)
        .bind("stmt", enclosing_slot)
        .filter(in_main_file)
        .filter(division_operator)
        .filter(outside_logical_or)
        .filter(not_loop_header)
        .insert_before("stmt", IntegerOperands)
}

fn arithmetic_operator(m: &Match<'_>, unit: &ParsedUnit) -> bool {
    matches!(unit.operator_of(m.root()), Some("+" | "-" | "*" | "<<" | ">>"))
}

fn division_operator(m: &Match<'_>, unit: &ParsedUnit) -> bool {
    matches!(unit.operator_of(m.root()), Some("/" | "%"))
}

fn not_loop_header(m: &Match<'_>, _unit: &ParsedUnit) -> bool {
    m.root().parent().is_some_and(|p| p.kind() != "for_statement")
}

struct IntegerOperands;

impl IntegerOperands {
    /// Operand types after the conversions the operator applies.
    fn converted(unit: &ParsedUnit, op: &str, expr: Node<'_>, left: Node<'_>, right: Node<'_>) -> Option<(CType, CType)> {
        let index = unit.index();
        let declared_left = unit.type_of(left)?;
        let declared_right = unit.type_of(right)?;

        if matches!(op, "<<" | ">>") {
            return Some((index.promoted(&declared_left)?, index.promoted(&declared_right)?));
        }

        let l = unit.resolve(&declared_left).decayed();
        let r = unit.resolve(&declared_right).decayed();
        if l.is_pointer() || r.is_pointer() {
            return Some((declared_left, declared_right));
        }
        let common = unit.type_of(expr)?;
        let keep = |declared: CType, resolved: CType| {
            if resolved.unqualified() == common {
                declared.unqualified()
            } else {
                common.clone()
            }
        };
        Some((keep(declared_left, l), keep(declared_right, r)))
    }
}

fn printf_conversion(ty: &str) -> (&'static str, &'static str) {
    if ty.contains("uint") || ty.contains("unsigned") {
        ("%llu", "unsigned long long")
    } else {
        ("%lld", "long long")
    }
}

impl Computation for IntegerOperands {
    fn eval(&self, m: &Match<'_>, cx: &mut EvalContext<'_>) -> Result<Option<String>, EvalError> {
        let unit = cx.unit;
        let root = m.root();
        if unit.text(root).contains("MUT_") || cx.accepted.inserted_within(root.byte_range(), "MUT_") {
            return Ok(None);
        }
        let (left, right) = (m.node("left")?, m.node("right")?);
        let Some(op) = unit.operator_of(root) else {
            return Ok(None);
        };
        let Some((lt, rt)) = Self::converted(unit, op, root, left, right) else {
            return Ok(None);
        };
        let (lt, rt) = (lt.render(), rt.render());
        let excluded = |ty: &str| ["struct", "union", "const", "*", "["].iter().any(|s| ty.contains(s));
        if excluded(&lt) || excluded(&rt) {
            return Ok(None);
        }

        let operand = |node: Node<'_>| unit.text(node).replace("++", "").replace("--", "");
        let (l, r) = (operand(left), operand(right));
        let (lf, lc) = printf_conversion(&lt);
        let (rf, rc) = printf_conversion(&rt);

        let id = cx.counters.next(Category::Int);
        Ok(Some(format!(
            "{}{}",
            marker(Some(id), "VARREF_INTEGER", &[&lt, &l, &rt, &r, op]),
            guarded(
                Category::Int,
                id,
                &format!("INT:{id}:{lf}:{rf}"),
                &[&format!("({lc})({l})"), &format!("({rc})({r})")]
            )
        )))
    }
}

// ---------------------------------------------------------------------------
// array and pointer index

fn array_index() -> Rule {
    Rule::new(
        "value-array-index",
        "(subscript_expression argument: (_) @base index: (_) @index) @root",
    )
    .bind("stmt", enclosing_slot)
    .bind("var", base_variable)
    .bind("idx", index_variable)
    .filter(in_main_file)
    .filter(not_in_main)
    .filter(outside_declaration)
    .filter(outside_logical_or)
    .insert_before("stmt", ArrayRef)
}

fn pointer_index() -> Rule {
    Rule::new("value-pointer-index", "(binary_expression right: (_) @right) @root")
        .bind("stmt", enclosing_slot)
        .bind("offset", mutated_offset)
        .filter(in_main_file)
        .filter(is_addition)
        .filter(outside_logical_or)
        .insert_before("stmt", PointerIndexRef)
}

fn first_variable<'t>(unit: &'t ParsedUnit, node: Node<'t>) -> Option<Node<'t>> {
    identifiers_in(node).into_iter().find(|ident| {
        unit.binding(*ident).is_some_and(|b| {
            matches!(b.kind, BindingKind::Local | BindingKind::Parameter | BindingKind::Global)
        })
    })
}

fn base_variable<'t>(m: &Match<'t>, unit: &'t ParsedUnit) -> Option<Node<'t>> {
    first_variable(unit, m.get("base")?)
}

fn index_variable<'t>(m: &Match<'t>, unit: &'t ParsedUnit) -> Option<Node<'t>> {
    first_variable(unit, m.get("index")?)
}

fn mutated_offset<'t>(m: &Match<'t>, unit: &'t ParsedUnit) -> Option<Node<'t>> {
    let right = strip_parens(m.get("right")?);
    (right.kind() == "identifier" && unit.text(right).contains("MUT_PTR")).then_some(right)
}

fn is_addition(m: &Match<'_>, unit: &ParsedUnit) -> bool {
    unit.operator_of(m.root()) == Some("+")
}

struct ArrayRef;

impl Computation for ArrayRef {
    fn eval(&self, m: &Match<'_>, cx: &mut EvalContext<'_>) -> Result<Option<String>, EvalError> {
        let var = m.node("var")?;
        let idx = m.node("idx")?;
        let Some(ty) = marker_type(cx.unit, var) else {
            return Ok(None);
        };
        if ty.mentions_struct() || ty.mentions_union() || ty.mentions_const() {
            return Ok(None);
        }
        let id = cx.counters.next(Category::Array);
        Ok(Some(format!(
            "{}\n",
            marker(
                Some(id),
                "VARREF_ARRAY",
                &[&ty.render(), cx.unit.text(var), cx.unit.text(idx)]
            )
        )))
    }
}

struct PointerIndexRef;

impl Computation for PointerIndexRef {
    fn eval(&self, m: &Match<'_>, cx: &mut EvalContext<'_>) -> Result<Option<String>, EvalError> {
        let offset = m.node("offset")?;
        let id = cx.counters.next(Category::PtrIndex);
        Ok(Some(format!(
            "{}\n",
            marker(Some(id), "VARREF_POINTERINDEX", &["int", cx.unit.text(offset)])
        )))
    }
}

// ---------------------------------------------------------------------------
// init

fn init() -> Rule {
    Rule::new("value-init", INIT_CANDIDATES)
        .bind("if", condition_owner)
        .filter(in_main_file)
        .filter(plain_condition_operand)
        .insert_before("if", InitRef)
}

/// The `if` whose condition holds the root.
fn condition_owner<'t>(m: &Match<'t>, _unit: &'t ParsedUnit) -> Option<Node<'t>> {
    let root = m.root();
    for a in ancestors(root) {
        if a.kind() == "if_statement" {
            let condition = a.child_by_field_name("condition")?;
            return (condition.start_byte() <= root.start_byte() && root.end_byte() <= condition.end_byte())
                .then_some(a);
        }
        if syntax::is_statement(a) {
            return None;
        }
    }
    None
}

/// Not feeding a comparison, bitwise or, assignment, comma, address-of,
/// call or subscript on the way up to the condition.
fn plain_condition_operand(m: &Match<'_>, unit: &ParsedUnit) -> bool {
    let Some(owner) = m.get("if") else {
        return false;
    };
    for a in ancestors(m.root()) {
        if a.id() == owner.id() {
            return true;
        }
        let blocked = match a.kind() {
            "binary_expression" => matches!(
                unit.operator_of(a),
                Some("||" | "|" | "<" | "<=" | ">" | ">=")
            ),
            "assignment_expression" => matches!(unit.operator_of(a), Some("=" | "|=" | "&=")),
            "pointer_expression" => unit.operator_of(a) == Some("&"),
            "comma_expression" | "call_expression" | "subscript_expression" => true,
            _ => false,
        };
        if blocked {
            return false;
        }
    }
    false
}

struct InitRef;

impl Computation for InitRef {
    fn eval(&self, m: &Match<'_>, cx: &mut EvalContext<'_>) -> Result<Option<String>, EvalError> {
        let Some(ty) = marker_type(cx.unit, m.root()).map(|t| t.render()) else {
            return Ok(None);
        };
        if !INIT_TYPES.contains(&ty.as_str()) {
            return Ok(None);
        }
        let id = cx.counters.next(Category::Init);
        Ok(Some(format!(
            "{}\n",
            marker(Some(id), "VARREF_INIT", &[&ty, cx.unit.text(m.root())])
        )))
    }
}
