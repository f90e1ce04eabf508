//! Rule catalogs: the passes a run is assembled from.

pub mod braces;
pub mod logging;
pub mod mutation;
pub mod probe;
pub mod stack_heap;
pub mod value_flow;

use crate::accumulator::ReplacementSet;
use crate::config::{PassName, RunConfig};
use crate::pipeline::Pass;
use crate::rule::Match;
use crate::unit::syntax::{self, first_statement};
use crate::unit::{CType, ParsedUnit};
use tree_sitter::Node;

/// Query matching once per file, for file-start blocks.
pub(crate) const FILE_START: &str = "(translation_unit) @root";

/// The passes selected by `config`, in configured order.
pub fn passes_for(config: &RunConfig) -> Vec<Pass> {
    config
        .run
        .passes
        .iter()
        .map(|name| match name {
            PassName::Braces => braces::pass(),
            PassName::Instrument => logging::pass(config.instrument.mode),
            PassName::Mutate => mutation::pass(&config.mutate.targets),
            PassName::StackToHeap => stack_heap::pass(&config.stack_to_heap),
        })
        .collect()
}

/// One-line description of every pass, for listings.
pub fn describe() -> Vec<(PassName, &'static str)> {
    vec![
        (PassName::Braces, "wrap unbraced if/else/loop/switch-label bodies in blocks"),
        (PassName::Instrument, "declaration, entry, site and value-flow logging probes"),
        (PassName::Mutate, "macro-guarded mutation hooks on indices, pointers and integer operands"),
        (PassName::StackToHeap, "relocate local arrays to the heap behind MUT_ shadows"),
    ]
}

pub(crate) fn in_main_file(m: &Match<'_>, _unit: &ParsedUnit) -> bool {
    syntax::in_main_file(m.root())
}

pub(crate) fn not_in_main(m: &Match<'_>, unit: &ParsedUnit) -> bool {
    !unit.in_main(m.root())
}

pub(crate) fn outside_logical_or(m: &Match<'_>, unit: &ParsedUnit) -> bool {
    !syntax::inside_logical_or(m.root(), unit.source())
}

pub(crate) fn outside_call(m: &Match<'_>, _unit: &ParsedUnit) -> bool {
    !syntax::inside_call(m.root())
}

pub(crate) fn outside_declaration(m: &Match<'_>, _unit: &ParsedUnit) -> bool {
    !syntax::inside_declaration(m.root())
}

pub(crate) fn defines_main(_m: &Match<'_>, unit: &ParsedUnit) -> bool {
    unit.defines_main()
}

/// Every `<prefix><n>` this file has received so far, with the text after `n`.
pub(crate) fn inserted_numbers<'a>(
    accepted: &'a ReplacementSet,
    prefix: &'a str,
) -> impl Iterator<Item = (u32, &'a str)> + 'a {
    accepted.entries().iter().flat_map(move |r| {
        r.text.match_indices(prefix).filter_map(move |(at, _)| {
            let rest = &r.text[at + prefix.len()..];
            let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
            let n = rest[..digits].parse().ok()?;
            Some((n, &rest[digits..]))
        })
    })
}

/// Whether any insertion into this file contains `needle`.
pub(crate) fn inserted_anywhere(accepted: &ReplacementSet, needle: &str) -> bool {
    accepted.entries().iter().any(|r| r.text.contains(needle))
}

/// Nearest enclosing statement slot of the root.
pub(crate) fn enclosing_slot<'t>(m: &Match<'t>, _unit: &'t ParsedUnit) -> Option<Node<'t>> {
    syntax::enclosing_slot(m.root())
}

/// First statement of `main`'s body.
pub(crate) fn main_first_statement<'t>(_m: &Match<'t>, unit: &'t ParsedUnit) -> Option<Node<'t>> {
    syntax::named_children(unit.root())
        .into_iter()
        .filter(|n| n.kind() == "function_definition")
        .find(|def| unit.function_name(*def) == Some("main"))
        .and_then(|def| def.child_by_field_name("body"))
        .and_then(first_statement)
}

/// Whether `node` is the left operand of a plain `=`.
pub(crate) fn is_assignment_target(node: Node<'_>) -> bool {
    node.parent().is_some_and(|p| {
        p.kind() == "assignment_expression" && syntax::is_field(p, "left", node) && {
            let mut cursor = p.walk();
            let plain = p.children(&mut cursor).any(|c| c.kind() == "=");
            plain
        }
    })
}

/// Whether `node` sits under a unary operator `op` (`&`, `*`, `++`, `--`).
pub(crate) fn under_unary(node: Node<'_>, op: &str, source: &str) -> bool {
    syntax::ancestors(node).any(|a| match a.kind() {
        "pointer_expression" | "unary_expression" | "update_expression" => {
            syntax::operator_of(a, source) == Some(op)
        }
        _ => false,
    })
}

/// Type of an expression as markers print it: `volatile` dropped.
pub(crate) fn marker_type(unit: &ParsedUnit, node: Node<'_>) -> Option<CType> {
    unit.type_of(node).map(|t| t.without_volatile())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_from_str;
    use crate::edit::Replacement;

    #[test]
    fn passes_follow_configured_order() {
        let config = load_from_str(
            "[run]\npasses = [\"stack-to-heap\", \"mutate\", \"instrument\"]\n[instrument]\nmode = \"memory\"\n",
        )
        .unwrap();
        let names: Vec<_> = passes_for(&config).iter().map(|p| p.name()).collect();
        assert_eq!(names, ["stack-to-heap", "mutate", "instrument"]);
    }

    #[test]
    fn numbers_are_read_from_accepted_insertions() {
        let source = "int f(int *a) { return a[0]; }";
        let mut set = ReplacementSet::new();
        set.add(source, Replacement::insertion(25, "((")).unwrap();
        set.add(source, Replacement::insertion(26, ") _MUTARR4)")).unwrap();
        set.add(source, Replacement::insertion(16, "\ninit_arr_2_uninit(b, MUT_b, int)")).unwrap();

        let hooks: Vec<_> = inserted_numbers(&set, ") _MUTARR").map(|(n, _)| n).collect();
        assert_eq!(hooks, [4]);
        let inits: Vec<_> = inserted_numbers(&set, "\ninit_arr_").collect();
        assert_eq!(inits, [(2, "_uninit(b, MUT_b, int)")]);
        assert!(inserted_anywhere(&set, "\ninit_arr_2_uninit("));
        assert!(!inserted_anywhere(&set, "\ninit_arr_2("));
    }

    #[test]
    fn every_pass_is_described() {
        let described: Vec<_> = describe().into_iter().map(|(p, _)| p).collect();
        assert_eq!(described, PassName::ALL);
    }
}
