//! Brace canonicalization: every `if`/`else`/loop body and switch-label
//! statement that is not already a block is wrapped in `{\n ... \n}`.
//!
//! Statement-anchored passes rely on this: a statement inserted before a
//! body must land inside the body.

use crate::catalog::in_main_file;
use crate::pipeline::Pass;
use crate::rule::{Literal, Match, Rule, RuleSet};
use crate::unit::syntax::{else_body, is_field, is_statement, named_children};
use crate::unit::ParsedUnit;
use tree_sitter::Node;

pub const NAME: &str = "braces";

const OPEN: &str = "{\n";
const CLOSE: &str = "\n}";

pub fn pass() -> Pass {
    Pass::new(NAME)
        .with(RuleSet::all([
            if_then().into(),
            if_else().into(),
            loop_body().into(),
            switch_labels(),
        ]))
        .canonicalizes_braces()
}

fn wrap(rule: Rule) -> Rule {
    rule.filter(in_main_file)
        .filter(not_a_block)
        .insert_before("stmt", Literal(OPEN))
        .insert_after("stmt", Literal(CLOSE))
}

fn if_then() -> Rule {
    wrap(Rule::new("braces-if-then", "(if_statement consequence: (_) @stmt) @root"))
}

fn if_else() -> Rule {
    wrap(Rule::new("braces-if-else", "(if_statement alternative: (_)) @root").bind("stmt", else_statement))
}

fn loop_body() -> Rule {
    wrap(Rule::new(
        "braces-loop",
        r#"[
  (for_statement body: (_) @stmt)
  (while_statement body: (_) @stmt)
  (do_statement body: (_) @stmt)
] @root"#,
    ))
}

/// `case` and `default` labels share one node kind in the grammar; the
/// ordered alternative keeps them apart.
fn switch_labels() -> RuleSet {
    RuleSet::first_of([
        wrap(
            Rule::new("braces-case", "(case_statement value: (_)) @root")
                .bind("stmt", label_statement),
        ),
        wrap(Rule::new("braces-default", "(case_statement) @root").bind("stmt", label_statement)),
    ])
}

fn else_statement<'t>(m: &Match<'t>, _unit: &'t ParsedUnit) -> Option<Node<'t>> {
    else_body(m.root())
}

/// First statement governed by a `case`/`default` label.
fn label_statement<'t>(m: &Match<'t>, _unit: &'t ParsedUnit) -> Option<Node<'t>> {
    let label = m.root();
    named_children(label)
        .into_iter()
        .find(|c| is_statement(*c) && !is_field(label, "value", *c))
}

fn not_a_block(m: &Match<'_>, _unit: &ParsedUnit) -> bool {
    m.get("stmt")
        .is_some_and(|stmt| stmt.kind() != "compound_statement")
}
