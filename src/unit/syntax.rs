//! Structural predicates over the C syntax tree.

use tree_sitter::Node;

const STATEMENT_KINDS: &[&str] = &[
    "expression_statement",
    "compound_statement",
    "if_statement",
    "for_statement",
    "while_statement",
    "do_statement",
    "switch_statement",
    "return_statement",
    "break_statement",
    "continue_statement",
    "goto_statement",
    "labeled_statement",
    "declaration",
    "attributed_statement",
    "seh_try_statement",
];

/// Source text of `node`.
pub fn text<'s>(node: Node<'_>, source: &'s str) -> &'s str {
    source.get(node.byte_range()).unwrap_or_default()
}

pub fn named_children<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .filter(|c| !is_comment(*c))
        .collect()
}

pub fn children<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.children(&mut cursor).collect()
}

pub fn field_children<'t>(node: Node<'t>, field: &str) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.children_by_field_name(field, &mut cursor).collect()
}

/// Strict ancestors, innermost first.
pub fn ancestors<'t>(node: Node<'t>) -> impl Iterator<Item = Node<'t>> {
    std::iter::successors(node.parent(), |n| n.parent())
}

/// Every named descendant of `node`, pre-order, `node` excluded.
pub fn descendants<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut out = Vec::new();
    let mut stack: Vec<Node<'t>> = named_children(node).into_iter().rev().collect();
    while let Some(n) = stack.pop() {
        out.push(n);
        stack.extend(named_children(n).into_iter().rev());
    }
    out
}

pub fn is_comment(node: Node<'_>) -> bool {
    node.kind() == "comment"
}

pub fn is_statement(node: Node<'_>) -> bool {
    STATEMENT_KINDS.contains(&node.kind())
}

/// Whether `node` is a body of `if`/`else`/loop.
pub fn is_body(node: Node<'_>) -> bool {
    let Some(parent) = node.parent() else {
        return false;
    };
    match parent.kind() {
        "if_statement" => {
            is_field(parent, "consequence", node) || is_field(parent, "alternative", node)
        }
        "else_clause" => true,
        "for_statement" | "while_statement" | "do_statement" => is_field(parent, "body", node),
        _ => false,
    }
}

/// A position where a new statement may be inserted directly before `node`.
pub fn is_statement_slot(node: Node<'_>) -> bool {
    if !is_statement(node) {
        return false;
    }
    let Some(parent) = node.parent() else {
        return false;
    };
    match parent.kind() {
        "compound_statement" | "labeled_statement" => true,
        "case_statement" => !is_field(parent, "value", node),
        _ => is_body(node),
    }
}

/// Nearest strict ancestor that is a statement slot.
pub fn enclosing_slot<'t>(node: Node<'t>) -> Option<Node<'t>> {
    ancestors(node).find(|a| is_statement_slot(*a))
}

pub fn enclosing_function<'t>(node: Node<'t>) -> Option<Node<'t>> {
    if node.kind() == "function_definition" {
        return Some(node);
    }
    ancestors(node).find(|a| a.kind() == "function_definition")
}

/// Name of a `function_definition`.
pub fn function_name<'s>(def: Node<'_>, source: &'s str) -> Option<&'s str> {
    let mut node = def.child_by_field_name("declarator")?;
    loop {
        match node.kind() {
            "identifier" => return Some(text(node, source)),
            "parenthesized_declarator" => node = *named_children(node).first()?,
            _ => node = node.child_by_field_name("declarator")?,
        }
    }
}

/// Whether `node` lies inside the program entry point.
pub fn in_main(node: Node<'_>, source: &str) -> bool {
    enclosing_function(node)
        .and_then(|f| function_name(f, source))
        .is_some_and(|name| name == "main")
}

pub fn has_ancestor_kind(node: Node<'_>, kinds: &[&str]) -> bool {
    ancestors(node).any(|a| kinds.contains(&a.kind()))
}

pub fn inside_logical_or(node: Node<'_>, source: &str) -> bool {
    ancestors(node)
        .any(|a| a.kind() == "binary_expression" && operator_of(a, source) == Some("||"))
}

pub fn inside_call(node: Node<'_>) -> bool {
    has_ancestor_kind(node, &["call_expression"])
}

pub fn inside_declaration(node: Node<'_>) -> bool {
    has_ancestor_kind(node, &["declaration"])
}

/// Spelled in the file itself rather than in a macro definition.
pub fn in_main_file(node: Node<'_>) -> bool {
    !has_ancestor_kind(
        node,
        &["preproc_def", "preproc_function_def", "preproc_call", "preproc_arg"],
    )
}

pub fn strip_parens(node: Node<'_>) -> Node<'_> {
    let mut node = node;
    while node.kind() == "parenthesized_expression" {
        match named_children(node).first() {
            Some(inner) => node = *inner,
            None => break,
        }
    }
    node
}

/// First statement inside a compound statement.
pub fn first_statement(compound: Node<'_>) -> Option<Node<'_>> {
    named_children(compound).into_iter().find(|c| is_statement(*c))
}

/// Every identifier under `node`, `node` included.
pub fn identifiers_in(node: Node<'_>) -> Vec<Node<'_>> {
    let mut found = Vec::new();
    if node.kind() == "identifier" {
        found.push(node);
    }
    found.extend(descendants(node).into_iter().filter(|n| n.kind() == "identifier"));
    found
}

/// Operator token of an operator expression.
pub fn operator_of<'s>(node: Node<'_>, source: &'s str) -> Option<&'s str> {
    if let Some(op) = node.child_by_field_name("operator") {
        return Some(text(op, source));
    }
    children(node)
        .into_iter()
        .find(|c| !c.is_named() && !matches!(c.kind(), "(" | ")" | "[" | "]" | ","))
        .map(|c| text(c, source))
}

/// Whether `child` is `parent`'s field `field`.
pub fn is_field(parent: Node<'_>, field: &str, child: Node<'_>) -> bool {
    field_children(parent, field).iter().any(|c| c.id() == child.id())
}

/// The statement an `else` governs, whichever way the grammar nests it.
pub fn else_body(if_stmt: Node<'_>) -> Option<Node<'_>> {
    let alternative = if_stmt.child_by_field_name("alternative")?;
    if alternative.kind() == "else_clause" {
        named_children(alternative).into_iter().next()
    } else {
        Some(alternative)
    }
}
