use crate::rule::computation::EvalError;
use tree_sitter::Node;

/// One successful application of a rule: the root node plus named bindings.
///
/// Bindings come from query captures first, then from the rule's binders in
/// registration order.
#[derive(Debug, Clone)]
pub struct Match<'t> {
    rule: &'static str,
    root: Node<'t>,
    bindings: Vec<(String, Node<'t>)>,
}

impl<'t> Match<'t> {
    pub fn new(rule: &'static str, root: Node<'t>, bindings: Vec<(String, Node<'t>)>) -> Self {
        Self {
            rule,
            root,
            bindings,
        }
    }

    pub fn rule(&self) -> &'static str {
        self.rule
    }

    pub fn root(&self) -> Node<'t> {
        self.root
    }

    pub fn get(&self, name: &str) -> Option<Node<'t>> {
        if name == "root" {
            return Some(self.root);
        }
        self.bindings
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, node)| *node)
    }

    /// Binding that must exist; a missing one is a rule-definition fault.
    pub fn node(&self, name: &str) -> Result<Node<'t>, EvalError> {
        self.get(name).ok_or_else(|| EvalError::Unbound {
            rule: self.rule,
            name: name.to_string(),
        })
    }

    pub fn bind(&mut self, name: &str, node: Node<'t>) {
        self.bindings.push((name.to_string(), node));
    }
}
