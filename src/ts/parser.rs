use crate::ts::errors::TreeSitterError;
use ast_grep_language::{LanguageExt, SupportLang};
use tree_sitter::{Language, Node, Parser, Tree};

/// The C grammar shipped with ast-grep.
pub fn c_language() -> Language {
    SupportLang::C.get_ts_language()
}

/// Tree-sitter parser wrapper for C source code.
pub struct CParser {
    parser: Parser,
}

impl CParser {
    pub fn new() -> Result<Self, TreeSitterError> {
        let mut parser = Parser::new();
        parser
            .set_language(&c_language())
            .map_err(|_| TreeSitterError::LanguageSet)?;

        Ok(Self { parser })
    }

    /// Parse source code into a tree-sitter Tree.
    pub fn parse(&mut self, source: &str) -> Result<Tree, TreeSitterError> {
        self.parser
            .parse(source, None)
            .ok_or(TreeSitterError::ParseFailed)
    }

    /// Parse source code and return the tree along with the source.
    pub fn parse_with_source<'a>(
        &mut self,
        source: &'a str,
    ) -> Result<ParsedSource<'a>, TreeSitterError> {
        let tree = self.parse(source)?;
        Ok(ParsedSource { source, tree })
    }
}

/// A parsed source text with its tree-sitter tree.
pub struct ParsedSource<'a> {
    pub source: &'a str,
    pub tree: Tree,
}

impl<'a> ParsedSource<'a> {
    pub fn root_node(&self) -> Node<'_> {
        self.tree.root_node()
    }

    /// Check if the tree contains any ERROR or MISSING nodes.
    pub fn has_errors(&self) -> bool {
        self.tree.root_node().has_error()
    }

    pub fn error_nodes(&self) -> Vec<ErrorNode> {
        error_nodes(self.tree.root_node(), self.source)
    }
}

/// Information about an ERROR or MISSING node in the parse tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorNode {
    pub byte_start: usize,
    pub byte_end: usize,
    pub line: usize,
    pub column: usize,
    pub text: String,
}

/// Collect every ERROR and MISSING node under `root`.
pub fn error_nodes(root: Node<'_>, source: &str) -> Vec<ErrorNode> {
    let mut errors = Vec::new();
    collect_error_nodes(root, source, &mut errors);
    errors
}

fn collect_error_nodes(node: Node<'_>, source: &str, errors: &mut Vec<ErrorNode>) {
    if !node.has_error() {
        return;
    }
    if node.is_error() || node.is_missing() {
        errors.push(ErrorNode {
            byte_start: node.start_byte(),
            byte_end: node.end_byte(),
            line: node.start_position().row + 1,
            column: node.start_position().column + 1,
            text: source
                .get(node.byte_range())
                .unwrap_or_default()
                .to_string(),
        });
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_error_nodes(child, source, errors);
    }
}
