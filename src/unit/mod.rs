//! One parsed C source file and everything derived from its tree.
//!
//! A [`ParsedUnit`] is built once per file per run. Every pass evaluates its
//! rules against this immutable tree; rewritten text is never re-parsed
//! mid-run.

pub mod ctype;
pub mod symbols;
pub mod syntax;

use crate::edit::Fingerprint;
use crate::pool::with_parser;
use crate::ts::parser::error_nodes;
use crate::ts::{ErrorNode, TreeSitterError};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tree_sitter::{Node, Tree};

pub use ctype::CType;
pub use symbols::{Binding, BindingKind, Declarator, TypeIndex};

#[derive(Error, Debug)]
pub enum UnitError {
    #[error(transparent)]
    TreeSitter(#[from] TreeSitterError),

    #[error("{count} syntax error(s), first at line {line}:{column}")]
    Syntax {
        count: usize,
        line: usize,
        column: usize,
        errors: Vec<ErrorNode>,
    },
}

pub struct ParsedUnit {
    path: PathBuf,
    source: String,
    tree: Tree,
    fingerprint: Fingerprint,
    index: TypeIndex,
}

impl ParsedUnit {
    /// Parse `source`. A tree with any ERROR or MISSING node is rejected.
    pub fn parse(path: impl AsRef<Path>, source: impl Into<String>) -> Result<Self, UnitError> {
        let source = source.into();
        let tree = with_parser(|parser| parser.parse(&source))??;

        if tree.root_node().has_error() {
            let errors = error_nodes(tree.root_node(), &source);
            let (line, column) = errors.first().map(|e| (e.line, e.column)).unwrap_or((0, 0));
            return Err(UnitError::Syntax {
                count: errors.len(),
                line,
                column,
                errors,
            });
        }

        let index = TypeIndex::build(tree.root_node(), &source);
        Ok(Self {
            path: path.as_ref().to_path_buf(),
            fingerprint: Fingerprint::of(&source),
            source,
            tree,
            index,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    pub fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }

    pub fn index(&self) -> &TypeIndex {
        &self.index
    }

    /// Original text of `node`.
    pub fn text(&self, node: Node<'_>) -> &str {
        syntax::text(node, &self.source)
    }

    /// Whether this file defines the program entry point.
    pub fn defines_main(&self) -> bool {
        self.index.main_range().is_some()
    }

    pub fn type_of(&self, expr: Node<'_>) -> Option<CType> {
        self.index.type_of(expr, &self.source)
    }

    /// Binding of the identifier `ident` at its own position.
    pub fn binding(&self, ident: Node<'_>) -> Option<Binding> {
        self.index.lookup(self.text(ident), ident, &self.source)
    }

    pub fn resolve(&self, ty: &CType) -> CType {
        self.index.resolve(ty)
    }

    pub fn declarators<'t>(&'t self, decl: Node<'t>) -> Vec<Declarator<'t>> {
        symbols::declarators(decl, &self.source)
    }

    pub fn in_main(&self, node: Node<'_>) -> bool {
        syntax::in_main(node, &self.source)
    }

    pub fn function_name(&self, def: Node<'_>) -> Option<&str> {
        syntax::function_name(def, &self.source)
    }

    pub fn operator_of(&self, node: Node<'_>) -> Option<&str> {
        syntax::operator_of(node, &self.source)
    }
}

impl std::fmt::Debug for ParsedUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParsedUnit")
            .field("path", &self.path)
            .field("bytes", &self.source.len())
            .finish()
    }
}
