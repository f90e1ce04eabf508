use crate::cache::get_or_compile_query;
use crate::ts::errors::TreeSitterError;
use std::rc::Rc;
use tree_sitter::{Node, Query, QueryCursor, StreamingIterator};

/// Name every rule query must give its root node.
pub const ROOT_CAPTURE: &str = "root";

/// One match of a query: the root node plus every named capture.
#[derive(Debug, Clone)]
pub struct QueryMatch<'tree> {
    pub root: Node<'tree>,
    pub captures: Vec<(String, Node<'tree>)>,
}

impl<'tree> QueryMatch<'tree> {
    pub fn capture(&self, name: &str) -> Option<Node<'tree>> {
        self.captures
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, node)| *node)
    }
}

/// Engine for executing a compiled tree-sitter query against C trees.
pub struct QueryEngine {
    query: Rc<Query>,
    root_index: u32,
}

impl QueryEngine {
    /// Compile (or fetch from the thread-local cache) a query.
    ///
    /// Queries use S-expression syntax and must capture `@root`:
    /// ```text
    /// (if_statement
    ///   consequence: (_) @stmt) @root
    /// ```
    pub fn new(query_str: &str) -> Result<Self, TreeSitterError> {
        let query = get_or_compile_query(query_str)?;
        let root_index = query
            .capture_index_for_name(ROOT_CAPTURE)
            .ok_or_else(|| TreeSitterError::MissingRoot {
                query: query_str.trim().to_string(),
            })?;

        Ok(Self { query, root_index })
    }

    /// Execute the query under `node` and return every match in the order
    /// tree-sitter reports them.
    pub fn find_all<'tree>(&self, node: Node<'tree>, source: &str) -> Vec<QueryMatch<'tree>> {
        let names = self.query.capture_names();
        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(&self.query, node, source.as_bytes());

        let mut results = Vec::new();
        while let Some(m) = matches.next() {
            let mut root = None;
            let mut captures = Vec::with_capacity(m.captures.len());
            for capture in m.captures {
                if capture.index == self.root_index {
                    root = Some(capture.node);
                }
                captures.push((names[capture.index as usize].to_string(), capture.node));
            }
            if let Some(root) = root {
                results.push(QueryMatch { root, captures });
            }
        }

        results
    }
}
