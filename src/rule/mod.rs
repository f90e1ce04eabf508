//! Pattern rules: a structural query bound to edit-producing computations.
//!
//! A [`Rule`] is a tree-sitter query (which must capture `@root`), optional
//! binders that derive extra nodes from the captures, filters that accept or
//! reject the match, and a list of edits. Each edit anchors a
//! [`Computation`] before, after or over a bound node, or at the start of the
//! file.

pub mod combinator;
pub mod computation;
pub mod matching;

pub use combinator::{Candidate, RuleSet};
pub use computation::{Computation, EvalContext, EvalError, Literal};
pub use matching::Match;

use crate::edit::Replacement;
use crate::ts::{QueryEngine, TreeSitterError};
use crate::unit::ParsedUnit;
use std::collections::HashSet;
use thiserror::Error;
use tree_sitter::Node;

/// Accepts or rejects a match.
pub type Filter = for<'t> fn(&Match<'t>, &'t ParsedUnit) -> bool;

/// Derives a node from the bindings so far; `None` rejects the match.
pub type Binder = for<'t> fn(&Match<'t>, &'t ParsedUnit) -> Option<Node<'t>>;

#[derive(Error, Debug)]
pub enum RuleError {
    #[error("rule {rule}: {source}")]
    Query {
        rule: &'static str,
        #[source]
        source: TreeSitterError,
    },
}

/// Where an edit lands relative to a bound node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    Before(&'static str),
    After(&'static str),
    Replace(&'static str),
    StartOfFile,
}

/// When a rule runs within its pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Timing {
    /// During the traversal of every file
    #[default]
    Traversal,
    /// After the traversal of all files, once counters are final
    Late,
}

pub struct EditSpec {
    pub anchor: Anchor,
    pub computation: Box<dyn Computation>,
}

pub struct Rule {
    name: &'static str,
    query: String,
    binders: Vec<(&'static str, Binder)>,
    filters: Vec<Filter>,
    edits: Vec<EditSpec>,
    timing: Timing,
}

impl Rule {
    pub fn new(name: &'static str, query: impl Into<String>) -> Self {
        Self {
            name,
            query: query.into(),
            binders: Vec::new(),
            filters: Vec::new(),
            edits: Vec::new(),
            timing: Timing::Traversal,
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn bind(mut self, name: &'static str, binder: Binder) -> Self {
        self.binders.push((name, binder));
        self
    }

    pub fn insert_before(self, capture: &'static str, computation: impl Computation + 'static) -> Self {
        self.edit(Anchor::Before(capture), computation)
    }

    pub fn insert_after(self, capture: &'static str, computation: impl Computation + 'static) -> Self {
        self.edit(Anchor::After(capture), computation)
    }

    pub fn replace(self, capture: &'static str, computation: impl Computation + 'static) -> Self {
        self.edit(Anchor::Replace(capture), computation)
    }

    pub fn at_start_of_file(self, computation: impl Computation + 'static) -> Self {
        self.edit(Anchor::StartOfFile, computation)
    }

    pub fn late(mut self) -> Self {
        self.timing = Timing::Late;
        self
    }

    fn edit(mut self, anchor: Anchor, computation: impl Computation + 'static) -> Self {
        self.edits.push(EditSpec {
            anchor,
            computation: Box::new(computation),
        });
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn timing(&self) -> Timing {
        self.timing
    }

    /// Every accepted match in `unit`, at most one per root node, in the
    /// order the query reports them.
    pub fn find_matches<'t>(&self, unit: &'t ParsedUnit) -> Result<Vec<Match<'t>>, RuleError> {
        let engine = QueryEngine::new(&self.query).map_err(|source| RuleError::Query {
            rule: self.name,
            source,
        })?;

        let mut seen = HashSet::new();
        let mut accepted = Vec::new();
        'matches: for qm in engine.find_all(unit.root(), unit.source()) {
            if !seen.insert(qm.root.id()) {
                continue;
            }
            let mut m = Match::new(self.name, qm.root, qm.captures);
            for (name, binder) in &self.binders {
                match binder(&m, unit) {
                    Some(node) => m.bind(name, node),
                    None => continue 'matches,
                }
            }
            if self.filters.iter().all(|f| f(&m, unit)) {
                accepted.push(m);
            }
        }
        Ok(accepted)
    }

    /// Run every edit computation of `m`. An `Err` means none of the
    /// match's edits may be kept.
    pub fn evaluate(&self, m: &Match<'_>, cx: &mut EvalContext<'_>) -> Result<Vec<Replacement>, EvalError> {
        let mut out = Vec::with_capacity(self.edits.len());
        for spec in &self.edits {
            let (offset, length) = match spec.anchor {
                Anchor::Before(name) => (m.node(name)?.start_byte(), 0),
                Anchor::After(name) => (m.node(name)?.end_byte(), 0),
                Anchor::Replace(name) => {
                    let node = m.node(name)?;
                    (node.start_byte(), node.end_byte() - node.start_byte())
                }
                Anchor::StartOfFile => (0, 0),
            };
            if let Some(text) = spec.computation.eval(m, cx)? {
                out.push(Replacement::new(offset, length, text));
            }
        }
        Ok(out)
    }
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("name", &self.name)
            .field("timing", &self.timing)
            .field("edits", &self.edits.len())
            .finish()
    }
}
