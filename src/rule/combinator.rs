//! Rule combinators.
//!
//! [`RuleSet::All`] lets every member fire independently.
//! [`RuleSet::FirstOf`] is an ordered alternative: for each root node only
//! the first member (in registration order) whose query, binders and filters
//! accept it fires.

use crate::rule::{Match, Rule, RuleError, Timing};
use crate::unit::ParsedUnit;
use std::cmp::Reverse;
use std::collections::HashSet;

pub enum RuleSet {
    Single(Rule),
    All(Vec<RuleSet>),
    FirstOf(Vec<Rule>),
}

/// A match waiting to be evaluated, tagged with its rule's registration index
/// within the pass.
#[derive(Debug)]
pub struct Candidate<'s, 't> {
    pub rule: &'s Rule,
    pub index: usize,
    pub m: Match<'t>,
}

impl<'s, 't> Candidate<'s, 't> {
    fn span(&self) -> (usize, usize) {
        let root = self.m.root();
        (root.start_byte(), root.end_byte())
    }
}

impl RuleSet {
    pub fn all(sets: impl IntoIterator<Item = RuleSet>) -> Self {
        RuleSet::All(sets.into_iter().collect())
    }

    pub fn first_of(rules: impl IntoIterator<Item = Rule>) -> Self {
        RuleSet::FirstOf(rules.into_iter().collect())
    }

    /// Every rule in registration order.
    pub fn rules(&self) -> Vec<&Rule> {
        let mut out = Vec::new();
        self.collect_rules(&mut out);
        out
    }

    fn collect_rules<'s>(&'s self, out: &mut Vec<&'s Rule>) {
        match self {
            RuleSet::Single(rule) => out.push(rule),
            RuleSet::All(sets) => sets.iter().for_each(|s| s.collect_rules(out)),
            RuleSet::FirstOf(rules) => out.extend(rules.iter()),
        }
    }

    pub fn len(&self) -> usize {
        self.rules().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Accepted matches of every rule with the given timing, unordered.
    /// `base` is the registration index of this set's first rule.
    pub fn candidates<'s, 't>(
        &'s self,
        unit: &'t ParsedUnit,
        timing: Timing,
        base: usize,
    ) -> Result<Vec<Candidate<'s, 't>>, RuleError> {
        let mut out = Vec::new();
        let mut next = base;
        self.collect(unit, timing, &mut next, &mut out)?;
        Ok(out)
    }

    fn collect<'s, 't>(
        &'s self,
        unit: &'t ParsedUnit,
        timing: Timing,
        next: &mut usize,
        out: &mut Vec<Candidate<'s, 't>>,
    ) -> Result<(), RuleError> {
        match self {
            RuleSet::Single(rule) => {
                let index = take_index(next);
                if rule.timing() == timing {
                    out.extend(
                        rule.find_matches(unit)?
                            .into_iter()
                            .map(|m| Candidate { rule, index, m }),
                    );
                }
            }
            RuleSet::All(sets) => {
                for set in sets {
                    set.collect(unit, timing, next, out)?;
                }
            }
            RuleSet::FirstOf(rules) => {
                let mut claimed = HashSet::new();
                for rule in rules {
                    let index = take_index(next);
                    if rule.timing() != timing {
                        continue;
                    }
                    let matches: Vec<_> = rule
                        .find_matches(unit)?
                        .into_iter()
                        .filter(|m| !claimed.contains(&m.root().id()))
                        .collect();
                    claimed.extend(matches.iter().map(|m| m.root().id()));
                    out.extend(matches.into_iter().map(|m| Candidate { rule, index, m }));
                }
            }
        }
        Ok(())
    }
}

impl From<Rule> for RuleSet {
    fn from(rule: Rule) -> Self {
        RuleSet::Single(rule)
    }
}

fn take_index(next: &mut usize) -> usize {
    let index = *next;
    *next += 1;
    index
}

/// Outer nodes first, then registration order.
pub fn sort_pre_order(candidates: &mut [Candidate<'_, '_>]) {
    candidates.sort_by_key(|c| {
        let (start, end) = c.span();
        (start, Reverse(end), c.index)
    });
}

/// Inner nodes first, then registration order.
pub fn sort_post_order(candidates: &mut [Candidate<'_, '_>]) {
    candidates.sort_by_key(|c| {
        let (start, end) = c.span();
        (end, Reverse(start), c.index)
    });
}
