use crate::accumulator::ReplacementSet;
use crate::counters::Counters;
use crate::rule::matching::Match;
use crate::unit::ParsedUnit;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EvalError {
    #[error("rule {rule}: no binding named '{name}'")]
    Unbound { rule: &'static str, name: String },

    #[error("rule {rule}: {message}")]
    Invalid { rule: &'static str, message: String },
}

/// What a computation can see while it runs.
pub struct EvalContext<'a> {
    pub unit: &'a ParsedUnit,
    pub counters: &'a mut Counters,
    /// Replacements accepted for this file so far, earlier passes included
    pub accepted: &'a ReplacementSet,
}

/// Produces the text of one edit from a match.
///
/// `Ok(None)` means the match is disqualified for this edit; no counter may
/// be advanced in that case.
pub trait Computation {
    fn eval(&self, m: &Match<'_>, cx: &mut EvalContext<'_>) -> Result<Option<String>, EvalError>;
}

/// Fixed text.
#[derive(Debug, Clone)]
pub struct Literal(pub &'static str);

impl Computation for Literal {
    fn eval(&self, _m: &Match<'_>, _cx: &mut EvalContext<'_>) -> Result<Option<String>, EvalError> {
        Ok(Some(self.0.to_string()))
    }
}
