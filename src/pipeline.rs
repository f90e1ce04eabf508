//! Pass runner.
//!
//! A run parses every file once, then runs each [`Pass`] over every parsed
//! file in turn. All passes append to one [`ReplacementSet`] per file and see
//! the same original tree. Once every pass has finished the edits are applied
//! in one step per file; nothing is written before all outputs are known.

use crate::accumulator::{ConflictError, ReplacementSet};
use crate::catalog::braces;
use crate::counters::Counters;
use crate::edit::{write_back, EditError, WriteResult};
use crate::rule::combinator::{sort_post_order, sort_pre_order};
use crate::rule::{EvalContext, RuleError, RuleSet, Timing};
use crate::ts::introduced_errors;
use crate::unit::ParsedUnit;
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Order in which a pass visits matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TraversalOrder {
    /// Outer nodes before inner ones
    #[default]
    PreOrder,
    /// Inner nodes before outer ones
    PostOrder,
}

/// An ordered list of rule sets run as one traversal over every file.
pub struct Pass {
    name: &'static str,
    sets: Vec<RuleSet>,
    order: TraversalOrder,
    anchors_statements: bool,
    canonicalizes_braces: bool,
}

impl Pass {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            sets: Vec::new(),
            order: TraversalOrder::PreOrder,
            anchors_statements: false,
            canonicalizes_braces: false,
        }
    }

    pub fn with(mut self, set: impl Into<RuleSet>) -> Self {
        self.sets.push(set.into());
        self
    }

    pub fn post_order(mut self) -> Self {
        self.order = TraversalOrder::PostOrder;
        self
    }

    /// The pass inserts statements before existing ones and needs every
    /// control-flow body to be a block.
    pub fn anchors_statements(mut self) -> Self {
        self.anchors_statements = true;
        self
    }

    pub fn canonicalizes_braces(mut self) -> Self {
        self.canonicalizes_braces = true;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn order(&self) -> TraversalOrder {
        self.order
    }

    pub fn rule_count(&self) -> usize {
        self.sets.iter().map(RuleSet::len).sum()
    }
}

impl fmt::Debug for Pass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pass")
            .field("name", &self.name)
            .field("rules", &self.rule_count())
            .field("order", &self.order)
            .finish()
    }
}

/// Where a run is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    Idle,
    Parsing,
    Pass(usize),
    Applying,
    Done,
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Done | RunState::Failed)
    }

    fn can_advance_to(&self, next: RunState) -> bool {
        match (*self, next) {
            (from, RunState::Failed) => !from.is_terminal(),
            (RunState::Idle, RunState::Parsing) => true,
            (RunState::Parsing, RunState::Pass(0)) => true,
            (RunState::Parsing, RunState::Applying) => true,
            (RunState::Pass(i), RunState::Pass(j)) => j == i + 1,
            (RunState::Pass(_), RunState::Applying) => true,
            (RunState::Applying, RunState::Done) => true,
            _ => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("invalid run state transition {from:?} -> {to:?}")]
    InvalidTransition { from: RunState, to: RunState },

    #[error("pass {pass}: {source}")]
    Rule {
        pass: &'static str,
        #[source]
        source: RuleError,
    },

    #[error("{}: pass {pass}, rule {rule}: {source}", file.display())]
    Conflict {
        file: PathBuf,
        pass: &'static str,
        rule: &'static str,
        #[source]
        source: ConflictError,
    },

    #[error("{}: {source}", file.display())]
    Apply {
        file: PathBuf,
        #[source]
        source: EditError,
    },
}

/// Outcome for one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileStatus {
    /// Edits were applied (and written, unless in-memory or dry-run)
    Rewritten,
    /// No edit changed the text
    Unchanged,
    /// The file could not be read or parsed; no edits
    Abandoned { reason: String },
    /// Edits were computed but the write failed
    WriteFailed { reason: String },
}

impl FileStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, FileStatus::Abandoned { .. } | FileStatus::WriteFailed { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    #[serde(flatten)]
    pub status: FileStatus,
    pub edits: usize,
    pub skipped_matches: usize,
    pub introduced_errors: usize,
    #[serde(skip)]
    pub original: String,
    #[serde(skip)]
    pub rewritten: Option<String>,
}

impl FileReport {
    /// Text the file has after the run.
    pub fn output(&self) -> &str {
        self.rewritten.as_deref().unwrap_or(&self.original)
    }
}

impl fmt::Display for FileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.status {
            FileStatus::Rewritten => write!(f, "Rewrote {} ({} edits)", self.path.display(), self.edits),
            FileStatus::Unchanged => write!(f, "Unchanged {}", self.path.display()),
            FileStatus::Abandoned { reason } => {
                write!(f, "Abandoned {}: {}", self.path.display(), reason)
            }
            FileStatus::WriteFailed { reason } => {
                write!(f, "Write failed on {}: {}", self.path.display(), reason)
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub files: Vec<FileReport>,
    pub counters: Counters,
    pub passes: Vec<&'static str>,
}

impl RunReport {
    pub fn has_failures(&self) -> bool {
        self.files.iter().any(|f| f.status.is_failure())
    }

    pub fn rewritten_count(&self) -> usize {
        self.files
            .iter()
            .filter(|f| f.status == FileStatus::Rewritten)
            .count()
    }
}

#[derive(Debug, Default)]
pub struct PipelineBuilder {
    passes: Vec<Pass>,
    validate_output: bool,
    dry_run: bool,
}

impl PipelineBuilder {
    pub fn pass(mut self, pass: Pass) -> Self {
        self.passes.push(pass);
        self
    }

    pub fn passes(mut self, passes: impl IntoIterator<Item = Pass>) -> Self {
        self.passes.extend(passes);
        self
    }

    /// Re-parse every output and warn about syntax errors it introduced.
    pub fn validate_output(mut self, validate: bool) -> Self {
        self.validate_output = validate;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn build(self) -> Pipeline {
        let mut passes = self.passes;
        let first_anchored = passes.iter().position(|p| p.anchors_statements);
        let first_braced = passes.iter().position(|p| p.canonicalizes_braces);
        let needs_braces = match (first_anchored, first_braced) {
            (Some(anchored), Some(braced)) => braced > anchored,
            (Some(_), None) => true,
            (None, _) => false,
        };
        if needs_braces {
            debug!("inserting brace canonicalization ahead of statement-anchored passes");
            passes.insert(0, braces::pass());
        }

        Pipeline {
            passes,
            validate_output: self.validate_output,
            dry_run: self.dry_run,
            state: RunState::Idle,
        }
    }
}

pub struct Pipeline {
    passes: Vec<Pass>,
    validate_output: bool,
    dry_run: bool,
    state: RunState,
}

/// One input file: its text, or why it could not be read.
struct Input {
    path: PathBuf,
    text: Result<String, String>,
}

/// A parsed file and the edits accumulated for it.
struct FileRun {
    unit: ParsedUnit,
    edits: ReplacementSet,
    skipped: usize,
}

enum Slot {
    Parsed(FileRun),
    Abandoned {
        path: PathBuf,
        original: String,
        reason: String,
    },
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(Pass::name).collect()
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Run over in-memory sources. Nothing touches the filesystem.
    pub fn instrument(&mut self, files: Vec<(PathBuf, String)>) -> Result<RunReport, PipelineError> {
        let inputs = files
            .into_iter()
            .map(|(path, text)| Input {
                path,
                text: Ok(text),
            })
            .collect();
        self.execute(inputs, false)
    }

    /// Run over files on disk and write the results back, unless dry-run.
    pub fn run_files(&mut self, paths: &[PathBuf]) -> Result<RunReport, PipelineError> {
        let inputs = paths
            .iter()
            .map(|path| Input {
                path: path.clone(),
                text: fs::read_to_string(path).map_err(|e| e.to_string()),
            })
            .collect();
        let write = !self.dry_run;
        self.execute(inputs, write)
    }

    fn advance(&mut self, next: RunState) -> Result<(), PipelineError> {
        if !self.state.can_advance_to(next) {
            return Err(PipelineError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    fn fail(&mut self, err: PipelineError) -> PipelineError {
        if !self.state.is_terminal() {
            self.state = RunState::Failed;
        }
        err
    }

    fn execute(&mut self, inputs: Vec<Input>, write: bool) -> Result<RunReport, PipelineError> {
        self.state = RunState::Idle;
        self.advance(RunState::Parsing)?;

        let mut slots: Vec<Slot> = inputs.into_iter().map(parse).collect();
        let mut counters = Counters::new();

        for i in 0..self.passes.len() {
            self.advance(RunState::Pass(i))?;
            let pass = &self.passes[i];
            debug!(pass = pass.name, rules = pass.rule_count(), "running pass");

            let mut outcome = Ok(());
            'timings: for timing in [Timing::Traversal, Timing::Late] {
                for slot in slots.iter_mut() {
                    if let Slot::Parsed(file) = slot {
                        outcome = run_pass(pass, timing, file, &mut counters);
                        if outcome.is_err() {
                            break 'timings;
                        }
                    }
                }
            }
            if let Err(err) = outcome {
                return Err(self.fail(err));
            }
        }

        self.advance(RunState::Applying)?;
        let mut files = Vec::with_capacity(slots.len());
        for slot in slots {
            let report = match slot {
                Slot::Parsed(file) => match self.finish(file) {
                    Ok(report) => report,
                    Err(err) => return Err(self.fail(err)),
                },
                Slot::Abandoned {
                    path,
                    original,
                    reason,
                } => FileReport {
                    path,
                    status: FileStatus::Abandoned { reason },
                    edits: 0,
                    skipped_matches: 0,
                    introduced_errors: 0,
                    original,
                    rewritten: None,
                },
            };
            files.push(report);
        }

        if write {
            for report in files.iter_mut() {
                persist(report);
            }
        }

        self.advance(RunState::Done)?;
        let report = RunReport {
            files,
            counters,
            passes: self.pass_names(),
        };
        info!(
            files = report.files.len(),
            rewritten = report.rewritten_count(),
            failed = report.has_failures(),
            "run finished"
        );
        Ok(report)
    }

    /// Apply a file's edits to its original text.
    fn finish(&self, file: FileRun) -> Result<FileReport, PipelineError> {
        let FileRun {
            unit,
            edits,
            skipped,
        } = file;
        let original = unit.source().to_string();
        let rewritten = edits.apply(&original).map_err(|source| PipelineError::Apply {
            file: unit.path().to_path_buf(),
            source,
        })?;

        let mut introduced = 0;
        if self.validate_output && rewritten != original {
            match introduced_errors(&original, &rewritten) {
                Ok(errors) => {
                    introduced = errors.len();
                    if let Some(first) = errors.first() {
                        warn!(
                            file = %unit.path().display(),
                            count = errors.len(),
                            line = first.line,
                            column = first.column,
                            "rewrite introduced syntax errors"
                        );
                    }
                }
                Err(e) => warn!(file = %unit.path().display(), error = %e, "could not re-parse output"),
            }
        }

        let status = if rewritten == original {
            FileStatus::Unchanged
        } else {
            FileStatus::Rewritten
        };
        Ok(FileReport {
            path: unit.path().to_path_buf(),
            status,
            edits: edits.len(),
            skipped_matches: skipped,
            introduced_errors: introduced,
            rewritten: (rewritten != original).then_some(rewritten),
            original,
        })
    }
}

fn parse(input: Input) -> Slot {
    let Input { path, text } = input;
    let text = match text {
        Ok(text) => text,
        Err(reason) => {
            warn!(file = %path.display(), %reason, "abandoning unreadable file");
            return Slot::Abandoned {
                path,
                original: String::new(),
                reason,
            };
        }
    };
    match ParsedUnit::parse(&path, text.as_str()) {
        Ok(unit) => Slot::Parsed(FileRun {
            unit,
            edits: ReplacementSet::new(),
            skipped: 0,
        }),
        Err(e) => {
            warn!(file = %path.display(), error = %e, "abandoning file");
            Slot::Abandoned {
                path,
                original: text,
                reason: e.to_string(),
            }
        }
    }
}

/// Evaluate one pass's rules of the given timing over one file.
fn run_pass(
    pass: &Pass,
    timing: Timing,
    file: &mut FileRun,
    counters: &mut Counters,
) -> Result<(), PipelineError> {
    let unit = &file.unit;

    let mut candidates = Vec::new();
    let mut base = 0;
    for set in &pass.sets {
        let found = set
            .candidates(unit, timing, base)
            .map_err(|source| PipelineError::Rule {
                pass: pass.name,
                source,
            })?;
        candidates.extend(found);
        base += set.len();
    }
    match pass.order {
        TraversalOrder::PreOrder => sort_pre_order(&mut candidates),
        TraversalOrder::PostOrder => sort_post_order(&mut candidates),
    }
    debug!(
        pass = pass.name,
        file = %unit.path().display(),
        ?timing,
        matches = candidates.len(),
        "evaluating matches"
    );

    for candidate in candidates {
        let snapshot = counters.snapshot();
        let evaluated = {
            let mut cx = EvalContext {
                unit,
                counters: &mut *counters,
                accepted: &file.edits,
            };
            candidate.rule.evaluate(&candidate.m, &mut cx)
        };
        let replacements = match evaluated {
            Ok(replacements) => replacements,
            Err(e) => {
                warn!(file = %unit.path().display(), error = %e, "skipping match");
                counters.restore(snapshot);
                file.skipped += 1;
                continue;
            }
        };
        for replacement in replacements {
            file.edits
                .add(unit.source(), replacement)
                .map_err(|source| PipelineError::Conflict {
                    file: unit.path().to_path_buf(),
                    pass: pass.name,
                    rule: candidate.rule.name(),
                    source,
                })?;
        }
    }
    Ok(())
}

/// Write a rewritten file back, recording a failure in its status.
fn persist(report: &mut FileReport) {
    let Some(rewritten) = report.rewritten.as_deref() else {
        return;
    };
    let expected = crate::edit::Fingerprint::of(&report.original);
    match write_back(Path::new(&report.path), expected, rewritten) {
        Ok(WriteResult::Written { bytes, .. }) => {
            debug!(file = %report.path.display(), bytes, "wrote file");
        }
        Ok(WriteResult::Unchanged { .. }) => report.status = FileStatus::Unchanged,
        Err(e) => {
            warn!(file = %report.path.display(), error = %e, "write failed");
            report.status = FileStatus::WriteFailed {
                reason: e.to_string(),
            };
        }
    }
}
