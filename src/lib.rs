//! c-instrument: rule-driven source-to-source instrumentation of C programs
//!
//! Passes are built from declarative rules: a tree-sitter query, filters and
//! binders that narrow its matches, and computations that produce the text
//! to insert or substitute. Every pass reads the original tree of each file
//! and stages byte-span edits into a shift-merging [`ReplacementSet`]; a file
//! is rewritten once, after the last pass.
//!
//! # Architecture
//!
//! - [`unit`]: one parsed file, with its scope and type index
//! - [`rule`]: rules, rule sets and computations
//! - [`accumulator`]: conflict detection and shift-merge of edits
//! - [`counters`]: per-category marker IDs shared across files
//! - [`catalog`]: the built-in passes (braces, logging, mutation, stack-to-heap)
//! - [`pipeline`]: pass ordering, the run state machine and write-back
//!
//! # Guarantees
//!
//! - Edits in one file never overlap after merging
//! - Every marker ID handed out is paired with exactly one emitted marker
//! - A file that fails to parse is abandoned untouched
//! - Atomic file writes (tempfile + fsync + rename), skipped if the file
//!   changed on disk during the run
//!
//! # Example
//!
//! ```no_run
//! use c_instrument::{catalog, Pipeline, RunConfig};
//! use std::path::PathBuf;
//!
//! let config = RunConfig::default();
//! let mut pipeline = Pipeline::builder()
//!     .passes(catalog::passes_for(&config))
//!     .build();
//!
//! match pipeline.run_files(&[PathBuf::from("src/main.c")]) {
//!     Ok(report) => println!("{} file(s) rewritten", report.rewritten_count()),
//!     Err(e) => eprintln!("run failed: {e}"),
//! }
//! ```

pub mod accumulator;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod counters;
pub mod edit;
pub mod pipeline;
pub mod pool;
pub mod rule;
pub mod safety;
pub mod ts;
pub mod unit;

// Re-exports
pub use accumulator::{ConflictError, ReplacementSet};
pub use config::{load_from_path, load_from_str, ConfigError, InstrumentMode, PassName, RunConfig};
pub use counters::{Category, Counters};
pub use edit::{EditError, Replacement};
pub use pipeline::{FileReport, FileStatus, Pass, Pipeline, PipelineError, RunReport, RunState};
pub use rule::{Computation, EvalContext, EvalError, Match, Rule, RuleSet};
pub use safety::{SafetyError, SourceGuard};
pub use unit::{ParsedUnit, UnitError};
