pub mod loader;
pub mod schema;

pub use loader::{load_from_path, load_from_str, ConfigError};
pub use schema::{
    InstrumentMode, InstrumentSection, MutateSection, MutationTarget, OutputSection, PassName,
    RunConfig, RunSection, StackToHeapSection, ValidationError, ValidationIssue,
};
