//! Tree-sitter integration for the C front end.
//!
//! Parsing, structural queries and syntax validation over C source. The
//! grammar comes from `ast-grep-language`, so the tree-sitter version is
//! pinned to the one ast-grep links against.

pub mod errors;
pub mod parser;
pub mod query;
pub mod validator;

pub use errors::TreeSitterError;
pub use parser::{CParser, ErrorNode, ParsedSource};
pub use query::{QueryEngine, QueryMatch};
pub use validator::introduced_errors;
