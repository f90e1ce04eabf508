//! Thread-local parser pooling.
//!
//! Creates a C parser on first use per thread and reuses it for every later
//! parse on that thread.

use crate::ts::{CParser, TreeSitterError};
use std::cell::RefCell;

thread_local! {
    static C_PARSER: RefCell<Option<CParser>> = const { RefCell::new(None) };
}

/// Execute function with pooled parser instance.
///
/// # Example
///
/// ```no_run
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use c_instrument::pool::with_parser;
///
/// let tree = with_parser(|parser| parser.parse("int main(void) { return 0; }"))??;
/// assert_eq!(tree.root_node().kind(), "translation_unit");
/// # Ok(())
/// # }
/// ```
pub fn with_parser<F, R>(f: F) -> Result<R, TreeSitterError>
where
    F: FnOnce(&mut CParser) -> R,
{
    C_PARSER.with(|cell| {
        let mut slot = cell.borrow_mut();
        let parser = match slot.take() {
            Some(parser) => parser,
            None => CParser::new()?,
        };
        Ok(f(slot.insert(parser)))
    })
}
