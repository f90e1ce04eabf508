//! Thread-local query compilation cache.
//!
//! Rule queries are compiled once per thread and shared through `Rc`.
//! The cache is capped at 256 entries; it is cleared when full.

use crate::ts::parser::c_language;
use crate::ts::TreeSitterError;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use tree_sitter::Query;

const MAX_CACHE_ENTRIES: usize = 256;

thread_local! {
    static QUERY_CACHE: RefCell<HashMap<String, Rc<Query>>> = RefCell::new(HashMap::new());
}

/// Get a compiled query from cache, or compile and cache it.
pub fn get_or_compile_query(query_str: &str) -> Result<Rc<Query>, TreeSitterError> {
    QUERY_CACHE.with(|cache| {
        let mut cache = cache.borrow_mut();

        if let Some(q) = cache.get(query_str) {
            return Ok(Rc::clone(q));
        }

        if cache.len() >= MAX_CACHE_ENTRIES {
            cache.clear();
        }

        let compiled = Query::new(&c_language(), query_str).map_err(|e| {
            TreeSitterError::InvalidQuery {
                message: e.to_string(),
            }
        })?;
        let compiled = Rc::new(compiled);
        cache.insert(query_str.to_string(), Rc::clone(&compiled));
        Ok(compiled)
    })
}

/// Clear the query cache (mainly for testing).
pub fn clear_cache() {
    QUERY_CACHE.with(|cache| cache.borrow_mut().clear());
}

pub fn cache_size() -> usize {
    QUERY_CACHE.with(|cache| cache.borrow().len())
}
