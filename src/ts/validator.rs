use crate::pool::with_parser;
use crate::ts::errors::TreeSitterError;
use crate::ts::parser::{error_nodes, ErrorNode};

/// Syntax errors present in `rewritten` that `original` did not have.
///
/// Offsets move during a rewrite, so errors are compared by their text.
pub fn introduced_errors(original: &str, rewritten: &str) -> Result<Vec<ErrorNode>, TreeSitterError> {
    let before = syntax_errors(original)?;
    let after = syntax_errors(rewritten)?;

    Ok(after
        .into_iter()
        .filter(|e| !before.iter().any(|o| o.text == e.text))
        .collect())
}

fn syntax_errors(source: &str) -> Result<Vec<ErrorNode>, TreeSitterError> {
    with_parser(|parser| {
        let tree = parser.parse(source)?;
        Ok::<_, TreeSitterError>(error_nodes(tree.root_node(), source))
    })?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn braces_wrap_introduces_nothing() {
        let original = "void f(int x) { if (x) x++; }";
        let rewritten = "void f(int x) { if (x) {\nx++;\n} }";
        assert!(introduced_errors(original, rewritten).unwrap().is_empty());
    }

    #[test]
    fn unbalanced_wrap_is_reported() {
        let original = "void f(int x) { if (x) x++; }";
        let rewritten = "void f(int x) { if (x) ((x) _T0++; }";
        assert!(!introduced_errors(original, rewritten).unwrap().is_empty());
    }
}
