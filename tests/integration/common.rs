use c_instrument::{Pass, Pipeline, RunReport};
use std::path::PathBuf;

/// Run `passes` over in-memory files, in the given order.
pub fn run(passes: Vec<Pass>, files: &[(&str, &str)]) -> RunReport {
    let mut pipeline = Pipeline::builder().passes(passes).build();
    let report = pipeline
        .instrument(
            files
                .iter()
                .map(|(name, text)| (PathBuf::from(*name), text.to_string()))
                .collect(),
        )
        .unwrap();
    assert!(!report.has_failures(), "run reported failures: {report:#?}");
    report
}

/// Output of the file named `name`.
pub fn output<'r>(report: &'r RunReport, name: &str) -> &'r str {
    report
        .files
        .iter()
        .find(|f| f.path.ends_with(name))
        .map(|f| f.output())
        .unwrap_or_else(|| panic!("no file named {name} in report"))
}

/// Leading decimal number of `text`.
fn number(text: &str) -> Option<u32> {
    let digits: String = text.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

/// Every `n` in `<prefix>n<suffix>`.
pub fn numbers_between(text: &str, prefix: &str, suffix: &str) -> Vec<u32> {
    let mut found = Vec::new();
    let mut rest = text;
    while let Some(at) = rest.find(prefix) {
        rest = &rest[at + prefix.len()..];
        if let Some(n) = number(rest) {
            let after = &rest[n.to_string().len()..];
            if after.starts_with(suffix) {
                found.push(n);
            }
        }
    }
    found
}

/// IDs of the guarded probes for flag array `category`.
pub fn guarded_ids(text: &str, category: &str) -> Vec<u32> {
    numbers_between(text, &format!("if (print_flag_{category}["), "]!=2)")
}

/// IDs of the `/*I:ID<n>:<tag>:` markers.
pub fn marker_ids(text: &str, tag: &str) -> Vec<u32> {
    numbers_between(text, "/*I:ID", &format!(":{tag}:"))
}

/// Declared length of flag array `category`, if defined in `text`.
pub fn flag_len(text: &str, category: &str) -> Option<u32> {
    numbers_between(text, &format!("/*I::*/ int print_flag_{category}["), "];")
        .first()
        .copied()
}

/// Length in the `extern` declaration of flag array `category`, if any.
pub fn extern_len(text: &str, category: &str) -> Option<u32> {
    numbers_between(text, &format!("/*I::*/ extern int print_flag_{category}["), "];")
        .first()
        .copied()
}

/// Assert `ids` is exactly `0..count`, each once.
pub fn assert_dense(mut ids: Vec<u32>, count: u32, what: &str) {
    ids.sort_unstable();
    let expected: Vec<u32> = (0..count).collect();
    assert_eq!(ids, expected, "{what} IDs are not 0..{count}");
}

pub fn balanced(text: &str) -> bool {
    let mut depth = 0i32;
    for c in text.chars() {
        match c {
            '(' | '{' => depth += 1,
            ')' | '}' => depth -= 1,
            _ => {}
        }
        if depth < 0 {
            return false;
        }
    }
    depth == 0
}
