//! Every ID a category hands out is emitted exactly once, and the flag array
//! declared in the file defining `main` is as long as the category's count.

use crate::common::{assert_dense, extern_len, flag_len, guarded_ids, marker_ids, output, run};
use c_instrument::catalog::logging;
use c_instrument::{Category, InstrumentMode};

const MAIN: &str = "int helper(int *p, int n);\nint scale(unsigned int a, int b);\n\nint main(void) {\n  int x = 3;\n  return helper(&x, 2) + scale(4u, 1);\n}\n";

const HELPER: &str = r#"int helper(int *p, int n) {
  int a[4];
  int *q;
  int i;
  q = p;
  a[0] = *q;
  if (n > 1)
    a[1] = n;
  for (i = 0; i < n; i++) {
    a[i] = i;
  }
  return a[0];
}
"#;

const SCALE: &str = "int scale(unsigned int a, int b) {\n  unsigned int r = a * 2 + b;\n  return (int)(r - 1);\n}\n";

fn files() -> [(&'static str, &'static str); 3] {
    [("main.c", MAIN), ("helper.c", HELPER), ("scale.c", SCALE)]
}

#[test]
fn insertion_sites_across_files() {
    let report = run(vec![logging::pass(None)], &files());
    let count = report.counters.count(Category::Inst);
    assert!(count > 0);

    let ids: Vec<u32> = ["main.c", "helper.c", "scale.c"]
        .iter()
        .flat_map(|name| guarded_ids(output(&report, name), "inst"))
        .collect();
    assert_dense(ids, count, "inst");

    let main = output(&report, "main.c");
    assert_eq!(flag_len(main, "inst"), Some(count));
    assert_eq!(guarded_ids(main, "inst"), Vec::<u32>::new());
    let helper = output(&report, "helper.c");
    assert_eq!(flag_len(helper, "inst"), None);
    assert_eq!(extern_len(helper, "inst"), Some(count));
}

#[test]
fn pointer_references_across_files() {
    let report = run(vec![logging::pass(Some(InstrumentMode::Pointer))], &files());
    let count = report.counters.count(Category::Ptr);
    assert!(count > 0);

    let ids: Vec<u32> = ["main.c", "helper.c", "scale.c"]
        .iter()
        .flat_map(|name| {
            let out = output(&report, name);
            let mut ids = marker_ids(out, "VARREF_POINTER");
            ids.extend(marker_ids(out, "VARREF_ASSIGN"));
            ids
        })
        .collect();
    assert_dense(ids, count, "ptr");
    assert_eq!(flag_len(output(&report, "main.c"), "ptr"), Some(count));
}

#[test]
fn integer_operands_across_files() {
    let report = run(vec![logging::pass(Some(InstrumentMode::Integer))], &files());
    let count = report.counters.count(Category::Int);
    assert!(count > 0);

    let ids: Vec<u32> = ["main.c", "helper.c", "scale.c"]
        .iter()
        .flat_map(|name| guarded_ids(output(&report, name), "int"))
        .collect();
    assert_dense(ids, count, "int");
    assert_eq!(flag_len(output(&report, "main.c"), "int"), Some(count));
}

#[test]
fn memory_and_variable_addresses_across_files() {
    let report = run(vec![logging::pass(Some(InstrumentMode::Memory))], &files());
    let main = output(&report, "main.c");

    for (category, name) in [(Category::Var, "var"), (Category::Mem, "mem")] {
        let count = report.counters.count(category);
        let ids: Vec<u32> = ["main.c", "helper.c", "scale.c"]
            .iter()
            .flat_map(|file| guarded_ids(output(&report, file), name))
            .collect();
        assert_dense(ids, count, name);
        assert_eq!(flag_len(main, name), Some(count));
    }
    assert!(report.counters.count(Category::Var) > 0);
}

#[test]
fn flag_arrays_are_declared_once_per_category() {
    let report = run(vec![logging::pass(Some(InstrumentMode::Pointer))], &files());
    let main = output(&report, "main.c");

    for name in ["inst", "int", "mem", "var", "ptr"] {
        let declaration = format!("/*I::*/ int print_flag_{name}[");
        assert_eq!(main.matches(declaration.as_str()).count(), 1, "{name}");
    }
    assert!(main.starts_with("/*I::*/ int print_flag_inst["));
}
