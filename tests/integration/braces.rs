use crate::common::{assert_dense, marker_ids, output, run};
use c_instrument::catalog::{braces, logging};
use c_instrument::Category;

const PROGRAM: &str = r#"#include <stdio.h>

static int clamp(int x, int lo, int hi) {
  if (x < lo) return lo;
  else if (x > hi) return hi;
  return x;
}

int sum(int *v, int n) {
  int s = 0;
  int i;
  for (i = 0; i < n; i++) s += v[i];
  while (s > 100) s -= 100;
  do s++; while (s < 3);
  switch (n) {
    case 0: s = -1; break;
    default: s = clamp(s, 0, 50);
  }
  return s;
}

int main(void) {
  int v[3] = {1, 2, 3};
  if (sum(v, 3) > 2) printf("big\n");
  return 0;
}
"#;

#[test]
fn canonicalization_is_idempotent_across_runs() {
    let once = run(vec![braces::pass()], &[("main.c", PROGRAM)]);
    let once = output(&once, "main.c").to_string();
    assert_ne!(once, PROGRAM);

    let twice = run(vec![braces::pass()], &[("main.c", once.as_str())]);
    assert_eq!(output(&twice, "main.c"), once);
}

#[test]
fn every_controlled_body_becomes_a_block() {
    let report = run(vec![braces::pass()], &[("main.c", PROGRAM)]);
    let out = output(&report, "main.c");

    assert!(out.contains("if (x < lo) {\nreturn lo;\n}"));
    assert!(out.contains("for (i = 0; i < n; i++) {\ns += v[i];\n}"));
    assert!(out.contains("while (s > 100) {\ns -= 100;\n}"));
    assert!(out.contains("do {\ns++;\n} while (s < 3);"));
    assert!(out.contains("case 0: {\ns = -1;\n} break;"));
    assert!(out.contains("if (sum(v, 3) > 2) {\nprintf(\"big\\n\");\n}"));
}

#[test]
fn statement_probes_land_inside_new_blocks() {
    let report = run(
        vec![logging::pass(None)],
        &[(
            "main.c",
            "int f(int x) {\n  int a = 0;\n  if (x > 0) a = 1;\n  return a;\n}\nint main(void) { return f(1); }\n",
        )],
    );
    let out = output(&report, "main.c");

    let at = out.find("if (x > 0) {\n\n/*I:ID").expect("probe outside the new block");
    assert!(out[at..].contains(":INSERTIONSITE:*/"));
    assert!(out[at..].contains("a = 1;\n}"));
}

#[test]
fn brace_markers_pair_up() {
    let report = run(vec![logging::pass(None)], &[("main.c", PROGRAM)]);
    let out = output(&report, "main.c");
    let count = report.counters.count(Category::Brace);

    assert!(count > 0);
    assert_dense(marker_ids(out, "BRACESTART"), count, "brace");
    assert_eq!(out.matches("/*I:ID:BRACEEND:*/").count() as u32, count);
}
