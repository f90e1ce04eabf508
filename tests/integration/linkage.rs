//! Every hook, helper and flag array an instrumented file refers to is
//! defined or declared in that same file.

use crate::common::{extern_len, flag_len, guarded_ids, numbers_between, output, run};
use c_instrument::catalog::{logging, mutation, stack_heap};
use c_instrument::config::{MutationTarget, StackToHeapSection};
use c_instrument::{InstrumentMode, RunReport};

const MAIN: &str = "int fill(int n);\n\nint main(void) {\n  int local[2] = {0, 1};\n  return fill(local[1] + 1);\n}\n";

const LIB: &str = r#"struct cell { int v; };

int fill(int n) {
  int buf[8];
  int grid[2][3];
  struct cell c = { 1 };
  struct cell *p = &c;
  int i;
  for (i = 0; i < 8; i++) buf[i] = i * n;
  grid[1][2] = buf[n % 8] - 1;
  if (n < 0) return p->v;
  return grid[1][n % 3] + *(&i);
}
"#;

const HELPERS: [&str; 9] = [
    "init_arr_1",
    "init_arr_2",
    "init_arr_3",
    "init_arr_1_uninit",
    "init_arr_2_uninit",
    "init_arr_3_uninit",
    "free_1",
    "free_2",
    "free_3",
];

fn instrumented() -> RunReport {
    run(
        vec![
            stack_heap::pass(&StackToHeapSection::default()),
            mutation::pass(&MutationTarget::ALL),
            logging::pass(Some(InstrumentMode::Integer)),
        ],
        &[("main.c", MAIN), ("lib.c", LIB)],
    )
}

fn assert_self_contained(report: &RunReport, name: &str) {
    let text = output(report, name);

    for (_, tag) in mutation::HOOKS {
        let mut uses = numbers_between(text, &format!(") {tag}"), ")");
        let mut defines = numbers_between(text, &format!("#define {tag}"), " \n");
        uses.sort_unstable();
        defines.sort_unstable();
        assert_eq!(uses, defines, "{name}: {tag}");
    }

    for flag in ["inst", "int", "mem", "var", "ptr"] {
        if !guarded_ids(text, flag).is_empty() {
            assert!(
                flag_len(text, flag).is_some() || extern_len(text, flag).is_some(),
                "{name}: print_flag_{flag} is not declared"
            );
        }
    }

    for helper in HELPERS {
        if text.contains(&format!("\n{helper}(")) {
            assert!(
                text.contains(&format!("#define {helper}(")),
                "{name}: {helper} is not defined"
            );
            assert!(text.starts_with("#include<stdlib.h>\n"), "{name}: no <stdlib.h>");
        }
    }
}

#[test]
fn every_file_declares_what_it_uses() {
    let report = instrumented();
    assert_self_contained(&report, "main.c");
    assert_self_contained(&report, "lib.c");
}

#[test]
fn the_file_without_main_carries_its_own_block() {
    let report = instrumented();
    let lib = output(&report, "lib.c");

    assert!(lib.contains("\ninit_arr_1_uninit(buf, MUT_buf, int)"));
    assert!(lib.contains("\ninit_arr_2_uninit(grid, MUT_grid, int)"));
    assert!(lib.contains("#define _MUTARR0 \n"));
    assert!(lib.contains("#define _INTOPL"));
    assert!(output(&report, "main.c").contains("#define _INTOPL0 \n"));
    assert_eq!(
        extern_len(lib, "inst"),
        Some(report.counters.count(c_instrument::Category::Inst))
    );
    assert_eq!(
        extern_len(lib, "int"),
        Some(report.counters.count(c_instrument::Category::Int))
    );
    assert_eq!(flag_len(lib, "inst"), None);
    assert!(!lib.contains("print_flag_free"));
}

#[test]
fn flag_arrays_stay_defined_once_in_main() {
    let report = instrumented();
    let main = output(&report, "main.c");
    let lib = output(&report, "lib.c");

    for flag in ["inst", "int", "mem", "var", "ptr", "free"] {
        let definition = format!("/*I::*/ int print_flag_{flag}[");
        assert_eq!(main.matches(definition.as_str()).count(), 1, "{flag}");
        assert!(!lib.contains(&definition), "{flag}");
        assert!(!main.contains(&format!("extern int print_flag_{flag}[")), "{flag}");
    }
}
