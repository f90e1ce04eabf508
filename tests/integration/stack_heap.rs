use crate::common::{assert_dense, extern_len, flag_len, marker_ids, output, run};
use c_instrument::catalog::stack_heap::{self, FREE_1, INIT_ARR_1_UNINIT};
use c_instrument::catalog::{braces, logging};
use c_instrument::config::StackToHeapSection;
use c_instrument::Category;

const MAIN: &str = "int fill(int n);\n\nint main(void) {\n  int local[2] = {0, 1};\n  return fill(local[1]);\n}\n";

const LIB: &str = r#"int fill(int n) {
  int buf[8];
  int i;
  for (i = 0; i < 8; i++) buf[i] = i * n;
  if (n < 0) return -1;
  return buf[n % 8];
}
"#;

#[test]
fn relocation_composes_with_braces_and_logging() {
    let report = run(
        vec![
            braces::pass(),
            stack_heap::pass(&StackToHeapSection::default()),
            logging::pass(None),
        ],
        &[("main.c", MAIN), ("lib.c", LIB)],
    );
    let main = output(&report, "main.c");
    let lib = output(&report, "lib.c");

    assert!(lib.contains("int MUT_buf[8];\n/*I:ID0:VARDECLHEAP:int:buf:1:*/\ninit_arr_1_uninit(buf, MUT_buf, int)"));
    assert!(lib.contains("if (n < 0) {\n/*I:ID0:VARREF_FREE:int:buf:*/\nfree_1(buf, MUT_buf);\n"));
    assert_eq!(lib.matches("free_1(buf, MUT_buf);").count(), 1);
    assert!(main.contains("int local[2] = {0, 1};"));

    assert!(main.starts_with("#include<stdlib.h>\n"));
    assert!(lib.starts_with(&format!("#include<stdlib.h>\n{INIT_ARR_1_UNINIT}\n{FREE_1}\n")));
    assert!(!lib.contains("#define init_arr_2"));
    assert_eq!(extern_len(lib, "inst"), Some(report.counters.count(Category::Inst)));
    assert_eq!(flag_len(main, "free"), Some(report.counters.count(Category::Free)));
    assert_eq!(flag_len(main, "inst"), Some(report.counters.count(Category::Inst)));
}

#[test]
fn cubes_use_rank_three_helpers() {
    let lib = "int cube(int n) {\n  int c[2][3][4];\n  c[1][2][3] = n;\n  if (n) return c[1][2][3];\n  return 0;\n}\n";
    let report = run(
        vec![stack_heap::pass(&StackToHeapSection::default())],
        &[("main.c", MAIN), ("cube.c", lib)],
    );
    let cube = output(&report, "cube.c");

    assert!(cube.contains("int MUT_c[2][3][4];\n/*I:ID0:VARDECLHEAP:int [3][4]:c:3:*/\ninit_arr_3_uninit(c, MUT_c, int)"));
    assert!(cube.contains("/*I:ID0:VARREF_FREE:int [3][4]:c:*/\nfree_3(c, MUT_c);\nreturn 0;"));
    assert_eq!(cube.matches("free_3(c, MUT_c);").count(), 1);
    assert!(cube.contains("#define init_arr_3_uninit(arr1, arr2, arr_type)"));
    assert!(cube.contains("#define free_3(arr, arr2)"));
}

#[test]
fn heap_and_free_ids_are_dense() {
    let report = run(
        vec![stack_heap::pass(&StackToHeapSection::default())],
        &[("main.c", MAIN), ("lib.c", LIB)],
    );
    let lib = output(&report, "lib.c");

    assert_eq!(report.counters.count(Category::Heap), 1);
    assert_dense(marker_ids(lib, "VARDECLHEAP"), 1, "heap");
    assert_dense(
        marker_ids(lib, "VARREF_FREE"),
        report.counters.count(Category::Free),
        "free",
    );
}

#[test]
fn relocation_draw_is_reproducible() {
    let source = "void many(void) {\n  int a[1];\n  int b[2];\n  int c[3];\n  int d[4];\n  int e[5];\n  int f[6];\n  return;\n}\nint main(void) { many(); return 0; }\n";
    let config = StackToHeapSection {
        probability: 50,
        seed: 11,
        free_on_return: true,
    };

    let first = run(vec![stack_heap::pass(&config)], &[("main.c", source)]);
    let second = run(vec![stack_heap::pass(&config)], &[("main.c", source)]);

    assert_eq!(output(&first, "main.c"), output(&second, "main.c"));
    assert_eq!(
        first.counters.count(Category::Heap),
        second.counters.count(Category::Heap)
    );
}
