use crate::common::{assert_dense, balanced, numbers_between, output, run};
use c_instrument::catalog::{logging, mutation};
use c_instrument::config::MutationTarget;
use c_instrument::InstrumentMode;

const MAIN: &str = r#"struct node { int value; struct node *next; };
int walk(struct node *n);
int pick(int *v, int k);

int main(void) {
  struct node tail = { 2, 0 };
  struct node head = { 1, &tail };
  int v[4] = {1, 2, 3, 4};
  return walk(&head) + pick(v, 2);
}
"#;

const LIB: &str = r#"struct node { int value; struct node *next; };

int walk(struct node *n) {
  int total = 0;
  while (n) {
    total = total + n->value * 2;
    n = n->next;
  }
  return total;
}

int pick(int *v, int k) {
  int m[2][3];
  m[1][k] = v[k - 1];
  return *v + m[1][k] % 3;
}
"#;

fn mutated() -> c_instrument::RunReport {
    run(
        vec![mutation::pass(&MutationTarget::ALL)],
        &[("main.c", MAIN), ("lib.c", LIB)],
    )
}

#[test]
fn every_hook_is_used_once_and_defined_where_used() {
    let report = mutated();
    let main = output(&report, "main.c");
    let lib = output(&report, "lib.c");

    for (category, tag) in mutation::HOOKS {
        let count = report.counters.count(category);
        let mut all = Vec::new();

        for text in [main, lib] {
            let mut uses = numbers_between(text, &format!(") {tag}"), ")");
            let mut defines = numbers_between(text, &format!("#define {tag}"), " \n");
            uses.sort_unstable();
            defines.sort_unstable();
            assert_eq!(uses, defines, "{tag}");
            all.extend(uses);
        }
        assert_dense(all, count, tag);
    }
    assert!(lib.starts_with("#define _MUTARR0 \n"));
}

#[test]
fn every_target_kind_is_hooked() {
    let report = mutated();
    for (category, tag) in mutation::HOOKS {
        assert!(report.counters.count(category) > 0, "no {tag} hooks");
    }
}

#[test]
fn wraps_keep_parentheses_balanced() {
    let report = mutated();
    for file in &report.files {
        assert!(balanced(file.output()), "{}", file.path.display());
    }
}

#[test]
fn main_keeps_its_indices_and_pointers() {
    let report = mutated();
    let main = output(&report, "main.c");

    assert!(!main.contains(") _MUTARR"));
    assert!(!main.contains(") _MUTPTR"));
    assert!(main.contains("struct node head = { 1, &tail };"));
}

#[test]
fn memory_logging_follows_hooked_dereferences() {
    let report = run(
        vec![
            mutation::pass(&[MutationTarget::Pointer]),
            logging::pass(Some(InstrumentMode::Memory)),
        ],
        &[("main.c", MAIN), ("lib.c", LIB)],
    );
    let lib = output(&report, "lib.c");

    assert!(lib.contains("_MUTPTR"));
    assert!(lib.contains(":VARREF_MEMORY:"));
    assert!(report.counters.count(c_instrument::Category::Mem) > 0);
}
