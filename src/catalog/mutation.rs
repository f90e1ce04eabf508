//! Mutation hooks: the `mutate` pass.
//!
//! Each target expression is wrapped as `((<expr>) _TAG<n>)`. Every file
//! gets an empty `#define` for each hook it uses, so the program behaves as
//! before until a hook is redefined. The pass runs post-order: inner
//! targets take their IDs and closers first, which keeps nested wraps
//! balanced.

use crate::catalog::{
    enclosing_slot, in_main_file, inserted_numbers, not_in_main, outside_declaration, under_unary, FILE_START,
};
use crate::config::MutationTarget;
use crate::counters::Category;
use crate::pipeline::Pass;
use crate::rule::{Computation, EvalContext, EvalError, Literal, Match, Rule, RuleSet};
use crate::unit::syntax::{has_ancestor_kind, identifiers_in};
use crate::unit::ParsedUnit;
use std::collections::BTreeSet;

pub const NAME: &str = "mutate";

/// Hook categories with their macro prefix, in macro-block order.
pub const HOOKS: [(Category, &str); 4] = [
    (Category::MutArr, "_MUTARR"),
    (Category::MutPtr, "_MUTPTR"),
    (Category::IntOpL, "_INTOPL"),
    (Category::IntOpR, "_INTOPR"),
];

pub fn pass(targets: &[MutationTarget]) -> Pass {
    let mut pass = Pass::new(NAME);
    for target in MutationTarget::ALL {
        if !targets.contains(&target) {
            continue;
        }
        pass = match target {
            MutationTarget::ArrayIndex => pass.with(array_index()),
            MutationTarget::Pointer => pass.with(pointer()),
            MutationTarget::Integer => pass.with(integer()),
        };
    }
    pass.with(macro_block()).post_order()
}

fn array_index() -> Rule {
    Rule::new(
        "mutate-array-index",
        "(subscript_expression argument: (_) @base index: (_) @index) @root",
    )
    .filter(in_main_file)
    .filter(outermost_subscript)
    .filter(not_in_main)
    .filter(outside_declaration)
    .filter(base_names_something)
    .insert_before("index", Literal("(("))
    .insert_after("index", Hook(Category::MutArr, "_MUTARR"))
}

fn pointer() -> RuleSet {
    RuleSet::first_of([
        Rule::new(
            "mutate-pointer-deref",
            "(pointer_expression argument: (_) @target) @root",
        )
        .bind("stmt", enclosing_slot)
        .filter(in_main_file)
        .filter(not_in_main)
        .filter(outside_declaration)
        .filter(is_deref)
        .filter(not_stepped)
        .insert_before("target", Literal("(("))
        .insert_after("target", Hook(Category::MutPtr, "_MUTPTR")),
        Rule::new(
            "mutate-pointer-member",
            "(field_expression argument: (_) @target) @root",
        )
        .bind("stmt", enclosing_slot)
        .filter(in_main_file)
        .filter(not_in_main)
        .filter(outside_declaration)
        .insert_before("target", Literal("(("))
        .insert_after("target", Hook(Category::MutPtr, "_MUTPTR")),
    ])
}

fn integer() -> Rule {
    Rule::new(
        "mutate-integer",
        "(binary_expression left: (_) @left right: (_) @right) @root",
    )
    .filter(in_main_file)
    .filter(integer_operator)
    .filter(not_loop_header)
    .insert_before("left", Literal("(("))
    .insert_after("left", Hook(Category::IntOpL, "_INTOPL"))
    .insert_before("right", Literal("(("))
    .insert_after("right", Hook(Category::IntOpR, "_INTOPR"))
}

fn macro_block() -> Rule {
    Rule::new("mutate-macros", FILE_START)
        .at_start_of_file(HookMacros)
        .late()
}

fn outermost_subscript(m: &Match<'_>, _unit: &ParsedUnit) -> bool {
    !has_ancestor_kind(m.root(), &["subscript_expression"])
}

fn base_names_something(m: &Match<'_>, _unit: &ParsedUnit) -> bool {
    m.get("base").is_some_and(|base| !identifiers_in(base).is_empty())
}

fn is_deref(m: &Match<'_>, unit: &ParsedUnit) -> bool {
    unit.operator_of(m.root()) == Some("*")
}

fn not_stepped(m: &Match<'_>, unit: &ParsedUnit) -> bool {
    !under_unary(m.root(), "++", unit.source()) && !under_unary(m.root(), "--", unit.source())
}

fn integer_operator(m: &Match<'_>, unit: &ParsedUnit) -> bool {
    matches!(
        unit.operator_of(m.root()),
        Some("+" | "-" | "*" | "/" | "<<" | ">>" | "%")
    )
}

fn not_loop_header(m: &Match<'_>, _unit: &ParsedUnit) -> bool {
    m.root().parent().is_some_and(|p| p.kind() != "for_statement")
}

/// Closing half of a hook: `) _TAG<n>)`.
struct Hook(Category, &'static str);

impl Computation for Hook {
    fn eval(&self, _m: &Match<'_>, cx: &mut EvalContext<'_>) -> Result<Option<String>, EvalError> {
        let id = cx.counters.next(self.0);
        Ok(Some(format!(") {}{id})", self.1)))
    }
}

/// Empty definitions for the hooks used in this file.
struct HookMacros;

impl Computation for HookMacros {
    fn eval(&self, _m: &Match<'_>, cx: &mut EvalContext<'_>) -> Result<Option<String>, EvalError> {
        let mut block = String::new();
        for (_, tag) in HOOKS {
            let closer = format!(") {tag}");
            let used: BTreeSet<u32> = inserted_numbers(cx.accepted, &closer).map(|(id, _)| id).collect();
            for id in used {
                block.push_str(&format!("#define {tag}{id} \n"));
            }
        }
        Ok((!block.is_empty()).then_some(block))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{Pipeline, RunReport};

    fn mutate(targets: &[MutationTarget], source: &str) -> RunReport {
        let mut pipeline = Pipeline::builder().pass(pass(targets)).build();
        pipeline
            .instrument(vec![("t.c".into(), source.to_string())])
            .unwrap()
    }

    fn balanced(text: &str) -> bool {
        let mut depth = 0i32;
        for c in text.chars() {
            match c {
                '(' => depth += 1,
                ')' => depth -= 1,
                _ => {}
            }
            if depth < 0 {
                return false;
            }
        }
        depth == 0
    }

    /// Expands every hook to nothing and drops parentheses and whitespace.
    fn erase_hooks(text: &str) -> String {
        let body: String = text
            .lines()
            .filter(|line| !line.starts_with("#define _"))
            .collect::<Vec<_>>()
            .join("\n");
        let mut out = String::new();
        let mut rest = body.as_str();
        while !rest.is_empty() {
            let tag = ["_MUTARR", "_MUTPTR", "_INTOPL", "_INTOPR"]
                .into_iter()
                .find(|t| rest.starts_with(t));
            if let Some(tag) = tag {
                rest = rest[tag.len()..].trim_start_matches(|c: char| c.is_ascii_digit());
                continue;
            }
            let mut chars = rest.chars();
            if let Some(c) = chars.next() {
                if !c.is_whitespace() && c != '(' && c != ')' {
                    out.push(c);
                }
            }
            rest = chars.as_str();
        }
        out
    }

    #[test]
    fn empty_hooks_leave_the_program_unchanged() {
        let source = "struct S { int v; };\nint k(int *a, int i, struct S *s) {\n  return a[i - 1] * s->v + (i << 2);\n}\nint main(void) { return 0; }\n";
        let report = mutate(&MutationTarget::ALL, source);
        let out = report.files[0].output();

        assert_ne!(out, source);
        assert_eq!(erase_hooks(out), erase_hooks(source));
    }

    #[test]
    fn array_indices_outside_main() {
        let report = mutate(
            &[MutationTarget::ArrayIndex],
            "int f(int *a, int i) {\n  return a[i] + a[a[i]];\n}\nint main(void) { int b[2] = {0, 1}; return f(b, b[0]); }\n",
        );

        assert_eq!(
            report.files[0].output(),
            "#define _MUTARR0 \n#define _MUTARR1 \nint f(int *a, int i) {\n  return a[((i) _MUTARR0)] + a[((a[i]) _MUTARR1)];\n}\nint main(void) { int b[2] = {0, 1}; return f(b, b[0]); }\n"
        );
    }

    #[test]
    fn nested_pointer_hooks_close_inside_out() {
        let report = mutate(
            &[MutationTarget::Pointer],
            "struct S { int v; };\nint g(int **p, struct S *s) {\n  return **p + s->v;\n}\n",
        );
        let out = report.files[0].output();

        assert!(out.contains("return *((*((p) _MUTPTR0)) _MUTPTR1) + ((s) _MUTPTR2)->v;"));
        assert!(out.starts_with("#define _MUTPTR0 \n#define _MUTPTR1 \n#define _MUTPTR2 \nstruct S"));
        assert_eq!(report.counters.count(Category::MutPtr), 3);
    }

    #[test]
    fn integer_operands_pair_left_and_right() {
        let report = mutate(
            &[MutationTarget::Integer],
            "int h(int a, int b, int c) {\n  return a + b * c;\n}\nint main(void) { return h(1, 2, 3) - 6; }\n",
        );
        let out = report.files[0].output();

        assert!(out.starts_with(
            "#define _INTOPL0 \n#define _INTOPL1 \n#define _INTOPL2 \n#define _INTOPR0 \n#define _INTOPR1 \n#define _INTOPR2 \n"
        ));
        assert!(out.contains("return ((a) _INTOPL1) + ((((b) _INTOPL0) * ((c) _INTOPR0)) _INTOPR1);"));
        assert!(out.contains("return ((h(1, 2, 3)) _INTOPL2) - ((6) _INTOPR2);"));
        assert!(balanced(out));
    }

    #[test]
    fn each_file_defines_the_hooks_it_uses() {
        let mut pipeline = Pipeline::builder().pass(pass(&MutationTarget::ALL)).build();
        let report = pipeline
            .instrument(vec![
                ("lib.c".into(), "int at(int *a, int i) {\n  return a[i];\n}\n".to_string()),
                ("main.c".into(), "int at(int *a, int i);\nint main(void) { int b[1] = {3}; return at(b, 0) - 3; }\n".to_string()),
            ])
            .unwrap();
        let lib = report.files[0].output();
        let main = report.files[1].output();

        assert_eq!(
            lib,
            "#define _MUTARR0 \nint at(int *a, int i) {\n  return a[((i) _MUTARR0)];\n}\n"
        );
        assert!(main.starts_with("#define _INTOPL0 \n#define _INTOPR0 \nint at"));
        assert!(!main.contains("_MUTARR"));
    }

    #[test]
    fn every_target_together_stays_balanced() {
        let report = mutate(
            &MutationTarget::ALL,
            "int k(int *a, int i, int **p) {\n  int s = 0;\n  for (int j = 0; j < i; j++) {\n    s += a[i + 1] * **p;\n  }\n  return s;\n}\nint main(void) { return 0; }\n",
        );
        let out = report.files[0].output();

        assert!(balanced(out));
        assert!(out.contains("a[((((i) _INTOPL"));
        assert_eq!(report.counters.count(Category::MutArr), 1);
        assert_eq!(report.counters.count(Category::MutPtr), 2);
        assert_eq!(
            report.counters.count(Category::IntOpL),
            report.counters.count(Category::IntOpR)
        );
    }
}
