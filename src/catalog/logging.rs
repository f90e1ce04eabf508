//! Declaration, entry and site logging: the `instrument` pass.
//!
//! Every non-entry block is bracketed by `BRACESTART`/`BRACEEND` markers,
//! every local declarator gets a `VARDECL` marker before its statement, every
//! statement slot of a non-entry function gets an `INST` probe, and every
//! non-entry function gets a `FUNCTIONENTER` marker before its first
//! statement. The value-flow rules of the selected mode run in the same pass.
//! The file defining `main` receives the probe flag arrays; every other file
//! declares the ones it writes to as `extern`.

use crate::catalog::probe::{extern_flag_array, flag_array, guarded, marker};
use crate::catalog::{enclosing_slot, in_main_file, inserted_anywhere, not_in_main, value_flow, FILE_START};
use crate::accumulator::ReplacementSet;
use crate::config::InstrumentMode;
use crate::counters::Category;
use crate::pipeline::Pass;
use crate::rule::{Computation, EvalContext, EvalError, Literal, Match, Rule};
use crate::unit::symbols::{function_type, storage_classes};
use crate::unit::syntax::{enclosing_function, first_statement, is_body, is_statement_slot};
use crate::unit::{CType, ParsedUnit};
use tree_sitter::Node;

pub const NAME: &str = "instrument";

/// Categories whose flag arrays the instrument pass declares, in order.
pub const FLAG_ARRAYS: [Category; 5] = [
    Category::Inst,
    Category::Int,
    Category::Mem,
    Category::Var,
    Category::Ptr,
];

const STATEMENTS: &str = r#"[
  (expression_statement)
  (compound_statement)
  (if_statement)
  (for_statement)
  (while_statement)
  (do_statement)
  (switch_statement)
  (return_statement)
  (break_statement)
  (continue_statement)
  (goto_statement)
  (labeled_statement)
  (declaration)
] @root"#;

pub fn pass(mode: Option<InstrumentMode>) -> Pass {
    let mut pass = Pass::new(NAME)
        .with(brace_log())
        .with(var_decl())
        .with(insertion_site());
    if let Some(mode) = mode {
        for set in value_flow::rule_sets(mode) {
            pass = pass.with(set);
        }
    }
    pass.with(function_entry())
        .with(flag_block())
        .anchors_statements()
}

fn brace_log() -> Rule {
    Rule::new("log-braces", "(compound_statement) @root")
        .filter(in_main_file)
        .filter(not_in_main)
        .insert_before("root", BraceStart)
        .insert_after("root", Literal("\n/*I:ID:BRACEEND:*/\n"))
}

fn var_decl() -> Rule {
    Rule::new("log-var-decl", "(declaration declarator: (_) @root)")
        .bind("stmt", enclosing_slot)
        .filter(in_main_file)
        .filter(has_local_storage)
        .insert_before("stmt", VarDeclMarker)
}

fn insertion_site() -> Rule {
    Rule::new("log-insertion-site", STATEMENTS)
        .filter(in_main_file)
        .filter(not_in_main)
        .filter(is_site)
        .insert_before("root", InsertionSite)
}

fn function_entry() -> Rule {
    Rule::new(
        "log-function-entry",
        "(function_definition body: (compound_statement) @body) @root",
    )
    .bind("stmt", body_first_statement)
    .filter(in_main_file)
    .filter(not_in_main)
    .insert_before("stmt", FunctionEntry)
}

fn flag_block() -> Rule {
    Rule::new("log-flag-arrays", FILE_START)
        .at_start_of_file(FlagArrays)
        .late()
}

/// A declarator of an automatic variable.
pub(crate) fn has_local_storage(m: &Match<'_>, unit: &ParsedUnit) -> bool {
    let Some(decl) = m.root().parent() else {
        return false;
    };
    enclosing_function(decl).is_some()
        && !storage_classes(decl, unit.source())
            .iter()
            .any(|s| matches!(*s, "static" | "extern"))
        && declared_type(unit, m.root()).is_some_and(|ty| !ty.is_function())
}

/// Type of the declarator `node` within its declaration.
pub(crate) fn declared_type(unit: &ParsedUnit, node: Node<'_>) -> Option<CType> {
    let decl = node.parent()?;
    unit.declarators(decl)
        .into_iter()
        .find(|d| d.node.id() == node.id())
        .map(|d| d.ty)
}

/// Name of the declarator `node`.
pub(crate) fn declared_name<'t>(unit: &'t ParsedUnit, node: Node<'t>) -> Option<&'t str> {
    let decl = node.parent()?;
    unit.declarators(decl)
        .into_iter()
        .find(|d| d.node.id() == node.id())
        .map(|d| unit.text(d.name))
}

/// Statement slots, except blocks serving as a body.
fn is_site(m: &Match<'_>, _unit: &ParsedUnit) -> bool {
    let stmt = m.root();
    is_statement_slot(stmt) && !(stmt.kind() == "compound_statement" && is_body(stmt))
}

fn body_first_statement<'t>(m: &Match<'t>, _unit: &'t ParsedUnit) -> Option<Node<'t>> {
    first_statement(m.get("body")?)
}

struct BraceStart;

impl Computation for BraceStart {
    fn eval(&self, _m: &Match<'_>, cx: &mut EvalContext<'_>) -> Result<Option<String>, EvalError> {
        let id = cx.counters.next(Category::Brace);
        Ok(Some(format!("\n{}\n", marker(Some(id), "BRACESTART", &[]))))
    }
}

struct VarDeclMarker;

impl Computation for VarDeclMarker {
    fn eval(&self, m: &Match<'_>, cx: &mut EvalContext<'_>) -> Result<Option<String>, EvalError> {
        let unit = cx.unit;
        let (Some(ty), Some(name)) = (declared_type(unit, m.root()), declared_name(unit, m.root())) else {
            return Ok(None);
        };
        let ty = ty.without_volatile();
        let id = cx.counters.next(Category::VarDecl);
        Ok(Some(format!("{}\n", marker(Some(id), "VARDECL", &[&ty.render(), name]))))
    }
}

struct InsertionSite;

impl Computation for InsertionSite {
    fn eval(&self, _m: &Match<'_>, cx: &mut EvalContext<'_>) -> Result<Option<String>, EvalError> {
        let id = cx.counters.next(Category::Inst);
        Ok(Some(format!(
            "\n{}{}",
            marker(Some(id), "INSERTIONSITE", &[]),
            guarded(Category::Inst, id, &format!("INST:{id}"), &[])
        )))
    }
}

struct FunctionEntry;

impl Computation for FunctionEntry {
    fn eval(&self, m: &Match<'_>, cx: &mut EvalContext<'_>) -> Result<Option<String>, EvalError> {
        let def = m.root();
        let Some(name) = cx.unit.function_name(def) else {
            return Ok(None);
        };
        let ret = match function_type(def, cx.unit.source()) {
            Some(CType::Function { ret, .. }) => ret.without_volatile().render(),
            _ => "int".to_string(),
        };
        let id = cx.counters.next(Category::FuncEnter);
        Ok(Some(format!("{}\n", marker(Some(id), "FUNCTIONENTER", &[&ret, name]))))
    }
}

struct FlagArrays;

impl Computation for FlagArrays {
    fn eval(&self, _m: &Match<'_>, cx: &mut EvalContext<'_>) -> Result<Option<String>, EvalError> {
        if cx.unit.defines_main() {
            return Ok(Some(
                FLAG_ARRAYS
                    .iter()
                    .map(|c| flag_array(*c, cx.counters.count(*c)))
                    .collect(),
            ));
        }
        let block: String = FLAG_ARRAYS
            .iter()
            .filter(|c| writes_flag(cx.accepted, **c))
            .map(|c| extern_flag_array(*c, cx.counters.count(*c)))
            .collect();
        Ok((!block.is_empty()).then_some(block))
    }
}

fn writes_flag(accepted: &ReplacementSet, category: Category) -> bool {
    inserted_anywhere(accepted, &format!("print_flag_{category}["))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{Pipeline, RunReport};

    fn instrument(source: &str) -> RunReport {
        let mut pipeline = Pipeline::builder().pass(pass(None)).build();
        pipeline
            .instrument(vec![("t.c".into(), source.to_string())])
            .unwrap()
    }

    #[test]
    fn logs_blocks_sites_declarations_and_entry() {
        let report = instrument(
            "int f(int a) {\n  int b = a;\n  return b;\n}\nint main(void) { return f(1); }\n",
        );
        let out = report.files[0].output();

        assert!(out.starts_with(
            "/*I::*/ int print_flag_inst[2];\n/*I::*/ int print_flag_int[0];\n/*I::*/ int print_flag_mem[0];\n/*I::*/ int print_flag_var[0];\n/*I::*/ int print_flag_ptr[0];\nint f(int a) \n/*I:ID0:BRACESTART:*/\n{"
        ));
        assert!(out.contains(
            "/*I:ID0:FUNCTIONENTER:int:f:*/\n\n/*I:ID0:INSERTIONSITE:*/if (print_flag_inst[0]!=2) {printf(\"INST:0\\n\");print_flag_inst[0]++;}\n/*I:ID0:VARDECL:int:b:*/\nint b = a;"
        ));
        assert!(out.contains("/*I:ID1:INSERTIONSITE:*/"));
        assert!(out.contains("}\n/*I:ID:BRACEEND:*/\n\nint main(void) { return f(1); }"));

        assert_eq!(report.counters.count(Category::Inst), 2);
        assert_eq!(report.counters.count(Category::Brace), 1);
        assert_eq!(report.counters.count(Category::FuncEnter), 1);
    }

    #[test]
    fn declaration_markers_cover_const_and_union() {
        let report = instrument(
            "union U { int i; };\nvoid g(void) {\n  const int c = 1;\n  union U u;\n  static int s;\n  for (int i = 0; i < 2; i++) { }\n}\n",
        );
        let out = report.files[0].output();

        assert_eq!(report.counters.count(Category::VarDecl), 3);
        assert!(out.contains("/*I:ID0:VARDECL:const int:c:*/\nconst int c = 1;"));
        assert!(out.contains("/*I:ID1:VARDECL:union U:u:*/\nunion U u;"));
        assert!(out.contains("/*I:ID2:VARDECL:int:i:*/\nfor (int i = 0;"));
        assert!(!out.contains(":s:*/"));
    }

    #[test]
    fn declarations_in_main_are_logged_but_main_has_no_sites() {
        let report = instrument("int main(void) {\n  int x[3];\n  return 0;\n}\n");
        let out = report.files[0].output();

        assert!(out.contains("/*I:ID0:VARDECL:int [3]:x:*/\nint x[3];"));
        assert!(!out.contains("INSERTIONSITE"));
        assert!(!out.contains("BRACESTART"));
        assert!(out.starts_with("/*I::*/ int print_flag_inst[0];\n"));
    }

    #[test]
    fn other_files_declare_the_flag_arrays_they_write() {
        let mut pipeline = Pipeline::builder().pass(pass(None)).build();
        let report = pipeline
            .instrument(vec![
                ("lib.c".into(), "void h(void) { h(); }\n".to_string()),
                ("main.c".into(), "int main(void) { return 0; }\n".to_string()),
                ("empty.c".into(), "int g;\n".to_string()),
            ])
            .unwrap();
        let lib = report.files[0].output();

        assert!(lib.starts_with("/*I::*/ extern int print_flag_inst[1];\nvoid h(void)"));
        assert!(!lib.contains("print_flag_int"));
        assert!(!lib.contains("/*I::*/ int print_flag_"));
        assert!(report.files[1]
            .output()
            .starts_with("/*I::*/ int print_flag_inst[1];\n"));
        assert_eq!(report.files[2].output(), "int g;\n");
    }
}
