//! Integration tests for the command-line interface: run, check and list.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

const MAIN: &str = "int twice(int x);\n\nint main(void) {\n  int v = 2;\n  if (v > 1) v = twice(v);\n  return v;\n}\n";

const LIB: &str = "int twice(int x) {\n  if (x < 0) return 0;\n  return x * 2;\n}\n";

/// Helper to create a source tree with two C files and a non-C file
fn setup_source_tree() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("src")).unwrap();
    fs::write(dir.path().join("src/main.c"), MAIN).unwrap();
    fs::write(dir.path().join("src/lib.c"), LIB).unwrap();
    fs::write(dir.path().join("src/notes.txt"), "if (x) y;\n").unwrap();
    dir
}

fn c_instrument(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_c-instrument"))
        .args(args)
        .current_dir(dir)
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

fn read(dir: &Path, path: &str) -> String {
    fs::read_to_string(dir.join(path)).unwrap()
}

#[test]
fn test_help_lists_commands() {
    let dir = TempDir::new().unwrap();
    let output = c_instrument(dir.path(), &["--help"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("run"));
    assert!(stdout.contains("check"));
    assert!(stdout.contains("list"));
}

#[test]
fn test_list_shows_passes_and_modes() {
    let dir = TempDir::new().unwrap();
    let output = c_instrument(dir.path(), &["list"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for name in ["braces", "instrument", "mutate", "stack-to-heap"] {
        assert!(stdout.contains(name), "missing pass {name}");
    }
    assert!(stdout.contains("array-pointer-index"));
    assert!(stdout.contains("divider"));
}

#[test]
fn test_run_rewrites_in_place() {
    let dir = setup_source_tree();
    let output = c_instrument(dir.path(), &["run", "src", "--passes", "braces"]);

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Rewrote"));
    assert!(stdout.contains("2 rewritten"));

    assert!(read(dir.path(), "src/main.c").contains("if (v > 1) {\nv = twice(v);\n}"));
    assert!(read(dir.path(), "src/lib.c").contains("if (x < 0) {\nreturn 0;\n}"));
    assert_eq!(read(dir.path(), "src/notes.txt"), "if (x) y;\n");
}

#[test]
fn test_dry_run_leaves_files_untouched() {
    let dir = setup_source_tree();
    let output = c_instrument(dir.path(), &["run", "src", "-n", "--diff"]);

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("DRY RUN"));
    assert!(stdout.contains("Would rewrite"));
    assert!(stdout.contains("+/*I::*/ int print_flag_inst["));

    assert_eq!(read(dir.path(), "src/main.c"), MAIN);
    assert_eq!(read(dir.path(), "src/lib.c"), LIB);
}

#[test]
fn test_check_reports_json() {
    let dir = setup_source_tree();
    let output = c_instrument(
        dir.path(),
        &["check", "src/lib.c", "src/main.c", "--mode", "integer", "--json"],
    );

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();

    let files = report["files"].as_array().unwrap();
    assert_eq!(files.len(), 2);
    assert!(files.iter().all(|f| f["status"] == "rewritten"));
    assert_eq!(report["passes"], serde_json::json!(["braces", "instrument"]));
    assert_eq!(read(dir.path(), "src/lib.c"), LIB);
}

#[test]
fn test_config_file_and_overrides() {
    let dir = setup_source_tree();
    fs::write(
        dir.path().join("run.toml"),
        "[run]\npasses = [\"braces\", \"mutate\"]\n\n[mutate]\ntargets = [\"pointer\"]\n",
    )
    .unwrap();

    let output = c_instrument(
        dir.path(),
        &["run", "src", "-c", "run.toml", "--targets", "integer"],
    );

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let lib = read(dir.path(), "src/lib.c");
    assert!(lib.contains("return ((x) _INTOPL0) * ((2) _INTOPR0);"));
    assert!(lib.starts_with("#define _INTOPL0 \n#define _INTOPR0 \n"));
    assert!(!read(dir.path(), "src/main.c").contains("_INTOP"));
}

#[test]
fn test_invalid_override_is_rejected() {
    let dir = setup_source_tree();
    let output = c_instrument(
        dir.path(),
        &["run", "src", "--passes", "stack-to-heap", "--mutate-prob", "150"],
    );

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("out of range"));
    assert_eq!(read(dir.path(), "src/main.c"), MAIN);
}

#[test]
fn test_syntax_errors_abandon_the_file() {
    let dir = setup_source_tree();
    fs::write(dir.path().join("src/broken.c"), "int f( { return 0 }\n").unwrap();

    let output = c_instrument(dir.path(), &["run", "src", "--passes", "braces"]);

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Abandoned"));
    assert_eq!(read(dir.path(), "src/broken.c"), "int f( { return 0 }\n");
    assert!(read(dir.path(), "src/lib.c").contains("{\nreturn 0;\n}"));
}

#[test]
fn test_paths_outside_the_root_are_refused() {
    let dir = setup_source_tree();
    let output = c_instrument(dir.path(), &["run", "../", "--root", "src"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("outside the source root"));
}

#[test]
fn test_no_sources_is_an_error() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("readme.txt"), "nothing here\n").unwrap();

    let output = c_instrument(dir.path(), &["run", "."]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("No C sources found"));
}
