//! CLI tests for the terrarunt binary.
//!
//! Spawns the binary against temporary stack trees. Commands that reach the
//! backend run with `--terraform-bin tflocal` so no AWS credentials are needed.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

fn write_stack(root: &Path, relative: &str, deps: &[&str], skip_on_destroy: bool) {
    let dir = root.join(relative);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("main.tf"), "").unwrap();
    fs::write(
        dir.join("backend.tf"),
        "terraform {\n  backend \"s3\" {}\n}\n",
    )
    .unwrap();

    let paths: Vec<String> = deps.iter().map(|d| format!("\"{}\"", d)).collect();
    let metadata = format!(
        r#"{{"dependencies": {{"paths": [{}]}}, "skip_on_destroy": {}}}"#,
        paths.join(", "),
        skip_on_destroy
    );
    fs::write(dir.join("dependencies.json"), metadata).unwrap();
}

fn sample_tree() -> TempDir {
    let temp = tempfile::tempdir().unwrap();
    write_stack(temp.path(), "state-file", &[], true);
    write_stack(temp.path(), "network/vpc", &[], false);
    write_stack(temp.path(), "data/db", &["../../network/vpc"], false);
    write_stack(temp.path(), "app", &["../data/db"], false);
    temp
}

fn terrarunt(root: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_terrarunt"))
        .arg("--env")
        .arg("dev")
        .arg("--root")
        .arg(root)
        .args(args)
        .env_remove("RUST_LOG")
        .env_remove("TERRARUNT_TERRAFORM_BIN")
        .output()
        .expect("run terrarunt")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn list_stacks_prints_every_stack() {
    let temp = sample_tree();
    let output = terrarunt(temp.path(), &["list-stacks"]);

    assert_eq!(output.status.code(), Some(0));
    let out = stdout(&output);
    assert!(out.contains("Found 4 stacks:"));
    assert!(out.contains("Path: ./network/vpc"));
    assert!(out.contains("[skip on destroy]"));
}

#[test]
fn list_stacks_json_is_parseable() {
    let temp = sample_tree();
    let output = terrarunt(temp.path(), &["list-stacks", "--json"]);

    assert_eq!(output.status.code(), Some(0));
    let stacks: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let names: Vec<&str> = stacks
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["app", "db", "state-file", "vpc"]);
}

#[test]
fn graph_json_orders_dependencies_first() {
    let temp = sample_tree();
    let output = terrarunt(temp.path(), &["graph", "--json"]);

    assert_eq!(output.status.code(), Some(0));
    let graph: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let order: Vec<&str> = graph["order"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s.as_str().unwrap())
        .collect();

    let position = |name: &str| order.iter().position(|n| *n == name).unwrap();
    assert!(position("vpc") < position("db"));
    assert!(position("db") < position("app"));
    assert_eq!(graph["skip_on_destroy"][0], "state-file");
}

#[test]
fn validate_passes_on_clean_tree() {
    let temp = sample_tree();
    let output = terrarunt(temp.path(), &["validate"]);

    assert_eq!(output.status.code(), Some(0));
    assert!(stdout(&output).contains("All stacks are valid"));
}

#[test]
fn validate_reports_missing_dependency() {
    let temp = sample_tree();
    write_stack(temp.path(), "orphan", &["../missing"], false);

    let output = terrarunt(temp.path(), &["validate"]);

    assert_eq!(output.status.code(), Some(1));
    assert!(stdout(&output).contains("issue"));
}

#[test]
fn graph_fails_on_cycle() {
    let temp = tempfile::tempdir().unwrap();
    write_stack(temp.path(), "a", &["../b"], false);
    write_stack(temp.path(), "b", &["../a"], false);

    let output = terrarunt(temp.path(), &["graph"]);

    assert_eq!(output.status.code(), Some(1));
    let err = String::from_utf8_lossy(&output.stderr);
    assert!(err.to_lowercase().contains("circular"), "stderr: {}", err);
}

#[test]
fn dry_run_plan_all_prints_summary() {
    let temp = sample_tree();
    let output = terrarunt(
        temp.path(),
        &["--dry-run", "--terraform-bin", "tflocal", "plan-all"],
    );

    assert_eq!(output.status.code(), Some(0));
    let out = stdout(&output);
    assert!(out.contains("plan completed: 4/4 successful"));
    assert!(out.contains("DRY RUN SUMMARY"));
    assert!(out.contains("4 command(s) would be executed"));
}

#[test]
fn unknown_stack_fails() {
    let temp = sample_tree();
    let output = terrarunt(
        temp.path(),
        &["--dry-run", "--terraform-bin", "tflocal", "plan", "--stack", "nope"],
    );

    assert_eq!(output.status.code(), Some(1));
    assert!(!stdout(&output).contains("DRY RUN SUMMARY"));
}

#[test]
fn dry_run_clean_all_keeps_artifacts() {
    let temp = sample_tree();
    let cache = temp.path().join("app/.terraform");
    fs::create_dir_all(&cache).unwrap();
    fs::write(cache.join("provider"), "binary").unwrap();

    let output = terrarunt(temp.path(), &["--dry-run", "clean-all"]);

    assert_eq!(output.status.code(), Some(0));
    assert!(stdout(&output).contains("CLEAN SUMMARY"));
    assert!(cache.exists());
}
