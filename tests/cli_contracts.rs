//! Surface contracts of the binary: help text, exit codes, output formats.

use junction::core::branch::{BranchDirectory, BranchRecord, DirectoryMetadata};
use junction::core::store::{self, Store};
use regex::Regex;
use std::fs;
use std::path::Path;
use std::process::{Command, Output, Stdio};
use tempfile::TempDir;

fn setup_workspace() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let ws = tmp.path();
    let flow_root = ws.join("core").join("flow");
    fs::create_dir_all(flow_root.join("apps")).unwrap();
    fs::write(
        flow_root.join("apps").join("flow.sh"),
        "#!/bin/sh\necho 'commands: create'\n",
    )
    .unwrap();
    let directory = BranchDirectory {
        metadata: DirectoryMetadata::default(),
        branches: vec![BranchRecord::ad_hoc("flow", &flow_root)],
    };
    let store = Store::at(ws);
    store::write_json_atomic(&store.branch_directory_path(), &directory).unwrap();
    tmp
}

fn junction(ws: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_junction"))
        .env("JUNCTION_WORKSPACE", ws)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .expect("failed to execute junction")
}

#[test]
fn help_lists_every_internal_command() {
    let tmp = setup_workspace();
    let output = junction(tmp.path(), &["help"]);
    assert!(output.status.success());
    let help = String::from_utf8_lossy(&output.stdout).to_string();
    for command in [
        "scan", "activate", "list", "edit", "remove", "refresh", "systems", "run",
    ] {
        let re = Regex::new(&format!(r"(?m)^\s+{}\s+", regex::escape(command)))
            .expect("valid help regex");
        assert!(re.is_match(&help), "help missing command: {}", command);
    }
}

#[test]
fn no_arguments_prints_module_index() {
    let tmp = setup_workspace();
    let output = junction(tmp.path(), &[]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("internal modules"));
    assert!(stdout.contains("scan"));
}

#[test]
fn version_prints_a_semver() {
    let tmp = setup_workspace();
    let output = junction(tmp.path(), &["version"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let re = Regex::new(r"^v\d+\.\d+\.\d+").unwrap();
    assert!(re.is_match(stdout.trim()), "stdout: {}", stdout);
}

#[test]
fn missing_required_argument_is_a_usage_error() {
    let tmp = setup_workspace();
    let output = junction(tmp.path(), &["remove"]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn scan_without_target_or_all_is_a_usage_error() {
    let tmp = setup_workspace();
    let output = junction(tmp.path(), &["scan"]);
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("--all"), "stderr: {}", stderr);
}

#[test]
fn list_json_format_is_parseable() {
    let tmp = setup_workspace();
    let output = junction(tmp.path(), &["list", "--format", "json"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let parsed: serde_json::Value = serde_json::from_str(&stdout).expect("list --format json");
    assert!(parsed.as_array().is_some());
}

#[test]
fn systems_lists_directory_branches() {
    let tmp = setup_workspace();
    let output = junction(tmp.path(), &["systems"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("@flow"), "stdout: {}", stdout);
    assert!(stdout.contains("registered:"), "stdout: {}", stdout);
}

#[test]
fn doctor_passes_on_a_fresh_workspace() {
    let tmp = setup_workspace();
    let output = junction(tmp.path(), &["doctor"]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("branch directory"));
    assert!(!stdout.contains("[FAIL]"), "stdout: {}", stdout);
}

#[test]
fn doctor_flags_corrupt_registry_without_touching_it() {
    let tmp = setup_workspace();
    let store = Store::at(tmp.path());
    fs::create_dir_all(store.central_dir()).unwrap();
    fs::write(store.central_registry_path(), "{ bad json").unwrap();

    let output = junction(tmp.path(), &["doctor"]);
    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("[FAIL]"), "stdout: {}", stdout);
    // read-only: the corrupt file is reported, not healed
    assert_eq!(
        fs::read_to_string(store.central_registry_path()).unwrap(),
        "{ bad json"
    );
}

#[test]
fn remove_unknown_phrase_exits_one_with_warning_line() {
    let tmp = setup_workspace();
    let output = junction(tmp.path(), &["remove", "ghost", "phrase"]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("shortcut not activated"), "stderr: {}", stderr);
}
