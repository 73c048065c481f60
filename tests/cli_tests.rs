//! Integration tests for the warren CLI surface: argument parsing,
//! registry validation, and read-only commands against temp project trees.

#![allow(clippy::expect_used)]

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn warren() -> Command {
    Command::cargo_bin("warren").expect("warren binary should exist")
}

/// A registry whose first agent carries explicit ports (a formula-computed
/// agent at index 0 would claim main's base ports).
const VALID_REGISTRY: &str = "\
project:
  name: themes
agents:
  - name: blue
    backendPort: 6899
    frontendPort: 3099
  - name: red
";

// --- Help and version ---

#[test]
fn test_cli_no_args_shows_help_and_exits_two() {
    // clap with arg_required_else_help shows help on stderr and exits 2
    warren()
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Isolated parallel dev workspaces"));
}

#[test]
fn test_cli_help_flag_shows_commands() {
    warren()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"))
        .stdout(predicate::str::contains("create"))
        .stdout(predicate::str::contains("sync"))
        .stdout(predicate::str::contains("validate-config"))
        .stdout(predicate::str::contains("delete"));
}

#[test]
fn test_cli_version_flag_shows_version() {
    warren()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("warren"));
}

#[test]
fn test_unknown_subcommand_fails() {
    warren()
        .arg("teleport")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized subcommand"));
}

// --- validate-config ---

#[test]
fn test_validate_config_accepts_valid_registry() {
    let dir = TempDir::new().expect("tempdir");
    std::fs::write(dir.path().join("warren.yaml"), VALID_REGISTRY).expect("write registry");
    warren()
        .args(["--root", &dir.path().to_string_lossy(), "validate-config"])
        .assert()
        .success()
        .stdout(predicate::str::contains("warren.yaml is valid"));
}

#[test]
fn test_validate_config_reports_every_violation() {
    let dir = TempDir::new().expect("tempdir");
    let invalid = "\
project:
  name: themes
agents:
  - name: blue
    backendPort: 80
  - name: blue
";
    std::fs::write(dir.path().join("warren.yaml"), invalid).expect("write registry");
    warren()
        .args(["--root", &dir.path().to_string_lossy(), "validate-config"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("duplicate agent name 'blue'"))
        .stderr(predicate::str::contains("out of range"));
}

#[test]
fn test_validate_config_detects_allocation_conflict_with_main() {
    // Agent at index 0 without explicit ports computes the base ports,
    // which belong to main.
    let dir = TempDir::new().expect("tempdir");
    let conflicting = "\
project:
  name: themes
agents:
  - name: blue
";
    std::fs::write(dir.path().join("warren.yaml"), conflicting).expect("write registry");
    warren()
        .args(["--root", &dir.path().to_string_lossy(), "validate-config"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("main"))
        .stderr(predicate::str::contains("blue"));
}

#[test]
fn test_validate_config_falls_back_without_registry_file() {
    let dir = TempDir::new().expect("tempdir");
    warren()
        .args(["--root", &dir.path().to_string_lossy(), "validate-config"])
        .assert()
        .success()
        .stdout(predicate::str::contains("conventional defaults"));
}

#[test]
fn test_validate_config_json_lists_all_workspaces() {
    let dir = TempDir::new().expect("tempdir");
    std::fs::write(dir.path().join("warren.yaml"), VALID_REGISTRY).expect("write registry");
    let output = warren()
        .args(["--root", &dir.path().to_string_lossy(), "--json", "validate-config"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let value: serde_json::Value = serde_json::from_slice(&output).expect("valid json");
    assert_eq!(value["valid"], true);
    assert_eq!(value["source"], "file");
    assert_eq!(value["project"], "themes");
    let workspaces = value["workspaces"].as_array().expect("workspaces array");
    assert_eq!(workspaces.len(), 3); // main + blue + red
    assert_eq!(workspaces[0]["name"], "main");
    assert_eq!(workspaces[0]["allocation"]["backend_port"], 6789);
    assert_eq!(workspaces[1]["allocation"]["backend_port"], 6899);
    // red at index 1: 6789 + 1*10
    assert_eq!(workspaces[2]["allocation"]["backend_port"], 6799);
    assert_eq!(workspaces[2]["allocation"]["database_name"], "themes_red");
}

#[test]
fn test_validate_config_json_failure_emits_error_object() {
    let dir = TempDir::new().expect("tempdir");
    let invalid = "\
project:
  name: themes
agents:
  - name: blue
    backendPort: 6899
  - name: blue
";
    std::fs::write(dir.path().join("warren.yaml"), invalid).expect("write registry");
    let output = warren()
        .args(["--root", &dir.path().to_string_lossy(), "--json", "validate-config"])
        .assert()
        .failure()
        .get_output()
        .stdout
        .clone();
    let value: serde_json::Value = serde_json::from_slice(&output).expect("valid json");
    assert_eq!(value["error"], true);
    assert_eq!(value["code"], "invalid_config");
    assert!(
        value["message"]
            .as_str()
            .expect("message")
            .contains("duplicate agent name 'blue'")
    );
}

// --- status ---

#[test]
fn test_status_json_marks_unprovisioned_workspaces() {
    let dir = TempDir::new().expect("tempdir");
    std::fs::write(dir.path().join("warren.yaml"), VALID_REGISTRY).expect("write registry");
    let output = warren()
        .args(["--root", &dir.path().to_string_lossy(), "--json", "status"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let value: serde_json::Value = serde_json::from_slice(&output).expect("valid json");
    let workspaces = value["workspaces"].as_array().expect("workspaces array");
    assert_eq!(workspaces.len(), 3);
    // main is the project root, which exists; agents are not provisioned.
    assert_eq!(workspaces[0]["exists"], true);
    assert_eq!(workspaces[1]["exists"], false);
    assert_eq!(workspaces[2]["exists"], false);
}

#[test]
fn test_status_reflects_persisted_service_records() {
    let dir = TempDir::new().expect("tempdir");
    std::fs::write(dir.path().join("warren.yaml"), VALID_REGISTRY).expect("write registry");
    let services = dir.path().join("workspaces/blue/.warren/services");
    std::fs::create_dir_all(&services).expect("mkdir");
    std::fs::write(
        services.join("backend.json"),
        r#"{"kind":"backend","state":"running","pid":4242,"container":null,"port":6899,"updated_at":"2026-08-25T12:00:00Z"}"#,
    )
    .expect("write record");

    let output = warren()
        .args(["--root", &dir.path().to_string_lossy(), "--json", "status"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let value: serde_json::Value = serde_json::from_slice(&output).expect("valid json");
    let blue = &value["workspaces"][1];
    assert_eq!(blue["name"], "blue");
    assert_eq!(blue["exists"], true);
    assert_eq!(blue["services"]["backend"], "running");
    assert_eq!(blue["services"]["frontend"], "stopped");
}

// --- guard rails ---

#[test]
fn test_sync_unknown_workspace_fails_with_hint() {
    let dir = TempDir::new().expect("tempdir");
    std::fs::write(dir.path().join("warren.yaml"), VALID_REGISTRY).expect("write registry");
    warren()
        .args(["--root", &dir.path().to_string_lossy(), "sync", "blue"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("warren create blue"));
}

#[test]
fn test_start_unknown_agent_name_fails_with_suggestion() {
    let dir = TempDir::new().expect("tempdir");
    std::fs::write(dir.path().join("warren.yaml"), VALID_REGISTRY).expect("write registry");
    warren()
        .args(["--root", &dir.path().to_string_lossy(), "start", "mauve"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown agent 'mauve'"));
}

#[test]
fn test_delete_main_is_refused() {
    let dir = TempDir::new().expect("tempdir");
    std::fs::write(dir.path().join("warren.yaml"), VALID_REGISTRY).expect("write registry");
    warren()
        .args(["--root", &dir.path().to_string_lossy(), "--yes", "delete", "main"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("refusing"));
}

#[test]
fn test_logs_unknown_service_fails() {
    let dir = TempDir::new().expect("tempdir");
    std::fs::write(dir.path().join("warren.yaml"), VALID_REGISTRY).expect("write registry");
    std::fs::create_dir_all(dir.path().join("workspaces/blue")).expect("mkdir");
    warren()
        .args(["--root", &dir.path().to_string_lossy(), "logs", "blue", "mailer"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown service 'mailer'"));
}

#[test]
fn test_logs_without_log_file_reports_info() {
    let dir = TempDir::new().expect("tempdir");
    std::fs::write(dir.path().join("warren.yaml"), VALID_REGISTRY).expect("write registry");
    std::fs::create_dir_all(dir.path().join("workspaces/blue")).expect("mkdir");
    warren()
        .args(["--root", &dir.path().to_string_lossy(), "logs", "blue", "backend"])
        .assert()
        .success()
        .stdout(predicate::str::contains("no log file yet"));
}
