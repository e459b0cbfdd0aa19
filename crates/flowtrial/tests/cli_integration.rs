//! CLI integration tests for the flowtrial command-line interface.
//!
//! These tests verify:
//! - Help text is displayed correctly
//! - Argument parsing works as expected
//! - Invalid references are rejected before anything is changed
//! - Local workflows can be added without a hosting service
//!
//! None of them need `gh` or network access.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// A flowtrial command isolated from the user's configuration.
fn flowtrial(config_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("flowtrial").unwrap();
    cmd.env("FLOWTRIAL_CONFIG_DIR", config_dir.path());
    cmd.env_remove("FLOWTRIAL_DIR");
    cmd
}

// ─────────────────────────────────────────────────────────────────────────────
// Help and Version Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_help_displays() {
    let config = TempDir::new().unwrap();
    flowtrial(&config)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("flowtrial"))
        .stdout(predicate::str::contains("sandbox"));
}

#[test]
fn test_version_displays() {
    let config = TempDir::new().unwrap();
    flowtrial(&config)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("flowtrial"));
}

#[test]
fn test_help_lists_subcommands() {
    let config = TempDir::new().unwrap();
    flowtrial(&config)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("add"))
        .stdout(predicate::str::contains("trial"));
}

#[test]
fn test_trial_help_lists_flags() {
    let config = TempDir::new().unwrap();
    flowtrial(&config)
        .args(["trial", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--host-repo"))
        .stdout(predicate::str::contains("--clone-repo"))
        .stdout(predicate::str::contains("--logical-repo"))
        .stdout(predicate::str::contains("--repeat"))
        .stdout(predicate::str::contains("--dry-run"))
        .stdout(predicate::str::contains("--trigger-context"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Argument Parsing Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_add_requires_reference() {
    let config = TempDir::new().unwrap();
    flowtrial(&config)
        .arg("add")
        .assert()
        .failure()
        .stderr(predicate::str::contains("required"));
}

#[test]
fn test_unknown_subcommand_fails() {
    let config = TempDir::new().unwrap();
    flowtrial(&config).arg("launch").assert().failure();
}

#[test]
fn test_repeat_must_be_a_number() {
    let config = TempDir::new().unwrap();
    flowtrial(&config)
        .args(["trial", "./w.md", "--repeat", "twice"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Resolution Errors
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_malformed_reference_names_expected_shapes() {
    let config = TempDir::new().unwrap();
    let project = TempDir::new().unwrap();
    flowtrial(&config)
        .arg("--dir")
        .arg(project.path())
        .args(["add", "octo/agents"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid workflow reference"))
        .stderr(predicate::str::contains("owner/repo/name[@ref]"));
}

#[test]
fn test_remote_wildcard_rejected() {
    let config = TempDir::new().unwrap();
    let project = TempDir::new().unwrap();
    flowtrial(&config)
        .arg("--dir")
        .arg(project.path())
        .args(["add", "octo/agents/workflows/*.md"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("wildcards only supported for local"));
}

#[test]
fn test_missing_local_workflow() {
    let config = TempDir::new().unwrap();
    let project = TempDir::new().unwrap();
    flowtrial(&config)
        .arg("--dir")
        .arg(project.path())
        .args(["add", "./missing.md"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Local Add
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_add_local_workflow_without_compiling() {
    let config = TempDir::new().unwrap();
    let project = TempDir::new().unwrap();
    std::fs::create_dir_all(project.path().join("drafts/shared")).unwrap();
    std::fs::write(
        project.path().join("drafts/triage.md"),
        "---\non: issues\n---\nTriage.\n@include shared/labels.md\n",
    )
    .unwrap();
    std::fs::write(project.path().join("drafts/shared/labels.md"), "Labels.\n").unwrap();

    flowtrial(&config)
        .arg("--dir")
        .arg(project.path())
        .args(["add", "./drafts/triage.md", "--no-compile"])
        .assert()
        .success()
        .stdout(predicate::str::contains("triage"));

    let installed = project.path().join(".github/workflows/triage.md");
    assert!(installed.is_file());
    assert!(
        project
            .path()
            .join(".github/workflows/shared/labels.md")
            .is_file()
    );

    // A second add without --force refuses to overwrite
    flowtrial(&config)
        .arg("--dir")
        .arg(project.path())
        .args(["add", "./drafts/triage.md", "--no-compile"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn test_add_json_output() {
    let config = TempDir::new().unwrap();
    let project = TempDir::new().unwrap();
    std::fs::write(project.path().join("w.md"), "Hello.\n").unwrap();

    flowtrial(&config)
        .arg("--dir")
        .arg(project.path())
        .args(["--json", "add", "./w.md", "--no-compile"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"installed\""))
        .stdout(predicate::str::contains("\"w\""));
}
