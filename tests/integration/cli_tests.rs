//! CLI integration tests
//!
//! These tests verify that the CLI works correctly with various options.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Get the path to the test fixtures directory
fn fixtures_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn copy_dir(from: &Path, to: &Path) {
    fs::create_dir_all(to).unwrap();
    for entry in fs::read_dir(from).unwrap() {
        let entry = entry.unwrap();
        let target = to.join(entry.file_name());
        if entry.file_type().unwrap().is_dir() {
            copy_dir(&entry.path(), &target);
        } else {
            fs::copy(entry.path(), &target).unwrap();
        }
    }
}

fn project() -> TempDir {
    let dir = TempDir::new().unwrap();
    copy_dir(&fixtures_path().join("flutter_app"), dir.path());
    dir
}

fn cli() -> Command {
    Command::cargo_bin("manifestpatch").unwrap()
}

fn manifest_path(root: &Path) -> PathBuf {
    root.join("android/app/src/main/AndroidManifest.xml")
}

// ============================================================================
// Basic CLI Tests
// ============================================================================

#[test]
fn test_cli_help() {
    cli()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("apply"))
        .stdout(predicate::str::contains("extract"))
        .stdout(predicate::str::contains("permissions"));
}

#[test]
fn test_cli_apply_help_explains_managed_keys() {
    cli()
        .args(["apply", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("managed"))
        .stdout(predicate::str::contains("iosPermissions"));
}

#[test]
fn test_cli_version() {
    cli()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("manifestpatch"));
}

#[test]
fn test_cli_missing_project_fails() {
    cli()
        .args(["permissions", "/definitely/not/a/project"])
        .assert()
        .failure();
}

// ============================================================================
// Read-only commands
// ============================================================================

#[test]
fn test_cli_permissions() {
    let dir = project();
    cli()
        .arg("permissions")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("android.permission.INTERNET"));
}

#[test]
fn test_cli_extract_empty_project_state() {
    let dir = project();
    cli()
        .args(["extract", "--format", "json"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::starts_with("[]"));
}

// ============================================================================
// Apply
// ============================================================================

#[test]
fn test_cli_apply_then_extract() {
    let dir = project();
    let state = fixtures_path().join("state_full.json");

    cli()
        .arg("apply")
        .arg(dir.path())
        .arg("--state")
        .arg(&state)
        .assert()
        .success()
        .stdout(predicate::str::contains("Saved"));

    let manifest = fs::read_to_string(manifest_path(dir.path())).unwrap();
    assert!(manifest.contains("android.permission.CAMERA"));

    cli()
        .args(["extract", "--format", "json"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("\"facebook\""))
        .stdout(predicate::str::contains("\"appId\": \"123\""))
        .stdout(predicate::str::contains("\"googleMaps\""));
}

#[test]
fn test_cli_apply_is_idempotent() {
    let dir = project();
    let state = fixtures_path().join("state_full.json");

    for _ in 0..2 {
        cli()
            .arg("apply")
            .arg(dir.path())
            .arg("--state")
            .arg(&state)
            .assert()
            .success();
    }

    cli()
        .arg("apply")
        .arg(dir.path())
        .arg("--state")
        .arg(&state)
        .assert()
        .success()
        .stdout(predicate::str::contains("No changes needed"));
}

#[test]
fn test_cli_dry_run_writes_nothing() {
    let dir = project();
    let before = fs::read_to_string(manifest_path(dir.path())).unwrap();

    cli()
        .arg("apply")
        .arg(dir.path())
        .arg("--state")
        .arg(fixtures_path().join("state_full.json"))
        .arg("--dry-run")
        .assert()
        .success()
        .stdout(predicate::str::contains("would update"))
        .stdout(predicate::str::contains("AndroidManifest.xml"));

    let after = fs::read_to_string(manifest_path(dir.path())).unwrap();
    assert_eq!(before, after);
}

#[test]
fn test_cli_apply_yaml_state() {
    let dir = project();

    cli()
        .arg("apply")
        .arg(dir.path())
        .arg("--state")
        .arg(fixtures_path().join("state_links.yaml"))
        .assert()
        .success();

    assert!(dir.path().join("ios/Runner/Runner.entitlements").exists());
    let manifest = fs::read_to_string(manifest_path(dir.path())).unwrap();
    assert!(manifest.contains("android:host=\"example.com\""));
}

#[test]
fn test_cli_bad_state_file_fails() {
    let dir = project();
    let state = dir.path().join("state.json");
    fs::write(&state, "{ not json").unwrap();

    cli()
        .arg("apply")
        .arg(dir.path())
        .arg("--state")
        .arg(&state)
        .assert()
        .failure();
}
