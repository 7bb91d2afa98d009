//! Exit-code and usage checks against the real binary.

use assert_cmd::Command;
use predicates::prelude::*;

fn cmd() -> Command {
    Command::cargo_bin("claude-workflow").unwrap()
}

#[test]
fn no_arguments_is_a_usage_error() {
    cmd().assert().failure().code(1);
}

#[test]
fn help_exits_successfully() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("claude-workflow"))
        .stdout(predicate::str::contains("start"))
        .stdout(predicate::str::contains("resume"));
}

#[test]
fn version_prints_package_version() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn unknown_subcommand_is_a_usage_error() {
    cmd().arg("frobnicate").assert().failure().code(1);
}

#[test]
fn list_with_empty_base_dir_succeeds() {
    let dir = tempfile::TempDir::new().unwrap();
    cmd()
        .arg("--base-dir")
        .arg(dir.path().join("state"))
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("no workflows"));
}

#[test]
fn status_of_missing_workflow_is_a_workflow_failure() {
    let dir = tempfile::TempDir::new().unwrap();
    cmd()
        .arg("--base-dir")
        .arg(dir.path().join("state"))
        .arg("status")
        .arg("nope")
        .assert()
        .failure()
        .code(2);
}

#[test]
fn invalid_workflow_name_is_a_usage_error() {
    let dir = tempfile::TempDir::new().unwrap();
    cmd()
        .arg("--base-dir")
        .arg(dir.path().join("state"))
        .arg("start")
        .arg("../escape")
        .arg("description")
        .assert()
        .failure()
        .code(1);
}
