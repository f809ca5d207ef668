//! End-to-end tests for the `memory-hook` binary, grounded in the
//! teacher's `assert_cmd::Command::cargo_bin` + `predicates` idiom
//! (`memory-cli/tests/integration_tests.rs`), trimmed to this crate's
//! env-var-only configuration (no `--config` TOML flag).

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// One isolated `MEMORY_ROOT` per test, so parallel tests never share a
/// database.
fn cmd(root: &TempDir) -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("memory-hook").expect("binary memory-hook not found");
    cmd.env("MEMORY_ROOT", root.path());
    cmd
}

#[test]
fn help_lists_the_command_surface() {
    let root = TempDir::new().unwrap();
    cmd(&root)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("session-start"))
        .stdout(predicate::str::contains("post-edit"))
        .stdout(predicate::str::contains("validate"));
}

#[test]
fn version_reports_the_crate_version() {
    let root = TempDir::new().unwrap();
    cmd(&root)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn session_start_then_post_edit_succeeds_with_human_output() {
    let root = TempDir::new().unwrap();
    cmd(&root).args(["session-start", "setup-agent"]).assert().success();

    cmd(&root)
        .args(["post-edit", "src/lib.rs"])
        .assert()
        .success()
        .stdout(predicate::str::contains("post-edit"));
}

#[test]
fn post_edit_json_output_carries_reward_and_q_value() {
    let root = TempDir::new().unwrap();
    cmd(&root).args(["session-start", "setup-agent"]).assert().success();

    let output = cmd(&root)
        .args(["--format", "json", "post-edit", "src/lib.rs"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let parsed: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert!(parsed["reward"].is_number());
    assert!(parsed["q_value"].is_number());
}

#[test]
fn failed_edit_is_still_accepted_and_recorded() {
    let root = TempDir::new().unwrap();
    cmd(&root).args(["session-start", "setup-agent"]).assert().success();
    cmd(&root).args(["post-edit", "src/lib.rs", "--failed"]).assert().success();
}

#[test]
fn validate_on_a_fresh_install_exits_zero() {
    let root = TempDir::new().unwrap();
    cmd(&root).args(["session-start", "setup-agent"]).assert().success();
    cmd(&root).arg("validate").assert().success();
}

#[test]
fn diagnose_prints_a_per_check_breakdown() {
    let root = TempDir::new().unwrap();
    cmd(&root).args(["session-start", "setup-agent"]).assert().success();
    cmd(&root)
        .arg("diagnose")
        .assert()
        .success()
        .stdout(predicate::str::contains("Health report"))
        .stdout(predicate::str::contains("Overall:"));
}

#[test]
fn pretrain_then_session_end_reports_patterns_created() {
    let root = TempDir::new().unwrap();
    cmd(&root).args(["session-start", "setup-agent"]).assert().success();
    cmd(&root)
        .args(["pretrain", "src/lib.rs", "src/main.rs"])
        .assert()
        .success()
        .stdout(predicate::str::contains("pretrain seeded 2 files"));
    cmd(&root).arg("session-end").assert().success();
}

#[test]
fn missing_required_argument_fails_with_usage_error() {
    let root = TempDir::new().unwrap();
    cmd(&root).arg("post-edit").assert().failure();
}
