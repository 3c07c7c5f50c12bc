//! Smoke tests for the payg-flow binary
//!
//! Runs go against the simulated storefront so no browser is needed.

#![allow(deprecated)] // Command::cargo_bin
#![allow(clippy::expect_used, clippy::unwrap_used)]

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn payg_flow() -> Command {
    let mut cmd = Command::cargo_bin("payg-flow").expect("payg-flow binary should exist");
    cmd.env_remove("PAYG_FLOW_DEBUG").env_remove("RUST_LOG");
    cmd
}

// ============================================================================
// Basic CLI Tests
// ============================================================================

#[test]
fn test_version_flag() {
    payg_flow()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("0.3.0"));
}

#[test]
fn test_help_lists_subcommands() {
    payg_flow()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("list"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_no_args_fails() {
    payg_flow().assert().failure();
}

// ============================================================================
// list / config
// ============================================================================

#[test]
fn test_list_default_matrix() {
    payg_flow()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("h0-p0"))
        .stdout(predicate::str::contains("h5-p0"));
}

#[test]
fn test_list_steps_for_one_scenario() {
    payg_flow()
        .args(["list", "-s", "1:0", "--steps"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Selecting phone #1"))
        .stdout(predicate::str::contains("h0-p0").not());
}

#[test]
fn test_config_defaults() {
    payg_flow()
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("https://www.vodafone.ie"))
        .stdout(predicate::str::contains("headless: true"));
}

#[test]
fn test_config_debug_flag() {
    payg_flow()
        .args(["config", "--debug"])
        .assert()
        .success()
        .stdout(predicate::str::contains("headless: false"));
}

#[test]
fn test_config_debug_env() {
    payg_flow()
        .env("PAYG_FLOW_DEBUG", "1")
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("headless: false"));
}

#[test]
fn test_config_file_scenarios() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("payg.yaml");
    fs::write(
        &path,
        "scenarios:\n  - handset_index: 2\n    plan_index: 1\n",
    )
    .unwrap();

    payg_flow()
        .args(["list", "-c"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("h2-p1"))
        .stdout(predicate::str::contains("h0-p0").not());
}

#[test]
fn test_config_file_unknown_key_fails() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("payg.yaml");
    fs::write(&path, "no_such_key: 1\n").unwrap();

    payg_flow()
        .args(["config", "-c"])
        .arg(&path)
        .assert()
        .failure();
}

// ============================================================================
// run --simulate
// ============================================================================

#[test]
fn test_simulated_run_passes() {
    let dir = TempDir::new().unwrap();
    let log = dir.path().join("log.log");
    let report = dir.path().join("report.json");

    payg_flow()
        .args(["run", "--simulate", "--no-video", "--color", "never", "-s", "0:0"])
        .arg("--log-file")
        .arg(&log)
        .arg("--report")
        .arg(&report)
        .assert()
        .success()
        .stdout(predicate::str::contains("PASSED"));

    let log_text = fs::read_to_string(&log).unwrap();
    assert!(log_text.contains("Expecting checkout"));
    let report_text = fs::read_to_string(&report).unwrap();
    assert!(report_text.contains("handset_index"));
}

#[test]
fn test_piped_stdout_gets_no_color_by_default() {
    let dir = TempDir::new().unwrap();

    payg_flow()
        .args(["run", "--simulate", "--no-video", "-s", "0:0"])
        .arg("--log-file")
        .arg(dir.path().join("log.log"))
        .assert()
        .success()
        .stdout(predicate::str::contains("PASSED"))
        .stdout(predicate::str::contains("\x1b[").not());
}

#[test]
fn test_simulated_run_missing_handset_fails() {
    let dir = TempDir::new().unwrap();

    payg_flow()
        .args([
            "run",
            "--simulate",
            "--simulate-handsets",
            "5",
            "--no-video",
            "--color",
            "never",
            "-s",
            "5:0",
        ])
        .arg("--log-file")
        .arg(dir.path().join("log.log"))
        .assert()
        .failure()
        .stdout(predicate::str::contains("HandsetSelect"))
        .stderr(predicate::str::contains("did not pass"));
}

#[test]
fn test_bad_scenario_fails() {
    payg_flow()
        .args(["run", "--simulate", "-s", "one:two"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid argument"));
}
