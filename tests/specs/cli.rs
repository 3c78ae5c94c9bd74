// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Supervisor CLI smoke tests.

use assert_cmd::Command;

fn cwk(dir: &tempfile::TempDir) -> Command {
    let mut cmd = Command::cargo_bin("cwk").expect("cwk binary");
    cmd.env("CW_STATE_DIR", dir.path());
    cmd.env_remove("CW_DEPLOYMENT");
    cmd.env_remove("CW_DEPLOYMENT_FILE");
    cmd
}

fn write_deployment(dir: &tempfile::TempDir) {
    std::fs::write(
        dir.path().join("deployments.toml"),
        r#"
[deployments.default.processes.sleeper]
command = "sleep"
args = ["30"]
"#,
    )
    .expect("write config");
}

#[test]
fn status_reports_stopped_processes() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_deployment(&dir);

    cwk(&dir)
        .arg("status")
        .assert()
        .success()
        .stdout(predicates::str::contains("sleeper: stopped"));
}

#[test]
fn start_status_stop_cycle() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_deployment(&dir);

    cwk(&dir)
        .args(["start", "sleeper"])
        .assert()
        .success()
        .stdout(predicates::str::contains("started"));

    cwk(&dir)
        .args(["status", "sleeper"])
        .assert()
        .success()
        .stdout(predicates::str::contains("running"));

    // ensure is a no-op while everything runs.
    cwk(&dir).arg("ensure").assert().success();

    cwk(&dir)
        .args(["stop", "sleeper"])
        .assert()
        .success()
        .stdout(predicates::str::contains("stopped"));

    // Idempotent stop.
    cwk(&dir)
        .args(["stop", "sleeper"])
        .assert()
        .success()
        .stdout(predicates::str::contains("not running"));
}

#[test]
fn missing_config_is_a_nonzero_exit() {
    let dir = tempfile::tempdir().expect("tempdir");
    cwk(&dir).arg("status").assert().failure();
}

#[test]
fn unknown_process_name_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_deployment(&dir);
    cwk(&dir).args(["start", "ghost"]).assert().failure();
}
