// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::deployment::ProcessSpec;
use std::collections::BTreeMap;

fn sleeper_spec() -> ProcessSpec {
    ProcessSpec {
        command: "sleep".to_string(),
        args: vec!["30".to_string()],
        env: BTreeMap::new(),
        cwd: None,
    }
}

fn supervisor(dir: &tempfile::TempDir) -> Supervisor {
    Supervisor::new(dir.path(), "test")
}

#[test]
fn start_status_stop_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let sup = supervisor(&dir);

    let outcome = sup.start("sleeper", &sleeper_spec()).unwrap();
    let StartOutcome::Started(pid) = outcome else {
        panic!("expected a fresh start, got {outcome:?}");
    };
    assert_eq!(sup.status("sleeper"), ProcStatus::Running(pid));

    // Idempotent start.
    assert_eq!(sup.start("sleeper", &sleeper_spec()).unwrap(), StartOutcome::AlreadyRunning(pid));

    assert_eq!(sup.stop("sleeper").unwrap(), StopOutcome::Stopped);
    assert_eq!(sup.status("sleeper"), ProcStatus::Stopped);

    // Idempotent stop.
    assert_eq!(sup.stop("sleeper").unwrap(), StopOutcome::NotRunning);
}

#[test]
fn stale_pid_file_reads_as_stopped() {
    let dir = tempfile::tempdir().unwrap();
    let sup = supervisor(&dir);
    std::fs::create_dir_all(dir.path().join("run").join("test")).unwrap();
    // A pid that cannot exist.
    std::fs::write(dir.path().join("run").join("test").join("ghost.pid"), "999999999\n").unwrap();

    assert_eq!(sup.status("ghost"), ProcStatus::Stopped);
    assert_eq!(sup.stop("ghost").unwrap(), StopOutcome::NotRunning);
}

#[test]
fn missing_command_is_a_start_error() {
    let dir = tempfile::tempdir().unwrap();
    let sup = supervisor(&dir);
    let spec = ProcessSpec {
        command: "definitely-not-a-real-binary-cw".to_string(),
        args: vec![],
        env: BTreeMap::new(),
        cwd: None,
    };
    let err = sup.start("broken", &spec).unwrap_err();
    assert!(err.to_string().contains("broken"));
    assert_eq!(sup.status("broken"), ProcStatus::Stopped);
}

#[test]
fn process_output_lands_in_its_log_file() {
    let dir = tempfile::tempdir().unwrap();
    let sup = supervisor(&dir);
    let spec = ProcessSpec {
        command: "sh".to_string(),
        args: vec!["-c".to_string(), "echo hello-from-proc".to_string()],
        env: BTreeMap::new(),
        cwd: None,
    };
    sup.start("echoer", &spec).unwrap();
    // Give the one-shot process a moment to run and flush.
    std::thread::sleep(std::time::Duration::from_millis(300));

    let log = std::fs::read_to_string(dir.path().join("logs").join("test").join("echoer.log"))
        .unwrap();
    assert!(log.contains("hello-from-proc"));
}

#[test]
fn is_alive_sees_our_own_process() {
    assert!(is_alive(std::process::id()));
}
