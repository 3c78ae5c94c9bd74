// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process supervision: pid files, detached spawn, signal-based stop.

use crate::deployment::ProcessSpec;
use anyhow::{Context, Result};
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag};
use nix::unistd::Pid;
use std::fs;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

/// How long `stop` waits for a SIGTERM'd process before SIGKILL.
const STOP_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, PartialEq, Eq)]
pub enum StartOutcome {
    Started(u32),
    AlreadyRunning(u32),
}

#[derive(Debug, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    NotRunning,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ProcStatus {
    Running(u32),
    Stopped,
}

pub struct Supervisor {
    run_dir: PathBuf,
    logs_dir: PathBuf,
}

impl Supervisor {
    pub fn new(state_dir: &Path, deployment: &str) -> Self {
        Self {
            run_dir: state_dir.join("run").join(deployment),
            logs_dir: state_dir.join("logs").join(deployment),
        }
    }

    /// Start a process detached, with stdout/stderr appended to its log.
    /// Idempotent: a live pid file short-circuits.
    pub fn start(&self, name: &str, spec: &ProcessSpec) -> Result<StartOutcome> {
        if let Some(pid) = self.live_pid(name) {
            return Ok(StartOutcome::AlreadyRunning(pid));
        }
        fs::create_dir_all(&self.run_dir)?;
        fs::create_dir_all(&self.logs_dir)?;

        let log = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.logs_dir.join(format!("{name}.log")))
            .with_context(|| format!("cannot open log file for '{name}'"))?;
        let log_err = log.try_clone()?;

        let mut command = Command::new(&spec.command);
        command
            .args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            .process_group(0);
        if let Some(cwd) = &spec.cwd {
            command.current_dir(cwd);
        }

        let child = command
            .spawn()
            .with_context(|| format!("cannot start '{name}' ({})", spec.command))?;
        let pid = child.id();
        fs::write(self.pid_path(name), format!("{pid}\n"))?;
        Ok(StartOutcome::Started(pid))
    }

    /// SIGTERM, wait out the grace period, SIGKILL as a last resort.
    /// Idempotent: a dead or missing pid is "not running".
    pub fn stop(&self, name: &str) -> Result<StopOutcome> {
        let Some(pid) = self.live_pid(name) else {
            let _ = fs::remove_file(self.pid_path(name));
            return Ok(StopOutcome::NotRunning);
        };

        let target = Pid::from_raw(pid as i32);
        kill(target, Signal::SIGTERM)
            .with_context(|| format!("cannot signal '{name}' (pid {pid})"))?;

        let deadline = Instant::now() + STOP_GRACE;
        while Instant::now() < deadline {
            // Reap if the process happens to be our child (no-op otherwise),
            // so a terminated child does not linger as a zombie.
            let _ = waitpid(target, Some(WaitPidFlag::WNOHANG));
            if !is_alive(pid) {
                let _ = fs::remove_file(self.pid_path(name));
                return Ok(StopOutcome::Stopped);
            }
            std::thread::sleep(Duration::from_millis(100));
        }

        let _ = kill(target, Signal::SIGKILL);
        let _ = fs::remove_file(self.pid_path(name));
        Ok(StopOutcome::Stopped)
    }

    pub fn status(&self, name: &str) -> ProcStatus {
        match self.live_pid(name) {
            Some(pid) => ProcStatus::Running(pid),
            None => ProcStatus::Stopped,
        }
    }

    fn pid_path(&self, name: &str) -> PathBuf {
        self.run_dir.join(format!("{name}.pid"))
    }

    /// Pid from the pid file, only if the process is actually alive.
    fn live_pid(&self, name: &str) -> Option<u32> {
        let text = fs::read_to_string(self.pid_path(name)).ok()?;
        let pid: u32 = text.trim().parse().ok()?;
        is_alive(pid).then_some(pid)
    }
}

/// Signal 0 probes existence without touching the process.
fn is_alive(pid: u32) -> bool {
    kill(Pid::from_raw(pid as i32), None).is_ok()
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
