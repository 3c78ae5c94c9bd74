// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `cwk` - process supervisor for a clockwork deployment.
//!
//! A deployment names the coordinator and handler processes that make up
//! one installation. All operations are idempotent: starting a running
//! process or stopping a stopped one succeeds without side effects.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod deployment;
mod supervisor;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use deployment::{Deployment, DeploymentFile};
use std::process::ExitCode;
use supervisor::{ProcStatus, StartOutcome, StopOutcome, Supervisor};

#[derive(Parser)]
#[command(name = "cwk", about = "Clockwork deployment supervisor", version)]
struct Cli {
    /// Deployment name (defaults to $CW_DEPLOYMENT, then "default")
    #[arg(long, global = true)]
    deployment: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start every process of the deployment, or a single one
    Start { name: Option<String> },
    /// Stop every process of the deployment, or a single one
    Stop { name: Option<String> },
    /// Restart every process of the deployment, or a single one
    Restart { name: Option<String> },
    /// Show the status of every process, or a single one
    Status { name: Option<String> },
    /// Start whatever is not running
    Ensure,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("cwk: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let deployment_name = cli
        .deployment
        .or_else(|| std::env::var("CW_DEPLOYMENT").ok())
        .unwrap_or_else(|| "default".to_string());
    let state_dir = deployment::state_dir()?;
    let file = DeploymentFile::load(&deployment::config_path(&state_dir))?;
    let deployment = file.deployment(&deployment_name)?;
    let supervisor = Supervisor::new(&state_dir, &deployment_name);

    match cli.command {
        Command::Start { name } => start(&supervisor, deployment, name.as_deref(), false),
        Command::Stop { name } => stop(&supervisor, deployment, name.as_deref()),
        Command::Restart { name } => {
            stop(&supervisor, deployment, name.as_deref())?;
            start(&supervisor, deployment, name.as_deref(), false)
        }
        Command::Status { name } => status(&supervisor, deployment, name.as_deref()),
        Command::Ensure => start(&supervisor, deployment, None, true),
    }
}

fn select<'a>(
    deployment: &'a Deployment,
    name: Option<&str>,
) -> Result<Vec<(&'a String, &'a deployment::ProcessSpec)>> {
    match name {
        Some(name) => {
            let (key, spec) = deployment
                .processes
                .get_key_value(name)
                .with_context(|| format!("process '{name}' is not in the deployment"))?;
            Ok(vec![(key, spec)])
        }
        None => Ok(deployment.processes.iter().collect()),
    }
}

fn start(
    supervisor: &Supervisor,
    deployment: &Deployment,
    name: Option<&str>,
    quiet_running: bool,
) -> Result<()> {
    for (proc_name, spec) in select(deployment, name)? {
        match supervisor.start(proc_name, spec)? {
            StartOutcome::Started(pid) => println!("{proc_name}: started (pid {pid})"),
            StartOutcome::AlreadyRunning(pid) => {
                if !quiet_running {
                    println!("{proc_name}: already running (pid {pid})");
                }
            }
        }
    }
    Ok(())
}

fn stop(supervisor: &Supervisor, deployment: &Deployment, name: Option<&str>) -> Result<()> {
    for (proc_name, _) in select(deployment, name)? {
        match supervisor.stop(proc_name)? {
            StopOutcome::Stopped => println!("{proc_name}: stopped"),
            StopOutcome::NotRunning => println!("{proc_name}: not running"),
        }
    }
    Ok(())
}

fn status(supervisor: &Supervisor, deployment: &Deployment, name: Option<&str>) -> Result<()> {
    for (proc_name, _) in select(deployment, name)? {
        match supervisor.status(proc_name) {
            ProcStatus::Running(pid) => println!("{proc_name}: running (pid {pid})"),
            ProcStatus::Stopped => println!("{proc_name}: stopped"),
        }
    }
    Ok(())
}
