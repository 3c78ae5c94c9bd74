// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `clockworkd` - the coordinator daemon binary.

use cw_daemon::{lifecycle, Config};
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("clockworkd: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = std::fs::create_dir_all(&config.state_dir) {
        eprintln!("clockworkd: cannot create state dir: {e}");
        return ExitCode::FAILURE;
    }

    // Structured logs to stderr and the daemon log file.
    let file_appender = match config.log_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => tracing_appender::rolling::never(
            parent,
            config.log_path.file_name().unwrap_or_else(|| "daemon.log".as_ref()),
        ),
        _ => tracing_appender::rolling::never(".", "daemon.log"),
    };
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);
    let filter = EnvFilter::try_new(cw_daemon::env::log_level())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(file_writer))
        .init();

    let daemon = match lifecycle::startup(config).await {
        Ok(daemon) => daemon,
        Err(e) => {
            // Fatal per the error contract: surface and exit non-zero.
            error!("startup failed: {e}");
            eprintln!("clockworkd: startup failed: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Signal readiness for supervisors watching stdout.
    println!("READY");

    wait_for_signal().await;
    info!("signal received");
    daemon.shutdown().await;
    ExitCode::SUCCESS
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(e) => {
                error!("cannot install SIGTERM handler: {e}");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
