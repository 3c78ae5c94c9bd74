// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.

use std::path::PathBuf;
use std::time::Duration;

use crate::lifecycle::LifecycleError;

/// HTTP front-end listen address.
pub fn http_addr() -> String {
    std::env::var("CW_HTTP_ADDR").unwrap_or_else(|_| "127.0.0.1:4240".to_string())
}

/// Registration transport listen address.
pub fn reg_addr() -> String {
    std::env::var("CW_REG_ADDR").unwrap_or_else(|_| "127.0.0.1:4242".to_string())
}

/// Resolve state directory: CW_STATE_DIR > XDG_STATE_HOME/clockwork >
/// ~/.local/state/clockwork
pub fn state_dir() -> Result<PathBuf, LifecycleError> {
    if let Ok(dir) = std::env::var("CW_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("clockwork"));
    }
    let home = std::env::var("HOME").map_err(|_| LifecycleError::NoStateDir)?;
    Ok(PathBuf::from(home).join(".local/state/clockwork"))
}

/// Schedule store WAL path override.
pub fn db_path(state_dir: &std::path::Path) -> PathBuf {
    std::env::var("CW_DB_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| state_dir.join("wal").join("schedules.wal"))
}

/// Handler registry file override.
pub fn registry_path(state_dir: &std::path::Path) -> PathBuf {
    std::env::var("CW_REGISTRY_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| state_dir.join("registry.toml"))
}

/// Tracing filter (CW_LOG_LEVEL), e.g. `info` or `cw_daemon=debug`.
pub fn log_level() -> String {
    std::env::var("CW_LOG_LEVEL").unwrap_or_else(|_| "info".to_string())
}

/// Daemon log file.
pub fn log_file(state_dir: &std::path::Path) -> PathBuf {
    std::env::var("CW_LOG_FILE")
        .map(PathBuf::from)
        .unwrap_or_else(|_| state_dir.join("daemon.log"))
}

/// Default per-call transport timeout.
pub fn call_timeout() -> Duration {
    millis_var("CW_CALL_TIMEOUT_MS", Duration::from_secs(30))
}

/// Overall shutdown deadline.
pub fn shutdown_timeout() -> Duration {
    millis_var("CW_SHUTDOWN_TIMEOUT_MS", Duration::from_secs(30))
}

/// Event broker listen address; broker is disabled when unset.
pub fn broker_addr() -> Option<String> {
    std::env::var("CW_BROKER_ADDR").ok().filter(|s| !s.is_empty())
}

/// Comma-separated peer broker addresses.
pub fn broker_peers() -> Vec<String> {
    std::env::var("CW_BROKER_PEERS")
        .map(|s| {
            s.split(',')
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// Broker heartbeat interval.
pub fn heartbeat_interval() -> Duration {
    std::env::var("CW_HEARTBEAT_SECS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(Duration::from_secs(5))
}

fn millis_var(name: &str, default: Duration) -> Duration {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
