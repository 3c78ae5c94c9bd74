// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deployment configuration: which processes make up an installation.
//!
//! ```toml
//! [deployments.default.processes.coordinator]
//! command = "clockworkd"
//!
//! [deployments.default.processes.echo-handler]
//! command = "my-echo-handler"
//! args = ["--port", "4244"]
//! env = { CW_REG_ADDR = "127.0.0.1:4242" }
//! ```

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ProcessSpec {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub cwd: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct Deployment {
    #[serde(default)]
    pub processes: BTreeMap<String, ProcessSpec>,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct DeploymentFile {
    #[serde(default)]
    pub deployments: BTreeMap<String, Deployment>,
}

impl DeploymentFile {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read deployment config at {}", path.display()))?;
        toml::from_str(&text)
            .with_context(|| format!("malformed deployment config at {}", path.display()))
    }

    pub fn deployment(&self, name: &str) -> Result<&Deployment> {
        let deployment = self
            .deployments
            .get(name)
            .ok_or_else(|| anyhow!("no deployment named '{name}' in the config"))?;
        if deployment.processes.is_empty() {
            bail!("deployment '{name}' has no processes");
        }
        Ok(deployment)
    }
}

/// Resolve the state directory the same way the daemon does.
pub fn state_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("CW_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("clockwork"));
    }
    let home = std::env::var("HOME").map_err(|_| anyhow!("cannot determine state directory"))?;
    Ok(PathBuf::from(home).join(".local/state/clockwork"))
}

/// Deployment config path: `CW_DEPLOYMENT_FILE` or `<state>/deployments.toml`.
pub fn config_path(state_dir: &Path) -> PathBuf {
    std::env::var("CW_DEPLOYMENT_FILE")
        .map(PathBuf::from)
        .unwrap_or_else(|_| state_dir.join("deployments.toml"))
}

#[cfg(test)]
#[path = "deployment_tests.rs"]
mod tests;
