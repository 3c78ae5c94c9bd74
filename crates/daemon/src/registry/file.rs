// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Registry document persistence.
//!
//! A human-readable TOML table mapping `handler_id` to its persisted entry,
//! written atomically (temp file + rename). Transient fields such as cached
//! wire clients and live probe results never appear here.

use cw_core::HandlerEntry;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryFileError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed registry file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize registry: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Load the registry document; a missing file is an empty registry.
pub fn load(path: &Path) -> Result<BTreeMap<String, HandlerEntry>, RegistryFileError> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(e) => return Err(e.into()),
    };
    Ok(toml::from_str(&text)?)
}

/// Write the registry document atomically: temp file, then rename.
pub fn save_atomic(
    path: &Path,
    entries: &BTreeMap<String, HandlerEntry>,
) -> Result<(), RegistryFileError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let text = toml::to_string_pretty(entries)?;
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, text)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
#[path = "file_tests.rs"]
mod tests;
