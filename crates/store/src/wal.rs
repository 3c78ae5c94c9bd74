// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only write-ahead log of schedule mutations.
//!
//! One JSON object per line, each carrying a monotone sequence number.
//! A truncated final line (crash mid-append) is tolerated and dropped on
//! replay; anything else unparseable is corruption.

use chrono::{DateTime, Utc};
use cw_core::Schedule;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Errors from WAL operations.
#[derive(Debug, Error)]
pub enum WalError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("corrupt WAL entry at line {line}: {reason}")]
    Corrupt { line: usize, reason: String },
}

/// One durable schedule mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum StoreOp {
    Put { schedule: Box<Schedule> },
    Remove { schedule_id: String },
    Release { schedule_id: String, next_fire_time: Option<DateTime<Utc>> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalEntry {
    pub seq: u64,
    pub op: StoreOp,
}

pub struct Wal {
    file: File,
    path: PathBuf,
    next_seq: u64,
}

impl Wal {
    /// Open the WAL, returning it together with every entry already on disk.
    pub fn open(path: &Path) -> Result<(Self, Vec<WalEntry>), WalError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let entries = read_entries(path)?;
        let next_seq = entries.last().map(|e| e.seq + 1).unwrap_or(1);
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok((Self { file, path: path.to_path_buf(), next_seq }, entries))
    }

    /// Append one mutation and sync it to disk. Returns its sequence number.
    pub fn append(&mut self, op: StoreOp) -> Result<u64, WalError> {
        let entry = WalEntry { seq: self.next_seq, op };
        let mut line = serde_json::to_vec(&entry)?;
        line.push(b'\n');
        self.file.write_all(&line)?;
        self.file.sync_data()?;
        self.next_seq += 1;
        Ok(entry.seq)
    }

    /// Sequence number the next append will get.
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    /// Sequence number of the most recent append, if any.
    pub fn last_seq(&self) -> u64 {
        self.next_seq.saturating_sub(1)
    }

    /// Truncate after a snapshot has captured everything up to `seq`.
    pub fn reset(&mut self, seq: u64) -> Result<(), WalError> {
        self.file = OpenOptions::new().create(true).write(true).truncate(true).open(&self.path)?;
        self.file.sync_data()?;
        // Reopen in append mode for subsequent writes.
        self.file = OpenOptions::new().append(true).open(&self.path)?;
        self.next_seq = seq + 1;
        Ok(())
    }
}

fn read_entries(path: &Path) -> Result<Vec<WalEntry>, WalError> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let reader = BufReader::new(file);
    let mut entries = Vec::new();
    let mut lines = reader.lines().enumerate().peekable();
    while let Some((index, line)) = lines.next() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<WalEntry>(&line) {
            Ok(entry) => entries.push(entry),
            Err(e) if lines.peek().is_none() => {
                // Torn tail from a crash mid-append: drop it.
                warn!(line = index + 1, error = %e, "dropping truncated WAL tail");
            }
            Err(e) => {
                return Err(WalError::Corrupt { line: index + 1, reason: e.to_string() });
            }
        }
    }
    Ok(entries)
}

#[cfg(test)]
#[path = "wal_tests.rs"]
mod tests;
