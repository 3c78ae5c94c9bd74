// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable schedule store.
//!
//! Mutations are write-through: every put/remove/release appends to an
//! on-disk WAL before touching the in-memory set. Startup loads the latest
//! snapshot and replays WAL entries past its sequence number; compaction
//! writes a fresh snapshot and truncates the WAL. Claims (`acquire_due`)
//! are transient and never persisted.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod snapshot;
mod state;
mod store;
mod wal;

pub use snapshot::{Snapshot, SnapshotError, CURRENT_SNAPSHOT_VERSION};
pub use state::ScheduleSet;
pub use store::{ListFilter, Page, ScheduleStore, StoreConfig, StoreError};
pub use wal::{StoreOp, Wal, WalEntry, WalError};
