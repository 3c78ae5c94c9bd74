// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The schedule store: write-through durability plus transient due-claims.

use crate::snapshot::{Snapshot, SnapshotError};
use crate::state::ScheduleSet;
use crate::wal::{StoreOp, Wal, WalError};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use cw_core::Schedule;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Errors from store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("schedule id '{0}' already exists")]
    Conflict(String),

    #[error("schedule '{0}' not found")]
    NotFound(String),

    #[error(transparent)]
    Wal(#[from] WalError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub wal_path: PathBuf,
    pub snapshot_path: PathBuf,
    /// How long an `acquire_due` claim shields a schedule from re-claiming.
    pub claim_lease: Duration,
    /// Compact (snapshot + WAL truncate) after this many appends.
    pub compact_after: u64,
}

impl StoreConfig {
    pub fn new(wal_path: impl Into<PathBuf>, snapshot_path: impl Into<PathBuf>) -> Self {
        Self {
            wal_path: wal_path.into(),
            snapshot_path: snapshot_path.into(),
            claim_lease: Duration::from_secs(30),
            compact_after: 1024,
        }
    }
}

/// Time-window filter plus pagination for `list`.
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub limit: usize,
    pub offset: usize,
}

/// One page of schedules plus the total number of matches.
#[derive(Debug, Clone)]
pub struct Page {
    pub schedules: Vec<Schedule>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

struct Inner {
    set: ScheduleSet,
    wal: Wal,
    /// schedule_id → claim lease expiry. Transient; cleared on release.
    claims: HashMap<String, DateTime<Utc>>,
    appended_since_compact: u64,
}

/// Durable set of schedules with atomic due-claiming.
///
/// All state sits behind one lock; WAL appends happen under it (file IO,
/// never the network), which is what makes `acquire_due` serializable
/// against concurrent claimers in this process. Cross-instance
/// serialization is policy: only the broker-elected leader plans.
pub struct ScheduleStore {
    inner: Mutex<Inner>,
    config: StoreConfig,
}

impl ScheduleStore {
    /// Open the store: load the snapshot, replay the WAL past it, and
    /// compact if anything was replayed.
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        let snapshot = Snapshot::load(&config.snapshot_path)?;
        let (mut set, snapshot_seq) = match snapshot {
            Some(s) => (s.state, s.seq),
            None => (ScheduleSet::default(), 0),
        };

        let (wal, entries) = Wal::open(&config.wal_path)?;
        let mut replayed = 0u64;
        for entry in &entries {
            if entry.seq > snapshot_seq {
                set.apply(&entry.op);
                replayed += 1;
            }
        }
        if replayed > 0 {
            info!(replayed, "replayed WAL entries past snapshot");
        }

        let store = Self {
            inner: Mutex::new(Inner {
                set,
                wal,
                claims: HashMap::new(),
                appended_since_compact: replayed,
            }),
            config,
        };
        if replayed > 0 {
            store.compact()?;
        }
        Ok(store)
    }

    /// Insert or replace. `Conflict` when the id exists and `replace_existing`
    /// is false.
    pub fn put(&self, schedule: Schedule, replace_existing: bool) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if !replace_existing && inner.set.schedules.contains_key(&schedule.id) {
            return Err(StoreError::Conflict(schedule.id));
        }
        let op = StoreOp::Put { schedule: Box::new(schedule) };
        inner.wal.append(op.clone())?;
        inner.set.apply(&op);
        inner.appended_since_compact += 1;
        drop(inner);
        self.maybe_compact();
        Ok(())
    }

    /// Remove a schedule. Idempotent: returns whether it existed.
    pub fn remove(&self, schedule_id: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock();
        if !inner.set.schedules.contains_key(schedule_id) {
            return Ok(false);
        }
        let op = StoreOp::Remove { schedule_id: schedule_id.to_string() };
        inner.wal.append(op.clone())?;
        inner.set.apply(&op);
        inner.claims.remove(schedule_id);
        inner.appended_since_compact += 1;
        drop(inner);
        self.maybe_compact();
        Ok(true)
    }

    pub fn get(&self, schedule_id: &str) -> Option<Schedule> {
        self.inner.lock().set.schedules.get(schedule_id).cloned()
    }

    pub fn contains(&self, schedule_id: &str) -> bool {
        self.inner.lock().set.schedules.contains_key(schedule_id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().set.is_empty()
    }

    /// Filtered, paginated snapshot ordered by `next_fire_time` (exhausted
    /// schedules last), then id.
    pub fn list(&self, filter: &ListFilter) -> Page {
        let inner = self.inner.lock();
        let mut matches: Vec<&Schedule> = inner
            .set
            .schedules
            .values()
            .filter(|s| {
                let in_window = match (filter.start_time, filter.end_time, s.next_fire_time) {
                    (None, None, _) => true,
                    (_, _, None) => false,
                    (start, end, Some(t)) => {
                        start.is_none_or(|lo| t >= lo) && end.is_none_or(|hi| t <= hi)
                    }
                };
                in_window
            })
            .collect();
        matches.sort_by(|a, b| {
            let key = |s: &Schedule| (s.next_fire_time.is_none(), s.next_fire_time, s.id.clone());
            key(a).cmp(&key(b))
        });

        let total = matches.len();
        let limit = if filter.limit == 0 { total } else { filter.limit };
        let schedules =
            matches.into_iter().skip(filter.offset).take(limit).cloned().collect();
        Page { schedules, total, limit, offset: filter.offset }
    }

    /// Atomically claim up to `limit` schedules with `next_fire_time ≤ now`.
    ///
    /// Claimed schedules are invisible to further acquires until released or
    /// the short lease lapses. Paused schedules are skipped.
    pub fn acquire_due(&self, now: DateTime<Utc>, limit: usize) -> Vec<Schedule> {
        let mut inner = self.inner.lock();
        let lease = ChronoDuration::from_std(self.config.claim_lease)
            .unwrap_or_else(|_| ChronoDuration::seconds(30));

        let mut due: Vec<Schedule> = inner
            .set
            .schedules
            .values()
            .filter(|s| {
                s.next_fire_time.is_some_and(|t| t <= now)
                    && !s.is_paused(now)
                    && !inner.claims.get(&s.id).is_some_and(|expiry| *expiry > now)
            })
            .cloned()
            .collect();
        due.sort_by_key(|s| (s.next_fire_time, s.id.clone()));
        due.truncate(limit);

        for schedule in &due {
            inner.claims.insert(schedule.id.clone(), now + lease);
        }
        due
    }

    /// Post-materialization update: write the recomputed `next_fire_time`
    /// (or exhaustion) and clear the claim. No-op on a vanished schedule.
    pub fn release(
        &self,
        schedule_id: &str,
        next_fire_time: Option<DateTime<Utc>>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock();
        inner.claims.remove(schedule_id);
        if !inner.set.schedules.contains_key(schedule_id) {
            return Ok(false);
        }
        let op = StoreOp::Release { schedule_id: schedule_id.to_string(), next_fire_time };
        inner.wal.append(op.clone())?;
        inner.set.apply(&op);
        inner.appended_since_compact += 1;
        drop(inner);
        self.maybe_compact();
        Ok(true)
    }

    /// Write a snapshot at the current WAL position and truncate the WAL.
    pub fn compact(&self) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let seq = inner.wal.last_seq();
        let snapshot = Snapshot::new(seq, inner.set.clone());
        snapshot.save(&self.config.snapshot_path)?;
        inner.wal.reset(seq)?;
        inner.appended_since_compact = 0;
        Ok(())
    }

    fn maybe_compact(&self) {
        let due = self.inner.lock().appended_since_compact >= self.config.compact_after;
        if due {
            if let Err(e) = self.compact() {
                warn!(error = %e, "schedule store compaction failed");
            }
        }
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
