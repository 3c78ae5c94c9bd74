// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Thread-safe bounded execution log.
//!
//! A ring of at most N records with a lifetime-insertion counter. Pure
//! in-memory: no operation suspends. Handles refer to records by insertion
//! sequence, so finalizing a record that has already been evicted from the
//! ring is a harmless no-op.

use crate::clock::Clock;
use crate::job::JobId;
use crate::record::{params_summary, ExecutionKind, ExecutionRecord, ExecutionStatus};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};

pub const DEFAULT_LOG_CAPACITY: usize = 1000;

/// Opaque reference to a started record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHandle(u64);

/// Per-handler breakdown in [`ExecutionStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HandlerStats {
    pub total: u64,
    pub success: u64,
    pub error: u64,
}

/// Aggregate statistics over the current ring contents.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecutionStats {
    pub total_executions: usize,
    /// Monotone insertion counter; survives eviction, reset only by `clear`.
    pub lifetime_executions: u64,
    pub success_count: usize,
    pub error_count: usize,
    /// Percentage of ring records with a success status.
    pub success_rate: f64,
    pub avg_duration_ms: f64,
    pub by_handler: BTreeMap<String, HandlerStats>,
    pub buffer_size: usize,
    /// Percentage of the ring currently occupied.
    pub buffer_utilization: f64,
}

struct LogInner {
    records: VecDeque<(u64, ExecutionRecord)>,
    lifetime: u64,
}

/// In-memory ring of execution records.
pub struct ExecutionLog<C: Clock> {
    inner: Mutex<LogInner>,
    max_size: usize,
    clock: C,
}

impl<C: Clock> ExecutionLog<C> {
    pub fn new(max_size: usize, clock: C) -> Self {
        Self {
            inner: Mutex::new(LogInner { records: VecDeque::new(), lifetime: 0 }),
            max_size: max_size.max(1),
            clock,
        }
    }

    /// Record the start of an attempt. The returned handle finalizes it.
    pub fn record_start(
        &self,
        job_id: &JobId,
        handler_id: &str,
        method_name: &str,
        attempt_number: u32,
        max_attempts: u32,
        params: &serde_json::Value,
    ) -> RecordHandle {
        let record = ExecutionRecord {
            job_id: job_id.clone(),
            handler_id: handler_id.to_string(),
            method_name: method_name.to_string(),
            started_at: self.clock.now_utc(),
            completed_at: None,
            duration_ms: None,
            status: ExecutionStatus::Running,
            kind: ExecutionKind::Call,
            result: None,
            error: None,
            attempt_number,
            max_attempts,
            params_summary: params_summary(params),
        };
        self.push(record)
    }

    /// Record a skipped fire: error-class, kind misfire, terminal on insert.
    pub fn record_misfire(
        &self,
        schedule_id: &str,
        handler_id: &str,
        method_name: &str,
        missed_fire: chrono::DateTime<chrono::Utc>,
    ) {
        let now = self.clock.now_utc();
        let record = ExecutionRecord {
            job_id: JobId::from_string(schedule_id),
            handler_id: handler_id.to_string(),
            method_name: method_name.to_string(),
            started_at: now,
            completed_at: Some(now),
            duration_ms: Some(0.0),
            status: ExecutionStatus::Error,
            kind: ExecutionKind::Misfire,
            result: None,
            error: Some(format!(
                "fire at {} missed its misfire grace window",
                missed_fire.to_rfc3339()
            )),
            attempt_number: 1,
            max_attempts: 1,
            params_summary: None,
        };
        self.push(record);
    }

    fn push(&self, record: ExecutionRecord) -> RecordHandle {
        let mut inner = self.inner.lock();
        inner.lifetime += 1;
        let seq = inner.lifetime;
        if inner.records.len() == self.max_size {
            inner.records.pop_front();
        }
        inner.records.push_back((seq, record));
        RecordHandle(seq)
    }

    /// Finalize an attempt as successful.
    pub fn record_success(&self, handle: RecordHandle, result: Option<serde_json::Value>) {
        self.finalize(handle, ExecutionStatus::Success, result, None);
    }

    /// Finalize an attempt as failed. Non-final attempts get status `retry`.
    pub fn record_error(&self, handle: RecordHandle, error: impl Into<String>, is_final: bool) {
        let status = if is_final { ExecutionStatus::Error } else { ExecutionStatus::Retry };
        self.finalize(handle, status, None, Some(error.into()));
    }

    fn finalize(
        &self,
        handle: RecordHandle,
        status: ExecutionStatus,
        result: Option<serde_json::Value>,
        error: Option<String>,
    ) {
        let now = self.clock.now_utc();
        let mut inner = self.inner.lock();
        // Recent records live at the back; evicted handles simply miss.
        if let Some((_, record)) =
            inner.records.iter_mut().rev().find(|(seq, _)| *seq == handle.0)
        {
            if record.completed_at.is_some() {
                return; // already finalized
            }
            record.completed_at = Some(now);
            record.duration_ms =
                Some((now - record.started_at).num_milliseconds().max(0) as f64);
            record.status = status;
            record.result = result;
            record.error = error;
        }
    }

    /// Most recent records, newest first.
    pub fn get_recent(&self, limit: usize) -> Vec<ExecutionRecord> {
        self.filtered(limit, |_| true)
    }

    pub fn get_by_handler(&self, handler_id: &str, limit: usize) -> Vec<ExecutionRecord> {
        self.filtered(limit, |r| r.handler_id == handler_id)
    }

    pub fn get_by_job(&self, job_id: &str, limit: usize) -> Vec<ExecutionRecord> {
        self.filtered(limit, |r| r.job_id == job_id)
    }

    pub fn get_by_status(&self, status: ExecutionStatus, limit: usize) -> Vec<ExecutionRecord> {
        self.filtered(limit, |r| r.status == status)
    }

    /// Recent terminal failures, newest first.
    pub fn get_errors(&self, limit: usize) -> Vec<ExecutionRecord> {
        self.get_by_status(ExecutionStatus::Error, limit)
    }

    fn filtered(
        &self,
        limit: usize,
        predicate: impl Fn(&ExecutionRecord) -> bool,
    ) -> Vec<ExecutionRecord> {
        let inner = self.inner.lock();
        inner
            .records
            .iter()
            .rev()
            .filter(|(_, r)| predicate(r))
            .take(limit)
            .map(|(_, r)| r.clone())
            .collect()
    }

    pub fn get_stats(&self) -> ExecutionStats {
        let inner = self.inner.lock();
        let total = inner.records.len();
        let mut stats = ExecutionStats {
            total_executions: total,
            lifetime_executions: inner.lifetime,
            buffer_size: self.max_size,
            buffer_utilization: (total as f64 / self.max_size as f64) * 100.0,
            ..ExecutionStats::default()
        };
        if total == 0 {
            return stats;
        }

        let mut duration_sum = 0.0;
        let mut duration_count = 0usize;
        for (_, record) in &inner.records {
            let per_handler = stats.by_handler.entry(record.handler_id.clone()).or_default();
            per_handler.total += 1;
            match record.status {
                ExecutionStatus::Success => {
                    stats.success_count += 1;
                    per_handler.success += 1;
                }
                ExecutionStatus::Error => {
                    stats.error_count += 1;
                    per_handler.error += 1;
                }
                ExecutionStatus::Running | ExecutionStatus::Retry => {}
            }
            if let Some(ms) = record.duration_ms {
                duration_sum += ms;
                duration_count += 1;
            }
        }
        stats.success_rate = (stats.success_count as f64 / total as f64) * 100.0;
        if duration_count > 0 {
            stats.avg_duration_ms = duration_sum / duration_count as f64;
        }
        stats
    }

    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().records.is_empty()
    }

    /// Drop every record and reset the lifetime counter.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.records.clear();
        inner.lifetime = 0;
    }
}

#[cfg(test)]
#[path = "exec_log_tests.rs"]
mod tests;
