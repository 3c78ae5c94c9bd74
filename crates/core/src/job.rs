// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job instance and its attempt state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

crate::define_id! {
    /// Unique identifier for a job instance.
    ///
    /// Each materialized fire (or run-now request) gets a unique ID used to
    /// track its attempts through the execution log.
    pub struct JobId("job-");
}

/// State of a job instance.
///
/// ```text
/// Queued ── runner picks ──▶ Running
/// Running ── reply OK ──────▶ Succeeded   (terminal)
/// Running ── error, k<max ─▶ RetryPending ── timer fires ──▶ Queued (k+1)
/// Running ── error, k=max ─▶ Failed       (terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running,
    Succeeded,
    Failed,
    RetryPending,
}

crate::wire_name! {
    JobState {
        JobState::Queued => "queued",
        JobState::Running => "running",
        JobState::Succeeded => "succeeded",
        JobState::Failed => "failed",
        JobState::RetryPending => "retry_pending",
    }
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }
}

/// One materialization of a schedule (or a run-now request), representing a
/// single intended fire. May span multiple attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobInstance {
    pub id: JobId,
    /// Owning schedule; run-now jobs have none.
    pub schedule_id: Option<String>,
    pub handler_id: String,
    pub method_name: String,
    pub params: serde_json::Value,
    /// The fire time this instance represents.
    pub scheduled_for: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub attempt_number: u32,
    pub max_attempts: u32,
    pub state: JobState,
    /// Per-call transport timeout override (from the schedule).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_timeout: Option<Duration>,
}

impl JobInstance {
    /// Whether another attempt remains after the current one fails.
    pub fn has_attempts_left(&self) -> bool {
        self.attempt_number < self.max_attempts
    }

    /// Mark the current attempt as running.
    pub fn start_attempt(&mut self) {
        self.state = JobState::Running;
    }

    /// Advance into the next attempt after a retry timer fires.
    pub fn next_attempt(&mut self) {
        self.attempt_number += 1;
        self.state = JobState::Queued;
    }
}

/// Test builder for a queued first-attempt job.
#[cfg(any(test, feature = "test-support"))]
#[derive(Default)]
pub struct JobInstanceBuilder {
    schedule_id: Option<String>,
    max_attempts: Option<u32>,
}

#[cfg(any(test, feature = "test-support"))]
impl JobInstanceBuilder {
    pub fn schedule_id(mut self, schedule_id: impl Into<String>) -> Self {
        self.schedule_id = Some(schedule_id.into());
        self
    }

    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn build(self) -> JobInstance {
        let now = Utc::now();
        JobInstance {
            id: JobId::new(),
            schedule_id: self.schedule_id,
            handler_id: "test-handler".to_string(),
            method_name: "echo".to_string(),
            params: serde_json::Value::Object(serde_json::Map::new()),
            scheduled_for: now,
            created_at: now,
            attempt_number: 1,
            max_attempts: self.max_attempts.unwrap_or(3),
            state: JobState::Queued,
            call_timeout: None,
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
impl JobInstance {
    /// Builder with test defaults.
    pub fn builder() -> JobInstanceBuilder {
        JobInstanceBuilder::default()
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
