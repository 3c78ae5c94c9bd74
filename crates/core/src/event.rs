// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scheduler events shared by the engine, the local event bus, and the
//! inter-instance broker.
//!
//! Schedule events carry enough state for a peer instance to converge its
//! own store; job events are observability-only.

use crate::job::{JobId, JobState};
use crate::schedule::Schedule;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SchedulerEvent {
    ScheduleAdded {
        schedule: Box<Schedule>,
    },
    ScheduleRemoved {
        schedule_id: String,
    },
    /// Post-materialization update: the recomputed next fire (or exhaustion).
    ScheduleReleased {
        schedule_id: String,
        next_fire_time: Option<DateTime<Utc>>,
    },
    JobQueued {
        job_id: JobId,
        schedule_id: Option<String>,
        handler_id: String,
        method_name: String,
        scheduled_for: DateTime<Utc>,
    },
    JobFinished {
        job_id: JobId,
        state: JobState,
        attempts: u32,
    },
    HandlerRegistered {
        handler_id: String,
        address: String,
    },
    HandlerUnregistered {
        handler_id: String,
    },
}

crate::wire_name! {
    SchedulerEvent {
        SchedulerEvent::ScheduleAdded { .. } => "schedule_added",
        SchedulerEvent::ScheduleRemoved { .. } => "schedule_removed",
        SchedulerEvent::ScheduleReleased { .. } => "schedule_released",
        SchedulerEvent::JobQueued { .. } => "job_queued",
        SchedulerEvent::JobFinished { .. } => "job_finished",
        SchedulerEvent::HandlerRegistered { .. } => "handler_registered",
        SchedulerEvent::HandlerUnregistered { .. } => "handler_unregistered",
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
