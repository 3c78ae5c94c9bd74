// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Materialized schedule set, rebuilt from snapshot + WAL replay.

use crate::wal::StoreOp;
use cw_core::Schedule;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The full set of persisted schedules, keyed by schedule ID.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduleSet {
    pub schedules: BTreeMap<String, Schedule>,
}

impl ScheduleSet {
    /// Apply one mutation. Idempotent: replaying an entry twice converges to
    /// the same state.
    pub fn apply(&mut self, op: &StoreOp) {
        match op {
            StoreOp::Put { schedule } => {
                self.schedules.insert(schedule.id.clone(), (**schedule).clone());
            }
            StoreOp::Remove { schedule_id } => {
                self.schedules.remove(schedule_id);
            }
            StoreOp::Release { schedule_id, next_fire_time } => {
                if let Some(schedule) = self.schedules.get_mut(schedule_id) {
                    schedule.next_fire_time = *next_fire_time;
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.schedules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schedules.is_empty()
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
