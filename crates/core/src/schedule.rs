// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Schedule row and fire planning.
//!
//! A schedule binds `(handler_id, method_name, params)` to a trigger; the
//! target is plain data, never a serialized callable. The planner calls
//! [`Schedule::plan_fires`] on claimed schedules to decide which overdue
//! fire times become jobs, which are dropped as misfires, and what the new
//! `next_fire_time` is.

use crate::trigger::{Trigger, TriggerError};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

crate::define_id! {
    /// Unique identifier for a server-generated schedule.
    ///
    /// Clients may supply their own schedule IDs; this prefix form is only
    /// used when the add request leaves the ID blank.
    pub struct ScheduleId("sch-");
}

/// Policy for collapsing multiple overdue fires of one schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Coalesce {
    /// Collapse to one job at the most recent past fire time.
    #[default]
    Latest,
    /// Collapse to one job at the oldest past fire time.
    Earliest,
    /// Materialize every overdue fire, bounded by a per-acquire cap.
    All,
}

crate::wire_name! {
    Coalesce {
        Coalesce::Latest => "latest",
        Coalesce::Earliest => "earliest",
        Coalesce::All => "all",
    }
}

/// Per-acquire cap on `coalesce = all` materializations; the remainder is
/// dropped as misfires.
pub const COALESCE_ALL_CAP: usize = 100;

/// Serde adapter: optional durations as fractional seconds.
mod secs_opt {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&d.as_secs_f64()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let secs = Option::<f64>::deserialize(d)?;
        match secs {
            Some(s) if s < 0.0 || !s.is_finite() => {
                Err(serde::de::Error::custom("duration must be a non-negative number of seconds"))
            }
            Some(s) => Ok(Some(Duration::from_secs_f64(s))),
            None => Ok(None),
        }
    }
}

/// A persisted recurrence specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub id: String,
    pub handler_id: String,
    pub method_name: String,
    /// Arbitrary structured value passed to the handler on every fire.
    pub params: serde_json::Value,
    pub trigger: Trigger,
    /// `None` means exhausted; the planner removes exhausted schedules.
    pub next_fire_time: Option<DateTime<Utc>>,
    /// How far past a fire time a missed fire is still executed.
    /// `None` disables the misfire check (a missed fire always runs).
    #[serde(default, with = "secs_opt", skip_serializing_if = "Option::is_none")]
    pub misfire_grace_time: Option<Duration>,
    #[serde(default)]
    pub coalesce: Coalesce,
    /// Upper bound of the random delay added to each computed fire time.
    #[serde(default, with = "secs_opt", skip_serializing_if = "Option::is_none")]
    pub max_jitter: Option<Duration>,
    /// Materialization is suppressed until this instant passes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused_until: Option<DateTime<Utc>>,
    /// Retry budget for jobs materialized from this schedule.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Per-call transport timeout override.
    #[serde(default, with = "secs_opt", skip_serializing_if = "Option::is_none")]
    pub call_timeout: Option<Duration>,
    pub created_at: DateTime<Utc>,
}

fn default_max_attempts() -> u32 {
    3
}

/// Result of planning one claimed schedule at a point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct FirePlan {
    /// Fire times to materialize as jobs, oldest first.
    pub fires: Vec<DateTime<Utc>>,
    /// Fire times dropped because they missed the grace window (or overflowed
    /// the `coalesce = all` cap).
    pub misfires: Vec<DateTime<Utc>>,
    /// The recomputed next future fire, before jitter. `None` means exhausted.
    pub next_fire_time: Option<DateTime<Utc>>,
    /// True when the overdue walk hit its bound and some fire times were
    /// neither materialized nor individually accounted as misfires.
    pub truncated: bool,
}

impl Schedule {
    pub fn is_paused(&self, now: DateTime<Utc>) -> bool {
        self.paused_until.is_some_and(|until| now < until)
    }

    /// Plan the fires represented by the current `next_fire_time` at `now`.
    ///
    /// Overdue fire times older than the grace window become misfires; the
    /// in-grace set is collapsed per the coalesce policy. Walks are bounded
    /// by `cap` so a long outage over a short interval cannot spin: the
    /// expired region is skipped in one evaluation step once `cap` misfire
    /// instants have been collected.
    pub fn plan_fires(&self, now: DateTime<Utc>, cap: usize) -> Result<FirePlan, TriggerError> {
        let cap = cap.max(1);
        let mut fires: Vec<DateTime<Utc>> = Vec::new();
        let mut misfires: Vec<DateTime<Utc>> = Vec::new();
        let mut truncated = false;

        let Some(first) = self.next_fire_time else {
            return Ok(FirePlan { fires, misfires, next_fire_time: None, truncated });
        };

        // A fire is a misfire when `now - t > grace`, i.e. `t < now - grace`.
        // A fire missed by exactly the grace window still runs.
        let boundary = self
            .misfire_grace_time
            .and_then(|g| ChronoDuration::from_std(g).ok())
            .map(|g| now - g);

        let mut cursor = Some(first);

        if let Some(boundary) = boundary {
            let mut collected = 0usize;
            while let Some(t) = cursor {
                if t >= boundary || t > now {
                    break;
                }
                if collected < cap {
                    misfires.push(t);
                    collected += 1;
                    // Date triggers answer `next_fire_after(t)` with `t`
                    // itself; only a strictly later instant advances the walk.
                    cursor = self.trigger.next_fire_after(t)?.filter(|n| *n > t);
                } else {
                    // Cap reached: jump past the expired region in one step.
                    cursor = self
                        .trigger
                        .next_fire_after(boundary - ChronoDuration::milliseconds(1))?;
                    truncated = true;
                    break;
                }
            }
        }

        // In-grace overdue fires, oldest first. Bounded at twice the cap so
        // `coalesce = all` can still account its overflow as misfires.
        while let Some(t) = cursor {
            if t > now {
                break;
            }
            if fires.len() >= cap * 2 {
                truncated = true;
                break;
            }
            fires.push(t);
            cursor = self.trigger.next_fire_after(t)?.filter(|n| *n > t);
        }

        let next_fire_time = match cursor {
            Some(t) if t > now => Some(t),
            _ => self.trigger.next_fire_after(now)?.filter(|n| *n > now),
        };

        let fires = match self.coalesce {
            Coalesce::Latest => fires.last().copied().into_iter().collect(),
            Coalesce::Earliest => fires.first().copied().into_iter().collect(),
            Coalesce::All => {
                let mut fires = fires;
                if fires.len() > cap {
                    misfires.extend(fires.split_off(cap));
                }
                fires
            }
        };

        Ok(FirePlan { fires, misfires, next_fire_time, truncated })
    }
}

/// Test builder. Covers the fields tests vary; everything else is `pub`
/// and can be adjusted on the built schedule directly.
#[cfg(any(test, feature = "test-support"))]
pub struct ScheduleBuilder {
    id: String,
    trigger: Trigger,
}

#[cfg(any(test, feature = "test-support"))]
impl ScheduleBuilder {
    fn new() -> Self {
        Self {
            id: "test-schedule".to_string(),
            trigger: Trigger::Interval(crate::trigger::IntervalTrigger {
                seconds: 10.0,
                start_time: Some(
                    chrono::TimeZone::with_ymd_and_hms(&Utc, 2026, 1, 1, 0, 0, 0)
                        .single()
                        .unwrap_or_default(),
                ),
                ..crate::trigger::IntervalTrigger::default()
            }),
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn trigger(mut self, trigger: Trigger) -> Self {
        self.trigger = trigger;
        self
    }

    pub fn build(self) -> Schedule {
        Schedule {
            id: self.id,
            handler_id: "test-handler".to_string(),
            method_name: "echo".to_string(),
            params: serde_json::Value::Object(serde_json::Map::new()),
            trigger: self.trigger,
            next_fire_time: None,
            misfire_grace_time: None,
            coalesce: Coalesce::Latest,
            max_jitter: None,
            paused_until: None,
            max_attempts: 3,
            call_timeout: None,
            created_at: Utc::now(),
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
impl Schedule {
    /// Builder with test defaults.
    pub fn builder() -> ScheduleBuilder {
        ScheduleBuilder::new()
    }
}

#[cfg(test)]
#[path = "schedule_tests.rs"]
mod tests;
