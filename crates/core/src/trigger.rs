// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Trigger model and next-fire-time evaluation.
//!
//! A trigger is the rule producing fire times for a schedule: a one-shot
//! *date*, a repeating *interval*, or a *cron* field expression. Evaluation
//! is pure and deterministic: identical `(trigger, after)` inputs always
//! give identical outputs. Jitter is applied by the planner, never here.

use chrono::{DateTime, Duration as ChronoDuration, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Errors from trigger validation or evaluation.
#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("invalid instant '{0}'")]
    InvalidInstant(String),

    #[error("interval must be positive")]
    NonPositiveInterval,

    #[error("end_time precedes start_time")]
    EndBeforeStart,

    #[error("invalid cron expression '{expr}': {reason}")]
    InvalidCron { expr: String, reason: String },

    #[error("unknown timezone '{0}'")]
    UnknownTimezone(String),
}

/// Parse an instant from its wire representation: an ISO-8601/RFC-3339
/// string (naive forms are read as UTC) or seconds since the Unix epoch.
pub fn parse_instant(s: &str) -> Result<DateTime<Utc>, TriggerError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(naive.and_utc());
        }
        if fmt == "%Y-%m-%d" {
            if let Ok(date) = chrono::NaiveDate::parse_from_str(s, fmt) {
                if let Some(naive) = date.and_hms_opt(0, 0, 0) {
                    return Ok(naive.and_utc());
                }
            }
        }
    }
    if let Ok(secs) = s.parse::<f64>() {
        return epoch_secs_to_utc(secs);
    }
    Err(TriggerError::InvalidInstant(s.to_string()))
}

fn epoch_secs_to_utc(secs: f64) -> Result<DateTime<Utc>, TriggerError> {
    Utc.timestamp_millis_opt((secs * 1000.0) as i64)
        .single()
        .ok_or_else(|| TriggerError::InvalidInstant(secs.to_string()))
}

/// Serde adapter: instants accepted as ISO strings or epoch seconds,
/// emitted as RFC-3339 strings.
pub(crate) mod wire_instant {
    use super::*;
    use serde::{Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    pub(super) enum Raw {
        Iso(String),
        Epoch(f64),
    }

    pub(super) fn raw_to_utc(raw: Raw) -> Result<DateTime<Utc>, TriggerError> {
        match raw {
            Raw::Iso(s) => parse_instant(&s),
            Raw::Epoch(secs) => epoch_secs_to_utc(secs),
        }
    }

    pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&dt.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = Raw::deserialize(d)?;
        raw_to_utc(raw).map_err(serde::de::Error::custom)
    }
}

/// Like [`wire_instant`] but for optional fields.
pub(crate) mod wire_instant_opt {
    use super::wire_instant::{raw_to_utc, Raw};
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(dt: &Option<DateTime<Utc>>, s: S) -> Result<S::Ok, S::Error> {
        match dt {
            Some(dt) => s.serialize_some(&dt.to_rfc3339()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw = Option::<Raw>::deserialize(d)?;
        raw.map(raw_to_utc).transpose().map_err(serde::de::Error::custom)
    }
}

/// One-shot trigger: fires exactly once at an absolute instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateTrigger {
    #[serde(with = "wire_instant")]
    pub run_date: DateTime<Utc>,
}

/// Repeating trigger with a fixed period and optional bounds.
///
/// The first fire is `start_time + period` (k ≥ 1). A trigger added without
/// an explicit `start_time` is anchored to its add time by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct IntervalTrigger {
    #[serde(default, skip_serializing_if = "is_zero")]
    pub weeks: f64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub days: f64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub hours: f64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub minutes: f64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub seconds: f64,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "wire_instant_opt")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "wire_instant_opt")]
    pub end_time: Option<DateTime<Utc>>,
}

fn is_zero(v: &f64) -> bool {
    *v == 0.0
}

impl IntervalTrigger {
    /// Create a pure-seconds interval (common case in tests and run-now retries).
    pub fn from_secs(seconds: f64) -> Self {
        Self { seconds, ..Self::default() }
    }

    /// Total period across all unit fields.
    pub fn period(&self) -> Result<ChronoDuration, TriggerError> {
        let secs = self.weeks * 604_800.0
            + self.days * 86_400.0
            + self.hours * 3_600.0
            + self.minutes * 60.0
            + self.seconds;
        if secs <= 0.0 || !secs.is_finite() {
            return Err(TriggerError::NonPositiveInterval);
        }
        Ok(ChronoDuration::milliseconds((secs * 1000.0).round() as i64))
    }
}

/// Cron field expression with optional seconds and timezone.
///
/// Unset fields default to `*` (seconds default to `0`). Fields accept
/// standard cron syntax: lists, ranges, and steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CronTrigger {
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "cron_field")]
    pub second: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "cron_field")]
    pub minute: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "cron_field")]
    pub hour: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "cron_field")]
    pub day: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "cron_field")]
    pub month: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "cron_field")]
    pub day_of_week: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "cron_field")]
    pub year: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

/// Cron fields arrive as strings or bare numbers (`"minute": 5`).
fn cron_field<'de, D: serde::Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Num(i64),
    }
    Ok(Option::<Raw>::deserialize(d)?.map(|raw| match raw {
        Raw::Str(s) => s,
        Raw::Num(n) => n.to_string(),
    }))
}

impl CronTrigger {
    /// Seven-field expression for the `cron` crate:
    /// `sec min hour day-of-month month day-of-week year`.
    pub fn expression(&self) -> String {
        let field = |f: &Option<String>, default: &str| {
            f.as_deref().unwrap_or(default).to_string()
        };
        [
            field(&self.second, "0"),
            field(&self.minute, "*"),
            field(&self.hour, "*"),
            field(&self.day, "*"),
            field(&self.month, "*"),
            field(&self.day_of_week, "*"),
            field(&self.year, "*"),
        ]
        .join(" ")
    }

    fn schedule(&self) -> Result<cron::Schedule, TriggerError> {
        let expr = self.expression();
        cron::Schedule::from_str(&expr)
            .map_err(|e| TriggerError::InvalidCron { expr, reason: e.to_string() })
    }

    fn tz(&self) -> Result<Tz, TriggerError> {
        match &self.timezone {
            Some(name) => {
                Tz::from_str(name).map_err(|_| TriggerError::UnknownTimezone(name.clone()))
            }
            None => Ok(Tz::UTC),
        }
    }
}

/// The rule producing next-fire-times for a schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Trigger {
    Date(DateTrigger),
    Interval(IntervalTrigger),
    Cron(CronTrigger),
}

impl Trigger {
    /// Validate without evaluating (schedule-add check).
    pub fn validate(&self) -> Result<(), TriggerError> {
        match self {
            Trigger::Date(_) => Ok(()),
            Trigger::Interval(t) => {
                t.period()?;
                if let (Some(start), Some(end)) = (t.start_time, t.end_time) {
                    if end < start {
                        return Err(TriggerError::EndBeforeStart);
                    }
                }
                Ok(())
            }
            Trigger::Cron(t) => {
                t.schedule()?;
                t.tz()?;
                Ok(())
            }
        }
    }

    /// Anchor an interval trigger missing an explicit start to `now`.
    ///
    /// Called once at schedule-add so that evaluation stays pure afterwards.
    pub fn anchor(&mut self, now: DateTime<Utc>) {
        if let Trigger::Interval(t) = self {
            if t.start_time.is_none() {
                t.start_time = Some(now);
            }
        }
    }

    /// The next fire strictly after `after`, or `None` when the trigger is
    /// exhausted.
    ///
    /// - date: the instant itself while `after ≤ run_date`, then exhausted
    /// - interval: smallest `k ≥ 1` with `start + k·period > after`, bounded
    ///   by `end_time` (a fire landing exactly on `end_time` is included)
    /// - cron: next matching instant in the trigger's timezone
    pub fn next_fire_after(
        &self,
        after: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, TriggerError> {
        match self {
            Trigger::Date(t) => {
                if after <= t.run_date {
                    Ok(Some(t.run_date))
                } else {
                    Ok(None)
                }
            }
            Trigger::Interval(t) => {
                let period_ms = t.period()?.num_milliseconds();
                let start = t.start_time.unwrap_or(after);
                let diff_ms = (after - start).num_milliseconds();
                let k = if diff_ms < 0 { 1 } else { diff_ms / period_ms + 1 };
                let candidate = start + ChronoDuration::milliseconds(period_ms * k);
                if let Some(end) = t.end_time {
                    if candidate > end {
                        return Ok(None);
                    }
                }
                Ok(Some(candidate))
            }
            Trigger::Cron(t) => {
                let schedule = t.schedule()?;
                let tz = t.tz()?;
                let local = after.with_timezone(&tz);
                Ok(schedule.after(&local).next().map(|dt| dt.with_timezone(&Utc)))
            }
        }
    }
}

crate::wire_name! {
    Trigger {
        Trigger::Date(..) => "date",
        Trigger::Interval(..) => "interval",
        Trigger::Cron(..) => "cron",
    }
}

#[cfg(test)]
#[path = "trigger_tests.rs"]
mod tests;
