// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution record: one row per dispatch attempt.

use crate::job::JobId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Terminal-or-not status of an execution record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Attempt in flight; mutated exactly once to a terminal status.
    Running,
    Success,
    /// Final attempt failed (or a misfire was recorded).
    Error,
    /// Non-final attempt failed; a retry is pending.
    Retry,
}

crate::wire_name! {
    ExecutionStatus {
        ExecutionStatus::Running => "running",
        ExecutionStatus::Success => "success",
        ExecutionStatus::Error => "error",
        ExecutionStatus::Retry => "retry",
    }
}

/// What produced the record: a handler call or a skipped (misfired) fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionKind {
    #[default]
    Call,
    Misfire,
}

crate::wire_name! {
    ExecutionKind {
        ExecutionKind::Call => "call",
        ExecutionKind::Misfire => "misfire",
    }
}

/// Record of one job execution attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub job_id: JobId,
    pub handler_id: String,
    pub method_name: String,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<f64>,
    pub status: ExecutionStatus,
    #[serde(default, skip_serializing_if = "is_default_kind")]
    pub kind: ExecutionKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub attempt_number: u32,
    pub max_attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params_summary: Option<String>,
}

fn is_default_kind(kind: &ExecutionKind) -> bool {
    *kind == ExecutionKind::Call
}

const SUMMARY_MAX_PAIRS: usize = 5;
const SUMMARY_VALUE_CAP: usize = 50;
const SUMMARY_SCALAR_CAP: usize = 100;

/// Human-readable truncation of call params for the execution log.
///
/// Objects render as the first 5 `key=value` pairs (values capped at 50
/// chars) with a `(+N more)` marker; anything else renders as a string
/// capped at 100 chars. Empty objects and nulls yield `None`.
pub fn params_summary(params: &serde_json::Value) -> Option<String> {
    match params {
        serde_json::Value::Null => None,
        serde_json::Value::Object(map) if map.is_empty() => None,
        serde_json::Value::Object(map) => {
            let mut parts = Vec::with_capacity(SUMMARY_MAX_PAIRS);
            for (key, value) in map.iter().take(SUMMARY_MAX_PAIRS) {
                let mut rendered = match value {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                if rendered.chars().count() > SUMMARY_VALUE_CAP {
                    rendered = format!(
                        "{}...",
                        rendered.chars().take(SUMMARY_VALUE_CAP - 3).collect::<String>()
                    );
                }
                parts.push(format!("{key}={rendered}"));
            }
            let mut summary = parts.join(", ");
            if map.len() > SUMMARY_MAX_PAIRS {
                summary.push_str(&format!(" (+{} more)", map.len() - SUMMARY_MAX_PAIRS));
            }
            Some(summary)
        }
        other => {
            let rendered = match other {
                serde_json::Value::String(s) => s.clone(),
                v => v.to_string(),
            };
            Some(rendered.chars().take(SUMMARY_SCALAR_CAP).collect())
        }
    }
}

#[cfg(test)]
#[path = "record_tests.rs"]
mod tests;
