// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Call request and reply envelopes.

use serde::{Deserialize, Serialize};

/// One request frame: `{"method": <string>, "params": <object>}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRequest {
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

impl CallRequest {
    pub fn new(method: impl Into<String>, params: serde_json::Value) -> Self {
        Self { method: method.into(), params }
    }
}

/// One reply frame: `{"success": <bool>, ...}`.
///
/// Successful replies carry the method's return value under `result`;
/// error replies carry a human-readable `error` string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallReply {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CallReply {
    pub fn ok(result: serde_json::Value) -> Self {
        Self { success: true, result: Some(result), error: None }
    }

    pub fn ok_empty() -> Self {
        Self { success: true, result: None, error: None }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self { success: false, result: None, error: Some(message.into()) }
    }

    /// The error string of a failed reply, or a placeholder when the peer
    /// sent `success: false` without one.
    pub fn error_message(&self) -> &str {
        self.error.as_deref().unwrap_or("handler reported failure")
    }
}

#[cfg(test)]
#[path = "call_tests.rs"]
mod tests;
