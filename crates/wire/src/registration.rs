// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed views of the registration endpoint's request set.
//!
//! Registration shares the call envelope: handlers send
//! `{"method": "register", "params": {...}}` and friends over the same
//! framed transport the coordinator uses to dispatch jobs.

use crate::call::CallRequest;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterParams {
    pub handler_id: String,
    pub address: String,
    pub methods: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportStatusParams {
    pub handler_id: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnregisterParams {
    pub handler_id: String,
}

/// A decoded registration request.
#[derive(Debug, Clone, PartialEq)]
pub enum RegistrationRequest {
    Register(RegisterParams),
    ReportStatus(ReportStatusParams),
    Unregister(UnregisterParams),
    Ping,
}

impl RegistrationRequest {
    /// Decode a call envelope into a registration request.
    ///
    /// Unknown methods and malformed params are reported as strings so the
    /// server can reply `{success: false, error}` without mutating state.
    pub fn from_call(call: &CallRequest) -> Result<Self, String> {
        let params = |what: &str| -> Result<serde_json::Value, String> {
            if call.params.is_null() {
                Err(format!("missing params for '{what}'"))
            } else {
                Ok(call.params.clone())
            }
        };
        match call.method.as_str() {
            "register" => serde_json::from_value(params("register")?)
                .map(RegistrationRequest::Register)
                .map_err(|e| format!("invalid register params: {e}")),
            "report_status" => serde_json::from_value(params("report_status")?)
                .map(RegistrationRequest::ReportStatus)
                .map_err(|e| format!("invalid report_status params: {e}")),
            "unregister" => serde_json::from_value(params("unregister")?)
                .map(RegistrationRequest::Unregister)
                .map_err(|e| format!("invalid unregister params: {e}")),
            "ping" => Ok(RegistrationRequest::Ping),
            other => Err(format!("unknown method: {other}")),
        }
    }
}

#[cfg(test)]
#[path = "registration_tests.rs"]
mod tests;
