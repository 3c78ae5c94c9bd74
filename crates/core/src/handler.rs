// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Handler entry as persisted in the registry document.
//!
//! Only identity, endpoint, methods, and liveness timestamps are persisted.
//! The cached wire client lives in a parallel in-memory map owned by the
//! registry and is reconstructed on demand.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;

/// Liveness status of a registered handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerStatus {
    /// Known from the registry file or a fresh `register` call; not yet probed.
    Registered,
    /// A wire client reached it recently.
    Connected,
    /// The last probe or call failed.
    Disconnected,
    /// The handler reported itself down.
    Offline,
}

crate::wire_name! {
    HandlerStatus {
        HandlerStatus::Registered => "registered",
        HandlerStatus::Connected => "connected",
        HandlerStatus::Disconnected => "disconnected",
        HandlerStatus::Offline => "offline",
    }
}

impl FromStr for HandlerStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "registered" => Ok(HandlerStatus::Registered),
            "connected" => Ok(HandlerStatus::Connected),
            "disconnected" => Ok(HandlerStatus::Disconnected),
            "offline" => Ok(HandlerStatus::Offline),
            other => Err(format!("unknown handler status: {other}")),
        }
    }
}

/// Persisted registry entry for one handler, keyed by `handler_id` in the
/// registry document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerEntry {
    /// Transport endpoint (`host:port`) of the handler's reply socket.
    pub address: String,
    /// Method names the handler advertises.
    pub methods: BTreeSet<String>,
    pub registered_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub status: HandlerStatus,
}

impl HandlerEntry {
    pub fn new(address: impl Into<String>, methods: BTreeSet<String>, now: DateTime<Utc>) -> Self {
        Self {
            address: address.into(),
            methods,
            registered_at: now,
            last_updated: now,
            status: HandlerStatus::Registered,
        }
    }

    pub fn exposes(&self, method: &str) -> bool {
        self.methods.contains(method)
    }
}

#[cfg(test)]
#[path = "handler_tests.rs"]
mod tests;
