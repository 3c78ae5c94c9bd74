// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local event bus.
//!
//! Every schedule/job state change is published here tagged with its
//! origin. The broker forwards local events to peers and re-injects peer
//! events as remote; the convergence task applies remote schedule events to
//! the local store. The origin tag is what prevents echo loops.

use cw_core::SchedulerEvent;
use tokio::sync::broadcast;

const BUS_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub enum EventOrigin {
    Local,
    Remote { instance_id: String },
}

#[derive(Debug, Clone)]
pub struct BusEvent {
    pub origin: EventOrigin,
    pub event: SchedulerEvent,
}

#[derive(Clone)]
pub struct Bus {
    tx: broadcast::Sender<BusEvent>,
}

impl Bus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    pub fn publish_local(&self, event: SchedulerEvent) {
        let _ = self.tx.send(BusEvent { origin: EventOrigin::Local, event });
    }

    pub fn publish_remote(&self, instance_id: impl Into<String>, event: SchedulerEvent) {
        let _ = self.tx.send(BusEvent {
            origin: EventOrigin::Remote { instance_id: instance_id.into() },
            event,
        });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.tx.subscribe()
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
