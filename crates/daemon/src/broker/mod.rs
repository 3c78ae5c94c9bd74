// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Inter-instance event broker.
//!
//! Peers exchange framed JSON messages (one serialization, no inner
//! encoding): scheduler events, heartbeats, and shutdown notices. Each
//! instance tracks the peers it has heard from, evicts silent ones after
//! three missed heartbeats, and re-runs leader election (lowest pid wins)
//! on every membership change. Transient disagreements while heartbeats
//! propagate are acceptable; leadership only gates singleton work such as
//! the planner loop.

use crate::bus::{Bus, BusEvent, EventOrigin};
use cw_core::SchedulerEvent;
use cw_wire::{read_message, write_message};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Missed heartbeats before a peer is considered gone.
const MISSED_HEARTBEATS: u32 = 3;

#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub instance_id: String,
    /// Address peers dial to reach this instance.
    pub listen_addr: String,
    pub peers: Vec<String>,
    pub heartbeat_interval: Duration,
    /// Election identity; normally the OS pid, injectable for tests.
    pub pid: u32,
}

impl BrokerConfig {
    pub fn new(listen_addr: impl Into<String>, peers: Vec<String>) -> Self {
        let pid = std::process::id();
        Self {
            instance_id: format!("scheduler-{pid}"),
            listen_addr: listen_addr.into(),
            peers,
            heartbeat_interval: Duration::from_secs(5),
            pid,
        }
    }
}

/// Wire envelope between coordinator instances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BrokerMessage {
    Event { instance_id: String, pid: u32, event: SchedulerEvent },
    Heartbeat { instance_id: String, pid: u32, address: String },
    Shutdown { instance_id: String, pid: u32 },
}

struct InstanceInfo {
    pid: u32,
    address: String,
    last_seen: Instant,
}

pub struct EventBroker {
    config: BrokerConfig,
    alive: Mutex<HashMap<String, InstanceInfo>>,
    leader_tx: watch::Sender<bool>,
    bus: Bus,
    /// Outbound links, keyed by peer address. Rebuilt on send failure.
    links: tokio::sync::Mutex<HashMap<String, TcpStream>>,
}

impl EventBroker {
    pub fn new(config: BrokerConfig, bus: Bus) -> Arc<Self> {
        // Alone in the cluster until a heartbeat arrives, hence leader.
        let (leader_tx, _) = watch::channel(true);
        Arc::new(Self {
            config,
            alive: Mutex::new(HashMap::new()),
            leader_tx,
            bus,
            links: tokio::sync::Mutex::new(HashMap::new()),
        })
    }

    pub fn is_leader(&self) -> bool {
        *self.leader_tx.borrow()
    }

    pub fn leader_watch(&self) -> watch::Receiver<bool> {
        self.leader_tx.subscribe()
    }

    pub fn instance_id(&self) -> &str {
        &self.config.instance_id
    }

    /// Snapshot of currently-alive peers as `(instance_id, pid)`.
    pub fn alive_instances(&self) -> Vec<(String, u32)> {
        self.alive.lock().iter().map(|(id, info)| (id.clone(), info.pid)).collect()
    }

    /// Spawn the broker's background loops: heartbeat, subscribe (accept),
    /// cleanup, and local-event forwarding.
    pub fn run(self: &Arc<Self>, listener: TcpListener, cancel: CancellationToken) {
        info!(
            instance_id = %self.config.instance_id,
            pid = self.config.pid,
            peers = self.config.peers.len(),
            "event broker started"
        );
        let broker = Arc::clone(self);
        let token = cancel.clone();
        tokio::spawn(async move { broker.heartbeat_loop(token).await });
        let broker = Arc::clone(self);
        let token = cancel.clone();
        tokio::spawn(async move { broker.accept_loop(listener, token).await });
        let broker = Arc::clone(self);
        let token = cancel.clone();
        tokio::spawn(async move { broker.cleanup_loop(token).await });
        let broker = Arc::clone(self);
        tokio::spawn(async move { broker.forward_loop(cancel).await });
    }

    /// Broadcast a scheduler event to every peer. Local delivery already
    /// happened on the bus before this is called.
    pub async fn publish(&self, event: SchedulerEvent) {
        let message = BrokerMessage::Event {
            instance_id: self.config.instance_id.clone(),
            pid: self.config.pid,
            event,
        };
        self.send_to_peers(&message).await;
    }

    /// Tell peers this instance is going away, so they re-elect without
    /// waiting out the heartbeat window.
    pub async fn announce_shutdown(&self) {
        let message = BrokerMessage::Shutdown {
            instance_id: self.config.instance_id.clone(),
            pid: self.config.pid,
        };
        self.send_to_peers(&message).await;
    }

    async fn heartbeat_loop(&self, cancel: CancellationToken) {
        let mut tick = tokio::time::interval(self.config.heartbeat_interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tick.tick() => {}
            }
            let message = BrokerMessage::Heartbeat {
                instance_id: self.config.instance_id.clone(),
                pid: self.config.pid,
                address: self.config.listen_addr.clone(),
            };
            self.send_to_peers(&message).await;
        }
    }

    async fn cleanup_loop(&self, cancel: CancellationToken) {
        let mut tick = tokio::time::interval(self.config.heartbeat_interval * 2);
        let window = self.config.heartbeat_interval * MISSED_HEARTBEATS;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tick.tick() => {}
            }
            let evicted: Vec<String> = {
                let mut alive = self.alive.lock();
                let now = Instant::now();
                let gone: Vec<String> = alive
                    .iter()
                    .filter(|(_, info)| now.duration_since(info.last_seen) > window)
                    .map(|(id, _)| id.clone())
                    .collect();
                for id in &gone {
                    alive.remove(id);
                }
                gone
            };
            if !evicted.is_empty() {
                for id in &evicted {
                    warn!(instance_id = %id, "peer missed {MISSED_HEARTBEATS} heartbeats, evicted");
                }
                self.run_election();
            }
        }
    }

    async fn accept_loop(self: Arc<Self>, listener: TcpListener, cancel: CancellationToken) {
        loop {
            let accepted = tokio::select! {
                _ = cancel.cancelled() => return,
                accepted = listener.accept() => accepted,
            };
            match accepted {
                Ok((mut stream, _)) => {
                    let broker = Arc::clone(&self);
                    let cancel = cancel.clone();
                    tokio::spawn(async move {
                        loop {
                            let message: BrokerMessage = tokio::select! {
                                _ = cancel.cancelled() => return,
                                read = read_message(&mut stream) => match read {
                                    Ok(message) => message,
                                    Err(_) => return,
                                },
                            };
                            broker.handle_message(message);
                        }
                    });
                }
                Err(e) => warn!("broker accept error: {e}"),
            }
        }
    }

    /// Forward locally-originated bus events to peers. Remote-originated
    /// events are never re-forwarded, which breaks echo cycles.
    async fn forward_loop(&self, cancel: CancellationToken) {
        let mut rx = self.bus.subscribe();
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => return,
                received = rx.recv() => match received {
                    Ok(BusEvent { origin: EventOrigin::Local, event }) => event,
                    Ok(_) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "broker forwarding lagged behind the bus");
                        continue;
                    }
                    Err(_) => return,
                },
            };
            self.publish(event).await;
        }
    }

    fn handle_message(&self, message: BrokerMessage) {
        match message {
            BrokerMessage::Heartbeat { instance_id, pid, address } => {
                if instance_id == self.config.instance_id {
                    return;
                }
                let is_new = {
                    let mut alive = self.alive.lock();
                    let is_new = !alive.contains_key(&instance_id);
                    alive.insert(
                        instance_id.clone(),
                        InstanceInfo { pid, address, last_seen: Instant::now() },
                    );
                    is_new
                };
                if is_new {
                    info!(instance_id = %instance_id, pid, "peer instance alive");
                    self.run_election();
                }
            }
            BrokerMessage::Shutdown { instance_id, .. } => {
                let removed = self.alive.lock().remove(&instance_id).is_some();
                if removed {
                    info!(instance_id = %instance_id, "peer instance shut down");
                    self.run_election();
                }
            }
            BrokerMessage::Event { instance_id, event, .. } => {
                if instance_id == self.config.instance_id {
                    return;
                }
                debug!(from = %instance_id, kind = %event, "peer event");
                self.bus.publish_remote(instance_id, event);
            }
        }
    }

    /// Deterministic election: lowest pid across self and alive peers.
    fn run_election(&self) {
        let lowest_peer = self.alive.lock().values().map(|info| info.pid).min();
        let is_leader = lowest_peer.is_none_or(|pid| self.config.pid <= pid);
        self.leader_tx.send_if_modified(|current| {
            if *current != is_leader {
                if is_leader {
                    info!(pid = self.config.pid, "elected leader");
                } else {
                    info!(pid = self.config.pid, "lost leadership");
                }
                *current = is_leader;
                true
            } else {
                false
            }
        });
    }

    async fn send_to_peers(&self, message: &BrokerMessage) {
        let mut links = self.links.lock().await;
        for peer in &self.config.peers {
            if !links.contains_key(peer) {
                match TcpStream::connect(peer).await {
                    Ok(stream) => {
                        links.insert(peer.clone(), stream);
                    }
                    Err(e) => {
                        debug!(peer = %peer, "peer unreachable: {e}");
                        continue;
                    }
                }
            }
            let failed = match links.get_mut(peer) {
                Some(stream) => write_message(stream, message).await.is_err(),
                None => false,
            };
            if failed {
                // Stale link; drop it and retry on the next send.
                links.remove(peer);
            }
        }
    }
}

#[cfg(test)]
#[path = "broker_tests.rs"]
mod tests;
