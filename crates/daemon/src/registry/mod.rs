// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Handler registry: the authoritative map of handlers.
//!
//! Persisted fields (identity, address, methods, timestamps, status) live in
//! the registry document; cached wire clients live in a parallel in-memory
//! map keyed by handler id and are reconstructed on demand. The registry
//! lock is never held across a network suspension point: the client
//! construction path drops it around the blocking connect and rechecks
//! before storing, discarding the loser of a construction race.

mod file;

pub use file::RegistryFileError;

use cw_core::{Clock, HandlerEntry, HandlerStatus};
use cw_wire::WireClient;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

/// A cached client, serialized per handler by its async lock.
pub type SharedClient = Arc<AsyncMutex<WireClient>>;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("invalid registration: {0}")]
    Invalid(String),

    #[error("handler '{0}' is not registered")]
    NotFound(String),

    #[error("handler '{handler_id}' unavailable: {reason}")]
    Unavailable { handler_id: String, reason: String },

    #[error("failed to persist registry: {0}")]
    Persist(#[from] RegistryFileError),
}

/// Snapshot of one handler for API listings.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct HandlerSummary {
    pub handler_id: String,
    pub address: String,
    pub methods: Vec<String>,
    pub status: HandlerStatus,
    pub registered_at: chrono::DateTime<chrono::Utc>,
    pub last_updated: chrono::DateTime<chrono::Utc>,
}

struct RegistryInner {
    entries: BTreeMap<String, HandlerEntry>,
    clients: HashMap<String, SharedClient>,
}

pub struct HandlerRegistry<C: Clock> {
    inner: Mutex<RegistryInner>,
    path: PathBuf,
    call_timeout: Duration,
    probe_timeout: Duration,
    clock: C,
}

impl<C: Clock> HandlerRegistry<C> {
    /// Load the registry document. Entries come back with no cached client
    /// and status `Registered` until the first successful probe.
    pub fn open(
        path: impl Into<PathBuf>,
        call_timeout: Duration,
        clock: C,
    ) -> Result<Self, RegistryError> {
        let path = path.into();
        let mut entries = file::load(&path)?;
        for entry in entries.values_mut() {
            entry.status = HandlerStatus::Registered;
        }
        if !entries.is_empty() {
            info!(count = entries.len(), "loaded handler registry");
        }
        Ok(Self {
            inner: Mutex::new(RegistryInner { entries, clients: HashMap::new() }),
            path,
            call_timeout,
            probe_timeout: Duration::from_secs(2),
            clock,
        })
    }

    /// Upsert a handler. An address change retires the cached client before
    /// anything can dispatch to the stale endpoint.
    pub fn register(
        &self,
        handler_id: &str,
        address: &str,
        methods: Vec<String>,
    ) -> Result<(), RegistryError> {
        if handler_id.is_empty() {
            return Err(RegistryError::Invalid("handler_id must not be empty".to_string()));
        }
        if address.is_empty() {
            return Err(RegistryError::Invalid("address must not be empty".to_string()));
        }

        let now = self.clock.now_utc();
        let methods: BTreeSet<String> = methods.into_iter().collect();
        let snapshot = {
            let mut inner = self.inner.lock();
            let address_changed =
                inner.entries.get(handler_id).is_some_and(|e| e.address != address);
            if address_changed {
                if let Some(old) = inner.clients.remove(handler_id) {
                    debug!(handler_id, "address changed, retiring cached client");
                    retire_client(old);
                }
            }
            match inner.entries.entry(handler_id.to_string()) {
                std::collections::btree_map::Entry::Occupied(mut occupied) => {
                    let entry = occupied.get_mut();
                    entry.address = address.to_string();
                    entry.methods = methods;
                    entry.last_updated = now;
                    entry.status = HandlerStatus::Registered;
                }
                std::collections::btree_map::Entry::Vacant(vacant) => {
                    vacant.insert(HandlerEntry::new(address, methods, now));
                }
            }
            inner.entries.clone()
        };
        file::save_atomic(&self.path, &snapshot)?;
        info!(handler_id, address, "handler registered");
        Ok(())
    }

    /// Update liveness fields from a handler's own status report.
    pub fn report_status(
        &self,
        handler_id: &str,
        status: HandlerStatus,
    ) -> Result<(), RegistryError> {
        let now = self.clock.now_utc();
        let snapshot = {
            let mut inner = self.inner.lock();
            let entry = inner
                .entries
                .get_mut(handler_id)
                .ok_or_else(|| RegistryError::NotFound(handler_id.to_string()))?;
            entry.status = status;
            entry.last_updated = now;
            if status == HandlerStatus::Offline {
                if let Some(old) = inner.clients.remove(handler_id) {
                    retire_client(old);
                }
            }
            inner.entries.clone()
        };
        file::save_atomic(&self.path, &snapshot)?;
        Ok(())
    }

    /// Remove a handler and its cached client.
    pub fn unregister(&self, handler_id: &str) -> Result<(), RegistryError> {
        let snapshot = {
            let mut inner = self.inner.lock();
            if inner.entries.remove(handler_id).is_none() {
                return Err(RegistryError::NotFound(handler_id.to_string()));
            }
            if let Some(old) = inner.clients.remove(handler_id) {
                retire_client(old);
            }
            inner.entries.clone()
        };
        file::save_atomic(&self.path, &snapshot)?;
        info!(handler_id, "handler unregistered");
        Ok(())
    }

    pub fn get_entry(&self, handler_id: &str) -> Option<HandlerEntry> {
        self.inner.lock().entries.get(handler_id).cloned()
    }

    /// Snapshot of all entries with their current in-memory status.
    pub fn list(&self) -> Vec<HandlerSummary> {
        let inner = self.inner.lock();
        inner
            .entries
            .iter()
            .map(|(id, entry)| HandlerSummary {
                handler_id: id.clone(),
                address: entry.address.clone(),
                methods: entry.methods.iter().cloned().collect(),
                status: entry.status,
                registered_at: entry.registered_at,
                last_updated: entry.last_updated,
            })
            .collect()
    }

    /// Return a usable client for the handler.
    ///
    /// A cached client is probed with a short-timeout ping first; a probe
    /// failure leaves the entry but nulls the cached client and a fresh one
    /// is constructed. Construction happens outside the registry lock.
    pub async fn get_client(&self, handler_id: &str) -> Result<SharedClient, RegistryError> {
        let (address, cached) = {
            let inner = self.inner.lock();
            let entry = inner
                .entries
                .get(handler_id)
                .ok_or_else(|| RegistryError::NotFound(handler_id.to_string()))?;
            (entry.address.clone(), inner.clients.get(handler_id).cloned())
        };

        if let Some(client) = cached {
            if self.probe(&client).await {
                self.set_status(handler_id, HandlerStatus::Connected);
                return Ok(client);
            }
            // Probe failed: null the cached client, keep the entry.
            let mut inner = self.inner.lock();
            if inner.clients.get(handler_id).is_some_and(|c| Arc::ptr_eq(c, &client)) {
                inner.clients.remove(handler_id);
            }
            self.mark(&mut inner, handler_id, HandlerStatus::Disconnected);
            drop(inner);
            retire_client(client);
        }

        // Blocking connect with no lock held.
        let mut client = WireClient::new(address.clone()).with_timeout(self.call_timeout);
        client.connect().await.map_err(|e| {
            self.set_status(handler_id, HandlerStatus::Disconnected);
            RegistryError::Unavailable { handler_id: handler_id.to_string(), reason: e.to_string() }
        })?;
        let fresh: SharedClient = Arc::new(AsyncMutex::new(client));

        // Recheck under the lock; discard the loser of a construction race
        // or a client built for a stale address.
        let mut inner = self.inner.lock();
        let Some(entry) = inner.entries.get(handler_id) else {
            return Err(RegistryError::NotFound(handler_id.to_string()));
        };
        if entry.address != address {
            drop(inner);
            retire_client(fresh);
            return Err(RegistryError::Unavailable {
                handler_id: handler_id.to_string(),
                reason: "address changed during connect".to_string(),
            });
        }
        if let Some(winner) = inner.clients.get(handler_id).cloned() {
            drop(inner);
            retire_client(fresh);
            return Ok(winner);
        }
        inner.clients.insert(handler_id.to_string(), Arc::clone(&fresh));
        self.mark(&mut inner, handler_id, HandlerStatus::Connected);
        Ok(fresh)
    }

    /// Short-timeout liveness check used by handler listings.
    pub async fn check_liveness(&self, handler_id: &str) -> bool {
        match self.get_client(handler_id).await {
            Ok(client) => {
                let alive = self.probe(&client).await;
                self.set_status(
                    handler_id,
                    if alive { HandlerStatus::Connected } else { HandlerStatus::Disconnected },
                );
                alive
            }
            Err(_) => false,
        }
    }

    /// Record the outcome of a dispatch call for the liveness view.
    pub fn note_call_result(&self, handler_id: &str, ok: bool) {
        self.set_status(
            handler_id,
            if ok { HandlerStatus::Connected } else { HandlerStatus::Disconnected },
        );
    }

    /// Release every cached client; used at shutdown.
    pub async fn close_all(&self) {
        let clients: Vec<SharedClient> = {
            let mut inner = self.inner.lock();
            inner.clients.drain().map(|(_, c)| c).collect()
        };
        for client in clients {
            client.lock().await.close().await;
        }
    }

    async fn probe(&self, client: &SharedClient) -> bool {
        let mut guard = client.lock().await;
        matches!(
            guard
                .call_with_timeout("ping", serde_json::json!({}), self.probe_timeout)
                .await,
            Ok(reply) if reply.success
        )
    }

    fn set_status(&self, handler_id: &str, status: HandlerStatus) {
        let mut inner = self.inner.lock();
        self.mark(&mut inner, handler_id, status);
    }

    fn mark(&self, inner: &mut RegistryInner, handler_id: &str, status: HandlerStatus) {
        if let Some(entry) = inner.entries.get_mut(handler_id) {
            entry.status = status;
            entry.last_updated = self.clock.now_utc();
        }
    }
}

/// Retire a client that must see no further requests: terminate in place if
/// uncontended, otherwise close it in the background once its in-flight
/// call finishes.
fn retire_client(client: SharedClient) {
    if let Ok(mut guard) = client.try_lock() {
        guard.terminate();
        return;
    }
    if let Ok(handle) = tokio::runtime::Handle::try_current() {
        handle.spawn(async move {
            client.lock().await.close().await;
        });
    } else {
        warn!("retiring busy wire client without a runtime; dropping");
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
