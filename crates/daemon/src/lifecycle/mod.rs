// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle: configuration, startup, shutdown.

use crate::broker::{BrokerConfig, EventBroker};
use crate::bus::{Bus, BusEvent, EventOrigin};
use crate::engine::{Engine, EngineConfig};
use crate::listener::RegistrationServer;
use crate::registry::HandlerRegistry;
use cw_core::{ExecutionLog, SchedulerEvent, SystemClock, DEFAULT_LOG_CAPACITY};
use cw_store::{ScheduleStore, StoreConfig};
use fs2::FileExt;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Root state directory (e.g. ~/.local/state/clockwork)
    pub state_dir: PathBuf,
    pub http_addr: String,
    pub reg_addr: String,
    pub wal_path: PathBuf,
    pub snapshot_path: PathBuf,
    pub registry_path: PathBuf,
    pub log_path: PathBuf,
    /// Path to lock/PID file
    pub lock_path: PathBuf,
    pub call_timeout: std::time::Duration,
    pub shutdown_timeout: std::time::Duration,
    /// Broker listen address and peers; `None` disables multi-instance mode.
    pub broker: Option<(String, Vec<String>, std::time::Duration)>,
}

impl Config {
    /// Load configuration from the environment.
    pub fn load() -> Result<Self, LifecycleError> {
        let state_dir = crate::env::state_dir()?;
        Ok(Self {
            http_addr: crate::env::http_addr(),
            reg_addr: crate::env::reg_addr(),
            wal_path: crate::env::db_path(&state_dir),
            snapshot_path: state_dir.join("snapshot.zst"),
            registry_path: crate::env::registry_path(&state_dir),
            log_path: crate::env::log_file(&state_dir),
            lock_path: state_dir.join("daemon.pid"),
            call_timeout: crate::env::call_timeout(),
            shutdown_timeout: crate::env::shutdown_timeout(),
            broker: crate::env::broker_addr().map(|addr| {
                (addr, crate::env::broker_peers(), crate::env::heartbeat_interval())
            }),
            state_dir,
        })
    }
}

/// Lifecycle errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Could not determine state directory")]
    NoStateDir,

    #[error("Failed to acquire lock: daemon already running?")]
    LockFailed(#[source] std::io::Error),

    #[error("Failed to bind {0}: {1}")]
    BindFailed(String, std::io::Error),

    #[error("store error: {0}")]
    Store(#[from] cw_store::StoreError),

    #[error("registry error: {0}")]
    Registry(#[from] crate::registry::RegistryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A running daemon: the engine plus its background services.
pub struct Daemon {
    pub config: Config,
    pub engine: Arc<Engine<SystemClock>>,
    pub broker: Option<Arc<EventBroker>>,
    pub registry: Arc<HandlerRegistry<SystemClock>>,
    pub store: Arc<ScheduleStore>,
    pub bus: Bus,
    cancel: CancellationToken,
    // NOTE(lifetime): held to maintain the exclusive lock; released on drop
    #[allow(dead_code)]
    lock_file: File,
}

impl std::fmt::Debug for Daemon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Daemon").field("config", &self.config).finish_non_exhaustive()
    }
}

/// Bring the daemon up: lock, stores, listeners, loops.
pub async fn startup(config: Config) -> Result<Daemon, LifecycleError> {
    std::fs::create_dir_all(&config.state_dir)?;
    let lock_file = acquire_lock(&config.lock_path)?;

    let clock = SystemClock;
    let store = Arc::new(ScheduleStore::open(StoreConfig {
        claim_lease: std::time::Duration::from_secs(30),
        compact_after: 1024,
        wal_path: config.wal_path.clone(),
        snapshot_path: config.snapshot_path.clone(),
    })?);
    let registry = Arc::new(HandlerRegistry::open(
        config.registry_path.clone(),
        config.call_timeout,
        clock.clone(),
    )?);
    let exec_log = Arc::new(ExecutionLog::new(DEFAULT_LOG_CAPACITY, clock.clone()));
    let bus = Bus::new();
    let cancel = CancellationToken::new();

    // Optional broker: peers converge through it and only its elected
    // leader runs the planner.
    let (broker, leader_rx) = match &config.broker {
        Some((listen_addr, peers, heartbeat_interval)) => {
            let listener = TcpListener::bind(listen_addr)
                .await
                .map_err(|e| LifecycleError::BindFailed(listen_addr.clone(), e))?;
            let mut broker_config = BrokerConfig::new(listen_addr.clone(), peers.clone());
            broker_config.heartbeat_interval = *heartbeat_interval;
            let broker = EventBroker::new(broker_config, bus.clone());
            broker.run(listener, cancel.clone());
            let leader_rx = broker.leader_watch();
            (Some(broker), leader_rx)
        }
        None => {
            // Single instance: always leader. The receiver keeps serving the
            // last value after the sender drops.
            let (_tx, rx) = watch::channel(true);
            (None, rx)
        }
    };

    let engine = Engine::new(
        Arc::clone(&store),
        Arc::clone(&registry),
        exec_log,
        bus.clone(),
        clock,
        EngineConfig {
            call_timeout: config.call_timeout,
            shutdown_timeout: config.shutdown_timeout,
            ..EngineConfig::default()
        },
        leader_rx,
    );
    engine.spawn_loops();

    // Registration transport.
    let reg_listener = TcpListener::bind(&config.reg_addr)
        .await
        .map_err(|e| LifecycleError::BindFailed(config.reg_addr.clone(), e))?;
    let server = RegistrationServer::new(Arc::clone(&registry), bus.clone());
    tokio::spawn(server.run(reg_listener, cancel.clone()));

    // HTTP front-end with graceful shutdown.
    let http_listener = TcpListener::bind(&config.http_addr)
        .await
        .map_err(|e| LifecycleError::BindFailed(config.http_addr.clone(), e))?;
    let router = crate::http::router(Arc::clone(&engine));
    let http_cancel = cancel.clone();
    tokio::spawn(async move {
        let shutdown = async move { http_cancel.cancelled().await };
        if let Err(e) = axum::serve(http_listener, router)
            .with_graceful_shutdown(shutdown)
            .await
        {
            warn!("http server error: {e}");
        }
    });

    // Convergence: apply schedule events from peer instances to the local
    // store so a follower can take over planning at any time.
    let converge_store = Arc::clone(&store);
    let mut converge_rx = bus.subscribe();
    let converge_cancel = cancel.clone();
    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                _ = converge_cancel.cancelled() => return,
                received = converge_rx.recv() => match received {
                    Ok(BusEvent { origin: EventOrigin::Remote { .. }, event }) => event,
                    Ok(_) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "convergence lagged behind the bus");
                        continue;
                    }
                    Err(_) => return,
                },
            };
            let outcome = match event {
                SchedulerEvent::ScheduleAdded { schedule } => {
                    converge_store.put(*schedule, true).map(|_| ())
                }
                SchedulerEvent::ScheduleRemoved { schedule_id } => {
                    converge_store.remove(&schedule_id).map(|_| ())
                }
                SchedulerEvent::ScheduleReleased { schedule_id, next_fire_time } => {
                    converge_store.release(&schedule_id, next_fire_time).map(|_| ())
                }
                _ => Ok(()),
            };
            if let Err(e) = outcome {
                warn!(error = %e, "failed to apply peer event");
            }
        }
    });

    info!(
        http = %config.http_addr,
        registration = %config.reg_addr,
        broker = config.broker.is_some(),
        "coordinator up"
    );
    Ok(Daemon { config, engine, broker, registry, store, bus, cancel, lock_file })
}

impl Daemon {
    /// Graceful shutdown: announce, drain, release.
    pub async fn shutdown(self) {
        info!("shutting down coordinator");
        if let Some(broker) = &self.broker {
            broker.announce_shutdown().await;
        }
        self.engine.shutdown().await;
        self.cancel.cancel();
        self.registry.close_all().await;
        if let Err(e) = self.store.compact() {
            warn!("final store compaction failed: {e}");
        }
        if self.config.lock_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.config.lock_path) {
                warn!("failed to remove pid file: {e}");
            }
        }
        info!("coordinator shutdown complete");
    }
}

fn acquire_lock(path: &std::path::Path) -> Result<File, LifecycleError> {
    let mut file = File::options()
        .create(true)
        .write(true)
        .truncate(false)
        .open(path)
        .map_err(LifecycleError::LockFailed)?;
    file.try_lock_exclusive().map_err(LifecycleError::LockFailed)?;
    file.set_len(0)?;
    writeln!(file, "{}", std::process::id())?;
    Ok(file)
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
