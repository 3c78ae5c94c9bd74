// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixture: a full coordinator stack (store, registry, registration
//! listener, engine) on ephemeral ports, plus in-process handlers that
//! register themselves over the wire like real ones.

use cw_core::{ExecutionLog, RetryPolicy, SystemClock};
use cw_daemon::listener::RegistrationServer;
use cw_daemon::{Bus, Engine, EngineConfig, HandlerRegistry};
use cw_handler::{CoordinatorLink, HandlerService};
use cw_store::{ScheduleStore, StoreConfig};
use serde_json::json;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

pub struct Stack {
    pub engine: Arc<Engine<SystemClock>>,
    pub store: Arc<ScheduleStore>,
    pub reg_addr: String,
    _dir: tempfile::TempDir,
}

/// Engine config tuned for fast tests: short planner tick, short retries.
pub fn quick_config() -> EngineConfig {
    EngineConfig {
        planner_tick: Duration::from_millis(50),
        call_timeout: Duration::from_secs(2),
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(60),
            backoff_factor: 2.0,
            jitter_factor: 0.5,
        },
        ..EngineConfig::default()
    }
}

pub async fn stack(config: EngineConfig) -> Stack {
    let dir = tempfile::tempdir().expect("tempdir");
    let clock = SystemClock;
    let store = Arc::new(
        ScheduleStore::open(StoreConfig::new(
            dir.path().join("wal").join("schedules.wal"),
            dir.path().join("snapshot.zst"),
        ))
        .expect("store"),
    );
    let registry = Arc::new(
        HandlerRegistry::open(dir.path().join("registry.toml"), config.call_timeout, clock.clone())
            .expect("registry"),
    );
    let exec_log = Arc::new(ExecutionLog::new(1000, clock.clone()));
    let bus = Bus::new();
    // Single instance: always leader (the receiver keeps the last value
    // after the sender drops).
    let (_leader_tx, leader_rx) = watch::channel(true);
    let engine = Engine::new(
        Arc::clone(&store),
        Arc::clone(&registry),
        exec_log,
        bus.clone(),
        clock,
        config,
        leader_rx,
    );
    engine.spawn_loops();

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let reg_addr = listener.local_addr().expect("addr").to_string();
    let server = RegistrationServer::new(Arc::clone(&registry), bus.clone());
    tokio::spawn(server.run(listener, CancellationToken::new()));

    Stack { engine, store, reg_addr, _dir: dir }
}

/// An in-process handler exposing `echo`, `fail`, and `count` (echoes and
/// counts its invocations). Returns its address, cancel token, and counter.
pub async fn spawn_handler() -> (String, CancellationToken, Arc<AtomicUsize>) {
    use std::sync::atomic::Ordering;

    let counter = Arc::new(AtomicUsize::new(0));
    let count = Arc::clone(&counter);
    let service = HandlerService::new("spec-handler")
        .method("echo", Ok)
        .method("fail", |_| Err("boom".to_string()))
        .method("count", move |params| {
            count.fetch_add(1, Ordering::SeqCst);
            Ok(json!({ "params": params }))
        });

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let address = listener.local_addr().expect("addr").to_string();
    let cancel = CancellationToken::new();
    tokio::spawn(Arc::new(service).serve(listener, cancel.clone()));
    (address, cancel, counter)
}

/// Register a handler with the coordinator over the real registration
/// transport.
pub async fn register(stack: &Stack, handler_id: &str, address: &str) {
    let mut link = CoordinatorLink::new(stack.reg_addr.clone());
    link.register(
        handler_id,
        address,
        vec!["echo".to_string(), "fail".to_string(), "count".to_string()],
    )
    .await
    .expect("register");
    link.close().await;
}

/// Poll until `check` passes or the deadline lapses.
pub async fn wait_until(what: &str, mut check: impl FnMut() -> bool) {
    let result = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    })
    .await;
    assert!(result.is_ok(), "timed out waiting for {what}");
}
