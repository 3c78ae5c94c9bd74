// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for engine tests.

use super::{Engine, EngineConfig};
use crate::bus::Bus;
use crate::registry::HandlerRegistry;
use cw_core::{ExecutionLog, FakeClock, RetryPolicy};
use cw_handler::HandlerService;
use cw_store::{ScheduleStore, StoreConfig};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

pub(crate) struct TestEngine {
    pub engine: Arc<Engine<FakeClock>>,
    pub clock: FakeClock,
    pub registry: Arc<HandlerRegistry<FakeClock>>,
    pub store: Arc<ScheduleStore>,
    pub bus: Bus,
    pub leader_tx: watch::Sender<bool>,
    _dir: tempfile::TempDir,
}

/// Retry policy with sub-second delays so tests finish quickly.
pub(crate) fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(30),
        backoff_factor: 2.0,
        jitter_factor: 0.0,
    }
}

pub(crate) fn test_engine(mut config: EngineConfig) -> TestEngine {
    let dir = tempfile::tempdir().expect("tempdir");
    let clock = FakeClock::new();
    let store = Arc::new(
        ScheduleStore::open(StoreConfig::new(
            dir.path().join("wal").join("schedules.wal"),
            dir.path().join("snapshot.zst"),
        ))
        .expect("store"),
    );
    let registry = Arc::new(
        HandlerRegistry::open(
            dir.path().join("registry.toml"),
            config.call_timeout,
            clock.clone(),
        )
        .expect("registry"),
    );
    let exec_log = Arc::new(ExecutionLog::new(100, clock.clone()));
    let bus = Bus::new();
    let (leader_tx, leader_rx) = watch::channel(true);
    config.planner_tick = Duration::from_millis(50);
    let engine = Engine::new(
        Arc::clone(&store),
        Arc::clone(&registry),
        exec_log,
        bus.clone(),
        clock.clone(),
        config,
        leader_rx,
    );
    TestEngine { engine, clock, registry, store, bus, leader_tx, _dir: dir }
}

/// Spawn an in-process handler exposing `echo`, `fail`, and `flaky`
/// (fails until the given number of calls have been seen).
pub(crate) async fn spawn_test_handler(
    fail_first: usize,
) -> (String, CancellationToken, Arc<std::sync::atomic::AtomicUsize>) {
    use std::sync::atomic::{AtomicUsize, Ordering};

    let calls = Arc::new(AtomicUsize::new(0));
    let flaky_calls = Arc::clone(&calls);
    let service = HandlerService::new("test-handler")
        .method("echo", Ok)
        .method("fail", |_| Err("boom".to_string()))
        .method("flaky", move |params| {
            let n = flaky_calls.fetch_add(1, Ordering::SeqCst);
            if n < fail_first {
                Err(format!("flaky failure #{n}"))
            } else {
                Ok(json!({"recovered_after": n}))
            }
        });

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let address = listener.local_addr().expect("addr").to_string();
    let cancel = CancellationToken::new();
    tokio::spawn(Arc::new(service).serve(listener, cancel.clone()));
    (address, cancel, calls)
}

/// Register the spawned handler under `handler_id`.
pub(crate) fn register_handler(fixture: &TestEngine, handler_id: &str, address: &str) {
    fixture
        .registry
        .register(
            handler_id,
            address,
            vec!["echo".to_string(), "fail".to_string(), "flaky".to_string()],
        )
        .expect("register");
}
