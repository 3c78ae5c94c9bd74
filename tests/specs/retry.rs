// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Retry exhaustion: attempt counts, statuses, and backoff bounds.

use super::support::*;
use cw_core::ExecutionStatus;
use serde_json::json;
use std::time::Duration;

#[tokio::test]
async fn retry_exhaustion_records_every_attempt_with_bounded_delays() {
    let stack = stack(quick_config()).await;
    let (address, _handler_cancel, _) = spawn_handler().await;
    register(&stack, "H", &address).await;

    let err = stack.engine.run_now("H", "fail", json!({})).await.unwrap_err();
    assert!(err.to_string().contains("boom"), "got: {err}");

    let mut records = stack.engine.exec_log().get_recent(10);
    records.reverse(); // oldest first
    assert_eq!(records.len(), 3);
    assert_eq!(
        records.iter().map(|r| r.attempt_number).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    assert_eq!(records[0].status, ExecutionStatus::Retry);
    assert_eq!(records[1].status, ExecutionStatus::Retry);
    assert_eq!(records[2].status, ExecutionStatus::Error);
    // Invariant: exactly one record per attempt, each with a distinct
    // attempt number within [1, max_attempts].
    assert!(records.iter().all(|r| r.max_attempts == 3));

    // Observed inter-attempt delays stay inside the jitter envelope:
    // base 60ms, factor 2, jitter 0.5 → [30, 90] then [60, 180], with some
    // slack for scheduling.
    let policy = quick_config().retry;
    for (i, pair) in records.windows(2).enumerate() {
        let gap = pair[1].started_at - pair[0].completed_at.unwrap();
        let gap = Duration::from_millis(gap.num_milliseconds().max(0) as u64);
        let (lo, hi) = policy.delay_bounds((i + 1) as u32);
        assert!(gap >= lo, "attempt {} retried after only {gap:?}", i + 2);
        assert!(
            gap <= hi + Duration::from_millis(250),
            "attempt {} retried after {gap:?}",
            i + 2
        );
    }

    // Later attempts start strictly after earlier ones complete.
    for pair in records.windows(2) {
        assert!(pair[1].started_at > pair[0].completed_at.unwrap());
    }
}

#[tokio::test]
async fn stats_reflect_the_exhausted_job() {
    let stack = stack(quick_config()).await;
    let (address, _handler_cancel, _) = spawn_handler().await;
    register(&stack, "H", &address).await;

    let _ = stack.engine.run_now("H", "fail", json!({})).await;
    stack.engine.run_now("H", "echo", json!({})).await.expect("echo");

    let stats = stack.engine.exec_log().get_stats();
    assert_eq!(stats.total_executions, 4);
    assert_eq!(stats.success_count, 1);
    assert_eq!(stats.error_count, 1);
    assert!(stats.success_count + stats.error_count <= stats.total_executions);
    assert_eq!(stats.by_handler["H"].total, 4);
    assert_eq!(stats.lifetime_executions, 4);
}
