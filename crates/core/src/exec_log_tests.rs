// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::clock::FakeClock;
use serde_json::json;
use std::time::Duration;

fn log(max: usize) -> (ExecutionLog<FakeClock>, FakeClock) {
    let clock = FakeClock::new();
    (ExecutionLog::new(max, clock.clone()), clock)
}

fn start(log: &ExecutionLog<FakeClock>, job: &JobId, handler: &str) -> RecordHandle {
    log.record_start(job, handler, "echo", 1, 3, &json!({"x": 1}))
}

#[test]
fn start_then_success_finalizes_once() {
    let (log, clock) = log(10);
    let job = JobId::new();
    let handle = start(&log, &job, "h1");

    clock.advance(Duration::from_millis(250));
    log.record_success(handle, Some(json!({"x": 1})));

    let records = log.get_recent(10);
    assert_eq!(records.len(), 1);
    let r = &records[0];
    assert_eq!(r.status, ExecutionStatus::Success);
    assert_eq!(r.duration_ms, Some(250.0));
    assert_eq!(r.result, Some(json!({"x": 1})));
    assert_eq!(r.params_summary.as_deref(), Some("x=1"));

    // A second finalize is a no-op.
    log.record_error(handle, "late error", true);
    assert_eq!(log.get_recent(10)[0].status, ExecutionStatus::Success);
}

#[test]
fn non_final_error_records_retry_status() {
    let (log, _clock) = log(10);
    let job = JobId::new();

    let h1 = start(&log, &job, "h1");
    log.record_error(h1, "boom", false);
    let h2 = log.record_start(&job, "h1", "echo", 2, 3, &json!({}));
    log.record_error(h2, "boom", true);

    let records = log.get_by_job(job.as_str(), 10);
    assert_eq!(records.len(), 2);
    // Newest first.
    assert_eq!(records[0].attempt_number, 2);
    assert_eq!(records[0].status, ExecutionStatus::Error);
    assert_eq!(records[1].attempt_number, 1);
    assert_eq!(records[1].status, ExecutionStatus::Retry);
}

#[test]
fn ring_evicts_oldest_and_keeps_lifetime_count() {
    let (log, _clock) = log(3);
    for _ in 0..5 {
        let job = JobId::new();
        let handle = start(&log, &job, "h1");
        log.record_success(handle, None);
    }
    assert_eq!(log.len(), 3);
    let stats = log.get_stats();
    assert_eq!(stats.total_executions, 3);
    assert_eq!(stats.lifetime_executions, 5);
    assert!((stats.buffer_utilization - 100.0).abs() < 1e-9);
}

#[test]
fn finalizing_an_evicted_record_is_a_no_op() {
    let (log, _clock) = log(2);
    let job = JobId::new();
    let evicted = start(&log, &job, "h1");
    for _ in 0..2 {
        start(&log, &JobId::new(), "h2");
    }
    // `evicted` has been pushed out of the ring.
    log.record_success(evicted, None);
    assert!(log.get_by_job(job.as_str(), 10).is_empty());
}

#[test]
fn queries_filter_by_handler_job_and_status() {
    let (log, _clock) = log(10);
    let job_a = JobId::new();
    let job_b = JobId::new();

    let h1 = start(&log, &job_a, "alpha");
    log.record_success(h1, None);
    let h2 = start(&log, &job_b, "beta");
    log.record_error(h2, "boom", true);

    assert_eq!(log.get_by_handler("alpha", 10).len(), 1);
    assert_eq!(log.get_by_handler("beta", 10).len(), 1);
    assert_eq!(log.get_by_job(job_a.as_str(), 10).len(), 1);
    let errors = log.get_errors(10);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].handler_id, "beta");
}

#[test]
fn stats_break_down_by_handler() {
    let (log, _clock) = log(10);
    for outcome_ok in [true, true, false] {
        let handle = start(&log, &JobId::new(), "alpha");
        if outcome_ok {
            log.record_success(handle, None);
        } else {
            log.record_error(handle, "boom", true);
        }
    }
    // One still running.
    start(&log, &JobId::new(), "beta");

    let stats = log.get_stats();
    assert_eq!(stats.total_executions, 4);
    assert_eq!(stats.success_count, 2);
    assert_eq!(stats.error_count, 1);
    assert!((stats.success_rate - 50.0).abs() < 1e-9);
    assert_eq!(stats.by_handler["alpha"], HandlerStats { total: 3, success: 2, error: 1 });
    assert_eq!(stats.by_handler["beta"], HandlerStats { total: 1, success: 0, error: 0 });
    // success + error never exceeds total; the rest are non-terminal.
    assert!(stats.success_count + stats.error_count <= stats.total_executions);
}

#[test]
fn misfire_records_are_error_class() {
    let (log, clock) = log(10);
    let missed = clock.now_utc();
    log.record_misfire("sch-1", "alpha", "echo", missed);

    let records = log.get_errors(10);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].kind, ExecutionKind::Misfire);
    assert_eq!(records[0].status, ExecutionStatus::Error);
    assert!(records[0].error.as_deref().is_some_and(|e| e.contains("grace")));
}

#[test]
fn clear_resets_records_and_counter() {
    let (log, _clock) = log(10);
    start(&log, &JobId::new(), "h1");
    log.clear();
    assert!(log.is_empty());
    assert_eq!(log.get_stats().lifetime_executions, 0);
}
