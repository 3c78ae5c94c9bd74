// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end scenarios: register over the wire, schedule, dispatch.

use super::support::*;
use cw_core::{DateTrigger, ExecutionStatus, IntervalTrigger, Trigger};
use cw_daemon::AddScheduleRequest;
use cw_store::ListFilter;
use serde_json::json;
use std::sync::atomic::Ordering;
use std::time::Duration;

fn schedule_request(handler_id: &str, method: &str, trigger: Trigger) -> AddScheduleRequest {
    AddScheduleRequest {
        handler_id: handler_id.to_string(),
        method_name: method.to_string(),
        params: json!({}),
        trigger,
        schedule_id: None,
        misfire_grace_time: None,
        coalesce: None,
        max_jitter: None,
        max_attempts: None,
        call_timeout: None,
        paused_until: None,
        replace_existing: false,
    }
}

#[tokio::test]
async fn immediate_call_roundtrips_through_a_registered_handler() {
    let stack = stack(quick_config()).await;
    let (address, _handler_cancel, _) = spawn_handler().await;
    register(&stack, "H", &address).await;

    let (job_id, result) =
        stack.engine.run_now("H", "echo", json!({"x": 1})).await.expect("run_now");
    assert_eq!(result, Some(json!({"x": 1})));

    let records = stack.engine.exec_log().get_by_job(job_id.as_str(), 10);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, ExecutionStatus::Success);
    assert_eq!(records[0].attempt_number, 1);
    assert_eq!(records[0].handler_id, "H");
}

#[tokio::test]
async fn date_trigger_fires_once_then_the_schedule_is_gone() {
    let stack = stack(quick_config()).await;
    let (address, _handler_cancel, counter) = spawn_handler().await;
    register(&stack, "H", &address).await;

    let run_date = chrono::Utc::now() + chrono::Duration::milliseconds(300);
    let id = stack
        .engine
        .add_schedule(schedule_request("H", "count", Trigger::Date(DateTrigger { run_date })))
        .expect("add_schedule");

    // Before the fire time the schedule is listed.
    let page = stack.engine.list_schedules(&ListFilter::default());
    assert_eq!(page.total, 1);

    wait_until("the date fire", || counter.load(Ordering::SeqCst) == 1).await;
    // Let the success record land.
    wait_until("the success record", || {
        stack
            .engine
            .exec_log()
            .get_recent(10)
            .iter()
            .any(|r| r.status == ExecutionStatus::Success)
    })
    .await;

    // Exactly one execution; the exhausted schedule is no longer listed.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(counter.load(Ordering::SeqCst), 1);
    let page = stack.engine.list_schedules(&ListFilter::default());
    assert_eq!(page.total, 0, "exhausted schedule still listed");
    assert!(stack.store.get(&id).is_none());
}

#[tokio::test]
async fn interval_schedule_keeps_firing_with_monotone_times() {
    let stack = stack(quick_config()).await;
    let (address, _handler_cancel, counter) = spawn_handler().await;
    register(&stack, "H", &address).await;

    stack
        .engine
        .add_schedule(schedule_request(
            "H",
            "count",
            Trigger::Interval(IntervalTrigger::from_secs(0.2)),
        ))
        .expect("add_schedule");

    wait_until("three fires", || counter.load(Ordering::SeqCst) >= 3).await;

    let mut records = stack.engine.exec_log().get_recent(100);
    records.reverse();
    let successes: Vec<_> =
        records.iter().filter(|r| r.status == ExecutionStatus::Success).collect();
    assert!(successes.len() >= 3);
    for pair in successes.windows(2) {
        assert!(
            pair[0].started_at <= pair[1].started_at,
            "fires observed out of order"
        );
    }
}

#[tokio::test]
async fn re_registration_moves_dispatch_to_the_new_address() {
    let stack = stack(quick_config()).await;

    let (old_address, _old_cancel, old_counter) = spawn_handler().await;
    register(&stack, "H", &old_address).await;
    stack.engine.run_now("H", "count", json!({})).await.expect("first call");
    assert_eq!(old_counter.load(Ordering::SeqCst), 1);

    // The handler comes back somewhere else.
    let (new_address, _new_cancel, new_counter) = spawn_handler().await;
    register(&stack, "H", &new_address).await;

    stack.engine.run_now("H", "count", json!({})).await.expect("second call");
    assert_eq!(new_counter.load(Ordering::SeqCst), 1, "new address never reached");
    assert_eq!(old_counter.load(Ordering::SeqCst), 1, "old address still receiving calls");
}

#[tokio::test]
async fn unregistered_handler_is_refused() {
    let stack = stack(quick_config()).await;
    let err = stack.engine.run_now("ghost", "echo", json!({})).await.unwrap_err();
    assert_eq!(err.status_code(), 404);
}

#[tokio::test]
async fn offline_report_flows_into_the_handler_view() {
    let stack = stack(quick_config()).await;
    let (address, handler_cancel, _) = spawn_handler().await;
    register(&stack, "H", &address).await;

    let mut link = cw_handler::CoordinatorLink::new(stack.reg_addr.clone());
    link.report_status("H", "offline").await.expect("report_status");
    link.close().await;
    handler_cancel.cancel();

    let views = stack.engine.list_handlers().await;
    assert_eq!(views.len(), 1);
    assert!(!views[0].alive);
}
