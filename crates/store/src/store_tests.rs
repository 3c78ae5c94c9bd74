// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::TimeZone;
use cw_core::{IntervalTrigger, Schedule, Trigger};

fn utc(h: u32, mi: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, h, mi, s).unwrap()
}

fn open_store(dir: &tempfile::TempDir) -> ScheduleStore {
    let config = StoreConfig::new(
        dir.path().join("wal").join("schedules.wal"),
        dir.path().join("snapshot.zst"),
    );
    ScheduleStore::open(config).unwrap()
}

fn schedule_due_at(id: &str, at: DateTime<Utc>) -> Schedule {
    let mut schedule = Schedule::builder()
        .id(id)
        .trigger(Trigger::Interval(IntervalTrigger {
            seconds: 10.0,
            start_time: Some(utc(0, 0, 0)),
            ..IntervalTrigger::default()
        }))
        .build();
    schedule.next_fire_time = Some(at);
    schedule
}

#[test]
fn put_then_get_roundtrips() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    let schedule = schedule_due_at("sch-1", utc(0, 0, 10));

    store.put(schedule.clone(), false).unwrap();
    assert_eq!(store.get("sch-1"), Some(schedule));
    assert_eq!(store.len(), 1);
}

#[test]
fn duplicate_id_conflicts_unless_replacing() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    store.put(schedule_due_at("sch-1", utc(0, 0, 10)), false).unwrap();

    let err = store.put(schedule_due_at("sch-1", utc(0, 0, 20)), false).unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));

    store.put(schedule_due_at("sch-1", utc(0, 0, 20)), true).unwrap();
    assert_eq!(store.get("sch-1").unwrap().next_fire_time, Some(utc(0, 0, 20)));
}

#[test]
fn remove_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    store.put(schedule_due_at("sch-1", utc(0, 0, 10)), false).unwrap();

    assert!(store.remove("sch-1").unwrap());
    assert!(!store.remove("sch-1").unwrap());
    assert_eq!(store.get("sch-1"), None);
}

#[test]
fn state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = open_store(&dir);
        store.put(schedule_due_at("sch-1", utc(0, 0, 10)), false).unwrap();
        store.put(schedule_due_at("sch-2", utc(0, 0, 20)), false).unwrap();
        store.remove("sch-2").unwrap();
        store.release("sch-1", Some(utc(0, 0, 30))).unwrap();
    }

    let store = open_store(&dir);
    assert_eq!(store.len(), 1);
    assert_eq!(store.get("sch-1").unwrap().next_fire_time, Some(utc(0, 0, 30)));
}

#[test]
fn acquire_due_claims_disjoint_sets() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    store.put(schedule_due_at("sch-1", utc(0, 0, 10)), false).unwrap();
    store.put(schedule_due_at("sch-2", utc(0, 0, 5)), false).unwrap();
    store.put(schedule_due_at("sch-later", utc(2, 0, 0)), false).unwrap();

    let now = utc(0, 0, 10);
    let first = store.acquire_due(now, 10);
    // Ordered by next_fire_time; the future schedule is not due.
    assert_eq!(
        first.iter().map(|s| s.id.as_str()).collect::<Vec<_>>(),
        vec!["sch-2", "sch-1"]
    );

    // A second acquire while claims are live sees nothing.
    assert!(store.acquire_due(now, 10).is_empty());

    // Release clears the claim and advances the fire time.
    store.release("sch-1", Some(utc(3, 0, 0))).unwrap();
    assert!(store.acquire_due(now, 10).is_empty());
}

#[test]
fn expired_claims_are_reclaimable() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    store.put(schedule_due_at("sch-1", utc(0, 0, 10)), false).unwrap();

    assert_eq!(store.acquire_due(utc(0, 0, 10), 10).len(), 1);
    // Past the 30s lease the claim no longer shields the schedule.
    assert_eq!(store.acquire_due(utc(0, 1, 0), 10).len(), 1);
}

#[test]
fn due_at_exactly_now_is_claimed() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    let at = utc(0, 0, 10);
    store.put(schedule_due_at("sch-1", at), false).unwrap();
    assert_eq!(store.acquire_due(at, 10).len(), 1);
}

#[test]
fn paused_schedules_are_not_claimed() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    let mut schedule = schedule_due_at("sch-1", utc(0, 0, 10));
    schedule.paused_until = Some(utc(1, 0, 0));
    store.put(schedule, false).unwrap();

    assert!(store.acquire_due(utc(0, 30, 0), 10).is_empty());
    assert_eq!(store.acquire_due(utc(1, 0, 0), 10).len(), 1);
}

#[test]
fn exhausted_schedules_are_never_due() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    let mut schedule = schedule_due_at("sch-1", utc(0, 0, 10));
    schedule.next_fire_time = None;
    store.put(schedule, false).unwrap();

    assert!(store.acquire_due(utc(5, 0, 0), 10).is_empty());
}

#[test]
fn list_filters_by_time_window_and_paginates() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    for (id, minute) in [("a", 1), ("b", 2), ("c", 3), ("d", 4)] {
        store.put(schedule_due_at(id, utc(0, minute, 0)), false).unwrap();
    }
    let mut exhausted = schedule_due_at("zz", utc(0, 9, 0));
    exhausted.next_fire_time = None;
    store.put(exhausted, false).unwrap();

    let page = store.list(&ListFilter {
        start_time: Some(utc(0, 2, 0)),
        end_time: Some(utc(0, 3, 0)),
        limit: 10,
        offset: 0,
    });
    assert_eq!(page.total, 2);
    assert_eq!(
        page.schedules.iter().map(|s| s.id.as_str()).collect::<Vec<_>>(),
        vec!["b", "c"]
    );

    let page = store.list(&ListFilter { limit: 2, offset: 1, ..ListFilter::default() });
    assert_eq!(page.total, 5);
    assert_eq!(
        page.schedules.iter().map(|s| s.id.as_str()).collect::<Vec<_>>(),
        vec!["b", "c"]
    );

    // Exhausted schedules sort last in an unfiltered listing.
    let page = store.list(&ListFilter::default());
    assert_eq!(page.schedules.last().unwrap().id, "zz");
}

#[test]
fn compaction_truncates_wal_and_preserves_state() {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig {
        compact_after: 3,
        ..StoreConfig::new(
            dir.path().join("wal").join("schedules.wal"),
            dir.path().join("snapshot.zst"),
        )
    };
    let store = ScheduleStore::open(config.clone()).unwrap();
    for i in 0..4 {
        store.put(schedule_due_at(&format!("sch-{i}"), utc(0, 0, 10)), false).unwrap();
    }

    // The compaction threshold has been crossed; the snapshot holds the state.
    let snapshot = Snapshot::load(&config.snapshot_path).unwrap().unwrap();
    assert!(snapshot.state.len() >= 3);

    let reopened = ScheduleStore::open(config).unwrap();
    assert_eq!(reopened.len(), 4);
}
