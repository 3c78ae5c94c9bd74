// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn events_tag_by_kind() {
    let event = SchedulerEvent::ScheduleRemoved { schedule_id: "sch-1".to_string() };
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["kind"], "schedule_removed");
    assert_eq!(json["schedule_id"], "sch-1");

    let back: SchedulerEvent = serde_json::from_value(json).unwrap();
    assert_eq!(back, event);
}

#[test]
fn schedule_added_roundtrips_with_payload() {
    let schedule = crate::Schedule::builder().id("sch-9").build();
    let event = SchedulerEvent::ScheduleAdded { schedule: Box::new(schedule.clone()) };
    let json = serde_json::to_string(&event).unwrap();
    let back: SchedulerEvent = serde_json::from_str(&json).unwrap();
    match back {
        SchedulerEvent::ScheduleAdded { schedule: s } => assert_eq!(*s, schedule),
        other => panic!("unexpected event: {other}"),
    }
}

#[test]
fn display_names_match_kind_tags() {
    let event = SchedulerEvent::HandlerRegistered {
        handler_id: "h1".to_string(),
        address: "127.0.0.1:1".to_string(),
    };
    assert_eq!(event.to_string(), "handler_registered");
}
