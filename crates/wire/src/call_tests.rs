// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

#[test]
fn request_defaults_params_to_null() {
    let req: CallRequest = serde_json::from_str(r#"{"method":"ping"}"#).unwrap();
    assert_eq!(req.method, "ping");
    assert!(req.params.is_null());
}

#[test]
fn ok_reply_carries_result() {
    let reply = CallReply::ok(json!({"echoed": true}));
    let json = serde_json::to_value(&reply).unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["result"]["echoed"], true);
    assert!(json.get("error").is_none());
}

#[test]
fn err_reply_carries_message() {
    let reply = CallReply::err("boom");
    assert!(!reply.success);
    assert_eq!(reply.error_message(), "boom");

    let json = serde_json::to_value(&reply).unwrap();
    assert_eq!(json["success"], false);
    assert_eq!(json["error"], "boom");
}

#[test]
fn failure_without_error_string_gets_placeholder() {
    let reply: CallReply = serde_json::from_str(r#"{"success":false}"#).unwrap();
    assert_eq!(reply.error_message(), "handler reported failure");
}
