// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use cw_core::FakeClock;
use cw_wire::{write_frame, WireClient};
use serde_json::json;
use std::time::Duration;

struct Fixture {
    address: String,
    registry: Arc<HandlerRegistry<FakeClock>>,
    bus: Bus,
    _cancel: tokio_util::sync::DropGuard,
    _dir: tempfile::TempDir,
}

async fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(
        HandlerRegistry::open(
            dir.path().join("registry.toml"),
            Duration::from_millis(500),
            FakeClock::new(),
        )
        .unwrap(),
    );
    let bus = Bus::new();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    let cancel = CancellationToken::new();
    let server = RegistrationServer::new(Arc::clone(&registry), bus.clone());
    tokio::spawn(server.run(listener, cancel.clone()));
    Fixture { address, registry, bus, _cancel: cancel.drop_guard(), _dir: dir }
}

#[tokio::test]
async fn register_creates_an_entry_and_publishes() {
    let fx = fixture().await;
    let mut events = fx.bus.subscribe();
    let mut client = WireClient::new(fx.address.clone());
    client.connect().await.unwrap();

    let reply = client
        .call(
            "register",
            json!({"handler_id": "h1", "address": "127.0.0.1:4244", "methods": ["echo"]}),
        )
        .await
        .unwrap();
    assert!(reply.success, "got: {reply:?}");

    let entry = fx.registry.get_entry("h1").unwrap();
    assert_eq!(entry.address, "127.0.0.1:4244");
    assert!(entry.exposes("echo"));

    let event = events.recv().await.unwrap();
    assert_eq!(event.event.to_string(), "handler_registered");
}

#[tokio::test]
async fn report_status_and_unregister_roundtrip() {
    let fx = fixture().await;
    let mut client = WireClient::new(fx.address.clone());
    client.connect().await.unwrap();

    client
        .call("register", json!({"handler_id": "h1", "address": "127.0.0.1:1", "methods": []}))
        .await
        .unwrap();

    let reply = client
        .call("report_status", json!({"handler_id": "h1", "status": "offline"}))
        .await
        .unwrap();
    assert!(reply.success);
    assert_eq!(fx.registry.get_entry("h1").unwrap().status, cw_core::HandlerStatus::Offline);

    let reply = client.call("unregister", json!({"handler_id": "h1"})).await.unwrap();
    assert!(reply.success);
    assert!(fx.registry.get_entry("h1").is_none());
}

#[tokio::test]
async fn unknown_handler_status_report_fails_cleanly() {
    let fx = fixture().await;
    let mut client = WireClient::new(fx.address.clone());
    client.connect().await.unwrap();

    let reply = client
        .call("report_status", json!({"handler_id": "ghost", "status": "offline"}))
        .await
        .unwrap();
    assert!(!reply.success);
    assert!(reply.error_message().contains("not registered"));
}

#[tokio::test]
async fn invalid_status_string_is_rejected() {
    let fx = fixture().await;
    let mut client = WireClient::new(fx.address.clone());
    client.connect().await.unwrap();
    client
        .call("register", json!({"handler_id": "h1", "address": "127.0.0.1:1", "methods": []}))
        .await
        .unwrap();

    let reply = client
        .call("report_status", json!({"handler_id": "h1", "status": "sleeping"}))
        .await
        .unwrap();
    assert!(!reply.success);
}

#[tokio::test]
async fn malformed_messages_do_not_mutate_state() {
    let fx = fixture().await;
    let mut stream = tokio::net::TcpStream::connect(&fx.address).await.unwrap();

    // Raw garbage inside a valid frame.
    write_frame(&mut stream, b"{{{ nope").await.unwrap();
    let reply: cw_wire::CallReply = cw_wire::read_message(&mut stream).await.unwrap();
    assert!(!reply.success);
    assert!(reply.error_message().contains("malformed"));
    assert!(fx.registry.list().is_empty());

    // Unknown method on the same connection still answers.
    cw_wire::write_message(&mut stream, &cw_wire::CallRequest::new("launch", json!({})))
        .await
        .unwrap();
    let reply: cw_wire::CallReply = cw_wire::read_message(&mut stream).await.unwrap();
    assert!(!reply.success);
    assert!(reply.error_message().contains("unknown method"));
}

#[tokio::test]
async fn ping_answers_pong() {
    let fx = fixture().await;
    let mut client = WireClient::new(fx.address.clone());
    client.connect().await.unwrap();
    assert_eq!(client.ping().await.unwrap(), "pong");
}
