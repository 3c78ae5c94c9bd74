// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Two coordinator instances with mutual subscription: discovery, lowest-pid
//! election, and failover within the heartbeat window.

use cw_daemon::{BrokerConfig, Bus, EventBroker};
use cw_core::SchedulerEvent;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

struct Instance {
    broker: Arc<EventBroker>,
    bus: Bus,
    cancel: CancellationToken,
}

async fn start_instance(pid: u32, listen: TcpListener, address: String, peers: Vec<String>) -> Instance {
    let bus = Bus::new();
    let config = BrokerConfig {
        instance_id: format!("scheduler-{pid}"),
        listen_addr: address,
        peers,
        heartbeat_interval: Duration::from_millis(100),
        pid,
    };
    let broker = EventBroker::new(config, bus.clone());
    let cancel = CancellationToken::new();
    broker.run(listen, cancel.clone());
    Instance { broker, bus, cancel }
}

async fn start_pair() -> (Instance, Instance) {
    let listener_1 = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr_1 = listener_1.local_addr().unwrap().to_string();
    let listener_2 = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr_2 = listener_2.local_addr().unwrap().to_string();

    let one = start_instance(100, listener_1, addr_1.clone(), vec![addr_2.clone()]).await;
    let two = start_instance(200, listener_2, addr_2, vec![addr_1]).await;
    (one, two)
}

async fn wait_until(what: &str, mut check: impl FnMut() -> bool) {
    let result = tokio::time::timeout(Duration::from_secs(3), async {
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

#[tokio::test]
async fn two_instances_discover_each_other_and_elect_the_lowest_pid() {
    let (one, two) = start_pair().await;

    // Within a few heartbeats both report the other as alive.
    wait_until("mutual discovery", || {
        !one.broker.alive_instances().is_empty() && !two.broker.alive_instances().is_empty()
    })
    .await;

    assert_eq!(one.broker.alive_instances(), vec![("scheduler-200".to_string(), 200)]);
    assert_eq!(two.broker.alive_instances(), vec![("scheduler-100".to_string(), 100)]);

    assert!(one.broker.is_leader());
    wait_until("instance-2 yields", || !two.broker.is_leader()).await;
}

#[tokio::test]
async fn survivor_takes_over_within_the_heartbeat_window() {
    let (one, two) = start_pair().await;
    wait_until("instance-2 yields", || !two.broker.is_leader()).await;

    // Stop instance-1 cold (no shutdown message): three missed heartbeats
    // later, instance-2 must be leader.
    one.cancel.cancel();
    wait_until("instance-2 promoted", || two.broker.is_leader()).await;
    assert!(two.broker.alive_instances().is_empty());
}

#[tokio::test]
async fn schedule_events_propagate_between_instances() {
    let (one, two) = start_pair().await;
    wait_until("mutual discovery", || {
        !one.broker.alive_instances().is_empty() && !two.broker.alive_instances().is_empty()
    })
    .await;

    let mut peer_rx = two.bus.subscribe();
    one.bus.publish_local(SchedulerEvent::ScheduleRemoved {
        schedule_id: "sch-shared".to_string(),
    });

    let received = tokio::time::timeout(Duration::from_secs(3), async {
        loop {
            let event = peer_rx.recv().await.unwrap();
            if let cw_daemon::EventOrigin::Remote { instance_id } = &event.origin {
                return (instance_id.clone(), event.event);
            }
        }
    })
    .await
    .expect("event never propagated");

    assert_eq!(received.0, "scheduler-100");
    assert_eq!(
        received.1,
        SchedulerEvent::ScheduleRemoved { schedule_id: "sch-shared".to_string() }
    );
}
