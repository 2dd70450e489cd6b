// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bridge against a real relay on an ephemeral port.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::timeout;

use palaver_client::{
    BridgeClient, BridgeEvent, BridgeOptions, ConnectionMode, HttpPoller, RelayConnector,
};
use palaver_config::ClientConfig;
use palaver_core::{ChatMessage, ClientFrame, Sender, ServerFrame};
use palaver_test_utils::{TEST_ADMIN_TOKEN, TestRelay};

const WAIT: Duration = Duration::from_secs(5);

fn options(role: Sender) -> BridgeOptions {
    BridgeOptions {
        session_poll: Duration::from_millis(50),
        presence_poll: Duration::from_millis(50),
        handshake_timeout: Duration::from_secs(2),
        ..BridgeOptions::from_config(&ClientConfig::default(), role)
    }
}

fn bridge(relay_url: &str, http_url: &str, role: Sender) -> BridgeClient {
    let token = (role == Sender::Admin).then(|| TEST_ADMIN_TOKEN.to_string());
    BridgeClient::new(
        Arc::new(RelayConnector::new(relay_url, token)),
        Arc::new(HttpPoller::new(http_url, Duration::from_secs(2)).unwrap()),
        options(role),
    )
}

async fn next_message(events: &mut broadcast::Receiver<BridgeEvent>) -> ChatMessage {
    timeout(WAIT, async {
        loop {
            if let BridgeEvent::NewMessage(message) = events.recv().await.unwrap() {
                return message;
            }
        }
    })
    .await
    .expect("no message within timeout")
}

#[tokio::test]
async fn live_bridges_exchange_messages() {
    let relay = TestRelay::start().await.unwrap();
    let session = relay.create_session("Ada").await.unwrap();

    let visitor = bridge(&relay.ws_url(), &relay.http_url(), Sender::Visitor);
    let admin = bridge(&relay.ws_url(), &relay.http_url(), Sender::Admin);
    let mut admin_events = admin.subscribe();

    assert_eq!(visitor.connect().await.unwrap(), ConnectionMode::Connected);
    assert_eq!(admin.connect().await.unwrap(), ConnectionMode::Connected);
    admin.join_session(session).await.unwrap();
    visitor.join_session(session).await.unwrap();

    // The admin's join must be registered before the send fans out.
    let mut joined = admin.watch();
    tokio::time::sleep(Duration::from_millis(100)).await;

    visitor.send_message("  hello there ").await.unwrap();
    let received = next_message(&mut admin_events).await;
    assert_eq!(received.body, "hello there");
    assert_eq!(received.sender, Sender::Visitor);

    let snapshot = timeout(WAIT, joined.wait_for(|s| s.messages.len() == 1))
        .await
        .unwrap()
        .unwrap()
        .clone();
    assert_eq!(snapshot.messages[0].id, received.id);

    visitor.disconnect().await.unwrap();
    admin.disconnect().await.unwrap();
    relay.shutdown().await.unwrap();
}

#[tokio::test]
async fn late_bridge_receives_history_once() {
    let relay = TestRelay::start().await.unwrap();
    let session = relay.create_session("Grace").await.unwrap();

    let mut admin = relay.connect_admin().await.unwrap();
    admin.send(&ClientFrame::join(session)).await.unwrap();
    admin.recv().await.unwrap();
    for body in ["one", "two"] {
        admin
            .send(&ClientFrame::message(session, Sender::Admin, body))
            .await
            .unwrap();
        admin
            .recv_until(|f| matches!(f, ServerFrame::NewMessage { .. }))
            .await
            .unwrap();
    }

    let visitor = bridge(&relay.ws_url(), &relay.http_url(), Sender::Visitor);
    visitor.connect().await.unwrap();
    visitor.join_session(session).await.unwrap();

    let mut watch = visitor.watch();
    let snapshot = timeout(WAIT, watch.wait_for(|s| s.messages.len() == 2))
        .await
        .unwrap()
        .unwrap()
        .clone();
    let bodies: Vec<_> = snapshot.messages.iter().map(|m| m.body.as_str()).collect();
    assert_eq!(bodies, ["one", "two"]);

    relay.shutdown().await.unwrap();
}

#[tokio::test]
async fn unreachable_socket_falls_back_to_polling() {
    let relay = TestRelay::start().await.unwrap();
    let session = relay.create_session("Linus").await.unwrap();

    let visitor = bridge("ws://127.0.0.1:1/ws", &relay.http_url(), Sender::Visitor);
    let mut events = visitor.subscribe();
    assert_eq!(visitor.connect().await.unwrap(), ConnectionMode::Polling);
    visitor.join_session(session).await.unwrap();

    let mut admin = relay.connect_admin().await.unwrap();
    admin.send(&ClientFrame::join(session)).await.unwrap();
    admin.recv().await.unwrap();

    visitor.send_message("over http").await.unwrap();
    let ServerFrame::NewMessage { message } = admin
        .recv_until(|f| matches!(f, ServerFrame::NewMessage { .. }))
        .await
        .unwrap()
    else {
        unreachable!()
    };
    assert_eq!(message.body, "over http");

    admin
        .send(&ClientFrame::message(session, Sender::Admin, "polled back"))
        .await
        .unwrap();
    let mut bodies = Vec::new();
    while bodies.len() < 2 {
        bodies.push(next_message(&mut events).await.body);
    }
    assert_eq!(bodies, ["over http", "polled back"]);
    assert_eq!(visitor.mode(), ConnectionMode::Polling);

    relay.shutdown().await.unwrap();
}
