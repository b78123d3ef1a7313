//! Integration tests for the Socket.IO realtime channel.
//!
//! The mock backend speaks just enough Engine.IO v4 / Socket.IO to open a
//! session, acknowledge the namespace connect, record client frames and push
//! server frames.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use chrono::Utc;
use serde_json::json;

use pizzeria_chat::realtime::events::{JoinRoom, OutboundMessage};
use pizzeria_chat::realtime::{ClientEvent, ServerEvent};
use pizzeria_chat::{RealtimeChannel, RealtimeError, RealtimeSink, install_crypto_provider};
use pizzeria_core::{OperatorId, OrderId, SenderType, UserId};
use pizzeria_integration_tests::MockBackend;

const TIMEOUT: Duration = Duration::from_secs(5);

// =============================================================================
// Handshake Tests
// =============================================================================

#[tokio::test]
async fn test_connect_completes_namespace_handshake() {
    let backend = MockBackend::start().await;
    let config = backend.config();

    let (handle, _events) = RealtimeChannel::connect(&config.realtime_url, 16)
        .await
        .unwrap();

    assert!(handle.is_connected());
    assert_eq!(backend.socket_connects(), 1);
}

#[tokio::test]
async fn test_connect_refused_when_nothing_listens() {
    let url = "ws://127.0.0.1:9/socket.io/?EIO=4&transport=websocket"
        .parse()
        .unwrap();

    let result = RealtimeChannel::connect(&url, 16).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_wss_connect_fails_cleanly_on_tls_error() {
    // A plain TCP listener that hangs up on every connection: the TLS
    // handshake must fail with an error, not a crypto provider panic.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            drop(stream);
        }
    });

    let url = format!("wss://localhost:{port}/socket.io/?EIO=4&transport=websocket")
        .parse()
        .unwrap();
    let result = RealtimeChannel::connect(&url, 4).await;

    assert!(matches!(result, Err(RealtimeError::Connect(_))));
    // The provider is now installed process-wide.
    assert!(!install_crypto_provider());
}

// =============================================================================
// Outbound Tests
// =============================================================================

#[tokio::test]
async fn test_join_room_frame() {
    let backend = MockBackend::start().await;
    let (handle, _events) = RealtimeChannel::connect(&backend.config().realtime_url, 16)
        .await
        .unwrap();

    handle
        .emit(ClientEvent::JoinRoom(JoinRoom {
            user_id: UserId::new("U1"),
            admin_id: OperatorId::new("A1"),
        }))
        .unwrap();

    backend.wait_for_frames(1).await;
    let events = backend.socket_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].0, "join_room");
    assert_eq!(events[0].1, json!({ "userID": "U1", "adminId": "A1" }));
}

#[tokio::test]
async fn test_send_message_frame_carries_sender_type() {
    let backend = MockBackend::start().await;
    let (handle, _events) = RealtimeChannel::connect(&backend.config().realtime_url, 16)
        .await
        .unwrap();

    handle
        .emit(ClientEvent::SendMessage(OutboundMessage {
            id: None,
            sender_type: SenderType::Admin,
            sender_id: OperatorId::new("A1"),
            receiver_type: SenderType::User,
            receiver_id: UserId::new("U1"),
            message: "Hello".to_string(),
            room_id: "chat-room-U1".to_string(),
            order_id: OrderId::new("O1"),
            client_id: None,
            created_at: Utc::now(),
        }))
        .unwrap();

    backend.wait_for_frames(1).await;
    let (name, data) = backend.socket_events().remove(0);
    assert_eq!(name, "send_message");
    assert_eq!(data["sender_type"], "admin");
    assert_eq!(data["receiver_id"], "U1");
    assert_eq!(data["message"], "Hello");
    assert!(data.get("_id").is_none());
}

#[tokio::test]
async fn test_disconnect_leaves_namespace() {
    let backend = MockBackend::start().await;
    let (handle, _events) = RealtimeChannel::connect(&backend.config().realtime_url, 16)
        .await
        .unwrap();

    handle.disconnect();
    tokio::time::timeout(TIMEOUT, handle.closed())
        .await
        .expect("socket task stops");

    assert!(!handle.is_connected());
    let frames = backend.wait_for_frames(1).await;
    assert_eq!(frames, vec!["41".to_string()]);

    // Emitting after the task stopped reports a closed channel.
    let result = handle.emit(ClientEvent::JoinRoom(JoinRoom {
        user_id: UserId::new("U1"),
        admin_id: OperatorId::new("A1"),
    }));
    assert!(result.is_err());
}

// =============================================================================
// Inbound Tests
// =============================================================================

#[tokio::test]
async fn test_message_received_is_delivered() {
    let backend = MockBackend::start().await;
    let (_handle, mut events) = RealtimeChannel::connect(&backend.config().realtime_url, 16)
        .await
        .unwrap();

    backend.push_event(
        "message_received",
        json!({
            "_id": "m9",
            "sender_id": "U1",
            "sender_type": "user",
            "message": "Is it ready?",
            "order_id": "O1",
            "createdAt": "2026-03-01T18:30:00Z"
        }),
    );

    let event = tokio::time::timeout(TIMEOUT, events.recv())
        .await
        .expect("event arrives")
        .expect("channel open");
    let ServerEvent::MessageReceived(message) = event;
    assert_eq!(message.sender_id.as_str(), "U1");
    assert_eq!(message.sender_type(), Some(SenderType::User));
    assert_eq!(message.message, "Is it ready?");
    assert_eq!(message.order_id, Some(OrderId::new("O1")));
}

#[tokio::test]
async fn test_unknown_and_malformed_events_are_skipped() {
    let backend = MockBackend::start().await;
    let (_handle, mut events) = RealtimeChannel::connect(&backend.config().realtime_url, 16)
        .await
        .unwrap();

    backend.push_event("typing", json!({ "userID": "U1" }));
    backend.push_event("message_received", json!({ "unexpected": true }));
    backend.push_event(
        "message_received",
        json!({ "sender_id": "U1", "message": "after the noise" }),
    );

    let event = tokio::time::timeout(TIMEOUT, events.recv())
        .await
        .expect("event arrives")
        .expect("channel open");
    let ServerEvent::MessageReceived(message) = event;
    assert_eq!(message.message, "after the noise");
}

#[tokio::test]
async fn test_ping_is_answered_with_pong() {
    let backend = MockBackend::start().await;
    let (_handle, _events) = RealtimeChannel::connect(&backend.config().realtime_url, 16)
        .await
        .unwrap();

    backend.push_frame("2");

    let frames = backend.wait_for_frames(1).await;
    assert_eq!(frames[0], "3");
}

#[tokio::test]
async fn test_server_close_ends_event_stream() {
    let backend = MockBackend::start().await;
    let (handle, mut events) = RealtimeChannel::connect(&backend.config().realtime_url, 16)
        .await
        .unwrap();

    backend.push_frame("1");

    let next = tokio::time::timeout(TIMEOUT, events.recv())
        .await
        .expect("stream ends");
    assert!(next.is_none());
    tokio::time::timeout(TIMEOUT, handle.closed())
        .await
        .expect("socket task stops");
}
