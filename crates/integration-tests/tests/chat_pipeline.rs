//! End-to-end tests for the operator chat view.
//!
//! A `ChatView` over the real REST client and realtime channel, talking to
//! the mock backend: list, select, send, receive and close.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::mpsc;

use pizzeria_chat::realtime::ServerEvent;
use pizzeria_chat::{
    ApiClient, ChatError, ChatView, Operator, RealtimeChannel, RealtimeHandle, SendOutcome,
};
use pizzeria_core::{ConversationStatus, Delivery, MessageRole, SenderType};
use pizzeria_integration_tests::MockBackend;

const TIMEOUT: Duration = Duration::from_secs(5);

type LiveView = ChatView<ApiClient, RealtimeHandle>;

struct Harness {
    backend: MockBackend,
    view: LiveView,
    handle: RealtimeHandle,
    events: mpsc::Receiver<ServerEvent>,
}

async fn harness() -> Harness {
    let backend = MockBackend::start().await;
    backend.add_conversation(json!({
        "userId": "U1",
        "userName": "Marta",
        "status": "open",
        "orderId": "O1"
    }));
    backend.add_conversation(json!({
        "userId": "U2",
        "userName": "Luca",
        "status": "open",
        "orderId": "O2"
    }));

    let config = backend.config();
    let client = ApiClient::new(&config).unwrap();
    let (handle, events) = RealtimeChannel::connect(&config.realtime_url, 16)
        .await
        .unwrap();
    let view = ChatView::new(client, handle.clone(), Some(Operator::new("A1")));

    Harness {
        backend,
        view,
        handle,
        events,
    }
}

impl Harness {
    async fn select(&self, order: &str) {
        self.view.load_conversations().await.unwrap();
        let conversation = self
            .view
            .conversations()
            .into_iter()
            .find(|c| c.order_id.as_str() == order)
            .expect("conversation listed");
        self.view.select_conversation(&conversation).await.unwrap();
    }

    async fn next_event(&mut self) -> ServerEvent {
        tokio::time::timeout(TIMEOUT, self.events.recv())
            .await
            .expect("event arrives")
            .expect("channel open")
    }

    fn events_named(&self, name: &str) -> Vec<Value> {
        self.backend
            .socket_events()
            .into_iter()
            .filter(|(n, _)| n == name)
            .map(|(_, data)| data)
            .collect()
    }
}

// =============================================================================
// Selection Tests
// =============================================================================

#[tokio::test]
async fn test_select_joins_room_and_loads_history() {
    let h = harness().await;
    h.backend.add_message(json!({
        "_id": "m1",
        "sender_type": "user",
        "sender_id": "U1",
        "message": "Where is my pizza?",
        "order_id": "O1",
        "createdAt": "2026-03-01T18:30:00Z"
    }));

    h.select("O1").await;

    let transcript = h.view.transcript();
    assert_eq!(transcript.len(), 1);
    assert_eq!(transcript[0].role, MessageRole::User);
    assert_eq!(transcript[0].content, "Where is my pizza?");
    assert!(h.view.can_compose());

    h.backend.wait_for_frames(1).await;
    assert_eq!(
        h.events_named("join_room"),
        vec![json!({ "userID": "U1", "adminId": "A1" })]
    );
}

// =============================================================================
// Send Tests
// =============================================================================

#[tokio::test]
async fn test_send_persists_announces_and_reconciles() {
    let h = harness().await;
    h.select("O1").await;

    let outcome = h.view.send("Hello").await.unwrap();
    assert!(outcome.is_sent());

    // Persisted once with the full identity triple.
    let posted = h.backend.posted_messages();
    assert_eq!(posted.len(), 1);
    assert_eq!(posted[0]["sender_type"], "admin");
    assert_eq!(posted[0]["sender_id"], "A1");
    assert_eq!(posted[0]["receiver_type"], "user");
    assert_eq!(posted[0]["receiver_id"], "U1");
    assert_eq!(posted[0]["message"], "Hello");
    assert_eq!(posted[0]["roomId"], "chat-room-U1");
    assert_eq!(posted[0]["order_id"], "O1");

    // Announced with an explicit sender type and the stored id.
    h.backend.wait_for_frames(2).await;
    let announced = h.events_named("send_message");
    assert_eq!(announced.len(), 1);
    assert_eq!(announced[0]["sender_type"], "admin");
    assert_eq!(announced[0]["_id"], "msg-1");

    // The reload after sending replaced the optimistic entry, no duplicate.
    let transcript = h.view.transcript();
    let hellos: Vec<_> = transcript.iter().filter(|m| m.content == "Hello").collect();
    assert_eq!(hellos.len(), 1);
    assert_eq!(hellos[0].delivery, Delivery::Sent);
    assert_eq!(hellos[0].id.as_ref().map(|id| id.as_str()), Some("msg-1"));
    assert_eq!(h.backend.history_queries().len(), 2);
    assert!(!h.view.is_sending());
}

#[tokio::test]
async fn test_send_failure_keeps_failed_entry() {
    let h = harness().await;
    h.select("O1").await;
    h.backend.fail_sends(true);

    let outcome = h.view.send("Are you there?").await.unwrap();

    assert!(matches!(outcome, SendOutcome::Failed { .. }));
    let transcript = h.view.transcript();
    assert_eq!(transcript.len(), 1);
    assert_eq!(transcript[0].delivery, Delivery::Failed);
    assert!(h.events_named("send_message").is_empty());
    // No reload after a failed write.
    assert_eq!(h.backend.history_queries().len(), 1);
}

#[tokio::test]
async fn test_send_requires_selection() {
    let h = harness().await;
    h.view.load_conversations().await.unwrap();

    let result = h.view.send("Hello").await;

    assert!(matches!(result, Err(ChatError::Validation(_))));
    assert!(h.backend.posted_messages().is_empty());
}

// =============================================================================
// Realtime Tests
// =============================================================================

#[tokio::test]
async fn test_inbound_message_reaches_selected_transcript() {
    let mut h = harness().await;
    h.select("O1").await;

    h.backend.push_event(
        "message_received",
        json!({
            "_id": "m7",
            "sender_id": "U1",
            "sender_type": "user",
            "message": "Thanks!",
            "order_id": "O1"
        }),
    );
    let event = h.next_event().await;

    assert!(h.view.handle_realtime(event.clone()));
    let last = h.view.transcript().pop().unwrap();
    assert_eq!(last.content, "Thanks!");
    assert_eq!(last.sender_type, Some(SenderType::User));
    assert_eq!(last.role, MessageRole::User);

    // A redelivery of the same message is not appended twice.
    assert!(!h.view.handle_realtime(event));
    assert_eq!(h.view.transcript().len(), 1);
}

#[tokio::test]
async fn test_inbound_for_other_order_updates_list_only() {
    let mut h = harness().await;
    h.select("O1").await;

    h.backend.push_event(
        "message_received",
        json!({
            "sender_id": "U2",
            "sender_type": "user",
            "message": "Extra cheese please",
            "order_id": "O2"
        }),
    );
    let event = h.next_event().await;

    assert!(!h.view.handle_realtime(event));
    assert!(h.view.transcript().is_empty());
    let luca = h
        .view
        .conversations()
        .into_iter()
        .find(|c| c.order_id.as_str() == "O2")
        .unwrap();
    assert_eq!(luca.last_message.as_deref(), Some("Extra cheese please"));
}

#[tokio::test]
async fn test_own_echo_is_ignored() {
    let mut h = harness().await;
    h.select("O1").await;

    h.backend.push_event(
        "message_received",
        json!({
            "sender_id": "A1",
            "sender_type": "admin",
            "message": "Hello",
            "order_id": "O1"
        }),
    );
    let event = h.next_event().await;

    assert!(!h.view.handle_realtime(event));
    assert!(h.view.transcript().is_empty());
}

// =============================================================================
// Close Tests
// =============================================================================

#[tokio::test]
async fn test_close_lifecycle() {
    let h = harness().await;
    h.backend.add_message(json!({
        "sender_type": "user",
        "sender_id": "U1",
        "message": "Bye",
        "order_id": "O1"
    }));
    h.select("O1").await;
    assert_eq!(h.view.transcript().len(), 1);

    h.view.request_close().unwrap();
    assert!(h.view.is_close_dialog_open());
    h.view.confirm_close().await.unwrap();

    assert_eq!(h.backend.closed_requests(), vec![json!({ "orderId": "O1" })]);
    assert!(h.view.transcript().is_empty());
    assert!(!h.view.is_close_dialog_open());
    assert!(!h.view.can_compose());
    let closed = h.view.conversations_with_status(ConversationStatus::Closed);
    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0].order_id.as_str(), "O1");

    // Replies to a closed conversation are rejected locally.
    let result = h.view.send("One more thing").await;
    assert!(matches!(result, Err(ChatError::Validation(_))));
    assert!(h.backend.posted_messages().is_empty());
}

#[tokio::test]
async fn test_realtime_disconnect_degrades_to_rest_only() {
    let h = harness().await;
    h.select("O1").await;

    h.handle.disconnect();
    tokio::time::timeout(TIMEOUT, h.handle.closed())
        .await
        .expect("socket task stops");

    // Sending still persists; only the announcement is lost.
    let outcome = h.view.send("Still here").await.unwrap();
    assert!(outcome.is_sent());
    assert_eq!(h.backend.posted_messages().len(), 1);
    assert!(h.events_named("send_message").is_empty());
}
