//! Integration test support for the pizzeria operator chat.
//!
//! [`MockBackend`] runs an in-process axum server on `127.0.0.1:0` that
//! emulates the chat backend:
//!
//! - `GET  /api/conversations-by-operator/{operatorId}` (enveloped response)
//! - `GET  /api/conversation-messages` (bare array, filtered by `orderId`)
//! - `POST /api/conversation-messages` (stores and echoes the message)
//! - `POST /api/close-chat`
//! - `GET  /socket.io/` - a minimal Engine.IO v4 / Socket.IO WebSocket
//!
//! Tests seed it, point a `ChatConfig` at it and inspect what it received.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p pizzeria-integration-tests
//! ```

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::sync::broadcast;

use pizzeria_chat::ChatConfig;
use pizzeria_chat::realtime::Packet;

/// How long `wait_for_*` helpers poll before giving up.
const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared state behind the mock routes.
#[derive(Default)]
pub struct MockState {
    conversations: Mutex<Vec<Value>>,
    messages: Mutex<Vec<Value>>,
    posted: Mutex<Vec<Value>>,
    closed: Mutex<Vec<Value>>,
    history_queries: Mutex<Vec<HashMap<String, String>>>,
    socket_frames: Mutex<Vec<String>>,
    required_token: Mutex<Option<String>>,
    fail_send: AtomicBool,
    socket_connects: AtomicUsize,
    pushes: Mutex<Option<broadcast::Sender<String>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockState {
    fn push_sender(&self) -> broadcast::Sender<String> {
        lock(&self.pushes)
            .get_or_insert_with(|| broadcast::channel(64).0)
            .clone()
    }
}

/// A running mock backend.
pub struct MockBackend {
    addr: SocketAddr,
    state: Arc<MockState>,
}

impl MockBackend {
    /// Bind to an ephemeral port and start serving.
    ///
    /// # Panics
    ///
    /// Panics if the listener cannot be bound.
    pub async fn start() -> Self {
        let state = Arc::new(MockState::default());
        let app = router(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock backend");
        let addr = listener.local_addr().expect("mock backend address");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { addr, state }
    }

    /// REST base URL (with trailing slash).
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("http://{}/api/", self.addr)
    }

    /// Client configuration pointing at this backend. The realtime URL is
    /// derived from the base URL.
    ///
    /// # Panics
    ///
    /// Panics if the generated configuration is rejected.
    #[must_use]
    pub fn config(&self) -> ChatConfig {
        self.config_with(&[])
    }

    /// Like [`MockBackend::config`] with extra variables.
    ///
    /// # Panics
    ///
    /// Panics if the generated configuration is rejected.
    #[must_use]
    pub fn config_with(&self, extra: &[(&str, &str)]) -> ChatConfig {
        let mut vars: HashMap<String, String> = extra
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        vars.insert("PIZZERIA_API_BASE_URL".to_string(), self.base_url());
        vars.insert(
            "PIZZERIA_SESSION_FILE".to_string(),
            "/nonexistent/admin.json".to_string(),
        );
        ChatConfig::from_map(&vars).expect("mock config")
    }

    // =========================================================================
    // Seeding
    // =========================================================================

    pub fn add_conversation(&self, conversation: Value) {
        lock(&self.state.conversations).push(conversation);
    }

    pub fn add_message(&self, message: Value) {
        lock(&self.state.messages).push(message);
    }

    /// Require `Authorization: Bearer <token>` on the conversation list.
    pub fn require_token(&self, token: &str) {
        *lock(&self.state.required_token) = Some(token.to_string());
    }

    pub fn fail_sends(&self, fail: bool) {
        self.state.fail_send.store(fail, Ordering::SeqCst);
    }

    // =========================================================================
    // Realtime control
    // =========================================================================

    /// Push a Socket.IO event to every connected socket.
    ///
    /// # Panics
    ///
    /// Panics if the payload cannot be encoded.
    pub fn push_event(&self, name: &str, data: Value) {
        let frame = Packet::event(name, data).encode().expect("encode event");
        self.push_frame(frame);
    }

    /// Push a raw frame to every connected socket.
    pub fn push_frame(&self, frame: impl Into<String>) {
        let _ = self.state.push_sender().send(frame.into());
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    #[must_use]
    pub fn posted_messages(&self) -> Vec<Value> {
        lock(&self.state.posted).clone()
    }

    #[must_use]
    pub fn closed_requests(&self) -> Vec<Value> {
        lock(&self.state.closed).clone()
    }

    #[must_use]
    pub fn history_queries(&self) -> Vec<HashMap<String, String>> {
        lock(&self.state.history_queries).clone()
    }

    /// Frames received from clients, excluding the namespace connect.
    #[must_use]
    pub fn socket_frames(&self) -> Vec<String> {
        lock(&self.state.socket_frames).clone()
    }

    /// Socket.IO events received from clients, as `(name, data)`.
    #[must_use]
    pub fn socket_events(&self) -> Vec<(String, Value)> {
        self.socket_frames()
            .iter()
            .filter_map(|frame| match Packet::decode(frame) {
                Ok(Packet::Event { name, data }) => Some((name, data)),
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub fn socket_connects(&self) -> usize {
        self.state.socket_connects.load(Ordering::SeqCst)
    }

    /// Wait until at least `count` client frames have arrived.
    ///
    /// # Panics
    ///
    /// Panics if they do not arrive within a few seconds.
    pub async fn wait_for_frames(&self, count: usize) -> Vec<String> {
        let deadline = tokio::time::Instant::now() + WAIT_TIMEOUT;
        loop {
            let frames = self.socket_frames();
            if frames.len() >= count {
                return frames;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "expected {count} socket frames, got {frames:?}"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

// =============================================================================
// Routes
// =============================================================================

fn router(state: Arc<MockState>) -> Router {
    Router::new()
        .route(
            "/api/conversations-by-operator/{operator_id}",
            get(list_conversations),
        )
        .route(
            "/api/conversation-messages",
            get(list_messages).post(create_message),
        )
        .route("/api/close-chat", post(close_chat))
        .route("/socket.io/", get(socket))
        .with_state(state)
}

async fn list_conversations(
    State(state): State<Arc<MockState>>,
    Path(_operator_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let required = lock(&state.required_token).clone();
    if let Some(token) = required {
        let expected = format!("Bearer {token}");
        let presented = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        if presented != Some(expected.as_str()) {
            return StatusCode::UNAUTHORIZED.into_response();
        }
    }

    let conversations = lock(&state.conversations).clone();
    Json(json!({ "data": conversations })).into_response()
}

async fn list_messages(
    State(state): State<Arc<MockState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    let order = params.get("orderId").cloned().unwrap_or_default();
    lock(&state.history_queries).push(params);

    let messages: Vec<Value> = lock(&state.messages)
        .iter()
        .filter(|m| m.get("order_id").and_then(Value::as_str) == Some(order.as_str()))
        .cloned()
        .collect();
    Json(Value::Array(messages))
}

async fn create_message(State(state): State<Arc<MockState>>, Json(body): Json<Value>) -> Response {
    lock(&state.posted).push(body.clone());
    if state.fail_send.load(Ordering::SeqCst) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "database unavailable").into_response();
    }

    let mut stored = body;
    let mut messages = lock(&state.messages);
    if let Some(fields) = stored.as_object_mut() {
        fields.insert("_id".to_string(), json!(format!("msg-{}", messages.len() + 1)));
        fields.insert("createdAt".to_string(), json!(chrono::Utc::now().to_rfc3339()));
    }
    messages.push(stored.clone());
    drop(messages);

    Json(json!({ "data": stored })).into_response()
}

async fn close_chat(State(state): State<Arc<MockState>>, Json(body): Json<Value>) -> Json<Value> {
    let order = body
        .get("orderId")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    lock(&state.closed).push(body);

    for conversation in lock(&state.conversations).iter_mut() {
        let matches = conversation.get("orderId").and_then(Value::as_str) == Some(order.as_str());
        if let (true, Some(fields)) = (matches, conversation.as_object_mut()) {
            fields.insert("status".to_string(), json!("closed"));
        }
    }
    Json(json!({ "message": "Chat closed" }))
}

async fn socket(ws: WebSocketUpgrade, State(state): State<Arc<MockState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Engine.IO open, Socket.IO connect acknowledgement, then relay frames.
async fn handle_socket(socket: WebSocket, state: Arc<MockState>) {
    let mut pushes = state.push_sender().subscribe();
    let (mut sender, mut receiver) = socket.split();

    let open = json!({
        "sid": "mock-engine",
        "upgrades": [],
        "pingInterval": 25_000,
        "pingTimeout": 20_000,
        "maxPayload": 1_000_000
    });
    if sender
        .send(WsMessage::Text(format!("0{open}").into()))
        .await
        .is_err()
    {
        return;
    }

    loop {
        tokio::select! {
            frame = receiver.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => {
                    let text = text.as_str();
                    if text == "40" || text.starts_with("40{") {
                        state.socket_connects.fetch_add(1, Ordering::SeqCst);
                        let ack = WsMessage::Text(r#"40{"sid":"mock-socket"}"#.into());
                        if sender.send(ack).await.is_err() {
                            break;
                        }
                    } else {
                        lock(&state.socket_frames).push(text.to_string());
                    }
                }
                Some(Ok(WsMessage::Close(_)) | Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            push = pushes.recv() => match push {
                Ok(frame) => {
                    if sender.send(WsMessage::Text(frame.into())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
}
