//! Subcommand implementations.
//!
//! Every command builds a [`ChatView`] over the REST client. One-shot
//! commands that only read use an offline realtime sink; `send` and
//! `console` connect the realtime channel when they can and fall back to
//! offline when they cannot.

pub mod close;
pub mod console;
pub mod conversations;
pub mod history;
pub mod send;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::warn;

use pizzeria_chat::models::Conversation;
use pizzeria_chat::realtime::ServerEvent;
use pizzeria_chat::session::SessionError;
use pizzeria_chat::{
    ApiClient, ApiError, ChatConfig, ChatError, ChatView, ConfigError, Offline, Operator,
    RealtimeChannel, RealtimeHandle, RealtimeSink, SessionResolver,
};
use pizzeria_core::{ConversationStatus, OrderId, UserId};

/// Undelivered realtime events buffered for the console.
const REALTIME_CAPACITY: usize = 256;

/// How long to wait for queued realtime frames to flush on exit.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// The view type every command works with.
pub type View = ChatView<ApiClient, Arc<dyn RealtimeSink>>;

/// Errors surfaced by `pz-chat` commands.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("No operator session: {0}")]
    Session(#[from] SessionError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Chat(#[from] ChatError),

    #[error("No conversation found for order {0}")]
    ConversationNotFound(String),

    #[error("Message was not delivered")]
    SendFailed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A live realtime connection: the handle and its inbound events.
pub struct Realtime {
    pub handle: RealtimeHandle,
    pub events: mpsc::Receiver<ServerEvent>,
}

impl Realtime {
    /// Leave the namespace and wait briefly for queued frames to go out.
    pub async fn shutdown(self) {
        self.handle.disconnect();
        let _ = tokio::time::timeout(FLUSH_TIMEOUT, self.handle.closed()).await;
    }
}

/// Configuration, operator identity and REST client shared by all commands.
pub struct Session {
    pub config: ChatConfig,
    pub operator: Operator,
    pub client: ApiClient,
}

impl Session {
    /// Resolve the operator and build the REST client.
    ///
    /// # Errors
    ///
    /// Returns error if the session file has no usable operator or the
    /// client cannot be built.
    pub fn open(config: ChatConfig) -> Result<Self, CliError> {
        let operator = SessionResolver::load(&config.session_file)?;
        let client = ApiClient::new(&config)?;
        tracing::debug!(operator_id = %operator.id, "Session opened");
        Ok(Self {
            config,
            operator,
            client,
        })
    }

    /// A view without a realtime connection.
    pub fn offline_view(&self) -> View {
        ChatView::new(
            self.client.clone(),
            Arc::new(Offline) as Arc<dyn RealtimeSink>,
            Some(self.operator.clone()),
        )
    }

    /// A view with a realtime connection, or an offline view if the channel
    /// cannot be opened.
    pub async fn connected_view(&self) -> (View, Option<Realtime>) {
        match RealtimeChannel::connect(&self.config.realtime_url, REALTIME_CAPACITY).await {
            Ok((handle, events)) => {
                let view = ChatView::new(
                    self.client.clone(),
                    Arc::new(handle.clone()) as Arc<dyn RealtimeSink>,
                    Some(self.operator.clone()),
                );
                (view, Some(Realtime { handle, events }))
            }
            Err(e) => {
                warn!(error = %e, "Realtime unavailable, continuing without live updates");
                (self.offline_view(), None)
            }
        }
    }
}

/// Find the listed conversation for `order`, optionally also matching the
/// customer.
///
/// A failed list load is logged by the view and treated as an empty list.
pub async fn find_conversation(
    view: &View,
    user: Option<&str>,
    order: &str,
) -> Option<Conversation> {
    let _ = view.load_conversations().await;
    view.conversations().into_iter().find(|c| {
        c.order_id.as_str() == order && user.is_none_or(|u| c.user_id.as_str() == u)
    })
}

/// The listed conversation for (`user`, `order`), or an open placeholder
/// when the backend does not list it.
pub async fn conversation_or_placeholder(view: &View, user: &str, order: &str) -> Conversation {
    match find_conversation(view, Some(user), order).await {
        Some(conversation) => conversation,
        None => Conversation {
            user_id: UserId::new(user),
            name: user.to_string(),
            status: ConversationStatus::Open,
            last_message: None,
            last_message_at: None,
            order_id: OrderId::new(order),
        },
    }
}
