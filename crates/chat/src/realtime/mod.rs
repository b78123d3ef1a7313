//! Realtime channel over Socket.IO.
//!
//! One WebSocket connection lives for the lifetime of a chat session. The
//! client joins a room per selected conversation, receives
//! `message_received` pushes and announces persisted messages with
//! `send_message`. There is no reconnect: when the socket drops, realtime
//! delivery stops until a new channel is connected.

mod channel;
pub mod events;
pub mod packet;

pub use channel::{RealtimeChannel, RealtimeHandle};
pub use events::{ClientEvent, InboundMessage, JoinRoom, OutboundMessage, ServerEvent};
pub use packet::{Packet, PacketError};

use thiserror::Error;

/// Errors from the realtime channel.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// The WebSocket could not be opened or the handshake failed.
    #[error("Connect failed: {0}")]
    Connect(String),

    /// The channel task has stopped.
    #[error("Realtime channel closed")]
    Closed,

    /// The server sent a frame that could not be decoded.
    #[error("Protocol error: {0}")]
    Protocol(#[from] PacketError),

    /// An outbound payload could not be serialized.
    #[error("Encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Where the chat view sends outbound realtime events.
pub trait RealtimeSink: Send + Sync {
    /// Queue an event for delivery. Does not wait for the socket.
    ///
    /// # Errors
    ///
    /// Returns `RealtimeError::Closed` if the channel is gone, or
    /// `RealtimeError::Encode` if the payload cannot be serialized.
    fn emit(&self, event: ClientEvent) -> Result<(), RealtimeError>;
}

impl<T: RealtimeSink + ?Sized> RealtimeSink for std::sync::Arc<T> {
    fn emit(&self, event: ClientEvent) -> Result<(), RealtimeError> {
        (**self).emit(event)
    }
}

/// Install `ring` as the process-wide rustls crypto provider.
///
/// Both rustls providers end up linked into the dependency graph, so rustls
/// cannot choose one itself and any `wss://` connect would panic. Returns
/// `false` if a provider was already installed.
#[must_use]
pub fn install_crypto_provider() -> bool {
    rustls::crypto::ring::default_provider()
        .install_default()
        .is_ok()
}

/// Sink for sessions without a realtime connection (one-shot commands).
/// Events are dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct Offline;

impl RealtimeSink for Offline {
    fn emit(&self, event: ClientEvent) -> Result<(), RealtimeError> {
        tracing::debug!(event = event.name(), "No realtime connection, dropping event");
        Ok(())
    }
}
