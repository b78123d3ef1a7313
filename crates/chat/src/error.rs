//! Unified error handling for the chat client.

use thiserror::Error;

use crate::api::ApiError;
use crate::realtime::RealtimeError;

/// Reasons a send is blocked locally before any request is issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The message body is empty after trimming.
    #[error("message is empty")]
    EmptyBody,

    /// No conversation (or no order) is selected.
    #[error("select a conversation with an order before sending")]
    NoConversationSelected,

    /// The selected conversation has been closed.
    #[error("this conversation is closed")]
    ConversationClosed,
}

/// Application-level error type for chat view operations.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Blocked locally; nothing was sent.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// REST backend call failed.
    #[error("Backend error: {0}")]
    Api(#[from] ApiError),

    /// Realtime channel failed.
    #[error("Realtime error: {0}")]
    Realtime(#[from] RealtimeError),

    /// No operator identity has been resolved for this session.
    #[error("No operator signed in")]
    NoOperator,

    /// `confirm_close` was called without a preceding `request_close`.
    #[error("No close request is awaiting confirmation")]
    NoPendingClose,
}

impl ChatError {
    /// Whether this error was raised before any request left the client.
    #[must_use]
    pub const fn is_local(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::NoOperator | Self::NoPendingClose
        )
    }
}
