//! Transcript message model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pizzeria_core::{ClientMessageId, Delivery, MessageId, MessageRole, ParticipantId, SenderType};

/// A single transcript line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Backend id. `None` until the backend has confirmed the message.
    pub id: Option<MessageId>,
    /// Correlation id of an optimistic send, echoed back when the backend
    /// supports it.
    pub client_id: Option<ClientMessageId>,
    /// How the line is rendered.
    pub role: MessageRole,
    /// Explicit sender type, when known.
    pub sender_type: Option<SenderType>,
    /// Raw sender id.
    pub sender_id: ParticipantId,
    /// Message body.
    pub content: String,
    /// Origin timestamp (server time when known, local time otherwise).
    pub created_at: DateTime<Utc>,
    /// Delivery state.
    pub delivery: Delivery,
}

impl Message {
    /// Whether this entry is an optimistic send still in flight.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.delivery == Delivery::Pending
    }
}
