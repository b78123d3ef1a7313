//! Conversation domain models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pizzeria_core::{ConversationStatus, OrderId, UserId};

/// A conversation between an end-user and the operator about one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    /// End-user on the other side.
    pub user_id: UserId,
    /// Display name of the end-user.
    pub name: String,
    /// Lifecycle status.
    pub status: ConversationStatus,
    /// Text of the most recent message, if any.
    pub last_message: Option<String>,
    /// When the most recent message was sent.
    pub last_message_at: Option<DateTime<Utc>>,
    /// Order the conversation is about.
    pub order_id: OrderId,
}

impl Conversation {
    /// The selection key for this conversation.
    #[must_use]
    pub fn selection(&self) -> Selection {
        Selection {
            user_id: self.user_id.clone(),
            order_id: self.order_id.clone(),
            status: self.status,
            name: self.name.clone(),
        }
    }
}

/// The conversation currently focused in the view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub user_id: UserId,
    pub order_id: OrderId,
    pub status: ConversationStatus,
    pub name: String,
}

impl Selection {
    /// Whether this selection addresses the same thread as `other`.
    #[must_use]
    pub fn same_thread(&self, user_id: &UserId, order_id: &OrderId) -> bool {
        &self.user_id == user_id && &self.order_id == order_id
    }

    /// Realtime room identifier used when persisting messages.
    #[must_use]
    pub fn room_id(&self) -> String {
        format!("chat-room-{}", self.user_id)
    }
}
