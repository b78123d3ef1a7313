//! Typed events carried over the realtime channel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, de};
use serde_json::Value;

use pizzeria_core::{
    ClientMessageId, MessageId, OperatorId, OrderId, ParticipantId, SenderType, UserId,
};

use crate::api::{canonical_fields, lenient_client_id, lenient_timestamp};

use super::packet::Packet;

/// Event names on the wire.
pub const JOIN_ROOM: &str = "join_room";
pub const SEND_MESSAGE: &str = "send_message";
pub const MESSAGE_RECEIVED: &str = "message_received";

/// Room join payload. Field names follow the server's handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JoinRoom {
    #[serde(rename = "userID")]
    pub user_id: UserId,
    #[serde(rename = "adminId")]
    pub admin_id: OperatorId,
}

/// A persisted message announced to the counterparty.
///
/// Always carries an explicit `sender_type` so receivers never have to infer
/// the role from identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundMessage {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<MessageId>,
    pub sender_type: SenderType,
    pub sender_id: OperatorId,
    pub receiver_type: SenderType,
    pub receiver_id: UserId,
    pub message: String,
    #[serde(rename = "roomId")]
    pub room_id: String,
    pub order_id: OrderId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<ClientMessageId>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

/// Events this client emits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    JoinRoom(JoinRoom),
    SendMessage(OutboundMessage),
}

impl ClientEvent {
    /// Wire name of the event.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::JoinRoom(_) => JOIN_ROOM,
            Self::SendMessage(_) => SEND_MESSAGE,
        }
    }

    /// Encode as a Socket.IO event packet.
    ///
    /// # Errors
    ///
    /// Returns `serde_json::Error` if the payload cannot be serialized.
    pub fn to_packet(&self) -> Result<Packet, serde_json::Error> {
        let data = match self {
            Self::JoinRoom(join) => serde_json::to_value(join)?,
            Self::SendMessage(message) => serde_json::to_value(message)?,
        };
        Ok(Packet::event(self.name(), data))
    }
}

/// A message pushed by the server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(remote = "Self")]
pub struct InboundMessage {
    #[serde(default)]
    pub id: Option<MessageId>,
    pub sender_id: ParticipantId,
    #[serde(default)]
    pub sender_type: Option<String>,
    pub message: String,
    #[serde(default)]
    pub order_id: Option<OrderId>,
    #[serde(default, deserialize_with = "lenient_client_id")]
    pub client_id: Option<ClientMessageId>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

const INBOUND_FIELDS: &[&[&str]] = &[
    &["id", "_id"],
    &["sender_id", "senderId"],
    &["sender_type", "senderType"],
    &["message", "content", "body"],
    &["order_id", "orderId"],
    &["client_id", "clientId"],
    &["created_at", "createdAt", "timestamp"],
];

impl<'de> Deserialize<'de> for InboundMessage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let fields = canonical_fields(deserializer, INBOUND_FIELDS)?;
        Self::deserialize(fields).map_err(de::Error::custom)
    }
}

impl InboundMessage {
    /// Explicit sender type, when the payload carries one.
    #[must_use]
    pub fn sender_type(&self) -> Option<SenderType> {
        self.sender_type
            .as_deref()
            .map(SenderType::from_discriminator)
    }
}

/// Events the server pushes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    MessageReceived(InboundMessage),
}

impl ServerEvent {
    /// Interpret a Socket.IO event. Unknown names yield `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns `serde_json::Error` if a known event has a malformed payload.
    pub fn from_event(name: &str, data: Value) -> Result<Option<Self>, serde_json::Error> {
        match name {
            MESSAGE_RECEIVED => Ok(Some(Self::MessageReceived(serde_json::from_value(data)?))),
            _ => Ok(None),
        }
    }
}
