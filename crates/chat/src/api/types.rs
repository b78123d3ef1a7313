//! Wire types for the chat REST endpoints.
//!
//! The backend is not consistent about casing (`order_id` vs `orderId`) or
//! about wrapping payloads in `{"data": ...}`, so deserialization accepts both
//! forms. Request bodies are serialized exactly as the backend expects them.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, de};
use serde_json::{Map, Value};

use pizzeria_core::{
    ClientMessageId, ConversationStatus, Delivery, MessageId, MessageRole, OperatorId, OrderId,
    ParticipantId, SenderType, UserId,
};

use crate::models::{Conversation, Message};

/// Response body that may or may not be wrapped in a `data` envelope.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Envelope<T> {
    Wrapped { data: T },
    Bare(T),
}

impl<T> Envelope<T> {
    /// Unwrap the payload.
    pub fn into_inner(self) -> T {
        match self {
            Self::Wrapped { data } | Self::Bare(data) => data,
        }
    }
}

/// A conversation as returned by `conversations-by-operator`.
#[derive(Debug, Clone, Deserialize)]
#[serde(remote = "Self")]
pub struct ConversationRecord {
    pub user_id: UserId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_status")]
    pub status: ConversationStatus,
    #[serde(default)]
    pub last_message: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub last_message_at: Option<DateTime<Utc>>,
    pub order_id: OrderId,
}

const CONVERSATION_FIELDS: &[&[&str]] = &[
    &["user_id", "userId", "userID"],
    &["name", "userName", "username", "user_name"],
    &["last_message", "lastMessage"],
    &["last_message_at", "lastMessageTime", "last_message_time", "lastMessageAt"],
    &["order_id", "orderId"],
];

impl<'de> Deserialize<'de> for ConversationRecord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let fields = canonical_fields(deserializer, CONVERSATION_FIELDS)?;
        Self::deserialize(fields).map_err(de::Error::custom)
    }
}

impl From<ConversationRecord> for Conversation {
    fn from(record: ConversationRecord) -> Self {
        let name = record
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| record.user_id.to_string());
        Self {
            user_id: record.user_id,
            name,
            status: record.status,
            last_message: record.last_message,
            last_message_at: record.last_message_at,
            order_id: record.order_id,
        }
    }
}

/// A persisted message as returned by `conversation-messages`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(remote = "Self")]
pub struct MessageRecord {
    #[serde(default)]
    pub id: Option<MessageId>,
    #[serde(default)]
    pub sender_type: Option<String>,
    #[serde(default)]
    pub sender_id: Option<ParticipantId>,
    pub message: String,
    #[serde(default, deserialize_with = "lenient_client_id")]
    pub client_id: Option<ClientMessageId>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

const MESSAGE_FIELDS: &[&[&str]] = &[
    &["id", "_id"],
    &["sender_type", "senderType"],
    &["sender_id", "senderId"],
    &["message", "content", "body"],
    &["client_id", "clientId"],
    &["created_at", "createdAt", "timestamp"],
];

impl<'de> Deserialize<'de> for MessageRecord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let fields = canonical_fields(deserializer, MESSAGE_FIELDS)?;
        Self::deserialize(fields).map_err(de::Error::custom)
    }
}

impl MessageRecord {
    /// Map a persisted record into a transcript line.
    ///
    /// The role follows the sender-type discriminator: exactly `user` is a
    /// user line, anything else (including a missing field) is an admin line.
    #[must_use]
    pub fn into_message(self) -> Message {
        let sender_type = self
            .sender_type
            .as_deref()
            .map(SenderType::from_discriminator);
        let role = sender_type.map_or(MessageRole::Admin, MessageRole::from);
        Message {
            id: self.id,
            client_id: self.client_id,
            role,
            sender_type,
            sender_id: self.sender_id.unwrap_or_default(),
            content: self.message,
            created_at: self.created_at.unwrap_or_else(Utc::now),
            delivery: Delivery::Sent,
        }
    }
}

/// Body of `POST /conversation-messages`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendMessageRequest {
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
}

impl SendMessageRequest {
    /// The record the backend would return for this request, used when the
    /// write endpoint answers without echoing the message.
    #[must_use]
    pub fn to_record(&self) -> MessageRecord {
        MessageRecord {
            id: None,
            sender_type: Some(self.sender_type.as_str().to_owned()),
            sender_id: Some(ParticipantId::new(self.sender_id.as_str())),
            message: self.message.clone(),
            client_id: self.client_id,
            created_at: Some(Utc::now()),
        }
    }
}

/// Body of `POST /close-chat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CloseChatRequest {
    #[serde(rename = "orderId")]
    pub order_id: OrderId,
}

// =============================================================================
// Lenient field decoders
// =============================================================================

/// Read an object and fold every accepted spelling of a field onto the first
/// one listed. The first spelling present with a non-null value wins and the
/// rest are dropped, so `{"_id": .., "id": ..}` is not a duplicate field.
pub(crate) fn canonical_fields<'de, D>(
    deserializer: D,
    fields: &[&[&str]],
) -> Result<Value, D::Error>
where
    D: Deserializer<'de>,
{
    let mut object = Map::<String, Value>::deserialize(deserializer)?;
    for spellings in fields {
        let Some(canonical) = spellings.first() else {
            continue;
        };
        let chosen = spellings
            .iter()
            .find_map(|key| object.get(*key).filter(|value| !value.is_null()).cloned());
        for key in *spellings {
            object.remove(*key);
        }
        if let Some(value) = chosen {
            object.insert((*canonical).to_string(), value);
        }
    }
    Ok(Value::Object(object))
}

/// Anything other than a recognizable `closed` is treated as open.
fn lenient_status<'de, D>(deserializer: D) -> Result<ConversationStatus, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw
        .as_ref()
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
        .unwrap_or_default())
}

/// RFC 3339 strings or epoch milliseconds; anything else becomes `None`.
pub(crate) fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.and_then(|value| parse_timestamp(&value)))
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    }
}

/// Correlation ids this client did not mint are ignored rather than rejected.
pub(crate) fn lenient_client_id<'de, D>(deserializer: D) -> Result<Option<ClientMessageId>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw
        .as_ref()
        .and_then(Value::as_str)
        .and_then(|s| uuid::Uuid::parse_str(s).ok())
        .map(ClientMessageId::from))
}
