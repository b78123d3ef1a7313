//! Socket.IO v5 / Engine.IO v4 text packet codec.
//!
//! Only the text subset used by the chat channel is supported: Engine.IO
//! control packets plus Socket.IO connect/disconnect/event packets on the
//! default namespace. Binary attachments are rejected.
//!
//! ```text
//! 0{"sid":"..","pingInterval":25000,..}   engine open
//! 2 / 3                                   engine ping / pong
//! 40                                      socket connect
//! 42["message_received",{..}]             socket event
//! ```

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Errors decoding or encoding a packet.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PacketError {
    /// Empty frame.
    #[error("empty packet")]
    Empty,

    /// Unknown Engine.IO or Socket.IO packet type.
    #[error("unknown packet type '{0}'")]
    UnknownType(char),

    /// Binary events are not supported on this channel.
    #[error("binary packets are not supported")]
    Binary,

    /// The JSON payload is malformed.
    #[error("malformed payload: {0}")]
    Payload(String),
}

/// Handshake data from the Engine.IO open packet.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenInfo {
    pub sid: String,
    #[serde(default)]
    pub ping_interval: u64,
    #[serde(default)]
    pub ping_timeout: u64,
}

/// A decoded frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    /// Engine.IO handshake.
    Open(OpenInfo),
    /// Engine.IO close.
    Close,
    /// Engine.IO ping (server to client in v4).
    Ping,
    /// Engine.IO pong.
    Pong,
    /// Engine.IO noop.
    Noop,
    /// Socket.IO namespace connect, with the server's auth/sid payload.
    Connect(Option<Value>),
    /// Socket.IO namespace disconnect.
    Disconnect,
    /// Socket.IO connect refusal.
    ConnectError(Value),
    /// Socket.IO event.
    Event { name: String, data: Value },
    /// Socket.IO acknowledgement (ignored by the channel).
    Ack,
}

impl Packet {
    /// Build an event packet.
    #[must_use]
    pub fn event(name: impl Into<String>, data: Value) -> Self {
        Self::Event {
            name: name.into(),
            data,
        }
    }

    /// Encode to a text frame.
    ///
    /// # Errors
    ///
    /// Returns `PacketError::Payload` if the event data cannot be serialized.
    pub fn encode(&self) -> Result<String, PacketError> {
        let frame = match self {
            Self::Open(_) => {
                return Err(PacketError::Payload(
                    "open packets are only sent by the server".to_string(),
                ));
            }
            Self::Close => "1".to_string(),
            Self::Ping => "2".to_string(),
            Self::Pong => "3".to_string(),
            Self::Noop => "6".to_string(),
            Self::Connect(None) => "40".to_string(),
            Self::Connect(Some(auth)) => format!("40{auth}"),
            Self::Disconnect => "41".to_string(),
            Self::ConnectError(data) => format!("44{data}"),
            Self::Event { name, data } => {
                let array = Value::Array(vec![Value::String(name.clone()), data.clone()]);
                let body = serde_json::to_string(&array)
                    .map_err(|e| PacketError::Payload(e.to_string()))?;
                format!("42{body}")
            }
            Self::Ack => "43".to_string(),
        };
        Ok(frame)
    }

    /// Decode a text frame.
    ///
    /// # Errors
    ///
    /// Returns `PacketError` for empty, unknown, binary or malformed frames.
    pub fn decode(frame: &str) -> Result<Self, PacketError> {
        let mut chars = frame.chars();
        let engine_type = chars.next().ok_or(PacketError::Empty)?;
        let rest = chars.as_str();

        match engine_type {
            '0' => serde_json::from_str(rest)
                .map(Self::Open)
                .map_err(|e| PacketError::Payload(e.to_string())),
            '1' => Ok(Self::Close),
            '2' => Ok(Self::Ping),
            '3' => Ok(Self::Pong),
            '4' => decode_socket(rest),
            '6' => Ok(Self::Noop),
            other => Err(PacketError::UnknownType(other)),
        }
    }
}

/// Decode the Socket.IO packet carried inside an Engine.IO message.
fn decode_socket(body: &str) -> Result<Packet, PacketError> {
    let mut chars = body.chars();
    let socket_type = chars.next().ok_or(PacketError::Empty)?;
    let rest = skip_namespace(chars.as_str());

    match socket_type {
        '0' => {
            if rest.is_empty() {
                Ok(Packet::Connect(None))
            } else {
                parse_json(rest).map(|v| Packet::Connect(Some(v)))
            }
        }
        '1' => Ok(Packet::Disconnect),
        '2' => decode_event(skip_ack_id(rest)),
        '3' => Ok(Packet::Ack),
        '4' => parse_json(rest).map(Packet::ConnectError),
        '5' | '6' => Err(PacketError::Binary),
        other => Err(PacketError::UnknownType(other)),
    }
}

fn decode_event(body: &str) -> Result<Packet, PacketError> {
    let value = parse_json(body)?;
    let Value::Array(mut items) = value else {
        return Err(PacketError::Payload("event payload is not an array".to_string()));
    };
    if items.is_empty() {
        return Err(PacketError::Payload("event has no name".to_string()));
    }
    let name = match items.remove(0) {
        Value::String(name) => name,
        _ => return Err(PacketError::Payload("event name is not a string".to_string())),
    };
    // Extra arguments beyond the first are not used by the chat events.
    let data = if items.is_empty() {
        Value::Null
    } else {
        items.swap_remove(0)
    };
    Ok(Packet::Event { name, data })
}

/// Strip a `/namespace,` prefix.
fn skip_namespace(body: &str) -> &str {
    if body.starts_with('/') {
        body.split_once(',').map_or("", |(_, rest)| rest)
    } else {
        body
    }
}

/// Strip a numeric acknowledgement id.
fn skip_ack_id(body: &str) -> &str {
    body.trim_start_matches(|c: char| c.is_ascii_digit())
}

fn parse_json(body: &str) -> Result<Value, PacketError> {
    serde_json::from_str(body).map_err(|e| PacketError::Payload(e.to_string()))
}
