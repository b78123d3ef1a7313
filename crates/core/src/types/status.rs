//! Status enums for conversations and messages.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a conversation.
///
/// From the operator console a conversation only ever moves `Open -> Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    #[default]
    Open,
    Closed,
}

impl ConversationStatus {
    /// Whether new messages may still be composed.
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }
}

impl std::fmt::Display for ConversationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

impl std::str::FromStr for ConversationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(Self::Open),
            "closed" | "close" => Ok(Self::Closed),
            _ => Err(format!("invalid conversation status: {s}")),
        }
    }
}

/// Party type carried on the wire as `sender_type` / `receiver_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SenderType {
    /// End customer.
    User,
    /// Restaurant operator.
    Admin,
}

impl SenderType {
    /// Wire spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }

    /// Interpret a raw discriminator. Only the exact string `user` is a user.
    #[must_use]
    pub fn from_discriminator(raw: &str) -> Self {
        if raw == "user" { Self::User } else { Self::Admin }
    }
}

impl std::fmt::Display for SenderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role of a transcript line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Admin,
}

impl From<SenderType> for MessageRole {
    fn from(sender: SenderType) -> Self {
        match sender {
            SenderType::User => Self::User,
            SenderType::Admin => Self::Admin,
        }
    }
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Admin => write!(f, "admin"),
        }
    }
}

/// Delivery state of a transcript line.
///
/// Everything loaded from the backend or pushed over the realtime channel is
/// `Sent`. Only optimistic entries start out `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Delivery {
    Pending,
    #[default]
    Sent,
    Failed,
}
