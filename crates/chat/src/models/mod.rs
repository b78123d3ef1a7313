//! Chat domain models.
//!
//! # Models
//!
//! - `conversation` - One end-user/order thread served by an operator
//! - `message` - One transcript line

pub mod conversation;
pub mod message;

pub use conversation::{Conversation, Selection};
pub use message::Message;
