//! Pizzeria operator chat library.
//!
//! Everything the support-desk chat needs, independent of how it is
//! rendered:
//! - Operator identity from the persisted admin session
//! - REST access to conversations and messages
//! - The Socket.IO realtime channel
//! - `ChatView`, which owns list, transcript, composer and lifecycle state
//!
//! The `pz-chat` binary is a thin console over this crate.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod realtime;
pub mod services;
pub mod session;

pub use api::{ApiClient, ApiError, ChatBackend};
pub use config::{ChatConfig, ConfigError};
pub use error::{ChatError, ValidationError};
pub use realtime::{
    Offline, RealtimeChannel, RealtimeError, RealtimeHandle, RealtimeSink, install_crypto_provider,
};
pub use services::{ChatEvent, ChatView, Notice, SendOutcome};
pub use session::{Operator, SessionResolver};
