//! Pizzeria Core - Shared types library.
//!
//! This crate provides common types used across the operator chat components:
//! - `chat` - REST client, realtime channel and the chat view controller
//! - `cli` - Operator console and one-shot commands
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no HTTP clients, no sockets.
//! This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for backend ids and chat statuses

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
