//! Chat services.
//!
//! - `chat` - The operator chat view: list, history, composer, lifecycle
//! - `transcript` - Reconciling optimistic sends with reloaded history

pub mod chat;
pub mod transcript;

pub use chat::{ChatEvent, ChatView, Notice, SendOutcome};
pub use transcript::reconcile;
