//! `pz-chat conversations` - list the operator's conversations.

use pizzeria_core::ConversationStatus;

use super::{CliError, Session};
use crate::output;

/// Load and print the conversation list, optionally filtered by status.
pub async fn run(session: &Session, status: Option<ConversationStatus>) -> Result<(), CliError> {
    let view = session.offline_view();
    view.load_conversations().await?;

    let conversations = match status {
        Some(status) => view.conversations_with_status(status),
        None => view.conversations(),
    };
    output::conversations(&conversations);
    Ok(())
}
