//! `pz-chat send` - reply to a customer.
//!
//! Joins the customer's room when the realtime channel is reachable so the
//! reply is pushed to them immediately; otherwise it is only persisted.

use pizzeria_chat::SendOutcome;

use super::{CliError, Session, conversation_or_placeholder};
use crate::output;

pub async fn run(session: &Session, user: &str, order: &str, text: &str) -> Result<(), CliError> {
    let (view, realtime) = session.connected_view().await;
    let conversation = conversation_or_placeholder(&view, user, order).await;

    // History is only needed for reconciliation; a failed load is not fatal.
    let _ = view.select_conversation(&conversation).await;
    let outcome = view.send(text).await;

    if let Some(realtime) = realtime {
        realtime.shutdown().await;
    }

    match outcome? {
        SendOutcome::Sent { message_id, .. } => {
            match message_id {
                Some(id) => output::line(&format!("Sent (message {id})")),
                None => output::line("Sent"),
            }
            Ok(())
        }
        SendOutcome::Failed { .. } => Err(CliError::SendFailed),
    }
}
