//! `pz-chat history` - print one conversation's transcript.

use super::{CliError, Session, conversation_or_placeholder};
use crate::output;

pub async fn run(session: &Session, user: &str, order: &str) -> Result<(), CliError> {
    let view = session.offline_view();
    let conversation = conversation_or_placeholder(&view, user, order).await;

    view.select_conversation(&conversation).await?;

    if let Some(selection) = view.selection() {
        output::selection(&selection);
    }
    output::transcript(&view.transcript());
    Ok(())
}
