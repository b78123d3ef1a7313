//! `pz-chat close` - close the conversation for an order.

use std::io::Write;

use super::{CliError, Session, find_conversation};
use crate::output;

pub async fn run(session: &Session, order: &str, yes: bool) -> Result<(), CliError> {
    let view = session.offline_view();
    let conversation = find_conversation(&view, None, order)
        .await
        .ok_or_else(|| CliError::ConversationNotFound(order.to_string()))?;

    // History is irrelevant here; a failed load is already logged.
    let _ = view.select_conversation(&conversation).await;
    view.request_close()?;

    let prompt = format!(
        "Close the conversation with {} about order {}?",
        conversation.name, conversation.order_id
    );
    if !yes && !confirm(&prompt)? {
        view.cancel_close();
        output::line("Cancelled");
        return Ok(());
    }

    view.confirm_close().await?;
    output::line(&format!("Closed conversation for order {order}"));
    Ok(())
}

/// Ask a yes/no question on stdin. Anything but `y`/`yes` is a no.
#[allow(clippy::print_stdout)]
fn confirm(prompt: &str) -> Result<bool, CliError> {
    print!("{prompt} [y/N] ");
    std::io::stdout().flush()?;

    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(is_yes(&answer))
}

pub fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
