//! `pz-chat console` - interactive operator session.
//!
//! Plain lines are sent to the selected conversation. Slash commands:
//!
//! - `/list` - reload and print conversations
//! - `/open N` - select the N-th listed conversation
//! - `/close` - close the selected conversation (asks for confirmation)
//! - `/refresh` - reload list and history
//! - `/status` - show session state
//! - `/quit` - leave
//!
//! Realtime pushes and notices are printed as they arrive.

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc};

use pizzeria_chat::realtime::ServerEvent;
use pizzeria_chat::{ChatError, ChatEvent, RealtimeHandle, SendOutcome};

use super::{CliError, FLUSH_TIMEOUT, Session, View, close::is_yes};
use crate::output;

/// A parsed console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    List,
    Open(usize),
    Close,
    Refresh,
    Status,
    Quit,
    Help,
    Send(String),
    Unknown(String),
}

impl ConsoleCommand {
    /// Parse one input line. Blank lines yield `None`.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let Some(command) = line.strip_prefix('/') else {
            return Some(Self::Send(line.to_string()));
        };

        let mut parts = command.split_whitespace();
        let parsed = match (parts.next(), parts.next()) {
            (Some("list"), None) => Self::List,
            (Some("open"), Some(n)) => n
                .parse()
                .ok()
                .filter(|&n| n > 0)
                .map_or_else(|| Self::Unknown(line.to_string()), Self::Open),
            (Some("close"), None) => Self::Close,
            (Some("refresh"), None) => Self::Refresh,
            (Some("status"), None) => Self::Status,
            (Some("quit" | "exit"), None) => Self::Quit,
            (Some("help"), None) => Self::Help,
            _ => Self::Unknown(line.to_string()),
        };
        Some(parsed)
    }
}

struct Console<'a> {
    session: &'a Session,
    view: View,
    handle: Option<RealtimeHandle>,
    awaiting_close: bool,
}

pub async fn run(session: &Session) -> Result<(), CliError> {
    let (view, realtime) = session.connected_view().await;
    let (handle, mut inbound) = match realtime {
        Some(realtime) => (Some(realtime.handle), Some(realtime.events)),
        None => (None, None),
    };
    let mut events = view.subscribe();
    let mut console = Console {
        session,
        view,
        handle,
        awaiting_close: false,
    };

    output::line(&format!(
        "Signed in as {}. Type /help for commands.",
        session.operator.display_name()
    ));
    console.list().await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => {
                    if !console.handle_line(&line).await {
                        break;
                    }
                }
                None => break,
            },
            event = next_inbound(&mut inbound) => match event {
                Some(event) => console.inbound(event),
                None => output::line("! realtime connection lost, live updates stopped"),
            },
            event = events.recv() => match event {
                Ok(ChatEvent::Notice(notice)) => output::notice(&notice),
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    if let Some(handle) = console.handle.take() {
        handle.disconnect();
        let _ = tokio::time::timeout(FLUSH_TIMEOUT, handle.closed()).await;
    }
    Ok(())
}

/// Next realtime push. Yields `None` once when the connection ends, then
/// never resolves again.
async fn next_inbound(inbound: &mut Option<mpsc::Receiver<ServerEvent>>) -> Option<ServerEvent> {
    let Some(rx) = inbound.as_mut() else {
        return std::future::pending().await;
    };
    let event = rx.recv().await;
    if event.is_none() {
        *inbound = None;
    }
    event
}

impl Console<'_> {
    /// Handle one stdin line. Returns `false` to leave the console.
    async fn handle_line(&mut self, line: &str) -> bool {
        if self.awaiting_close {
            self.awaiting_close = false;
            if is_yes(line) {
                match self.view.confirm_close().await {
                    Ok(()) => output::line("Conversation closed."),
                    // The view has already emitted a notice.
                    Err(e) => tracing::debug!(error = %e, "Close failed"),
                }
            } else {
                self.view.cancel_close();
                output::line("Cancelled.");
            }
            return true;
        }

        let Some(command) = ConsoleCommand::parse(line) else {
            return true;
        };
        match command {
            ConsoleCommand::List => self.list().await,
            ConsoleCommand::Open(n) => self.open(n).await,
            ConsoleCommand::Close => {
                if self.view.request_close().is_ok() {
                    if let Some(selection) = self.view.selection() {
                        output::line(&format!(
                            "Close the conversation with {} about order {}? [y/N]",
                            selection.name, selection.order_id
                        ));
                    }
                    self.awaiting_close = true;
                }
            }
            ConsoleCommand::Refresh => {
                if let Err(e) = self.view.refresh().await {
                    output::line(&format!("! refresh failed: {e}"));
                }
                output::transcript(&self.view.transcript());
            }
            ConsoleCommand::Status => self.status(),
            ConsoleCommand::Quit => return false,
            ConsoleCommand::Help => output::line(
                "/list  /open N  /close  /refresh  /status  /quit  (anything else is sent)",
            ),
            ConsoleCommand::Send(text) => self.send(&text).await,
            ConsoleCommand::Unknown(text) => output::line(&format!("Unknown command: {text}")),
        }
        true
    }

    async fn list(&self) {
        if let Err(e) = self.view.load_conversations().await {
            output::line(&format!("! could not load conversations: {e}"));
        }
        output::conversations(&self.view.conversations());
    }

    async fn open(&self, n: usize) {
        let Some(conversation) = self.view.conversations().into_iter().nth(n - 1) else {
            output::line(&format!("No conversation #{n}. Try /list."));
            return;
        };
        if let Err(e) = self.view.select_conversation(&conversation).await {
            output::line(&format!("! could not load history: {e}"));
        }
        if let Some(selection) = self.view.selection() {
            output::selection(&selection);
        }
        output::transcript(&self.view.transcript());
        if !self.view.can_compose() {
            output::line("(conversation is closed, replies are disabled)");
        }
    }

    async fn send(&self, text: &str) {
        match self.view.send(text).await {
            Ok(SendOutcome::Sent { message_id, .. }) => {
                let transcript = self.view.transcript();
                let sent = transcript
                    .iter()
                    .rev()
                    .find(|m| message_id.is_some() && m.id == message_id);
                match sent {
                    Some(message) => output::message(message),
                    None => output::line("(sent)"),
                }
            }
            Ok(SendOutcome::Failed { .. }) => output::line("! message not delivered"),
            // Validation failures are reported through notices.
            Err(ChatError::Validation(_)) => {}
            Err(e) => output::line(&format!("! {e}")),
        }
    }

    fn inbound(&self, event: ServerEvent) {
        if self.view.handle_realtime(event) {
            if let Some(message) = self.view.transcript().last() {
                output::message(message);
            }
        }
    }

    fn status(&self) {
        output::line(&format!(
            "Operator: {} ({})",
            self.session.operator.display_name(),
            self.session.operator.id
        ));
        match self.view.selection() {
            Some(selection) => output::selection(&selection),
            None => output::line("No conversation selected."),
        }
        output::line(&format!(
            "Composer: {}  Messages: {}  Realtime: {}",
            if self.view.can_compose() { "enabled" } else { "disabled" },
            self.view.transcript().len(),
            if self.handle.as_ref().is_some_and(RealtimeHandle::is_connected) {
                "connected"
            } else {
                "offline"
            },
        ));
    }
}
