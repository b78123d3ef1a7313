//! Chat view controller.
//!
//! `ChatView` owns everything the operator console shows: the conversation
//! list, the selected thread and its transcript, the composer draft and the
//! close-confirmation dialog. It drives the flow of:
//!
//! 1. Loading the operator's conversations
//! 2. Selecting a thread (room join + history load)
//! 3. Sending (optimistic append, persist, realtime announce, reload)
//! 4. Applying realtime pushes
//! 5. Closing a conversation
//!
//! State lives behind a `std::sync::Mutex` that is never held across an
//! `.await`. Every fetch is tagged with a generation number and responses
//! for a superseded generation are dropped, so rapid switching between
//! conversations cannot leave a stale transcript on screen.

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};

use pizzeria_core::{
    ClientMessageId, ConversationStatus, Delivery, MessageId, MessageRole, OrderId,
    ParticipantId, SenderType,
};

use super::transcript::reconcile;
use crate::api::{ChatBackend, MessageRecord, SendMessageRequest};
use crate::error::{ChatError, ValidationError};
use crate::models::{Conversation, Message, Selection};
use crate::realtime::{ClientEvent, JoinRoom, OutboundMessage, RealtimeSink, ServerEvent};
use crate::session::Operator;

/// Buffered view events per subscriber.
const EVENT_CAPACITY: usize = 64;

/// A transient, user-visible notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Warning(String),
    Error(String),
}

impl Notice {
    /// Notification text.
    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Self::Warning(text) | Self::Error(text) => text,
        }
    }
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Warning(text) => write!(f, "warning: {text}"),
            Self::Error(text) => write!(f, "error: {text}"),
        }
    }
}

/// Change notifications for whatever renders the view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    ConversationsUpdated,
    TranscriptUpdated,
    Notice(Notice),
}

/// Result of a send that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// The backend stored the message.
    Sent {
        client_id: ClientMessageId,
        message_id: Option<MessageId>,
    },
    /// The write failed. The optimistic entry stays in the transcript marked
    /// `failed`.
    Failed { client_id: ClientMessageId },
}

impl SendOutcome {
    #[must_use]
    pub const fn is_sent(&self) -> bool {
        matches!(self, Self::Sent { .. })
    }
}

/// Mutable view state.
#[derive(Debug, Default)]
struct ChatState {
    operator: Option<Operator>,
    conversations: Vec<Conversation>,
    selection: Option<Selection>,
    transcript: Vec<Message>,
    draft: String,
    sending: bool,
    close_dialog_open: bool,
    refresh: bool,
    list_generation: u64,
    history_generation: u64,
}

/// Everything a send needs once validation has passed.
struct PendingSend {
    client_id: ClientMessageId,
    request: SendMessageRequest,
}

/// Operator chat view over a REST backend and a realtime sink.
pub struct ChatView<B, R> {
    backend: B,
    realtime: R,
    state: Mutex<ChatState>,
    events: broadcast::Sender<ChatEvent>,
}

impl<B: ChatBackend, R: RealtimeSink> ChatView<B, R> {
    /// Create a view for `operator`.
    ///
    /// With no operator the view stays usable but inert: nothing
    /// operator-scoped is loaded and sends are rejected.
    #[must_use]
    pub fn new(backend: B, realtime: R, operator: Option<Operator>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            backend,
            realtime,
            state: Mutex::new(ChatState {
                operator,
                ..ChatState::default()
            }),
            events,
        }
    }

    /// Subscribe to view change notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.events.subscribe()
    }

    // =========================================================================
    // Snapshots
    // =========================================================================

    #[must_use]
    pub fn operator(&self) -> Option<Operator> {
        self.state().operator.clone()
    }

    #[must_use]
    pub fn conversations(&self) -> Vec<Conversation> {
        self.state().conversations.clone()
    }

    /// Conversations in the given lifecycle status, in backend order.
    #[must_use]
    pub fn conversations_with_status(&self, status: ConversationStatus) -> Vec<Conversation> {
        self.state()
            .conversations
            .iter()
            .filter(|c| c.status == status)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn selection(&self) -> Option<Selection> {
        self.state().selection.clone()
    }

    #[must_use]
    pub fn transcript(&self) -> Vec<Message> {
        self.state().transcript.clone()
    }

    #[must_use]
    pub fn is_sending(&self) -> bool {
        self.state().sending
    }

    #[must_use]
    pub fn is_close_dialog_open(&self) -> bool {
        self.state().close_dialog_open
    }

    /// Current value of the refresh toggle.
    #[must_use]
    pub fn refresh_flag(&self) -> bool {
        self.state().refresh
    }

    /// Whether the composer accepts input: a thread with an order is
    /// selected and it has not been closed.
    #[must_use]
    pub fn can_compose(&self) -> bool {
        self.state()
            .selection
            .as_ref()
            .is_some_and(|s| !s.order_id.is_empty() && s.status.is_open())
    }

    // =========================================================================
    // Loading
    // =========================================================================

    /// Replace the conversation list with the backend's.
    ///
    /// A no-op without an operator. On failure the previous list is kept.
    ///
    /// # Errors
    ///
    /// Returns `ChatError::Api` if the request fails.
    #[instrument(skip(self))]
    pub async fn load_conversations(&self) -> Result<(), ChatError> {
        let (operator_id, generation) = {
            let mut state = self.state();
            let Some(operator) = state.operator.as_ref() else {
                debug!("No operator, skipping conversation load");
                return Ok(());
            };
            let operator_id = operator.id.clone();
            state.list_generation += 1;
            (operator_id, state.list_generation)
        };

        let conversations = match self.backend.list_conversations(&operator_id).await {
            Ok(conversations) => conversations,
            Err(e) => {
                warn!(operator_id = %operator_id, error = %e, "Failed to load conversations");
                return Err(e.into());
            }
        };

        {
            let mut state = self.state();
            if state.list_generation != generation {
                debug!(generation, "Discarding superseded conversation list");
                return Ok(());
            }
            if let Some(selection) = state.selection.as_mut() {
                if let Some(current) = conversations
                    .iter()
                    .find(|c| selection.same_thread(&c.user_id, &c.order_id))
                {
                    selection.status = current.status;
                }
            }
            state.conversations = conversations;
        }

        self.emit(ChatEvent::ConversationsUpdated);
        Ok(())
    }

    /// Focus a conversation: join its room and load its history.
    ///
    /// # Errors
    ///
    /// Returns `ChatError::Api` if the history request fails. The selection
    /// is kept either way.
    #[instrument(skip(self, conversation), fields(user_id = %conversation.user_id, order_id = %conversation.order_id))]
    pub async fn select_conversation(&self, conversation: &Conversation) -> Result<(), ChatError> {
        let join = {
            let mut state = self.state();
            state.selection = Some(conversation.selection());
            state.transcript.clear();
            state.close_dialog_open = false;
            state.history_generation += 1;
            state.operator.as_ref().map(|operator| JoinRoom {
                user_id: conversation.user_id.clone(),
                admin_id: operator.id.clone(),
            })
        };
        self.emit(ChatEvent::TranscriptUpdated);

        if let Some(join) = join {
            if let Err(e) = self.realtime.emit(ClientEvent::JoinRoom(join)) {
                warn!(error = %e, "Failed to join conversation room");
            }
        }

        self.load_history().await
    }

    /// Drop the selection and its transcript.
    pub fn clear_selection(&self) {
        {
            let mut state = self.state();
            state.selection = None;
            state.transcript.clear();
            state.close_dialog_open = false;
            state.history_generation += 1;
        }
        self.emit(ChatEvent::TranscriptUpdated);
    }

    /// Reload the selected thread's history.
    ///
    /// Inert unless user, operator and order ids are all known. Responses
    /// that arrive after the selection changed are discarded.
    ///
    /// # Errors
    ///
    /// Returns `ChatError::Api` if the request fails; the transcript is kept.
    #[instrument(skip(self))]
    pub async fn load_history(&self) -> Result<(), ChatError> {
        let (user_id, operator_id, order_id, generation) = {
            let mut state = self.state();
            let (Some(selection), Some(operator)) = (&state.selection, &state.operator) else {
                return Ok(());
            };
            if selection.user_id.is_empty()
                || selection.order_id.is_empty()
                || operator.id.is_empty()
            {
                debug!("Incomplete selection, skipping history load");
                return Ok(());
            }
            let key = (
                selection.user_id.clone(),
                operator.id.clone(),
                selection.order_id.clone(),
            );
            state.history_generation += 1;
            (key.0, key.1, key.2, state.history_generation)
        };

        let records = match self
            .backend
            .fetch_history(&user_id, &operator_id, &order_id)
            .await
        {
            Ok(records) => records,
            Err(e) => {
                warn!(user_id = %user_id, order_id = %order_id, error = %e, "Failed to load history");
                return Err(e.into());
            }
        };

        {
            let mut state = self.state();
            let current = state
                .selection
                .as_ref()
                .is_some_and(|s| s.same_thread(&user_id, &order_id));
            if state.history_generation != generation || !current {
                debug!(generation, "Discarding superseded history");
                return Ok(());
            }
            let server: Vec<Message> = records
                .into_iter()
                .map(MessageRecord::into_message)
                .collect();
            state.transcript = reconcile(server, &state.transcript);
        }

        self.emit(ChatEvent::TranscriptUpdated);
        Ok(())
    }

    /// Toggle the refresh flag and reload the list and the selected history.
    ///
    /// # Errors
    ///
    /// Returns the first load error; both loads are attempted.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<(), ChatError> {
        {
            let mut state = self.state();
            state.refresh = !state.refresh;
        }
        let (list, history) = tokio::join!(self.load_conversations(), self.load_history());
        list.and(history)
    }

    // =========================================================================
    // Composer
    // =========================================================================

    pub fn set_draft(&self, text: impl Into<String>) {
        self.state().draft = text.into();
    }

    #[must_use]
    pub fn draft(&self) -> String {
        self.state().draft.clone()
    }

    /// Send the current draft.
    ///
    /// # Errors
    ///
    /// See [`ChatView::send`].
    pub async fn send_draft(&self) -> Result<SendOutcome, ChatError> {
        let draft = self.draft();
        self.send(&draft).await
    }

    /// Send a message to the selected conversation.
    ///
    /// The message appears in the transcript immediately as `pending`. It is
    /// then persisted, announced over the realtime channel and the history is
    /// reloaded. A failed write is logged and leaves the entry marked
    /// `failed`; that is reported as `Ok(SendOutcome::Failed)`.
    ///
    /// # Errors
    ///
    /// Returns `ChatError::Validation` (nothing sent, transcript untouched,
    /// a warning notice emitted) for an empty body, a missing selection or a
    /// closed conversation, and `ChatError::NoOperator` when nobody is
    /// signed in.
    #[instrument(skip(self, text))]
    pub async fn send(&self, text: &str) -> Result<SendOutcome, ChatError> {
        let body = text.trim();
        let prepared = if body.is_empty() {
            Err(ValidationError::EmptyBody.into())
        } else {
            let mut state = self.state();
            Self::prepare_send(&mut state, body)
        };
        let PendingSend { client_id, request } = match prepared {
            Ok(pending) => pending,
            Err(e) => {
                self.notice(Notice::Warning(e.to_string()));
                return Err(e);
            }
        };
        self.emit(ChatEvent::TranscriptUpdated);

        let outcome = match self.backend.persist_message(&request).await {
            Ok(record) => {
                self.mark_delivery(client_id, Delivery::Sent, record.id.clone());
                let announce = OutboundMessage {
                    id: record.id.clone(),
                    sender_type: request.sender_type,
                    sender_id: request.sender_id.clone(),
                    receiver_type: request.receiver_type,
                    receiver_id: request.receiver_id.clone(),
                    message: request.message.clone(),
                    room_id: request.room_id.clone(),
                    order_id: request.order_id.clone(),
                    client_id: Some(client_id),
                    created_at: record.created_at.unwrap_or_else(Utc::now),
                };
                if let Err(e) = self.realtime.emit(ClientEvent::SendMessage(announce)) {
                    warn!(error = %e, "Failed to announce message over realtime channel");
                }
                info!(order_id = %request.order_id, message_id = ?record.id, "Message sent");
                SendOutcome::Sent {
                    client_id,
                    message_id: record.id,
                }
            }
            Err(e) => {
                warn!(order_id = %request.order_id, error = %e, "Failed to persist message");
                self.mark_delivery(client_id, Delivery::Failed, None);
                SendOutcome::Failed { client_id }
            }
        };

        self.state().sending = false;
        self.emit(ChatEvent::TranscriptUpdated);

        if outcome.is_sent() {
            // Load errors are already logged; the send itself succeeded.
            let _ = self.refresh().await;
        }

        Ok(outcome)
    }

    /// Validate and apply the optimistic part of a send.
    fn prepare_send(state: &mut ChatState, body: &str) -> Result<PendingSend, ChatError> {
        let selection = state
            .selection
            .as_ref()
            .filter(|s| !s.user_id.is_empty() && !s.order_id.is_empty())
            .ok_or(ValidationError::NoConversationSelected)?;
        if !selection.status.is_open() {
            return Err(ValidationError::ConversationClosed.into());
        }
        let operator = state.operator.as_ref().ok_or(ChatError::NoOperator)?;

        let client_id = ClientMessageId::generate();
        let request = SendMessageRequest {
            sender_type: SenderType::Admin,
            sender_id: operator.id.clone(),
            receiver_type: SenderType::User,
            receiver_id: selection.user_id.clone(),
            message: body.to_owned(),
            room_id: selection.room_id(),
            order_id: selection.order_id.clone(),
            client_id: Some(client_id),
        };

        state.transcript.push(Message {
            id: None,
            client_id: Some(client_id),
            role: MessageRole::User,
            sender_type: Some(SenderType::Admin),
            sender_id: ParticipantId::new(operator.id.as_str()),
            content: request.message.clone(),
            created_at: Utc::now(),
            delivery: Delivery::Pending,
        });
        state.draft.clear();
        state.sending = true;

        Ok(PendingSend { client_id, request })
    }

    fn mark_delivery(&self, client_id: ClientMessageId, delivery: Delivery, id: Option<MessageId>) {
        let mut state = self.state();
        if let Some(entry) = state
            .transcript
            .iter_mut()
            .find(|m| m.client_id == Some(client_id))
        {
            entry.delivery = delivery;
            if id.is_some() {
                entry.id = id;
            }
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Open the close-confirmation dialog for the selected conversation.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::NoConversationSelected` without a selected
    /// order, or `ValidationError::ConversationClosed` if already closed.
    pub fn request_close(&self) -> Result<(), ChatError> {
        let result = {
            let mut state = self.state();
            let check = match state.selection.as_ref() {
                None => Err(ValidationError::NoConversationSelected),
                Some(s) if s.order_id.is_empty() => Err(ValidationError::NoConversationSelected),
                Some(s) if !s.status.is_open() => Err(ValidationError::ConversationClosed),
                Some(_) => Ok(()),
            };
            if check.is_ok() {
                state.close_dialog_open = true;
            }
            check
        };
        result.map_err(|e| {
            self.notice(Notice::Warning(e.to_string()));
            e.into()
        })
    }

    /// Dismiss the close-confirmation dialog.
    pub fn cancel_close(&self) {
        self.state().close_dialog_open = false;
    }

    /// Close the selected conversation after confirmation.
    ///
    /// On success the list is reloaded, the transcript cleared and the
    /// composer disabled. On failure a notice is emitted and the conversation
    /// stays open.
    ///
    /// # Errors
    ///
    /// Returns `ChatError::NoPendingClose` without a preceding
    /// [`ChatView::request_close`], or `ChatError::Api` if the request fails.
    #[instrument(skip(self))]
    pub async fn confirm_close(&self) -> Result<(), ChatError> {
        let order_id: OrderId = {
            let state = self.state();
            if !state.close_dialog_open {
                return Err(ChatError::NoPendingClose);
            }
            state
                .selection
                .as_ref()
                .map(|s| s.order_id.clone())
                .ok_or(ValidationError::NoConversationSelected)?
        };

        if let Err(e) = self.backend.close_chat(&order_id).await {
            warn!(order_id = %order_id, error = %e, "Failed to close conversation");
            self.notice(Notice::Error(format!("Could not close the conversation: {e}")));
            return Err(e.into());
        }
        info!(order_id = %order_id, "Conversation closed");

        // A failed list reload is logged and leaves the old list in place.
        let _ = self.load_conversations().await;

        {
            let mut state = self.state();
            state.transcript.clear();
            state.history_generation += 1;
            state.close_dialog_open = false;
            if let Some(selection) = state
                .selection
                .as_mut()
                .filter(|s| s.order_id == order_id)
            {
                selection.status = ConversationStatus::Closed;
            }
        }
        self.emit(ChatEvent::TranscriptUpdated);
        Ok(())
    }

    // =========================================================================
    // Realtime
    // =========================================================================

    /// Apply a server push. Returns whether the transcript changed.
    ///
    /// Echoes of the operator's own messages are ignored. The role comes from
    /// the payload's `sender_type` when present and defaults to admin.
    /// Messages for another order, or from a customer other than the selected
    /// one, update the conversation list only.
    #[instrument(skip_all)]
    pub fn handle_realtime(&self, event: ServerEvent) -> bool {
        let ServerEvent::MessageReceived(inbound) = event;
        let sender_type = inbound.sender_type();

        let (appended, list_changed) = {
            let mut state = self.state();
            let Some(operator) = state.operator.as_ref() else {
                return false;
            };
            if inbound.sender_id.as_str() == operator.id.as_str() {
                debug!("Ignoring echo of own message");
                return false;
            }

            let created_at = inbound.created_at.unwrap_or_else(Utc::now);
            let list_changed = state
                .conversations
                .iter_mut()
                .find(|c| match &inbound.order_id {
                    Some(order_id) => &c.order_id == order_id,
                    None => c.user_id.as_str() == inbound.sender_id.as_str(),
                })
                .map(|c| {
                    c.last_message = Some(inbound.message.clone());
                    c.last_message_at = Some(created_at);
                })
                .is_some();

            let for_selection = state.selection.as_ref().is_some_and(|s| {
                let same_order = inbound.order_id.as_ref().is_none_or(|o| o == &s.order_id);
                let other_customer = sender_type == Some(SenderType::User)
                    && inbound.sender_id.as_str() != s.user_id.as_str();
                same_order && !other_customer
            });
            let duplicate = inbound.id.as_ref().is_some_and(|id| {
                state
                    .transcript
                    .iter()
                    .any(|m| m.id.as_ref() == Some(id))
            });

            let appended = for_selection && !duplicate;
            if appended {
                state.transcript.push(Message {
                    id: inbound.id,
                    client_id: inbound.client_id,
                    role: sender_type.map_or(MessageRole::Admin, MessageRole::from),
                    sender_type,
                    sender_id: inbound.sender_id,
                    content: inbound.message,
                    created_at,
                    delivery: Delivery::Sent,
                });
            } else if duplicate {
                debug!("Ignoring duplicate realtime message");
            }
            (appended, list_changed)
        };

        if list_changed {
            self.emit(ChatEvent::ConversationsUpdated);
        }
        if appended {
            self.emit(ChatEvent::TranscriptUpdated);
        }
        appended
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn state(&self) -> MutexGuard<'_, ChatState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: ChatEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn notice(&self, notice: Notice) {
        self.emit(ChatEvent::Notice(notice));
    }
}

impl<B, R> std::fmt::Debug for ChatView<B, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatView").finish_non_exhaustive()
    }
}
