//! Conversation and message operations for the chat backend.

use tracing::{debug, instrument};

use pizzeria_core::{OperatorId, OrderId, UserId};

use super::{
    ApiClient, ApiError, ChatBackend, CloseChatRequest, ConversationRecord, Envelope,
    MessageRecord, SendMessageRequest,
};
use crate::models::Conversation;

impl ChatBackend for ApiClient {
    #[instrument(skip(self), fields(operator_id = %operator))]
    async fn list_conversations(
        &self,
        operator: &OperatorId,
    ) -> Result<Vec<Conversation>, ApiError> {
        let url = self.endpoints().conversations_by_operator(operator)?;
        let response: Envelope<Vec<ConversationRecord>> = self.get(url).await?;
        let conversations: Vec<Conversation> = response
            .into_inner()
            .into_iter()
            .map(Conversation::from)
            .collect();

        debug!(count = conversations.len(), "Conversations fetched");
        Ok(conversations)
    }

    #[instrument(skip(self), fields(user_id = %user, operator_id = %operator, order_id = %order))]
    async fn fetch_history(
        &self,
        user: &UserId,
        operator: &OperatorId,
        order: &OrderId,
    ) -> Result<Vec<MessageRecord>, ApiError> {
        let url = self
            .endpoints()
            .conversation_messages_query(user, operator, order)?;
        let response: Envelope<Vec<MessageRecord>> = self.get(url).await?;
        let records = response.into_inner();

        debug!(count = records.len(), "History fetched");
        Ok(records)
    }

    #[instrument(skip(self, request), fields(order_id = %request.order_id, receiver_id = %request.receiver_id))]
    async fn persist_message(
        &self,
        request: &SendMessageRequest,
    ) -> Result<MessageRecord, ApiError> {
        let url = self.endpoints().conversation_messages()?;
        let body = self.post(url, request).await?;

        // Only trust the reply if it echoes the body we sent; some deployments
        // answer `{"message": "Message sent"}` instead of the stored record.
        let echoed = serde_json::from_value::<Envelope<MessageRecord>>(body)
            .ok()
            .map(Envelope::into_inner)
            .filter(|record| record.message == request.message);

        let record = echoed.unwrap_or_else(|| {
            debug!("Write endpoint did not echo the message, using request body");
            request.to_record()
        });

        debug!(message_id = ?record.id, "Message persisted");
        Ok(record)
    }

    #[instrument(skip(self), fields(order_id = %order))]
    async fn close_chat(&self, order: &OrderId) -> Result<(), ApiError> {
        let url = self.endpoints().close_chat()?;
        let request = CloseChatRequest {
            order_id: order.clone(),
        };
        self.post(url, &request).await?;

        debug!("Conversation closed");
        Ok(())
    }
}
