//! REST client for the chat backend.
//!
//! Provides access to the four endpoints the operator chat needs:
//!
//! - `GET  /conversations-by-operator/{operatorId}` - conversation list
//! - `GET  /conversation-messages?userId&adminId&orderId` - message history
//! - `POST /conversation-messages` - persist an outbound message
//! - `POST /close-chat` - close a conversation
//!
//! The view talks to these through the [`ChatBackend`] trait so it can be
//! driven by an in-memory backend in tests.

mod chat;
mod endpoints;
mod types;

pub use endpoints::Endpoints;
pub use types::*;
pub(crate) use types::{canonical_fields, lenient_client_id, lenient_timestamp};

use std::future::Future;
use std::sync::Arc;

use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use thiserror::Error;

use pizzeria_core::{OperatorId, OrderId, UserId};

use crate::config::ChatConfig;
use crate::models::Conversation;

/// Longest error body kept in `ApiError::Api`.
const MAX_ERROR_BODY: usize = 512;

/// Errors that can occur when talking to the chat backend.
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP request failed (connection, timeout, TLS).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend returned a non-success status.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Unauthorized (missing or rejected token).
    #[error("Unauthorized")]
    Unauthorized,

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Failed to parse response.
    #[error("Parse error: {0}")]
    Parse(String),

    /// A URL could not be built from the configured base.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

/// The REST operations the chat view depends on.
pub trait ChatBackend: Send + Sync {
    /// Conversations visible to `operator`, in backend order.
    fn list_conversations(
        &self,
        operator: &OperatorId,
    ) -> impl Future<Output = Result<Vec<Conversation>, ApiError>> + Send;

    /// Ordered message history for one (user, operator, order) triple.
    fn fetch_history(
        &self,
        user: &UserId,
        operator: &OperatorId,
        order: &OrderId,
    ) -> impl Future<Output = Result<Vec<MessageRecord>, ApiError>> + Send;

    /// Persist an outbound message and return the stored record.
    fn persist_message(
        &self,
        request: &SendMessageRequest,
    ) -> impl Future<Output = Result<MessageRecord, ApiError>> + Send;

    /// Mark the conversation for `order` closed.
    fn close_chat(&self, order: &OrderId) -> impl Future<Output = Result<(), ApiError>> + Send;
}

impl<T: ChatBackend> ChatBackend for Arc<T> {
    fn list_conversations(
        &self,
        operator: &OperatorId,
    ) -> impl Future<Output = Result<Vec<Conversation>, ApiError>> + Send {
        (**self).list_conversations(operator)
    }

    fn fetch_history(
        &self,
        user: &UserId,
        operator: &OperatorId,
        order: &OrderId,
    ) -> impl Future<Output = Result<Vec<MessageRecord>, ApiError>> + Send {
        (**self).fetch_history(user, operator, order)
    }

    fn persist_message(
        &self,
        request: &SendMessageRequest,
    ) -> impl Future<Output = Result<MessageRecord, ApiError>> + Send {
        (**self).persist_message(request)
    }

    fn close_chat(&self, order: &OrderId) -> impl Future<Output = Result<(), ApiError>> + Send {
        (**self).close_chat(order)
    }
}

/// Chat backend REST client.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ApiClientInner>,
}

struct ApiClientInner {
    client: reqwest::Client,
    endpoints: Endpoints,
}

impl ApiClient {
    /// Create a new client from configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the token is not a valid header value or the HTTP
    /// client fails to build.
    pub fn new(config: &ChatConfig) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        if let Some(token) = &config.api_token {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))
                .map_err(|e| ApiError::Parse(format!("Invalid API token format: {e}")))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            inner: Arc::new(ApiClientInner {
                client,
                endpoints: Endpoints::new(config.api_base_url.clone())?,
            }),
        })
    }

    /// The endpoint table this client uses.
    #[must_use]
    pub fn endpoints(&self) -> &Endpoints {
        &self.inner.endpoints
    }

    /// Execute a GET request and parse the JSON body.
    pub(crate) async fn get<T: serde::de::DeserializeOwned>(
        &self,
        url: url::Url,
    ) -> Result<T, ApiError> {
        let response = self.inner.client.get(url).send().await?;
        Self::handle_response(response).await
    }

    /// Execute a POST request with a JSON body and return the raw JSON reply.
    pub(crate) async fn post<B: serde::Serialize + Sync>(
        &self,
        url: url::Url,
        body: &B,
    ) -> Result<serde_json::Value, ApiError> {
        let response = self.inner.client.post(url).json(body).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::parse_error(response).await);
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Ok(serde_json::Value::Null);
        }
        // Some write endpoints answer with plain text; treat that as no body.
        Ok(serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null))
    }

    /// Handle API response and parse JSON.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let status = response.status();

        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| ApiError::Parse(format!("Failed to parse response: {e}")));
        }

        Err(Self::parse_error(response).await)
    }

    /// Map an error response onto `ApiError`.
    async fn parse_error(response: reqwest::Response) -> ApiError {
        let status = response.status().as_u16();

        if status == 401 || status == 403 {
            return ApiError::Unauthorized;
        }

        if status == 404 {
            return ApiError::NotFound(response.url().path().to_string());
        }

        let mut message = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        if message.len() > MAX_ERROR_BODY {
            let cut = (0..=MAX_ERROR_BODY)
                .rev()
                .find(|&i| message.is_char_boundary(i))
                .unwrap_or(0);
            message.truncate(cut);
        }

        ApiError::Api { status, message }
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.inner.endpoints.base().as_str())
            .finish_non_exhaustive()
    }
}
