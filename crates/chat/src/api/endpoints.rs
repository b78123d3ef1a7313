//! REST endpoint table.
//!
//! Every path the chat view talks to is built here from the configured base
//! URL. Path segments and query values are percent-encoded by `url`.

use url::Url;

use pizzeria_core::{OperatorId, OrderId, UserId};

use super::ApiError;

const CONVERSATIONS_BY_OPERATOR: &str = "conversations-by-operator";
const CONVERSATION_MESSAGES: &str = "conversation-messages";
const CLOSE_CHAT: &str = "close-chat";

/// URL builder bound to one backend base URL.
#[derive(Debug, Clone)]
pub struct Endpoints {
    base: Url,
}

impl Endpoints {
    /// Create a table rooted at `base`.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::InvalidUrl` if the base URL cannot carry a path.
    pub fn new(base: Url) -> Result<Self, ApiError> {
        if base.cannot_be_a_base() {
            return Err(ApiError::InvalidUrl(base.to_string()));
        }
        Ok(Self { base })
    }

    /// The base URL.
    #[must_use]
    pub const fn base(&self) -> &Url {
        &self.base
    }

    /// `GET /conversations-by-operator/{operatorId}`
    ///
    /// # Errors
    ///
    /// Returns `ApiError::InvalidUrl` if the path cannot be built.
    pub fn conversations_by_operator(&self, operator: &OperatorId) -> Result<Url, ApiError> {
        self.path(&[CONVERSATIONS_BY_OPERATOR, operator.as_str()])
    }

    /// `GET /conversation-messages?userId&adminId&orderId`
    ///
    /// # Errors
    ///
    /// Returns `ApiError::InvalidUrl` if the path cannot be built.
    pub fn conversation_messages_query(
        &self,
        user: &UserId,
        operator: &OperatorId,
        order: &OrderId,
    ) -> Result<Url, ApiError> {
        let mut url = self.path(&[CONVERSATION_MESSAGES])?;
        url.query_pairs_mut()
            .append_pair("userId", user.as_str())
            .append_pair("adminId", operator.as_str())
            .append_pair("orderId", order.as_str());
        Ok(url)
    }

    /// `POST /conversation-messages`
    ///
    /// # Errors
    ///
    /// Returns `ApiError::InvalidUrl` if the path cannot be built.
    pub fn conversation_messages(&self) -> Result<Url, ApiError> {
        self.path(&[CONVERSATION_MESSAGES])
    }

    /// `POST /close-chat`
    ///
    /// # Errors
    ///
    /// Returns `ApiError::InvalidUrl` if the path cannot be built.
    pub fn close_chat(&self) -> Result<Url, ApiError> {
        self.path(&[CLOSE_CHAT])
    }

    fn path(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base.clone();
        url.set_query(None);
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|()| ApiError::InvalidUrl(self.base.to_string()))?;
            // Drop the trailing empty segment of "https://host/api/"
            path.pop_if_empty();
            path.extend(segments);
        }
        Ok(url)
    }
}
