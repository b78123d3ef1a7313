//! Operator identity resolution.
//!
//! The signed-in administrator is persisted as a small JSON document by the
//! login flow. The chat view only needs the identifier (and a display name for
//! the console), so resolution is forgiving: a missing or malformed document
//! degrades to "no operator" and only logs.

use std::path::Path;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use pizzeria_core::OperatorId;

/// Keys checked, in order, for the operator identifier.
const ID_KEYS: &[&str] = &["_id", "id", "adminId", "admin_id"];

/// Errors that can occur while reading the persisted identity.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The session file could not be read.
    #[error("cannot read session file: {0}")]
    Io(#[from] std::io::Error),

    /// The session file is not valid JSON.
    #[error("session file is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    /// The document has no usable identifier.
    #[error("session document has no operator id")]
    MissingId,
}

/// The signed-in administrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operator {
    /// Identifier used to scope conversations.
    pub id: OperatorId,
    /// Display name, when the document carries one.
    pub name: Option<String>,
}

impl Operator {
    /// Create an operator with only an id.
    #[must_use]
    pub fn new(id: impl Into<OperatorId>) -> Self {
        Self {
            id: id.into(),
            name: None,
        }
    }

    /// Label for console output.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or_else(|| self.id.as_str())
    }
}

/// Reads the persisted administrator document.
pub struct SessionResolver;

impl SessionResolver {
    /// Resolve the operator, logging and returning `None` on any failure.
    #[must_use]
    pub fn resolve(path: &Path) -> Option<Operator> {
        match Self::load(path) {
            Ok(operator) => {
                debug!(operator_id = %operator.id, "Operator identity resolved");
                Some(operator)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "No operator identity");
                None
            }
        }
    }

    /// Read and parse the session file.
    ///
    /// # Errors
    ///
    /// Returns `SessionError` if the file is unreadable, malformed, or has no id.
    pub fn load(path: &Path) -> Result<Operator, SessionError> {
        let raw = std::fs::read_to_string(path)?;
        Self::parse(&raw)
    }

    /// Parse a session document.
    ///
    /// The identifier is taken from the top level, or from a nested `user` /
    /// `admin` object as some login flows store the whole auth response.
    ///
    /// # Errors
    ///
    /// Returns `SessionError` if the JSON is malformed or has no id.
    pub fn parse(raw: &str) -> Result<Operator, SessionError> {
        let doc: Value = serde_json::from_str(raw)?;

        let candidates = [
            Some(&doc),
            doc.get("user"),
            doc.get("admin"),
            doc.get("data"),
        ];

        candidates
            .into_iter()
            .flatten()
            .find_map(operator_from)
            .ok_or(SessionError::MissingId)
    }
}

fn operator_from(value: &Value) -> Option<Operator> {
    let id = ID_KEYS.iter().find_map(|key| id_string(value.get(key)?))?;
    let name = ["name", "fullName", "email"]
        .iter()
        .find_map(|key| value.get(key)?.as_str())
        .filter(|s| !s.trim().is_empty())
        .map(str::to_owned);

    Some(Operator {
        id: OperatorId::new(id),
        name,
    })
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
