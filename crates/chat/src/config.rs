//! Chat client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `PIZZERIA_API_BASE_URL` - Backend base URL every REST path is built from
//!
//! ## Optional
//! - `PIZZERIA_REALTIME_URL` - Socket.IO WebSocket URL (default: derived from
//!   the base URL, `ws(s)://<host>/socket.io/?EIO=4&transport=websocket`)
//! - `PIZZERIA_API_TOKEN` - Bearer token sent with every REST request
//! - `PIZZERIA_SESSION_FILE` - Persisted administrator JSON
//!   (default: `$HOME/.pizzeria/admin.json`)
//! - `PIZZERIA_REQUEST_TIMEOUT_SECS` - REST request timeout (default: 30)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//! - `SENTRY_SAMPLE_RATE` - Sentry error sample rate (default: 1.0)

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use url::Url;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_SESSION_FILE: &str = ".pizzeria/admin.json";
const SOCKET_IO_PATH: &str = "/socket.io/";
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "xxx",
    "todo",
    "insert",
    "put-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Chat client configuration.
#[derive(Clone)]
pub struct ChatConfig {
    /// Backend base URL (REST paths are joined onto it)
    pub api_base_url: Url,
    /// Socket.IO WebSocket endpoint
    pub realtime_url: Url,
    /// Optional bearer token for the REST backend
    pub api_token: Option<SecretString>,
    /// Where the signed-in administrator is persisted
    pub session_file: PathBuf,
    /// Per-request timeout for REST calls
    pub request_timeout: Duration,
    /// Sentry configuration (optional)
    pub sentry: Option<SentryConfig>,
}

impl std::fmt::Debug for ChatConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatConfig")
            .field("api_base_url", &self.api_base_url.as_str())
            .field("realtime_url", &self.realtime_url.as_str())
            .field(
                "api_token",
                &self.api_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("session_file", &self.session_file)
            .field("request_timeout", &self.request_timeout)
            .field("sentry", &self.sentry)
            .finish()
    }
}

/// Sentry error tracking configuration.
#[derive(Debug, Clone)]
pub struct SentryConfig {
    /// Sentry DSN
    pub dsn: String,
    /// Environment (e.g., "development", "production")
    pub environment: Option<String>,
    /// Error sample rate (0.0 to 1.0)
    pub sample_rate: f32,
}

impl ChatConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an explicit key/value map.
    ///
    /// # Errors
    ///
    /// Same as [`ChatConfig::from_env`].
    pub fn from_map(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        Self::from_lookup(|key| vars.get(key).cloned())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let raw_base = lookup("PIZZERIA_API_BASE_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("PIZZERIA_API_BASE_URL".to_string()))?;
        let api_base_url = parse_http_url("PIZZERIA_API_BASE_URL", &raw_base)?;

        let realtime_url = match lookup("PIZZERIA_REALTIME_URL") {
            Some(raw) => Url::parse(&raw).map_err(|e| {
                ConfigError::InvalidEnvVar("PIZZERIA_REALTIME_URL".to_string(), e.to_string())
            })?,
            None => derive_realtime_url(&api_base_url)?,
        };

        let api_token = lookup("PIZZERIA_API_TOKEN").map(SecretString::from);

        let session_file = lookup("PIZZERIA_SESSION_FILE").map_or_else(
            || {
                lookup("HOME")
                    .map_or_else(PathBuf::new, PathBuf::from)
                    .join(DEFAULT_SESSION_FILE)
            },
            PathBuf::from,
        );

        let timeout_secs = match lookup("PIZZERIA_REQUEST_TIMEOUT_SECS") {
            Some(raw) => raw.parse::<u64>().map_err(|e| {
                ConfigError::InvalidEnvVar(
                    "PIZZERIA_REQUEST_TIMEOUT_SECS".to_string(),
                    e.to_string(),
                )
            })?,
            None => DEFAULT_TIMEOUT_SECS,
        };

        let sentry = lookup("SENTRY_DSN").map(|dsn| SentryConfig {
            dsn,
            environment: lookup("SENTRY_ENVIRONMENT"),
            sample_rate: lookup("SENTRY_SAMPLE_RATE")
                .and_then(|s| s.parse().ok())
                .unwrap_or(1.0),
        });

        Ok(Self {
            api_base_url,
            realtime_url,
            api_token,
            session_file,
            request_timeout: Duration::from_secs(timeout_secs),
            sentry,
        })
    }

    /// Non-fatal problems with the loaded configuration.
    ///
    /// Configuration is read before the tracing subscriber exists, so these
    /// are returned for the caller to log once it does.
    #[must_use]
    pub fn warnings(&self) -> Vec<ConfigError> {
        self.api_token()
            .and_then(|token| validate_secret_strength(token, "PIZZERIA_API_TOKEN").err())
            .into_iter()
            .collect()
    }

    /// Returns the bearer token, if configured.
    #[must_use]
    pub fn api_token(&self) -> Option<&str> {
        self.api_token.as_ref().map(ExposeSecret::expose_secret)
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Parse a URL and require an http(s) scheme.
fn parse_http_url(key: &str, raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw)
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("unsupported scheme '{other}', expected http or https"),
        )),
    }
}

/// Build the default Socket.IO endpoint from the REST base URL.
fn derive_realtime_url(base: &Url) -> Result<Url, ConfigError> {
    let mut url = base.clone();
    let scheme = if base.scheme() == "https" { "wss" } else { "ws" };
    url.set_scheme(scheme).map_err(|()| {
        ConfigError::InvalidEnvVar(
            "PIZZERIA_API_BASE_URL".to_string(),
            "cannot derive a WebSocket URL".to_string(),
        )
    })?;
    url.set_path(SOCKET_IO_PATH);
    url.set_query(Some("EIO=4&transport=websocket"));
    Ok(url)
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.chars().count() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)]
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1})"
            ),
        ));
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_missing_base_url() {
        let err = ChatConfig::from_map(&HashMap::new()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref k) if k == "PIZZERIA_API_BASE_URL"));
    }

    #[test]
    fn test_rejects_non_http_base_url() {
        let err = ChatConfig::from_map(&vars(&[("PIZZERIA_API_BASE_URL", "ftp://x.test")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar(_, _)));
    }

    #[test]
    fn test_defaults() {
        let config = ChatConfig::from_map(&vars(&[
            ("PIZZERIA_API_BASE_URL", "https://api.pizzeria.test/v1/"),
            ("HOME", "/home/ops"),
        ]))
        .unwrap();

        assert_eq!(
            config.realtime_url.as_str(),
            "wss://api.pizzeria.test/socket.io/?EIO=4&transport=websocket"
        );
        assert_eq!(
            config.session_file,
            PathBuf::from("/home/ops/.pizzeria/admin.json")
        );
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert!(config.api_token.is_none());
        assert!(config.sentry.is_none());
    }

    #[test]
    fn test_plain_http_derives_ws() {
        let config = ChatConfig::from_map(&vars(&[(
            "PIZZERIA_API_BASE_URL",
            "http://localhost:8080",
        )]))
        .unwrap();
        assert_eq!(config.realtime_url.scheme(), "ws");
        assert_eq!(config.realtime_url.port(), Some(8080));
    }

    #[test]
    fn test_explicit_overrides() {
        let config = ChatConfig::from_map(&vars(&[
            ("PIZZERIA_API_BASE_URL", "http://localhost:8080"),
            ("PIZZERIA_REALTIME_URL", "ws://localhost:9000/socket.io/?EIO=4&transport=websocket"),
            ("PIZZERIA_SESSION_FILE", "/tmp/admin.json"),
            ("PIZZERIA_REQUEST_TIMEOUT_SECS", "5"),
            ("SENTRY_DSN", "https://key@sentry.test/1"),
            ("SENTRY_SAMPLE_RATE", "0.25"),
        ]))
        .unwrap();

        assert_eq!(config.realtime_url.port(), Some(9000));
        assert_eq!(config.session_file, PathBuf::from("/tmp/admin.json"));
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        let sentry = config.sentry.unwrap();
        assert!((sentry.sample_rate - 0.25).abs() < f32::EPSILON);
    }

    #[test]
    fn test_invalid_timeout() {
        let err = ChatConfig::from_map(&vars(&[
            ("PIZZERIA_API_BASE_URL", "http://localhost:8080"),
            ("PIZZERIA_REQUEST_TIMEOUT_SECS", "soon"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar(ref k, _) if k == "PIZZERIA_REQUEST_TIMEOUT_SECS"));
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = ChatConfig::from_map(&vars(&[
            ("PIZZERIA_API_BASE_URL", "http://localhost:8080"),
            ("PIZZERIA_API_TOKEN", "tok_9fQ2xLm4Zr8pV1sK"),
        ]))
        .unwrap();

        let debug_output = format!("{config:?}");
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("tok_9fQ2xLm4Zr8pV1sK"));
        assert_eq!(config.api_token(), Some("tok_9fQ2xLm4Zr8pV1sK"));
    }

    #[test]
    fn test_validate_secret_strength() {
        assert!(validate_secret_strength("your-token-here", "T").is_err());
        assert!(validate_secret_strength("aaaaaaaaaaaaaaaa", "T").is_err());
        assert!(validate_secret_strength("aB3$xY9!mK2@nL5#pQ7&", "T").is_ok());
    }

    #[test]
    fn test_weak_token_is_reported_as_warning() {
        let weak = ChatConfig::from_map(&vars(&[
            ("PIZZERIA_API_BASE_URL", "http://localhost:8080"),
            ("PIZZERIA_API_TOKEN", "changeme"),
        ]))
        .unwrap();
        let warnings = weak.warnings();
        assert_eq!(warnings.len(), 1);
        assert!(matches!(warnings[0], ConfigError::InsecureSecret(ref k, _) if k == "PIZZERIA_API_TOKEN"));
        // Still usable: the token is sent as configured.
        assert_eq!(weak.api_token(), Some("changeme"));

        let strong = ChatConfig::from_map(&vars(&[
            ("PIZZERIA_API_BASE_URL", "http://localhost:8080"),
            ("PIZZERIA_API_TOKEN", "tok_9fQ2xLm4Zr8pV1sK"),
        ]))
        .unwrap();
        assert!(strong.warnings().is_empty());

        let none = ChatConfig::from_map(&vars(&[("PIZZERIA_API_BASE_URL", "http://localhost:8080")]))
            .unwrap();
        assert!(none.warnings().is_empty());
    }

    #[test]
    fn test_shannon_entropy_empty() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
    }
}
