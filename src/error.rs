//! Error types for the upstream fetchers, the webhook notifier, configuration
//! loading, and per-item processing.
//!
//! None of these escape a cycle. Fetch errors turn into "no items", notify
//! errors into `false`, and persistence errors are logged and swallowed at the
//! store boundary. Only [`ConfigError`] reaches `main`.

use thiserror::Error;

/// Failure of a single upstream request strategy.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network or TLS failure, or a non-2xx status.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API envelope carried a non-zero `code`.
    #[error("API error {code}: {message}")]
    Api { code: i64, message: String },

    /// The envelope was a success but lacked the expected nested list.
    #[error("unexpected response shape from {endpoint}: missing {field}")]
    MissingField {
        endpoint: &'static str,
        field: &'static str,
    },

    /// The body could not be decoded.
    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// The configured base URL could not be joined with an endpoint path.
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

/// Failure to deliver one webhook message.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// The webhook address itself is missing, a placeholder, or malformed.
    /// No request was sent.
    #[error("webhook URL not configured properly: {0}")]
    InvalidWebhook(String),

    /// Network failure or non-2xx status from the webhook endpoint.
    #[error("webhook request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The endpoint answered but refused the message.
    #[error("webhook rejected message (errcode {code}): {message}")]
    Rejected { code: i64, message: String },
}

impl NotifyError {
    /// True when the failure is on our side of the wire and retrying in
    /// another content mode would not help.
    pub fn is_local(&self) -> bool {
        matches!(self, NotifyError::InvalidWebhook(_))
    }
}

/// Startup configuration problems. These are the only errors that make the
/// process exit non-zero.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting: {0}")]
    Missing(&'static str),

    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// Why one item did not produce a delivered notice.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("notification for {id} was not delivered")]
    NotDelivered { id: String },
}
