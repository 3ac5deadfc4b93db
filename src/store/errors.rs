use thiserror::Error;

/// Typed error enum for progress store operations
///
/// Callers never see these as panics; every store entry point returns them as values so
/// playback can continue while the next checkpoint retries naturally.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProgressStoreError {
    /// Username or session id was absent; nothing was sent
    #[error("Missing progress key: {0}")]
    MissingKeys(&'static str),

    /// Authentication failed (401, 403)
    #[error("Authentication failed: {message} (status: {status})")]
    Authentication { status: u16, message: String },

    /// Rate limiting error (429)
    #[error("Rate limited: {message} (retry after: {retry_after:?}s)")]
    RateLimit {
        message: String,
        retry_after: Option<u64>,
    },

    /// Server error (500+)
    #[error("Server error: {message} (status: {status})")]
    Server { status: u16, message: String },

    /// Client error (400-499, excluding auth and rate limit)
    #[error("Client error: {message} (status: {status})")]
    Client { status: u16, message: String },

    /// Network/connection errors (timeout, connection refused, etc.)
    #[error("Network error: {0}")]
    Network(String),

    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// The in-flight task was dropped before it reported back
    #[error("Save cancelled")]
    Cancelled,

    #[error("Store error: {0}")]
    Other(String),
}

impl ProgressStoreError {
    /// Check if this error is transient and should be retried
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProgressStoreError::Network(_)
                | ProgressStoreError::Server { .. }
                | ProgressStoreError::RateLimit { .. }
        )
    }

    pub fn retry_after(&self) -> Option<u64> {
        match self {
            ProgressStoreError::RateLimit { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    pub fn from_reqwest(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            ProgressStoreError::Network(format!("Request timeout: {}", error))
        } else if error.is_connect() {
            ProgressStoreError::Network(format!("Connection failed: {}", error))
        } else if error.is_request() {
            ProgressStoreError::Network(format!("Request error: {}", error))
        } else if error.is_decode() {
            ProgressStoreError::Parse(error.to_string())
        } else {
            ProgressStoreError::Other(error.to_string())
        }
    }

    pub fn from_status(status: u16, body: String, retry_after: Option<u64>) -> Self {
        match status {
            401 | 403 => ProgressStoreError::Authentication {
                status,
                message: body,
            },
            429 => ProgressStoreError::RateLimit {
                message: body,
                retry_after,
            },
            400..=499 => ProgressStoreError::Client {
                status,
                message: body,
            },
            500..=599 => ProgressStoreError::Server {
                status,
                message: body,
            },
            _ => ProgressStoreError::Other(format!("HTTP {}: {}", status, body)),
        }
    }
}
