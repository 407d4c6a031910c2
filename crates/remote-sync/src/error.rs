//! Error types for the remote sync crate.

use thiserror::Error;

/// Result type alias for remote sync operations.
pub type Result<T> = std::result::Result<T, RemoteSyncError>;

/// Retry policy class for remote failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    Retryable,
    Permanent,
    ReauthRequired,
}

/// Errors that can occur talking to the remote store.
#[derive(Debug, Error)]
pub enum RemoteSyncError {
    /// HTTP client error (connect failure, timeout, ...)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error response from the remote store
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Invalid request (missing required data, etc.)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Authentication error (missing or invalid token)
    #[error("Authentication error: {0}")]
    Auth(String),
}

impl RemoteSyncError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth(message.into())
    }

    /// HTTP status if this is an API error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Classify for retry policy. A timeout is just another retryable
    /// failure; the queued item stays put either way.
    pub fn retry_class(&self) -> RetryClass {
        match self {
            Self::Api { status, .. } => match *status {
                401 | 403 => RetryClass::ReauthRequired,
                408 | 409 | 423 | 425 | 429 => RetryClass::Retryable,
                500..=599 => RetryClass::Retryable,
                _ => RetryClass::Permanent,
            },
            Self::Http(_) => RetryClass::Retryable,
            Self::Json(_) => RetryClass::Permanent,
            Self::InvalidRequest(_) => RetryClass::Permanent,
            Self::Auth(_) => RetryClass::ReauthRequired,
        }
    }
}
