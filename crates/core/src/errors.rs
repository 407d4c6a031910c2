//! Error types shared across the liftlog crates.

use thiserror::Error;

/// Result type alias used throughout the core and storage crates.
pub type Result<T> = std::result::Result<T, Error>;

/// Database-level failure categories surfaced by the storage layer.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Failed to get database connection: {0}")]
    Connection(String),

    #[error("Database query failed: {0}")]
    QueryFailed(String),

    #[error("Database migration failed: {0}")]
    Migration(String),

    #[error("Database error: {0}")]
    Internal(String),
}

/// Errors that can occur in core services and their storage backends.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Database(#[from] DatabaseError),

    /// No authenticated user is available for a mutation.
    #[error("Not signed in")]
    Unauthenticated,

    #[error("{0} not found")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Remote store failure propagated to a foreground caller.
    #[error("Remote call failed: {0}")]
    Remote(String),
}

impl Error {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}
