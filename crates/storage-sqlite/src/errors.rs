//! Storage error bridging into the core error type.

use liftlog_core::errors::{DatabaseError, Error};
use thiserror::Error;

/// Errors raised inside the SQLite mirror. Repositories map diesel/r2d2
/// failures through this type with `.map_err(StorageError::from)?`, which
/// then converts into [`liftlog_core::Error`].
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database query failed: {0}")]
    Query(#[from] diesel::result::Error),

    #[error("Failed to get connection from pool: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Failed to open database connection: {0}")]
    Connection(#[from] diesel::ConnectionError),

    #[error("Database migration failed: {0}")]
    Migration(String),

    #[error("{0}")]
    Internal(String),

    /// A domain error passed through a write transaction unchanged.
    #[error(transparent)]
    Domain(Error),
}

impl From<StorageError> for Error {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::Domain(err) => err,
            StorageError::Query(diesel::result::Error::NotFound) => {
                Error::NotFound("Record".to_string())
            }
            StorageError::Query(err) => {
                Error::Database(DatabaseError::QueryFailed(err.to_string()))
            }
            StorageError::Pool(err) => {
                Error::Database(DatabaseError::Connection(err.to_string()))
            }
            StorageError::Connection(err) => {
                Error::Database(DatabaseError::Connection(err.to_string()))
            }
            StorageError::Migration(message) => {
                Error::Database(DatabaseError::Migration(message))
            }
            StorageError::Internal(message) => {
                Error::Database(DatabaseError::Internal(message))
            }
        }
    }
}
