//! Local mirror store: embedded SQLite via diesel.
//!
//! Every mutation goes through a serialized writer actor and appends its
//! outbox item in the same transaction; reads come from an r2d2 pool. Rows
//! carry soft-delete and last-synced-at metadata and are scoped by user.

pub mod db;
pub mod errors;
pub mod methods;
pub mod schema;
pub mod sessions;
pub mod sync;
pub mod templates;

pub use db::{create_pool, get_connection, run_migrations, DbPool, WriteHandle};
pub use errors::StorageError;

#[cfg(test)]
mod tests;
