//! SQLite storage for the outbox queue and sync checkpoints.

mod model;
mod repository;

pub use model::{SyncQueueItemDB, SyncStateDB};
pub use repository::{write_outbox_item, OutboxWriteRequest, SyncRepository};
