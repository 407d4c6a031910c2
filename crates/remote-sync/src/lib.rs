//! Remote synchronization: outbox replay and incremental pull.
//!
//! The engine drains the local mirror's outbox against a [`RemoteStore`]
//! and pulls remote changes back through idempotent upserts, advancing a
//! per-entity checkpoint. The reqwest client is one `RemoteStore`
//! implementation; tests run the engine against in-memory fakes.

pub mod client;
pub mod engine;
pub mod error;
pub mod remote;

pub use client::RemoteApiClient;
pub use engine::{ReplayStats, SyncEngine};
pub use error::{RemoteSyncError, RetryClass};
pub use remote::RemoteStore;
