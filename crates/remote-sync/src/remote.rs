//! Contract for the remote relational store.

use async_trait::async_trait;

use liftlog_core::sync::{RemoteChange, SyncEntity};

use crate::error::Result;

/// Request/response access to the remote store.
///
/// Upserts and deletes must be idempotent on the remote side: replaying the
/// same queued mutation after an ambiguous failure (e.g. a timeout whose
/// request actually landed) must leave the entity in the same final state.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn upsert(
        &self,
        entity: SyncEntity,
        entity_id: &str,
        payload: &serde_json::Value,
    ) -> Result<()>;

    async fn delete(&self, entity: SyncEntity, entity_id: &str) -> Result<()>;

    /// Rows for (user, entity) with `updated_at` strictly newer than
    /// `since`; `None` fetches everything.
    async fn pull_since(
        &self,
        user_id: &str,
        entity: SyncEntity,
        since: Option<&str>,
    ) -> Result<Vec<RemoteChange>>;
}
