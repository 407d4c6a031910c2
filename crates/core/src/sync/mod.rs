//! Offline sync domain model: outbox items, pull checkpoints, retry policy.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::Result;

/// Entity kinds that participate in local/remote sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncEntity {
    MethodInstance,
    WorkoutSession,
    WorkoutTemplate,
}

impl SyncEntity {
    /// All syncable entity kinds, in pull order.
    pub const ALL: [SyncEntity; 3] = [
        SyncEntity::MethodInstance,
        SyncEntity::WorkoutTemplate,
        SyncEntity::WorkoutSession,
    ];
}

/// Supported sync operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOperation {
    Create,
    Update,
    Delete,
}

/// A queued local mutation awaiting remote replay.
///
/// Items are replayed in creation order per user. An item is removed only
/// after confirmed remote success; a failed attempt increments
/// `attempt_count` and records the error, but the item stays queued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboxItem {
    pub id: String,
    pub user_id: String,
    pub entity: SyncEntity,
    pub op: SyncOperation,
    pub entity_id: String,
    /// Serialized entity row; `None` for deletes.
    pub payload: Option<serde_json::Value>,
    pub created_at: String,
    pub attempt_count: i32,
    pub next_retry_at: Option<String>,
    pub last_error: Option<String>,
}

/// Per (user, entity kind) incremental pull checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncCheckpoint {
    pub user_id: String,
    pub entity: SyncEntity,
    pub last_pulled_at: String,
}

/// One remote row fetched by an incremental pull.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteChange {
    pub entity_id: String,
    pub updated_at: String,
    pub payload: serde_json::Value,
}

/// Metrics for one sync cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncCycleMetrics {
    pub pushed_count: usize,
    pub pulled_count: usize,
    pub duration_ms: i64,
    pub status: String,
}

/// Exponential backoff in seconds with cap.
pub fn backoff_seconds(attempt_count: i32) -> i64 {
    const MAX_EXPONENT: i32 = 8;
    const BASE_DELAY_SECONDS: i64 = 5;

    let capped = i64::from(attempt_count.clamp(0, MAX_EXPONENT));
    2_i64.pow(capped as u32) * BASE_DELAY_SECONDS
}

/// Storage contract consumed by the sync engine.
///
/// Implemented by the local mirror; the engine itself never touches SQL.
#[async_trait]
pub trait SyncRepositoryTrait: Send + Sync {
    /// Pending outbox items for a user, in creation order.
    fn list_pending_outbox(&self, user_id: &str) -> Result<Vec<OutboxItem>>;

    /// Remove a confirmed item and stamp the entity row's `last_synced_at`.
    async fn confirm_outbox_item(&self, item: &OutboxItem) -> Result<()>;

    /// Record a failed replay attempt and schedule the next retry.
    async fn record_outbox_failure(
        &self,
        item_id: &str,
        error: String,
        backoff_seconds: i64,
    ) -> Result<()>;

    /// True when the entity id still has queued local mutations.
    fn has_pending_outbox(&self, user_id: &str, entity_id: &str) -> Result<bool>;

    fn get_checkpoint(&self, user_id: &str, entity: SyncEntity) -> Result<Option<String>>;

    async fn set_checkpoint(
        &self,
        user_id: &str,
        entity: SyncEntity,
        last_pulled_at: String,
    ) -> Result<()>;

    /// Idempotent upsert of a pulled remote row into the local mirror.
    ///
    /// Returns false when the row was skipped because a pending outbox item
    /// still exists for the same entity id (last local write wins until the
    /// next successful replay).
    async fn apply_remote_change(
        &self,
        user_id: &str,
        entity: SyncEntity,
        change: RemoteChange,
    ) -> Result<bool>;
}
