//! Repository for the outbox queue and per-entity pull checkpoints.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use log::warn;
use uuid::Uuid;

use liftlog_core::errors::Result;
use liftlog_core::sync::{
    OutboxItem, RemoteChange, SyncEntity, SyncOperation, SyncRepositoryTrait,
};

use crate::db::{enum_from_db, enum_to_db, get_connection, DbPool, WriteHandle};
use crate::errors::StorageError;
use crate::methods::MethodInstanceDB;
use crate::schema::{method_instances, sync_queue, sync_state, workout_sessions, workout_templates};
use crate::sessions::WorkoutSessionDB;
use crate::templates::WorkoutTemplateDB;

use super::model::{SyncQueueItemDB, SyncStateDB};

/// A queued-mutation append, written in the same transaction as the
/// mutation it records.
#[derive(Debug, Clone)]
pub struct OutboxWriteRequest {
    pub user_id: String,
    pub entity: SyncEntity,
    pub op: SyncOperation,
    pub entity_id: String,
    /// Full serialized row; `None` for deletes.
    pub payload: Option<serde_json::Value>,
}

impl OutboxWriteRequest {
    pub fn new(
        user_id: impl Into<String>,
        entity: SyncEntity,
        op: SyncOperation,
        entity_id: impl Into<String>,
        payload: Option<serde_json::Value>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            entity,
            op,
            entity_id: entity_id.into(),
            payload,
        }
    }
}

/// Append an outbox item on the current (transactional) connection.
pub fn write_outbox_item(
    conn: &mut SqliteConnection,
    request: OutboxWriteRequest,
) -> Result<String> {
    // v7 ids are time-ordered, which keeps creation order stable even when
    // two items share a created_at timestamp.
    let item_id = Uuid::now_v7().to_string();
    let payload = request
        .payload
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(liftlog_core::Error::from)?;

    let row = SyncQueueItemDB {
        id: item_id.clone(),
        user_id: request.user_id,
        entity: enum_to_db(&request.entity)?,
        op: enum_to_db(&request.op)?,
        entity_id: request.entity_id,
        payload,
        created_at: Utc::now().to_rfc3339(),
        attempt_count: 0,
        next_retry_at: None,
        last_error: None,
    };

    diesel::insert_into(sync_queue::table)
        .values(&row)
        .execute(conn)
        .map_err(StorageError::from)?;

    Ok(item_id)
}

fn to_outbox_item(row: SyncQueueItemDB) -> Result<OutboxItem> {
    let payload = row
        .payload
        .as_deref()
        .map(serde_json::from_str)
        .transpose()
        .map_err(liftlog_core::Error::from)?;
    Ok(OutboxItem {
        id: row.id,
        user_id: row.user_id,
        entity: enum_from_db(&row.entity)?,
        op: enum_from_db(&row.op)?,
        entity_id: row.entity_id,
        payload,
        created_at: row.created_at,
        attempt_count: row.attempt_count,
        next_retry_at: row.next_retry_at,
        last_error: row.last_error,
    })
}

fn has_pending_outbox_tx(
    conn: &mut SqliteConnection,
    user_id: &str,
    entity_id: &str,
) -> Result<bool> {
    let pending: i64 = sync_queue::table
        .filter(sync_queue::user_id.eq(user_id))
        .filter(sync_queue::entity_id.eq(entity_id))
        .count()
        .get_result(conn)
        .map_err(StorageError::from)?;
    Ok(pending > 0)
}

pub struct SyncRepository {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl SyncRepository {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }
}

#[async_trait]
impl SyncRepositoryTrait for SyncRepository {
    fn list_pending_outbox(&self, user_id: &str) -> Result<Vec<OutboxItem>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = sync_queue::table
            .filter(sync_queue::user_id.eq(user_id))
            .order((sync_queue::created_at.asc(), sync_queue::id.asc()))
            .load::<SyncQueueItemDB>(&mut conn)
            .map_err(StorageError::from)?;

        rows.into_iter().map(to_outbox_item).collect()
    }

    async fn confirm_outbox_item(&self, item: &OutboxItem) -> Result<()> {
        let item_id = item.id.clone();
        let entity = item.entity;
        let entity_id = item.entity_id.clone();

        self.writer
            .exec(move |conn| {
                diesel::delete(sync_queue::table.find(&item_id))
                    .execute(conn)
                    .map_err(StorageError::from)?;

                // The entity row may be gone (hard-deleted remotely) — a
                // zero-row update is fine.
                let now = Utc::now().to_rfc3339();
                match entity {
                    SyncEntity::MethodInstance => {
                        diesel::update(method_instances::table.find(&entity_id))
                            .set(method_instances::last_synced_at.eq(Some(now)))
                            .execute(conn)
                            .map_err(StorageError::from)?;
                    }
                    SyncEntity::WorkoutSession => {
                        diesel::update(workout_sessions::table.find(&entity_id))
                            .set(workout_sessions::last_synced_at.eq(Some(now)))
                            .execute(conn)
                            .map_err(StorageError::from)?;
                    }
                    SyncEntity::WorkoutTemplate => {
                        diesel::update(workout_templates::table.find(&entity_id))
                            .set(workout_templates::last_synced_at.eq(Some(now)))
                            .execute(conn)
                            .map_err(StorageError::from)?;
                    }
                }
                Ok(())
            })
            .await
    }

    async fn record_outbox_failure(
        &self,
        item_id: &str,
        error: String,
        backoff_seconds: i64,
    ) -> Result<()> {
        let item_id = item_id.to_string();
        self.writer
            .exec(move |conn| {
                let row = sync_queue::table
                    .find(&item_id)
                    .first::<SyncQueueItemDB>(conn)
                    .optional()
                    .map_err(StorageError::from)?;
                let Some(row) = row else {
                    return Ok(());
                };

                let retry_at = (Utc::now() + Duration::seconds(backoff_seconds)).to_rfc3339();
                diesel::update(sync_queue::table.find(&row.id))
                    .set((
                        sync_queue::attempt_count.eq(row.attempt_count + 1),
                        sync_queue::next_retry_at.eq(Some(retry_at)),
                        sync_queue::last_error.eq(Some(error)),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    fn has_pending_outbox(&self, user_id: &str, entity_id: &str) -> Result<bool> {
        let mut conn = get_connection(&self.pool)?;
        has_pending_outbox_tx(&mut conn, user_id, entity_id)
    }

    fn get_checkpoint(&self, user_id: &str, entity: SyncEntity) -> Result<Option<String>> {
        let mut conn = get_connection(&self.pool)?;
        let row = sync_state::table
            .find((user_id, enum_to_db(&entity)?))
            .first::<SyncStateDB>(&mut conn)
            .optional()
            .map_err(StorageError::from)?;
        Ok(row.map(|r| r.last_pulled_at))
    }

    async fn set_checkpoint(
        &self,
        user_id: &str,
        entity: SyncEntity,
        last_pulled_at: String,
    ) -> Result<()> {
        let user_id = user_id.to_string();
        self.writer
            .exec(move |conn| {
                let row = SyncStateDB {
                    user_id,
                    entity: enum_to_db(&entity)?,
                    last_pulled_at: last_pulled_at.clone(),
                };
                diesel::insert_into(sync_state::table)
                    .values(&row)
                    .on_conflict((sync_state::user_id, sync_state::entity))
                    .do_update()
                    .set(sync_state::last_pulled_at.eq(last_pulled_at))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    async fn apply_remote_change(
        &self,
        user_id: &str,
        entity: SyncEntity,
        change: RemoteChange,
    ) -> Result<bool> {
        let user_id = user_id.to_string();
        self.writer
            .exec(move |conn| {
                // Pending local mutations win until the next successful
                // replay; skip the remote row for now.
                if has_pending_outbox_tx(conn, &user_id, &change.entity_id)? {
                    return Ok(false);
                }

                match entity {
                    SyncEntity::MethodInstance => {
                        let mut row: MethodInstanceDB =
                            serde_json::from_value(change.payload.clone())
                                .map_err(liftlog_core::Error::from)?;
                        if row.user_id != user_id {
                            warn!(
                                "Skipping pulled method instance {} owned by another user",
                                row.id
                            );
                            return Ok(false);
                        }
                        row.last_synced_at = Some(change.updated_at.clone());
                        diesel::insert_into(method_instances::table)
                            .values(&row)
                            .on_conflict(method_instances::id)
                            .do_update()
                            .set(&row)
                            .execute(conn)
                            .map_err(StorageError::from)?;
                    }
                    SyncEntity::WorkoutSession => {
                        let mut row: WorkoutSessionDB =
                            serde_json::from_value(change.payload.clone())
                                .map_err(liftlog_core::Error::from)?;
                        if row.user_id != user_id {
                            warn!("Skipping pulled session {} owned by another user", row.id);
                            return Ok(false);
                        }
                        row.last_synced_at = Some(change.updated_at.clone());
                        diesel::insert_into(workout_sessions::table)
                            .values(&row)
                            .on_conflict(workout_sessions::id)
                            .do_update()
                            .set(&row)
                            .execute(conn)
                            .map_err(StorageError::from)?;
                    }
                    SyncEntity::WorkoutTemplate => {
                        let mut row: WorkoutTemplateDB =
                            serde_json::from_value(change.payload.clone())
                                .map_err(liftlog_core::Error::from)?;
                        if row.user_id != user_id {
                            warn!("Skipping pulled template {} owned by another user", row.id);
                            return Ok(false);
                        }
                        row.last_synced_at = Some(change.updated_at.clone());
                        diesel::insert_into(workout_templates::table)
                            .values(&row)
                            .on_conflict(workout_templates::id)
                            .do_update()
                            .set(&row)
                            .execute(conn)
                            .map_err(StorageError::from)?;
                    }
                }
                Ok(true)
            })
            .await
    }
}
