//! SQLite repository for workout sessions.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;

use liftlog_core::errors::{Error, Result};
use liftlog_core::sessions::{SessionRepositoryTrait, WorkoutSession};
use liftlog_core::sync::{SyncEntity, SyncOperation};

use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::StorageError;
use crate::schema::workout_sessions;
use crate::sync::{write_outbox_item, OutboxWriteRequest};

use super::model::WorkoutSessionDB;

pub struct SessionRepository {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl SessionRepository {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }
}

#[async_trait]
impl SessionRepositoryTrait for SessionRepository {
    fn list_sessions(&self, user_id: &str) -> Result<Vec<WorkoutSession>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = workout_sessions::table
            .filter(workout_sessions::user_id.eq(user_id))
            .filter(workout_sessions::deleted_at.is_null())
            .order(workout_sessions::started_at.desc())
            .load::<WorkoutSessionDB>(&mut conn)
            .map_err(StorageError::from)?;
        Ok(rows.into_iter().map(WorkoutSession::from).collect())
    }

    fn get_session(&self, user_id: &str, session_id: &str) -> Result<WorkoutSession> {
        let mut conn = get_connection(&self.pool)?;
        let row = workout_sessions::table
            .filter(workout_sessions::id.eq(session_id))
            .filter(workout_sessions::user_id.eq(user_id))
            .filter(workout_sessions::deleted_at.is_null())
            .first::<WorkoutSessionDB>(&mut conn)
            .optional()
            .map_err(StorageError::from)?;
        Ok(row.ok_or_else(|| Error::not_found("Session"))?.into())
    }

    fn list_completed_sessions_for_instance(
        &self,
        user_id: &str,
        instance_id: &str,
    ) -> Result<Vec<WorkoutSession>> {
        let mut conn = get_connection(&self.pool)?;
        // Coarse text filter on the snapshot blob; exact binding is
        // verified on the deserialized snapshot below.
        let rows = workout_sessions::table
            .filter(workout_sessions::user_id.eq(user_id))
            .filter(workout_sessions::deleted_at.is_null())
            .filter(workout_sessions::ended_at.is_not_null())
            .filter(workout_sessions::snapshot.like(format!("%{instance_id}%")))
            .order(workout_sessions::ended_at.desc())
            .load::<WorkoutSessionDB>(&mut conn)
            .map_err(StorageError::from)?;

        Ok(rows
            .into_iter()
            .map(WorkoutSession::from)
            .filter(|session| !session.exercises_for_instance(instance_id).is_empty())
            .collect())
    }

    async fn insert_session(&self, session: WorkoutSession) -> Result<WorkoutSession> {
        let row = WorkoutSessionDB::from_domain(&session)?;
        self.writer
            .exec(move |conn| {
                let inserted = diesel::insert_into(workout_sessions::table)
                    .values(&row)
                    .returning(WorkoutSessionDB::as_returning())
                    .get_result::<WorkoutSessionDB>(conn)
                    .map_err(StorageError::from)?;

                write_outbox_item(
                    conn,
                    OutboxWriteRequest::new(
                        inserted.user_id.clone(),
                        SyncEntity::WorkoutSession,
                        SyncOperation::Create,
                        inserted.id.clone(),
                        Some(serde_json::to_value(&inserted).map_err(Error::from)?),
                    ),
                )?;
                Ok(inserted.into())
            })
            .await
    }

    async fn update_session(&self, session: WorkoutSession) -> Result<WorkoutSession> {
        let row = WorkoutSessionDB::from_domain(&session)?;
        self.writer
            .exec(move |conn| {
                let affected = diesel::update(
                    workout_sessions::table
                        .filter(workout_sessions::id.eq(&row.id))
                        .filter(workout_sessions::user_id.eq(&row.user_id))
                        .filter(workout_sessions::deleted_at.is_null()),
                )
                .set((
                    workout_sessions::title.eq(&row.title),
                    workout_sessions::template_id.eq(&row.template_id),
                    workout_sessions::started_at.eq(&row.started_at),
                    workout_sessions::ended_at.eq(&row.ended_at),
                    workout_sessions::tags.eq(&row.tags),
                    workout_sessions::snapshot.eq(&row.snapshot),
                    workout_sessions::updated_at.eq(&row.updated_at),
                ))
                .execute(conn)
                .map_err(StorageError::from)?;
                if affected == 0 {
                    return Err(Error::not_found("Session"));
                }

                let stored = workout_sessions::table
                    .find(&row.id)
                    .first::<WorkoutSessionDB>(conn)
                    .map_err(StorageError::from)?;
                write_outbox_item(
                    conn,
                    OutboxWriteRequest::new(
                        stored.user_id.clone(),
                        SyncEntity::WorkoutSession,
                        SyncOperation::Update,
                        stored.id.clone(),
                        Some(serde_json::to_value(&stored).map_err(Error::from)?),
                    ),
                )?;
                Ok(stored.into())
            })
            .await
    }

    async fn soft_delete_session(&self, user_id: &str, session_id: &str) -> Result<()> {
        let user_id = user_id.to_string();
        let session_id = session_id.to_string();
        self.writer
            .exec(move |conn| {
                let affected = diesel::update(
                    workout_sessions::table
                        .filter(workout_sessions::id.eq(&session_id))
                        .filter(workout_sessions::user_id.eq(&user_id))
                        .filter(workout_sessions::deleted_at.is_null()),
                )
                .set(workout_sessions::deleted_at.eq(Some(Utc::now().to_rfc3339())))
                .execute(conn)
                .map_err(StorageError::from)?;

                if affected > 0 {
                    write_outbox_item(
                        conn,
                        OutboxWriteRequest::new(
                            user_id.clone(),
                            SyncEntity::WorkoutSession,
                            SyncOperation::Delete,
                            session_id.clone(),
                            None,
                        ),
                    )?;
                }
                Ok(())
            })
            .await
    }
}
