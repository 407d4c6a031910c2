//! SQLite repository for workout templates.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;

use liftlog_core::errors::{Error, Result};
use liftlog_core::sync::{SyncEntity, SyncOperation};
use liftlog_core::templates::{TemplateRepositoryTrait, WorkoutTemplate};

use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::StorageError;
use crate::schema::workout_templates;
use crate::sync::{write_outbox_item, OutboxWriteRequest};

use super::model::WorkoutTemplateDB;

pub struct TemplateRepository {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl TemplateRepository {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }
}

#[async_trait]
impl TemplateRepositoryTrait for TemplateRepository {
    fn list_templates(&self, user_id: &str) -> Result<Vec<WorkoutTemplate>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = workout_templates::table
            .filter(workout_templates::user_id.eq(user_id))
            .filter(workout_templates::deleted_at.is_null())
            .order(workout_templates::name.asc())
            .load::<WorkoutTemplateDB>(&mut conn)
            .map_err(StorageError::from)?;
        Ok(rows.into_iter().map(WorkoutTemplate::from).collect())
    }

    fn get_template(&self, user_id: &str, template_id: &str) -> Result<WorkoutTemplate> {
        let mut conn = get_connection(&self.pool)?;
        let row = workout_templates::table
            .filter(workout_templates::id.eq(template_id))
            .filter(workout_templates::user_id.eq(user_id))
            .filter(workout_templates::deleted_at.is_null())
            .first::<WorkoutTemplateDB>(&mut conn)
            .optional()
            .map_err(StorageError::from)?;
        Ok(row.ok_or_else(|| Error::not_found("Template"))?.into())
    }

    async fn insert_template(&self, template: WorkoutTemplate) -> Result<WorkoutTemplate> {
        let row = WorkoutTemplateDB::from_domain(&template)?;
        self.writer
            .exec(move |conn| {
                let inserted = diesel::insert_into(workout_templates::table)
                    .values(&row)
                    .returning(WorkoutTemplateDB::as_returning())
                    .get_result::<WorkoutTemplateDB>(conn)
                    .map_err(StorageError::from)?;

                write_outbox_item(
                    conn,
                    OutboxWriteRequest::new(
                        inserted.user_id.clone(),
                        SyncEntity::WorkoutTemplate,
                        SyncOperation::Create,
                        inserted.id.clone(),
                        Some(serde_json::to_value(&inserted).map_err(Error::from)?),
                    ),
                )?;
                Ok(inserted.into())
            })
            .await
    }

    async fn update_template(&self, template: WorkoutTemplate) -> Result<WorkoutTemplate> {
        let row = WorkoutTemplateDB::from_domain(&template)?;
        self.writer
            .exec(move |conn| {
                let affected = diesel::update(
                    workout_templates::table
                        .filter(workout_templates::id.eq(&row.id))
                        .filter(workout_templates::user_id.eq(&row.user_id))
                        .filter(workout_templates::deleted_at.is_null()),
                )
                .set((
                    workout_templates::name.eq(&row.name),
                    workout_templates::items.eq(&row.items),
                    workout_templates::tags.eq(&row.tags),
                    workout_templates::updated_at.eq(&row.updated_at),
                ))
                .execute(conn)
                .map_err(StorageError::from)?;
                if affected == 0 {
                    return Err(Error::not_found("Template"));
                }

                let stored = workout_templates::table
                    .find(&row.id)
                    .first::<WorkoutTemplateDB>(conn)
                    .map_err(StorageError::from)?;
                write_outbox_item(
                    conn,
                    OutboxWriteRequest::new(
                        stored.user_id.clone(),
                        SyncEntity::WorkoutTemplate,
                        SyncOperation::Update,
                        stored.id.clone(),
                        Some(serde_json::to_value(&stored).map_err(Error::from)?),
                    ),
                )?;
                Ok(stored.into())
            })
            .await
    }

    async fn soft_delete_template(&self, user_id: &str, template_id: &str) -> Result<()> {
        let user_id = user_id.to_string();
        let template_id = template_id.to_string();
        self.writer
            .exec(move |conn| {
                let affected = diesel::update(
                    workout_templates::table
                        .filter(workout_templates::id.eq(&template_id))
                        .filter(workout_templates::user_id.eq(&user_id))
                        .filter(workout_templates::deleted_at.is_null()),
                )
                .set(workout_templates::deleted_at.eq(Some(Utc::now().to_rfc3339())))
                .execute(conn)
                .map_err(StorageError::from)?;

                if affected > 0 {
                    write_outbox_item(
                        conn,
                        OutboxWriteRequest::new(
                            user_id.clone(),
                            SyncEntity::WorkoutTemplate,
                            SyncOperation::Delete,
                            template_id.clone(),
                            None,
                        ),
                    )?;
                }
                Ok(())
            })
            .await
    }
}
