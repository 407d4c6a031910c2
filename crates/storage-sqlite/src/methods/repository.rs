//! SQLite repository for method instances.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use serde_json::Value;

use liftlog_core::errors::{Error, Result};
use liftlog_core::methods::{MethodInstance, MethodInstanceRepositoryTrait};
use liftlog_core::sync::{SyncEntity, SyncOperation};

use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::StorageError;
use crate::schema::method_instances;
use crate::sync::{write_outbox_item, OutboxWriteRequest};

use super::model::MethodInstanceDB;

pub struct MethodInstanceRepository {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl MethodInstanceRepository {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }
}

#[async_trait]
impl MethodInstanceRepositoryTrait for MethodInstanceRepository {
    fn list_method_instances(
        &self,
        user_id: &str,
        include_archived: bool,
    ) -> Result<Vec<MethodInstance>> {
        let mut conn = get_connection(&self.pool)?;
        let mut query = method_instances::table
            .filter(method_instances::user_id.eq(user_id))
            .filter(method_instances::deleted_at.is_null())
            .into_boxed();
        if !include_archived {
            query = query.filter(method_instances::archived.eq(false));
        }

        let rows = query
            .order(method_instances::created_at.asc())
            .load::<MethodInstanceDB>(&mut conn)
            .map_err(StorageError::from)?;
        rows.into_iter().map(MethodInstanceDB::to_domain).collect()
    }

    fn get_method_instance(&self, user_id: &str, instance_id: &str) -> Result<MethodInstance> {
        let mut conn = get_connection(&self.pool)?;
        let row = method_instances::table
            .filter(method_instances::id.eq(instance_id))
            .filter(method_instances::user_id.eq(user_id))
            .filter(method_instances::deleted_at.is_null())
            .first::<MethodInstanceDB>(&mut conn)
            .optional()
            .map_err(StorageError::from)?;
        row.ok_or_else(|| Error::not_found("Method instance"))?
            .to_domain()
    }

    async fn insert_method_instance(&self, instance: MethodInstance) -> Result<MethodInstance> {
        let row = MethodInstanceDB::from_domain(&instance)?;
        self.writer
            .exec(move |conn| {
                let inserted = diesel::insert_into(method_instances::table)
                    .values(&row)
                    .returning(MethodInstanceDB::as_returning())
                    .get_result::<MethodInstanceDB>(conn)
                    .map_err(StorageError::from)?;

                write_outbox_item(
                    conn,
                    OutboxWriteRequest::new(
                        inserted.user_id.clone(),
                        SyncEntity::MethodInstance,
                        SyncOperation::Create,
                        inserted.id.clone(),
                        Some(serde_json::to_value(&inserted).map_err(Error::from)?),
                    ),
                )?;
                inserted.to_domain()
            })
            .await
    }

    async fn update_method_instance(&self, instance: MethodInstance) -> Result<MethodInstance> {
        let row = MethodInstanceDB::from_domain(&instance)?;
        self.writer
            .exec(move |conn| {
                let affected = diesel::update(
                    method_instances::table
                        .filter(method_instances::id.eq(&row.id))
                        .filter(method_instances::user_id.eq(&row.user_id))
                        .filter(method_instances::deleted_at.is_null()),
                )
                .set((
                    method_instances::name.eq(&row.name),
                    method_instances::config.eq(&row.config),
                    method_instances::archived.eq(row.archived),
                    method_instances::updated_at.eq(&row.updated_at),
                ))
                .execute(conn)
                .map_err(StorageError::from)?;
                if affected == 0 {
                    return Err(Error::not_found("Method instance"));
                }

                let stored = method_instances::table
                    .find(&row.id)
                    .first::<MethodInstanceDB>(conn)
                    .map_err(StorageError::from)?;
                write_outbox_item(
                    conn,
                    OutboxWriteRequest::new(
                        stored.user_id.clone(),
                        SyncEntity::MethodInstance,
                        SyncOperation::Update,
                        stored.id.clone(),
                        Some(serde_json::to_value(&stored).map_err(Error::from)?),
                    ),
                )?;
                stored.to_domain()
            })
            .await
    }

    async fn set_method_state(
        &self,
        user_id: &str,
        instance_id: &str,
        state: Value,
    ) -> Result<()> {
        let user_id = user_id.to_string();
        let instance_id = instance_id.to_string();
        self.writer
            .exec(move |conn| {
                let state_text = serde_json::to_string(&state).map_err(Error::from)?;
                let affected = diesel::update(
                    method_instances::table
                        .filter(method_instances::id.eq(&instance_id))
                        .filter(method_instances::user_id.eq(&user_id))
                        .filter(method_instances::deleted_at.is_null()),
                )
                .set((
                    method_instances::state.eq(state_text),
                    method_instances::updated_at.eq(Utc::now().to_rfc3339()),
                ))
                .execute(conn)
                .map_err(StorageError::from)?;
                if affected == 0 {
                    return Err(Error::not_found("Method instance"));
                }

                let stored = method_instances::table
                    .find(&instance_id)
                    .first::<MethodInstanceDB>(conn)
                    .map_err(StorageError::from)?;
                write_outbox_item(
                    conn,
                    OutboxWriteRequest::new(
                        stored.user_id.clone(),
                        SyncEntity::MethodInstance,
                        SyncOperation::Update,
                        stored.id.clone(),
                        Some(serde_json::to_value(&stored).map_err(Error::from)?),
                    ),
                )?;
                Ok(())
            })
            .await
    }

    async fn soft_delete_method_instance(&self, user_id: &str, instance_id: &str) -> Result<()> {
        let user_id = user_id.to_string();
        let instance_id = instance_id.to_string();
        self.writer
            .exec(move |conn| {
                let affected = diesel::update(
                    method_instances::table
                        .filter(method_instances::id.eq(&instance_id))
                        .filter(method_instances::user_id.eq(&user_id))
                        .filter(method_instances::deleted_at.is_null()),
                )
                .set(method_instances::deleted_at.eq(Some(Utc::now().to_rfc3339())))
                .execute(conn)
                .map_err(StorageError::from)?;

                if affected > 0 {
                    write_outbox_item(
                        conn,
                        OutboxWriteRequest::new(
                            user_id.clone(),
                            SyncEntity::MethodInstance,
                            SyncOperation::Delete,
                            instance_id.clone(),
                            None,
                        ),
                    )?;
                }
                Ok(())
            })
            .await
    }
}
