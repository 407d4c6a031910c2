//! Database models for the outbox and pull-checkpoint tables.

use diesel::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(
    Queryable,
    Identifiable,
    Insertable,
    AsChangeset,
    Selectable,
    Debug,
    Clone,
    Serialize,
    Deserialize,
)]
#[diesel(table_name = crate::schema::sync_queue)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SyncQueueItemDB {
    pub id: String,
    pub user_id: String,
    pub entity: String,
    pub op: String,
    pub entity_id: String,
    pub payload: Option<String>,
    pub created_at: String,
    pub attempt_count: i32,
    pub next_retry_at: Option<String>,
    pub last_error: Option<String>,
}

#[derive(
    Queryable,
    Identifiable,
    Insertable,
    AsChangeset,
    Selectable,
    Debug,
    Clone,
    Serialize,
    Deserialize,
)]
#[diesel(primary_key(user_id, entity))]
#[diesel(table_name = crate::schema::sync_state)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SyncStateDB {
    pub user_id: String,
    pub entity: String,
    pub last_pulled_at: String,
}
