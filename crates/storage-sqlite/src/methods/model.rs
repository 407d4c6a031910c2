//! Database model for method instances.

use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use liftlog_core::errors::Result;
use liftlog_core::methods::MethodInstance;

use crate::db::{enum_from_db, enum_to_db};

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
#[diesel(table_name = crate::schema::method_instances)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[diesel(treat_none_as_null = true)]
pub struct MethodInstanceDB {
    pub id: String,
    pub user_id: String,
    pub method_key: String,
    pub scope: String,
    pub name: String,
    pub config: String,
    pub state: String,
    pub archived: bool,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub deleted_at: Option<String>,
    #[serde(default)]
    pub last_synced_at: Option<String>,
}

/// Config/state are stored as JSON text; corrupt blobs read back as null
/// and get re-normalized by the engines instead of failing the row.
fn json_or_null(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or(Value::Null)
}

impl MethodInstanceDB {
    pub fn to_domain(self) -> Result<MethodInstance> {
        Ok(MethodInstance {
            kind: enum_from_db(&self.method_key)?,
            scope: enum_from_db(&self.scope)?,
            id: self.id,
            user_id: self.user_id,
            name: self.name,
            config: json_or_null(&self.config),
            state: json_or_null(&self.state),
            archived: self.archived,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }

    pub fn from_domain(instance: &MethodInstance) -> Result<Self> {
        Ok(Self {
            id: instance.id.clone(),
            user_id: instance.user_id.clone(),
            method_key: enum_to_db(&instance.kind)?,
            scope: enum_to_db(&instance.scope)?,
            name: instance.name.clone(),
            config: serde_json::to_string(&instance.config)
                .map_err(liftlog_core::Error::from)?,
            state: serde_json::to_string(&instance.state)
                .map_err(liftlog_core::Error::from)?,
            archived: instance.archived,
            created_at: instance.created_at.clone(),
            updated_at: instance.updated_at.clone(),
            deleted_at: None,
            last_synced_at: None,
        })
    }
}
