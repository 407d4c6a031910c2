//! Database model for workout sessions.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use liftlog_core::sessions::{SessionSnapshot, WorkoutSession};

use crate::db::parse_rfc3339;

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
#[diesel(table_name = crate::schema::workout_sessions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[diesel(treat_none_as_null = true)]
pub struct WorkoutSessionDB {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub template_id: Option<String>,
    pub started_at: String,
    pub ended_at: Option<String>,
    pub tags: Option<String>,
    pub snapshot: String,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub deleted_at: Option<String>,
    #[serde(default)]
    pub last_synced_at: Option<String>,
}

impl From<WorkoutSessionDB> for WorkoutSession {
    fn from(row: WorkoutSessionDB) -> Self {
        // Snapshot/tags are untrusted JSON text; a corrupt blob reads back
        // empty rather than failing the whole row.
        let snapshot: SessionSnapshot =
            serde_json::from_str(&row.snapshot).unwrap_or_default();
        let tags: Vec<String> = row
            .tags
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or_default();

        WorkoutSession {
            id: row.id,
            user_id: row.user_id,
            title: row.title,
            template_id: row.template_id,
            started_at: parse_rfc3339(&row.started_at),
            ended_at: row.ended_at.as_deref().map(parse_rfc3339),
            tags,
            snapshot,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl WorkoutSessionDB {
    pub fn from_domain(session: &WorkoutSession) -> liftlog_core::Result<Self> {
        Ok(Self {
            id: session.id.clone(),
            user_id: session.user_id.clone(),
            title: session.title.clone(),
            template_id: session.template_id.clone(),
            started_at: session.started_at.to_rfc3339(),
            ended_at: session.ended_at.as_ref().map(DateTime::<Utc>::to_rfc3339),
            tags: if session.tags.is_empty() {
                None
            } else {
                Some(serde_json::to_string(&session.tags).map_err(liftlog_core::Error::from)?)
            },
            snapshot: serde_json::to_string(&session.snapshot)
                .map_err(liftlog_core::Error::from)?,
            created_at: session.created_at.clone(),
            updated_at: session.updated_at.clone(),
            deleted_at: None,
            last_synced_at: None,
        })
    }
}
