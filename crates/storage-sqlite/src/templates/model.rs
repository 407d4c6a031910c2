//! Database model for workout templates.

use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use liftlog_core::templates::{TemplateItem, WorkoutTemplate};

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
#[diesel(table_name = crate::schema::workout_templates)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[diesel(treat_none_as_null = true)]
pub struct WorkoutTemplateDB {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub items: String,
    pub tags: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub deleted_at: Option<String>,
    #[serde(default)]
    pub last_synced_at: Option<String>,
}

impl From<WorkoutTemplateDB> for WorkoutTemplate {
    fn from(row: WorkoutTemplateDB) -> Self {
        let items: Vec<TemplateItem> =
            serde_json::from_str(&row.items).unwrap_or_default();
        let tags: Vec<String> = row
            .tags
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or_default();

        WorkoutTemplate {
            id: row.id,
            user_id: row.user_id,
            name: row.name,
            items,
            tags,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl WorkoutTemplateDB {
    pub fn from_domain(template: &WorkoutTemplate) -> liftlog_core::Result<Self> {
        Ok(Self {
            id: template.id.clone(),
            user_id: template.user_id.clone(),
            name: template.name.clone(),
            items: serde_json::to_string(&template.items)
                .map_err(liftlog_core::Error::from)?,
            tags: if template.tags.is_empty() {
                None
            } else {
                Some(serde_json::to_string(&template.tags).map_err(liftlog_core::Error::from)?)
            },
            created_at: template.created_at.clone(),
            updated_at: template.updated_at.clone(),
            deleted_at: None,
            last_synced_at: None,
        })
    }
}
