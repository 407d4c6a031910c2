//! Workout templates: reusable session blueprints.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::Result;
use crate::methods::Lift;
use crate::sessions::ExerciseRef;
use crate::users::UserContext;

/// Where a template item gets its sets from when instantiated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TemplateItemSource {
    Free,
    #[serde(rename_all = "camelCase")]
    Method {
        instance_id: String,
        binding: Option<Lift>,
    },
}

/// One exercise slot in a template. Method items are resolved against live
/// instance state when a session is started, never at template save time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateItem {
    pub exercise: ExerciseRef,
    pub source: TemplateItemSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkoutTemplate {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub items: Vec<TemplateItem>,
    pub tags: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTemplate {
    pub name: String,
    #[serde(default)]
    pub items: Vec<TemplateItem>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateUpdate {
    pub name: Option<String>,
    pub items: Option<Vec<TemplateItem>>,
    pub tags: Option<Vec<String>>,
}

#[async_trait]
pub trait TemplateRepositoryTrait: Send + Sync {
    fn list_templates(&self, user_id: &str) -> Result<Vec<WorkoutTemplate>>;

    fn get_template(&self, user_id: &str, template_id: &str) -> Result<WorkoutTemplate>;

    async fn insert_template(&self, template: WorkoutTemplate) -> Result<WorkoutTemplate>;

    async fn update_template(&self, template: WorkoutTemplate) -> Result<WorkoutTemplate>;

    async fn soft_delete_template(&self, user_id: &str, template_id: &str) -> Result<()>;
}

pub struct TemplateService {
    templates: Arc<dyn TemplateRepositoryTrait>,
    users: Arc<dyn UserContext>,
}

impl TemplateService {
    pub fn new(templates: Arc<dyn TemplateRepositoryTrait>, users: Arc<dyn UserContext>) -> Self {
        Self { templates, users }
    }

    pub fn list_templates(&self) -> Result<Vec<WorkoutTemplate>> {
        let user_id = self.users.current_user_id()?;
        self.templates.list_templates(&user_id)
    }

    pub fn get_template(&self, template_id: &str) -> Result<WorkoutTemplate> {
        let user_id = self.users.current_user_id()?;
        self.templates.get_template(&user_id, template_id)
    }

    pub async fn create_template(&self, new: NewTemplate) -> Result<WorkoutTemplate> {
        let user_id = self.users.current_user_id()?;
        let now = Utc::now().to_rfc3339();
        let template = WorkoutTemplate {
            id: Uuid::new_v4().to_string(),
            user_id,
            name: new.name,
            items: new.items,
            tags: new.tags,
            created_at: now.clone(),
            updated_at: now,
        };
        self.templates.insert_template(template).await
    }

    pub async fn update_template(
        &self,
        template_id: &str,
        update: TemplateUpdate,
    ) -> Result<WorkoutTemplate> {
        let user_id = self.users.current_user_id()?;
        let mut template = self.templates.get_template(&user_id, template_id)?;

        if let Some(name) = update.name {
            template.name = name;
        }
        if let Some(items) = update.items {
            template.items = items;
        }
        if let Some(tags) = update.tags {
            template.tags = tags;
        }
        template.updated_at = Utc::now().to_rfc3339();

        self.templates.update_template(template).await
    }

    pub async fn delete_template(&self, template_id: &str) -> Result<()> {
        let user_id = self.users.current_user_id()?;
        self.templates.soft_delete_template(&user_id, template_id).await
    }
}
