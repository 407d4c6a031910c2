//! Training method domain: configured progression programs and the pure
//! engines that plan and advance them.

pub mod bilbo;
pub mod dispatcher;
pub mod wendler;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use log::debug;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::errors::Result;
use crate::sessions::history::{bilbo_cycle_starts, instance_entries, InstanceHistory};
use crate::sessions::SessionRepositoryTrait;
use crate::users::UserContext;

pub use dispatcher::{AppliedResult, PlannedAttempt};
pub use wendler::{Lift, LiftClass};

/// Closed set of training method kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodKind {
    Bilbo,
    Wendler531,
}

/// Whether an instance drives a single exercise or a group of lifts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodScope {
    SingleExercise,
    LiftGroup,
}

/// Prescribed set kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetKind {
    Work,
    Top,
    Deload,
}

/// A system-prescribed target set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedSet {
    pub id: String,
    pub kind: SetKind,
    pub weight: Decimal,
    /// None for open-ended (AMRAP) targets.
    pub target_reps: Option<i32>,
    pub amrap: bool,
    pub label: String,
}

/// A user-recorded outcome. Absence for a planned set means "not attempted".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformedSet {
    pub id: String,
    pub weight: Decimal,
    pub reps: i32,
    /// Reps in reserve, when tracked.
    pub rir: Option<i32>,
    pub done: Option<bool>,
}

/// A user-configured progression program.
///
/// `config` and `state` are method-specific blobs; persisted data is
/// untrusted and re-normalized before every use. `state` is the cached
/// current progression state — a display hint. The authoritative state is
/// derived by replay (see the session reconciler); only session completion
/// overwrites the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodInstance {
    pub id: String,
    pub user_id: String,
    pub kind: MethodKind,
    pub scope: MethodScope,
    pub name: String,
    pub config: Value,
    pub state: Value,
    pub archived: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMethodInstance {
    pub kind: MethodKind,
    pub scope: MethodScope,
    pub name: String,
    #[serde(default)]
    pub config: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodInstanceUpdate {
    pub name: Option<String>,
    pub config: Option<Value>,
    pub archived: Option<bool>,
}

// Defensive coercion helpers shared by the engines. Persisted blobs may have
// missing fields, wrong types, or junk values; bad fields fall back to the
// documented default instead of failing.

pub(crate) fn weight_or(raw: Option<&Value>, default: Decimal) -> Decimal {
    let parsed = match raw {
        Some(Value::Number(n)) => n.as_f64().and_then(Decimal::from_f64),
        Some(Value::String(s)) => s.trim().parse::<Decimal>().ok(),
        _ => None,
    };
    match parsed {
        Some(value) if value >= Decimal::ZERO => value,
        _ => default,
    }
}

pub(crate) fn int_or(raw: Option<&Value>, default: i32) -> i32 {
    match raw {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .and_then(|v| i32::try_from(v).ok())
            .unwrap_or(default),
        Some(Value::String(s)) => s.trim().parse::<i32>().unwrap_or(default),
        _ => default,
    }
}

pub(crate) fn reps_or(raw: Option<&Value>, default: i32) -> i32 {
    let value = int_or(raw, default);
    if value < 0 {
        default
    } else {
        value
    }
}

#[async_trait]
pub trait MethodInstanceRepositoryTrait: Send + Sync {
    fn list_method_instances(
        &self,
        user_id: &str,
        include_archived: bool,
    ) -> Result<Vec<MethodInstance>>;

    fn get_method_instance(&self, user_id: &str, instance_id: &str) -> Result<MethodInstance>;

    async fn insert_method_instance(&self, instance: MethodInstance) -> Result<MethodInstance>;

    async fn update_method_instance(&self, instance: MethodInstance) -> Result<MethodInstance>;

    /// Overwrite the cached progression state. Only the session lifecycle
    /// calls this.
    async fn set_method_state(&self, user_id: &str, instance_id: &str, state: Value)
        -> Result<()>;

    async fn soft_delete_method_instance(&self, user_id: &str, instance_id: &str) -> Result<()>;
}

/// CRUD and read models for method instances.
pub struct MethodService {
    methods: Arc<dyn MethodInstanceRepositoryTrait>,
    sessions: Arc<dyn SessionRepositoryTrait>,
    users: Arc<dyn UserContext>,
}

impl MethodService {
    pub fn new(
        methods: Arc<dyn MethodInstanceRepositoryTrait>,
        sessions: Arc<dyn SessionRepositoryTrait>,
        users: Arc<dyn UserContext>,
    ) -> Self {
        Self {
            methods,
            sessions,
            users,
        }
    }

    pub fn list_method_instances(&self, include_archived: bool) -> Result<Vec<MethodInstance>> {
        let user_id = self.users.current_user_id()?;
        self.methods.list_method_instances(&user_id, include_archived)
    }

    pub fn get_method_instance(&self, instance_id: &str) -> Result<MethodInstance> {
        let user_id = self.users.current_user_id()?;
        self.methods.get_method_instance(&user_id, instance_id)
    }

    pub async fn create_method_instance(&self, new: NewMethodInstance) -> Result<MethodInstance> {
        let user_id = self.users.current_user_id()?;
        let (config, state) = dispatcher::normalize(new.kind, &new.config, &Value::Null)?;
        let now = Utc::now().to_rfc3339();

        let instance = MethodInstance {
            id: Uuid::new_v4().to_string(),
            user_id,
            kind: new.kind,
            scope: new.scope,
            name: new.name,
            config,
            state,
            archived: false,
            created_at: now.clone(),
            updated_at: now,
        };
        debug!("Creating method instance {} ({:?})", instance.id, instance.kind);
        self.methods.insert_method_instance(instance).await
    }

    /// Apply a user edit. Config edits are re-normalized and apply going
    /// forward; the cached state is never touched here.
    pub async fn update_method_instance(
        &self,
        instance_id: &str,
        update: MethodInstanceUpdate,
    ) -> Result<MethodInstance> {
        let user_id = self.users.current_user_id()?;
        let mut instance = self.methods.get_method_instance(&user_id, instance_id)?;

        if let Some(name) = update.name {
            instance.name = name;
        }
        if let Some(config) = update.config {
            let (config, _) = dispatcher::normalize(instance.kind, &config, &instance.state)?;
            instance.config = config;
        }
        if let Some(archived) = update.archived {
            instance.archived = archived;
        }
        instance.updated_at = Utc::now().to_rfc3339();

        self.methods.update_method_instance(instance).await
    }

    pub async fn delete_method_instance(&self, instance_id: &str) -> Result<()> {
        let user_id = self.users.current_user_id()?;
        self.methods
            .soft_delete_method_instance(&user_id, instance_id)
            .await
    }

    /// Per-instance completed-session history for the analytics layer.
    pub fn method_instance_history(&self, instance_id: &str) -> Result<InstanceHistory> {
        let user_id = self.users.current_user_id()?;
        let instance = self.methods.get_method_instance(&user_id, instance_id)?;
        let sessions = self
            .sessions
            .list_completed_sessions_for_instance(&user_id, instance_id)?;

        let entries = instance_entries(&sessions, instance_id);
        let cycle_starts = match instance.kind {
            MethodKind::Bilbo => {
                bilbo_cycle_starts(&entries, &bilbo::normalize_config(&instance.config))
            }
            MethodKind::Wendler531 => Vec::new(),
        };

        Ok(InstanceHistory {
            entries,
            cycle_starts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn weight_coercion_tolerates_junk() {
        let fallback = dec!(20);
        assert_eq!(weight_or(Some(&json!(32.5)), fallback), dec!(32.5));
        assert_eq!(weight_or(Some(&json!("45")), fallback), dec!(45));
        assert_eq!(weight_or(Some(&json!(-10)), fallback), fallback);
        assert_eq!(weight_or(Some(&json!("heavy")), fallback), fallback);
        assert_eq!(weight_or(Some(&json!(null)), fallback), fallback);
        assert_eq!(weight_or(None, fallback), fallback);
    }

    #[test]
    fn int_coercion_tolerates_junk() {
        assert_eq!(int_or(Some(&json!(3)), 1), 3);
        assert_eq!(int_or(Some(&json!(2.9)), 1), 2);
        assert_eq!(int_or(Some(&json!("7")), 1), 7);
        assert_eq!(int_or(Some(&json!({})), 1), 1);
        assert_eq!(reps_or(Some(&json!(-4)), 15), 15);
    }

    #[test]
    fn method_kind_serializes_to_stable_keys() {
        assert_eq!(serde_json::to_string(&MethodKind::Bilbo).unwrap(), "\"bilbo\"");
        assert_eq!(
            serde_json::to_string(&MethodKind::Wendler531).unwrap(),
            "\"wendler531\""
        );
        assert_eq!(
            serde_json::to_string(&MethodScope::LiftGroup).unwrap(),
            "\"lift_group\""
        );
    }
}
