//! Workout session domain: the event-sourced session model and lifecycle.

pub mod history;
pub mod reconciler;
pub mod service;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::Result;
use crate::methods::{Lift, MethodKind, PerformedSet, PlannedSet};

pub use reconciler::{ResolvedMethodState, StateReconciler};
pub use service::{
    FinishOutcome, NewExerciseSource, NewSession, NewSessionExercise, SessionService,
};

/// Sessions starting further than this in the future count as scheduled
/// rather than in progress.
pub const SCHEDULED_GRACE_MINUTES: i64 = 15;

/// Reference to what was lifted: a library exercise or free text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExerciseRef {
    Library { id: String },
    Custom { name: String },
}

/// The method binding frozen into a session exercise.
///
/// `config` and `state_at_start` are owned copies taken when the exercise
/// was built; they never change afterwards, even when the live instance
/// does. This is what makes historical sessions reproducible and gives the
/// reconciler a fixed replay base.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodSource {
    pub instance_id: String,
    pub kind: MethodKind,
    pub binding: Option<Lift>,
    pub config: Value,
    pub state_at_start: Value,
}

/// Where a session exercise came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExerciseSource {
    Free,
    Method(MethodSource),
}

impl ExerciseSource {
    pub fn method(&self) -> Option<&MethodSource> {
        match self {
            ExerciseSource::Method(source) => Some(source),
            ExerciseSource::Free => None,
        }
    }
}

/// One exercise within a session. Order within the snapshot is meaningful.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionExercise {
    pub id: String,
    pub exercise: ExerciseRef,
    pub source: ExerciseSource,
    pub planned_sets: Vec<PlannedSet>,
    pub performed_sets: Vec<PerformedSet>,
    pub notes: Option<String>,
}

/// The frozen historical record of a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub exercises: Vec<SessionExercise>,
    pub notes: Option<String>,
}

impl SessionSnapshot {
    /// True when finishing would persist a no-op workout.
    pub fn is_empty(&self) -> bool {
        self.exercises.is_empty()
            && self
                .notes
                .as_deref()
                .map(|notes| notes.trim().is_empty())
                .unwrap_or(true)
    }
}

/// Derived session lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Scheduled,
    InProgress,
    Completed,
}

/// One training occurrence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkoutSession {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub template_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
    pub snapshot: SessionSnapshot,
    pub created_at: String,
    pub updated_at: String,
}

impl WorkoutSession {
    pub fn is_completed(&self) -> bool {
        self.ended_at.is_some()
    }

    /// Status relative to `now`; completed iff an end time is set.
    pub fn status_at(&self, now: DateTime<Utc>) -> SessionStatus {
        if self.ended_at.is_some() {
            SessionStatus::Completed
        } else if self.started_at > now + Duration::minutes(SCHEDULED_GRACE_MINUTES) {
            SessionStatus::Scheduled
        } else {
            SessionStatus::InProgress
        }
    }

    /// Exercises bound to a method instance, in snapshot order.
    pub fn exercises_for_instance(&self, instance_id: &str) -> Vec<&SessionExercise> {
        self.snapshot
            .exercises
            .iter()
            .filter(|exercise| {
                exercise
                    .source
                    .method()
                    .map(|source| source.instance_id == instance_id)
                    .unwrap_or(false)
            })
            .collect()
    }
}

/// Merge performed sets across several exercises bound to one instance.
///
/// Set ids are unique session-wide (planned ids are namespaced with the
/// owning exercise id), so deduping by id only guards against a set logged
/// twice; first occurrence wins.
pub(crate) fn merge_performed_sets(exercises: &[&SessionExercise]) -> Vec<PerformedSet> {
    let mut seen = std::collections::HashSet::new();
    exercises
        .iter()
        .flat_map(|exercise| exercise.performed_sets.iter())
        .filter(|set| seen.insert(set.id.clone()))
        .cloned()
        .collect()
}

#[async_trait]
pub trait SessionRepositoryTrait: Send + Sync {
    fn list_sessions(&self, user_id: &str) -> Result<Vec<WorkoutSession>>;

    fn get_session(&self, user_id: &str, session_id: &str) -> Result<WorkoutSession>;

    /// Completed sessions whose snapshot references the instance, most
    /// recently ended first.
    fn list_completed_sessions_for_instance(
        &self,
        user_id: &str,
        instance_id: &str,
    ) -> Result<Vec<WorkoutSession>>;

    async fn insert_session(&self, session: WorkoutSession) -> Result<WorkoutSession>;

    async fn update_session(&self, session: WorkoutSession) -> Result<WorkoutSession>;

    async fn soft_delete_session(&self, user_id: &str, session_id: &str) -> Result<()>;
}
