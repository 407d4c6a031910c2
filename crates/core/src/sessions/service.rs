//! Session lifecycle: create, mutate, finish, discard.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use uuid::Uuid;

use crate::errors::{Error, Result};
use crate::methods::{dispatcher, Lift, MethodInstanceRepositoryTrait};
use crate::sessions::{
    merge_performed_sets, ExerciseRef, ExerciseSource, MethodSource, SessionExercise,
    SessionRepositoryTrait, SessionSnapshot, StateReconciler, WorkoutSession,
};
use crate::templates::{TemplateItemSource, TemplateRepositoryTrait};
use crate::users::UserContext;

/// Source for a not-yet-built session exercise.
#[derive(Debug, Clone)]
pub enum NewExerciseSource {
    Free,
    Method {
        instance_id: String,
        binding: Option<Lift>,
    },
}

#[derive(Debug, Clone)]
pub struct NewSessionExercise {
    pub exercise: ExerciseRef,
    pub source: NewExerciseSource,
}

#[derive(Debug, Clone)]
pub struct NewSession {
    pub title: String,
    pub started_at: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
    pub notes: Option<String>,
    pub exercises: Vec<NewSessionExercise>,
}

/// Result of finishing a session.
#[derive(Debug, Clone, PartialEq)]
pub enum FinishOutcome {
    Completed(WorkoutSession),
    /// The session was empty and has been discarded, not saved.
    Discarded,
}

/// Creates, mutates and finalizes workout sessions.
///
/// Method-bound exercises are always planned from reconciled state, and
/// progression state advances only here, on completion.
pub struct SessionService {
    sessions: Arc<dyn SessionRepositoryTrait>,
    methods: Arc<dyn MethodInstanceRepositoryTrait>,
    templates: Arc<dyn TemplateRepositoryTrait>,
    users: Arc<dyn UserContext>,
    reconciler: StateReconciler,
}

impl SessionService {
    pub fn new(
        sessions: Arc<dyn SessionRepositoryTrait>,
        methods: Arc<dyn MethodInstanceRepositoryTrait>,
        templates: Arc<dyn TemplateRepositoryTrait>,
        users: Arc<dyn UserContext>,
    ) -> Self {
        let reconciler = StateReconciler::new(sessions.clone());
        Self {
            sessions,
            methods,
            templates,
            users,
            reconciler,
        }
    }

    /// Build one session exercise; method sources get a plan computed from
    /// reconciled state, with the normalized config/state frozen in.
    fn build_exercise(&self, user_id: &str, new: NewSessionExercise) -> Result<SessionExercise> {
        let exercise_id = Uuid::new_v4().to_string();
        let (instance_id, binding) = match new.source {
            NewExerciseSource::Free => {
                return Ok(SessionExercise {
                    id: exercise_id,
                    exercise: new.exercise,
                    source: ExerciseSource::Free,
                    planned_sets: vec![],
                    performed_sets: vec![],
                    notes: None,
                });
            }
            NewExerciseSource::Method {
                instance_id,
                binding,
            } => (instance_id, binding),
        };

        let instance = self.methods.get_method_instance(user_id, &instance_id)?;
        let resolved = self.reconciler.resolve(user_id, &instance)?;
        let mut attempt =
            dispatcher::plan_next_attempt(instance.kind, binding, &resolved.config, &resolved.state)?;

        // Namespace planned-set ids with the owning exercise so performed
        // ids stay unique across all exercises of one session.
        for set in &mut attempt.planned_sets {
            set.id = format!("{}:{}", exercise_id, set.id);
        }

        Ok(SessionExercise {
            id: exercise_id,
            exercise: new.exercise,
            source: ExerciseSource::Method(MethodSource {
                instance_id,
                kind: instance.kind,
                binding,
                config: attempt.config,
                state_at_start: attempt.state,
            }),
            planned_sets: attempt.planned_sets,
            performed_sets: vec![],
            notes: None,
        })
    }

    async fn create_session(
        &self,
        user_id: String,
        title: String,
        template_id: Option<String>,
        started_at: Option<DateTime<Utc>>,
        tags: Vec<String>,
        notes: Option<String>,
        exercises: Vec<NewSessionExercise>,
    ) -> Result<WorkoutSession> {
        let exercises = exercises
            .into_iter()
            .map(|new| self.build_exercise(&user_id, new))
            .collect::<Result<Vec<_>>>()?;

        let now = Utc::now();
        let session = WorkoutSession {
            id: Uuid::new_v4().to_string(),
            user_id,
            title,
            template_id,
            started_at: started_at.unwrap_or(now),
            ended_at: None,
            tags,
            snapshot: SessionSnapshot {
                exercises,
                notes,
            },
            created_at: now.to_rfc3339(),
            updated_at: now.to_rfc3339(),
        };
        self.sessions.insert_session(session).await
    }

    pub async fn start_quick_session(&self, new: NewSession) -> Result<WorkoutSession> {
        let user_id = self.users.current_user_id()?;
        self.create_session(
            user_id,
            new.title,
            None,
            new.started_at,
            new.tags,
            new.notes,
            new.exercises,
        )
        .await
    }

    pub async fn start_session_from_template(
        &self,
        template_id: &str,
        started_at: Option<DateTime<Utc>>,
    ) -> Result<WorkoutSession> {
        let user_id = self.users.current_user_id()?;
        let template = self.templates.get_template(&user_id, template_id)?;

        let exercises = template
            .items
            .into_iter()
            .map(|item| NewSessionExercise {
                exercise: item.exercise,
                source: match item.source {
                    TemplateItemSource::Free => NewExerciseSource::Free,
                    TemplateItemSource::Method {
                        instance_id,
                        binding,
                    } => NewExerciseSource::Method {
                        instance_id,
                        binding,
                    },
                },
            })
            .collect();

        self.create_session(
            user_id,
            template.name,
            Some(template.id),
            started_at,
            template.tags,
            None,
            exercises,
        )
        .await
    }

    /// Free-form snapshot edit; never advances progression.
    pub async fn update_session_snapshot(
        &self,
        session_id: &str,
        snapshot: SessionSnapshot,
    ) -> Result<WorkoutSession> {
        let user_id = self.users.current_user_id()?;
        let mut session = self.sessions.get_session(&user_id, session_id)?;
        session.snapshot = snapshot;
        session.updated_at = Utc::now().to_rfc3339();
        self.sessions.update_session(session).await
    }

    /// Adjust start/end times. Setting an end time here is a plain edit;
    /// progression advances only through [`SessionService::finish_session`].
    pub async fn update_session_times(
        &self,
        session_id: &str,
        started_at: DateTime<Utc>,
        ended_at: Option<DateTime<Utc>>,
    ) -> Result<WorkoutSession> {
        let user_id = self.users.current_user_id()?;
        let mut session = self.sessions.get_session(&user_id, session_id)?;
        session.started_at = started_at;
        session.ended_at = ended_at;
        session.updated_at = Utc::now().to_rfc3339();
        self.sessions.update_session(session).await
    }

    pub async fn update_session_title(
        &self,
        session_id: &str,
        title: String,
    ) -> Result<WorkoutSession> {
        let user_id = self.users.current_user_id()?;
        let mut session = self.sessions.get_session(&user_id, session_id)?;
        session.title = title;
        session.updated_at = Utc::now().to_rfc3339();
        self.sessions.update_session(session).await
    }

    pub async fn update_session_tags(
        &self,
        session_id: &str,
        tags: Vec<String>,
    ) -> Result<WorkoutSession> {
        let user_id = self.users.current_user_id()?;
        let mut session = self.sessions.get_session(&user_id, session_id)?;
        session.tags = tags;
        session.updated_at = Utc::now().to_rfc3339();
        self.sessions.update_session(session).await
    }

    /// Finalize a session.
    ///
    /// An empty session (no exercises, no notes) is discarded instead of
    /// saved. Otherwise the end time is set, the snapshot becomes the
    /// permanent record, and each distinct bound method instance is advanced
    /// exactly once from its frozen start state. A failure advancing one
    /// instance is logged and does not fail the finish.
    pub async fn finish_session(
        &self,
        session_id: &str,
        ended_at: Option<DateTime<Utc>>,
    ) -> Result<FinishOutcome> {
        let user_id = self.users.current_user_id()?;
        let mut session = self.sessions.get_session(&user_id, session_id)?;
        if session.is_completed() {
            return Err(Error::validation("Session is already completed"));
        }

        if session.snapshot.is_empty() {
            debug!("Discarding empty session {}", session.id);
            self.sessions.soft_delete_session(&user_id, session_id).await?;
            return Ok(FinishOutcome::Discarded);
        }

        session.ended_at = Some(ended_at.unwrap_or_else(Utc::now));
        session.updated_at = Utc::now().to_rfc3339();
        let session = self.sessions.update_session(session).await?;

        // Distinct bound instances, in snapshot order.
        let mut instance_ids: Vec<String> = Vec::new();
        for exercise in &session.snapshot.exercises {
            if let Some(source) = exercise.source.method() {
                if !instance_ids.contains(&source.instance_id) {
                    instance_ids.push(source.instance_id.clone());
                }
            }
        }

        for instance_id in instance_ids {
            if let Err(err) = self.advance_instance(&user_id, &instance_id, &session).await {
                warn!(
                    "Failed to advance method instance {} after session {}: {}",
                    instance_id, session.id, err
                );
            }
        }

        Ok(FinishOutcome::Completed(session))
    }

    /// Advance one instance from the session's frozen start state. A
    /// multi-lift instance appearing under several exercises advances once,
    /// from the merged performed sets.
    async fn advance_instance(
        &self,
        user_id: &str,
        instance_id: &str,
        session: &WorkoutSession,
    ) -> Result<()> {
        let bound = session.exercises_for_instance(instance_id);
        let Some(source) = bound.first().and_then(|ex| ex.source.method()) else {
            return Ok(());
        };

        let instance = self.methods.get_method_instance(user_id, instance_id)?;
        let performed = merge_performed_sets(&bound);
        let applied = dispatcher::apply_result(
            source.kind,
            &instance.config,
            &source.state_at_start,
            &performed,
        )?;

        if applied.completed {
            self.methods
                .set_method_state(user_id, instance_id, applied.state)
                .await?;
        }
        Ok(())
    }

    pub async fn delete_session(&self, session_id: &str) -> Result<()> {
        let user_id = self.users.current_user_id()?;
        self.sessions.soft_delete_session(&user_id, session_id).await
    }

    /// Copy a session's shape into a fresh one. Method exercises are
    /// re-planned from reconciled state; performed sets are not copied.
    pub async fn duplicate_session(
        &self,
        session_id: &str,
        started_at: Option<DateTime<Utc>>,
    ) -> Result<WorkoutSession> {
        let user_id = self.users.current_user_id()?;
        let original = self.sessions.get_session(&user_id, session_id)?;

        let exercises = original
            .snapshot
            .exercises
            .iter()
            .map(|exercise| NewSessionExercise {
                exercise: exercise.exercise.clone(),
                source: match &exercise.source {
                    ExerciseSource::Free => NewExerciseSource::Free,
                    ExerciseSource::Method(source) => NewExerciseSource::Method {
                        instance_id: source.instance_id.clone(),
                        binding: source.binding,
                    },
                },
            })
            .collect();

        self.create_session(
            user_id,
            original.title,
            original.template_id,
            started_at,
            original.tags,
            None,
            exercises,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::Mutex;

    use crate::methods::{MethodInstance, MethodKind, MethodScope, PerformedSet};
    use crate::templates::WorkoutTemplate;
    use crate::users::StaticUserContext;

    struct FakeMethodRepo {
        instances: Mutex<HashMap<String, MethodInstance>>,
        fail_set_state: bool,
    }

    impl FakeMethodRepo {
        fn with(instances: Vec<MethodInstance>) -> Self {
            Self {
                instances: Mutex::new(
                    instances.into_iter().map(|i| (i.id.clone(), i)).collect(),
                ),
                fail_set_state: false,
            }
        }

        fn state_of(&self, instance_id: &str) -> Value {
            self.instances.lock().unwrap()[instance_id].state.clone()
        }
    }

    #[async_trait]
    impl MethodInstanceRepositoryTrait for FakeMethodRepo {
        fn list_method_instances(
            &self,
            _user_id: &str,
            _include_archived: bool,
        ) -> Result<Vec<MethodInstance>> {
            Ok(self.instances.lock().unwrap().values().cloned().collect())
        }

        fn get_method_instance(
            &self,
            _user_id: &str,
            instance_id: &str,
        ) -> Result<MethodInstance> {
            self.instances
                .lock()
                .unwrap()
                .get(instance_id)
                .cloned()
                .ok_or_else(|| Error::not_found("Method instance"))
        }

        async fn insert_method_instance(
            &self,
            instance: MethodInstance,
        ) -> Result<MethodInstance> {
            self.instances
                .lock()
                .unwrap()
                .insert(instance.id.clone(), instance.clone());
            Ok(instance)
        }

        async fn update_method_instance(
            &self,
            instance: MethodInstance,
        ) -> Result<MethodInstance> {
            self.insert_method_instance(instance).await
        }

        async fn set_method_state(
            &self,
            _user_id: &str,
            instance_id: &str,
            state: Value,
        ) -> Result<()> {
            if self.fail_set_state {
                return Err(Error::Database(crate::errors::DatabaseError::Internal(
                    "write failed".to_string(),
                )));
            }
            if let Some(instance) = self.instances.lock().unwrap().get_mut(instance_id) {
                instance.state = state;
            }
            Ok(())
        }

        async fn soft_delete_method_instance(
            &self,
            _user_id: &str,
            instance_id: &str,
        ) -> Result<()> {
            self.instances.lock().unwrap().remove(instance_id);
            Ok(())
        }
    }

    struct FakeSessionRepo {
        sessions: Mutex<HashMap<String, WorkoutSession>>,
    }

    impl FakeSessionRepo {
        fn empty() -> Self {
            Self {
                sessions: Mutex::new(HashMap::new()),
            }
        }

        fn contains(&self, session_id: &str) -> bool {
            self.sessions.lock().unwrap().contains_key(session_id)
        }
    }

    #[async_trait]
    impl SessionRepositoryTrait for FakeSessionRepo {
        fn list_sessions(&self, _user_id: &str) -> Result<Vec<WorkoutSession>> {
            Ok(self.sessions.lock().unwrap().values().cloned().collect())
        }

        fn get_session(&self, _user_id: &str, session_id: &str) -> Result<WorkoutSession> {
            self.sessions
                .lock()
                .unwrap()
                .get(session_id)
                .cloned()
                .ok_or_else(|| Error::not_found("Session"))
        }

        fn list_completed_sessions_for_instance(
            &self,
            _user_id: &str,
            instance_id: &str,
        ) -> Result<Vec<WorkoutSession>> {
            let mut found: Vec<WorkoutSession> = self
                .sessions
                .lock()
                .unwrap()
                .values()
                .filter(|s| {
                    s.is_completed() && !s.exercises_for_instance(instance_id).is_empty()
                })
                .cloned()
                .collect();
            found.sort_by(|a, b| b.ended_at.cmp(&a.ended_at));
            Ok(found)
        }

        async fn insert_session(&self, session: WorkoutSession) -> Result<WorkoutSession> {
            self.sessions
                .lock()
                .unwrap()
                .insert(session.id.clone(), session.clone());
            Ok(session)
        }

        async fn update_session(&self, session: WorkoutSession) -> Result<WorkoutSession> {
            self.insert_session(session).await
        }

        async fn soft_delete_session(&self, _user_id: &str, session_id: &str) -> Result<()> {
            self.sessions.lock().unwrap().remove(session_id);
            Ok(())
        }
    }

    struct FakeTemplateRepo;

    #[async_trait]
    impl TemplateRepositoryTrait for FakeTemplateRepo {
        fn list_templates(&self, _user_id: &str) -> Result<Vec<WorkoutTemplate>> {
            Ok(vec![])
        }

        fn get_template(&self, _user_id: &str, _template_id: &str) -> Result<WorkoutTemplate> {
            Err(Error::not_found("Template"))
        }

        async fn insert_template(&self, template: WorkoutTemplate) -> Result<WorkoutTemplate> {
            Ok(template)
        }

        async fn update_template(&self, template: WorkoutTemplate) -> Result<WorkoutTemplate> {
            Ok(template)
        }

        async fn soft_delete_template(&self, _user_id: &str, _template_id: &str) -> Result<()> {
            Ok(())
        }
    }

    fn bilbo_instance(id: &str) -> MethodInstance {
        let now = Utc::now().to_rfc3339();
        MethodInstance {
            id: id.to_string(),
            user_id: "u1".to_string(),
            kind: MethodKind::Bilbo,
            scope: MethodScope::SingleExercise,
            name: "Bilbo squat".to_string(),
            config: json!({ "startWeight": 20, "incrementWeight": 2.5, "resetAtReps": 15 }),
            state: json!({ "currentWeight": 20 }),
            archived: false,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    fn wendler_instance(id: &str) -> MethodInstance {
        let now = Utc::now().to_rfc3339();
        MethodInstance {
            id: id.to_string(),
            user_id: "u1".to_string(),
            kind: MethodKind::Wendler531,
            scope: MethodScope::LiftGroup,
            name: "5/3/1".to_string(),
            config: json!({ "trainingMaxes": { "squat": 100, "bench": 80 } }),
            state: json!({ "week": 1, "cycle": 1 }),
            archived: false,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    struct Harness {
        sessions: Arc<FakeSessionRepo>,
        methods: Arc<FakeMethodRepo>,
        service: SessionService,
    }

    fn harness(instances: Vec<MethodInstance>) -> Harness {
        harness_with(FakeMethodRepo::with(instances))
    }

    fn harness_with(methods: FakeMethodRepo) -> Harness {
        let sessions = Arc::new(FakeSessionRepo::empty());
        let methods = Arc::new(methods);
        let service = SessionService::new(
            sessions.clone(),
            methods.clone(),
            Arc::new(FakeTemplateRepo),
            Arc::new(StaticUserContext::new("u1")),
        );
        Harness {
            sessions,
            methods,
            service,
        }
    }

    fn method_exercise(instance_id: &str, binding: Option<Lift>) -> NewSessionExercise {
        NewSessionExercise {
            exercise: ExerciseRef::Custom {
                name: "lift".to_string(),
            },
            source: NewExerciseSource::Method {
                instance_id: instance_id.to_string(),
                binding,
            },
        }
    }

    fn record_all_planned(session: &mut WorkoutSession, reps: i32) {
        for exercise in &mut session.snapshot.exercises {
            exercise.performed_sets = exercise
                .planned_sets
                .iter()
                .map(|planned| PerformedSet {
                    id: planned.id.clone(),
                    weight: planned.weight,
                    reps,
                    rir: None,
                    done: Some(true),
                })
                .collect();
        }
    }

    #[tokio::test]
    async fn finishing_an_empty_session_discards_it() {
        let h = harness(vec![]);
        let session = h
            .service
            .start_quick_session(NewSession {
                title: "Quick".to_string(),
                started_at: None,
                tags: vec![],
                notes: None,
                exercises: vec![],
            })
            .await
            .unwrap();
        assert!(h.sessions.contains(&session.id));

        let outcome = h.service.finish_session(&session.id, None).await.unwrap();
        assert_eq!(outcome, FinishOutcome::Discarded);
        assert!(!h.sessions.contains(&session.id));
    }

    #[tokio::test]
    async fn finishing_advances_the_bound_instance_once() {
        let h = harness(vec![bilbo_instance("mi-1")]);
        let session = h
            .service
            .start_quick_session(NewSession {
                title: "Squat day".to_string(),
                started_at: None,
                tags: vec![],
                notes: None,
                exercises: vec![method_exercise("mi-1", None)],
            })
            .await
            .unwrap();

        let mut edited = session.clone();
        record_all_planned(&mut edited, 16);
        h.service
            .update_session_snapshot(&session.id, edited.snapshot)
            .await
            .unwrap();

        let outcome = h.service.finish_session(&session.id, None).await.unwrap();
        assert!(matches!(outcome, FinishOutcome::Completed(_)));
        assert_eq!(
            h.methods.state_of("mi-1")["currentWeight"],
            json!(22.5)
        );
    }

    #[tokio::test]
    async fn multi_lift_instance_advances_exactly_once_per_session() {
        let h = harness(vec![wendler_instance("mi-5")]);
        let session = h
            .service
            .start_quick_session(NewSession {
                title: "531 day".to_string(),
                started_at: None,
                tags: vec![],
                notes: None,
                exercises: vec![
                    method_exercise("mi-5", Some(Lift::Squat)),
                    method_exercise("mi-5", Some(Lift::Bench)),
                ],
            })
            .await
            .unwrap();

        let mut edited = session.clone();
        record_all_planned(&mut edited, 5);
        h.service
            .update_session_snapshot(&session.id, edited.snapshot)
            .await
            .unwrap();

        h.service.finish_session(&session.id, None).await.unwrap();
        let state = h.methods.state_of("mi-5");
        assert_eq!(state["week"], json!(2));
        assert_eq!(state["cycle"], json!(1));
    }

    #[tokio::test]
    async fn instance_advancement_failure_does_not_fail_the_finish() {
        let mut methods = FakeMethodRepo::with(vec![bilbo_instance("mi-1")]);
        methods.fail_set_state = true;
        let h = harness_with(methods);

        let session = h
            .service
            .start_quick_session(NewSession {
                title: "Squat day".to_string(),
                started_at: None,
                tags: vec![],
                notes: None,
                exercises: vec![method_exercise("mi-1", None)],
            })
            .await
            .unwrap();

        let mut edited = session.clone();
        record_all_planned(&mut edited, 16);
        h.service
            .update_session_snapshot(&session.id, edited.snapshot)
            .await
            .unwrap();

        let outcome = h.service.finish_session(&session.id, None).await.unwrap();
        assert!(matches!(outcome, FinishOutcome::Completed(_)));
        // Cache kept its stale value; reconciliation still derives the truth.
        assert_eq!(h.methods.state_of("mi-1")["currentWeight"], json!(20));
    }

    #[tokio::test]
    async fn finishing_twice_is_rejected() {
        let h = harness(vec![bilbo_instance("mi-1")]);
        let session = h
            .service
            .start_quick_session(NewSession {
                title: "Squat day".to_string(),
                started_at: None,
                tags: vec![],
                notes: Some("solid".to_string()),
                exercises: vec![],
            })
            .await
            .unwrap();

        h.service.finish_session(&session.id, None).await.unwrap();
        let err = h.service.finish_session(&session.id, None).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn duplicate_plans_from_reconciled_state() {
        let h = harness(vec![bilbo_instance("mi-1")]);
        let session = h
            .service
            .start_quick_session(NewSession {
                title: "Squat day".to_string(),
                started_at: None,
                tags: vec!["gym".to_string()],
                notes: None,
                exercises: vec![method_exercise("mi-1", None)],
            })
            .await
            .unwrap();
        assert_eq!(session.snapshot.exercises[0].planned_sets[0].weight, dec!(20));

        let mut edited = session.clone();
        record_all_planned(&mut edited, 16);
        h.service
            .update_session_snapshot(&session.id, edited.snapshot)
            .await
            .unwrap();
        h.service.finish_session(&session.id, None).await.unwrap();

        let copy = h.service.duplicate_session(&session.id, None).await.unwrap();
        assert_eq!(copy.title, "Squat day");
        assert_eq!(copy.tags, vec!["gym".to_string()]);
        let exercise = &copy.snapshot.exercises[0];
        assert!(exercise.performed_sets.is_empty());
        assert_eq!(exercise.planned_sets[0].weight, dec!(22.5));
    }

    #[tokio::test]
    async fn mutations_require_a_signed_in_user() {
        let sessions = Arc::new(FakeSessionRepo::empty());
        let service = SessionService::new(
            sessions,
            Arc::new(FakeMethodRepo::with(vec![])),
            Arc::new(FakeTemplateRepo),
            Arc::new(StaticUserContext::signed_out()),
        );

        let err = service
            .start_quick_session(NewSession {
                title: "Quick".to_string(),
                started_at: None,
                tags: vec![],
                notes: None,
                exercises: vec![],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unauthenticated));
    }
}
