//! Store-level tests against a temporary on-disk database.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::json;
use tempfile::TempDir;

use liftlog_core::methods::{
    MethodInstance, MethodInstanceRepositoryTrait, MethodKind, MethodScope, PerformedSet,
};
use liftlog_core::sessions::{
    ExerciseRef, ExerciseSource, MethodSource, SessionExercise, SessionRepositoryTrait,
    SessionSnapshot, WorkoutSession,
};
use liftlog_core::sync::{
    RemoteChange, SyncEntity, SyncOperation, SyncRepositoryTrait,
};
use liftlog_core::templates::{TemplateRepositoryTrait, WorkoutTemplate};
use liftlog_core::Error;
use rust_decimal_macros::dec;

use crate::db::{create_pool, DbPool, WriteHandle};
use crate::methods::{MethodInstanceDB, MethodInstanceRepository};
use crate::sessions::SessionRepository;
use crate::sync::SyncRepository;
use crate::templates::TemplateRepository;

struct TestStore {
    pool: Arc<DbPool>,
    writer: WriteHandle,
    _dir: TempDir,
}

fn test_store() -> TestStore {
    let dir = tempfile::tempdir().expect("create temp dir");
    let url = dir
        .path()
        .join("liftlog.db")
        .to_str()
        .expect("utf-8 path")
        .to_string();
    let pool = create_pool(&url).expect("create pool");
    let writer = WriteHandle::spawn(&url).expect("spawn writer");
    TestStore {
        pool,
        writer,
        _dir: dir,
    }
}

impl TestStore {
    fn methods(&self) -> MethodInstanceRepository {
        MethodInstanceRepository::new(self.pool.clone(), self.writer.clone())
    }

    fn sessions(&self) -> SessionRepository {
        SessionRepository::new(self.pool.clone(), self.writer.clone())
    }

    fn templates(&self) -> TemplateRepository {
        TemplateRepository::new(self.pool.clone(), self.writer.clone())
    }

    fn sync(&self) -> SyncRepository {
        SyncRepository::new(self.pool.clone(), self.writer.clone())
    }
}

fn bilbo_instance(id: &str, user_id: &str) -> MethodInstance {
    let now = Utc::now().to_rfc3339();
    MethodInstance {
        id: id.to_string(),
        user_id: user_id.to_string(),
        kind: MethodKind::Bilbo,
        scope: MethodScope::SingleExercise,
        name: "Bilbo squat".to_string(),
        config: json!({ "startWeight": 20.0, "incrementWeight": 2.5, "resetAtReps": 15 }),
        state: json!({ "currentWeight": 20.0 }),
        archived: false,
        created_at: now.clone(),
        updated_at: now,
    }
}

fn completed_session(id: &str, user_id: &str, instance_id: &str) -> WorkoutSession {
    let now = Utc::now();
    WorkoutSession {
        id: id.to_string(),
        user_id: user_id.to_string(),
        title: "Squat day".to_string(),
        template_id: None,
        started_at: now - Duration::hours(1),
        ended_at: Some(now),
        tags: vec!["gym".to_string()],
        snapshot: SessionSnapshot {
            exercises: vec![SessionExercise {
                id: "e1".to_string(),
                exercise: ExerciseRef::Custom {
                    name: "squat".to_string(),
                },
                source: ExerciseSource::Method(MethodSource {
                    instance_id: instance_id.to_string(),
                    kind: MethodKind::Bilbo,
                    binding: None,
                    config: json!({ "startWeight": 20.0 }),
                    state_at_start: json!({ "currentWeight": 20.0 }),
                }),
                planned_sets: vec![],
                performed_sets: vec![PerformedSet {
                    id: "e1:set-1".to_string(),
                    weight: dec!(20),
                    reps: 17,
                    rir: None,
                    done: Some(true),
                }],
            notes: None,
            }],
            notes: None,
        },
        created_at: now.to_rfc3339(),
        updated_at: now.to_rfc3339(),
    }
}

#[tokio::test]
async fn method_instance_crud_round_trip() {
    let store = test_store();
    let repo = store.methods();

    let inserted = repo
        .insert_method_instance(bilbo_instance("mi-1", "u1"))
        .await
        .unwrap();
    assert_eq!(inserted.kind, MethodKind::Bilbo);

    let fetched = repo.get_method_instance("u1", "mi-1").unwrap();
    assert_eq!(fetched.name, "Bilbo squat");
    assert_eq!(fetched.config["incrementWeight"], json!(2.5));

    let mut update = fetched.clone();
    update.name = "Bilbo front squat".to_string();
    let updated = repo.update_method_instance(update).await.unwrap();
    assert_eq!(updated.name, "Bilbo front squat");

    // Rows belong to their owner.
    assert!(matches!(
        repo.get_method_instance("someone-else", "mi-1"),
        Err(Error::NotFound(_))
    ));

    repo.soft_delete_method_instance("u1", "mi-1").await.unwrap();
    assert!(matches!(
        repo.get_method_instance("u1", "mi-1"),
        Err(Error::NotFound(_))
    ));
    assert!(repo.list_method_instances("u1", true).unwrap().is_empty());
}

#[tokio::test]
async fn every_mutation_appends_an_outbox_item_in_order() {
    let store = test_store();
    let repo = store.methods();
    let sync = store.sync();

    let instance = repo
        .insert_method_instance(bilbo_instance("mi-1", "u1"))
        .await
        .unwrap();
    repo.set_method_state("u1", &instance.id, json!({ "currentWeight": 22.5 }))
        .await
        .unwrap();
    repo.soft_delete_method_instance("u1", &instance.id)
        .await
        .unwrap();

    let pending = sync.list_pending_outbox("u1").unwrap();
    let ops: Vec<SyncOperation> = pending.iter().map(|item| item.op).collect();
    assert_eq!(
        ops,
        vec![
            SyncOperation::Create,
            SyncOperation::Update,
            SyncOperation::Delete,
        ]
    );
    assert!(pending.iter().all(|item| item.entity_id == "mi-1"));
    // Deletes carry no payload; the others carry the full row.
    assert!(pending[0].payload.is_some());
    assert!(pending[2].payload.is_none());
    assert_eq!(
        pending[1].payload.as_ref().unwrap()["state"],
        json!("{\"currentWeight\":22.5}")
    );
}

#[tokio::test]
async fn completed_sessions_are_found_by_bound_instance() {
    let store = test_store();
    let repo = store.sessions();

    repo.insert_session(completed_session("s1", "u1", "mi-1"))
        .await
        .unwrap();
    // Same instance id substring in another user's data must not leak.
    repo.insert_session(completed_session("s2", "u2", "mi-1"))
        .await
        .unwrap();

    let found = repo
        .list_completed_sessions_for_instance("u1", "mi-1")
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, "s1");
    assert_eq!(found[0].snapshot.exercises.len(), 1);

    let none = repo
        .list_completed_sessions_for_instance("u1", "mi-other")
        .unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn confirm_removes_the_item_and_stamps_last_synced_at() {
    let store = test_store();
    let repo = store.methods();
    let sync = store.sync();

    repo.insert_method_instance(bilbo_instance("mi-1", "u1"))
        .await
        .unwrap();
    let pending = sync.list_pending_outbox("u1").unwrap();
    assert_eq!(pending.len(), 1);

    sync.confirm_outbox_item(&pending[0]).await.unwrap();
    assert!(sync.list_pending_outbox("u1").unwrap().is_empty());
    assert!(!sync.has_pending_outbox("u1", "mi-1").unwrap());

    use crate::schema::method_instances::dsl::*;
    use diesel::prelude::*;
    let mut conn = crate::db::get_connection(&store.pool).unwrap();
    let synced: Option<String> = method_instances
        .find("mi-1")
        .select(last_synced_at)
        .first(&mut conn)
        .unwrap();
    assert!(synced.is_some());
}

#[tokio::test]
async fn failures_keep_the_item_with_error_and_backoff() {
    let store = test_store();
    let repo = store.methods();
    let sync = store.sync();

    repo.insert_method_instance(bilbo_instance("mi-1", "u1"))
        .await
        .unwrap();
    let item = sync.list_pending_outbox("u1").unwrap().remove(0);

    sync.record_outbox_failure(&item.id, "connection reset".to_string(), 10)
        .await
        .unwrap();
    sync.record_outbox_failure(&item.id, "server error".to_string(), 20)
        .await
        .unwrap();

    let pending = sync.list_pending_outbox("u1").unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].attempt_count, 2);
    assert_eq!(pending[0].last_error.as_deref(), Some("server error"));
    assert!(pending[0].next_retry_at.is_some());
}

#[tokio::test]
async fn applying_the_same_remote_change_twice_is_idempotent() {
    let store = test_store();
    let repo = store.methods();
    let sync = store.sync();

    let row = MethodInstanceDB::from_domain(&bilbo_instance("mi-9", "u1")).unwrap();
    let change = RemoteChange {
        entity_id: "mi-9".to_string(),
        updated_at: Utc::now().to_rfc3339(),
        payload: serde_json::to_value(&row).unwrap(),
    };

    assert!(sync
        .apply_remote_change("u1", SyncEntity::MethodInstance, change.clone())
        .await
        .unwrap());
    assert!(sync
        .apply_remote_change("u1", SyncEntity::MethodInstance, change)
        .await
        .unwrap());

    let instances = repo.list_method_instances("u1", true).unwrap();
    assert_eq!(instances.len(), 1);
    assert_eq!(instances[0].name, "Bilbo squat");
}

#[tokio::test]
async fn pull_skips_entities_with_pending_local_mutations() {
    let store = test_store();
    let repo = store.methods();
    let sync = store.sync();

    repo.insert_method_instance(bilbo_instance("mi-1", "u1"))
        .await
        .unwrap();

    let mut remote = MethodInstanceDB::from_domain(&bilbo_instance("mi-1", "u1")).unwrap();
    remote.name = "Remote rename".to_string();
    let applied = sync
        .apply_remote_change(
            "u1",
            SyncEntity::MethodInstance,
            RemoteChange {
                entity_id: "mi-1".to_string(),
                updated_at: Utc::now().to_rfc3339(),
                payload: serde_json::to_value(&remote).unwrap(),
            },
        )
        .await
        .unwrap();

    assert!(!applied);
    let local = repo.get_method_instance("u1", "mi-1").unwrap();
    assert_eq!(local.name, "Bilbo squat");
}

#[tokio::test]
async fn checkpoints_upsert_per_user_and_entity() {
    let store = test_store();
    let sync = store.sync();

    assert_eq!(
        sync.get_checkpoint("u1", SyncEntity::WorkoutSession).unwrap(),
        None
    );

    sync.set_checkpoint("u1", SyncEntity::WorkoutSession, "2026-08-01T10:00:00Z".to_string())
        .await
        .unwrap();
    sync.set_checkpoint("u1", SyncEntity::WorkoutSession, "2026-08-02T10:00:00Z".to_string())
        .await
        .unwrap();

    assert_eq!(
        sync.get_checkpoint("u1", SyncEntity::WorkoutSession)
            .unwrap()
            .as_deref(),
        Some("2026-08-02T10:00:00Z")
    );
    assert_eq!(
        sync.get_checkpoint("u2", SyncEntity::WorkoutSession).unwrap(),
        None
    );
}

#[tokio::test]
async fn template_round_trip_preserves_items() {
    let store = test_store();
    let repo = store.templates();
    let now = Utc::now().to_rfc3339();

    let template = WorkoutTemplate {
        id: "t1".to_string(),
        user_id: "u1".to_string(),
        name: "Push day".to_string(),
        items: serde_json::from_value(json!([
            {
                "exercise": { "type": "custom", "name": "bench" },
                "source": { "type": "method", "instanceId": "mi-5", "binding": "bench" }
            },
            {
                "exercise": { "type": "library", "id": "lib-42" },
                "source": { "type": "free" }
            }
        ]))
        .unwrap(),
        tags: vec!["push".to_string()],
        created_at: now.clone(),
        updated_at: now,
    };

    repo.insert_template(template).await.unwrap();
    let fetched = repo.get_template("u1", "t1").unwrap();
    assert_eq!(fetched.items.len(), 2);
    assert_eq!(fetched.tags, vec!["push".to_string()]);

    repo.soft_delete_template("u1", "t1").await.unwrap();
    assert!(repo.list_templates("u1").unwrap().is_empty());
}
