//! Task store integration tests: creation, state machine guards, deletion.

use atelier_core::capability::{Capability, GenerationKind};
use atelier_core::task::{
    EditParams, FailureKind, ImageArtifact, SubmitterIdentity, TaskParams, TaskResult,
};
use atelier_core::types::DbId;
use atelier_db::models::status::TaskStatus;
use atelier_db::models::task::{CreateTask, TaskListQuery};
use atelier_db::repositories::TaskRepo;
use sqlx::SqlitePool;

async fn seed_account(pool: &SqlitePool) -> DbId {
    sqlx::query_scalar::<_, DbId>(
        "INSERT INTO accounts (name, edit_base_url, edit_api_key, api_key) \
         VALUES ('task-test', 'https://edit.example', 'ek', 'k') RETURNING id",
    )
    .fetch_one(pool)
    .await
    .expect("seed account")
}

fn edit_task(account_id: DbId, public_id: &str, parent: Option<DbId>) -> CreateTask {
    CreateTask {
        public_id: public_id.to_string(),
        account_id,
        capability: Capability::Edit,
        status: TaskStatus::Running,
        generation_kind: if parent.is_some() {
            GenerationKind::Continuation
        } else {
            GenerationKind::TextToImage
        },
        params: TaskParams::Edit(EditParams {
            prompt: "a lighthouse at dusk".into(),
            aspect_ratio: "1:1".into(),
            resolution: "1K".into(),
            reference_image_paths: Vec::new(),
        }),
        usage_consumed: None,
        parent_task_id: parent,
        submitted_by: SubmitterIdentity::Admin,
    }
}

fn image_result() -> TaskResult {
    TaskResult::Images {
        artifacts: vec![ImageArtifact {
            location: "data/artifacts/edit-1/image_0.png".into(),
            index: 0,
        }],
    }
}

#[sqlx::test]
async fn create_round_trips_typed_payloads(pool: SqlitePool) {
    let account = seed_account(&pool).await;
    let task = TaskRepo::create(&pool, &edit_task(account, "edit-aaaa", None))
        .await
        .unwrap();

    assert_eq!(task.status(), Some(TaskStatus::Running));
    assert_eq!(task.capability(), Some(Capability::Edit));
    assert_eq!(task.submitter(), SubmitterIdentity::Admin);
    assert_eq!(task.params.prompt(), Some("a lighthouse at dusk"));

    let fetched = TaskRepo::find_by_public_id(&pool, "edit-aaaa")
        .await
        .unwrap()
        .expect("task exists");
    assert_eq!(fetched.id, task.id);
}

#[sqlx::test]
async fn terminal_write_applies_exactly_once(pool: SqlitePool) {
    let account = seed_account(&pool).await;
    let task = TaskRepo::create(&pool, &edit_task(account, "edit-bbbb", None))
        .await
        .unwrap();

    assert!(TaskRepo::mark_succeeded(&pool, task.id, &image_result(), 1)
        .await
        .unwrap());

    // A second terminal write of either flavor must not land.
    assert!(!TaskRepo::mark_succeeded(&pool, task.id, &image_result(), 1)
        .await
        .unwrap());
    assert!(
        !TaskRepo::mark_failed(&pool, task.id, FailureKind::Internal, "late failure")
            .await
            .unwrap()
    );

    let task = TaskRepo::find_by_id(&pool, task.id).await.unwrap().unwrap();
    assert_eq!(task.status(), Some(TaskStatus::Succeeded));
    assert_eq!(task.usage_consumed, Some(1));
    assert!(task.error_message.is_none());
}

#[sqlx::test]
async fn mark_running_only_moves_queued_tasks(pool: SqlitePool) {
    let account = seed_account(&pool).await;
    let mut input = edit_task(account, "edit-cccc", None);
    input.status = TaskStatus::Queued;
    let task = TaskRepo::create(&pool, &input).await.unwrap();

    assert!(TaskRepo::mark_running(&pool, task.id).await.unwrap());
    // Already running — no second transition.
    assert!(!TaskRepo::mark_running(&pool, task.id).await.unwrap());

    assert!(
        TaskRepo::mark_failed(&pool, task.id, FailureKind::ProviderRejected, "boom")
            .await
            .unwrap()
    );
    // Terminal — running is unreachable again.
    assert!(!TaskRepo::mark_running(&pool, task.id).await.unwrap());
}

#[sqlx::test]
async fn terminal_write_after_delete_is_a_noop(pool: SqlitePool) {
    let account = seed_account(&pool).await;
    let task = TaskRepo::create(&pool, &edit_task(account, "edit-dddd", None))
        .await
        .unwrap();

    assert!(TaskRepo::delete(&pool, task.id).await.unwrap());

    // The dispatcher may still be in flight; its terminal write must be a
    // quiet no-op, not an error.
    assert!(!TaskRepo::mark_succeeded(&pool, task.id, &image_result(), 1)
        .await
        .unwrap());
    assert!(
        !TaskRepo::mark_failed(&pool, task.id, FailureKind::ProviderUnreachable, "gone")
            .await
            .unwrap()
    );
}

#[sqlx::test]
async fn children_count_tracks_continuations(pool: SqlitePool) {
    let account = seed_account(&pool).await;
    let root = TaskRepo::create(&pool, &edit_task(account, "edit-root", None))
        .await
        .unwrap();
    assert_eq!(TaskRepo::children_count(&pool, root.id).await.unwrap(), 0);

    TaskRepo::create(&pool, &edit_task(account, "edit-kid1", Some(root.id)))
        .await
        .unwrap();
    TaskRepo::create(&pool, &edit_task(account, "edit-kid2", Some(root.id)))
        .await
        .unwrap();

    assert_eq!(TaskRepo::children_count(&pool, root.id).await.unwrap(), 2);
}

#[sqlx::test]
async fn list_filters_by_status(pool: SqlitePool) {
    let account = seed_account(&pool).await;
    let a = TaskRepo::create(&pool, &edit_task(account, "edit-list1", None))
        .await
        .unwrap();
    TaskRepo::create(&pool, &edit_task(account, "edit-list2", None))
        .await
        .unwrap();
    TaskRepo::mark_succeeded(&pool, a.id, &image_result(), 1)
        .await
        .unwrap();

    let all = TaskRepo::list(&pool, "edit", &TaskListQuery::default())
        .await
        .unwrap();
    assert_eq!(all.len(), 2);

    let succeeded = TaskRepo::list(
        &pool,
        "edit",
        &TaskListQuery {
            status: Some("succeeded".into()),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(succeeded.len(), 1);
    assert_eq!(succeeded[0].public_id, "edit-list1");

    let none = TaskRepo::list(&pool, "video", &TaskListQuery::default())
        .await
        .unwrap();
    assert!(none.is_empty());
}
