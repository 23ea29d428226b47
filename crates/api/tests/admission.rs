//! End-to-end admission tests: requests are refused before any provider
//! call or task row, and the dispatcher writes exactly one terminal state.

mod common;

use std::time::Duration;

use atelier_core::capability::Capability;
use atelier_core::quota;
use atelier_db::repositories::UsageRepo;
use axum::http::StatusCode;
use chrono::Utc;
use serde_json::json;
use sqlx::SqlitePool;

use common::{build_test_app, seed_account, seed_full_account, send_json};

fn today() -> chrono::NaiveDate {
    quota::usage_day(Utc::now(), 8)
}

#[sqlx::test(migrations = "../db/migrations")]
async fn health_endpoint_responds(pool: SqlitePool) {
    let app = build_test_app(pool);
    let (status, body) = send_json(&app.router, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[sqlx::test(migrations = "../db/migrations")]
async fn video_estimate_matches_the_cost_model(pool: SqlitePool) {
    let app = build_test_app(pool);
    let (status, body) = send_json(
        &app.router,
        "POST",
        "/api/v1/videos/estimate?resolution=720p&ratio=16:9&duration=5&video_count=1",
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    // floor(1280 * 720 * 24 / 1024 * 5)
    assert_eq!(body["data"]["tokens"], 108_000);
}

#[sqlx::test(migrations = "../db/migrations")]
async fn video_submission_without_accounts_is_refused(pool: SqlitePool) {
    let app = build_test_app(pool);
    let (status, body) = send_json(
        &app.router,
        "POST",
        "/api/v1/videos",
        Some(json!({ "prompt": "a storm over the sea" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "NO_ELIGIBLE_ACCOUNT");
}

#[sqlx::test(migrations = "../db/migrations")]
async fn explicit_account_without_capability_is_refused(pool: SqlitePool) {
    let app = build_test_app(pool);
    // Image-only account: plenty of quota, no video endpoint.
    let account = seed_account(&app.state.pool, "image-only", false, true, false).await;

    let (status, body) = send_json(
        &app.router,
        "POST",
        "/api/v1/videos",
        Some(json!({ "prompt": "a storm", "account_id": account })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "CAPABILITY_MISSING");
}

#[sqlx::test(migrations = "../db/migrations")]
async fn video_admission_rejects_before_any_provider_call(pool: SqlitePool) {
    let app = build_test_app(pool);
    let account = seed_full_account(&app.state.pool, "nearly-spent").await;

    // Leave 1000 tokens — far less than the 108k a 5s/720p video needs.
    let limit = app.state.config.quota.limits.daily_video_tokens;
    UsageRepo::charge(&app.state.pool, account, today(), Capability::Video, limit - 1000)
        .await
        .unwrap();

    let (status, body) = send_json(
        &app.router,
        "POST",
        "/api/v1/videos",
        Some(json!({ "prompt": "a storm", "account_id": account })),
    )
    .await;

    // A provider call would have surfaced as 502 (nothing listens on the
    // test provider port); 429 proves admission rejected first.
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["code"], "QUOTA_EXHAUSTED");

    let tasks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tasks")
        .fetch_one(&app.state.pool)
        .await
        .unwrap();
    assert_eq!(tasks, 0, "no task row may exist for a refused request");
}

#[sqlx::test(migrations = "../db/migrations")]
async fn unreachable_video_vendor_creates_no_task(pool: SqlitePool) {
    let app = build_test_app(pool);
    seed_full_account(&app.state.pool, "healthy").await;

    let (status, body) = send_json(
        &app.router,
        "POST",
        "/api/v1/videos",
        Some(json!({ "prompt": "a storm" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["code"], "PROVIDER_UNREACHABLE");

    let tasks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tasks")
        .fetch_one(&app.state.pool)
        .await
        .unwrap();
    assert_eq!(tasks, 0);
}

#[sqlx::test(migrations = "../db/migrations")]
async fn accounts_report_remaining_quota(pool: SqlitePool) {
    let app = build_test_app(pool);
    let account = seed_full_account(&app.state.pool, "reported").await;
    UsageRepo::charge(&app.state.pool, account, today(), Capability::Image, 20)
        .await
        .unwrap();

    let (status, body) = send_json(&app.router, "GET", "/api/v1/accounts", None).await;
    assert_eq!(status, StatusCode::OK);

    let entry = &body["data"][0];
    assert_eq!(entry["account_id"], account);
    assert_eq!(entry["has_video"], true);
    assert_eq!(entry["images"]["used"], 20);
    let limit = app.state.config.quota.limits.daily_images;
    assert_eq!(entry["images"]["remaining"], limit - 20);
}

#[sqlx::test(migrations = "../db/migrations")]
async fn dispatched_image_task_fails_terminally_when_vendor_is_down(pool: SqlitePool) {
    let app = build_test_app(pool);
    let account = seed_full_account(&app.state.pool, "dispatching").await;

    let (status, body) = send_json(
        &app.router,
        "POST",
        "/api/v1/images",
        Some(json!({ "prompt": "a red fox" })),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["total"], 1);
    let public_id = body["data"][0]["task_id"].as_str().unwrap().to_string();
    assert_eq!(body["data"][0]["status"], "running");

    // The worker's terminal write lands exactly once, off the request path.
    let mut final_status = String::new();
    let mut failure_kind = serde_json::Value::Null;
    for _ in 0..50 {
        let (_, body) = send_json(
            &app.router,
            "GET",
            &format!("/api/v1/images/{public_id}"),
            None,
        )
        .await;
        final_status = body["data"]["status"].as_str().unwrap_or("").to_string();
        failure_kind = body["data"]["failure_kind"].clone();
        if final_status == "failed" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    assert_eq!(final_status, "failed");
    assert_eq!(failure_kind, "provider_unreachable");

    // Nothing was produced, so nothing was charged.
    let used = UsageRepo::used(&app.state.pool, account, today()).await.unwrap();
    assert_eq!(used.images, 0);
}

#[sqlx::test(migrations = "../db/migrations")]
async fn continuing_an_unfinished_edit_is_refused(pool: SqlitePool) {
    let app = build_test_app(pool);
    seed_full_account(&app.state.pool, "edits").await;

    // Create an edit task; the vendor is down, but the row exists in
    // `running` immediately.
    let (status, body) = send_json(
        &app.router,
        "POST",
        "/api/v1/edits",
        Some(json!({ "prompt": "draw a fox" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let public_id = body["data"]["task_id"].as_str().unwrap().to_string();

    let (status, body) = send_json(
        &app.router,
        "POST",
        &format!("/api/v1/edits/{public_id}/continue"),
        Some(json!({ "prompt": "add a hat" })),
    )
    .await;

    // Running or already failed — either way, not succeeded.
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CONFLICT");
}

#[sqlx::test(migrations = "../db/migrations")]
async fn deleting_a_continued_task_is_refused(pool: SqlitePool) {
    use atelier_core::capability::GenerationKind;
    use atelier_core::task::{EditParams, SubmitterIdentity, TaskParams};
    use atelier_db::models::status::TaskStatus;
    use atelier_db::models::task::CreateTask;
    use atelier_db::repositories::TaskRepo;

    let app = build_test_app(pool);
    let account = seed_full_account(&app.state.pool, "chained").await;

    let params = |prompt: &str| {
        TaskParams::Edit(EditParams {
            prompt: prompt.to_string(),
            aspect_ratio: "1:1".into(),
            resolution: "1K".into(),
            reference_image_paths: Vec::new(),
        })
    };

    let parent = TaskRepo::create(
        &app.state.pool,
        &CreateTask {
            public_id: "edit-parent".into(),
            account_id: account,
            capability: Capability::Edit,
            status: TaskStatus::Running,
            generation_kind: GenerationKind::TextToImage,
            params: params("a fox"),
            usage_consumed: None,
            parent_task_id: None,
            submitted_by: SubmitterIdentity::Admin,
        },
    )
    .await
    .unwrap();

    TaskRepo::create(
        &app.state.pool,
        &CreateTask {
            public_id: "edit-child".into(),
            account_id: account,
            capability: Capability::Edit,
            status: TaskStatus::Running,
            generation_kind: GenerationKind::Continuation,
            params: params("add a hat"),
            usage_consumed: None,
            parent_task_id: Some(parent.id),
            submitted_by: SubmitterIdentity::Admin,
        },
    )
    .await
    .unwrap();

    let (status, body) =
        send_json(&app.router, "DELETE", "/api/v1/edits/edit-parent", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("continuation"));

    // The child can go, then the parent.
    let (status, _) = send_json(&app.router, "DELETE", "/api/v1/edits/edit-child", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send_json(&app.router, "DELETE", "/api/v1/edits/edit-parent", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}
