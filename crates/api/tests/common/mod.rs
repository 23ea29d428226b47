//! Shared test harness: a full router + state over a test database, with
//! the provider base URL pointed at a closed local port so any call that
//! escapes admission fails fast as "unreachable".

// Each integration test binary uses its own subset of these helpers.
#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, Response, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use sqlx::SqlitePool;
use tempfile::TempDir;
use tower::ServiceExt;

use atelier_api::artifacts::ArtifactStore;
use atelier_api::config::{
    AppConfig, DispatcherConfig, ProviderConfig, QuotaConfig, ServerConfig, StorageConfig,
};
use atelier_api::engine::Dispatcher;
use atelier_api::routes;
use atelier_api::state::AppState;
use atelier_api::uploads::UploadStore;
use atelier_core::quota::QuotaLimits;
use atelier_core::types::DbId;

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    _tmp: TempDir,
}

pub fn quota_config() -> QuotaConfig {
    QuotaConfig {
        limits: QuotaLimits::default(),
        utc_offset_hours: 8,
    }
}

pub fn test_config(tmp: &TempDir) -> AppConfig {
    AppConfig {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            cors_origins: vec!["http://localhost:5173".to_string()],
            request_timeout_secs: 30,
        },
        database_url: "sqlite::memory:".to_string(),
        quota: quota_config(),
        provider: ProviderConfig {
            // Nothing listens here; any call that escapes admission fails
            // fast as unreachable instead of hanging.
            api_base: "http://127.0.0.1:9".to_string(),
            submit_timeout_secs: 2,
            poll_timeout_secs: 2,
            generate_timeout_secs: 2,
            estimate_fps: 24,
        },
        dispatcher: DispatcherConfig {
            workers: 2,
            queue_depth: 16,
        },
        storage: StorageConfig {
            artifacts_dir: tmp.path().join("artifacts"),
            uploads_dir: tmp.path().join("uploads"),
        },
    }
}

pub fn build_test_app(pool: SqlitePool) -> TestApp {
    let tmp = TempDir::new().expect("tempdir");
    let config = test_config(&tmp);

    let artifacts = Arc::new(ArtifactStore::new(config.storage.artifacts_dir.clone()));
    let uploads = Arc::new(UploadStore::new(config.storage.uploads_dir.clone()));
    let dispatcher = Dispatcher::start(
        pool.clone(),
        Arc::clone(&artifacts),
        config.quota,
        config.dispatcher,
    );

    let state = AppState {
        pool,
        config: Arc::new(config),
        http: reqwest::Client::new(),
        dispatcher,
        artifacts,
        uploads,
    };

    let router = Router::new()
        .merge(routes::health::router())
        .nest("/api/v1", routes::api_routes())
        .with_state(state.clone());

    TestApp {
        router,
        state,
        _tmp: tmp,
    }
}

// ---------------------------------------------------------------------------
// Account seeding
// ---------------------------------------------------------------------------

/// Insert an account configured for every capability.
pub async fn seed_full_account(pool: &SqlitePool, name: &str) -> DbId {
    sqlx::query_scalar::<_, DbId>(
        "INSERT INTO accounts \
             (name, video_endpoint_id, image_endpoint_id, api_key, \
              edit_base_url, edit_api_key, edit_model) \
         VALUES (?, 'ep-video', 'ep-image', 'key', \
                 'http://127.0.0.1:9', 'edit-key', 'edit-model') \
         RETURNING id",
    )
    .bind(name)
    .fetch_one(pool)
    .await
    .expect("seed account")
}

/// Insert an account with only the capabilities named.
pub async fn seed_account(
    pool: &SqlitePool,
    name: &str,
    video: bool,
    image: bool,
    edit: bool,
) -> DbId {
    sqlx::query_scalar::<_, DbId>(
        "INSERT INTO accounts \
             (name, video_endpoint_id, image_endpoint_id, api_key, \
              edit_base_url, edit_api_key) \
         VALUES (?, ?, ?, 'key', ?, ?) \
         RETURNING id",
    )
    .bind(name)
    .bind(video.then_some("ep-video"))
    .bind(image.then_some("ep-image"))
    .bind(edit.then_some("http://127.0.0.1:9"))
    .bind(edit.then_some("edit-key"))
    .fetch_one(pool)
    .await
    .expect("seed account")
}

pub async fn deactivate_account(pool: &SqlitePool, id: DbId) {
    sqlx::query("UPDATE accounts SET is_active = 0 WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .expect("deactivate");
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn send_json(
    router: &Router,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let request = match body {
        Some(json) => Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
    };

    let response = router.clone().oneshot(request).await.expect("request");
    into_json(response).await
}

pub async fn into_json(response: Response<Body>) -> (StatusCode, serde_json::Value) {
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
    };
    (status, json)
}
