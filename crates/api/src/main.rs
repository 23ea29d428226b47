use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, HeaderValue, Method, StatusCode};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use atelier_api::artifacts::ArtifactStore;
use atelier_api::config::{AppConfig, ServerConfig};
use atelier_api::engine::Dispatcher;
use atelier_api::state::AppState;
use atelier_api::uploads::UploadStore;
use atelier_api::routes;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "atelier_api=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = AppConfig::from_env();
    tracing::info!(host = %config.server.host, port = config.server.port, "Loaded configuration");

    // --- Storage directories ---
    for dir in [&config.storage.artifacts_dir, &config.storage.uploads_dir] {
        tokio::fs::create_dir_all(dir)
            .await
            .unwrap_or_else(|err| panic!("Failed to create {}: {err}", dir.display()));
    }
    if let Some(db_path) = config.database_url.strip_prefix("sqlite://") {
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .expect("Failed to create the database directory");
            }
        }
    }

    // --- Database ---
    let pool = atelier_db::create_pool(&config.database_url)
        .await
        .expect("Failed to open the database");
    atelier_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    atelier_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database ready");

    // --- Shared HTTP client for provider calls ---
    let http = reqwest::Client::new();

    // --- Stores ---
    let artifacts = Arc::new(ArtifactStore::new(config.storage.artifacts_dir.clone()));
    let uploads = Arc::new(UploadStore::new(config.storage.uploads_dir.clone()));

    // --- Dispatcher ---
    let dispatcher = Dispatcher::start(
        pool.clone(),
        Arc::clone(&artifacts),
        config.quota,
        config.dispatcher,
    );

    // --- Router ---
    let cors = build_cors_layer(&config.server);
    let request_timeout = Duration::from_secs(config.server.request_timeout_secs);
    let config = Arc::new(config);

    let state = AppState {
        pool,
        config: Arc::clone(&config),
        http,
        dispatcher: Arc::clone(&dispatcher),
        artifacts,
        uploads,
    };

    let request_id_header = HeaderName::from_static("x-request-id");
    let app = Router::new()
        .merge(routes::health::router())
        .nest("/api/v1", routes::api_routes())
        .layer(CatchPanicLayer::new())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        .layer(cors)
        .with_state(state);

    // --- Serve ---
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .expect("Invalid bind address");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind");
    tracing::info!(%addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // Workers finish their in-flight provider calls before exit.
    dispatcher.shutdown().await;
    tracing::info!("Shutdown complete");
}

fn build_cors_layer(config: &ServerConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
