use std::sync::Arc;

use crate::artifacts::ArtifactStore;
use crate::config::AppConfig;
use crate::engine::Dispatcher;
use crate::uploads::UploadStore;

/// Shared application state available to all Axum handlers via
/// `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already
/// `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: atelier_db::DbPool,
    /// Immutable application configuration.
    pub config: Arc<AppConfig>,
    /// Shared HTTP client for all provider calls (connection pooling).
    pub http: reqwest::Client,
    /// Background job dispatcher.
    pub dispatcher: Arc<Dispatcher>,
    /// Generated artifact storage.
    pub artifacts: Arc<ArtifactStore>,
    /// Temporary reference-image uploads.
    pub uploads: Arc<UploadStore>,
}
