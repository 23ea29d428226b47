use atelier_core::conversation::ChainError;
use atelier_core::error::CoreError;
use atelier_core::selection::AdmissionError;
use atelier_provider::ProviderError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps the domain error taxonomy (admission, chain, provider) plus
/// database and HTTP-specific variants. Implements [`IntoResponse`] to
/// produce consistent JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// The request was refused before any task record or provider call.
    #[error(transparent)]
    Admission(#[from] AdmissionError),

    /// A continuation's parent chain cannot be replayed.
    #[error(transparent)]
    Chain(#[from] ChainError),

    /// A provider call on the request path failed (video submission).
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// A domain validation error from `atelier_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A database error from sqlx.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The referenced entity does not exist.
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The request conflicts with existing state.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Admission(err) => match err {
                AdmissionError::AccountNotFound(_) => {
                    (StatusCode::NOT_FOUND, "ACCOUNT_NOT_FOUND", err.to_string())
                }
                AdmissionError::CapabilityMissing { .. } => (
                    StatusCode::BAD_REQUEST,
                    "CAPABILITY_MISSING",
                    err.to_string(),
                ),
                AdmissionError::NoAccountsConfigured(_) => (
                    StatusCode::BAD_REQUEST,
                    "NO_ELIGIBLE_ACCOUNT",
                    err.to_string(),
                ),
                AdmissionError::QuotaExhausted { .. } => (
                    StatusCode::TOO_MANY_REQUESTS,
                    "QUOTA_EXHAUSTED",
                    err.to_string(),
                ),
            },

            AppError::Chain(err) => (StatusCode::CONFLICT, "CHAIN_BROKEN", err.to_string()),

            AppError::Provider(err) => match err {
                ProviderError::Api { .. } => {
                    (StatusCode::BAD_GATEWAY, "PROVIDER_ERROR", err.to_string())
                }
                ProviderError::Unreachable(_) => (
                    StatusCode::BAD_GATEWAY,
                    "PROVIDER_UNREACHABLE",
                    err.to_string(),
                ),
            },

            AppError::Core(err) => match err {
                CoreError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
                }
                CoreError::Internal(msg) => {
                    tracing::error!(error = %msg, "Internal core error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "INTERNAL_ERROR",
                        "An internal error occurred".to_string(),
                    )
                }
            },

            AppError::Database(err) => classify_sqlx_error(err),

            AppError::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND", self.to_string()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Classify a sqlx error into an HTTP status, error code, and message.
///
/// - `RowNotFound` maps to 404.
/// - Unique constraint violations map to 409.
/// - Everything else maps to 500 with a sanitized message.
fn classify_sqlx_error(err: &sqlx::Error) -> (StatusCode, &'static str, String) {
    match err {
        sqlx::Error::RowNotFound => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            "Resource not found".to_string(),
        ),
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => (
            StatusCode::CONFLICT,
            "CONFLICT",
            "Duplicate value violates a unique constraint".to_string(),
        ),
        other => {
            tracing::error!(error = %other, "Database error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            )
        }
    }
}
