//! Handlers for the `/accounts` resource.
//!
//! Account CRUD lives with the admin collaborator; this surface only
//! reports which accounts can serve which capability and how much budget
//! each has left today.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::error::AppResult;
use crate::response::ListResponse;
use crate::selection;
use crate::state::AppState;

/// GET /api/v1/accounts
///
/// Every active account with its capability flags and today's remaining
/// quota per budget.
pub async fn list_accounts(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let report = selection::accounts_with_quota(&state.pool, &state.config.quota).await?;
    Ok(Json(ListResponse::new(report)))
}
