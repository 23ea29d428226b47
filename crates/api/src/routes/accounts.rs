//! Routes for the `/accounts` resource.

use axum::routing::get;
use axum::Router;

use crate::handlers::accounts;
use crate::state::AppState;

/// Routes mounted at `/accounts`.
pub fn router() -> Router<AppState> {
    Router::new().route("/", get(accounts::list_accounts))
}
