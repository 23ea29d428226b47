//! Routes for the `/edits` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::edits;
use crate::state::AppState;

/// Routes mounted at `/edits`.
///
/// ```text
/// GET    /                         -> list_edit_tasks
/// POST   /                         -> create_edit_task
/// POST   /{public_id}/continue     -> continue_edit_task
/// GET    /{public_id}              -> get_edit_task
/// DELETE /{public_id}              -> delete_edit_task
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(edits::list_edit_tasks).post(edits::create_edit_task))
        .route(
            "/{public_id}",
            get(edits::get_edit_task).delete(edits::delete_edit_task),
        )
        .route("/{public_id}/continue", post(edits::continue_edit_task))
}
