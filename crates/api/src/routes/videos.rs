//! Routes for the `/videos` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::videos;
use crate::state::AppState;

/// Routes mounted at `/videos`.
///
/// ```text
/// GET    /                     -> list_video_tasks
/// POST   /                     -> create_video_tasks
/// POST   /estimate             -> estimate_tokens
/// GET    /{public_id}          -> get_video_task (auto-sync)
/// POST   /{public_id}/sync     -> sync_video_task_handler
/// DELETE /{public_id}          -> delete_video_task
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(videos::list_video_tasks).post(videos::create_video_tasks))
        .route("/estimate", post(videos::estimate_tokens))
        .route(
            "/{public_id}",
            get(videos::get_video_task).delete(videos::delete_video_task),
        )
        .route("/{public_id}/sync", post(videos::sync_video_task_handler))
}
