//! Routes for the `/images` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::images;
use crate::state::AppState;

/// Routes mounted at `/images`.
///
/// ```text
/// GET    /                 -> list_image_tasks
/// POST   /                 -> create_image_tasks
/// POST   /estimate         -> estimate_images
/// GET    /{public_id}      -> get_image_task
/// DELETE /{public_id}      -> delete_image_task
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(images::list_image_tasks).post(images::create_image_tasks))
        .route("/estimate", post(images::estimate_images))
        .route(
            "/{public_id}",
            get(images::get_image_task).delete(images::delete_image_task),
        )
}
