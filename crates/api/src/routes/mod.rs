//! Route definitions, one module per resource.

pub mod accounts;
pub mod edits;
pub mod health;
pub mod images;
pub mod videos;

use axum::Router;

use crate::state::AppState;

/// All resource routes, mounted under `/api/v1`.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/videos", videos::router())
        .nest("/images", images::router())
        .nest("/edits", edits::router())
        .nest("/accounts", accounts::router())
}
