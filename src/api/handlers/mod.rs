//! REST endpoint handlers organized by resource.

pub mod bids;
pub mod feed;
pub mod jobs;
pub mod profiles;
pub mod system;

use axum::Router;

use crate::app_state::AppState;

/// Composes all resource routes under `/api/v1`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(jobs::routes())
        .merge(bids::routes())
        .merge(feed::routes())
        .merge(profiles::routes())
}
