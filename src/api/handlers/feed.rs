//! Discovery and per-viewer read models: feed, home view, "me" queries.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::api::dto::PositionParams;
use crate::api::extract::QueryParams;
use crate::api::identity::Actor;
use crate::app_state::AppState;
use crate::domain::{FeedItem, HomeView, Job};
use crate::error::{ErrorResponse, MarketError};
use crate::service::BidWithJob;

/// `GET /feed`: Open jobs within reach of the caller, nearest first.
///
/// # Errors
///
/// Returns [`MarketError::Validation`] for a half or out-of-range position.
#[utoipa::path(
    get,
    path = "/api/v1/feed",
    tag = "Discovery",
    summary = "Discovery feed",
    description = "Open, unexpired jobs whose radius covers the caller's position, sorted by distance. Without a position the feed is empty.",
    params(PositionParams),
    responses(
        (status = 200, description = "Visible jobs", body = Vec<FeedItem>),
        (status = 400, description = "Invalid position", body = ErrorResponse),
        (status = 401, description = "Missing identity", body = ErrorResponse),
    )
)]
pub async fn feed(
    State(state): State<AppState>,
    Actor(actor): Actor,
    QueryParams(params): QueryParams<PositionParams>,
) -> Result<impl IntoResponse, MarketError> {
    let position = params.position()?;
    let items = state.market_service.discovery_feed(&actor, position).await?;
    Ok(Json(items))
}

/// `GET /home`: The caller's home view.
///
/// # Errors
///
/// Returns [`MarketError::Validation`] for a half or out-of-range position.
#[utoipa::path(
    get,
    path = "/api/v1/home",
    tag = "Discovery",
    summary = "Home view",
    description = "Bidder and poster banners for assigned jobs, or the discovery feed newest-first when neither exists.",
    params(PositionParams),
    responses(
        (status = 200, description = "Home view", body = HomeView),
        (status = 400, description = "Invalid position", body = ErrorResponse),
        (status = 401, description = "Missing identity", body = ErrorResponse),
    )
)]
pub async fn home(
    State(state): State<AppState>,
    Actor(actor): Actor,
    QueryParams(params): QueryParams<PositionParams>,
) -> Result<impl IntoResponse, MarketError> {
    let position = params.position()?;
    let view = state.market_service.home_view(&actor, position).await?;
    Ok(Json(view))
}

/// `GET /me/jobs`: Jobs the caller posted.
///
/// # Errors
///
/// Returns [`MarketError::Store`] if the store is unreachable.
#[utoipa::path(
    get,
    path = "/api/v1/me/jobs",
    tag = "Me",
    summary = "My jobs",
    responses(
        (status = 200, description = "Posted jobs, newest first", body = Vec<Job>),
        (status = 401, description = "Missing identity", body = ErrorResponse),
    )
)]
pub async fn my_jobs(
    State(state): State<AppState>,
    Actor(actor): Actor,
) -> Result<impl IntoResponse, MarketError> {
    Ok(Json(state.market_service.my_jobs(&actor).await?))
}

/// `GET /me/bids`: Bids the caller submitted.
///
/// # Errors
///
/// Returns [`MarketError::Store`] if the store is unreachable.
#[utoipa::path(
    get,
    path = "/api/v1/me/bids",
    tag = "Me",
    summary = "My bids",
    responses(
        (status = 200, description = "Submitted bids with their jobs, newest first", body = Vec<BidWithJob>),
        (status = 401, description = "Missing identity", body = ErrorResponse),
    )
)]
pub async fn my_bids(
    State(state): State<AppState>,
    Actor(actor): Actor,
) -> Result<impl IntoResponse, MarketError> {
    Ok(Json(state.market_service.my_bids(&actor).await?))
}

/// `GET /me/history`: Jobs the caller completed.
///
/// # Errors
///
/// Returns [`MarketError::Store`] if the store is unreachable.
#[utoipa::path(
    get,
    path = "/api/v1/me/history",
    tag = "Me",
    summary = "Work history",
    description = "Completed and paid jobs the caller was assigned, most recent first.",
    responses(
        (status = 200, description = "Finished jobs", body = Vec<Job>),
        (status = 401, description = "Missing identity", body = ErrorResponse),
    )
)]
pub async fn work_history(
    State(state): State<AppState>,
    Actor(actor): Actor,
) -> Result<impl IntoResponse, MarketError> {
    Ok(Json(state.market_service.work_history(&actor).await?))
}

/// Discovery and "me" routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/feed", get(feed))
        .route("/home", get(home))
        .route("/me/jobs", get(my_jobs))
        .route("/me/bids", get(my_bids))
        .route("/me/history", get(work_history))
}
