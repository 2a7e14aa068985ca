//! Bid handlers: list, submit, accept, reject.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::dto::AcceptBidResponse;
use crate::api::extract::{JsonBody, PathParams};
use crate::api::identity::Actor;
use crate::app_state::AppState;
use crate::domain::{Bid, BidId, JobId, NewBid};
use crate::error::{ErrorResponse, MarketError};

/// `GET /jobs/{id}/bids`: Bids visible to the caller.
///
/// # Errors
///
/// Returns [`MarketError::JobNotFound`] if the job does not exist.
#[utoipa::path(
    get,
    path = "/api/v1/jobs/{id}/bids",
    tag = "Bids",
    summary = "List bids",
    description = "The poster sees every bid, oldest first. Anyone else sees only their own bid.",
    params(
        ("id" = uuid::Uuid, Path, description = "Job UUID"),
    ),
    responses(
        (status = 200, description = "Bids", body = Vec<Bid>),
        (status = 401, description = "Missing identity", body = ErrorResponse),
        (status = 404, description = "Job not found", body = ErrorResponse),
    )
)]
pub async fn list_bids(
    State(state): State<AppState>,
    Actor(actor): Actor,
    PathParams(id): PathParams<uuid::Uuid>,
) -> Result<impl IntoResponse, MarketError> {
    let bids = state
        .market_service
        .bids_for_job(&actor, JobId::from_uuid(id))
        .await?;
    Ok(Json(bids))
}

/// `POST /jobs/{id}/bids`: Submit a bid.
///
/// # Errors
///
/// Returns [`MarketError::Forbidden`] for the poster, a closed job or a
/// repeat bidder, and [`MarketError::Validation`] for a bad amount.
#[utoipa::path(
    post,
    path = "/api/v1/jobs/{id}/bids",
    tag = "Bids",
    summary = "Submit bid",
    description = "Places a `pending` bid on an open job. Each bidder may bid once per job.",
    params(
        ("id" = uuid::Uuid, Path, description = "Job UUID"),
    ),
    request_body = NewBid,
    responses(
        (status = 201, description = "Bid created", body = Bid),
        (status = 400, description = "Invalid amount", body = ErrorResponse),
        (status = 403, description = "Bidding not allowed", body = ErrorResponse),
        (status = 404, description = "Job not found", body = ErrorResponse),
        (status = 409, description = "Job closed or duplicate bid raced", body = ErrorResponse),
    )
)]
pub async fn submit_bid(
    State(state): State<AppState>,
    Actor(actor): Actor,
    PathParams(id): PathParams<uuid::Uuid>,
    JsonBody(req): JsonBody<NewBid>,
) -> Result<impl IntoResponse, MarketError> {
    let bid = state
        .market_service
        .submit_bid(&actor, JobId::from_uuid(id), req)
        .await?;
    Ok((StatusCode::CREATED, Json(bid)))
}

/// `POST /jobs/{id}/bids/{bid_id}/accept`: Accept one bid.
///
/// # Errors
///
/// Returns [`MarketError::Conflict`] when the job is no longer open or
/// another accept won, [`MarketError::Forbidden`] for anyone but the poster,
/// and [`MarketError::PreconditionFailed`] for a bid that is not pending.
#[utoipa::path(
    post,
    path = "/api/v1/jobs/{id}/bids/{bid_id}/accept",
    tag = "Bids",
    summary = "Accept bid",
    description = "Atomically accepts the bid, rejects every other bid and assigns the job to the bidder. Exactly one accept can succeed per job.",
    params(
        ("id" = uuid::Uuid, Path, description = "Job UUID"),
        ("bid_id" = uuid::Uuid, Path, description = "Bid UUID"),
    ),
    responses(
        (status = 200, description = "Bid accepted", body = AcceptBidResponse),
        (status = 403, description = "Not the poster", body = ErrorResponse),
        (status = 404, description = "Job or bid not found", body = ErrorResponse),
        (status = 409, description = "This job is no longer available", body = ErrorResponse),
        (status = 422, description = "Bid is not pending", body = ErrorResponse),
    )
)]
pub async fn accept_bid(
    State(state): State<AppState>,
    Actor(actor): Actor,
    PathParams((id, bid_id)): PathParams<(uuid::Uuid, uuid::Uuid)>,
) -> Result<impl IntoResponse, MarketError> {
    let outcome = state
        .market_service
        .accept_bid(&actor, JobId::from_uuid(id), BidId::from_uuid(bid_id))
        .await?;
    Ok(Json(AcceptBidResponse::from(outcome)))
}

/// `POST /jobs/{id}/bids/{bid_id}/reject`: Reject one bid.
///
/// # Errors
///
/// Returns [`MarketError::Forbidden`] for anyone but the poster and
/// [`MarketError::PreconditionFailed`] for an accepted bid.
#[utoipa::path(
    post,
    path = "/api/v1/jobs/{id}/bids/{bid_id}/reject",
    tag = "Bids",
    summary = "Reject bid",
    description = "Rejects a pending bid. Rejecting an already rejected bid succeeds without change.",
    params(
        ("id" = uuid::Uuid, Path, description = "Job UUID"),
        ("bid_id" = uuid::Uuid, Path, description = "Bid UUID"),
    ),
    responses(
        (status = 200, description = "Bid rejected", body = Bid),
        (status = 403, description = "Not the poster", body = ErrorResponse),
        (status = 404, description = "Job or bid not found", body = ErrorResponse),
        (status = 409, description = "Bid changed concurrently", body = ErrorResponse),
        (status = 422, description = "Bid already accepted", body = ErrorResponse),
    )
)]
pub async fn reject_bid(
    State(state): State<AppState>,
    Actor(actor): Actor,
    PathParams((id, bid_id)): PathParams<(uuid::Uuid, uuid::Uuid)>,
) -> Result<impl IntoResponse, MarketError> {
    let bid = state
        .market_service
        .reject_bid(&actor, JobId::from_uuid(id), BidId::from_uuid(bid_id))
        .await?;
    Ok(Json(bid))
}

/// Bid routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/jobs/{id}/bids", get(list_bids).post(submit_bid))
        .route("/jobs/{id}/bids/{bid_id}/accept", post(accept_bid))
        .route("/jobs/{id}/bids/{bid_id}/reject", post(reject_bid))
}
