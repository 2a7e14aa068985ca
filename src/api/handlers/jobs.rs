//! Job handlers: create, get, delete, completion, payment.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::dto::{CompletionRequest, DeleteJobResponse};
use crate::api::extract::{JsonBody, PathParams};
use crate::api::identity::Actor;
use crate::app_state::AppState;
use crate::domain::{Job, JobId, NewJob};
use crate::error::{ErrorResponse, MarketError};

/// `POST /jobs`: Post a new job.
///
/// # Errors
///
/// Returns [`MarketError::Validation`] on malformed input.
#[utoipa::path(
    post,
    path = "/api/v1/jobs",
    tag = "Jobs",
    summary = "Post a job",
    description = "Creates an `open` job owned by the caller. The image must already be hosted; `expiresAt` must be in the future.",
    request_body = NewJob,
    responses(
        (status = 201, description = "Job created", body = Job),
        (status = 400, description = "Invalid job", body = ErrorResponse),
        (status = 401, description = "Missing identity", body = ErrorResponse),
    )
)]
pub async fn create_job(
    State(state): State<AppState>,
    Actor(actor): Actor,
    JsonBody(req): JsonBody<NewJob>,
) -> Result<impl IntoResponse, MarketError> {
    let job = state.market_service.create_job(&actor, req).await?;
    Ok((StatusCode::CREATED, Json(job)))
}

/// `GET /jobs/{id}`: Get one job.
///
/// # Errors
///
/// Returns [`MarketError::JobNotFound`] if the job does not exist.
#[utoipa::path(
    get,
    path = "/api/v1/jobs/{id}",
    tag = "Jobs",
    summary = "Get job",
    params(
        ("id" = uuid::Uuid, Path, description = "Job UUID"),
    ),
    responses(
        (status = 200, description = "Job record", body = Job),
        (status = 404, description = "Job not found", body = ErrorResponse),
    )
)]
pub async fn get_job(
    State(state): State<AppState>,
    PathParams(id): PathParams<uuid::Uuid>,
) -> Result<impl IntoResponse, MarketError> {
    let job = state.market_service.get_job(JobId::from_uuid(id)).await?;
    Ok(Json(job))
}

/// `DELETE /jobs/{id}`: Delete an open job and its bids.
///
/// # Errors
///
/// Returns [`MarketError::PreconditionFailed`] outside `open` and
/// [`MarketError::Forbidden`] for anyone but the poster.
#[utoipa::path(
    delete,
    path = "/api/v1/jobs/{id}",
    tag = "Jobs",
    summary = "Delete job",
    description = "Deletes an open job and every bid on it. Only the poster may delete, and only while the job is open.",
    params(
        ("id" = uuid::Uuid, Path, description = "Job UUID"),
    ),
    responses(
        (status = 200, description = "Job deleted", body = DeleteJobResponse),
        (status = 403, description = "Not the poster", body = ErrorResponse),
        (status = 404, description = "Job not found", body = ErrorResponse),
        (status = 409, description = "Job changed concurrently", body = ErrorResponse),
        (status = 422, description = "Job is not open", body = ErrorResponse),
    )
)]
pub async fn delete_job(
    State(state): State<AppState>,
    Actor(actor): Actor,
    PathParams(id): PathParams<uuid::Uuid>,
) -> Result<impl IntoResponse, MarketError> {
    let removed_bids = state
        .market_service
        .delete_job(&actor, JobId::from_uuid(id))
        .await?;
    Ok(Json(DeleteJobResponse { removed_bids }))
}

/// `POST /jobs/{id}/completion`: Submit proof of work.
///
/// # Errors
///
/// Returns [`MarketError::PreconditionFailed`] unless the job is `assigned`
/// and [`MarketError::Forbidden`] unless the caller is the assigned bidder.
#[utoipa::path(
    post,
    path = "/api/v1/jobs/{id}/completion",
    tag = "Jobs",
    summary = "Submit completion",
    description = "Moves an assigned job to `completed`. Only the assigned bidder may call it.",
    params(
        ("id" = uuid::Uuid, Path, description = "Job UUID"),
    ),
    request_body = CompletionRequest,
    responses(
        (status = 200, description = "Job completed", body = Job),
        (status = 400, description = "Missing image", body = ErrorResponse),
        (status = 403, description = "Not the assigned bidder", body = ErrorResponse),
        (status = 404, description = "Job not found", body = ErrorResponse),
        (status = 409, description = "Job changed concurrently", body = ErrorResponse),
        (status = 422, description = "Job is not assigned", body = ErrorResponse),
    )
)]
pub async fn submit_completion(
    State(state): State<AppState>,
    Actor(actor): Actor,
    PathParams(id): PathParams<uuid::Uuid>,
    JsonBody(req): JsonBody<CompletionRequest>,
) -> Result<impl IntoResponse, MarketError> {
    let job = state
        .market_service
        .submit_completion(&actor, JobId::from_uuid(id), &req.completion_image_url)
        .await?;
    Ok(Json(job))
}

/// `POST /jobs/{id}/payment`: Attest payment.
///
/// # Errors
///
/// Returns [`MarketError::PreconditionFailed`] unless the job is
/// `completed` and [`MarketError::Forbidden`] for anyone but the poster.
#[utoipa::path(
    post,
    path = "/api/v1/jobs/{id}/payment",
    tag = "Jobs",
    summary = "Mark paid",
    description = "Moves a completed job to `paid`. This is an attestation by the poster; no money moves.",
    params(
        ("id" = uuid::Uuid, Path, description = "Job UUID"),
    ),
    responses(
        (status = 200, description = "Job paid", body = Job),
        (status = 403, description = "Not the poster", body = ErrorResponse),
        (status = 404, description = "Job not found", body = ErrorResponse),
        (status = 409, description = "Job changed concurrently", body = ErrorResponse),
        (status = 422, description = "Job is not completed", body = ErrorResponse),
    )
)]
pub async fn mark_paid(
    State(state): State<AppState>,
    Actor(actor): Actor,
    PathParams(id): PathParams<uuid::Uuid>,
) -> Result<impl IntoResponse, MarketError> {
    let job = state
        .market_service
        .mark_paid(&actor, JobId::from_uuid(id))
        .await?;
    Ok(Json(job))
}

/// Job routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/jobs", post(create_job))
        .route("/jobs/{id}", get(get_job).delete(delete_job))
        .route("/jobs/{id}/completion", post(submit_completion))
        .route("/jobs/{id}/payment", post(mark_paid))
}
