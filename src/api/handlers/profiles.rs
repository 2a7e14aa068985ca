//! Profile handlers: own profile, public profile.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::api::extract::{JsonBody, PathParams};
use crate::api::identity::Actor;
use crate::app_state::AppState;
use crate::domain::{Profile, ProfileUpdate, Uid};
use crate::error::{ErrorResponse, MarketError};
use crate::service::PublicProfile;

/// `GET /me/profile`: The caller's profile.
///
/// # Errors
///
/// Returns [`MarketError::ProfileNotFound`] before the first save.
#[utoipa::path(
    get,
    path = "/api/v1/me/profile",
    tag = "Profiles",
    summary = "My profile",
    responses(
        (status = 200, description = "Profile", body = Profile),
        (status = 401, description = "Missing identity", body = ErrorResponse),
        (status = 404, description = "No profile yet", body = ErrorResponse),
    )
)]
pub async fn my_profile(
    State(state): State<AppState>,
    Actor(actor): Actor,
) -> Result<impl IntoResponse, MarketError> {
    Ok(Json(state.market_service.get_profile(&actor).await?))
}

/// `PUT /me/profile`: Create or replace the caller's profile.
///
/// # Errors
///
/// Returns [`MarketError::Validation`] for an incomplete profile.
#[utoipa::path(
    put,
    path = "/api/v1/me/profile",
    tag = "Profiles",
    summary = "Save my profile",
    description = "Replaces every editable field. `isVerified` is kept from the stored profile and cannot be set here.",
    request_body = ProfileUpdate,
    responses(
        (status = 200, description = "Saved profile", body = Profile),
        (status = 400, description = "Invalid profile", body = ErrorResponse),
        (status = 401, description = "Missing identity", body = ErrorResponse),
    )
)]
pub async fn save_profile(
    State(state): State<AppState>,
    Actor(actor): Actor,
    JsonBody(req): JsonBody<ProfileUpdate>,
) -> Result<impl IntoResponse, MarketError> {
    Ok(Json(state.market_service.update_profile(&actor, req).await?))
}

/// `GET /users/{uid}`: Someone's public profile and work history.
///
/// # Errors
///
/// Returns [`MarketError::ProfileNotFound`] if the user has no profile.
#[utoipa::path(
    get,
    path = "/api/v1/users/{uid}",
    tag = "Profiles",
    summary = "Public profile",
    description = "The user's profile with the jobs they completed, most recent first.",
    params(
        ("uid" = String, Path, description = "User id"),
    ),
    responses(
        (status = 200, description = "Public profile", body = PublicProfile),
        (status = 404, description = "Profile not found", body = ErrorResponse),
    )
)]
pub async fn public_profile(
    State(state): State<AppState>,
    PathParams(uid): PathParams<String>,
) -> Result<impl IntoResponse, MarketError> {
    let uid = Uid::new(uid);
    Ok(Json(state.market_service.public_profile(&uid).await?))
}

/// Profile routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/me/profile", get(my_profile).put(save_profile))
        .route("/users/{uid}", get(public_profile))
}
