//! Marketplace error types with HTTP status code mapping.
//!
//! [`MarketError`] is the central error type for the gateway. It is shared by
//! the record store, the service layer and the REST/WebSocket surface. Each
//! variant maps to a specific HTTP status code and structured JSON error
//! response.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::{BidId, JobId, Uid};

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 2004,
///     "message": "this job is no longer available: job is assigned",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code (see [`MarketError`] for ranges).
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Server-side error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category              | HTTP Status                          |
/// |-----------|-----------------------|--------------------------------------|
/// | 1000–1999 | Input / identity      | 400 / 401 / 403                      |
/// | 2000–2999 | State / Not Found     | 404 / 409 Conflict / 422             |
/// | 3000–3999 | Server / store        | 500 / 503                            |
#[derive(Debug, thiserror::Error)]
pub enum MarketError {
    /// Malformed input: inverted bid range, non-positive amount, missing
    /// required field.
    #[error("validation failed: {0}")]
    Validation(String),

    /// No actor identity was supplied with the request.
    #[error("missing actor identity")]
    MissingIdentity,

    /// Role or ownership violation (self-bid, non-owner mutation).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Job with the given ID was not found.
    #[error("job not found: {0}")]
    JobNotFound(JobId),

    /// Bid with the given ID was not found under the requested job.
    #[error("bid not found: {0}")]
    BidNotFound(BidId),

    /// The user has not created a profile.
    #[error("profile not found: {0}")]
    ProfileNotFound(Uid),

    /// State-machine guard violated: transition attempted from the wrong
    /// status.
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// A guard re-checked at commit time failed because another writer won
    /// the race. Never retried automatically.
    #[error("this job is no longer available: {0}")]
    Conflict(String),

    /// Record store unreachable or failing. Transient.
    #[error("store error: {0}")]
    Store(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl MarketError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::Validation(_) => 1001,
            Self::MissingIdentity => 1002,
            Self::Forbidden(_) => 1003,
            Self::JobNotFound(_) => 2001,
            Self::BidNotFound(_) => 2002,
            Self::ProfileNotFound(_) => 2005,
            Self::PreconditionFailed(_) => 2003,
            Self::Conflict(_) => 2004,
            Self::Store(_) => 3001,
            Self::Internal(_) => 3000,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::MissingIdentity => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::JobNotFound(_) | Self::BidNotFound(_) | Self::ProfileNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            Self::PreconditionFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns `true` for failures a collaborator may retry with backoff.
    ///
    /// Only store connectivity failures qualify. A [`MarketError::Conflict`]
    /// is final: retrying it could accept a stale bid.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Store(_))
    }
}

impl From<sqlx::Error> for MarketError {
    fn from(err: sqlx::Error) -> Self {
        Self::Store(err.to_string())
    }
}

impl From<serde_json::Error> for MarketError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<JsonRejection> for MarketError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for MarketError {
    fn from(rejection: PathRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for MarketError {
    fn from(rejection: QueryRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl IntoResponse for MarketError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: None,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn conflict_maps_to_409() {
        let err = MarketError::Conflict("job is assigned".to_string());
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(err.error_code(), 2004);
        assert!(err.to_string().contains("no longer available"));
    }

    #[test]
    fn guard_errors_are_client_errors() {
        assert_eq!(
            MarketError::PreconditionFailed(String::new()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            MarketError::Forbidden(String::new()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            MarketError::Validation(String::new()).status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn only_store_errors_are_transient() {
        assert!(MarketError::Store("timeout".to_string()).is_transient());
        assert!(!MarketError::Conflict("x".to_string()).is_transient());
        assert!(!MarketError::Internal("x".to_string()).is_transient());
    }

    #[test]
    fn missing_profile_is_404() {
        let err = MarketError::ProfileNotFound(Uid::new("ghost"));
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.error_code(), 2005);
    }

    #[test]
    fn into_response_sets_status() {
        let response = MarketError::JobNotFound(JobId::new()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
