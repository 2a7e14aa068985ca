//! Actor identity extractor.
//!
//! Authentication happens upstream. The auth proxy forwards the verified
//! user id in the `x-user-uid` header, and handlers take an [`Actor`] to
//! require it.

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;

use crate::domain::Uid;
use crate::error::MarketError;

/// Header carrying the caller's identity.
pub const USER_UID_HEADER: &str = "x-user-uid";

/// The authenticated caller. Rejects with [`MarketError::MissingIdentity`]
/// (401) when the header is absent or blank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor(pub Uid);

impl Actor {
    /// The caller's identity.
    #[must_use]
    pub const fn uid(&self) -> &Uid {
        &self.0
    }
}

impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = MarketError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        uid_from_headers(&parts.headers)
            .map(Self)
            .ok_or(MarketError::MissingIdentity)
    }
}

/// Reads the caller's uid from `x-user-uid`, if present and not blank.
#[must_use]
pub fn uid_from_headers(headers: &HeaderMap) -> Option<Uid> {
    headers
        .get(USER_UID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|uid| !uid.is_empty())
        .map(Uid::new)
}
