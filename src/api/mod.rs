//! REST API layer: route handlers, DTOs, identity, and router composition.
//!
//! All resource endpoints are mounted under `/api/v1`. Every request that
//! acts on behalf of a user carries the caller's uid in `x-user-uid`.

pub mod dto;
pub mod extract;
pub mod handlers;
pub mod identity;
pub mod openapi;

use std::time::Duration;

use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::app_state::AppState;
use crate::ws::handler::ws_handler;
use openapi::ApiDoc;

/// Path the OpenAPI JSON document is served from.
pub const OPENAPI_JSON_PATH: &str = "/api-docs/openapi.json";

/// Builds the complete API router with all REST endpoints.
pub fn build_router() -> Router<AppState> {
    with_docs(
        Router::new()
            .nest("/api/v1", handlers::routes())
            .merge(handlers::system::routes()),
    )
}

#[cfg(feature = "swagger-ui")]
fn with_docs(router: Router<AppState>) -> Router<AppState> {
    router.merge(
        utoipa_swagger_ui::SwaggerUi::new("/swagger-ui").url(OPENAPI_JSON_PATH, ApiDoc::openapi()),
    )
}

#[cfg(not(feature = "swagger-ui"))]
fn with_docs(router: Router<AppState>) -> Router<AppState> {
    router.route(
        OPENAPI_JSON_PATH,
        get(|| async { axum::Json(ApiDoc::openapi()) }),
    )
}

/// The full application: REST, `/ws`, and the HTTP middleware stack.
pub fn app(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .merge(build_router())
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(TimeoutLayer::new(request_timeout))
        .with_state(state)
}
