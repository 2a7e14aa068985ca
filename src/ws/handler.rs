//! Axum WebSocket upgrade handler.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::HeaderMap;
use axum::response::IntoResponse;

use super::connection::run_connection;
use crate::api::identity::uid_from_headers;
use crate::app_state::AppState;

/// `GET /ws`: Upgrade HTTP connection to WebSocket.
///
/// Event subscriptions are open to anyone; `watch_home` needs the
/// `x-user-uid` header on the upgrade request.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let event_rx = state.event_bus.subscribe();
    let market_service = Arc::clone(&state.market_service);
    let viewer = uid_from_headers(&headers);

    ws.on_upgrade(move |socket| run_connection(socket, event_rx, market_service, viewer))
}
