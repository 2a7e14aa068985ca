//! WebSocket layer: connection handling, message routing, subscriptions.
//!
//! The WebSocket endpoint at `/ws` streams [`crate::domain::MarketEvent`]s
//! for subscribed jobs and, on request, the caller's live home view.

pub mod connection;
pub mod handler;
pub mod messages;
pub mod subscription;
