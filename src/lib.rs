//! # geofeed-gateway
//!
//! REST API and WebSocket gateway for a geo-scoped local jobs marketplace.
//!
//! Posters publish jobs pinned to a location with a visibility radius;
//! nearby users discover them, bid, and exactly one bid is accepted. The
//! assigned bidder submits completion and the poster attests payment.
//!
//! ## Architecture
//!
//! ```text
//! Clients (HTTP, WebSocket)
//!     │
//!     ├── REST Handlers (api/)
//!     ├── WS Handler (ws/)
//!     │
//!     ├── MarketService, AcceptBidCoordinator (service/)
//!     ├── EventBus, lifecycle, feed & home view selection (domain/)
//!     │
//!     ├── RecordStore port + subscriptions (store/)
//!     │
//!     └── InMemoryStore | PostgresStore
//! ```
//!
//! Every mutation goes through an atomic [`store::WriteBatch`] whose
//! preconditions are re-checked at commit, so racing writers get
//! [`error::MarketError::Conflict`] instead of a lost update.

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod service;
pub mod store;
pub mod ws;
