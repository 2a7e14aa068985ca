//! Service layer: business logic orchestration.
//!
//! [`MarketService`] runs every marketplace operation against a
//! [`crate::store::RecordStore`] and emits events through the
//! [`super::domain::EventBus`]. [`AcceptBidCoordinator`] owns the atomic
//! accept-bid transaction.

pub mod accept_bid;
pub mod market_service;

pub use accept_bid::{AcceptBidCoordinator, AcceptOutcome};
pub use market_service::{BidWithJob, HomeWatch, MarketService, PublicProfile};
