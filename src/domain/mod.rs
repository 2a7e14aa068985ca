//! Domain layer: records, lifecycle state machines, selection logic, events.
//!
//! Everything here is pure or in-process: job and bid records with their
//! transition guards, the geospatial visibility filter, feed and home view
//! selection, user profiles, and the event bus used to broadcast committed
//! changes.

pub mod bid;
pub mod event_bus;
pub mod feed;
pub mod geo;
pub mod home_view;
pub mod ids;
pub mod job;
pub mod market_event;
pub mod profile;

pub use bid::{Bid, BidStatus, NewBid};
pub use event_bus::EventBus;
pub use feed::FeedItem;
pub use geo::{Coordinates, Visibility};
pub use home_view::{Banner, HomeView, HomeViewEvent, HomeViewState};
pub use ids::{BidId, JobId, Uid};
pub use job::{BidRange, Category, Job, JobLocation, JobStatus, NewJob};
pub use market_event::MarketEvent;
pub use profile::{EmploymentStatus, Profile, ProfileUpdate};
