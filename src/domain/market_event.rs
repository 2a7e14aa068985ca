//! Domain events reflecting marketplace state mutations.
//!
//! Every committed transition emits a [`MarketEvent`] through the
//! [`super::EventBus`]. Events are broadcast to WebSocket subscribers.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::job::Category;
use super::{BidId, JobId, Uid};

/// Domain event emitted after every committed mutation.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum MarketEvent {
    /// Emitted when a job is posted.
    JobCreated {
        /// Job identifier.
        job_id: JobId,
        /// Poster identity.
        poster_uid: Uid,
        /// Job category.
        category: Category,
        /// Visibility radius in kilometres.
        radius_km: u32,
        /// Creation timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Emitted when an open job is deleted by its poster.
    JobDeleted {
        /// Job identifier.
        job_id: JobId,
        /// Number of bids removed with it.
        removed_bids: usize,
        /// Deletion timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Emitted when a bid is submitted.
    BidSubmitted {
        /// Parent job.
        job_id: JobId,
        /// Bid identifier.
        bid_id: BidId,
        /// Bidder identity.
        bidder_uid: Uid,
        /// Offered amount.
        amount: f64,
        /// Submission timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Emitted when the poster rejects a single bid.
    BidRejected {
        /// Parent job.
        job_id: JobId,
        /// Bid identifier.
        bid_id: BidId,
        /// Rejection timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Emitted when the accept-bid transaction commits. The job is now
    /// `assigned`.
    BidAccepted {
        /// Parent job.
        job_id: JobId,
        /// Accepted bid.
        bid_id: BidId,
        /// Bidder now assigned to the job.
        bidder_uid: Uid,
        /// Sibling bids rejected in the same transaction or the sweep after.
        rejected_bids: usize,
        /// Assignment timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Emitted when the assigned bidder submits completion.
    JobCompleted {
        /// Job identifier.
        job_id: JobId,
        /// Identity that completed the job.
        completed_by: Uid,
        /// Completion timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Emitted when the poster attests payment.
    JobPaid {
        /// Job identifier.
        job_id: JobId,
        /// Payment attestation timestamp.
        timestamp: DateTime<Utc>,
    },
}

impl MarketEvent {
    /// Returns the job ID associated with this event.
    #[must_use]
    pub fn job_id(&self) -> JobId {
        match self {
            Self::JobCreated { job_id, .. }
            | Self::JobDeleted { job_id, .. }
            | Self::BidSubmitted { job_id, .. }
            | Self::BidRejected { job_id, .. }
            | Self::BidAccepted { job_id, .. }
            | Self::JobCompleted { job_id, .. }
            | Self::JobPaid { job_id, .. } => *job_id,
        }
    }

    /// Returns the event type as a static string slice.
    #[must_use]
    pub const fn event_type_str(&self) -> &'static str {
        match self {
            Self::JobCreated { .. } => "job_created",
            Self::JobDeleted { .. } => "job_deleted",
            Self::BidSubmitted { .. } => "bid_submitted",
            Self::BidRejected { .. } => "bid_rejected",
            Self::BidAccepted { .. } => "bid_accepted",
            Self::JobCompleted { .. } => "job_completed",
            Self::JobPaid { .. } => "job_paid",
        }
    }
}
