//! Bid record and its lifecycle state machine.
//!
//! A bid is created `pending`. It leaves `pending` exactly once, either to
//! `accepted` (through the accept-bid transaction) or to `rejected`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{BidId, JobId, Uid};
use crate::error::MarketError;

/// Bid lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum BidStatus {
    /// Awaiting the poster's decision.
    Pending,
    /// Selected by the poster. Terminal.
    Accepted,
    /// Declined, explicitly or because a sibling was accepted. Terminal.
    Rejected,
}

impl BidStatus {
    /// Wire name of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }
}

/// Bidder-supplied fields of a new bid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct NewBid {
    /// Offered amount, `> 0`.
    pub amount: f64,
    /// Optional note to the poster.
    #[serde(default)]
    pub message: Option<String>,
}

/// A bid nested under one job. Field names are the wire contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Bid {
    /// Record identity.
    pub id: BidId,
    /// Parent job.
    pub job_id: JobId,
    /// Bidder identity.
    pub bidder_uid: Uid,
    /// Offered amount.
    pub amount: f64,
    /// Note to the poster; empty when none was given.
    #[serde(default)]
    pub message: String,
    /// Lifecycle status.
    pub status: BidStatus,
    /// Wall-clock creation time.
    pub created_at: DateTime<Utc>,
    /// Creation time as epoch milliseconds, for sorting.
    pub created_at_millis: i64,
}

impl Bid {
    /// Validates `new_bid` and builds a `pending` bid on `job_id`.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::Validation`] for a non-positive or non-finite
    /// amount, and [`MarketError::MissingIdentity`] for a blank bidder.
    pub fn create(
        job_id: JobId,
        bidder_uid: Uid,
        new_bid: NewBid,
        now: DateTime<Utc>,
    ) -> Result<Self, MarketError> {
        if bidder_uid.as_str().trim().is_empty() {
            return Err(MarketError::MissingIdentity);
        }
        if !new_bid.amount.is_finite() || new_bid.amount <= 0.0 {
            return Err(MarketError::Validation(
                "amount must be a positive number".to_string(),
            ));
        }
        Ok(Self {
            id: BidId::new(),
            job_id,
            bidder_uid,
            amount: new_bid.amount,
            message: new_bid
                .message
                .map(|m| m.trim().to_string())
                .unwrap_or_default(),
            status: BidStatus::Pending,
            created_at: now,
            created_at_millis: now.timestamp_millis(),
        })
    }

    /// `pending → accepted`.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::PreconditionFailed`] unless the bid is pending.
    pub fn accept(&mut self) -> Result<(), MarketError> {
        if self.status != BidStatus::Pending {
            return Err(MarketError::PreconditionFailed(format!(
                "bid {} is {}, only pending bids can be accepted",
                self.id,
                self.status.as_str()
            )));
        }
        self.status = BidStatus::Accepted;
        Ok(())
    }

    /// `pending → rejected`. Returns `false` when the bid was already
    /// rejected and nothing changed.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::PreconditionFailed`] for an accepted bid.
    pub fn reject(&mut self) -> Result<bool, MarketError> {
        match self.status {
            BidStatus::Pending => {
                self.status = BidStatus::Rejected;
                Ok(true)
            }
            BidStatus::Rejected => Ok(false),
            BidStatus::Accepted => Err(MarketError::PreconditionFailed(format!(
                "bid {} was already accepted",
                self.id
            ))),
        }
    }
}
