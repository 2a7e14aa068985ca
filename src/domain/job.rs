//! Job record and its lifecycle state machine.
//!
//! ```text
//! open ──accept bid──▶ assigned ──completion──▶ completed ──payment──▶ paid
//!   │
//!   └──poster delete──▶ (gone)
//! ```
//!
//! Each transition method checks the status guard first
//! ([`MarketError::PreconditionFailed`]) and the actor's role second
//! ([`MarketError::Forbidden`]). A failed guard leaves the record untouched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::bid::Bid;
use super::geo::Coordinates;
use super::{BidId, JobId, Uid};
use crate::error::MarketError;

/// Smallest allowed visibility radius.
pub const MIN_RADIUS_KM: u32 = 1;

/// Largest allowed visibility radius.
pub const MAX_RADIUS_KM: u32 = 100;

/// Job lifecycle status. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Accepting bids and visible in discovery.
    Open,
    /// One bid was accepted; waiting for the bidder to finish.
    Assigned,
    /// The bidder submitted a completion image.
    Completed,
    /// The poster attested payment. Terminal.
    Paid,
}

impl JobStatus {
    /// Wire name of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Assigned => "assigned",
            Self::Completed => "completed",
            Self::Paid => "paid",
        }
    }

    /// `true` for every status reached through an accepted bid.
    #[must_use]
    pub const fn has_selected_bid(self) -> bool {
        matches!(self, Self::Assigned | Self::Completed | Self::Paid)
    }
}

/// Job category offered by the posting form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Anything else.
    #[default]
    Other,
    /// Pick-up and drop-off errands.
    Delivery,
    /// Household or office cleaning.
    Cleaning,
    /// Fixes and small repairs.
    Repairs,
    /// Lessons and homework help.
    Tutoring,
}

impl Category {
    /// Every category, in display order.
    pub const ALL: [Self; 5] = [
        Self::Other,
        Self::Delivery,
        Self::Cleaning,
        Self::Repairs,
        Self::Tutoring,
    ];

    /// Wire name of the category.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Other => "other",
            Self::Delivery => "delivery",
            Self::Cleaning => "cleaning",
            Self::Repairs => "repairs",
            Self::Tutoring => "tutoring",
        }
    }
}

/// Expected price range advertised by the poster.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BidRange {
    /// Lowest expected bid, `> 0`.
    pub min: f64,
    /// Highest expected bid, `>= min`.
    pub max: f64,
}

impl BidRange {
    /// Checks `0 < min <= max` with finite bounds.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::Validation`] on a non-positive or inverted
    /// range.
    pub fn validate(&self) -> Result<(), MarketError> {
        if !self.min.is_finite() || !self.max.is_finite() || self.min <= 0.0 || self.max <= 0.0 {
            return Err(MarketError::Validation(
                "bid range bounds must be positive numbers".to_string(),
            ));
        }
        if self.min > self.max {
            return Err(MarketError::Validation(
                "bid range min cannot be greater than max".to_string(),
            ));
        }
        Ok(())
    }
}

/// Where the job takes place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobLocation {
    /// The poster's position when the job was created. `coords` is `None`
    /// when the position capability had nothing to offer.
    Current {
        /// Captured position snapshot.
        coords: Option<Coordinates>,
    },
    /// A free-text address. Never filtered geospatially.
    Custom {
        /// Address as typed by the poster.
        address: String,
    },
}

impl JobLocation {
    /// Returns the captured position, if any.
    #[must_use]
    pub const fn coordinates(&self) -> Option<&Coordinates> {
        match self {
            Self::Current { coords } => coords.as_ref(),
            Self::Custom { .. } => None,
        }
    }
}

/// Poster-supplied fields of a new job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewJob {
    /// Job category.
    #[serde(default)]
    pub category: Category,
    /// Short description, required.
    pub description: String,
    /// Optional extended details.
    #[serde(default)]
    pub details: Option<String>,
    /// Hosted image URL returned by the image capability.
    pub image_url: String,
    /// Expected bid range.
    pub bid_range: BidRange,
    /// Job location.
    pub location: JobLocation,
    /// Visibility radius, `1..=100` km.
    pub radius_km: u32,
    /// When the listing lapses.
    pub expires_at: DateTime<Utc>,
}

/// A posted job, as persisted. Field names are the wire contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    /// Record identity.
    pub id: JobId,
    /// Poster identity.
    pub user_uid: Uid,
    /// Job category.
    #[serde(default)]
    pub category: Category,
    /// Short description.
    pub description: String,
    /// Extended details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Job image URL, immutable.
    pub image_url: String,
    /// Expected bid range.
    pub bid_range: BidRange,
    /// Job location.
    pub location: JobLocation,
    /// Visibility radius in kilometres.
    pub radius_km: u32,
    /// Wall-clock creation time.
    pub created_at: DateTime<Utc>,
    /// Creation time as epoch milliseconds, for sorting.
    pub created_at_millis: i64,
    /// Listing expiry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Lifecycle status.
    pub status: JobStatus,
    /// Accepted bid, once assigned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_bid_id: Option<BidId>,
    /// Bidder of the accepted bid, once assigned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_bidder_uid: Option<Uid>,
    /// Assignment time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_at: Option<DateTime<Utc>>,
    /// Proof-of-work image URL, once completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_image_url: Option<String>,
    /// Completion time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Identity that submitted the completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_by: Option<Uid>,
    /// Payment attestation time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Validates `new_job` and builds an `open` job owned by `poster`.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::Validation`] when a required field is blank,
    /// the bid range is invalid, the radius is outside `1..=100`, the
    /// location is malformed, or the expiry is not after `now`.
    pub fn create(poster: Uid, new_job: NewJob, now: DateTime<Utc>) -> Result<Self, MarketError> {
        if poster.as_str().trim().is_empty() {
            return Err(MarketError::MissingIdentity);
        }
        let description = new_job.description.trim().to_string();
        if description.is_empty() {
            return Err(MarketError::Validation("description is required".to_string()));
        }
        if new_job.image_url.trim().is_empty() {
            return Err(MarketError::Validation("job image is required".to_string()));
        }
        new_job.bid_range.validate()?;
        if !(MIN_RADIUS_KM..=MAX_RADIUS_KM).contains(&new_job.radius_km) {
            return Err(MarketError::Validation(format!(
                "radius must be between {MIN_RADIUS_KM} and {MAX_RADIUS_KM} km"
            )));
        }
        match &new_job.location {
            JobLocation::Current { coords: Some(coords) } => coords.validate()?,
            JobLocation::Current { coords: None } => {}
            JobLocation::Custom { address } if address.trim().is_empty() => {
                return Err(MarketError::Validation("job address is required".to_string()));
            }
            JobLocation::Custom { .. } => {}
        }
        if new_job.expires_at <= now {
            return Err(MarketError::Validation(
                "expiry must be in the future".to_string(),
            ));
        }

        Ok(Self {
            id: JobId::new(),
            user_uid: poster,
            category: new_job.category,
            description,
            details: new_job
                .details
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
            image_url: new_job.image_url,
            bid_range: new_job.bid_range,
            location: new_job.location,
            radius_km: new_job.radius_km,
            created_at: now,
            created_at_millis: now.timestamp_millis(),
            expires_at: Some(new_job.expires_at),
            status: JobStatus::Open,
            selected_bid_id: None,
            assigned_bidder_uid: None,
            assigned_at: None,
            completion_image_url: None,
            completed_at: None,
            completed_by: None,
            paid_at: None,
        })
    }

    /// Returns `true` if `actor` posted this job.
    #[must_use]
    pub fn is_posted_by(&self, actor: &Uid) -> bool {
        &self.user_uid == actor
    }

    /// `selectedBidId` is set iff the status went through an accepted bid.
    #[must_use]
    pub fn selection_is_consistent(&self) -> bool {
        self.selected_bid_id.is_some() == self.status.has_selected_bid()
    }

    /// Checks that `actor` may submit a bid on this job.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::Forbidden`] if `actor` is the poster or the job
    /// is no longer open.
    pub fn ensure_biddable_by(&self, actor: &Uid) -> Result<(), MarketError> {
        if self.is_posted_by(actor) {
            return Err(MarketError::Forbidden(
                "cannot bid on your own job".to_string(),
            ));
        }
        if self.status != JobStatus::Open {
            return Err(MarketError::Forbidden(format!(
                "job is {}, bids are closed",
                self.status.as_str()
            )));
        }
        Ok(())
    }

    /// Checks that `actor` may delete this job.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::PreconditionFailed`] outside `open` and
    /// [`MarketError::Forbidden`] for anyone but the poster.
    pub fn ensure_deletable_by(&self, actor: &Uid) -> Result<(), MarketError> {
        self.require_status(JobStatus::Open, "delete")?;
        self.require_poster(actor, "delete")
    }

    /// `open → assigned` for the given bid. Records the selected bid, the
    /// assigned bidder and the assignment time.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::PreconditionFailed`] unless the job is `open`
    /// and the bid belongs to it.
    pub fn assign(&mut self, bid: &Bid, at: DateTime<Utc>) -> Result<(), MarketError> {
        self.require_status(JobStatus::Open, "assign")?;
        if bid.job_id != self.id {
            return Err(MarketError::PreconditionFailed(format!(
                "bid {} does not belong to job {}",
                bid.id, self.id
            )));
        }
        self.status = JobStatus::Assigned;
        self.selected_bid_id = Some(bid.id);
        self.assigned_bidder_uid = Some(bid.bidder_uid.clone());
        self.assigned_at = Some(at);
        Ok(())
    }

    /// `assigned → completed`, submitted by the assigned bidder.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::PreconditionFailed`] unless the job is
    /// `assigned`, [`MarketError::Forbidden`] if `actor` is not the assigned
    /// bidder, and [`MarketError::Validation`] for a blank image URL.
    pub fn complete(
        &mut self,
        actor: &Uid,
        completion_image_url: &str,
        at: DateTime<Utc>,
    ) -> Result<(), MarketError> {
        self.require_status(JobStatus::Assigned, "complete")?;
        if self.assigned_bidder_uid.as_ref() != Some(actor) {
            return Err(MarketError::Forbidden(
                "only the assigned bidder can submit completion".to_string(),
            ));
        }
        if completion_image_url.trim().is_empty() {
            return Err(MarketError::Validation(
                "completion image is required".to_string(),
            ));
        }
        self.status = JobStatus::Completed;
        self.completion_image_url = Some(completion_image_url.to_string());
        self.completed_at = Some(at);
        self.completed_by = Some(actor.clone());
        Ok(())
    }

    /// `completed → paid`, attested by the poster.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::PreconditionFailed`] unless the job is
    /// `completed` and [`MarketError::Forbidden`] for anyone but the poster.
    pub fn mark_paid(&mut self, actor: &Uid, at: DateTime<Utc>) -> Result<(), MarketError> {
        self.require_status(JobStatus::Completed, "mark paid")?;
        self.require_poster(actor, "mark paid")?;
        self.status = JobStatus::Paid;
        self.paid_at = Some(at);
        Ok(())
    }

    fn require_status(&self, expected: JobStatus, action: &str) -> Result<(), MarketError> {
        if self.status == expected {
            Ok(())
        } else {
            Err(MarketError::PreconditionFailed(format!(
                "cannot {action} a job that is {} (expected {})",
                self.status.as_str(),
                expected.as_str()
            )))
        }
    }

    fn require_poster(&self, actor: &Uid, action: &str) -> Result<(), MarketError> {
        if self.is_posted_by(actor) {
            Ok(())
        } else {
            Err(MarketError::Forbidden(format!(
                "only the poster can {action} this job"
            )))
        }
    }
}
