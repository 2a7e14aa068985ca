//! Record store port and adapters.
//!
//! The core talks to storage only through [`RecordStore`]: point reads,
//! filtered job queries, bid listings, a change feed, [`WriteBatch`]
//! commits, and single-document profile reads and writes. A batch carries [`Precondition`]s that the store re-checks
//! atomically with the writes; if any fails, nothing is applied and the
//! commit returns [`MarketError::Conflict`].
//!
//! Adapters:
//! - [`InMemoryStore`]: single-process store behind one `RwLock`.
//! - [`PostgresStore`]: `sqlx` over PostgreSQL with JSONB documents.

pub mod memory;
pub mod postgres;
pub mod subscription;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use crate::domain::{Bid, BidId, BidStatus, Job, JobId, JobStatus, Profile, Uid};
use crate::error::MarketError;

pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use subscription::{Subscription, subscribe};

/// Sort order of a job query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JobOrder {
    /// `createdAtMillis` descending.
    #[default]
    NewestFirst,
    /// `expiresAt` ascending, missing expiry first.
    SoonestExpiry,
}

/// Filter pushed down to the store. Empty fields match everything.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct JobQuery {
    /// Only jobs posted by this identity.
    pub poster: Option<Uid>,
    /// Only jobs assigned to this identity.
    pub assigned_bidder: Option<Uid>,
    /// Only jobs in one of these statuses. Empty means any status.
    pub statuses: Vec<JobStatus>,
    /// Only jobs whose expiry is strictly after this instant.
    pub expires_after: Option<DateTime<Utc>>,
    /// Result order.
    pub order: JobOrder,
    /// Maximum number of results.
    pub limit: Option<usize>,
}

impl JobQuery {
    /// Matches every job, newest first.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Jobs posted by `poster`.
    #[must_use]
    pub fn posted_by(poster: Uid) -> Self {
        Self {
            poster: Some(poster),
            ..Self::default()
        }
    }

    /// Jobs assigned to `bidder`.
    #[must_use]
    pub fn assigned_to(bidder: Uid) -> Self {
        Self {
            assigned_bidder: Some(bidder),
            ..Self::default()
        }
    }

    /// Open jobs that have not expired at `now`, capped at `limit`.
    #[must_use]
    pub fn open_unexpired(now: DateTime<Utc>, limit: usize) -> Self {
        Self {
            statuses: vec![JobStatus::Open],
            expires_after: Some(now),
            limit: Some(limit),
            ..Self::default()
        }
    }

    /// Restricts the query to the given statuses.
    #[must_use]
    pub fn with_statuses(mut self, statuses: &[JobStatus]) -> Self {
        self.statuses = statuses.to_vec();
        self
    }

    /// Sets the result order.
    #[must_use]
    pub const fn ordered(mut self, order: JobOrder) -> Self {
        self.order = order;
        self
    }

    /// Returns `true` if `job` satisfies every filter.
    #[must_use]
    pub fn matches(&self, job: &Job) -> bool {
        if let Some(poster) = &self.poster
            && &job.user_uid != poster
        {
            return false;
        }
        if let Some(bidder) = &self.assigned_bidder
            && job.assigned_bidder_uid.as_ref() != Some(bidder)
        {
            return false;
        }
        if !self.statuses.is_empty() && !self.statuses.contains(&job.status) {
            return false;
        }
        if let Some(after) = self.expires_after
            && !job.expires_at.is_some_and(|expires_at| expires_at > after)
        {
            return false;
        }
        true
    }

    /// Sorts `jobs` in query order (stable) and applies the limit.
    pub fn arrange(&self, jobs: &mut Vec<Job>) {
        match self.order {
            JobOrder::NewestFirst => {
                jobs.sort_by(|a, b| b.created_at_millis.cmp(&a.created_at_millis));
            }
            JobOrder::SoonestExpiry => {
                jobs.sort_by_key(|job| job.expires_at.unwrap_or(DateTime::<Utc>::MIN_UTC));
            }
        }
        if let Some(limit) = self.limit {
            jobs.truncate(limit);
        }
    }
}

/// Condition re-checked by the store inside the atomic commit.
#[derive(Debug, Clone, PartialEq)]
pub enum Precondition {
    /// The job exists and currently has `expected` status.
    JobStatus {
        /// Job to check.
        job_id: JobId,
        /// Required status.
        expected: JobStatus,
    },
    /// The bid exists under the job and currently has `expected` status.
    BidStatus {
        /// Parent job.
        job_id: JobId,
        /// Bid to check.
        bid_id: BidId,
        /// Required status.
        expected: BidStatus,
    },
    /// `bidder` holds no bid on the job yet.
    NoBidFrom {
        /// Parent job.
        job_id: JobId,
        /// Bidder that must not have bid already.
        bidder: Uid,
    },
}

impl fmt::Display for Precondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::JobStatus { job_id, expected } => {
                write!(f, "job {job_id} is no longer {}", expected.as_str())
            }
            Self::BidStatus {
                bid_id, expected, ..
            } => write!(f, "bid {bid_id} is no longer {}", expected.as_str()),
            Self::NoBidFrom { job_id, bidder } => {
                write!(f, "{bidder} already has a bid on job {job_id}")
            }
        }
    }
}

impl Precondition {
    /// Conflict error reported when this precondition fails at commit.
    #[must_use]
    pub fn conflict(&self) -> MarketError {
        MarketError::Conflict(self.to_string())
    }
}

/// A single write inside a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    /// Creates or replaces a job document.
    PutJob(Job),
    /// Creates or replaces a bid document. The parent job must exist.
    PutBid(Bid),
    /// Updates the status field of an existing bid.
    SetBidStatus {
        /// Parent job.
        job_id: JobId,
        /// Bid to update.
        bid_id: BidId,
        /// New status.
        status: BidStatus,
    },
    /// Deletes a job and every bid nested under it.
    DeleteJob(JobId),
}

impl Write {
    /// Change notification produced once this write is committed.
    #[must_use]
    pub fn change(&self) -> StoreChange {
        match self {
            Self::PutJob(job) => StoreChange::Job(job.id),
            Self::PutBid(bid) => StoreChange::Bid {
                job_id: bid.job_id,
                bid_id: bid.id,
            },
            Self::SetBidStatus { job_id, bid_id, .. } => StoreChange::Bid {
                job_id: *job_id,
                bid_id: *bid_id,
            },
            Self::DeleteJob(job_id) => StoreChange::JobDeleted(*job_id),
        }
    }
}

/// Atomic unit of work: every precondition holds and every write applies,
/// or nothing happens.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    preconditions: Vec<Precondition>,
    writes: Vec<Write>,
}

impl WriteBatch {
    /// Creates an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a precondition.
    #[must_use]
    pub fn require(mut self, precondition: Precondition) -> Self {
        self.preconditions.push(precondition);
        self
    }

    /// Requires the job to currently have `expected` status.
    #[must_use]
    pub fn require_job_status(self, job_id: JobId, expected: JobStatus) -> Self {
        self.require(Precondition::JobStatus { job_id, expected })
    }

    /// Requires the bid to currently have `expected` status.
    #[must_use]
    pub fn require_bid_status(self, job_id: JobId, bid_id: BidId, expected: BidStatus) -> Self {
        self.require(Precondition::BidStatus {
            job_id,
            bid_id,
            expected,
        })
    }

    /// Adds a write.
    #[must_use]
    pub fn write(mut self, write: Write) -> Self {
        self.writes.push(write);
        self
    }

    /// Creates or replaces a job.
    #[must_use]
    pub fn put_job(self, job: Job) -> Self {
        self.write(Write::PutJob(job))
    }

    /// Creates or replaces a bid.
    #[must_use]
    pub fn put_bid(self, bid: Bid) -> Self {
        self.write(Write::PutBid(bid))
    }

    /// Updates a bid's status.
    #[must_use]
    pub fn set_bid_status(self, job_id: JobId, bid_id: BidId, status: BidStatus) -> Self {
        self.write(Write::SetBidStatus {
            job_id,
            bid_id,
            status,
        })
    }

    /// Deletes a job and its bids.
    #[must_use]
    pub fn delete_job(self, job_id: JobId) -> Self {
        self.write(Write::DeleteJob(job_id))
    }

    /// Preconditions, in insertion order.
    #[must_use]
    pub fn preconditions(&self) -> &[Precondition] {
        &self.preconditions
    }

    /// Writes, in application order.
    #[must_use]
    pub fn writes(&self) -> &[Write] {
        &self.writes
    }

    /// Number of writes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    /// Returns `true` if the batch has no writes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Splits the batch into its parts.
    #[must_use]
    pub fn into_parts(self) -> (Vec<Precondition>, Vec<Write>) {
        (self.preconditions, self.writes)
    }
}

/// Notification that a record changed, published after commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreChange {
    /// A job document was created or replaced.
    Job(JobId),
    /// A job and its bids were deleted.
    JobDeleted(JobId),
    /// A bid document was created or updated.
    Bid {
        /// Parent job.
        job_id: JobId,
        /// Changed bid.
        bid_id: BidId,
    },
}

impl StoreChange {
    /// Job the change belongs to.
    #[must_use]
    pub const fn job_id(&self) -> JobId {
        match self {
            Self::Job(job_id) | Self::JobDeleted(job_id) | Self::Bid { job_id, .. } => *job_id,
        }
    }
}

/// Document store holding job, bid and profile records.
///
/// Implementations must apply [`RecordStore::commit`] atomically and publish
/// one [`StoreChange`] per write, in commit order, on the channel returned
/// by [`RecordStore::changes`].
#[async_trait]
pub trait RecordStore: Send + Sync + fmt::Debug {
    /// Reads one job.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::Store`] when the store is unreachable.
    async fn get_job(&self, job_id: JobId) -> Result<Option<Job>, MarketError>;

    /// Reads one bid by its path under a job.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::Store`] when the store is unreachable.
    async fn get_bid(&self, job_id: JobId, bid_id: BidId) -> Result<Option<Bid>, MarketError>;

    /// Runs a filtered job query.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::Store`] when the store is unreachable.
    async fn query_jobs(&self, query: &JobQuery) -> Result<Vec<Job>, MarketError>;

    /// Lists every bid under a job, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::Store`] when the store is unreachable.
    async fn list_bids(&self, job_id: JobId) -> Result<Vec<Bid>, MarketError>;

    /// Lists every bid submitted by `bidder` across jobs, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::Store`] when the store is unreachable.
    async fn bids_by_bidder(&self, bidder: &Uid) -> Result<Vec<Bid>, MarketError>;

    /// Atomically checks every precondition and applies every write.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::Conflict`] if a precondition fails,
    /// [`MarketError::JobNotFound`] / [`MarketError::BidNotFound`] if a write
    /// targets a missing record, and [`MarketError::Store`] on backend
    /// failure. In every error case nothing is applied.
    async fn commit(&self, batch: WriteBatch) -> Result<(), MarketError>;

    /// Subscribes to change notifications for committed writes.
    fn changes(&self) -> broadcast::Receiver<StoreChange>;

    /// Reads one user's profile.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::Store`] when the store is unreachable.
    async fn get_profile(&self, uid: &Uid) -> Result<Option<Profile>, MarketError>;

    /// Creates or replaces a profile. Profiles carry no preconditions and
    /// publish no change.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::Store`] when the store is unreachable.
    async fn put_profile(&self, profile: Profile) -> Result<(), MarketError>;

    /// Creates a job.
    ///
    /// # Errors
    ///
    /// See [`RecordStore::commit`].
    async fn create_job(&self, job: Job) -> Result<(), MarketError> {
        self.commit(WriteBatch::new().put_job(job)).await
    }

    /// Replaces a job, provided it still has status `expected`.
    ///
    /// # Errors
    ///
    /// See [`RecordStore::commit`].
    async fn update_job(&self, job: Job, expected: JobStatus) -> Result<(), MarketError> {
        let batch = WriteBatch::new()
            .require_job_status(job.id, expected)
            .put_job(job);
        self.commit(batch).await
    }

    /// Deletes a job and its bids, provided it still has status `expected`.
    ///
    /// # Errors
    ///
    /// See [`RecordStore::commit`].
    async fn delete_job(&self, job_id: JobId, expected: JobStatus) -> Result<(), MarketError> {
        let batch = WriteBatch::new()
            .require_job_status(job_id, expected)
            .delete_job(job_id);
        self.commit(batch).await
    }

    /// Creates a bid while its job is still open and the bidder has no
    /// other bid on it.
    ///
    /// # Errors
    ///
    /// See [`RecordStore::commit`].
    async fn create_bid(&self, bid: Bid) -> Result<(), MarketError> {
        let batch = WriteBatch::new()
            .require_job_status(bid.job_id, JobStatus::Open)
            .require(Precondition::NoBidFrom {
                job_id: bid.job_id,
                bidder: bid.bidder_uid.clone(),
            })
            .put_bid(bid);
        self.commit(batch).await
    }

    /// Finds the bid `bidder` placed on a job, if any.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::Store`] when the store is unreachable.
    async fn find_bid_by(&self, job_id: JobId, bidder: &Uid) -> Result<Option<Bid>, MarketError> {
        let bids = self.list_bids(job_id).await?;
        Ok(bids.into_iter().find(|bid| &bid.bidder_uid == bidder))
    }
}
