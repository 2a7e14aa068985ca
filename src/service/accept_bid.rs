//! Accept-bid transaction.
//!
//! Accepting a bid reads the job and the target bid, enumerates the job's
//! other bids, and commits one guarded batch that accepts the target,
//! rejects every sibling and assigns the job. The batch requires the job to
//! still be `open` and the target to still be `pending`, so of any number of
//! concurrent accepts on one job exactly one commits. A sweep after the
//! commit rejects bids that landed between enumeration and commit.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::domain::{Bid, BidId, BidStatus, Job, JobId, JobStatus, Uid};
use crate::error::MarketError;
use crate::store::{RecordStore, WriteBatch};

/// Result of a committed accept.
#[derive(Debug, Clone, PartialEq)]
pub struct AcceptOutcome {
    /// The job, now `assigned`.
    pub job: Job,
    /// The accepted bid.
    pub bid: Bid,
    /// Sibling bids rejected by the batch or the sweep after it.
    pub rejected: Vec<BidId>,
}

/// Runs the accept-bid transaction against a record store.
#[derive(Debug, Clone)]
pub struct AcceptBidCoordinator {
    store: Arc<dyn RecordStore>,
}

impl AcceptBidCoordinator {
    /// Creates a coordinator over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Accepts `bid_id` on `job_id` on behalf of `actor`.
    ///
    /// # Errors
    ///
    /// - [`MarketError::JobNotFound`] / [`MarketError::BidNotFound`] when a
    ///   record is missing.
    /// - [`MarketError::Forbidden`] unless `actor` posted the job.
    /// - [`MarketError::Conflict`] when the job is no longer open, or another
    ///   transition committed first.
    /// - [`MarketError::PreconditionFailed`] when the bid is not pending.
    pub async fn accept(
        &self,
        actor: &Uid,
        job_id: JobId,
        bid_id: BidId,
        now: DateTime<Utc>,
    ) -> Result<AcceptOutcome, MarketError> {
        let job = self
            .store
            .get_job(job_id)
            .await?
            .ok_or(MarketError::JobNotFound(job_id))?;
        if !job.is_posted_by(actor) {
            return Err(MarketError::Forbidden(
                "only the poster can accept a bid".to_string(),
            ));
        }
        if job.status != JobStatus::Open {
            return Err(MarketError::Conflict(format!(
                "job {job_id} is already {}",
                job.status.as_str()
            )));
        }

        let mut bid = self
            .store
            .get_bid(job_id, bid_id)
            .await?
            .ok_or(MarketError::BidNotFound(bid_id))?;
        if let Err(err) = bid.accept() {
            return Err(self.explain_closed_bid(job_id, err).await);
        }

        let siblings = self.store.list_bids(job_id).await?;

        let mut assigned = job;
        assigned.assign(&bid, now)?;

        let mut batch = WriteBatch::new()
            .require_job_status(job_id, JobStatus::Open)
            .require_bid_status(job_id, bid_id, BidStatus::Pending)
            .set_bid_status(job_id, bid_id, BidStatus::Accepted);
        let mut rejected = Vec::new();
        for sibling in siblings
            .iter()
            .filter(|sibling| sibling.id != bid_id && sibling.status != BidStatus::Rejected)
        {
            batch = batch.set_bid_status(job_id, sibling.id, BidStatus::Rejected);
            rejected.push(sibling.id);
        }
        batch = batch.put_job(assigned.clone());

        if let Err(err) = self.store.commit(batch).await {
            if matches!(err, MarketError::Conflict(_)) {
                warn!(%job_id, %bid_id, error = %err, "accept lost a race");
            }
            return Err(err);
        }

        rejected.extend(self.sweep(job_id, bid_id).await);
        Ok(AcceptOutcome {
            job: assigned,
            bid,
            rejected,
        })
    }

    /// A target that is no longer pending usually means a concurrent accept
    /// already rejected it. Report that as a conflict.
    async fn explain_closed_bid(&self, job_id: JobId, err: MarketError) -> MarketError {
        match self.store.get_job(job_id).await {
            Ok(Some(job)) if job.status != JobStatus::Open => MarketError::Conflict(format!(
                "job {job_id} is already {}",
                job.status.as_str()
            )),
            _ => err,
        }
    }

    /// Rejects bids still pending after the accept committed. Failures are
    /// logged and skipped.
    async fn sweep(&self, job_id: JobId, accepted: BidId) -> Vec<BidId> {
        let bids = match self.store.list_bids(job_id).await {
            Ok(bids) => bids,
            Err(err) => {
                warn!(%job_id, error = %err, "post-accept sweep could not list bids");
                return Vec::new();
            }
        };

        let mut swept = Vec::new();
        for straggler in bids
            .iter()
            .filter(|bid| bid.id != accepted && bid.status == BidStatus::Pending)
        {
            let batch = WriteBatch::new()
                .require_bid_status(job_id, straggler.id, BidStatus::Pending)
                .set_bid_status(job_id, straggler.id, BidStatus::Rejected);
            match self.store.commit(batch).await {
                Ok(()) => {
                    debug!(%job_id, bid_id = %straggler.id, "swept straggler bid");
                    swept.push(straggler.id);
                }
                Err(err) => {
                    warn!(%job_id, bid_id = %straggler.id, error = %err, "sweep failed");
                }
            }
        }
        swept
    }
}
