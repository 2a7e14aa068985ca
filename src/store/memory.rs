//! In-process record store.
//!
//! [`InMemoryStore`] keeps every job, its nested bids and every profile in
//! one `tokio::sync::RwLock`. A commit takes the write lock, checks all
//! preconditions, stages all writes against a copy of the touched records,
//! and only then swaps them in. Change notifications are published before
//! the lock is released so subscribers observe commits in order.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::{RwLock, broadcast};
use tracing::debug;

use super::{JobQuery, Precondition, RecordStore, StoreChange, Write, WriteBatch};
use crate::domain::{Bid, BidId, EventBus, Job, JobId, Profile, Uid};
use crate::error::MarketError;

/// Default capacity of the change feed.
const DEFAULT_CHANGE_CAPACITY: usize = 1024;

#[derive(Debug, Default)]
struct Tables {
    jobs: HashMap<JobId, Job>,
    /// Bids per job, in insertion order.
    bids: HashMap<JobId, Vec<Bid>>,
    profiles: HashMap<Uid, Profile>,
}

impl Tables {
    fn bid(&self, job_id: JobId, bid_id: BidId) -> Option<&Bid> {
        self.bids
            .get(&job_id)
            .and_then(|bids| bids.iter().find(|bid| bid.id == bid_id))
    }

    fn holds(&self, precondition: &Precondition) -> bool {
        match precondition {
            Precondition::JobStatus { job_id, expected } => self
                .jobs
                .get(job_id)
                .is_some_and(|job| job.status == *expected),
            Precondition::BidStatus {
                job_id,
                bid_id,
                expected,
            } => self
                .bid(*job_id, *bid_id)
                .is_some_and(|bid| bid.status == *expected),
            Precondition::NoBidFrom { job_id, bidder } => !self
                .bids
                .get(job_id)
                .is_some_and(|bids| bids.iter().any(|bid| &bid.bidder_uid == bidder)),
        }
    }

    fn apply(&mut self, write: Write) -> Result<(), MarketError> {
        match write {
            Write::PutJob(job) => {
                self.bids.entry(job.id).or_default();
                self.jobs.insert(job.id, job);
            }
            Write::PutBid(bid) => {
                if !self.jobs.contains_key(&bid.job_id) {
                    return Err(MarketError::JobNotFound(bid.job_id));
                }
                let bids = self.bids.entry(bid.job_id).or_default();
                if let Some(existing) = bids.iter_mut().find(|b| b.id == bid.id) {
                    *existing = bid;
                } else {
                    bids.push(bid);
                }
            }
            Write::SetBidStatus {
                job_id,
                bid_id,
                status,
            } => {
                let bid = self
                    .bids
                    .get_mut(&job_id)
                    .and_then(|bids| bids.iter_mut().find(|bid| bid.id == bid_id))
                    .ok_or(MarketError::BidNotFound(bid_id))?;
                bid.status = status;
            }
            Write::DeleteJob(job_id) => {
                if self.jobs.remove(&job_id).is_none() {
                    return Err(MarketError::JobNotFound(job_id));
                }
                self.bids.remove(&job_id);
            }
        }
        Ok(())
    }

    /// Copies out the records a batch touches so a failed write can be
    /// rolled back.
    fn checkpoint(&self, writes: &[Write]) -> Vec<(JobId, Option<Job>, Option<Vec<Bid>>)> {
        let mut seen = Vec::new();
        for write in writes {
            let job_id = write.change().job_id();
            if seen.iter().any(|(id, _, _)| *id == job_id) {
                continue;
            }
            seen.push((
                job_id,
                self.jobs.get(&job_id).cloned(),
                self.bids.get(&job_id).cloned(),
            ));
        }
        seen
    }

    fn restore(&mut self, checkpoint: Vec<(JobId, Option<Job>, Option<Vec<Bid>>)>) {
        for (job_id, job, bids) in checkpoint {
            match job {
                Some(job) => self.jobs.insert(job_id, job),
                None => self.jobs.remove(&job_id),
            };
            match bids {
                Some(bids) => self.bids.insert(job_id, bids),
                None => self.bids.remove(&job_id),
            };
        }
    }
}

/// Record store held in process memory.
#[derive(Debug)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
    changes: EventBus<StoreChange>,
}

impl InMemoryStore {
    /// Creates an empty store with the default change feed capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_change_capacity(DEFAULT_CHANGE_CAPACITY)
    }

    /// Creates an empty store whose change feed buffers `capacity` entries.
    #[must_use]
    pub fn with_change_capacity(capacity: usize) -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            changes: EventBus::new(capacity),
        }
    }

    /// Number of stored jobs.
    pub async fn job_count(&self) -> usize {
        self.tables.read().await.jobs.len()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn get_job(&self, job_id: JobId) -> Result<Option<Job>, MarketError> {
        Ok(self.tables.read().await.jobs.get(&job_id).cloned())
    }

    async fn get_bid(&self, job_id: JobId, bid_id: BidId) -> Result<Option<Bid>, MarketError> {
        Ok(self.tables.read().await.bid(job_id, bid_id).cloned())
    }

    async fn query_jobs(&self, query: &JobQuery) -> Result<Vec<Job>, MarketError> {
        let tables = self.tables.read().await;
        let mut jobs: Vec<Job> = tables
            .jobs
            .values()
            .filter(|job| query.matches(job))
            .cloned()
            .collect();
        drop(tables);
        // HashMap order is arbitrary; settle ties by creation then id.
        jobs.sort_by(|a, b| {
            a.created_at_millis
                .cmp(&b.created_at_millis)
                .then_with(|| a.id.cmp(&b.id))
        });
        query.arrange(&mut jobs);
        Ok(jobs)
    }

    async fn list_bids(&self, job_id: JobId) -> Result<Vec<Bid>, MarketError> {
        let tables = self.tables.read().await;
        let mut bids = tables.bids.get(&job_id).cloned().unwrap_or_default();
        drop(tables);
        bids.sort_by_key(|bid| bid.created_at_millis);
        Ok(bids)
    }

    async fn bids_by_bidder(&self, bidder: &Uid) -> Result<Vec<Bid>, MarketError> {
        let tables = self.tables.read().await;
        let mut bids: Vec<Bid> = tables
            .bids
            .values()
            .flatten()
            .filter(|bid| &bid.bidder_uid == bidder)
            .cloned()
            .collect();
        drop(tables);
        bids.sort_by(|a, b| b.created_at_millis.cmp(&a.created_at_millis));
        Ok(bids)
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), MarketError> {
        let (preconditions, writes) = batch.into_parts();
        let mut tables = self.tables.write().await;

        if let Some(failed) = preconditions.iter().find(|p| !tables.holds(p)) {
            debug!(precondition = %failed, "commit rejected");
            return Err(failed.conflict());
        }

        let checkpoint = tables.checkpoint(&writes);
        let changes: Vec<StoreChange> = writes.iter().map(Write::change).collect();
        for write in writes {
            if let Err(err) = tables.apply(write) {
                tables.restore(checkpoint);
                return Err(err);
            }
        }

        for change in changes {
            self.changes.publish(change);
        }
        drop(tables);
        Ok(())
    }

    fn changes(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }

    async fn get_profile(&self, uid: &Uid) -> Result<Option<Profile>, MarketError> {
        Ok(self.tables.read().await.profiles.get(uid).cloned())
    }

    async fn put_profile(&self, profile: Profile) -> Result<(), MarketError> {
        self.tables
            .write()
            .await
            .profiles
            .insert(profile.uid.clone(), profile);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::domain::{
        BidRange, BidStatus, Category, Coordinates, EmploymentStatus, JobLocation, JobStatus,
        NewBid, NewJob, ProfileUpdate,
    };
    use chrono::{Duration, Utc};

    fn job(poster: &str) -> Job {
        let now = Utc::now();
        let new_job = NewJob {
            category: Category::Cleaning,
            description: "clean the garage".to_string(),
            details: None,
            image_url: "https://img.example/garage.jpg".to_string(),
            bid_range: BidRange {
                min: 20.0,
                max: 60.0,
            },
            location: JobLocation::Current {
                coords: Some(Coordinates {
                    latitude: 12.97,
                    longitude: 77.59,
                }),
            },
            radius_km: 10,
            expires_at: now + Duration::hours(1),
        };
        let Ok(job) = Job::create(Uid::new(poster), new_job, now) else {
            panic!("valid job");
        };
        job
    }

    fn bid(job: &Job, bidder: &str) -> Bid {
        let new_bid = NewBid {
            amount: 40.0,
            message: None,
        };
        let Ok(bid) = Bid::create(job.id, Uid::new(bidder), new_bid, Utc::now()) else {
            panic!("valid bid");
        };
        bid
    }

    #[tokio::test]
    async fn put_and_read_back() {
        let store = InMemoryStore::new();
        let job = job("poster");
        let offer = bid(&job, "alice");
        let Ok(()) = store.create_job(job.clone()).await else {
            panic!("create job");
        };
        let Ok(()) = store.commit(WriteBatch::new().put_bid(offer.clone())).await else {
            panic!("create bid");
        };

        let Ok(Some(stored)) = store.get_job(job.id).await else {
            panic!("job stored");
        };
        assert_eq!(stored, job);
        let Ok(Some(stored_bid)) = store.get_bid(job.id, offer.id).await else {
            panic!("bid stored");
        };
        assert_eq!(stored_bid, offer);
        assert_eq!(store.job_count().await, 1);
    }

    #[tokio::test]
    async fn bid_on_missing_job_is_not_found() {
        let store = InMemoryStore::new();
        let orphan = bid(&job("poster"), "alice");
        let result = store.commit(WriteBatch::new().put_bid(orphan)).await;
        assert!(matches!(result, Err(MarketError::JobNotFound(_))));
    }

    #[tokio::test]
    async fn failed_precondition_applies_nothing() {
        let store = InMemoryStore::new();
        let job = job("poster");
        let _ = store.create_job(job.clone()).await;

        let mut changes = store.changes();
        let mut assigned = job.clone();
        assigned.status = JobStatus::Assigned;
        let batch = WriteBatch::new()
            .require_job_status(job.id, JobStatus::Completed)
            .put_job(assigned);
        let result = store.commit(batch).await;

        assert!(matches!(result, Err(MarketError::Conflict(_))));
        let Ok(Some(stored)) = store.get_job(job.id).await else {
            panic!("job stored");
        };
        assert_eq!(stored.status, JobStatus::Open);
        assert!(changes.try_recv().is_err());
    }

    #[tokio::test]
    async fn failed_write_rolls_back_earlier_writes() {
        let store = InMemoryStore::new();
        let job = job("poster");
        let _ = store.create_job(job.clone()).await;

        let mut paid = job.clone();
        paid.status = JobStatus::Paid;
        let batch = WriteBatch::new().put_job(paid).set_bid_status(
            job.id,
            BidId::new(),
            BidStatus::Rejected,
        );
        let result = store.commit(batch).await;

        assert!(matches!(result, Err(MarketError::BidNotFound(_))));
        let Ok(Some(stored)) = store.get_job(job.id).await else {
            panic!("job stored");
        };
        assert_eq!(stored.status, JobStatus::Open);
    }

    #[tokio::test]
    async fn no_bid_from_guards_duplicates() {
        let store = InMemoryStore::new();
        let job = job("poster");
        let _ = store.create_job(job.clone()).await;
        let first = bid(&job, "alice");
        let _ = store.commit(WriteBatch::new().put_bid(first)).await;

        let second = bid(&job, "alice");
        let batch = WriteBatch::new()
            .require(Precondition::NoBidFrom {
                job_id: job.id,
                bidder: Uid::new("alice"),
            })
            .put_bid(second);
        assert!(matches!(
            store.commit(batch).await,
            Err(MarketError::Conflict(_))
        ));
        let Ok(bids) = store.list_bids(job.id).await else {
            panic!("list bids");
        };
        assert_eq!(bids.len(), 1);
    }

    #[tokio::test]
    async fn delete_cascades_to_bids() {
        let store = InMemoryStore::new();
        let job = job("poster");
        let _ = store.create_job(job.clone()).await;
        let _ = store.commit(WriteBatch::new().put_bid(bid(&job, "alice"))).await;

        let Ok(()) = store.commit(WriteBatch::new().delete_job(job.id)).await else {
            panic!("delete");
        };
        assert!(matches!(store.get_job(job.id).await, Ok(None)));
        assert!(matches!(store.list_bids(job.id).await, Ok(bids) if bids.is_empty()));
        assert!(matches!(
            store.bids_by_bidder(&Uid::new("alice")).await,
            Ok(bids) if bids.is_empty()
        ));
    }

    #[tokio::test]
    async fn changes_follow_commit_order() {
        let store = InMemoryStore::new();
        let mut changes = store.changes();
        let job = job("poster");
        let offer = bid(&job, "alice");
        let _ = store
            .commit(WriteBatch::new().put_job(job.clone()).put_bid(offer.clone()))
            .await;

        assert!(matches!(changes.try_recv(), Ok(StoreChange::Job(id)) if id == job.id));
        assert!(matches!(
            changes.try_recv(),
            Ok(StoreChange::Bid { bid_id, .. }) if bid_id == offer.id
        ));
    }

    #[tokio::test]
    async fn query_by_poster_newest_first() {
        let store = InMemoryStore::new();
        let mut older = job("poster");
        older.created_at_millis -= 1_000;
        let newer = job("poster");
        let _ = store.create_job(older.clone()).await;
        let _ = store.create_job(newer.clone()).await;
        let _ = store.create_job(job("someone-else")).await;

        let Ok(jobs) = store.query_jobs(&JobQuery::posted_by(Uid::new("poster"))).await else {
            panic!("query");
        };
        let ids: Vec<JobId> = jobs.iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![newer.id, older.id]);
    }

    #[tokio::test]
    async fn profiles_are_replaced_whole() {
        let store = InMemoryStore::new();
        let uid = Uid::new("alice");
        assert!(matches!(store.get_profile(&uid).await, Ok(None)));

        let update = ProfileUpdate {
            display_name: "Alice".to_string(),
            about: "Tutor".to_string(),
            photo_url: None,
            professions: vec!["Tutor".to_string()],
            employment_status: EmploymentStatus::Other,
            organization_name: None,
        };
        let Ok(first) = Profile::apply(uid.clone(), update.clone(), None, Utc::now()) else {
            panic!("valid profile");
        };
        let _ = store.put_profile(first).await;
        let renamed = ProfileUpdate {
            display_name: "Alice B".to_string(),
            professions: Vec::new(),
            ..update
        };
        let Ok(second) = Profile::apply(uid.clone(), renamed, None, Utc::now()) else {
            panic!("valid profile");
        };
        let _ = store.put_profile(second.clone()).await;

        let Ok(Some(stored)) = store.get_profile(&uid).await else {
            panic!("profile stored");
        };
        assert_eq!(stored, second);
        assert!(stored.professions.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_guarded_commits_have_one_winner() {
        let store = Arc::new(InMemoryStore::new());
        let job = job("poster");
        let _ = store.create_job(job.clone()).await;

        let mut handles = Vec::new();
        for bidder in ["alice", "bob", "carol", "dave"] {
            let store = Arc::clone(&store);
            let mut assigned = job.clone();
            let offer = bid(&job, bidder);
            handles.push(tokio::spawn(async move {
                let _ = store.commit(WriteBatch::new().put_bid(offer.clone())).await;
                if assigned.assign(&offer, Utc::now()).is_err() {
                    return false;
                }
                let batch = WriteBatch::new()
                    .require_job_status(assigned.id, JobStatus::Open)
                    .put_job(assigned);
                store.commit(batch).await.is_ok()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if matches!(handle.await, Ok(true)) {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
