//! Market service: orchestrates marketplace operations and emits events.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use super::accept_bid::{AcceptBidCoordinator, AcceptOutcome};
use crate::domain::feed::discovery_feed;
use crate::domain::home_view::select_home_view;
use crate::domain::{
    Banner, Bid, BidId, BidStatus, Coordinates, EventBus, FeedItem, HomeView, HomeViewEvent,
    HomeViewState, Job, JobId, JobStatus, MarketEvent, NewBid, NewJob, Profile, ProfileUpdate, Uid,
};
use crate::error::MarketError;
use crate::store::{JobOrder, JobQuery, RecordStore, Subscription, WriteBatch, subscribe};

/// A bid together with the job it was placed on. `job` is `None` once the
/// job was deleted.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct BidWithJob {
    /// The viewer's bid.
    pub bid: Bid,
    /// Parent job.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job: Option<Job>,
}

/// A user's public profile with the jobs they finished.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PublicProfile {
    /// The profile.
    pub profile: Profile,
    /// Completed and paid jobs, most recent first.
    pub work_history: Vec<Job>,
}

/// Orchestration layer for every marketplace operation.
///
/// Stateless coordinator over a [`RecordStore`] and the [`EventBus`]. Every
/// mutation follows the same pattern: read, check the status guard then the
/// actor's role, commit a guarded batch, emit a [`MarketEvent`], log.
#[derive(Debug, Clone)]
pub struct MarketService {
    store: Arc<dyn RecordStore>,
    event_bus: EventBus,
    accept: AcceptBidCoordinator,
    max_open_jobs: usize,
}

impl MarketService {
    /// Creates a new `MarketService`. Discovery scans at most
    /// `max_open_jobs` candidates.
    #[must_use]
    pub fn new(store: Arc<dyn RecordStore>, event_bus: EventBus, max_open_jobs: usize) -> Self {
        Self {
            accept: AcceptBidCoordinator::new(Arc::clone(&store)),
            store,
            event_bus,
            max_open_jobs: max_open_jobs.max(1),
        }
    }

    /// Returns a reference to the inner [`EventBus`].
    #[must_use]
    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Returns a reference to the record store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Posts a new job owned by `actor`.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::Validation`] for malformed input and
    /// [`MarketError::Store`] if the store is unreachable.
    pub async fn create_job(&self, actor: &Uid, new_job: NewJob) -> Result<Job, MarketError> {
        let now = Utc::now();
        let job = Job::create(actor.clone(), new_job, now)?;
        self.store.create_job(job.clone()).await?;

        self.event_bus.publish(MarketEvent::JobCreated {
            job_id: job.id,
            poster_uid: job.user_uid.clone(),
            category: job.category,
            radius_km: job.radius_km,
            timestamp: now,
        });
        info!(job_id = %job.id, actor = %actor, category = job.category.as_str(), "job created");
        Ok(job)
    }

    /// Reads one job.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::JobNotFound`] if it does not exist.
    pub async fn get_job(&self, job_id: JobId) -> Result<Job, MarketError> {
        self.store
            .get_job(job_id)
            .await?
            .ok_or(MarketError::JobNotFound(job_id))
    }

    /// Deletes an open job and every bid on it. Returns the number of bids
    /// removed.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::PreconditionFailed`] outside `open`,
    /// [`MarketError::Forbidden`] for anyone but the poster, and
    /// [`MarketError::Conflict`] if the job changed status concurrently.
    pub async fn delete_job(&self, actor: &Uid, job_id: JobId) -> Result<usize, MarketError> {
        let job = self.get_job(job_id).await?;
        job.ensure_deletable_by(actor)?;
        let removed_bids = self.store.list_bids(job_id).await?.len();
        self.store
            .delete_job(job_id, JobStatus::Open)
            .await
            .inspect_err(|err| log_conflict(err, job_id, "delete"))?;

        self.event_bus.publish(MarketEvent::JobDeleted {
            job_id,
            removed_bids,
            timestamp: Utc::now(),
        });
        info!(%job_id, actor = %actor, removed_bids, "job deleted");
        Ok(removed_bids)
    }

    /// Submits a bid by `actor` on an open job.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::Forbidden`] if `actor` posted the job, the job
    /// is closed, or `actor` already bid on it; [`MarketError::Validation`]
    /// for a bad amount; [`MarketError::Conflict`] if the job closed or a
    /// duplicate landed while the bid was being written.
    pub async fn submit_bid(
        &self,
        actor: &Uid,
        job_id: JobId,
        new_bid: NewBid,
    ) -> Result<Bid, MarketError> {
        let job = self.get_job(job_id).await?;
        job.ensure_biddable_by(actor)?;
        if self.store.find_bid_by(job_id, actor).await?.is_some() {
            return Err(MarketError::Forbidden(
                "you already placed a bid on this job".to_string(),
            ));
        }

        let bid = Bid::create(job_id, actor.clone(), new_bid, Utc::now())?;
        self.store
            .create_bid(bid.clone())
            .await
            .inspect_err(|err| log_conflict(err, job_id, "submit bid"))?;

        self.event_bus.publish(MarketEvent::BidSubmitted {
            job_id,
            bid_id: bid.id,
            bidder_uid: actor.clone(),
            amount: bid.amount,
            timestamp: bid.created_at,
        });
        info!(%job_id, bid_id = %bid.id, actor = %actor, amount = bid.amount, "bid submitted");
        Ok(bid)
    }

    /// Rejects a single bid. Rejecting a bid that is already rejected
    /// succeeds without writing.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::Forbidden`] for anyone but the poster,
    /// [`MarketError::PreconditionFailed`] for an accepted bid, and
    /// [`MarketError::Conflict`] if the bid changed concurrently.
    pub async fn reject_bid(
        &self,
        actor: &Uid,
        job_id: JobId,
        bid_id: BidId,
    ) -> Result<Bid, MarketError> {
        let job = self.get_job(job_id).await?;
        if !job.is_posted_by(actor) {
            return Err(MarketError::Forbidden(
                "only the poster can reject a bid".to_string(),
            ));
        }
        let mut bid = self
            .store
            .get_bid(job_id, bid_id)
            .await?
            .ok_or(MarketError::BidNotFound(bid_id))?;
        if !bid.reject()? {
            debug!(%job_id, %bid_id, "bid already rejected");
            return Ok(bid);
        }

        let batch = WriteBatch::new()
            .require_bid_status(job_id, bid_id, BidStatus::Pending)
            .set_bid_status(job_id, bid_id, BidStatus::Rejected);
        self.store
            .commit(batch)
            .await
            .inspect_err(|err| log_conflict(err, job_id, "reject bid"))?;

        self.event_bus.publish(MarketEvent::BidRejected {
            job_id,
            bid_id,
            timestamp: Utc::now(),
        });
        info!(%job_id, %bid_id, actor = %actor, "bid rejected");
        Ok(bid)
    }

    /// Accepts one bid, assigning the job to its bidder and rejecting every
    /// other bid.
    ///
    /// # Errors
    ///
    /// See [`AcceptBidCoordinator::accept`].
    pub async fn accept_bid(
        &self,
        actor: &Uid,
        job_id: JobId,
        bid_id: BidId,
    ) -> Result<AcceptOutcome, MarketError> {
        let now = Utc::now();
        let outcome = self.accept.accept(actor, job_id, bid_id, now).await?;

        self.event_bus.publish(MarketEvent::BidAccepted {
            job_id,
            bid_id,
            bidder_uid: outcome.bid.bidder_uid.clone(),
            rejected_bids: outcome.rejected.len(),
            timestamp: now,
        });
        info!(
            %job_id,
            %bid_id,
            actor = %actor,
            bidder = %outcome.bid.bidder_uid,
            rejected = outcome.rejected.len(),
            "bid accepted"
        );
        Ok(outcome)
    }

    /// Records the assigned bidder's completion image.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::PreconditionFailed`] unless the job is
    /// `assigned`, [`MarketError::Forbidden`] unless `actor` is the assigned
    /// bidder, and [`MarketError::Conflict`] on a concurrent transition.
    pub async fn submit_completion(
        &self,
        actor: &Uid,
        job_id: JobId,
        completion_image_url: &str,
    ) -> Result<Job, MarketError> {
        let mut job = self.get_job(job_id).await?;
        let now = Utc::now();
        job.complete(actor, completion_image_url, now)?;
        self.store
            .update_job(job.clone(), JobStatus::Assigned)
            .await
            .inspect_err(|err| log_conflict(err, job_id, "complete"))?;

        self.event_bus.publish(MarketEvent::JobCompleted {
            job_id,
            completed_by: actor.clone(),
            timestamp: now,
        });
        info!(%job_id, actor = %actor, "job completed");
        Ok(job)
    }

    /// Records the poster's payment attestation.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::PreconditionFailed`] unless the job is
    /// `completed`, [`MarketError::Forbidden`] for anyone but the poster,
    /// and [`MarketError::Conflict`] on a concurrent transition.
    pub async fn mark_paid(&self, actor: &Uid, job_id: JobId) -> Result<Job, MarketError> {
        let mut job = self.get_job(job_id).await?;
        let now = Utc::now();
        job.mark_paid(actor, now)?;
        self.store
            .update_job(job.clone(), JobStatus::Completed)
            .await
            .inspect_err(|err| log_conflict(err, job_id, "mark paid"))?;

        self.event_bus.publish(MarketEvent::JobPaid {
            job_id,
            timestamp: now,
        });
        info!(%job_id, actor = %actor, "job paid");
        Ok(job)
    }

    /// Bids on a job as seen by `viewer`: the poster sees every bid, oldest
    /// first; anyone else sees only their own.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::JobNotFound`] if the job does not exist.
    pub async fn bids_for_job(&self, viewer: &Uid, job_id: JobId) -> Result<Vec<Bid>, MarketError> {
        let job = self.get_job(job_id).await?;
        if job.is_posted_by(viewer) {
            self.store.list_bids(job_id).await
        } else {
            Ok(self
                .store
                .find_bid_by(job_id, viewer)
                .await?
                .into_iter()
                .collect())
        }
    }

    /// Open jobs visible to `viewer`, nearest first.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::Store`] if the store is unreachable.
    pub async fn discovery_feed(
        &self,
        viewer: &Uid,
        position: Option<Coordinates>,
    ) -> Result<Vec<FeedItem>, MarketError> {
        let now = Utc::now();
        let candidates = self.store.query_jobs(&self.open_jobs_query(now)).await?;
        let mut feed = discovery_feed(viewer, position.as_ref(), &candidates, now);
        debug!(viewer = %viewer, candidates = candidates.len(), visible = feed.len(), "feed built");
        attach_posters(self.store.as_ref(), &mut feed).await;
        Ok(feed)
    }

    /// The viewer's home view: bidder and poster banners, or the discovery
    /// feed newest-first when neither applies.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::Store`] if the store is unreachable.
    pub async fn home_view(
        &self,
        viewer: &Uid,
        position: Option<Coordinates>,
    ) -> Result<HomeView, MarketError> {
        let now = Utc::now();
        let as_bidder = self.store.query_jobs(&bidder_banner_query(viewer)).await?;
        let as_poster = self.store.query_jobs(&poster_banner_query(viewer)).await?;
        let open_jobs = self.store.query_jobs(&self.open_jobs_query(now)).await?;
        let view = select_home_view(
            viewer,
            position.as_ref(),
            &as_bidder,
            &as_poster,
            &open_jobs,
            now,
        );
        Ok(enrich(self.store.as_ref(), view).await)
    }

    /// Live home view. Emits a new [`HomeView`] whenever one of its three
    /// sources changes or the viewer moves. The first views may be
    /// `loading`.
    #[must_use]
    pub fn watch_home(&self, viewer: Uid, position: Option<Coordinates>) -> HomeWatch {
        let now = Utc::now();
        let sources = [
            subscribe(Arc::clone(&self.store), bidder_banner_query(&viewer)),
            subscribe(Arc::clone(&self.store), poster_banner_query(&viewer)),
            subscribe(Arc::clone(&self.store), self.open_jobs_query(now)),
        ];
        let (sender, receiver) = mpsc::channel(HOME_WATCH_BUFFER);
        let (position_tx, position_rx) = watch::channel(position);
        let store = Arc::clone(&self.store);
        let task = tokio::spawn(run_home_watch(
            store,
            HomeViewState::new(viewer, position),
            sources,
            position_rx,
            sender,
        ));
        HomeWatch {
            receiver,
            position: position_tx,
            task,
        }
    }

    /// Jobs posted by `viewer`, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::Store`] if the store is unreachable.
    pub async fn my_jobs(&self, viewer: &Uid) -> Result<Vec<Job>, MarketError> {
        self.store
            .query_jobs(&JobQuery::posted_by(viewer.clone()))
            .await
    }

    /// Every bid `viewer` submitted, newest first, with its job.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::Store`] if the store is unreachable.
    pub async fn my_bids(&self, viewer: &Uid) -> Result<Vec<BidWithJob>, MarketError> {
        let bids = self.store.bids_by_bidder(viewer).await?;
        let mut out = Vec::with_capacity(bids.len());
        for bid in bids {
            let job = self.store.get_job(bid.job_id).await?;
            out.push(BidWithJob { bid, job });
        }
        Ok(out)
    }

    /// Jobs `viewer` finished as the assigned bidder, most recent first.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::Store`] if the store is unreachable.
    pub async fn work_history(&self, viewer: &Uid) -> Result<Vec<Job>, MarketError> {
        let query = JobQuery::assigned_to(viewer.clone())
            .with_statuses(&[JobStatus::Completed, JobStatus::Paid]);
        let mut jobs = self.store.query_jobs(&query).await?;
        jobs.sort_by(|a, b| history_instant(b).cmp(&history_instant(a)));
        Ok(jobs)
    }

    /// Reads `uid`'s profile.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::ProfileNotFound`] if they never saved one.
    pub async fn get_profile(&self, uid: &Uid) -> Result<Profile, MarketError> {
        self.store
            .get_profile(uid)
            .await?
            .ok_or_else(|| MarketError::ProfileNotFound(uid.clone()))
    }

    /// Creates or replaces `actor`'s profile. The verification flag is kept.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::Validation`] for an incomplete profile and
    /// [`MarketError::Store`] if the store is unreachable.
    pub async fn update_profile(
        &self,
        actor: &Uid,
        update: ProfileUpdate,
    ) -> Result<Profile, MarketError> {
        let existing = self.store.get_profile(actor).await?;
        let profile = Profile::apply(actor.clone(), update, existing.as_ref(), Utc::now())?;
        self.store.put_profile(profile.clone()).await?;
        info!(
            actor = %actor,
            created = existing.is_none(),
            professions = profile.professions.len(),
            "profile saved"
        );
        Ok(profile)
    }

    /// `uid`'s profile together with their work history.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::ProfileNotFound`] if they never saved a
    /// profile.
    pub async fn public_profile(&self, uid: &Uid) -> Result<PublicProfile, MarketError> {
        let profile = self.get_profile(uid).await?;
        let work_history = self.work_history(uid).await?;
        Ok(PublicProfile {
            profile,
            work_history,
        })
    }

    fn open_jobs_query(&self, now: DateTime<Utc>) -> JobQuery {
        JobQuery::open_unexpired(now, self.max_open_jobs)
    }
}

/// Views buffered per home watch.
const HOME_WATCH_BUFFER: usize = 8;

/// A live home view. Dropping it stops the watch and its subscriptions.
#[derive(Debug)]
pub struct HomeWatch {
    receiver: mpsc::Receiver<HomeView>,
    position: watch::Sender<Option<Coordinates>>,
    task: JoinHandle<()>,
}

impl HomeWatch {
    /// Waits for the next view. Returns `None` once the watch stopped.
    pub async fn next(&mut self) -> Option<HomeView> {
        self.receiver.recv().await
    }

    /// Moves the viewer. The feed is re-filtered against the new position
    /// without re-running the sources. Returns `false` if the position did
    /// not change.
    pub fn move_to(&self, position: Option<Coordinates>) -> bool {
        self.position.send_if_modified(|current| {
            let moved = *current != position;
            *current = position;
            moved
        })
    }

    /// Stops the watch.
    pub fn cancel(&mut self) {
        self.task.abort();
        self.receiver.close();
    }
}

impl Drop for HomeWatch {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run_home_watch(
    store: Arc<dyn RecordStore>,
    mut state: HomeViewState,
    sources: [Subscription; 3],
    mut positions: watch::Receiver<Option<Coordinates>>,
    sender: mpsc::Sender<HomeView>,
) {
    let [mut as_bidder, mut as_poster, mut open_jobs] = sources;
    loop {
        let event = tokio::select! {
            () = sender.closed() => break,
            snapshot = as_bidder.next() => snapshot.map(|r| r.map(HomeViewEvent::BidderJobs)),
            snapshot = as_poster.next() => snapshot.map(|r| r.map(HomeViewEvent::PosterJobs)),
            snapshot = open_jobs.next() => snapshot.map(|r| r.map(HomeViewEvent::OpenJobs)),
            moved = positions.changed() => match moved {
                Ok(()) => Some(Ok(HomeViewEvent::Position(*positions.borrow_and_update()))),
                Err(_) => break,
            },
        };
        match event {
            Some(Ok(event)) => {
                state.apply(event);
                let view = enrich(store.as_ref(), state.view(Utc::now())).await;
                if sender.send(view).await.is_err() {
                    break;
                }
            }
            Some(Err(err)) => warn!(error = %err, "home view source failed"),
            None => break,
        }
    }
    debug!("home watch stopped");
}

fn bidder_banner_query(viewer: &Uid) -> JobQuery {
    JobQuery::assigned_to(viewer.clone()).with_statuses(&[JobStatus::Assigned])
}

fn poster_banner_query(viewer: &Uid) -> JobQuery {
    JobQuery::posted_by(viewer.clone())
        .with_statuses(&[JobStatus::Assigned])
        .ordered(JobOrder::SoonestExpiry)
}

/// Attaches the selected bid and the other party's profile to each banner,
/// and poster profiles to the feed. Records that cannot be read are left
/// out.
async fn enrich(store: &dyn RecordStore, mut view: HomeView) -> HomeView {
    if let Some(banner) = view.bidder_banner.as_mut() {
        attach_bid(store, banner).await;
        banner.counterpart = load_profile(store, &banner.job.user_uid).await;
    }
    if let Some(banner) = view.poster_banner.as_mut() {
        attach_bid(store, banner).await;
        if let Some(bidder) = banner.job.assigned_bidder_uid.clone() {
            banner.counterpart = load_profile(store, &bidder).await;
        }
    }
    if let Some(feed) = view.feed.as_mut() {
        attach_posters(store, feed).await;
    }
    view
}

/// Fills in each item's poster profile, reading each poster once.
async fn attach_posters(store: &dyn RecordStore, items: &mut [FeedItem]) {
    let mut cache: HashMap<Uid, Option<Profile>> = HashMap::new();
    for item in items {
        let poster = item.job.user_uid.clone();
        item.poster = match cache.get(&poster) {
            Some(cached) => cached.clone(),
            None => {
                let loaded = load_profile(store, &poster).await;
                cache.insert(poster, loaded.clone());
                loaded
            }
        };
    }
}

async fn load_profile(store: &dyn RecordStore, uid: &Uid) -> Option<Profile> {
    match store.get_profile(uid).await {
        Ok(profile) => profile,
        Err(err) => {
            warn!(%uid, error = %err, "profile unavailable");
            None
        }
    }
}

async fn attach_bid(store: &dyn RecordStore, banner: &mut Banner) {
    let Some(bid_id) = banner.job.selected_bid_id else {
        return;
    };
    match store.get_bid(banner.job.id, bid_id).await {
        Ok(bid) => banner.bid = bid,
        Err(err) => warn!(job_id = %banner.job.id, error = %err, "banner bid unavailable"),
    }
}

fn history_instant(job: &Job) -> Option<DateTime<Utc>> {
    job.paid_at.or(job.completed_at).or(job.expires_at)
}

fn log_conflict(err: &MarketError, job_id: JobId, action: &str) {
    if matches!(err, MarketError::Conflict(_)) {
        warn!(%job_id, action, error = %err, "commit-time guard failed");
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::time::Duration as StdDuration;

    use super::*;
    use crate::domain::{BidRange, Category, EmploymentStatus, JobLocation};
    use crate::store::InMemoryStore;
    use chrono::Duration;
    use tokio::time::timeout;

    fn service() -> MarketService {
        let store: Arc<dyn RecordStore> = Arc::new(InMemoryStore::new());
        MarketService::new(store, EventBus::new(64), 100)
    }

    fn new_job_at(latitude: f64, longitude: f64) -> NewJob {
        NewJob {
            category: Category::Delivery,
            description: "deliver a parcel".to_string(),
            details: None,
            image_url: "https://img.example/parcel.jpg".to_string(),
            bid_range: BidRange {
                min: 100.0,
                max: 500.0,
            },
            location: JobLocation::Current {
                coords: Some(Coordinates {
                    latitude,
                    longitude,
                }),
            },
            radius_km: 10,
            expires_at: Utc::now() + Duration::hours(2),
        }
    }

    fn offer(amount: f64) -> NewBid {
        NewBid {
            amount,
            message: None,
        }
    }

    async fn posted(svc: &MarketService, poster: &Uid) -> Job {
        let Ok(job) = svc.create_job(poster, new_job_at(12.90, 77.50)).await else {
            panic!("create job");
        };
        job
    }

    async fn save_profile(svc: &MarketService, uid: &Uid, name: &str) -> Profile {
        let update = ProfileUpdate {
            display_name: name.to_string(),
            about: format!("{name} does odd jobs"),
            photo_url: None,
            professions: vec!["Delivery".to_string()],
            employment_status: EmploymentStatus::Other,
            organization_name: None,
        };
        let Ok(profile) = svc.update_profile(uid, update).await else {
            panic!("profile saved");
        };
        profile
    }

    async fn bid(svc: &MarketService, job: &Job, bidder: &Uid, amount: f64) -> Bid {
        let Ok(bid) = svc.submit_bid(bidder, job.id, offer(amount)).await else {
            panic!("submit bid");
        };
        bid
    }

    #[tokio::test]
    async fn create_job_emits_event() {
        let svc = service();
        let mut rx = svc.event_bus().subscribe();
        let job = posted(&svc, &Uid::new("poster")).await;
        let Ok(MarketEvent::JobCreated { job_id, .. }) = rx.recv().await else {
            panic!("expected JobCreated");
        };
        assert_eq!(job_id, job.id);
    }

    #[tokio::test]
    async fn bid_guards() {
        let svc = service();
        let poster = Uid::new("poster");
        let alice = Uid::new("alice");
        let job = posted(&svc, &poster).await;

        let own = svc.submit_bid(&poster, job.id, offer(200.0)).await;
        assert!(matches!(own, Err(MarketError::Forbidden(_))));

        let bad = svc.submit_bid(&alice, job.id, offer(0.0)).await;
        assert!(matches!(bad, Err(MarketError::Validation(_))));

        let _ = bid(&svc, &job, &alice, 200.0).await;
        let dup = svc.submit_bid(&alice, job.id, offer(250.0)).await;
        assert!(matches!(dup, Err(MarketError::Forbidden(_))));

        let missing = svc.submit_bid(&alice, JobId::new(), offer(250.0)).await;
        assert!(matches!(missing, Err(MarketError::JobNotFound(_))));
    }

    #[tokio::test]
    async fn reject_is_poster_only_and_idempotent() {
        let svc = service();
        let poster = Uid::new("poster");
        let alice = Uid::new("alice");
        let job = posted(&svc, &poster).await;
        let b = bid(&svc, &job, &alice, 200.0).await;

        let by_bidder = svc.reject_bid(&alice, job.id, b.id).await;
        assert!(matches!(by_bidder, Err(MarketError::Forbidden(_))));

        let Ok(first) = svc.reject_bid(&poster, job.id, b.id).await else {
            panic!("reject");
        };
        assert_eq!(first.status, BidStatus::Rejected);
        let Ok(second) = svc.reject_bid(&poster, job.id, b.id).await else {
            panic!("reject again");
        };
        assert_eq!(second.status, BidStatus::Rejected);
    }

    #[tokio::test]
    async fn rejecting_accepted_bid_fails_precondition() {
        let svc = service();
        let poster = Uid::new("poster");
        let job = posted(&svc, &poster).await;
        let b = bid(&svc, &job, &Uid::new("alice"), 200.0).await;
        assert!(svc.accept_bid(&poster, job.id, b.id).await.is_ok());

        let result = svc.reject_bid(&poster, job.id, b.id).await;
        assert!(matches!(result, Err(MarketError::PreconditionFailed(_))));
    }

    #[tokio::test]
    async fn delete_job_rules() {
        let svc = service();
        let poster = Uid::new("poster");
        let alice = Uid::new("alice");
        let open = posted(&svc, &poster).await;
        let _ = bid(&svc, &open, &alice, 200.0).await;

        let stranger = svc.delete_job(&alice, open.id).await;
        assert!(matches!(stranger, Err(MarketError::Forbidden(_))));
        let Ok(removed) = svc.delete_job(&poster, open.id).await else {
            panic!("delete");
        };
        assert_eq!(removed, 1);
        assert!(matches!(svc.get_job(open.id).await, Err(MarketError::JobNotFound(_))));

        let assigned = posted(&svc, &poster).await;
        let b = bid(&svc, &assigned, &alice, 200.0).await;
        assert!(svc.accept_bid(&poster, assigned.id, b.id).await.is_ok());
        let result = svc.delete_job(&poster, assigned.id).await;
        assert!(matches!(result, Err(MarketError::PreconditionFailed(_))));
    }

    #[tokio::test]
    async fn bids_for_job_respects_viewer() {
        let svc = service();
        let poster = Uid::new("poster");
        let alice = Uid::new("alice");
        let bob = Uid::new("bob");
        let job = posted(&svc, &poster).await;
        let a = bid(&svc, &job, &alice, 200.0).await;
        let b = bid(&svc, &job, &bob, 300.0).await;

        let Ok(all) = svc.bids_for_job(&poster, job.id).await else {
            panic!("poster view");
        };
        let mut ids: Vec<BidId> = all.iter().map(|bid| bid.id).collect();
        ids.sort();
        let mut expected = vec![a.id, b.id];
        expected.sort();
        assert_eq!(ids, expected);

        let Ok(own) = svc.bids_for_job(&alice, job.id).await else {
            panic!("bidder view");
        };
        assert_eq!(own, vec![a]);

        let Ok(none) = svc.bids_for_job(&Uid::new("carol"), job.id).await else {
            panic!("stranger view");
        };
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn completion_and_payment() {
        let svc = service();
        let poster = Uid::new("poster");
        let alice = Uid::new("alice");
        let job = posted(&svc, &poster).await;
        let b = bid(&svc, &job, &alice, 200.0).await;
        assert!(svc.accept_bid(&poster, job.id, b.id).await.is_ok());

        let early = svc.mark_paid(&poster, job.id).await;
        assert!(matches!(early, Err(MarketError::PreconditionFailed(_))));

        let Ok(done) = svc
            .submit_completion(&alice, job.id, "https://img.example/done.jpg")
            .await
        else {
            panic!("complete");
        };
        assert_eq!(done.status, JobStatus::Completed);

        let Ok(paid) = svc.mark_paid(&poster, job.id).await else {
            panic!("pay");
        };
        assert_eq!(paid.status, JobStatus::Paid);
        assert!(paid.selection_is_consistent());

        let Ok(history) = svc.work_history(&alice).await else {
            panic!("history");
        };
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn feed_filters_by_radius() {
        let svc = service();
        let job = posted(&svc, &Uid::new("poster")).await;
        let viewer = Uid::new("viewer");

        let Ok(near) = svc
            .discovery_feed(&viewer, Some(Coordinates { latitude: 12.95, longitude: 77.50 }))
            .await
        else {
            panic!("feed");
        };
        assert_eq!(near.first().map(|item| item.job.id), Some(job.id));

        let Ok(far) = svc
            .discovery_feed(&viewer, Some(Coordinates { latitude: 13.10, longitude: 77.50 }))
            .await
        else {
            panic!("feed");
        };
        assert!(far.is_empty());

        let Ok(unknown) = svc.discovery_feed(&viewer, None).await else {
            panic!("feed");
        };
        assert!(unknown.is_empty());
    }

    #[tokio::test]
    async fn home_view_banners_carry_selected_bid() {
        let svc = service();
        let poster = Uid::new("poster");
        let alice = Uid::new("alice");
        let job = posted(&svc, &poster).await;
        let b = bid(&svc, &job, &alice, 200.0).await;

        let Ok(before) = svc.home_view(&alice, None).await else {
            panic!("home");
        };
        assert!(before.bidder_banner.is_none());
        assert!(before.shows_feed());

        assert!(svc.accept_bid(&poster, job.id, b.id).await.is_ok());
        let Ok(bidder_home) = svc.home_view(&alice, None).await else {
            panic!("home");
        };
        let Some(ref banner) = bidder_home.bidder_banner else {
            panic!("bidder banner expected");
        };
        assert_eq!(banner.job.id, job.id);
        assert_eq!(banner.bid.as_ref().map(|bid| bid.id), Some(b.id));
        assert!(!bidder_home.shows_feed());

        let Ok(poster_home) = svc.home_view(&poster, None).await else {
            panic!("home");
        };
        assert!(poster_home.poster_banner.is_some());
        assert!(poster_home.bidder_banner.is_none());
    }

    #[tokio::test]
    async fn watch_home_follows_assignment() {
        let svc = service();
        let poster = Uid::new("poster");
        let alice = Uid::new("alice");
        let job = posted(&svc, &poster).await;
        let b = bid(&svc, &job, &alice, 200.0).await;

        let mut watch = svc.watch_home(alice.clone(), None);
        let mut settled = false;
        for _ in 0..3 {
            let Ok(Some(view)) = timeout(StdDuration::from_secs(2), watch.next()).await else {
                panic!("expected a view");
            };
            if !view.loading {
                settled = true;
                assert!(view.bidder_banner.is_none());
                break;
            }
        }
        assert!(settled);

        assert!(svc.accept_bid(&poster, job.id, b.id).await.is_ok());
        let mut banner_seen = false;
        for _ in 0..6 {
            let Ok(Some(view)) = timeout(StdDuration::from_secs(2), watch.next()).await else {
                break;
            };
            if view.bidder_banner.is_some() {
                banner_seen = true;
                break;
            }
        }
        assert!(banner_seen);
    }

    #[tokio::test]
    async fn profiles_and_public_view() {
        let svc = service();
        let poster = Uid::new("poster");
        let alice = Uid::new("alice");

        let missing = svc.get_profile(&alice).await;
        assert!(matches!(missing, Err(MarketError::ProfileNotFound(_))));

        let saved = save_profile(&svc, &alice, "Alice").await;
        let Ok(read) = svc.get_profile(&alice).await else {
            panic!("profile");
        };
        assert_eq!(read, saved);

        let job = posted(&svc, &poster).await;
        let b = bid(&svc, &job, &alice, 200.0).await;
        assert!(svc.accept_bid(&poster, job.id, b.id).await.is_ok());
        assert!(
            svc.submit_completion(&alice, job.id, "https://img.example/done.jpg")
                .await
                .is_ok()
        );

        let Ok(public) = svc.public_profile(&alice).await else {
            panic!("public profile");
        };
        assert_eq!(public.profile.display_name, "Alice");
        assert_eq!(public.work_history.iter().map(|j| j.id).collect::<Vec<_>>(), vec![job.id]);

        let nobody = svc.public_profile(&poster).await;
        assert!(matches!(nobody, Err(MarketError::ProfileNotFound(_))));
    }

    #[tokio::test]
    async fn banners_and_feed_carry_profiles() {
        let svc = service();
        let poster = Uid::new("poster");
        let alice = Uid::new("alice");
        let poster_profile = save_profile(&svc, &poster, "Priya").await;
        let alice_profile = save_profile(&svc, &alice, "Alice").await;
        let job = posted(&svc, &poster).await;

        let near = Some(Coordinates {
            latitude: 12.95,
            longitude: 77.50,
        });
        let Ok(feed) = svc.discovery_feed(&alice, near).await else {
            panic!("feed");
        };
        assert_eq!(
            feed.first().and_then(|item| item.poster.as_ref()),
            Some(&poster_profile)
        );

        let b = bid(&svc, &job, &alice, 200.0).await;
        assert!(svc.accept_bid(&poster, job.id, b.id).await.is_ok());

        let Ok(bidder_home) = svc.home_view(&alice, None).await else {
            panic!("home");
        };
        let counterpart = bidder_home
            .bidder_banner
            .as_ref()
            .and_then(|banner| banner.counterpart.as_ref());
        assert_eq!(counterpart, Some(&poster_profile));

        let Ok(poster_home) = svc.home_view(&poster, None).await else {
            panic!("home");
        };
        let counterpart = poster_home
            .poster_banner
            .as_ref()
            .and_then(|banner| banner.counterpart.as_ref());
        assert_eq!(counterpart, Some(&alice_profile));
    }

    #[tokio::test]
    async fn moving_a_watch_refilters_the_feed() {
        let svc = service();
        let _job = posted(&svc, &Uid::new("poster")).await;
        let alice = Uid::new("alice");

        let mut watch = svc.watch_home(alice, None);
        let mut settled = None;
        for _ in 0..4 {
            let Ok(Some(view)) = timeout(StdDuration::from_secs(2), watch.next()).await else {
                panic!("expected a view");
            };
            if !view.loading {
                settled = Some(view);
                break;
            }
        }
        let Some(settled) = settled else {
            panic!("watch never settled");
        };
        assert_eq!(settled.feed.map(|feed| feed.len()), Some(0));

        let near = Some(Coordinates {
            latitude: 12.95,
            longitude: 77.50,
        });
        assert!(watch.move_to(near));
        assert!(!watch.move_to(near));
        let Ok(Some(moved)) = timeout(StdDuration::from_secs(2), watch.next()).await else {
            panic!("expected a view after moving");
        };
        assert_eq!(moved.feed.map(|feed| feed.len()), Some(1));
    }
}
