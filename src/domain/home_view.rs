//! Home view selection.
//!
//! A viewer can be a poster and a bidder at the same time, across many jobs.
//! The home view surfaces at most one bidder banner and at most one poster
//! banner, and falls back to the discovery feed when neither exists.
//!
//! - Bidder banner: jobs assigned to the viewer and still `assigned`, newest
//!   `createdAtMillis` first.
//! - Poster banner: the viewer's own `assigned` jobs, soonest `expiresAt`
//!   first (a missing expiry counts as the earliest instant).
//!
//! Ties keep the first job in input order. [`HomeViewState`] is the reducer
//! form used with live subscriptions.

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use super::bid::Bid;
use super::feed::{FeedItem, newest_first_feed};
use super::geo::Coordinates;
use super::job::{Job, JobStatus};
use super::profile::Profile;
use super::Uid;

/// A highlighted job, with its selected bid and the other party's profile
/// when they could be loaded.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Banner {
    /// The highlighted job.
    pub job: Job,
    /// The job's accepted bid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bid: Option<Bid>,
    /// The poster on a bidder banner, the assigned bidder on a poster
    /// banner.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counterpart: Option<Profile>,
}

impl Banner {
    fn for_job(job: &Job) -> Self {
        Self {
            job: job.clone(),
            bid: None,
            counterpart: None,
        }
    }
}

/// What the viewer's home screen shows.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HomeView {
    /// "You have a job": the job the viewer must complete.
    pub bidder_banner: Option<Banner>,
    /// "Your job is assigned": the viewer's job closest to lapsing.
    pub poster_banner: Option<Banner>,
    /// Discovery feed, present only when no banner is shown and every source
    /// has loaded.
    pub feed: Option<Vec<FeedItem>>,
    /// `true` until every source delivered its first snapshot.
    pub loading: bool,
}

impl HomeView {
    /// Returns `true` if the fallback feed is shown.
    #[must_use]
    pub const fn shows_feed(&self) -> bool {
        self.feed.is_some()
    }
}

/// Picks the bidder banner job from the viewer's jobs-as-bidder.
#[must_use]
pub fn select_bidder_banner<'a>(viewer: &Uid, jobs: &'a [Job]) -> Option<&'a Job> {
    jobs.iter()
        .filter(|job| {
            job.status == JobStatus::Assigned && job.assigned_bidder_uid.as_ref() == Some(viewer)
        })
        .min_by_key(|job| std::cmp::Reverse(job.created_at_millis))
}

/// Picks the poster banner job from the viewer's jobs-as-poster.
#[must_use]
pub fn select_poster_banner<'a>(viewer: &Uid, jobs: &'a [Job]) -> Option<&'a Job> {
    jobs.iter()
        .filter(|job| job.status == JobStatus::Assigned && job.is_posted_by(viewer))
        .min_by_key(|job| job.expires_at.unwrap_or(DateTime::<Utc>::MIN_UTC))
}

/// Builds the complete home view from fully loaded inputs.
#[must_use]
pub fn select_home_view(
    viewer: &Uid,
    position: Option<&Coordinates>,
    as_bidder: &[Job],
    as_poster: &[Job],
    open_jobs: &[Job],
    now: DateTime<Utc>,
) -> HomeView {
    let bidder_banner = select_bidder_banner(viewer, as_bidder).map(Banner::for_job);
    let poster_banner = select_poster_banner(viewer, as_poster).map(Banner::for_job);
    let feed = (bidder_banner.is_none() && poster_banner.is_none())
        .then(|| newest_first_feed(viewer, position, open_jobs, now));
    HomeView {
        bidder_banner,
        poster_banner,
        feed,
        loading: false,
    }
}

/// A snapshot delivered by one of the home view's three sources.
#[derive(Debug, Clone, PartialEq)]
pub enum HomeViewEvent {
    /// Jobs assigned to the viewer that are still `assigned`.
    BidderJobs(Vec<Job>),
    /// The viewer's own `assigned` jobs.
    PosterJobs(Vec<Job>),
    /// Open, unexpired discovery candidates.
    OpenJobs(Vec<Job>),
    /// The viewer moved, or lost their position.
    Position(Option<Coordinates>),
}

/// Reducer over [`HomeViewEvent`]s. Sources that have not delivered yet are
/// `None`.
#[derive(Debug, Clone)]
pub struct HomeViewState {
    viewer: Uid,
    position: Option<Coordinates>,
    as_bidder: Option<Vec<Job>>,
    as_poster: Option<Vec<Job>>,
    open_jobs: Option<Vec<Job>>,
}

impl HomeViewState {
    /// Creates an empty state for `viewer`.
    #[must_use]
    pub const fn new(viewer: Uid, position: Option<Coordinates>) -> Self {
        Self {
            viewer,
            position,
            as_bidder: None,
            as_poster: None,
            open_jobs: None,
        }
    }

    /// Folds one event into the state.
    pub fn apply(&mut self, event: HomeViewEvent) {
        match event {
            HomeViewEvent::BidderJobs(jobs) => self.as_bidder = Some(jobs),
            HomeViewEvent::PosterJobs(jobs) => self.as_poster = Some(jobs),
            HomeViewEvent::OpenJobs(jobs) => self.open_jobs = Some(jobs),
            HomeViewEvent::Position(position) => self.position = position,
        }
    }

    /// Renders the view as of `now`.
    ///
    /// Banners appear as soon as their own source has loaded. The feed is
    /// only shown once both banner sources have loaded empty and the open
    /// jobs have arrived.
    #[must_use]
    pub fn view(&self, now: DateTime<Utc>) -> HomeView {
        let bidder_banner = self
            .as_bidder
            .as_deref()
            .and_then(|jobs| select_bidder_banner(&self.viewer, jobs))
            .map(Banner::for_job);
        let poster_banner = self
            .as_poster
            .as_deref()
            .and_then(|jobs| select_poster_banner(&self.viewer, jobs))
            .map(Banner::for_job);

        let banners_loaded = self.as_bidder.is_some() && self.as_poster.is_some();
        let feed = match &self.open_jobs {
            Some(open) if banners_loaded && bidder_banner.is_none() && poster_banner.is_none() => {
                Some(newest_first_feed(
                    &self.viewer,
                    self.position.as_ref(),
                    open,
                    now,
                ))
            }
            _ => None,
        };

        HomeView {
            bidder_banner,
            poster_banner,
            feed,
            loading: !(banners_loaded && self.open_jobs.is_some()),
        }
    }
}
