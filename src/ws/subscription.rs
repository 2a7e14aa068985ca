//! Per-connection subscription manager.
//!
//! Tracks which job IDs a WebSocket client is subscribed to and
//! provides server-side event filtering.

use std::collections::HashSet;

use crate::domain::JobId;

/// Manages the set of job subscriptions for a single WebSocket connection.
#[derive(Debug, Default)]
pub struct SubscriptionManager {
    /// Subscribed job IDs. If `subscribe_all` is true, this set is ignored.
    job_ids: HashSet<JobId>,
    /// Whether the client subscribes to all jobs (wildcard `"*"`).
    subscribe_all: bool,
}

impl SubscriptionManager {
    /// Creates a new empty subscription manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds job IDs to the subscription set.
    pub fn subscribe(&mut self, ids: &[JobId], wildcard: bool) {
        if wildcard {
            self.subscribe_all = true;
        }
        self.job_ids.extend(ids.iter().copied());
    }

    /// Removes job IDs. `wildcard` also drops the `"*"` subscription.
    pub fn unsubscribe(&mut self, ids: &[JobId], wildcard: bool) {
        if wildcard {
            self.subscribe_all = false;
        }
        for id in ids {
            self.job_ids.remove(id);
        }
    }

    /// Returns `true` if the given job ID matches the subscription filter.
    #[must_use]
    pub fn matches(&self, job_id: JobId) -> bool {
        self.subscribe_all || self.job_ids.contains(&job_id)
    }

    /// Returns the number of explicitly subscribed job IDs.
    #[must_use]
    pub fn count(&self) -> usize {
        self.job_ids.len()
    }

    /// Returns `true` if the wildcard subscription is active.
    #[must_use]
    pub const fn is_subscribed_all(&self) -> bool {
        self.subscribe_all
    }
}

/// Splits raw ids into parsed job IDs and the wildcard flag. Returns the
/// offending value if one is neither `"*"` nor a UUID.
///
/// # Errors
///
/// Returns the first entry that does not parse.
pub fn parse_job_ids(raw: &[String]) -> Result<(Vec<JobId>, bool), String> {
    let mut ids = Vec::with_capacity(raw.len());
    let mut wildcard = false;
    for value in raw {
        if value == "*" {
            wildcard = true;
        } else {
            let uuid = value.parse::<uuid::Uuid>().map_err(|_| value.clone())?;
            ids.push(JobId::from_uuid(uuid));
        }
    }
    Ok((ids, wildcard))
}
