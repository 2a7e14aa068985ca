//! Discovery feeds built from the visibility filter.

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use super::geo::{Coordinates, visible};
use super::job::Job;
use super::profile::Profile;
use super::Uid;

/// A job shown in a feed, with its distance from the viewer.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FeedItem {
    /// The job record.
    #[serde(flatten)]
    pub job: Job,
    /// Great-circle distance from the viewer in kilometres.
    pub distance_km: f64,
    /// The poster's profile, when they have one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poster: Option<Profile>,
}

/// Visible jobs sorted by ascending distance. Jobs at equal distance keep
/// their input order.
#[must_use]
pub fn discovery_feed(
    viewer: &Uid,
    position: Option<&Coordinates>,
    candidates: &[Job],
    now: DateTime<Utc>,
) -> Vec<FeedItem> {
    let mut items = visible_items(viewer, position, candidates, now);
    items.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
    items
}

/// Visible jobs sorted newest-first, used as the home view fallback.
#[must_use]
pub fn newest_first_feed(
    viewer: &Uid,
    position: Option<&Coordinates>,
    candidates: &[Job],
    now: DateTime<Utc>,
) -> Vec<FeedItem> {
    let mut items = visible_items(viewer, position, candidates, now);
    items.sort_by(|a, b| b.job.created_at_millis.cmp(&a.job.created_at_millis));
    items
}

fn visible_items(
    viewer: &Uid,
    position: Option<&Coordinates>,
    candidates: &[Job],
    now: DateTime<Utc>,
) -> Vec<FeedItem> {
    candidates
        .iter()
        .filter_map(|job| {
            let visibility = visible(job, viewer, position, now);
            visibility.visible.then(|| FeedItem {
                job: job.clone(),
                distance_km: visibility.distance_km,
                poster: None,
            })
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::job::{BidRange, Category, JobLocation, NewJob};
    use chrono::Duration;

    fn job(poster: &str, latitude: f64, created_offset_secs: i64) -> Job {
        let now = Utc::now() + Duration::seconds(created_offset_secs);
        let new_job = NewJob {
            category: Category::Other,
            description: format!("job at {latitude}"),
            details: None,
            image_url: "https://img.example/j.jpg".to_string(),
            bid_range: BidRange {
                min: 10.0,
                max: 20.0,
            },
            location: JobLocation::Current {
                coords: Some(Coordinates {
                    latitude,
                    longitude: 77.5,
                }),
            },
            radius_km: 50,
            expires_at: now + Duration::hours(1),
        };
        let Ok(job) = Job::create(Uid::new(poster), new_job, now) else {
            panic!("valid job");
        };
        job
    }

    fn here() -> Coordinates {
        Coordinates {
            latitude: 12.90,
            longitude: 77.50,
        }
    }

    #[test]
    fn discovery_is_distance_ordered() {
        let far = job("p1", 13.10, 0);
        let near = job("p2", 12.91, -10);
        let mid = job("p3", 13.00, 5);
        let viewer = Uid::new("viewer");

        let feed = discovery_feed(&viewer, Some(&here()), &[far, near, mid], Utc::now());
        let latitudes: Vec<f64> = feed
            .iter()
            .filter_map(|item| item.job.location.coordinates().map(|c| c.latitude))
            .collect();
        assert_eq!(latitudes, vec![12.91, 13.00, 13.10]);
    }

    #[test]
    fn equal_distance_keeps_input_order() {
        let a = job("p1", 13.0, 0);
        let b = job("p2", 13.0, 0);
        let ids = [a.id, b.id];
        let feed = discovery_feed(&Uid::new("viewer"), Some(&here()), &[a, b], Utc::now());
        let out: Vec<_> = feed.iter().map(|i| i.job.id).collect();
        assert_eq!(out, ids);
    }

    #[test]
    fn newest_first_excludes_own_jobs() {
        let older = job("p1", 12.95, -60);
        let newer = job("p2", 13.05, 0);
        let mine = job("viewer", 12.90, 30);
        let expected = vec![newer.id, older.id];

        let feed = newest_first_feed(
            &Uid::new("viewer"),
            Some(&here()),
            &[older, newer, mine],
            Utc::now(),
        );
        let out: Vec<_> = feed.iter().map(|i| i.job.id).collect();
        assert_eq!(out, expected);
    }

    #[test]
    fn feed_item_serializes_distance_alongside_job_fields() {
        let feed = discovery_feed(
            &Uid::new("viewer"),
            Some(&here()),
            &[job("p1", 12.95, 0)],
            Utc::now(),
        );
        let Some(item) = feed.first() else {
            panic!("one visible job");
        };
        let Ok(value) = serde_json::to_value(item) else {
            panic!("serializable");
        };
        assert!(value.get("distanceKm").is_some());
        assert!(value.get("userUid").is_some());
    }
}
