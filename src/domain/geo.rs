//! Geospatial visibility filter.
//!
//! [`visible`] decides whether an open job is shown to a viewer at a given
//! position. It is a pure function: no store access, the clock is passed in.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::job::{Job, JobStatus};
use super::Uid;
use crate::error::MarketError;

/// Mean Earth radius used by the haversine formula, in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A WGS-84 position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Coordinates {
    /// Latitude in degrees, `-90..=90`.
    pub latitude: f64,
    /// Longitude in degrees, `-180..=180`.
    pub longitude: f64,
}

impl Coordinates {
    /// Creates a validated coordinate pair.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::Validation`] if either component is not finite
    /// or out of range.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, MarketError> {
        let coords = Self {
            latitude,
            longitude,
        };
        coords.validate()?;
        Ok(coords)
    }

    /// Checks the coordinate ranges.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::Validation`] if either component is not finite
    /// or out of range.
    pub fn validate(&self) -> Result<(), MarketError> {
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(MarketError::Validation(format!(
                "latitude {} out of range",
                self.latitude
            )));
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(MarketError::Validation(format!(
                "longitude {} out of range",
                self.longitude
            )));
        }
        Ok(())
    }
}

/// Great-circle distance in kilometres between two optional points.
///
/// A missing endpoint yields [`f64::INFINITY`], which never satisfies a
/// radius check.
#[must_use]
pub fn km_between(a: Option<&Coordinates>, b: Option<&Coordinates>) -> f64 {
    let (Some(a), Some(b)) = (a, b) else {
        return f64::INFINITY;
    };
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    // Rounding can push h a hair above 1 for antipodal points.
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

/// Outcome of the visibility filter for one job and one viewer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Visibility {
    /// Whether the job belongs in the viewer's discovery feed.
    pub visible: bool,
    /// Distance from the viewer to the job; infinite when undefined.
    pub distance_km: f64,
}

impl Visibility {
    const HIDDEN: Self = Self {
        visible: false,
        distance_km: f64::INFINITY,
    };
}

/// Applies the visibility rules, in order:
///
/// 1. the viewer's own jobs are hidden;
/// 2. only `open` jobs are shown;
/// 3. the job must expire strictly after `now`;
/// 4. both the job and the viewer must have a captured position;
/// 5. the haversine distance must not exceed the job's radius.
#[must_use]
pub fn visible(
    job: &Job,
    viewer: &Uid,
    viewer_position: Option<&Coordinates>,
    now: DateTime<Utc>,
) -> Visibility {
    if &job.user_uid == viewer || job.status != JobStatus::Open {
        return Visibility::HIDDEN;
    }
    if !job.expires_at.is_some_and(|expires_at| expires_at > now) {
        return Visibility::HIDDEN;
    }
    let job_position = job.location.coordinates();
    if job_position.is_none() || viewer_position.is_none() {
        return Visibility::HIDDEN;
    }

    let distance_km = km_between(job_position, viewer_position);
    Visibility {
        visible: distance_km.is_finite() && distance_km <= f64::from(job.radius_km),
        distance_km,
    }
}
