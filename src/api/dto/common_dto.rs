//! Shared DTO types used across multiple endpoints.

use serde::Deserialize;
use utoipa::IntoParams;

use crate::domain::Coordinates;
use crate::error::MarketError;

/// Viewer position query parameters. Pass both or neither.
#[derive(Debug, Clone, Copy, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PositionParams {
    /// Viewer latitude in degrees, `[-90, 90]`.
    #[serde(default)]
    pub lat: Option<f64>,
    /// Viewer longitude in degrees, `[-180, 180]`.
    #[serde(default)]
    pub lon: Option<f64>,
}

impl PositionParams {
    /// Converts the parameters into a validated position. Both absent means
    /// the position is unknown.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::Validation`] when only one coordinate is given
    /// or either is out of range.
    pub fn position(&self) -> Result<Option<Coordinates>, MarketError> {
        match (self.lat, self.lon) {
            (None, None) => Ok(None),
            (Some(latitude), Some(longitude)) => Coordinates::new(latitude, longitude).map(Some),
            _ => Err(MarketError::Validation(
                "lat and lon must be given together".to_string(),
            )),
        }
    }
}
