//! Route Geometry
//!
//! Provides Haversine distance and bearing helpers plus a cumulative
//! arc-length index over a route polyline.

mod error;
mod geo;
mod index;

pub use error::GeometryError;
pub use geo::{destination, haversine_m, initial_bearing_deg, normalize_delta_deg, EARTH_RADIUS_M};
pub use index::{DistanceIndex, DEFAULT_HEADING_LOOKAHEAD_M};

use serde::{Deserialize, Serialize};

/// A geographic point in degrees (WGS84)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lng: f64,
    pub lat: f64,
}

impl GeoPoint {
    /// Create a point from longitude and latitude
    pub fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat }
    }

    /// Both coordinates finite and inside the valid lat/lng range
    pub fn is_valid(&self) -> bool {
        self.lng.is_finite()
            && self.lat.is_finite()
            && (-180.0..=180.0).contains(&self.lng)
            && (-90.0..=90.0).contains(&self.lat)
    }

    /// Great-circle distance to another point in meters
    pub fn distance_to(&self, other: &GeoPoint) -> f64 {
        haversine_m(*self, *other)
    }
}
