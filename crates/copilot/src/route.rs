//! Route files
//!
//! JSON polyline plus optional zone classification.

use crate::error::{CopilotError, Result};
use curve_detection::{Zone, ZoneCharacter};
use route_geometry::{destination, GeoPoint};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Polyline and zones as stored on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteFile {
    pub points: Vec<GeoPoint>,
    #[serde(default)]
    pub zones: Vec<Zone>,
}

impl RouteFile {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|source| CopilotError::RouteIo {
            path: path.to_path_buf(),
            source,
        })?;
        let route = Self::from_json(&json)?;
        info!(
            "Loaded route {} ({} points, {} zones)",
            path.display(),
            route.points.len(),
            route.zones.len()
        );
        Ok(route)
    }
}

/// Heading-following polyline generator
struct Course {
    points: Vec<GeoPoint>,
    heading: f64,
}

impl Course {
    fn new(start: GeoPoint, heading: f64) -> Self {
        Self {
            points: vec![start],
            heading,
        }
    }

    fn last(&self) -> GeoPoint {
        self.points[self.points.len() - 1]
    }

    fn straight(mut self, length_m: f64) -> Self {
        let steps = (length_m / 20.0).ceil().max(1.0) as usize;
        let step = length_m / steps as f64;
        for _ in 0..steps {
            let next = destination(self.last(), self.heading, step);
            self.points.push(next);
        }
        self
    }

    /// Constant-radius bend; positive angles turn right
    fn bend(mut self, radius_m: f64, angle_deg: f64) -> Self {
        let arc_length = radius_m * angle_deg.abs().to_radians();
        let steps = (arc_length / 10.0).ceil().max(2.0) as usize;
        let turn = angle_deg / steps as f64;
        let chord = 2.0 * radius_m * (turn.abs().to_radians() / 2.0).sin();
        for _ in 0..steps {
            let next = destination(self.last(), self.heading + turn / 2.0, chord);
            self.heading += turn;
            self.points.push(next);
        }
        self
    }
}

/// Synthetic mountain road used by `demo`: a fast transit stretch, a
/// technical section with a chicane and a hairpin, then a short town.
pub fn demo_route() -> RouteFile {
    let course = Course::new(GeoPoint::new(11.35, 46.5), 10.0)
        .straight(800.0)
        .bend(400.0, 25.0)
        .straight(1_200.0)
        .bend(50.0, 90.0)
        .straight(400.0)
        .bend(60.0, -50.0)
        .straight(20.0)
        .bend(60.0, 50.0)
        .straight(500.0)
        .bend(15.0, -170.0)
        .straight(600.0)
        .bend(65.0, 60.0)
        .straight(700.0)
        .bend(25.0, -90.0)
        .straight(400.0);

    let points = course.points;
    let total: f64 = points.windows(2).map(|w| w[0].distance_to(&w[1])).sum();

    RouteFile {
        points,
        zones: vec![
            Zone {
                id: 1,
                character: ZoneCharacter::Transit,
                start_distance: 0.0,
                end_distance: 2_000.0,
            },
            Zone {
                id: 2,
                character: ZoneCharacter::Technical,
                start_distance: 2_000.0,
                end_distance: total - 1_200.0,
            },
            Zone {
                id: 3,
                character: ZoneCharacter::Urban,
                start_distance: total - 1_200.0,
                end_distance: total + 1.0,
            },
        ],
    }
}
