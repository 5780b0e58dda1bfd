//! Polyline builders for tests, expressed in local meters

use route_geometry::{destination, GeoPoint};

/// Incremental route builder driving a virtual pen over the globe
pub(crate) struct PathBuilder {
    points: Vec<GeoPoint>,
    heading: f64,
}

impl PathBuilder {
    pub(crate) fn new(heading: f64) -> Self {
        Self {
            points: vec![GeoPoint::new(11.0, 46.0)],
            heading,
        }
    }

    fn pen(&self) -> GeoPoint {
        *self.points.last().unwrap()
    }

    /// Straight section sampled every `step` meters
    pub(crate) fn straight(mut self, length: f64, step: f64) -> Self {
        let n = (length / step).round().max(1.0) as usize;
        let actual = length / n as f64;
        for _ in 0..n {
            let next = destination(self.pen(), self.heading, actual);
            self.points.push(next);
        }
        self
    }

    /// Circular arc; positive `angle_deg` turns right
    pub(crate) fn arc(mut self, radius: f64, angle_deg: f64, step: f64) -> Self {
        let arc_len = radius * angle_deg.abs().to_radians();
        let n = (arc_len / step).round().max(1.0) as usize;
        let per_step = angle_deg / n as f64;
        let chord = 2.0 * radius * (per_step.abs().to_radians() / 2.0).sin();
        for _ in 0..n {
            // Chord direction is halfway through the step's heading change
            let bearing = self.heading + per_step / 2.0;
            let next = destination(self.pen(), bearing, chord);
            self.points.push(next);
            self.heading += per_step;
        }
        self
    }

    pub(crate) fn build(self) -> Vec<GeoPoint> {
        self.points
    }
}
