//! Cumulative Arc-Length Index

use crate::error::GeometryError;
use crate::geo::{haversine_m, initial_bearing_deg};
use crate::GeoPoint;
use tracing::{debug, warn};

/// Forward window used to derive headings (meters)
pub const DEFAULT_HEADING_LOOKAHEAD_M: f64 = 20.0;

/// Cumulative distance per vertex over an immutable polyline
#[derive(Debug, Clone, Default)]
pub struct DistanceIndex {
    /// Route vertices
    points: Vec<GeoPoint>,
    /// Distance from the first vertex to each vertex (meters)
    cumulative: Vec<f64>,
}

impl DistanceIndex {
    /// Build the index in one pass. Degenerate input yields an empty index.
    pub fn build(polyline: &[GeoPoint]) -> Self {
        if polyline.len() < 2 {
            debug!("Polyline has {} points, building empty index", polyline.len());
            return Self::empty();
        }
        if let Some(bad) = polyline.iter().position(|p| !p.is_valid()) {
            warn!(
                "Polyline vertex {} has invalid coordinates, building empty index",
                bad
            );
            return Self::empty();
        }

        let mut cumulative = Vec::with_capacity(polyline.len());
        cumulative.push(0.0);
        let mut total = 0.0;
        for pair in polyline.windows(2) {
            total += haversine_m(pair[0], pair[1]);
            cumulative.push(total);
        }

        debug!(
            "Built distance index: {} vertices, {:.1} m",
            polyline.len(),
            total
        );

        Self {
            points: polyline.to_vec(),
            cumulative,
        }
    }

    /// An index with no vertices
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of indexed vertices
    pub fn len(&self) -> usize {
        self.cumulative.len()
    }

    /// Check if the index has no vertices
    pub fn is_empty(&self) -> bool {
        self.cumulative.is_empty()
    }

    /// Total route length in meters (0 when empty)
    pub fn total_length(&self) -> f64 {
        self.cumulative.last().copied().unwrap_or(0.0)
    }

    /// Indexed vertices
    pub fn points(&self) -> &[GeoPoint] {
        &self.points
    }

    /// Cumulative distance at vertex `i`
    pub fn distance_at_vertex(&self, i: usize) -> Option<f64> {
        self.cumulative.get(i).copied()
    }

    /// Interpolated point at distance `d` along the route (clamped to the route)
    pub fn point_at_distance(&self, d: f64) -> Result<GeoPoint, GeometryError> {
        let d = self.clamp_query(d)?;
        let seg = self.segment_containing(d);
        let (a, b) = (self.points[seg], self.points[seg + 1]);
        let seg_len = self.cumulative[seg + 1] - self.cumulative[seg];
        if seg_len <= f64::EPSILON {
            return Ok(a);
        }
        let t = (d - self.cumulative[seg]) / seg_len;
        Ok(GeoPoint {
            lng: a.lng + (b.lng - a.lng) * t,
            lat: a.lat + (b.lat - a.lat) * t,
        })
    }

    /// Route heading at distance `d`, measured over the lookahead window
    pub fn heading_at_distance(&self, d: f64) -> Result<f64, GeometryError> {
        let d = self.clamp_query(d)?;
        let total = self.total_length();
        let (from, to) = if d + DEFAULT_HEADING_LOOKAHEAD_M <= total {
            (d, d + DEFAULT_HEADING_LOOKAHEAD_M)
        } else {
            // Near the route end, look backwards instead
            ((total - DEFAULT_HEADING_LOOKAHEAD_M).max(0.0), total)
        };
        let a = self.point_at_distance(from)?;
        let b = self.point_at_distance(to)?;
        if haversine_m(a, b) <= f64::EPSILON {
            return Ok(self.first_segment_bearing());
        }
        Ok(initial_bearing_deg(a, b))
    }

    /// Distance along the route of the position nearest to `p`
    pub fn nearest_distance_to_point(&self, p: GeoPoint) -> Result<f64, GeometryError> {
        if self.is_empty() {
            return Err(GeometryError::EmptyIndex);
        }
        if !p.is_valid() {
            return Err(GeometryError::NonFinite("point"));
        }

        let nearest = self
            .points
            .iter()
            .enumerate()
            .map(|(i, v)| (i, haversine_m(*v, p)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, _)| i)
            .ok_or(GeometryError::EmptyIndex)?;

        // Refine on the two segments touching the nearest vertex
        let mut best = (self.cumulative[nearest], haversine_m(self.points[nearest], p));
        for seg in [nearest.checked_sub(1), Some(nearest)].into_iter().flatten() {
            if seg + 1 >= self.points.len() {
                continue;
            }
            let (t, dist) = project_onto_segment(self.points[seg], self.points[seg + 1], p);
            if dist < best.1 {
                best = (self.along_segment(seg, t), dist);
            }
        }

        Ok(best.0)
    }

    /// Nearest position to `p` on the stretch `[from, to]` of the route.
    ///
    /// Positions outside the stretch are never returned, however close, so
    /// a parallel leg further along (switchbacks) cannot capture the snap.
    pub fn nearest_distance_in_range(
        &self,
        p: GeoPoint,
        from: f64,
        to: f64,
    ) -> Result<f64, GeometryError> {
        let from = self.clamp_query(from)?;
        let to = self.clamp_query(to)?;
        if !p.is_valid() {
            return Err(GeometryError::NonFinite("point"));
        }
        let (from, to) = if from <= to { (from, to) } else { (to, from) };

        let mut best: Option<(f64, f64)> = None;
        for seg in self.segment_containing(from)..=self.segment_containing(to) {
            let (t, _) = project_onto_segment(self.points[seg], self.points[seg + 1], p);
            let along = self.along_segment(seg, t).clamp(from, to);
            let dist = haversine_m(self.point_at_distance(along)?, p);
            if best.map_or(true, |(_, d)| dist < d) {
                best = Some((along, dist));
            }
        }

        best.map(|(along, _)| along).ok_or(GeometryError::EmptyIndex)
    }

    fn along_segment(&self, seg: usize, t: f64) -> f64 {
        self.cumulative[seg] + t * (self.cumulative[seg + 1] - self.cumulative[seg])
    }

    fn clamp_query(&self, d: f64) -> Result<f64, GeometryError> {
        if self.is_empty() {
            return Err(GeometryError::EmptyIndex);
        }
        if !d.is_finite() {
            return Err(GeometryError::NonFinite("distance"));
        }
        Ok(d.clamp(0.0, self.total_length()))
    }

    /// Index of the segment whose span contains `d` (d already clamped)
    fn segment_containing(&self, d: f64) -> usize {
        let upper = self.cumulative.partition_point(|&c| c <= d);
        upper.saturating_sub(1).min(self.cumulative.len() - 2)
    }

    fn first_segment_bearing(&self) -> f64 {
        self.points
            .windows(2)
            .find(|w| haversine_m(w[0], w[1]) > f64::EPSILON)
            .map(|w| initial_bearing_deg(w[0], w[1]))
            .unwrap_or(0.0)
    }
}

/// Project `p` onto segment a→b in a local equirectangular frame.
/// Returns the segment parameter `t` in [0, 1] and the distance to the foot.
fn project_onto_segment(a: GeoPoint, b: GeoPoint, p: GeoPoint) -> (f64, f64) {
    let meters_per_deg = crate::EARTH_RADIUS_M.to_radians();
    let cos_lat = a.lat.to_radians().cos();
    let to_local = |q: GeoPoint| {
        (
            (q.lng - a.lng) * cos_lat * meters_per_deg,
            (q.lat - a.lat) * meters_per_deg,
        )
    };

    let (bx, by) = to_local(b);
    let (px, py) = to_local(p);
    let len_sq = bx * bx + by * by;
    if len_sq <= f64::EPSILON {
        return (0.0, (px * px + py * py).sqrt());
    }
    let t = ((px * bx + py * by) / len_sq).clamp(0.0, 1.0);
    let (fx, fy) = (bx * t, by * t);
    (t, ((px - fx).powi(2) + (py - fy).powi(2)).sqrt())
}
