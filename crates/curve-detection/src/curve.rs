//! Rally-style curve detection

use crate::chicane::group_chicanes;
use crate::event::{checked_distance, checked_severity, Direction, EventId, EventSource, Modifier};
use route_geometry::{
    initial_bearing_deg, normalize_delta_deg, DistanceIndex, GeoPoint, GeometryError,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Curve detector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Heading change that opens a run (degrees, default: 8)
    pub start_threshold_deg: f64,
    /// Heading change that keeps a run going (degrees, default: 5)
    pub continue_threshold_deg: f64,
    /// Minimum accumulated heading change for an event (degrees, default: 15)
    pub min_total_deg: f64,
    /// Segments shorter than this are treated as degenerate (meters)
    pub min_segment_m: f64,
    /// Fold close opposite-direction curves into chicanes
    pub group_chicanes: bool,
    /// Maximum gap between chicane elements (meters, default: 40)
    pub chicane_max_gap_m: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            start_threshold_deg: 8.0,
            continue_threshold_deg: 5.0,
            min_total_deg: 15.0,
            min_segment_m: 0.01,
            group_chicanes: true,
            chicane_max_gap_m: 40.0,
        }
    }
}

/// A discrete curve on the route
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveEvent {
    pub id: EventId,
    /// Apex position
    pub position: GeoPoint,
    pub direction: Direction,
    /// 1 (gentle) ..= 6 (hairpin)
    pub severity: u8,
    pub angle_degrees: f64,
    pub radius_meters: f64,
    pub modifier: Modifier,
    /// Distance from route start to the curve entry (meters)
    pub distance_from_start: f64,
    /// Distance from route start to the apex (meters)
    pub apex_distance: f64,
    /// Arc length of the curve (meters)
    pub length_meters: f64,
    pub is_chicane: bool,
    /// Chicane elements in route order (empty unless `is_chicane`)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chicane_children: Vec<CurveEvent>,
}

impl CurveEvent {
    /// Distance from route start to the curve exit (meters)
    pub fn exit_distance(&self) -> f64 {
        self.distance_from_start + self.length_meters
    }
}

impl EventSource for CurveEvent {
    fn id(&self) -> EventId {
        self.id
    }

    fn distance(&self) -> Option<f64> {
        checked_distance(self.distance_from_start)
    }

    fn severity(&self) -> Option<u8> {
        checked_severity(self.severity)
    }

    fn direction(&self) -> Direction {
        self.direction
    }

    fn angle_degrees(&self) -> f64 {
        self.angle_degrees
    }

    fn modifier(&self) -> Modifier {
        self.modifier
    }

    fn is_chicane(&self) -> bool {
        self.is_chicane
    }

    fn chicane_parts(&self) -> Vec<(Direction, u8)> {
        self.chicane_children
            .iter()
            .map(|c| (c.direction, c.severity))
            .collect()
    }
}

/// Severity from radius banding, escalated for large heading changes
pub fn severity_for(radius_m: f64, angle_deg: f64) -> u8 {
    let base: u8 = if radius_m > 200.0 {
        1
    } else if radius_m > 120.0 {
        2
    } else if radius_m > 70.0 {
        3
    } else if radius_m > 40.0 {
        4
    } else if radius_m > 20.0 {
        5
    } else {
        6
    };

    if angle_deg > 120.0 {
        (base + 1).min(6)
    } else if base < 4 && angle_deg > 90.0 {
        (base + 1).min(5)
    } else {
        base
    }
}

/// Heading change measured at one vertex
#[derive(Debug, Clone, Copy)]
struct TurnSample {
    /// Original polyline vertex index
    vertex: usize,
    /// Signed heading change (degrees, positive = right)
    delta: f64,
    /// Length of the segment entering the vertex
    seg_in: f64,
    /// Length of the segment leaving the vertex
    seg_out: f64,
}

/// Discrete curve detector
pub struct CurveDetector {
    config: DetectorConfig,
}

impl CurveDetector {
    /// Create a new curve detector
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    /// Detect curves on a raw polyline
    pub fn detect_polyline(&self, polyline: &[GeoPoint]) -> Vec<CurveEvent> {
        self.detect(&DistanceIndex::build(polyline))
    }

    /// Detect curves on an indexed route, in route order
    pub fn detect(&self, index: &DistanceIndex) -> Vec<CurveEvent> {
        let samples = match self.turn_samples(index) {
            Ok(samples) => samples,
            Err(e) => {
                debug!("Curve detection skipped: {}", e);
                return Vec::new();
            }
        };

        let mut curves = Vec::new();
        for (start, end) in self.find_runs(&samples) {
            if let Some(curve) = self.build_curve(index, &samples[start..=end]) {
                curves.push(curve);
            }
        }

        if self.config.group_chicanes {
            curves = group_chicanes(curves, self.config.chicane_max_gap_m);
        }
        assign_ids(&mut curves);

        debug!("Detected {} curves over {:.0} m", curves.len(), index.total_length());
        curves
    }

    /// Per-vertex signed heading changes, skipping zero-length segments
    fn turn_samples(&self, index: &DistanceIndex) -> Result<Vec<TurnSample>, GeometryError> {
        if index.len() < 3 {
            return Err(GeometryError::TooFewPoints { required: 3, actual: index.len() });
        }
        let points = index.points();

        // Vertices that start a non-degenerate segment, plus the final vertex
        let mut kept: Vec<usize> = vec![0];
        for i in 1..points.len() {
            let last = kept[kept.len() - 1];
            let gap = index.distance_at_vertex(i).unwrap_or(0.0)
                - index.distance_at_vertex(last).unwrap_or(0.0);
            if gap >= self.config.min_segment_m {
                kept.push(i);
            } else {
                trace!("Skipping degenerate segment {} -> {}", last, i);
            }
        }
        if kept.len() < 3 {
            return Err(GeometryError::TooFewPoints { required: 3, actual: kept.len() });
        }

        let seg_len = |a: usize, b: usize| {
            index.distance_at_vertex(b).unwrap_or(0.0) - index.distance_at_vertex(a).unwrap_or(0.0)
        };
        let bearings: Vec<f64> = kept
            .windows(2)
            .map(|w| initial_bearing_deg(points[w[0]], points[w[1]]))
            .collect();

        Ok(bearings
            .windows(2)
            .enumerate()
            .map(|(k, b)| TurnSample {
                vertex: kept[k + 1],
                delta: normalize_delta_deg(b[1] - b[0]),
                seg_in: seg_len(kept[k], kept[k + 1]),
                seg_out: seg_len(kept[k + 1], kept[k + 2]),
            })
            .collect())
    }

    /// Inclusive sample ranges forming turning runs
    fn find_runs(&self, samples: &[TurnSample]) -> Vec<(usize, usize)> {
        let start_t = self.config.start_threshold_deg;
        let cont_t = self.config.continue_threshold_deg;
        let mut runs = Vec::new();

        let mut j = 0;
        while j < samples.len() {
            if samples[j].delta.abs() <= start_t {
                j += 1;
                continue;
            }
            let sign = samples[j].delta.signum();
            let continues = |d: f64| d.signum() == sign && d.abs() > cont_t;
            let reverses = |d: f64| d.signum() != sign && d.abs() > cont_t;

            let mut end = j;
            let mut k = j + 1;
            loop {
                if k < samples.len() && continues(samples[k].delta) {
                    end = k;
                    k += 1;
                } else if k + 1 < samples.len()
                    && !reverses(samples[k].delta)
                    && continues(samples[k + 1].delta)
                {
                    // Single weak sample inside one physical curve
                    end = k + 1;
                    k += 2;
                } else {
                    break;
                }
            }

            runs.push((j, end));
            j = end + 1;
        }
        runs
    }

    fn build_curve(&self, index: &DistanceIndex, run: &[TurnSample]) -> Option<CurveEvent> {
        let total: f64 = run.iter().map(|s| s.delta).sum();
        let angle = total.abs();
        if angle < self.config.min_total_deg {
            trace!("Run of {} samples below minimum angle ({:.1} deg)", run.len(), angle);
            return None;
        }

        let first = run.first()?;
        let last = run.last()?;
        let entry = index.distance_at_vertex(first.vertex)? - first.seg_in / 2.0;
        let exit = index.distance_at_vertex(last.vertex)? + last.seg_out / 2.0;
        let length = (exit - entry).max(f64::EPSILON);
        let radius = length / angle.to_radians();
        let severity = severity_for(radius, angle);

        let apex = run[(run.len() - 1) / 2];
        let apex_distance = index.distance_at_vertex(apex.vertex)?;
        let position = index.points()[apex.vertex];

        let modifier = self.modifier_for(index, run, angle, length, severity);

        Some(CurveEvent {
            id: EventId::Curve(0),
            position,
            direction: Direction::from_delta(total),
            severity,
            angle_degrees: angle,
            radius_meters: radius,
            modifier,
            distance_from_start: entry.max(0.0),
            apex_distance,
            length_meters: length,
            is_chicane: false,
            chicane_children: Vec::new(),
        })
    }

    fn modifier_for(
        &self,
        index: &DistanceIndex,
        run: &[TurnSample],
        angle: f64,
        length: f64,
        severity: u8,
    ) -> Modifier {
        if angle > 150.0 {
            return Modifier::Hairpin;
        }
        if angle > 120.0 {
            return Modifier::Sharp;
        }
        if (severity <= 3 && length > 150.0) || (severity >= 4 && length > 100.0) {
            return Modifier::Long;
        }
        if run.len() >= 4 {
            let mid = run.len() / 2;
            let rate = |part: &[TurnSample]| -> Option<f64> {
                let first = part.first()?;
                let last = part.last()?;
                let span = index.distance_at_vertex(last.vertex)?
                    - index.distance_at_vertex(first.vertex)?
                    + (first.seg_in + last.seg_out) / 2.0;
                let turn: f64 = part.iter().map(|s| s.delta.abs()).sum();
                (span > 0.0).then(|| turn / span)
            };
            if let (Some(entry_rate), Some(exit_rate)) = (rate(&run[..mid]), rate(&run[mid..])) {
                if exit_rate >= entry_rate * 1.5 {
                    return Modifier::Tightens;
                }
                if exit_rate <= entry_rate * 0.67 {
                    return Modifier::Opens;
                }
            }
        }
        Modifier::None
    }
}

impl Default for CurveDetector {
    fn default() -> Self {
        Self::new(DetectorConfig::default())
    }
}

/// Number events in route order; chicane children follow their parent
fn assign_ids(curves: &mut [CurveEvent]) {
    let mut next = 0u32;
    for curve in curves.iter_mut() {
        curve.id = EventId::Curve(next);
        next += 1;
        for child in curve.chicane_children.iter_mut() {
            child.id = EventId::Curve(next);
            next += 1;
        }
    }
}
