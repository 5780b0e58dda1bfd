//! Zone-aware continuous flow event sampling
//!
//! Resamples the route at fixed arc-length intervals that depend on the zone
//! character, then groups consecutive same-direction heading changes into
//! events. Used by the advisory and highway callout styles.

use crate::event::{checked_distance, Direction, EventId, EventSource, Modifier};
use crate::zone::{character_at, Zone, ZoneCharacter};
use route_geometry::{initial_bearing_deg, normalize_delta_deg, DistanceIndex, GeoPoint};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Flow event severity class
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowSeverity {
    Sweeper,
    Significant,
    Danger,
}

impl FlowSeverity {
    /// Position on the 1..=6 curve severity scale
    pub fn as_scale(self) -> u8 {
        match self {
            FlowSeverity::Sweeper => 2,
            FlowSeverity::Significant => 4,
            FlowSeverity::Danger => 5,
        }
    }
}

/// How concentrated the turning is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowShape {
    Tight,
    Medium,
    Sweeper,
}

/// Per-zone sampling and classification parameters
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FlowZoneParams {
    /// Resampling interval (meters)
    pub sample_interval_m: f64,
    /// Minimum total angle for an event (degrees)
    pub min_angle_deg: f64,
    /// Total angle at which an event is significant (degrees)
    pub significant_deg: f64,
    /// Total angle at which an event is dangerous (degrees)
    pub danger_deg: f64,
}

/// Flow detector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowConfig {
    pub technical: FlowZoneParams,
    pub transit: FlowZoneParams,
    pub urban: FlowZoneParams,
    /// Heading changes below this are flat (degrees, default: 0.5)
    pub flat_threshold_deg: f64,
    /// Degrees per meter at or above which an event is tight
    pub tight_density: f64,
    /// Degrees per meter at or above which an event is medium
    pub medium_density: f64,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            technical: FlowZoneParams {
                sample_interval_m: 15.0,
                min_angle_deg: 8.0,
                significant_deg: 30.0,
                danger_deg: 70.0,
            },
            transit: FlowZoneParams {
                sample_interval_m: 50.0,
                min_angle_deg: 12.0,
                significant_deg: 25.0,
                danger_deg: 60.0,
            },
            urban: FlowZoneParams {
                sample_interval_m: 25.0,
                min_angle_deg: 40.0,
                significant_deg: 60.0,
                danger_deg: 90.0,
            },
            flat_threshold_deg: 0.5,
            tight_density: 1.0,
            medium_density: 0.3,
        }
    }
}

impl FlowConfig {
    /// Parameters for a zone character
    pub fn params(&self, character: ZoneCharacter) -> &FlowZoneParams {
        match character {
            ZoneCharacter::Technical => &self.technical,
            ZoneCharacter::Transit => &self.transit,
            ZoneCharacter::Urban => &self.urban,
        }
    }
}

/// A bend found by flow sampling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowEvent {
    pub id: EventId,
    /// Apex position
    pub position: GeoPoint,
    pub direction: Direction,
    /// Total heading change (degrees, unsigned)
    pub total_angle: f64,
    pub shape: FlowShape,
    pub severity: FlowSeverity,
    /// Zone character the event starts in
    pub zone: ZoneCharacter,
    /// Distance from route start to the event entry (meters)
    pub start_distance: f64,
    /// Distance of the sample with the largest single heading change (meters)
    pub apex_distance: f64,
    pub length_meters: f64,
}

impl EventSource for FlowEvent {
    fn id(&self) -> EventId {
        self.id
    }

    fn distance(&self) -> Option<f64> {
        checked_distance(self.start_distance)
    }

    fn severity(&self) -> Option<u8> {
        Some(self.severity.as_scale())
    }

    fn direction(&self) -> Direction {
        self.direction
    }

    fn angle_degrees(&self) -> f64 {
        self.total_angle
    }

    fn modifier(&self) -> Modifier {
        match self.shape {
            FlowShape::Tight if self.severity == FlowSeverity::Danger => Modifier::Sharp,
            FlowShape::Sweeper if self.length_meters > 150.0 => Modifier::Long,
            _ => Modifier::None,
        }
    }
}

/// One resampled heading change
#[derive(Debug, Clone, Copy)]
struct FlowSample {
    /// Distance along route (meters)
    distance: f64,
    /// Signed heading change since the prior sample (degrees)
    delta: f64,
    /// Spacing to the prior sample (meters)
    spacing: f64,
}

/// Continuous, zone-aware event sampler
pub struct FlowEventDetector {
    config: FlowConfig,
}

impl FlowEventDetector {
    /// Create a new flow detector
    pub fn new(config: FlowConfig) -> Self {
        Self { config }
    }

    /// Detect flow events along an indexed route
    pub fn detect(&self, index: &DistanceIndex, zones: &[Zone]) -> Vec<FlowEvent> {
        if index.len() < 3 {
            debug!("Flow detection skipped: {} route points", index.len());
            return Vec::new();
        }

        let samples = self.resample(index, zones);
        let mut events = Vec::new();
        for (start, end) in self.find_runs(&samples) {
            let run = &samples[start..=end];
            if let Some(event) = self.build_event(index, zones, run, events.len()) {
                events.push(event);
            }
        }

        debug!(
            "Detected {} flow events over {:.0} m",
            events.len(),
            index.total_length()
        );
        events
    }

    /// Heading change at each resampled position
    fn resample(&self, index: &DistanceIndex, zones: &[Zone]) -> Vec<FlowSample> {
        let total = index.total_length();
        let mut stations = vec![0.0];
        let mut d = 0.0;
        loop {
            let step = self
                .config
                .params(character_at(zones, d))
                .sample_interval_m
                .max(1.0);
            if d + step >= total {
                break;
            }
            d += step;
            stations.push(d);
        }
        if total - d > 1.0 {
            stations.push(total);
        }

        let points: Vec<GeoPoint> = stations
            .iter()
            .filter_map(|&s| index.point_at_distance(s).ok())
            .collect();
        if points.len() != stations.len() || points.len() < 3 {
            return Vec::new();
        }

        let headings: Vec<f64> = points
            .windows(2)
            .map(|w| initial_bearing_deg(w[0], w[1]))
            .collect();

        headings
            .windows(2)
            .enumerate()
            .map(|(i, h)| FlowSample {
                distance: stations[i + 1],
                delta: normalize_delta_deg(h[1] - h[0]),
                spacing: stations[i + 1] - stations[i],
            })
            .collect()
    }

    fn direction_of(&self, delta: f64) -> Option<Direction> {
        (delta.abs() >= self.config.flat_threshold_deg).then(|| Direction::from_delta(delta))
    }

    /// Inclusive sample ranges of same-direction turning
    fn find_runs(&self, samples: &[FlowSample]) -> Vec<(usize, usize)> {
        let mut runs = Vec::new();
        let mut i = 0;
        while i < samples.len() {
            let Some(dir) = self.direction_of(samples[i].delta) else {
                i += 1;
                continue;
            };

            let mut end = i;
            let mut k = i + 1;
            loop {
                let here = samples.get(k).map(|s| self.direction_of(s.delta));
                let next = samples.get(k + 1).map(|s| self.direction_of(s.delta));
                match (here, next) {
                    (Some(Some(d)), _) if d == dir => {
                        end = k;
                        k += 1;
                    }
                    // Flat sample followed by a resumption in the same direction
                    (Some(None), Some(Some(d))) if d == dir => {
                        end = k + 1;
                        k += 2;
                    }
                    _ => break,
                }
            }

            runs.push((i, end));
            i = end + 1;
        }
        runs
    }

    fn build_event(
        &self,
        index: &DistanceIndex,
        zones: &[Zone],
        run: &[FlowSample],
        seq: usize,
    ) -> Option<FlowEvent> {
        let first = run.first()?;
        let last = run.last()?;
        let signed: f64 = run.iter().map(|s| s.delta).sum();
        let total_angle = signed.abs();

        let start_distance = (first.distance - first.spacing / 2.0).max(0.0);
        let zone = character_at(zones, start_distance);
        let params = self.config.params(zone);
        if total_angle < params.min_angle_deg {
            trace!(
                "Flow run at {:.0} m below {} minimum ({:.1} deg)",
                first.distance,
                zone.as_str(),
                total_angle
            );
            return None;
        }

        let severity = if total_angle >= params.danger_deg {
            FlowSeverity::Danger
        } else if total_angle >= params.significant_deg {
            FlowSeverity::Significant
        } else {
            FlowSeverity::Sweeper
        };

        let length = (last.distance - first.distance) + (first.spacing + last.spacing) / 2.0;
        let density = total_angle / length.max(f64::EPSILON);
        let shape = if density >= self.config.tight_density {
            FlowShape::Tight
        } else if density >= self.config.medium_density {
            FlowShape::Medium
        } else {
            FlowShape::Sweeper
        };

        let apex = run
            .iter()
            .max_by(|a, b| a.delta.abs().total_cmp(&b.delta.abs()))?;
        let position = index.point_at_distance(apex.distance).ok()?;

        Some(FlowEvent {
            id: EventId::Flow(seq as u32),
            position,
            direction: Direction::from_delta(signed),
            total_angle,
            shape,
            severity,
            zone,
            start_distance,
            apex_distance: apex.distance,
            length_meters: length,
        })
    }
}

impl Default for FlowEventDetector {
    fn default() -> Self {
        Self::new(FlowConfig::default())
    }
}
