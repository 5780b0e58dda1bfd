//! Progress Tracker Implementation

use crate::error::TelemetryRejected;
use crate::window::HeadingWindow;
use route_geometry::{haversine_m, DistanceIndex, GeoPoint, GeometryError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, trace};

/// Tracker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Maximum accepted fix accuracy radius (meters, default: 50)
    pub max_accuracy_m: f64,
    /// Maximum plausible speed between fixes (m/s, default: 89 ~ 320 km/h)
    pub max_speed_mps: f64,
    /// Minimum time between accepted fixes (ms, default: 250 = 4 Hz)
    pub min_fix_interval_ms: u64,
    /// Accepted positions used for the heading estimate
    pub heading_window: usize,
    /// Minimum window span for a heading estimate (meters)
    pub min_heading_span_m: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_accuracy_m: 50.0,
            max_speed_mps: 89.0,
            min_fix_interval_ms: 250,
            heading_window: 5,
            min_heading_span_m: 5.0,
        }
    }
}

/// Where progress comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressSource {
    #[default]
    Simulation,
    Live,
}

/// Raw fix from a GPS receiver
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VehicleFix {
    pub position: GeoPoint,
    /// Horizontal accuracy radius (meters)
    pub accuracy: f64,
    /// Device speed (m/s)
    pub reported_speed: Option<f64>,
    /// Device heading (degrees)
    pub reported_heading: Option<f64>,
    pub timestamp_ms: u64,
}

/// Vehicle state derived for one tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VehicleState {
    pub position: GeoPoint,
    /// Degrees [0, 360)
    pub heading: f64,
    /// Meters per second
    pub speed: f64,
    /// Monotonic distance from route start (meters)
    pub distance_along_route: f64,
    pub timestamp_ms: u64,
    pub source: ProgressSource,
}

/// Accepted/rejected counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TrackerStats {
    pub accepted: u64,
    pub rejected: u64,
}

#[derive(Debug, Clone, Copy)]
struct AcceptedFix {
    position: GeoPoint,
    timestamp_ms: u64,
}

/// Converts telemetry into progress along one route
pub struct ProgressTracker {
    index: Arc<DistanceIndex>,
    config: TrackerConfig,
    window: HeadingWindow,
    last_fix: Option<AcceptedFix>,
    /// Furthest distance reached
    distance: Option<f64>,
    /// Furthest simulation fraction reached
    fraction: f64,
    stats: TrackerStats,
}

impl ProgressTracker {
    /// Create a tracker for a route
    pub fn new(index: Arc<DistanceIndex>, config: TrackerConfig) -> Self {
        info!(
            "Creating progress tracker for {:.0} m route (max accuracy {} m, max speed {} m/s)",
            index.total_length(),
            config.max_accuracy_m,
            config.max_speed_mps
        );
        let window = HeadingWindow::new(config.heading_window, config.min_heading_span_m);
        Self {
            index,
            config,
            window,
            last_fix: None,
            distance: None,
            fraction: 0.0,
            stats: TrackerStats::default(),
        }
    }

    /// Advance from a simulation progress fraction in [0, 1]
    pub fn update_simulated(
        &mut self,
        fraction: f64,
        speed_mps: f64,
        timestamp_ms: u64,
    ) -> Result<VehicleState, TelemetryRejected> {
        if !fraction.is_finite() {
            return Err(self.reject(TelemetryRejected::NonFinite("fraction")));
        }
        if self.index.is_empty() {
            return Err(self.reject(TelemetryRejected::NoRoute));
        }

        self.fraction = self.fraction.max(fraction.clamp(0.0, 1.0));
        let distance = self.fraction * self.index.total_length();
        self.distance = Some(distance);

        let position = self
            .index
            .point_at_distance(distance)
            .map_err(|_| TelemetryRejected::NoRoute)?;
        let heading = self
            .index
            .heading_at_distance(distance)
            .map_err(|_| TelemetryRejected::NoRoute)?;
        self.stats.accepted += 1;

        Ok(VehicleState {
            position,
            heading,
            speed: if speed_mps.is_finite() { speed_mps.max(0.0) } else { 0.0 },
            distance_along_route: distance,
            timestamp_ms,
            source: ProgressSource::Simulation,
        })
    }

    /// Filter a live fix and snap it onto the route
    pub fn ingest_fix(&mut self, fix: VehicleFix) -> Result<VehicleState, TelemetryRejected> {
        let implied_speed = match self.check_fix(&fix) {
            Ok(implied) => implied,
            Err(rejection) => return Err(self.reject(rejection)),
        };

        let snapped = match self.snap(&fix) {
            Ok(d) => d,
            Err(_) => return Err(self.reject(TelemetryRejected::NoRoute)),
        };
        let distance = self.distance.map_or(snapped, |d| d.max(snapped));
        self.distance = Some(distance);

        self.window.push(fix.position);
        self.last_fix = Some(AcceptedFix {
            position: fix.position,
            timestamp_ms: fix.timestamp_ms,
        });
        self.stats.accepted += 1;

        let heading = self
            .window
            .heading()
            .or(fix
                .reported_heading
                .filter(|h| h.is_finite())
                .map(|h| h.rem_euclid(360.0)))
            .or_else(|| self.index.heading_at_distance(distance).ok())
            .unwrap_or(0.0);

        let speed = fix
            .reported_speed
            .filter(|s| s.is_finite() && *s >= 0.0)
            .or(implied_speed)
            .unwrap_or(0.0);

        trace!(
            "Fix accepted: {:.1} m along route, {:.1} m/s, heading {:.0}",
            distance,
            speed,
            heading
        );

        Ok(VehicleState {
            position: fix.position,
            heading,
            speed,
            distance_along_route: distance,
            timestamp_ms: fix.timestamp_ms,
            source: ProgressSource::Live,
        })
    }

    /// Distance along the route for a fix. Once progress is known only the
    /// stretch reachable since the last accepted fix is searched: from one
    /// accuracy radius behind to `max_speed_mps * elapsed` plus one accuracy
    /// radius ahead. A noisy fix next to a later leg of a switchback then
    /// stays on the leg actually being driven.
    fn snap(&self, fix: &VehicleFix) -> Result<f64, GeometryError> {
        let (Some(distance), Some(last)) = (self.distance, self.last_fix) else {
            return self.index.nearest_distance_to_point(fix.position);
        };
        let elapsed_s = fix.timestamp_ms.saturating_sub(last.timestamp_ms) as f64 / 1_000.0;
        let slack = fix.accuracy.max(0.0);
        let reach = self.config.max_speed_mps * elapsed_s + slack;

        let snapped = self
            .index
            .nearest_distance_in_range(fix.position, distance - slack, distance + reach)?;
        trace!(
            "Snapped within [{:.0}, {:.0}] m: {:.1} m",
            distance - slack,
            distance + reach,
            snapped
        );
        Ok(snapped)
    }

    /// Validate a fix; returns the implied speed since the last accepted fix
    fn check_fix(&self, fix: &VehicleFix) -> Result<Option<f64>, TelemetryRejected> {
        if !fix.position.is_valid() {
            return Err(TelemetryRejected::NonFinite("position"));
        }
        if self.index.is_empty() {
            return Err(TelemetryRejected::NoRoute);
        }
        if !fix.accuracy.is_finite() || fix.accuracy > self.config.max_accuracy_m {
            return Err(TelemetryRejected::Inaccurate {
                accuracy: fix.accuracy,
                max: self.config.max_accuracy_m,
            });
        }

        let Some(last) = self.last_fix else {
            return Ok(None);
        };

        let elapsed_ms = fix.timestamp_ms.saturating_sub(last.timestamp_ms);
        if elapsed_ms < self.config.min_fix_interval_ms {
            return Err(TelemetryRejected::Throttled {
                elapsed_ms,
                min_ms: self.config.min_fix_interval_ms,
            });
        }

        let implied = haversine_m(last.position, fix.position) / (elapsed_ms as f64 / 1000.0);
        if implied > self.config.max_speed_mps {
            return Err(TelemetryRejected::ImplausibleJump {
                implied_mps: implied,
                max_mps: self.config.max_speed_mps,
            });
        }
        Ok(Some(implied))
    }

    fn reject(&mut self, rejection: TelemetryRejected) -> TelemetryRejected {
        self.stats.rejected += 1;
        metrics::counter!("copilot_fixes_rejected_total", "reason" => rejection.reason())
            .increment(1);
        debug!("Telemetry dropped: {}", rejection);
        rejection
    }

    /// Furthest distance reached so far
    pub fn distance(&self) -> Option<f64> {
        self.distance
    }

    /// The route this tracker snaps against
    pub fn index(&self) -> &Arc<DistanceIndex> {
        &self.index
    }

    pub fn stats(&self) -> TrackerStats {
        self.stats
    }

    /// Forget all history (route change or navigation restart)
    pub fn reset(&mut self) {
        info!("Resetting progress tracker");
        self.window.reset();
        self.last_fix = None;
        self.distance = None;
        self.fraction = 0.0;
        self.stats = TrackerStats::default();
    }
}
