//! Co-pilot session
//!
//! Owns one loaded route (geometry, detected events, zones) together with
//! the progress tracker and callout scheduler that run against it.
//! Loading a route swaps all of it at once and starts a new scheduler
//! epoch.

use crate::config::CopilotConfig;
use crate::error::{CopilotError, Result};
use crate::route::RouteFile;
use callout_scheduler::{
    Announcer, CalloutCommand, CalloutScheduler, CalloutStyle, DeliveryError, DrivingMode,
    SpeechTicket, TickInput,
};
use curve_detection::{CurveDetector, CurveEvent, FlowEvent, FlowEventDetector, Zone};
use progress_tracker::{ProgressTracker, TelemetryRejected, TrackerStats, VehicleFix, VehicleState};
use route_geometry::{DistanceIndex, GeometryError};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// Events detected on the active route, by strategy
#[derive(Debug, Clone)]
pub enum RouteEvents {
    Curves(Arc<[CurveEvent]>),
    Flow(Arc<[FlowEvent]>),
}

impl RouteEvents {
    pub fn len(&self) -> usize {
        match self {
            RouteEvents::Curves(events) => events.len(),
            RouteEvents::Flow(events) => events.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Detect events on `index` with the strategy matching `style`
pub fn detect_events(
    config: &CopilotConfig,
    style: CalloutStyle,
    index: &DistanceIndex,
    zones: &[Zone],
) -> RouteEvents {
    match style {
        CalloutStyle::Rally => RouteEvents::Curves(
            CurveDetector::new(config.detector.clone())
                .detect(index)
                .into(),
        ),
        CalloutStyle::Advisory => RouteEvents::Flow(
            FlowEventDetector::new(config.flow.clone())
                .detect(index, zones)
                .into(),
        ),
    }
}

/// Result of loading a route
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RouteSummary {
    pub length_m: f64,
    pub events: usize,
    pub zones: usize,
    pub epoch: u64,
}

struct ActiveRoute {
    index: Arc<DistanceIndex>,
    events: RouteEvents,
    zones: Arc<[Zone]>,
    tracker: ProgressTracker,
    vehicle: Option<VehicleState>,
}

/// One driver, one route, one scheduler
pub struct Session {
    config: CopilotConfig,
    scheduler: CalloutScheduler,
    route: Option<ActiveRoute>,
}

impl Session {
    pub fn new(config: CopilotConfig) -> Self {
        let mut scheduler = CalloutScheduler::new(config.scheduler.clone(), config.mode.clone());
        scheduler.set_time_acceleration(config.simulation.time_acceleration);
        Self {
            config,
            scheduler,
            route: None,
        }
    }

    pub fn config(&self) -> &CopilotConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &CalloutScheduler {
        &self.scheduler
    }

    pub fn events(&self) -> Option<&RouteEvents> {
        self.route.as_ref().map(|r| &r.events)
    }

    pub fn route_length(&self) -> Option<f64> {
        self.route.as_ref().map(|r| r.index.total_length())
    }

    pub fn tracker_stats(&self) -> Option<TrackerStats> {
        self.route.as_ref().map(|r| r.tracker.stats())
    }

    /// Last accepted vehicle state
    pub fn vehicle(&self) -> Option<&VehicleState> {
        self.route.as_ref().and_then(|r| r.vehicle.as_ref())
    }

    /// Replace the active route and everything derived from it
    pub fn load_route(&mut self, route: &RouteFile) -> Result<RouteSummary> {
        if route.points.len() < 2 {
            return Err(GeometryError::TooFewPoints {
                required: 2,
                actual: route.points.len(),
            }
            .into());
        }
        if route.points.iter().any(|p| !p.is_valid()) {
            return Err(GeometryError::NonFinite("point").into());
        }

        let index = Arc::new(DistanceIndex::build(&route.points));
        let zones: Arc<[Zone]> = route.zones.clone().into();
        let events = detect_events(&self.config, self.config.mode.style, &index, &zones);
        let tracker = ProgressTracker::new(Arc::clone(&index), self.config.tracker.clone());

        let epoch = self.scheduler.reset();
        let summary = RouteSummary {
            length_m: index.total_length(),
            events: events.len(),
            zones: zones.len(),
            epoch,
        };
        self.route = Some(ActiveRoute {
            index,
            events,
            zones,
            tracker,
            vehicle: None,
        });

        info!(
            "Route loaded: {:.0} m, {} events, {} zones (epoch {})",
            summary.length_m, summary.events, summary.zones, summary.epoch
        );
        Ok(summary)
    }

    /// Drop the active route
    pub fn unload_route(&mut self) {
        self.route = None;
        self.scheduler.reset();
        info!("Route unloaded");
    }

    /// Change driving preferences. Switching style re-detects events with
    /// the matching strategy and starts a new epoch.
    pub fn set_mode(&mut self, mode: DrivingMode) {
        let restyled = mode.style != self.config.mode.style;
        self.config.mode = mode.clone();
        self.scheduler.set_mode(mode);

        if restyled {
            if let Some(route) = self.route.as_mut() {
                route.events = detect_events(
                    &self.config,
                    self.config.mode.style,
                    &route.index,
                    &route.zones,
                );
                let epoch = self.scheduler.reset();
                info!(
                    "Style changed to {:?}: {} events (epoch {})",
                    self.config.mode.style,
                    route.events.len(),
                    epoch
                );
            }
        }
    }

    pub fn set_time_acceleration(&mut self, factor: f64) {
        self.scheduler.set_time_acceleration(factor);
    }

    /// Feed a live GPS fix
    pub fn on_fix(
        &mut self,
        fix: VehicleFix,
    ) -> std::result::Result<VehicleState, TelemetryRejected> {
        let route = self.route.as_mut().ok_or(TelemetryRejected::NoRoute)?;
        let state = route.tracker.ingest_fix(fix)?;
        route.vehicle = Some(state);
        Ok(state)
    }

    /// Feed simulated progress as a route fraction
    pub fn on_simulated_progress(
        &mut self,
        fraction: f64,
        speed_mps: f64,
        timestamp_ms: u64,
    ) -> std::result::Result<VehicleState, TelemetryRejected> {
        let route = self.route.as_mut().ok_or(TelemetryRejected::NoRoute)?;
        let state = route
            .tracker
            .update_simulated(fraction, speed_mps, timestamp_ms)?;
        route.vehicle = Some(state);
        Ok(state)
    }

    /// Run the scheduler against the latest vehicle state
    pub fn tick(&mut self, now_ms: u64) -> Option<CalloutCommand> {
        let route = self.route.as_ref()?;
        let vehicle = route.vehicle.as_ref()?;
        match &route.events {
            RouteEvents::Curves(events) => self.scheduler.tick(&TickInput {
                vehicle,
                events: &events[..],
                zones: &route.zones,
                now_ms,
            }),
            RouteEvents::Flow(events) => self.scheduler.tick(&TickInput {
                vehicle,
                events: &events[..],
                zones: &route.zones,
                now_ms,
            }),
        }
    }

    pub fn complete(&mut self, ticket: SpeechTicket) -> bool {
        self.scheduler.complete(ticket)
    }

    pub fn deliver(
        &mut self,
        command: &CalloutCommand,
        announcer: &mut dyn Announcer,
    ) -> std::result::Result<(), DeliveryError> {
        self.scheduler.deliver(command, announcer)
    }

    /// Fails with [`CopilotError::NoRoute`] when nothing is loaded
    pub fn require_route(&self) -> Result<RouteSummary> {
        let route = self.route.as_ref().ok_or(CopilotError::NoRoute)?;
        Ok(RouteSummary {
            length_m: route.index.total_length(),
            events: route.events.len(),
            zones: route.zones.len(),
            epoch: self.scheduler.epoch(),
        })
    }
}
