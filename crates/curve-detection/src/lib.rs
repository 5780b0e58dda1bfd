//! Curve Detection
//!
//! Two independent strategies for turning a route polyline into events:
//! - `CurveDetector`: discrete rally-style curves (direction, severity 1-6, modifier)
//! - `FlowEventDetector`: zone-aware resampling into sweeper/significant/danger events
//!
//! Both expose the minimal `EventSource` shape consumed by the callout scheduler.

mod chicane;
mod curve;
mod event;
mod flow;
mod zone;

#[cfg(test)]
pub(crate) mod testing;

pub use chicane::group_chicanes;
pub use curve::{severity_for, CurveDetector, CurveEvent, DetectorConfig};
pub use event::{Direction, EventId, EventSource, Modifier};
pub use flow::{FlowConfig, FlowEvent, FlowEventDetector, FlowSeverity, FlowShape, FlowZoneParams};
pub use zone::{character_at, zone_at, Zone, ZoneCharacter};
