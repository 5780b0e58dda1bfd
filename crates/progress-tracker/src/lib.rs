//! Progress Tracking
//!
//! Turns raw vehicle fixes (or simulated progress) into a filtered,
//! monotonic distance-along-route plus speed and heading.

mod error;
mod tracker;
mod window;

pub use error::TelemetryRejected;
pub use tracker::{
    ProgressSource, ProgressTracker, TrackerConfig, TrackerStats, VehicleFix, VehicleState,
};
pub use window::HeadingWindow;
