//! Telemetry Rejection Types

use thiserror::Error;

/// Reasons a telemetry update was dropped.
///
/// These are expected on consumer GPS and are never fatal: callers log and
/// skip the update.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TelemetryRejected {
    /// Reported accuracy radius too large
    #[error("Fix accuracy {accuracy:.1} exceeds ceiling {max:.1}")]
    Inaccurate { accuracy: f64, max: f64 },

    /// Fix arrived too soon after the last accepted one
    #[error("Fix throttled: {elapsed_ms} ms since last accepted fix (min {min_ms} ms)")]
    Throttled { elapsed_ms: u64, min_ms: u64 },

    /// Position jump implies an impossible speed
    #[error("Implied speed {implied_mps:.1} m/s exceeds ceiling {max_mps:.1} m/s")]
    ImplausibleJump { implied_mps: f64, max_mps: f64 },

    /// NaN or infinite input
    #[error("Non-finite telemetry field: {0}")]
    NonFinite(&'static str),

    /// No usable route loaded
    #[error("No route loaded")]
    NoRoute,
}

impl TelemetryRejected {
    /// Short label for metrics
    pub fn reason(&self) -> &'static str {
        match self {
            TelemetryRejected::Inaccurate { .. } => "inaccurate",
            TelemetryRejected::Throttled { .. } => "throttled",
            TelemetryRejected::ImplausibleJump { .. } => "implausible_jump",
            TelemetryRejected::NonFinite(_) => "non_finite",
            TelemetryRejected::NoRoute => "no_route",
        }
    }
}
