//! Layered co-pilot configuration
//!
//! Built-in defaults, overridden by an optional TOML file, overridden by
//! `COPILOT__SECTION__FIELD` environment variables.

use crate::announcer::SpeakerConfig;
use crate::error::Result;
use callout_scheduler::{DrivingMode, SchedulerConfig};
use config::{Config, Environment, File};
use curve_detection::{DetectorConfig, FlowConfig};
use progress_tracker::TrackerConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "COPILOT";

/// Simulated drive parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Constant vehicle speed (default: 25 m/s)
    pub speed_mps: f64,
    /// Wall-clock tick period (default: 250 ms)
    pub tick_ms: u64,
    /// Simulation speed-up (default: 1.0)
    pub time_acceleration: f64,
    /// Ticks to keep running after the route end (default: 20)
    pub tail_ticks: u32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            speed_mps: 25.0,
            tick_ms: 250,
            time_acceleration: 1.0,
            tail_ticks: 20,
        }
    }
}

/// Everything a session can be tuned with
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CopilotConfig {
    pub mode: DrivingMode,
    pub scheduler: SchedulerConfig,
    pub tracker: TrackerConfig,
    pub detector: DetectorConfig,
    pub flow: FlowConfig,
    pub simulation: SimulationConfig,
    pub speaker: SpeakerConfig,
}

impl CopilotConfig {
    /// Load defaults, then `path` (if it exists), then the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(false));
        }
        let config: Self = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        info!(
            "Loaded configuration: style {:?}, speed {} m/s",
            config.mode.style, config.simulation.speed_mps
        );
        Ok(config)
    }
}
