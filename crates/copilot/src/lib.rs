//! Curve Co-Pilot
//!
//! Wires route geometry, curve detection, progress tracking and callout
//! scheduling into a session, plus the speech plumbing and simulation loop
//! behind the `copilot` binary.

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

mod announcer;
mod config;
mod error;
mod route;
mod runner;
mod session;

pub use announcer::{
    spawn_speaker, LogAnnouncer, SpeakerConfig, SpeakerHandle, SpeechCompletion, SpeechOutcome,
};
pub use config::{CopilotConfig, SimulationConfig, ENV_PREFIX};
pub use error::{CopilotError, Result};
pub use route::{demo_route, RouteFile};
pub use runner::{run_simulation, CalloutRecord, SimulationReport};
pub use session::{detect_events, RouteEvents, RouteSummary, Session};

/// Install the global tracing subscriber. `verbosity` counts `-v` flags;
/// `json` switches to one JSON object per line.
pub fn init_logging(
    verbosity: u8,
    json: bool,
) -> std::result::Result<(), tracing::subscriber::SetGlobalDefaultError> {
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true);

    if json {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    }
}
