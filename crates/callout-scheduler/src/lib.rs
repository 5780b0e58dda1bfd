//! Callout Scheduling
//!
//! Converts detected route events plus live progress into a deduplicated,
//! prioritized stream of callout commands, at most one per tick.

mod announcer;
mod command;
mod error;
mod mode;
mod phase;
mod phrasebook;
mod scheduler;

pub use announcer::Announcer;
pub use command::{haptic_pattern, CalloutCommand, CalloutKind, Priority, SpeechTicket};
pub use error::{DeliveryError, StateInconsistency};
pub use mode::{Aggressiveness, CalloutStyle, CalloutWindows, DrivingMode, SeverityTable, Units};
pub use phase::{PhaseMap, WarningPhase};
pub use phrasebook::{format_distance, CalloutSubject, Phrasebook, RallyPhrasebook};
pub use scheduler::{CalloutScheduler, SchedulerConfig, SchedulerStats, TickInput};
