//! Scheduler Error Types

use crate::phase::WarningPhase;
use curve_detection::EventId;
use thiserror::Error;

/// Attempt to move an event's phase backwards or repeat a phase.
///
/// Unreachable when the scheduler invariants hold.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Phase of {id} cannot move from {from:?} to {to:?}")]
pub struct StateInconsistency {
    pub id: EventId,
    pub from: WarningPhase,
    pub to: WarningPhase,
}

/// Errors delivering a command to the announcer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// Announcer refused or failed; the callout is dropped, not retried
    #[error("Announcer unavailable, dropped callout: {0}")]
    AnnouncerUnavailable(String),
}
