//! Callout commands handed to the announcer

use curve_detection::EventId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Speech priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Normal,
    /// Preempts whatever is being spoken and ignores the throttle
    High,
}

/// What a command announces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalloutKind {
    Early,
    Main,
    Final,
    Clear,
    Zone,
}

impl CalloutKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CalloutKind::Early => "early",
            CalloutKind::Main => "main",
            CalloutKind::Final => "final",
            CalloutKind::Clear => "clear",
            CalloutKind::Zone => "zone",
        }
    }
}

impl fmt::Display for CalloutKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Identifies one issued command within one scheduler epoch.
///
/// Completions carrying an older epoch belong to a route that has since
/// been replaced and are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpeechTicket {
    pub epoch: u64,
    pub sequence: u64,
}

/// One callout, ready for delivery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalloutCommand {
    pub text: String,
    pub priority: Priority,
    pub kind: CalloutKind,
    pub haptic_pattern: Option<Vec<Duration>>,
    pub source_event_id: Option<EventId>,
    /// Second event folded into a compound MAIN
    pub compound_event_id: Option<EventId>,
    /// Interrupts the command currently being spoken
    pub preempt: bool,
    pub timestamp_ms: u64,
    pub ticket: SpeechTicket,
}

/// Vibration pattern for an event of `severity`: alternating on/off pulses
pub fn haptic_pattern(severity: u8) -> Vec<Duration> {
    let pulses: &[u64] = match severity {
        5..=u8::MAX => &[200, 100, 200, 100, 200],
        4 => &[200, 100, 200],
        _ => &[150],
    };
    pulses.iter().map(|ms| Duration::from_millis(*ms)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haptic_pattern_grows_with_severity() {
        assert_eq!(haptic_pattern(2).len(), 1);
        assert_eq!(haptic_pattern(4).len(), 3);
        assert_eq!(haptic_pattern(6).len(), 5);
        assert_eq!(haptic_pattern(6)[0], Duration::from_millis(200));
    }

    #[test]
    fn test_priority_order() {
        assert!(Priority::High > Priority::Normal);
        assert!(Priority::Normal > Priority::Low);
    }
}
