//! Shared event vocabulary

use serde::{Deserialize, Serialize};
use std::fmt;

/// Turn direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Left,
    Right,
}

impl Direction {
    /// Direction of a signed heading change (positive = clockwise = right)
    pub fn from_delta(delta_deg: f64) -> Self {
        if delta_deg >= 0.0 {
            Direction::Right
        } else {
            Direction::Left
        }
    }

    /// The other direction
    pub fn opposite(self) -> Self {
        match self {
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Left => "left",
            Direction::Right => "right",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pace-note modifier attached to a curve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modifier {
    #[default]
    None,
    Tightens,
    Opens,
    Long,
    Sharp,
    Hairpin,
    /// Reserved for elevation-aware sources
    Crest,
    Caution,
}

impl Modifier {
    /// Spoken word for the modifier, if any
    pub fn word(self) -> Option<&'static str> {
        match self {
            Modifier::None => None,
            Modifier::Tightens => Some("tightens"),
            Modifier::Opens => Some("opens"),
            Modifier::Long => Some("long"),
            Modifier::Sharp => Some("sharp"),
            Modifier::Hairpin => Some("hairpin"),
            Modifier::Crest => Some("over crest"),
            Modifier::Caution => Some("caution"),
        }
    }
}

/// Stable event identifier, unique within one route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventId {
    Curve(u32),
    Flow(u32),
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventId::Curve(n) => write!(f, "curve-{}", n),
            EventId::Flow(n) => write!(f, "flow-{}", n),
        }
    }
}

/// Minimal event shape the scheduler works against, independent of which
/// detector produced it.
///
/// `distance` and `severity` return `None` for malformed events, which
/// consumers skip.
pub trait EventSource {
    /// Stable identifier
    fn id(&self) -> EventId;

    /// Distance from route start to the event entry (meters)
    fn distance(&self) -> Option<f64>;

    /// Severity on the 1 (gentle) ..= 6 (hairpin) scale
    fn severity(&self) -> Option<u8>;

    fn direction(&self) -> Direction;

    /// Total heading change (degrees, unsigned)
    fn angle_degrees(&self) -> f64;

    fn modifier(&self) -> Modifier {
        Modifier::None
    }

    fn is_chicane(&self) -> bool {
        false
    }

    /// Direction and severity of each chicane element, in route order
    fn chicane_parts(&self) -> Vec<(Direction, u8)> {
        Vec::new()
    }

    /// Highest severity among chicane elements
    fn max_child_severity(&self) -> Option<u8> {
        self.chicane_parts().iter().map(|(_, s)| *s).max()
    }
}

/// Accept severities on the 1..=6 scale only
pub(crate) fn checked_severity(severity: u8) -> Option<u8> {
    (1..=6).contains(&severity).then_some(severity)
}

/// Accept finite, non-negative distances only
pub(crate) fn checked_distance(distance: f64) -> Option<f64> {
    (distance.is_finite() && distance >= 0.0).then_some(distance)
}
