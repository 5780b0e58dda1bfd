//! Driving mode and timing windows

use curve_detection::ZoneCharacter;
use serde::{Deserialize, Serialize};

/// How eager the co-pilot is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggressiveness {
    Conservative,
    #[default]
    Standard,
    Aggressive,
}

impl Aggressiveness {
    /// Multiplier applied to the minimum spacing between callouts
    pub fn interval_factor(self) -> f64 {
        match self {
            Aggressiveness::Conservative => 1.25,
            Aggressiveness::Standard => 1.0,
            Aggressiveness::Aggressive => 0.8,
        }
    }
}

/// Spoken distance units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    #[default]
    Metric,
    Imperial,
}

/// Phrasing style, also selects the detection strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalloutStyle {
    /// Pace notes on discrete curves
    #[default]
    Rally,
    /// Plain-language warnings on flow events
    Advisory,
}

/// Minimum severity worth announcing, per zone character
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityTable {
    pub technical: u8,
    pub transit: u8,
    pub urban: u8,
}

impl SeverityTable {
    pub fn for_character(&self, character: ZoneCharacter) -> u8 {
        match character {
            ZoneCharacter::Technical => self.technical,
            ZoneCharacter::Transit => self.transit,
            ZoneCharacter::Urban => self.urban,
        }
    }
}

impl Default for SeverityTable {
    fn default() -> Self {
        Self {
            technical: 2,
            transit: 3,
            urban: 4,
        }
    }
}

/// User-facing callout preferences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrivingMode {
    pub aggressiveness: Aggressiveness,
    pub units: Units,
    pub style: CalloutStyle,
    pub min_severity: SeverityTable,
    /// Vibrate alongside MAIN callouts (default: true)
    pub haptic_enabled: bool,
    /// Say "clear" on long quiet stretches (default: true)
    pub chatter_enabled: bool,
}

impl Default for DrivingMode {
    fn default() -> Self {
        Self {
            aggressiveness: Aggressiveness::Standard,
            units: Units::Metric,
            style: CalloutStyle::Rally,
            min_severity: SeverityTable::default(),
            haptic_enabled: true,
            chatter_enabled: true,
        }
    }
}

impl DrivingMode {
    /// Fewer, more widely spaced callouts
    pub fn conservative() -> Self {
        Self {
            aggressiveness: Aggressiveness::Conservative,
            min_severity: SeverityTable {
                technical: 3,
                transit: 4,
                urban: 5,
            },
            chatter_enabled: false,
            ..Default::default()
        }
    }

    /// Every bend in technical sections, tight spacing
    pub fn aggressive() -> Self {
        Self {
            aggressiveness: Aggressiveness::Aggressive,
            min_severity: SeverityTable {
                technical: 1,
                transit: 3,
                urban: 4,
            },
            ..Default::default()
        }
    }
}

/// Distance windows (meters) for the three warning phases
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalloutWindows {
    pub early: f64,
    pub main: f64,
    pub final_: f64,
}

impl CalloutWindows {
    /// Windows for a vehicle moving at `speed_mps`
    pub fn for_speed(speed_mps: f64) -> Self {
        let v = if speed_mps.is_finite() {
            speed_mps.max(0.0)
        } else {
            0.0
        };
        Self {
            early: (v * 10.0).max(400.0),
            main: (v * 5.0).max(200.0),
            final_: (v * 1.5).max(50.0),
        }
    }
}
