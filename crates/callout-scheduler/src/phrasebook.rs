//! Callout phrasing
//!
//! Turns an event plus a callout kind into spoken text. Pure functions of
//! their inputs, so any phrasebook can be swapped in without touching the
//! scheduler.

use crate::command::CalloutKind;
use crate::mode::{CalloutStyle, DrivingMode, Units};
use curve_detection::{Direction, EventId, EventSource, Modifier, Zone, ZoneCharacter};

const FEET_PER_METER: f64 = 3.280_84;
const METERS_PER_MILE: f64 = 1_609.344;

/// Snapshot of an event as seen from the vehicle
#[derive(Debug, Clone, PartialEq)]
pub struct CalloutSubject {
    pub id: EventId,
    pub direction: Direction,
    pub severity: u8,
    pub modifier: Modifier,
    pub angle_degrees: f64,
    pub is_chicane: bool,
    pub chicane_parts: Vec<(Direction, u8)>,
    /// Highest chicane element severity
    pub max_child_severity: Option<u8>,
    /// Entry distance from route start (meters)
    pub distance: f64,
    /// Distance still to go; negative once passed
    pub ahead_m: f64,
}

impl CalloutSubject {
    /// Snapshot `event` for a vehicle at `progress`. `None` for malformed
    /// events.
    pub fn from_event<E: EventSource + ?Sized>(event: &E, progress: f64) -> Option<Self> {
        let distance = event.distance()?;
        let severity = event.severity()?;
        Some(Self {
            id: event.id(),
            direction: event.direction(),
            severity,
            modifier: event.modifier(),
            angle_degrees: event.angle_degrees(),
            is_chicane: event.is_chicane(),
            chicane_parts: event.chicane_parts(),
            max_child_severity: event.max_child_severity(),
            distance,
            ahead_m: distance - progress,
        })
    }
}

/// Renders callout text
pub trait Phrasebook {
    fn render(&self, subject: &CalloutSubject, kind: CalloutKind, mode: &DrivingMode) -> String;

    /// Two events announced as one MAIN
    fn render_compound(
        &self,
        first: &CalloutSubject,
        second: &CalloutSubject,
        mode: &DrivingMode,
    ) -> String {
        format!(
            "{}, then {}",
            self.render(first, CalloutKind::Main, mode),
            self.render(second, CalloutKind::Main, mode)
        )
    }

    fn render_zone(&self, zone: &Zone, mode: &DrivingMode) -> String;

    fn render_clear(&self, mode: &DrivingMode) -> String;
}

/// Pace-note phrasing, with a plain-language variant for
/// [`CalloutStyle::Advisory`]
#[derive(Debug, Clone, Copy, Default)]
pub struct RallyPhrasebook;

impl RallyPhrasebook {
    fn pace_note(subject: &CalloutSubject) -> String {
        if subject.is_chicane && !subject.chicane_parts.is_empty() {
            let parts: Vec<String> = subject
                .chicane_parts
                .iter()
                .map(|(dir, sev)| format!("{} {}", dir, sev))
                .collect();
            return format!("chicane {}", parts.join(" "));
        }
        match subject.modifier {
            Modifier::Hairpin => format!("{} hairpin", subject.direction),
            modifier => match modifier.word() {
                Some(word) => format!("{} {} {}", subject.direction, subject.severity, word),
                None => format!("{} {}", subject.direction, subject.severity),
            },
        }
    }

    fn advisory_phrase(subject: &CalloutSubject) -> String {
        if subject.is_chicane {
            return format!("series of curves starting {}", subject.direction);
        }
        let strength = match subject.severity {
            0..=2 => "gentle",
            3 => "moderate",
            4 => "sharp",
            5 => "very sharp",
            _ => return format!("hairpin {} turn", subject.direction),
        };
        format!("{} {} curve", strength, subject.direction)
    }
}

impl Phrasebook for RallyPhrasebook {
    fn render(&self, subject: &CalloutSubject, kind: CalloutKind, mode: &DrivingMode) -> String {
        let distance = format_distance(subject.ahead_m, mode.units);
        match mode.style {
            CalloutStyle::Rally => {
                let note = Self::pace_note(subject);
                match kind {
                    CalloutKind::Early => format!("caution, {} in {}", note, distance),
                    CalloutKind::Final if subject.is_chicane => "chicane now".to_string(),
                    CalloutKind::Final => {
                        format!("{} {} now", subject.direction, subject.severity)
                    }
                    CalloutKind::Clear => self.render_clear(mode),
                    CalloutKind::Main | CalloutKind::Zone => note,
                }
            }
            CalloutStyle::Advisory => {
                let phrase = Self::advisory_phrase(subject);
                match kind {
                    CalloutKind::Early => format!("{} in {}", phrase, distance),
                    CalloutKind::Final => format!("{} now", phrase),
                    CalloutKind::Clear => self.render_clear(mode),
                    CalloutKind::Main | CalloutKind::Zone => format!("{} ahead", phrase),
                }
            }
        }
    }

    fn render_compound(
        &self,
        first: &CalloutSubject,
        second: &CalloutSubject,
        mode: &DrivingMode,
    ) -> String {
        match mode.style {
            CalloutStyle::Rally => {
                format!("{} into {}", Self::pace_note(first), Self::pace_note(second))
            }
            CalloutStyle::Advisory => format!(
                "{} followed by {}",
                Self::advisory_phrase(first),
                Self::advisory_phrase(second)
            ),
        }
    }

    fn render_zone(&self, zone: &Zone, mode: &DrivingMode) -> String {
        match (mode.style, zone.character) {
            (CalloutStyle::Rally, character) => format!("{} section", character.as_str()),
            (CalloutStyle::Advisory, ZoneCharacter::Technical) => {
                "winding road ahead".to_string()
            }
            (CalloutStyle::Advisory, ZoneCharacter::Transit) => "open road".to_string(),
            (CalloutStyle::Advisory, ZoneCharacter::Urban) => "entering town".to_string(),
        }
    }

    fn render_clear(&self, mode: &DrivingMode) -> String {
        match mode.style {
            CalloutStyle::Rally => "clear".to_string(),
            CalloutStyle::Advisory => "road straightens".to_string(),
        }
    }
}

/// Speakable, rounded distance
pub fn format_distance(meters: f64, units: Units) -> String {
    let meters = if meters.is_finite() { meters.max(0.0) } else { 0.0 };
    match units {
        Units::Metric => {
            let rounded = ((meters / 50.0).round() * 50.0).max(50.0);
            format!("{:.0} meters", rounded)
        }
        Units::Imperial => {
            let feet = meters * FEET_PER_METER;
            if feet < 1_000.0 {
                let rounded = ((feet / 100.0).round() * 100.0).max(100.0);
                return format!("{:.0} feet", rounded);
            }
            let quarters = (meters / METERS_PER_MILE * 4.0).round();
            if quarters <= 1.0 {
                "a quarter mile".to_string()
            } else if quarters == 2.0 {
                "half a mile".to_string()
            } else {
                format!("{:.1} miles", quarters / 4.0)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject(direction: Direction, severity: u8, modifier: Modifier) -> CalloutSubject {
        CalloutSubject {
            id: EventId::Curve(0),
            direction,
            severity,
            modifier,
            angle_degrees: 60.0,
            is_chicane: false,
            chicane_parts: Vec::new(),
            max_child_severity: None,
            distance: 1_000.0,
            ahead_m: 300.0,
        }
    }

    #[test]
    fn test_rally_notes() {
        let book = RallyPhrasebook;
        let mode = DrivingMode::default();

        let s = subject(Direction::Left, 4, Modifier::Tightens);
        assert_eq!(book.render(&s, CalloutKind::Main, &mode), "left 4 tightens");

        let s = subject(Direction::Right, 5, Modifier::None);
        assert_eq!(
            book.render(&s, CalloutKind::Early, &mode),
            "caution, right 5 in 300 meters"
        );
        assert_eq!(book.render(&s, CalloutKind::Final, &mode), "right 5 now");

        let s = subject(Direction::Left, 6, Modifier::Hairpin);
        assert_eq!(book.render(&s, CalloutKind::Main, &mode), "left hairpin");
    }

    #[test]
    fn test_chicane_note() {
        let book = RallyPhrasebook;
        let mode = DrivingMode::default();
        let mut s = subject(Direction::Left, 4, Modifier::Caution);
        s.is_chicane = true;
        s.chicane_parts = vec![(Direction::Left, 3), (Direction::Right, 4)];

        assert_eq!(
            book.render(&s, CalloutKind::Main, &mode),
            "chicane left 3 right 4"
        );
        assert_eq!(book.render(&s, CalloutKind::Final, &mode), "chicane now");
    }

    #[test]
    fn test_advisory_style() {
        let book = RallyPhrasebook;
        let mode = DrivingMode {
            style: CalloutStyle::Advisory,
            ..Default::default()
        };
        let s = subject(Direction::Left, 4, Modifier::None);
        assert_eq!(
            book.render(&s, CalloutKind::Main, &mode),
            "sharp left curve ahead"
        );
        assert_eq!(book.render_clear(&mode), "road straightens");
    }

    #[test]
    fn test_compound() {
        let book = RallyPhrasebook;
        let mode = DrivingMode::default();
        let a = subject(Direction::Left, 3, Modifier::None);
        let b = subject(Direction::Right, 4, Modifier::None);
        assert_eq!(book.render_compound(&a, &b, &mode), "left 3 into right 4");
    }

    #[test]
    fn test_zone_text() {
        let zone = Zone {
            id: 2,
            character: ZoneCharacter::Technical,
            start_distance: 0.0,
            end_distance: 100.0,
        };
        let book = RallyPhrasebook;
        assert_eq!(
            book.render_zone(&zone, &DrivingMode::default()),
            "technical section"
        );
    }

    #[test]
    fn test_format_distance() {
        assert_eq!(format_distance(290.0, Units::Metric), "300 meters");
        assert_eq!(format_distance(10.0, Units::Metric), "50 meters");
        assert_eq!(format_distance(200.0, Units::Imperial), "700 feet");
        assert_eq!(format_distance(400.0, Units::Imperial), "a quarter mile");
        assert_eq!(format_distance(800.0, Units::Imperial), "half a mile");
        assert_eq!(format_distance(2_400.0, Units::Imperial), "1.5 miles");
    }
}
