//! Route zones (externally classified route character)

use serde::{Deserialize, Serialize};

/// Route-segment character
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneCharacter {
    /// Twisty roads where every bend matters
    Technical,
    /// Highways and open roads
    #[default]
    Transit,
    /// Town streets, only strong turns are worth a callout
    Urban,
}

impl ZoneCharacter {
    pub fn as_str(self) -> &'static str {
        match self {
            ZoneCharacter::Technical => "technical",
            ZoneCharacter::Transit => "transit",
            ZoneCharacter::Urban => "urban",
        }
    }
}

/// A classified stretch of route, `[start_distance, end_distance)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub id: u32,
    pub character: ZoneCharacter,
    pub start_distance: f64,
    pub end_distance: f64,
}

impl Zone {
    pub fn contains(&self, distance: f64) -> bool {
        distance >= self.start_distance && distance < self.end_distance
    }
}

/// Zone covering `distance`, if any
pub fn zone_at(zones: &[Zone], distance: f64) -> Option<&Zone> {
    zones.iter().find(|z| z.contains(distance))
}

/// Character at `distance`, transit when no zone covers it
pub fn character_at(zones: &[Zone], distance: f64) -> ZoneCharacter {
    zone_at(zones, distance)
        .map(|z| z.character)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zone_lookup() {
        let zones = vec![
            Zone {
                id: 1,
                character: ZoneCharacter::Urban,
                start_distance: 0.0,
                end_distance: 500.0,
            },
            Zone {
                id: 2,
                character: ZoneCharacter::Technical,
                start_distance: 500.0,
                end_distance: 2_000.0,
            },
        ];

        assert_eq!(zone_at(&zones, 499.9).map(|z| z.id), Some(1));
        assert_eq!(zone_at(&zones, 500.0).map(|z| z.id), Some(2));
        assert_eq!(character_at(&zones, 2_500.0), ZoneCharacter::Transit);
    }
}
