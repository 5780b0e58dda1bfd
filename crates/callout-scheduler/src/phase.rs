//! Per-event warning phases

use crate::error::StateInconsistency;
use curve_detection::EventId;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Warning progress of one event. Only ever moves forward.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum WarningPhase {
    #[default]
    Unannounced,
    EarlyDone,
    MainDone,
    FinalDone,
}

/// Phase of every tracked event
#[derive(Debug, Clone, Default)]
pub struct PhaseMap {
    phases: HashMap<EventId, WarningPhase>,
}

impl PhaseMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current phase; untracked ids read as `Unannounced`
    pub fn get(&self, id: EventId) -> WarningPhase {
        self.phases.get(&id).copied().unwrap_or_default()
    }

    pub fn contains(&self, id: EventId) -> bool {
        self.phases.contains_key(&id)
    }

    /// Start tracking `id` if it is not already
    pub fn track(&mut self, id: EventId) {
        self.phases.entry(id).or_default();
    }

    /// Move `id` strictly forward to `to`
    pub fn advance(&mut self, id: EventId, to: WarningPhase) -> Result<(), StateInconsistency> {
        let entry = self.phases.entry(id).or_default();
        if to <= *entry {
            return Err(StateInconsistency {
                id,
                from: *entry,
                to,
            });
        }
        *entry = to;
        Ok(())
    }

    /// Drop every id not in `keep`, returning how many were dropped
    pub fn retain_tracked(&mut self, keep: &HashSet<EventId>) -> usize {
        let before = self.phases.len();
        self.phases.retain(|id, _| keep.contains(id));
        before - self.phases.len()
    }

    pub fn len(&self) -> usize {
        self.phases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }
}
