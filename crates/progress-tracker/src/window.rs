//! Trailing position window for stable heading estimates

use route_geometry::{haversine_m, initial_bearing_deg, GeoPoint};
use std::collections::VecDeque;

/// Sliding window over the most recent accepted positions
pub struct HeadingWindow {
    positions: VecDeque<GeoPoint>,
    size: usize,
    /// Minimum span between oldest and newest position for a heading (meters)
    min_span_m: f64,
}

impl HeadingWindow {
    /// Create a new window holding up to `size` positions
    pub fn new(size: usize, min_span_m: f64) -> Self {
        let size = size.max(2);
        Self {
            positions: VecDeque::with_capacity(size),
            size,
            min_span_m,
        }
    }

    /// Add a position, evicting the oldest when full
    pub fn push(&mut self, position: GeoPoint) {
        if self.positions.len() == self.size {
            self.positions.pop_front();
        }
        self.positions.push_back(position);
    }

    /// Bearing from the oldest to the newest position, if they are far enough apart
    pub fn heading(&self) -> Option<f64> {
        let oldest = *self.positions.front()?;
        let newest = *self.positions.back()?;
        (haversine_m(oldest, newest) >= self.min_span_m)
            .then(|| initial_bearing_deg(oldest, newest))
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Reset the window
    pub fn reset(&mut self) {
        self.positions.clear();
    }
}
