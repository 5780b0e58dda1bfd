//! Geometry Error Types

use thiserror::Error;

/// Errors raised by distance-index queries
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    /// Query against an index built from an empty or degenerate polyline
    #[error("Distance index is empty")]
    EmptyIndex,

    /// Polyline has fewer points than the operation needs
    #[error("Polyline has {actual} points, need at least {required}")]
    TooFewPoints { required: usize, actual: usize },

    /// Query value is NaN or infinite
    #[error("Non-finite input: {0}")]
    NonFinite(&'static str),
}
