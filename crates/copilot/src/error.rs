//! Session Error Types

use route_geometry::GeometryError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors loading configuration or routes
#[derive(Debug, Error)]
pub enum CopilotError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Cannot read route file {path}: {source}")]
    RouteIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid route JSON: {0}")]
    RouteParse(#[from] serde_json::Error),

    #[error("Route geometry error: {0}")]
    Geometry(#[from] GeometryError),

    #[error("No route loaded")]
    NoRoute,
}

pub type Result<T> = std::result::Result<T, CopilotError>;
