//! Error types for meshtune

use thiserror::Error;

/// Main error type for meshtune operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Invalid reduction target: cannot remove {requested} of {vertex_count} vertices")]
    InvalidReductionTarget { requested: usize, vertex_count: usize },

    #[error("Malformed mesh: {0}")]
    MalformedMesh(String),

    #[error("GPU timer queries are not available on this device")]
    GpuTimerUnavailable,

    #[error("GPU timer query was lost before its result became available")]
    GpuQueryLost,

    #[error("Unknown scene node: {0}")]
    UnknownNode(u64),

    #[error("Simplification worker error: {0}")]
    Worker(String),
}

/// Result type alias for meshtune operations
pub type Result<T> = std::result::Result<T, Error>;
