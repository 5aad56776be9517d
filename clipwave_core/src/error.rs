//! Error types for the ClipWave core.

use clipwave_env::{EnvError, NodeId};
use thiserror::Error;

/// Errors raised by the spatial index, the movement monitors and the
/// clipping adapter.
///
/// None of these are transient: they signal a programming error or a
/// desynchronization between a monitor and the index, so callers must not
/// retry them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClipError {
    /// Insert on a node that is already indexed (use update instead)
    #[error("Node {0} is already indexed")]
    DuplicateInsert(NodeId),

    /// Update/remove referencing a node the index does not hold
    #[error("Node {0} is not indexed")]
    NotFound(NodeId),

    /// Rejected configuration value (negative radius, zero interval, ...)
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The simulation kernel refused a timer operation
    #[error("Scheduling failed: {0}")]
    Scheduling(#[from] EnvError),
}

impl ClipError {
    /// Creates an invalid configuration error.
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Returns true for errors that indicate the index and the monitors
    /// disagree about which nodes exist.
    pub fn is_consistency_fault(&self) -> bool {
        matches!(self, Self::DuplicateInsert(_) | Self::NotFound(_))
    }
}
