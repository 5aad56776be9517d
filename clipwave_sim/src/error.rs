//! Simulation harness errors.

use clipwave_core::ClipError;
use clipwave_env::EnvError;
use thiserror::Error;

/// Errors raised while configuring or driving a simulation.
#[derive(Debug, Error)]
pub enum SimError {
    /// Monitor, index or adapter failure
    #[error(transparent)]
    Clip(#[from] ClipError),

    /// Kernel rejected an event
    #[error("Scheduling failed: {0}")]
    Env(#[from] EnvError),

    /// Simulation parameters are out of range
    #[error("Invalid simulation config: {0}")]
    InvalidConfig(String),

    /// Config file could not be read
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid JSON for `SimConfig`
    #[error("Failed to parse config: {0}")]
    Json(#[from] serde_json::Error),
}

impl SimError {
    /// Creates an invalid configuration error.
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}
