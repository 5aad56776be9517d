//! Typed configuration for monitors, the spatial index and clipping.
//!
//! Every struct validates at construction time so that bad values fail
//! before the simulation starts, never in the middle of a run.

use crate::error::ClipError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How a monitor reacts when the index no longer knows its node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsistencyPolicy {
    /// Propagate the error and abort the run
    Strict,
    /// Log a warning and keep going
    Lenient,
}

impl Default for ConsistencyPolicy {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            ConsistencyPolicy::Strict
        } else {
            ConsistencyPolicy::Lenient
        }
    }
}

/// Configuration for a per-node movement monitor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Minimum displacement (distance units) that triggers a position change.
    /// Zero means any detectable movement.
    pub displacement_threshold: f64,

    /// Maximum time a recorded position may go unconfirmed
    pub refresh_interval: Duration,

    /// Lower bound on the delay between two checks of the same node.
    ///
    /// Only matters for fast nodes with a tiny threshold, where the predicted
    /// crossing time would otherwise collapse to zero.
    pub min_check_interval: Duration,

    /// Reaction to index desynchronization
    pub consistency: ConsistencyPolicy,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            displacement_threshold: 0.0,
            refresh_interval: Duration::from_secs(1),
            min_check_interval: Duration::from_millis(1),
            consistency: ConsistencyPolicy::default(),
        }
    }
}

impl MonitorConfig {
    /// Creates a validated monitor configuration.
    ///
    /// # Arguments
    /// * `refresh_interval` - Timeout cadence, must be non-zero
    /// * `displacement_threshold` - Distance trigger, must be finite and >= 0
    pub fn new(refresh_interval: Duration, displacement_threshold: f64) -> Result<Self, ClipError> {
        let config = Self {
            displacement_threshold,
            refresh_interval,
            ..Default::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Sets the consistency policy.
    pub fn with_consistency(mut self, consistency: ConsistencyPolicy) -> Self {
        self.consistency = consistency;
        self
    }

    /// Sets the minimum check interval.
    pub fn with_min_check_interval(mut self, interval: Duration) -> Self {
        self.min_check_interval = interval;
        self
    }

    /// Checks every field against its allowed range.
    pub fn validate(&self) -> Result<(), ClipError> {
        if !self.displacement_threshold.is_finite() || self.displacement_threshold < 0.0 {
            return Err(ClipError::invalid_config(format!(
                "displacement_threshold must be a finite distance >= 0, got {}",
                self.displacement_threshold
            )));
        }
        if self.refresh_interval.is_zero() {
            return Err(ClipError::invalid_config("refresh_interval must be > 0"));
        }
        if self.min_check_interval.is_zero() {
            return Err(ClipError::invalid_config("min_check_interval must be > 0"));
        }
        Ok(())
    }
}

/// Configuration for the uniform grid spatial index.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Edge length of a grid cell. Should be at least the typical query radius.
    pub cell_size: f64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self { cell_size: 1000.0 }
    }
}

impl IndexConfig {
    /// Creates a validated index configuration.
    pub fn new(cell_size: f64) -> Result<Self, ClipError> {
        let config = Self { cell_size };
        config.validate()?;
        Ok(config)
    }

    /// Cell size must be finite and strictly positive.
    pub fn validate(&self) -> Result<(), ClipError> {
        if !self.cell_size.is_finite() || self.cell_size <= 0.0 {
            return Err(ClipError::invalid_config(format!(
                "cell_size must be a finite distance > 0, got {}",
                self.cell_size
            )));
        }
        Ok(())
    }
}

/// Configuration for the clipped propagation adapter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClipConfig {
    /// Radius around a transmitter that bounds the candidate receivers
    pub clip_range: f64,

    /// When false, every registered node is a candidate
    pub indexing_enabled: bool,
}

impl Default for ClipConfig {
    fn default() -> Self {
        Self {
            clip_range: 1000.0,
            indexing_enabled: true,
        }
    }
}

impl ClipConfig {
    /// Creates a validated clipping configuration.
    pub fn new(clip_range: f64, indexing_enabled: bool) -> Result<Self, ClipError> {
        let config = Self {
            clip_range,
            indexing_enabled,
        };
        config.validate()?;
        Ok(config)
    }

    /// Clip range must be >= 0; `f64::INFINITY` clips nothing.
    pub fn validate(&self) -> Result<(), ClipError> {
        validate_clip_range(self.clip_range)
    }
}

pub(crate) fn validate_clip_range(radius: f64) -> Result<(), ClipError> {
    if radius.is_nan() || radius < 0.0 {
        return Err(ClipError::invalid_config(format!(
            "clip_range must be a distance >= 0, got {}",
            radius
        )));
    }
    Ok(())
}
