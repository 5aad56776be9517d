//! Reception models used to decide whether a transmission is heard.

use crate::error::SimError;
use clipwave_env::{distance, Position, ReceptionModel};
use serde::{Deserialize, Serialize};

/// Unit-disk reception: everything within `range` hears the frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangeReception {
    pub range: f64,
}

impl RangeReception {
    pub fn new(range: f64) -> Self {
        Self { range }
    }
}

impl ReceptionModel for RangeReception {
    fn receives(&self, tx: &Position, rx: &Position) -> bool {
        distance(tx, rx) <= self.range
    }

    fn max_range(&self) -> f64 {
        self.range
    }
}

/// Deterministic log-distance path loss with a receive sensitivity.
///
/// `rx_power = tx_power - reference_loss - 10 * exponent * log10(d / d0)`
/// for `d > d0`, and `tx_power - reference_loss` closer than that. A frame
/// is received when `rx_power >= sensitivity`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogDistanceReception {
    /// Transmit power (dBm)
    pub tx_power_dbm: f64,

    /// Loss at the reference distance (dB)
    pub reference_loss_db: f64,

    /// Reference distance d0
    pub reference_distance: f64,

    /// Path loss exponent
    pub exponent: f64,

    /// Weakest decodable signal (dBm)
    pub sensitivity_dbm: f64,
}

impl Default for LogDistanceReception {
    fn default() -> Self {
        Self {
            tx_power_dbm: 16.0206,
            reference_loss_db: 46.6777,
            reference_distance: 1.0,
            exponent: 3.0,
            sensitivity_dbm: -96.0,
        }
    }
}

impl LogDistanceReception {
    /// Received power at distance `d` (dBm).
    pub fn rx_power_dbm(&self, d: f64) -> f64 {
        let base = self.tx_power_dbm - self.reference_loss_db;
        if d <= self.reference_distance {
            base
        } else {
            base - 10.0 * self.exponent * (d / self.reference_distance).log10()
        }
    }

    pub fn validate(&self) -> Result<(), SimError> {
        if !self.exponent.is_finite() || self.exponent <= 0.0 {
            return Err(SimError::invalid_config(format!(
                "path loss exponent must be > 0, got {}",
                self.exponent
            )));
        }
        if !self.reference_distance.is_finite() || self.reference_distance <= 0.0 {
            return Err(SimError::invalid_config(format!(
                "reference distance must be > 0, got {}",
                self.reference_distance
            )));
        }
        let powers = [self.tx_power_dbm, self.reference_loss_db, self.sensitivity_dbm];
        if powers.iter().any(|p| !p.is_finite()) {
            return Err(SimError::invalid_config("power levels must be finite"));
        }
        Ok(())
    }
}

impl ReceptionModel for LogDistanceReception {
    fn receives(&self, tx: &Position, rx: &Position) -> bool {
        self.rx_power_dbm(distance(tx, rx)) >= self.sensitivity_dbm
    }

    fn max_range(&self) -> f64 {
        let margin = self.tx_power_dbm - self.reference_loss_db - self.sensitivity_dbm;
        if margin < 0.0 {
            0.0
        } else {
            self.reference_distance * 10f64.powf(margin / (10.0 * self.exponent))
        }
    }
}

/// Serializable choice of reception model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum ReceptionConfig {
    Range(RangeReception),
    LogDistance(LogDistanceReception),
}

impl Default for ReceptionConfig {
    fn default() -> Self {
        ReceptionConfig::Range(RangeReception::new(1000.0))
    }
}

impl ReceptionConfig {
    pub fn validate(&self) -> Result<(), SimError> {
        match self {
            ReceptionConfig::Range(model) => {
                if !model.range.is_finite() || model.range < 0.0 {
                    return Err(SimError::invalid_config(format!(
                        "reception range must be a finite distance >= 0, got {}",
                        model.range
                    )));
                }
                Ok(())
            }
            ReceptionConfig::LogDistance(model) => model.validate(),
        }
    }

    /// Builds the configured model.
    pub fn build(&self) -> Result<Box<dyn ReceptionModel>, SimError> {
        self.validate()?;
        Ok(match *self {
            ReceptionConfig::Range(model) => Box::new(model),
            ReceptionConfig::LogDistance(model) => Box::new(model),
        })
    }
}
