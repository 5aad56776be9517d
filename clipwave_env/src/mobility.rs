//! Motion and reception collaborator interfaces.

use crate::types::{Position, SimTime, Velocity};

/// Ground-truth motion of a single node.
///
/// This is the position sampler the movement monitor reads from. Calls are
/// pure queries: sampling a position never changes the model.
pub trait MobilityModel {
    /// Returns the true position at simulated time `now`.
    fn position(&self, now: SimTime) -> Position;

    /// Returns the instantaneous velocity, if the model knows it.
    ///
    /// Monitors use it to predict the exact time the displacement threshold
    /// will be crossed. `None` means the monitor falls back to the refresh
    /// deadline alone.
    fn velocity(&self, _now: SimTime) -> Option<Velocity> {
        None
    }
}

/// Decides whether a transmission is heard by a receiver.
///
/// This stands in for the physical layer. Clipping only narrows the set of
/// receivers this model is asked about; it never replaces it.
pub trait ReceptionModel {
    /// Returns true if a receiver at `rx` decodes a frame sent from `tx`.
    fn receives(&self, tx: &Position, rx: &Position) -> bool;

    /// Maximum distance at which `receives` can return true.
    ///
    /// A clip range at or above this value makes clipping lossless.
    fn max_range(&self) -> f64;
}
