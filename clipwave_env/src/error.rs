//! Error types for the ClipWave environment abstraction.

use crate::types::SimTime;
use thiserror::Error;

/// Errors that can occur in the environment abstraction layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvError {
    /// An event was scheduled before the current simulated time
    #[error("Cannot schedule at {at:?}: clock is already at {now:?}")]
    ScheduleInPast { at: SimTime, now: SimTime },

    /// The kernel was asked about a node it does not know
    #[error("Unknown node: {0}")]
    UnknownNode(String),

    /// A relative delay would move the clock past the largest representable time
    #[error("Cannot schedule {delay:?} after {now:?}: simulated time overflows")]
    TimeOverflow { now: SimTime, delay: SimTime },
}

impl EnvError {
    /// Creates a schedule-in-past error.
    pub fn in_past(at: SimTime, now: SimTime) -> Self {
        Self::ScheduleInPast { at, now }
    }

    pub fn time_overflow(now: SimTime, delay: SimTime) -> Self {
        Self::TimeOverflow { now, delay }
    }

    /// Creates an unknown node error.
    pub fn unknown_node(node: impl std::fmt::Display) -> Self {
        Self::UnknownNode(node.to_string())
    }
}
