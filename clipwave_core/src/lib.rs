//! ClipWave Core - Position-Aware Spatial Clipping for Wireless Simulation
//!
//! This library removes the O(n²) transmitter × receiver sweep from large
//! wireless simulations:
//! 1. **Space**: a uniform grid index answers "who is within r of here?"
//!    without scanning every node
//! 2. **Time**: per-node movement monitors keep that index fresh by predicting
//!    when a node has drifted past its displacement threshold (PositionChange)
//!    or gone unconfirmed for too long (Timeout)
//! 3. **Clipping**: the propagation adapter hands the reception model only the
//!    nodes inside the clip range of each transmitter

pub mod clipping;
pub mod config;
pub mod error;
pub mod metrics;
pub mod monitor;
pub mod notification;
pub mod space;

// Re-export key types for convenience
pub use clipping::{CandidateStats, ClippedPropagation};
pub use config::{ClipConfig, ConsistencyPolicy, IndexConfig, MonitorConfig};
pub use error::ClipError;
pub use metrics::FidelityReport;
pub use monitor::{MonitorCheck, MonitorCounters, MonitorPhase, MovementMonitor};
pub use notification::{Notification, NotificationBus, NotificationKind};
pub use space::{CellKey, GridIndex, IndexEntry, IndexStats, QueryCost, SharedIndex};
