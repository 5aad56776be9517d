//! ClipWave Environment Abstraction Layer
//!
//! This crate defines the collaborators the ClipWave core talks to but does
//! not own:
//! - The discrete-event kernel (`Scheduler`): virtual clock, timers, cancellation
//! - Ground-truth motion (`MobilityModel`): position and velocity sampling
//! - The physical layer (`ReceptionModel`): does a receiver hear a frame?
//!
//! The core runs against the deterministic simulation kernel in
//! `clipwave_sim` or any other host.
//!
//! # Example
//!
//! ```ignore
//! use clipwave_env::{MobilityModel, Scheduler};
//!
//! fn arm<S: Scheduler<Check>>(sched: &mut S, node: NodeId) {
//!     sched.schedule_in(Duration::from_secs(4), Check(node)).unwrap();
//! }
//! ```

mod error;
mod mobility;
mod scheduler;
mod types;

pub use error::EnvError;
pub use mobility::{MobilityModel, ReceptionModel};
pub use scheduler::Scheduler;
pub use types::{distance, NodeId, Position, SimTime, TimerHandle, Velocity};
