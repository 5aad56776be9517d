//! ClipWave Deterministic Simulation Harness
//!
//! This crate provides a controlled discrete-event world in which the
//! clipping machinery runs deterministically.
//!
//! # Core Principle: one event queue
//!
//! All sources of non-determinism are pinned down:
//! - **Time**: a virtual clock that only advances to the next event
//! - **Motion**: piecewise-linear ground truth from a seeded oracle
//! - **Randomness**: all entropy derived from a single 64-bit seed
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         SimWorld                            │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │ EventQueue (Virtual Clock + Event Queue)             │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! │       │                        │                            │
//! │  ┌────▼─────┐            ┌─────▼──────────────┐             │
//! │  │ Monitors │──updates──►│ GridIndex          │             │
//! │  └──────────┘            └─────▲──────────────┘             │
//! │       ▲                        │ candidates                 │
//! │       │                  ┌─────┴──────────────┐             │
//! │       │                  │ ClippedPropagation │──► Reception│
//! │       │                  └────────────────────┘             │
//! │  ┌────┴─────────────────────────────┐                       │
//! │  │            Oracle                │                       │
//! │  │  (Ground Truth Motion)           │                       │
//! │  └──────────────────────────────────┘                       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use clipwave_sim::{NodeMotion, SimConfig, SimWorld};
//!
//! let mut world = SimWorld::new(SimConfig::default())?;
//! world.install_node(NodeMotion::stationary(Position::zeros()), true)?;
//! world.start_broadcasts()?;
//! let stats = world.run()?;
//! ```

mod error;
mod kernel;
mod oracle;
mod reception;
mod world;
pub mod exporter;
pub mod runner;
pub mod scenarios;

pub use error::SimError;
pub use exporter::{NotificationRecord, RunExport};
pub use kernel::EventQueue;
pub use oracle::{GridLayout, NodeMotion, Oracle, RandomWalk};
pub use reception::{LogDistanceReception, RangeReception, ReceptionConfig};
pub use runner::{ScenarioMetrics, ScenarioResult, ScenarioRunner};
pub use world::{IndexAudit, SimConfig, SimEvent, SimWorld, WorldStats};
