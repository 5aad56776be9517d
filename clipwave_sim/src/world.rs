//! SimWorld - the simulation harness container.
//!
//! Owns every moving part of a run and drives them from one event queue:
//!
//! ```text
//!            EventQueue<SimEvent>
//!     ┌──────────┬─────────┴──────────┬───────────┐
//!   Check    CourseChange         Transmit      Teardown
//!     │          │                    │             │
//!     ▼          ▼                    ▼             ▼
//!  MovementMonitor ──► GridIndex ◄── ClippedPropagation
//!     │   ▲                              │
//!     │   └──── Oracle (ground truth) ───┤
//!     ▼                                  ▼
//!  NotificationBus               ReceptionModel (per candidate)
//! ```

use crate::error::SimError;
use crate::kernel::EventQueue;
use crate::oracle::{NodeMotion, Oracle};
use crate::reception::ReceptionConfig;

use clipwave_core::{
    CandidateStats, ClipConfig, ClippedPropagation, GridIndex, IndexConfig, IndexStats, MonitorCheck,
    MonitorConfig, MovementMonitor, Notification, NotificationBus, NotificationKind, SharedIndex,
};
use clipwave_env::{distance, EnvError, MobilityModel, NodeId, ReceptionModel, Scheduler, SimTime, TimerHandle};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Configuration for a simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Master seed for determinism
    pub seed: u64,

    /// Simulated time to run for (inclusive stop)
    pub duration_secs: f64,

    /// Movement monitor settings shared by all nodes
    pub monitor: MonitorConfig,

    /// Spatial index settings
    pub index: IndexConfig,

    /// Clipping settings
    pub clip: ClipConfig,

    /// Physical layer stand-in
    pub reception: ReceptionConfig,

    /// Seconds between two broadcasts of the same node (None = broadcast once)
    pub broadcast_interval_secs: Option<f64>,

    /// Offset between the first broadcasts of consecutive nodes
    pub broadcast_stagger_secs: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            duration_secs: 10.0,
            monitor: MonitorConfig::default(),
            index: IndexConfig::default(),
            clip: ClipConfig::default(),
            reception: ReceptionConfig::default(),
            broadcast_interval_secs: None,
            broadcast_stagger_secs: 0.01,
        }
    }
}

impl SimConfig {
    /// Loads a config from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, SimError> {
        let text = std::fs::read_to_string(path)?;
        let config: SimConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SimError> {
        self.stop_time()?;
        self.broadcast_interval()?;
        self.broadcast_stagger()?;
        self.monitor.validate()?;
        self.index.validate()?;
        self.clip.validate()?;
        self.reception.validate()
    }

    /// The inclusive stop time.
    pub fn stop_time(&self) -> Result<SimTime, SimError> {
        to_duration("duration", self.duration_secs)
    }

    /// The broadcast period, if nodes rebroadcast.
    ///
    /// An interval that rounds to zero nanoseconds is rejected: the node
    /// would rebroadcast at the same instant forever.
    pub fn broadcast_interval(&self) -> Result<Option<Duration>, SimError> {
        let Some(secs) = self.broadcast_interval_secs else {
            return Ok(None);
        };
        let interval = to_duration("broadcast interval", secs)?;
        if interval.is_zero() {
            return Err(SimError::invalid_config(format!(
                "broadcast interval must be at least 1ns, got {} seconds",
                secs
            )));
        }
        Ok(Some(interval))
    }

    pub fn broadcast_stagger(&self) -> Result<Duration, SimError> {
        to_duration("broadcast stagger", self.broadcast_stagger_secs)
    }
}

fn to_duration(what: &str, secs: f64) -> Result<Duration, SimError> {
    Duration::try_from_secs_f64(secs)
        .map_err(|err| SimError::invalid_config(format!("{} of {} seconds: {}", what, secs, err)))
}

/// Everything the kernel can fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimEvent {
    /// A movement monitor's scheduled check
    Check(MonitorCheck),

    /// A node broadcasts a frame
    Transmit { node: NodeId },

    /// A random walker picks a new heading
    CourseChange { node: NodeId },

    /// A node leaves the simulation
    Teardown { node: NodeId },
}

impl From<MonitorCheck> for SimEvent {
    fn from(check: MonitorCheck) -> Self {
        SimEvent::Check(check)
    }
}

/// Per-node bookkeeping.
struct NodeSlot {
    id: NodeId,
    monitor: Option<MovementMonitor>,
    transmissions: u64,
    receptions: u64,
    active: bool,
}

/// Run totals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldStats {
    /// Final simulated time in seconds
    pub time_secs: f64,
    pub installed: usize,
    pub active: usize,
    pub events_fired: u64,
    pub transmissions: u64,
    pub receptions: u64,
    /// Reception model evaluations (the work clipping saves)
    pub reception_evaluations: u64,
    pub position_changes: u64,
    pub timeouts: u64,
    pub candidates: CandidateStats,
    pub index: IndexStats,
}

/// How far the index has drifted from ground truth.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct IndexAudit {
    /// Largest distance between an indexed and a true position
    pub max_lag: f64,

    /// Active nodes the index does not know
    pub missing: usize,

    /// Indexed nodes that are no longer active
    pub orphaned: usize,

    /// Range queries whose result differs from a brute-force scan
    pub query_mismatches: usize,
}

/// The SimWorld - container for the entire simulation.
pub struct SimWorld {
    /// Configuration
    config: SimConfig,

    /// Event queue and virtual clock
    kernel: EventQueue<SimEvent>,

    /// Ground truth oracle
    oracle: Oracle,

    /// Index shared by all monitors and read by the adapter
    index: SharedIndex,

    /// Clipping adapter
    adapter: ClippedPropagation,

    /// Physical layer stand-in
    reception: Box<dyn ReceptionModel>,

    /// Notification fan-out
    bus: NotificationBus,

    /// Everything published on the bus, in order
    log: Rc<RefCell<Vec<Notification>>>,

    /// Inclusive stop time
    stop_time: SimTime,

    /// Broadcast period and first-broadcast offset
    broadcast_interval: Option<Duration>,
    broadcast_stagger: Duration,

    /// Nodes in installation order
    slots: Vec<NodeSlot>,

    /// NodeId -> slot
    slot_of: HashMap<NodeId, usize>,

    transmissions: u64,
    receptions: u64,
    reception_evaluations: u64,
}

impl SimWorld {
    /// Creates an empty world from a validated configuration.
    pub fn new(config: SimConfig) -> Result<Self, SimError> {
        config.validate()?;
        let stop_time = config.stop_time()?;
        let broadcast_interval = config.broadcast_interval()?;
        let broadcast_stagger = config.broadcast_stagger()?;

        // Separate seed for the physics stream
        let physics_seed = config.seed.wrapping_mul(0x9e3779b97f4a7c15);

        let index = GridIndex::shared(config.index)?;
        let adapter = ClippedPropagation::new(config.clip)?;
        let reception = config.reception.build()?;

        if !adapter.check_fidelity(reception.as_ref())
            && adapter.indexing_enabled()
            && config.clip.clip_range < reception.max_range() + config.monitor.displacement_threshold
        {
            warn!(
                "clip range {:.1} leaves less than the displacement threshold ({:.1}) of slack over the reception range {:.1}",
                config.clip.clip_range,
                config.monitor.displacement_threshold,
                reception.max_range()
            );
        }

        let log = Rc::new(RefCell::new(Vec::new()));
        let mut bus = NotificationBus::new();
        let sink = Rc::clone(&log);
        bus.subscribe_all(move |n| sink.borrow_mut().push(*n));

        Ok(Self {
            config,
            kernel: EventQueue::new(),
            oracle: Oracle::new(physics_seed),
            index,
            adapter,
            reception,
            bus,
            log,
            stop_time,
            broadcast_interval,
            broadcast_stagger,
            slots: Vec::new(),
            slot_of: HashMap::new(),
            transmissions: 0,
            receptions: 0,
            reception_evaluations: 0,
        })
    }

    /// Installs a node at the current time.
    ///
    /// With `monitored` the node gets a movement monitor that keeps its index
    /// entry fresh; otherwise it is indexed once at its starting position,
    /// which is only accurate for stationary nodes.
    pub fn install_node(&mut self, motion: NodeMotion, monitored: bool) -> Result<NodeId, SimError> {
        let id = NodeId::from_seed(self.slots.len() as u64);
        let now = self.kernel.now();

        self.oracle.add_node(id, motion, now);
        let motion = self.oracle.motion(id).ok_or_else(|| EnvError::unknown_node(id))?;
        let position = motion.position(now);
        let velocity = motion.velocity(now);
        let walk = motion.walk;

        let monitor = if monitored {
            let mut monitor = MovementMonitor::new(id, self.config.monitor, Rc::clone(&self.index))?;
            monitor.initialize::<_, SimEvent>(&mut self.kernel, position, velocity)?;
            Some(monitor)
        } else {
            self.index.borrow_mut().insert(id, position)?;
            None
        };

        if let Some(walk) = walk {
            self.kernel.schedule_in(walk.course_interval, SimEvent::CourseChange { node: id })?;
        }

        self.slot_of.insert(id, self.slots.len());
        self.slots.push(NodeSlot {
            id,
            monitor,
            transmissions: 0,
            receptions: 0,
            active: true,
        });

        debug!("installed node {} at {:?} (monitored={})", id, position, monitored);
        Ok(id)
    }

    /// Schedules the first broadcast of every installed node.
    ///
    /// Node `i` first transmits at `now + i * broadcast_stagger`; with a
    /// broadcast interval each node then repeats at that period.
    pub fn start_broadcasts(&mut self) -> Result<(), SimError> {
        for (i, slot) in self.slots.iter().enumerate() {
            if !slot.active {
                continue;
            }
            let offset = u32::try_from(i)
                .ok()
                .and_then(|i| self.broadcast_stagger.checked_mul(i))
                .ok_or_else(|| {
                    SimError::invalid_config(format!(
                        "broadcast stagger {:?} overflows for node #{}",
                        self.broadcast_stagger, i
                    ))
                })?;
            self.kernel.schedule_in(offset, SimEvent::Transmit { node: slot.id })?;
        }
        Ok(())
    }

    /// Schedules a node's teardown.
    pub fn schedule_teardown(&mut self, node: NodeId, at: SimTime) -> Result<TimerHandle, SimError> {
        Ok(self.kernel.schedule_at(at, SimEvent::Teardown { node })?)
    }

    /// Removes a node now: cancels its pending check and drops its index entry.
    ///
    /// Returns false if the node was already gone.
    pub fn teardown_node(&mut self, node: NodeId) -> Result<bool, SimError> {
        let Some(&slot) = self.slot_of.get(&node) else {
            return Err(EnvError::unknown_node(node).into());
        };
        let slot = &mut self.slots[slot];
        if !slot.active {
            return Ok(false);
        }

        match slot.monitor.as_mut() {
            Some(monitor) => monitor.teardown::<_, SimEvent>(&mut self.kernel)?,
            None => {
                self.index.borrow_mut().remove(node)?;
            }
        }
        slot.active = false;
        self.oracle.remove_node(node);

        debug!("tore down node {} at {:?}", node, self.kernel.now());
        Ok(true)
    }

    /// Processes the next event if it is due at or before the stop time.
    ///
    /// Returns the time of the processed event, or `None` once the run is over.
    pub fn step(&mut self) -> Result<Option<SimTime>, SimError> {
        match self.kernel.peek_time() {
            Some(at) if at <= self.stop_time => {}
            _ => return Ok(None),
        }
        let Some((handle, event)) = self.kernel.pop() else {
            return Ok(None);
        };

        self.dispatch(handle, event)?;
        Ok(Some(self.kernel.now()))
    }

    /// Runs until the stop time and returns the totals.
    pub fn run(&mut self) -> Result<WorldStats, SimError> {
        while self.step()?.is_some() {}
        self.kernel.advance_to(self.stop_time);

        let stats = self.stats();
        info!(
            "run finished at {:.2}s: {} tx, {} rx, {} position changes, {} timeouts",
            stats.time_secs, stats.transmissions, stats.receptions, stats.position_changes, stats.timeouts
        );
        Ok(stats)
    }

    fn dispatch(&mut self, handle: TimerHandle, event: SimEvent) -> Result<(), SimError> {
        match event {
            SimEvent::Check(check) => self.on_check(handle, check),
            SimEvent::Transmit { node } => self.on_transmit(node),
            SimEvent::CourseChange { node } => self.on_course_change(node),
            SimEvent::Teardown { node } => self.teardown_node(node).map(|_| ()),
        }
    }

    fn on_check(&mut self, handle: TimerHandle, check: MonitorCheck) -> Result<(), SimError> {
        let Some(&slot) = self.slot_of.get(&check.node) else {
            return Err(EnvError::unknown_node(check.node).into());
        };
        let slot = &mut self.slots[slot];
        let (true, Some(monitor)) = (slot.active, slot.monitor.as_mut()) else {
            debug!("check {} for departed node {} ignored", handle, check.node);
            return Ok(());
        };
        let motion = self
            .oracle
            .motion(check.node)
            .ok_or_else(|| EnvError::unknown_node(check.node))?;

        let notification = monitor.check::<_, SimEvent, _>(&mut self.kernel, handle, motion)?;
        if let Some(notification) = notification {
            self.bus.publish(&notification);
        }
        Ok(())
    }

    fn on_course_change(&mut self, node: NodeId) -> Result<(), SimError> {
        if !self.is_active(node) {
            return Ok(());
        }
        let now = self.kernel.now();
        let Some(velocity) = self.oracle.change_course(node, now) else {
            return Ok(());
        };
        let motion = self.oracle.motion(node).ok_or_else(|| EnvError::unknown_node(node))?;
        let position = motion.position(now);
        let walk = motion.walk;

        let slot = self.slot_of[&node];
        if let Some(monitor) = self.slots[slot].monitor.as_mut() {
            let notification = monitor.course_changed::<_, SimEvent>(&mut self.kernel, position, Some(velocity))?;
            if let Some(notification) = notification {
                self.bus.publish(&notification);
            }
        }

        if let Some(walk) = walk {
            self.kernel.schedule_in(walk.course_interval, SimEvent::CourseChange { node })?;
        }
        Ok(())
    }

    fn on_transmit(&mut self, node: NodeId) -> Result<(), SimError> {
        if !self.is_active(node) {
            return Ok(());
        }
        let now = self.kernel.now();
        let tx_position = self.oracle.position(node, now).ok_or_else(|| EnvError::unknown_node(node))?;

        let candidates = self
            .adapter
            .compute_receiver_candidates(&self.index.borrow(), &tx_position);

        let mut heard = 0;
        for rx in candidates.into_iter().filter(|rx| *rx != node) {
            // Reception is always decided on true positions; the index only
            // narrows who gets asked
            let Some(rx_position) = self.oracle.position(rx, now) else {
                continue;
            };
            self.reception_evaluations += 1;
            if self.reception.receives(&tx_position, &rx_position) {
                self.slots[self.slot_of[&rx]].receptions += 1;
                heard += 1;
            }
        }

        self.transmissions += 1;
        self.receptions += heard;
        self.slots[self.slot_of[&node]].transmissions += 1;
        debug!("node {} transmitted at {:?}: heard by {}", node, now, heard);

        if let Some(interval) = self.broadcast_interval {
            self.kernel.schedule_in(interval, SimEvent::Transmit { node })?;
        }
        Ok(())
    }

    /// Compares the index against ground truth and against brute force.
    ///
    /// One range query of radius `clip_range` is checked around every active
    /// node, so the cost is quadratic in the node count.
    pub fn audit(&self) -> IndexAudit {
        let now = self.kernel.now();
        let index = self.index.borrow();
        let radius = self.adapter.clip_range();
        let mut audit = IndexAudit::default();

        let truth = self.oracle.ground_truth_positions(now);
        for (node, true_position) in &truth {
            match index.position(*node) {
                Some(indexed) => audit.max_lag = audit.max_lag.max(distance(&indexed, true_position)),
                None => audit.missing += 1,
            }

            let fast = index.query_range(true_position, radius);
            let brute: std::collections::BTreeSet<_> = index
                .node_ids()
                .into_iter()
                .filter(|id| {
                    index
                        .position(*id)
                        .is_some_and(|p| distance(&p, true_position) <= radius)
                })
                .collect();
            if fast != brute {
                audit.query_mismatches += 1;
            }
        }
        audit.orphaned = index.node_ids().into_iter().filter(|id| !self.is_active(*id)).count();

        audit
    }

    /// Run totals so far.
    pub fn stats(&self) -> WorldStats {
        let log = self.log.borrow();
        WorldStats {
            time_secs: self.kernel.now().as_secs_f64(),
            installed: self.slots.len(),
            active: self.slots.iter().filter(|s| s.active).count(),
            events_fired: self.kernel.fired(),
            transmissions: self.transmissions,
            receptions: self.receptions,
            reception_evaluations: self.reception_evaluations,
            position_changes: log.iter().filter(|n| n.kind() == NotificationKind::PositionChange).count() as u64,
            timeouts: log.iter().filter(|n| n.kind() == NotificationKind::Timeout).count() as u64,
            candidates: self.adapter.stats(),
            index: self.index.borrow().stats(),
        }
    }

    /// Per-node reception counts in installation order.
    pub fn reception_counts(&self) -> Vec<u64> {
        self.slots.iter().map(|s| s.receptions).collect()
    }

    /// Per-node transmission counts in installation order.
    pub fn transmission_counts(&self) -> Vec<u64> {
        self.slots.iter().map(|s| s.transmissions).collect()
    }

    /// All notifications published so far, in order.
    pub fn notifications(&self) -> Vec<Notification> {
        self.log.borrow().clone()
    }

    /// Notifications of one node, in order.
    pub fn notifications_for(&self, node: NodeId) -> Vec<Notification> {
        self.log.borrow().iter().filter(|n| n.node() == node).copied().collect()
    }

    /// Registers further observers.
    pub fn bus_mut(&mut self) -> &mut NotificationBus {
        &mut self.bus
    }

    pub fn monitor(&self, node: NodeId) -> Option<&MovementMonitor> {
        self.slot_of.get(&node).and_then(|&i| self.slots[i].monitor.as_ref())
    }

    pub fn is_active(&self, node: NodeId) -> bool {
        self.slot_of.get(&node).is_some_and(|&i| self.slots[i].active)
    }

    /// Installed nodes in installation order.
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.slots.iter().map(|s| s.id).collect()
    }

    pub fn now(&self) -> SimTime {
        self.kernel.now()
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// The inclusive stop time of `run`.
    pub fn stop_time(&self) -> SimTime {
        self.stop_time
    }

    pub fn index(&self) -> &SharedIndex {
        &self.index
    }

    pub fn oracle(&self) -> &Oracle {
        &self.oracle
    }

    pub fn adapter(&self) -> &ClippedPropagation {
        &self.adapter
    }

    /// Max range of the configured reception model.
    pub fn reception_range(&self) -> f64 {
        self.reception.max_range()
    }

    /// Events still waiting on the kernel.
    pub fn pending_events(&self) -> usize {
        self.kernel.len()
    }
}
