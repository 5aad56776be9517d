//! Scenario runner - executes the clipping regression scenarios.

use crate::error::SimError;
use crate::oracle::{GridLayout, NodeMotion, RandomWalk};
use crate::reception::{RangeReception, ReceptionConfig};
use crate::scenarios::ScenarioId;
use crate::world::{SimConfig, SimWorld, WorldStats};

use clipwave_core::{
    CandidateStats, ClipConfig, FidelityReport, IndexConfig, MonitorConfig, Notification, NotificationKind,
};
use clipwave_env::Velocity;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Final simulation time in seconds
    pub final_time_secs: f64,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,

    /// Clipped vs unclipped comparison, for scenarios that run both
    pub fidelity: Option<FidelityReport>,

    /// Per-node reception counts (clipped run) in installation order
    pub receptions: Vec<u64>,

    /// Notifications of the (clipped) run, in order
    pub notifications: Vec<Notification>,
}

impl ScenarioResult {
    fn failed(scenario: ScenarioId, seed: u64, reason: String) -> Self {
        Self {
            scenario,
            seed,
            passed: false,
            final_time_secs: 0.0,
            failure_reason: Some(reason),
            metrics: ScenarioMetrics::default(),
            fidelity: None,
            receptions: Vec::new(),
            notifications: Vec::new(),
        }
    }
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenarioMetrics {
    /// Nodes installed
    pub nodes: usize,

    /// Kernel events processed
    pub events_fired: u64,

    /// Frames broadcast
    pub transmissions: u64,

    /// Frames received
    pub receptions: u64,

    /// Reception model evaluations
    pub reception_evaluations: u64,

    /// PositionChange notifications
    pub position_changes: u64,

    /// Timeout notifications
    pub timeouts: u64,

    /// Candidate-set statistics of the adapter
    pub candidates: CandidateStats,

    /// Largest index-vs-truth distance seen by the audit
    pub max_index_lag: f64,

    /// Wall-clock time of the (clipped) run
    pub wall_clock_secs: f64,
}

impl ScenarioMetrics {
    fn from_stats(stats: &WorldStats, wall_clock_secs: f64) -> Self {
        Self {
            nodes: stats.installed,
            events_fired: stats.events_fired,
            transmissions: stats.transmissions,
            receptions: stats.receptions,
            reception_evaluations: stats.reception_evaluations,
            position_changes: stats.position_changes,
            timeouts: stats.timeouts,
            candidates: stats.candidates,
            max_index_lag: 0.0,
            wall_clock_secs,
        }
    }
}

/// Runs scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Nodes per grid row for grid scenarios
    grid_width: usize,

    /// Simulated duration override
    duration_secs: Option<f64>,

    /// Clip range override
    clip_range: Option<f64>,

    /// Monitor/index/clip/reception settings from a config file
    overrides: Option<SimConfig>,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64, grid_width: usize) -> Self {
        Self {
            seed,
            grid_width: grid_width.max(1),
            duration_secs: None,
            clip_range: None,
            overrides: None,
        }
    }

    /// Sets the simulated duration.
    pub fn with_duration(mut self, secs: f64) -> Self {
        self.duration_secs = Some(secs);
        self
    }

    /// Sets the clip range of the clipped runs.
    pub fn with_clip_range(mut self, range: f64) -> Self {
        self.clip_range = Some(range);
        self
    }

    /// Uses monitor, index, clip and reception settings from `config` for
    /// the clipping and random walk scenarios.
    pub fn with_config(mut self, config: SimConfig) -> Self {
        self.overrides = Some(config);
        self
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);

        let outcome = match scenario {
            ScenarioId::PositionChange => self.run_position_change(),
            ScenarioId::Clipping => self.run_clipping(),
            ScenarioId::RandomWalk => self.run_random_walk(),
        };

        outcome.unwrap_or_else(|err| {
            error!("{} aborted: {}", scenario.name(), err);
            ScenarioResult::failed(scenario, self.seed, err.to_string())
        })
    }

    fn duration(&self, scenario: ScenarioId) -> f64 {
        self.duration_secs.unwrap_or_else(|| scenario.default_duration_secs())
    }

    /// Scenario defaults, with file overrides and the clip range flag applied.
    fn configure(&self, mut config: SimConfig) -> SimConfig {
        if let Some(overrides) = &self.overrides {
            config.monitor = overrides.monitor;
            config.index = overrides.index;
            config.clip.clip_range = overrides.clip.clip_range;
            config.reception = overrides.reception;
        }
        if let Some(range) = self.clip_range {
            config.clip.clip_range = range;
        }
        config
    }

    /// CW-001: the two-node cadence check.
    fn run_position_change(&self) -> Result<ScenarioResult, SimError> {
        info!("CW-001: PositionChange - stationary vs 100 u/s mover");

        let duration = self.duration(ScenarioId::PositionChange);
        let config = SimConfig {
            seed: self.seed,
            duration_secs: duration,
            monitor: MonitorConfig::new(Duration::from_secs(4), 50.0)?,
            ..Default::default()
        };

        let mut world = SimWorld::new(config)?;
        let layout = GridLayout::default();
        let still = world.install_node(NodeMotion::stationary(layout.position(0)), true)?;
        let mover = world.install_node(
            NodeMotion::linear(layout.position(1), Velocity::new(100.0, 0.0, 0.0)),
            true,
        )?;

        let started = Instant::now();
        let stats = world.run()?;
        let elapsed = started.elapsed().as_secs_f64();

        let stop_ms = world.stop_time().as_millis() as u64;
        let mut failures = Vec::new();

        // Mover: one PositionChange every 500 ms, each 50 units past the last
        let expected: Vec<Duration> = (500..=stop_ms).step_by(500).map(Duration::from_millis).collect();
        let mover_log = world.notifications_for(mover);
        let mut previous = layout.position(1);
        for (i, n) in mover_log.iter().enumerate() {
            match n {
                Notification::PositionChange { position, time, .. } => {
                    if expected.get(i) != Some(time) {
                        failures.push(format!("mover change #{} at {:?}", i + 1, time));
                    }
                    let step = (position - previous).norm();
                    if (step - 50.0).abs() > 1e-6 {
                        failures.push(format!("mover moved {:.6} between changes", step));
                    }
                    previous = *position;
                }
                Notification::Timeout { time, .. } => failures.push(format!("mover timed out at {:?}", time)),
            }
        }
        if mover_log.len() != expected.len() {
            failures.push(format!("mover reported {} changes, expected {}", mover_log.len(), expected.len()));
        }

        // Stationary node: Timeout at every multiple of the refresh interval
        let expected: Vec<Duration> = (4000..=stop_ms).step_by(4000).map(Duration::from_millis).collect();
        let still_log = world.notifications_for(still);
        let still_times: Vec<Duration> = still_log.iter().map(|n| n.time()).collect();
        if still_log.iter().any(|n| n.kind() != NotificationKind::Timeout) {
            failures.push("stationary node reported a position change".to_string());
        }
        if still_times != expected {
            failures.push(format!("stationary timeouts at {:?}, expected {:?}", still_times, expected));
        }

        let passed = failures.is_empty();
        info!(
            "✓ PositionChange complete: {} changes, {} timeouts",
            stats.position_changes, stats.timeouts
        );

        Ok(ScenarioResult {
            scenario: ScenarioId::PositionChange,
            seed: self.seed,
            passed,
            final_time_secs: stats.time_secs,
            failure_reason: (!passed).then(|| failures.join("; ")),
            metrics: ScenarioMetrics::from_stats(&stats, elapsed),
            fidelity: None,
            receptions: world.reception_counts(),
            notifications: world.notifications(),
        })
    }

    /// CW-002: grid broadcast, clipped against unclipped.
    fn run_clipping(&self) -> Result<ScenarioResult, SimError> {
        const SPACING: f64 = 757.0;
        info!("CW-002: Clipping - {0}x{0} grid, {1} unit spacing", self.grid_width, SPACING);

        let nodes = self.grid_width * self.grid_width;
        let duration = self.duration(ScenarioId::Clipping);
        let base = self.configure(SimConfig {
            seed: self.seed,
            duration_secs: duration,
            monitor: MonitorConfig::new(Duration::from_secs(10), 1.0)?,
            index: IndexConfig::new(1070.0)?,
            clip: ClipConfig::new(1070.0, true)?,
            reception: ReceptionConfig::Range(RangeReception::new(1000.0)),
            broadcast_interval_secs: None,
            // Every node gets its single broadcast in before the stop time
            broadcast_stagger_secs: (duration / (nodes + 1) as f64).min(0.01),
        });
        let layout = GridLayout::square(SPACING, self.grid_width);

        let run = |indexing_enabled: bool| -> Result<(SimWorld, WorldStats, f64), SimError> {
            let mut config = base.clone();
            config.clip.indexing_enabled = indexing_enabled;
            let mut world = SimWorld::new(config)?;
            for position in layout.positions(nodes) {
                world.install_node(NodeMotion::stationary(position), true)?;
            }
            world.start_broadcasts()?;

            let started = Instant::now();
            let stats = world.run()?;
            Ok((world, stats, started.elapsed().as_secs_f64()))
        };

        let (clipped, clipped_stats, clipped_secs) = run(true)?;
        let (full, full_stats, full_secs) = run(false)?;
        let full_counts = full.reception_counts();
        debug!("unclipped run: {} evaluations", full_stats.reception_evaluations);

        let clipped_counts = clipped.reception_counts();
        let fidelity = FidelityReport::compare(&clipped_counts, &full_counts).with_timings(clipped_secs, full_secs);

        let mut failures = Vec::new();
        let exact = base.clip.clip_range >= clipped.reception_range();
        if exact && !fidelity.is_lossless() {
            failures.push(format!(
                "clip range {:.1} covers reception range {:.1} but {} nodes differ",
                base.clip.clip_range,
                clipped.reception_range(),
                fidelity.mismatched_nodes.len()
            ));
        }
        if !exact {
            warn!(
                "clip range {:.1} below reception range: fidelity {:.1}%",
                base.clip.clip_range,
                fidelity.fidelity_percent()
            );
        }
        if clipped.transmission_counts().iter().any(|&tx| tx != 1) {
            failures.push("not every node broadcast exactly once".to_string());
        }
        if self.overrides.is_none() && exact {
            let expected = grid_neighbour_counts(self.grid_width);
            if clipped_counts != expected {
                failures.push("reception counts differ from the 4-neighbour grid".to_string());
            }
        }

        let passed = failures.is_empty();
        info!(
            "✓ Clipping complete: fidelity {:.1}%, {:.1} candidates/tx, speedup {:.2}x",
            fidelity.fidelity_percent(),
            clipped_stats.candidates.avg_candidates(),
            fidelity.speedup.unwrap_or(0.0)
        );

        Ok(ScenarioResult {
            scenario: ScenarioId::Clipping,
            seed: self.seed,
            passed,
            final_time_secs: clipped_stats.time_secs,
            failure_reason: (!passed).then(|| failures.join("; ")),
            metrics: ScenarioMetrics::from_stats(&clipped_stats, clipped_secs),
            fidelity: Some(fidelity),
            receptions: clipped_counts,
            notifications: clipped.notifications(),
        })
    }

    /// CW-003: random walkers with periodic broadcasts and mid-run teardowns.
    fn run_random_walk(&self) -> Result<ScenarioResult, SimError> {
        info!("CW-003: RandomWalk - {} walkers", self.grid_width * self.grid_width);

        let nodes = self.grid_width * self.grid_width;
        let duration = self.duration(ScenarioId::RandomWalk);
        let walk = RandomWalk {
            min_speed: 5.0,
            max_speed: 15.0,
            course_interval: Duration::from_secs(2),
        };
        let base = self.configure(SimConfig {
            seed: self.seed,
            duration_secs: duration,
            monitor: MonitorConfig::new(Duration::from_secs(5), 10.0)?,
            index: IndexConfig::new(400.0)?,
            clip: ClipConfig::new(400.0, true)?,
            reception: ReceptionConfig::Range(RangeReception::new(300.0)),
            broadcast_interval_secs: Some(1.0),
            broadcast_stagger_secs: (1.0 / (nodes + 1) as f64).min(0.01),
        });
        base.validate()?;
        let layout = GridLayout::square(100.0, self.grid_width);
        let leave_at = base.stop_time()? / 2;
        let leavers = nodes.min(2);

        let build = |indexing_enabled: bool| -> Result<SimWorld, SimError> {
            let mut config = base.clone();
            config.clip.indexing_enabled = indexing_enabled;
            let mut world = SimWorld::new(config)?;
            for position in layout.positions(nodes) {
                world.install_node(NodeMotion::random_walk(position, walk), true)?;
            }
            for node in world.node_ids().into_iter().take(leavers) {
                world.schedule_teardown(node, leave_at)?;
            }
            world.start_broadcasts()?;
            Ok(world)
        };

        // Index may trail the truth by the threshold plus one check floor of travel
        let tolerance = base.monitor.displacement_threshold
            + walk.max_speed * base.monitor.min_check_interval.as_secs_f64()
            + 1e-6;

        let mut world = build(true)?;
        let mut failures = Vec::new();
        let mut max_lag: f64 = 0.0;
        while let Some(now) = world.step()? {
            let audit = world.audit();
            max_lag = max_lag.max(audit.max_lag);
            if audit.missing + audit.orphaned + audit.query_mismatches > 0 || audit.max_lag > tolerance {
                failures.push(format!("index audit failed at {:?}: {:?}", now, audit));
                break;
            }
        }
        let stats = world.run()?;

        for node in world.node_ids().into_iter().take(leavers) {
            if world.notifications_for(node).iter().any(|n| n.time() > leave_at) {
                failures.push(format!("node {} notified after teardown", node));
            }
            if world.index().borrow().contains(node) {
                failures.push(format!("node {} still indexed after teardown", node));
            }
        }

        // Timed runs are unaudited
        let started = Instant::now();
        let mut timed = build(true)?;
        timed.run()?;
        let clipped_secs = started.elapsed().as_secs_f64();
        if timed.reception_counts() != world.reception_counts() {
            failures.push("audited and unaudited clipped runs diverged".to_string());
        }

        let started = Instant::now();
        let mut full = build(false)?;
        full.run()?;
        let full_secs = started.elapsed().as_secs_f64();

        let receptions = world.reception_counts();
        let fidelity = FidelityReport::compare(&receptions, &full.reception_counts()).with_timings(clipped_secs, full_secs);
        let exact = base.clip.clip_range >= world.reception_range() + tolerance;
        if exact && !fidelity.is_lossless() {
            failures.push(format!(
                "clip range {:.1} covers reception range plus lag but {} nodes differ",
                base.clip.clip_range,
                fidelity.mismatched_nodes.len()
            ));
        }

        let passed = failures.is_empty();
        info!(
            "✓ RandomWalk complete: max index lag {:.3} (tolerance {:.3}), fidelity {:.1}%",
            max_lag,
            tolerance,
            fidelity.fidelity_percent()
        );

        let mut metrics = ScenarioMetrics::from_stats(&stats, clipped_secs);
        metrics.max_index_lag = max_lag;

        Ok(ScenarioResult {
            scenario: ScenarioId::RandomWalk,
            seed: self.seed,
            passed,
            final_time_secs: stats.time_secs,
            failure_reason: (!passed).then(|| failures.join("; ")),
            metrics,
            fidelity: Some(fidelity),
            receptions,
            notifications: world.notifications(),
        })
    }
}

/// Expected receptions on a square grid where only direct neighbours hear
/// each other, in row-first order.
fn grid_neighbour_counts(width: usize) -> Vec<u64> {
    let edge = |i: usize| u64::from(i == 0 || i + 1 == width);
    (0..width * width)
        .map(|i| {
            let (col, row) = (i % width, i / width);
            if width == 1 {
                0
            } else {
                4 - edge(col) - edge(row)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_neighbour_counts() {
        assert_eq!(grid_neighbour_counts(1), vec![0]);
        assert_eq!(grid_neighbour_counts(2), vec![2, 2, 2, 2]);
        assert_eq!(grid_neighbour_counts(3), vec![2, 3, 2, 3, 4, 3, 2, 3, 2]);
    }

    #[test]
    fn test_position_change_scenario_passes() {
        let result = ScenarioRunner::new(42, 1).run(ScenarioId::PositionChange);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.metrics.position_changes, 24);
        assert_eq!(result.metrics.timeouts, 3);
        assert_eq!(result.final_time_secs, 12.0);
    }

    #[test]
    fn test_position_change_scales_with_duration() {
        let result = ScenarioRunner::new(42, 1).with_duration(6.0).run(ScenarioId::PositionChange);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.metrics.position_changes, 12);
        assert_eq!(result.metrics.timeouts, 1);
    }

    #[test]
    fn test_clipping_scenario_is_lossless() {
        let result = ScenarioRunner::new(1, 6).with_duration(5.0).run(ScenarioId::Clipping);
        assert!(result.passed, "{:?}", result.failure_reason);

        let fidelity = result.fidelity.unwrap();
        assert!(fidelity.is_lossless());
        assert_eq!(fidelity.nodes, 36);
        assert_eq!(result.receptions, grid_neighbour_counts(6));
        assert!(result.metrics.candidates.pruned_fraction() > 0.5);
    }

    #[test]
    fn test_short_clip_range_loses_receptions() {
        let result = ScenarioRunner::new(1, 4)
            .with_duration(5.0)
            .with_clip_range(500.0)
            .run(ScenarioId::Clipping);

        // Allowed tradeoff, but it shows
        assert!(result.passed, "{:?}", result.failure_reason);
        let fidelity = result.fidelity.unwrap();
        assert_eq!(fidelity.nodes_matching, 0);
        assert_eq!(result.metrics.receptions, 0);
    }

    #[test]
    fn test_random_walk_scenario_passes() {
        let result = ScenarioRunner::new(7, 4).with_duration(10.0).run(ScenarioId::RandomWalk);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.metrics.max_index_lag <= 10.0 + 15.0 * 1e-3 + 1e-6);
        assert!(result.metrics.position_changes > 0);
        assert!(result.fidelity.unwrap().is_lossless());
    }

    #[test]
    fn test_bad_override_fails_cleanly() {
        let mut config = SimConfig::default();
        config.index.cell_size = -1.0;
        let result = ScenarioRunner::new(1, 2).with_config(config).run(ScenarioId::Clipping);
        assert!(!result.passed);
        assert!(result.failure_reason.unwrap().contains("cell_size"));
    }

    #[test]
    fn test_negative_duration_fails_cleanly() {
        for scenario in ScenarioId::all() {
            let result = ScenarioRunner::new(1, 2).with_duration(-1.0).run(scenario);
            assert!(!result.passed);
            assert!(result.failure_reason.unwrap().contains("duration"));
        }
    }

    #[test]
    fn test_random_walk_times_unaudited_runs() {
        let result = ScenarioRunner::new(3, 3).with_duration(4.0).run(ScenarioId::RandomWalk);
        assert!(result.passed, "{:?}", result.failure_reason);

        let fidelity = result.fidelity.unwrap();
        assert!(fidelity.speedup.is_some());
        assert_eq!(result.receptions.iter().sum::<u64>(), result.metrics.receptions);
    }
}

