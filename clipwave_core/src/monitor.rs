//! The "TIME" Engine - Per-Node Movement Monitoring
//!
//! Each monitored node owns a `MovementMonitor` that keeps the node's entry
//! in the spatial index fresh without polling on every simulated event:
//! - A **PositionChange** fires once the node has moved at least the
//!   displacement threshold away from its last recorded position
//! - A **Timeout** fires once the refresh interval elapses without one
//!
//! The monitor predicts the next instant one of those can happen and arms a
//! single kernel timer for it. With a known velocity the threshold crossing
//! time has a closed form, so constant-velocity nodes are checked exactly when
//! they cross, not on a fixed tick.
//!
//! # State machine
//!
//! ```text
//!            initialize             evaluate / course_changed
//!   Idle ─────────────────► Armed ◄──────────────────────────┐
//!    ▲                        │  └──────────────────────────────┘
//!    └──── cancel/teardown ───┘
//! ```

use crate::config::{ConsistencyPolicy, MonitorConfig};
use crate::error::ClipError;
use crate::notification::Notification;
use crate::space::SharedIndex;
use clipwave_env::{distance, MobilityModel, NodeId, Position, Scheduler, SimTime, TimerHandle, Velocity};
use std::time::Duration;
use tracing::{debug, error, warn};

/// Distances this close to the threshold count as reaching it. Absorbs the
/// rounding of `origin + v * t` at a predicted crossing instant.
pub const DISPLACEMENT_TOLERANCE: f64 = 1e-9;

/// Timer payload a monitor schedules on the kernel.
///
/// The host routes it back to the monitor of `node` together with the
/// handle the kernel fired it under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MonitorCheck {
    pub node: NodeId,
}

/// Lifecycle phase of a monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorPhase {
    /// A check is pending on the kernel
    Armed { handle: TimerHandle, due: SimTime },
    /// No check pending (before initialize, or after teardown)
    Idle,
}

/// Per-monitor activity counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonitorCounters {
    pub position_changes: u64,
    pub timeouts: u64,
    pub course_changes: u64,
    /// Checks that fired under a handle the monitor no longer held
    pub stale_checks: u64,
    /// Checks that found neither condition (motion diverged from prediction)
    pub rearms: u64,
}

/// Staleness detector for one node.
#[derive(Debug)]
pub struct MovementMonitor {
    /// Node being monitored
    node: NodeId,

    /// Threshold, refresh interval, floor and policy
    config: MonitorConfig,

    /// Index this monitor writes the node's position into
    index: SharedIndex,

    /// Position recorded at the last PositionChange (or initialize)
    last_position: Position,

    /// Time of the last notification (or initialize)
    last_update_time: SimTime,

    phase: MonitorPhase,

    counters: MonitorCounters,
}

impl MovementMonitor {
    /// Creates an idle monitor.
    ///
    /// # Arguments
    /// * `node` - The node to monitor
    /// * `config` - Validated monitor configuration
    /// * `index` - The shared spatial index this monitor keeps current
    pub fn new(node: NodeId, config: MonitorConfig, index: SharedIndex) -> Result<Self, ClipError> {
        config.validate()?;
        Ok(Self {
            node,
            config,
            index,
            last_position: Position::zeros(),
            last_update_time: Duration::ZERO,
            phase: MonitorPhase::Idle,
            counters: MonitorCounters::default(),
        })
    }

    /// Records the starting position, indexes the node and arms the first check.
    ///
    /// The first check is due at `now + refresh_interval`, or earlier when
    /// `velocity` predicts a threshold crossing before then. Re-initializing
    /// an armed monitor cancels its pending check and updates the existing
    /// index entry instead of inserting a second one.
    ///
    /// # Errors
    /// `DuplicateInsert` if another component already indexed this node.
    pub fn initialize<S, E>(
        &mut self,
        sched: &mut S,
        position: Position,
        velocity: Option<Velocity>,
    ) -> Result<(), ClipError>
    where
        S: Scheduler<E> + ?Sized,
        E: From<MonitorCheck>,
    {
        let now = sched.now();
        let reinit = self.cancel::<S, E>(sched);

        if reinit {
            self.sync_index(position)?;
        } else {
            self.index.borrow_mut().insert(self.node, position)?;
        }

        self.last_position = position;
        self.last_update_time = now;
        self.arm::<S, E>(sched, &position, velocity)?;

        debug!("[{}] monitor initialized at {:?} (pos={:?})", self.node, now, position);
        Ok(())
    }

    /// Samples the mobility model and evaluates a fired check.
    pub fn check<S, E, M>(
        &mut self,
        sched: &mut S,
        fired: TimerHandle,
        mobility: &M,
    ) -> Result<Option<Notification>, ClipError>
    where
        S: Scheduler<E> + ?Sized,
        E: From<MonitorCheck>,
        M: MobilityModel + ?Sized,
    {
        let now = sched.now();
        self.evaluate::<S, E>(sched, fired, mobility.position(now), mobility.velocity(now))
    }

    /// Handles a check the kernel fired under `fired`.
    ///
    /// Displacement is tested before the refresh deadline, so a node that
    /// reaches the threshold exactly when its timeout is due reports a
    /// PositionChange. A check that fires against a handle this monitor no
    /// longer holds (cancelled, replaced, or torn down) is ignored.
    ///
    /// # Returns
    /// * `Ok(Some(n))` - Exactly one notification for this check
    /// * `Ok(None)` - Stale check, or motion diverged from the prediction
    ///   and the monitor simply re-armed
    pub fn evaluate<S, E>(
        &mut self,
        sched: &mut S,
        fired: TimerHandle,
        position: Position,
        velocity: Option<Velocity>,
    ) -> Result<Option<Notification>, ClipError>
    where
        S: Scheduler<E> + ?Sized,
        E: From<MonitorCheck>,
    {
        match self.phase {
            MonitorPhase::Armed { handle, .. } if handle == fired => {}
            _ => {
                self.counters.stale_checks += 1;
                debug!("[{}] ignoring stale check {}", self.node, fired);
                return Ok(None);
            }
        }
        // The fired timer is spent; arm() must not try to cancel it
        self.phase = MonitorPhase::Idle;

        let now = sched.now();
        let notification = if self.displacement_reached(&position) {
            Some(self.record_position_change(position, now)?)
        } else if now.saturating_sub(self.last_update_time) >= self.config.refresh_interval {
            Some(self.record_timeout(now)?)
        } else {
            self.counters.rearms += 1;
            debug!("[{}] check at {:?} found nothing to report, re-arming", self.node, now);
            None
        };

        self.arm::<S, E>(sched, &position, velocity)?;
        Ok(notification)
    }

    /// Eager hook for hosts that report velocity changes.
    ///
    /// Reports a PositionChange if the threshold has already been reached,
    /// never a Timeout, and always re-predicts the next check from the new
    /// velocity.
    pub fn course_changed<S, E>(
        &mut self,
        sched: &mut S,
        position: Position,
        velocity: Option<Velocity>,
    ) -> Result<Option<Notification>, ClipError>
    where
        S: Scheduler<E> + ?Sized,
        E: From<MonitorCheck>,
    {
        if self.phase == MonitorPhase::Idle {
            return Ok(None);
        }
        self.counters.course_changes += 1;

        let now = sched.now();
        let notification = if self.displacement_reached(&position) {
            Some(self.record_position_change(position, now)?)
        } else {
            None
        };

        self.arm::<S, E>(sched, &position, velocity)?;
        Ok(notification)
    }

    /// Cancels the pending check, leaving the monitor idle.
    ///
    /// Returns true if a check was pending.
    pub fn cancel<S, E>(&mut self, sched: &mut S) -> bool
    where
        S: Scheduler<E> + ?Sized,
    {
        match std::mem::replace(&mut self.phase, MonitorPhase::Idle) {
            MonitorPhase::Armed { handle, .. } => {
                sched.cancel(handle);
                true
            }
            MonitorPhase::Idle => false,
        }
    }

    /// Cancels the pending check and removes the node from the index.
    ///
    /// After this returns no check of this monitor can produce a notification
    /// and no query can observe the node.
    pub fn teardown<S, E>(&mut self, sched: &mut S) -> Result<(), ClipError>
    where
        S: Scheduler<E> + ?Sized,
    {
        self.cancel::<S, E>(sched);
        let removed = self.index.borrow_mut().remove(self.node);
        match removed {
            Ok(_) => {
                debug!("[{}] monitor torn down", self.node);
                Ok(())
            }
            Err(err) => self.consistency_fault(err),
        }
    }

    fn displacement_reached(&self, position: &Position) -> bool {
        let d = distance(&self.last_position, position);
        let threshold = self.config.displacement_threshold;
        if threshold == 0.0 {
            d > 0.0
        } else {
            d >= threshold - DISPLACEMENT_TOLERANCE * threshold.max(1.0)
        }
    }

    fn record_position_change(&mut self, position: Position, now: SimTime) -> Result<Notification, ClipError> {
        self.sync_index(position)?;
        self.last_position = position;
        self.last_update_time = now;
        self.counters.position_changes += 1;
        debug!("[{}] position change at {:?} -> {:?}", self.node, now, position);
        Ok(Notification::PositionChange {
            node: self.node,
            position,
            time: now,
        })
    }

    fn record_timeout(&mut self, now: SimTime) -> Result<Notification, ClipError> {
        // The entry keeps the recorded position; only its presence is confirmed
        if !self.index.borrow().contains(self.node) {
            self.consistency_fault(ClipError::NotFound(self.node))?;
        }
        self.last_update_time = now;
        self.counters.timeouts += 1;
        debug!("[{}] timeout at {:?}", self.node, now);
        Ok(Notification::Timeout { node: self.node, time: now })
    }

    fn sync_index(&self, position: Position) -> Result<(), ClipError> {
        let updated = self.index.borrow_mut().update(self.node, position);
        match updated {
            Ok(_) => Ok(()),
            Err(err) => self.consistency_fault(err),
        }
    }

    fn consistency_fault(&self, err: ClipError) -> Result<(), ClipError> {
        match self.config.consistency {
            ConsistencyPolicy::Strict => {
                error!("[{}] index out of sync with monitor: {}", self.node, err);
                Err(err)
            }
            ConsistencyPolicy::Lenient => {
                warn!("[{}] index out of sync with monitor: {} (continuing)", self.node, err);
                Ok(())
            }
        }
    }

    /// Arms the next check, cancelling whatever was pending first.
    fn arm<S, E>(&mut self, sched: &mut S, position: &Position, velocity: Option<Velocity>) -> Result<(), ClipError>
    where
        S: Scheduler<E> + ?Sized,
        E: From<MonitorCheck>,
    {
        self.cancel::<S, E>(sched);

        let now = sched.now();
        let due = self.next_check_due(now, position, velocity);
        let handle = sched.schedule_at(due, MonitorCheck { node: self.node }.into())?;
        self.phase = MonitorPhase::Armed { handle, due };
        Ok(())
    }

    /// Earliest of the refresh deadline and the predicted threshold crossing.
    fn next_check_due(&self, now: SimTime, position: &Position, velocity: Option<Velocity>) -> SimTime {
        let deadline = self.last_update_time + self.config.refresh_interval;

        let crossing = velocity.and_then(|v| {
            let offset = position - self.last_position;
            time_to_threshold(&offset, &v, self.config.displacement_threshold)
        });

        let due = match crossing {
            Some(secs) => {
                let delay = ceil_duration(secs).max(self.config.min_check_interval);
                deadline.min(now.saturating_add(delay))
            }
            None => deadline,
        };

        due.max(now)
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn phase(&self) -> MonitorPhase {
        self.phase
    }

    pub fn is_armed(&self) -> bool {
        matches!(self.phase, MonitorPhase::Armed { .. })
    }

    /// Time the pending check is due, if armed.
    pub fn next_due(&self) -> Option<SimTime> {
        match self.phase {
            MonitorPhase::Armed { due, .. } => Some(due),
            MonitorPhase::Idle => None,
        }
    }

    pub fn last_position(&self) -> Position {
        self.last_position
    }

    pub fn last_update_time(&self) -> SimTime {
        self.last_update_time
    }

    pub fn counters(&self) -> MonitorCounters {
        self.counters
    }
}

/// Smallest `t >= 0` (seconds) with `|offset + velocity * t| >= threshold`.
///
/// `offset` is the current displacement from the recorded position. Returns
/// `None` for a node that is not moving. A zero threshold, or an offset
/// already at the threshold, yields `Some(0.0)`.
pub fn time_to_threshold(offset: &Velocity, velocity: &Velocity, threshold: f64) -> Option<f64> {
    let a = velocity.dot(velocity);
    if a == 0.0 || !a.is_finite() {
        return None;
    }

    let c = offset.dot(offset) - threshold * threshold;
    if threshold == 0.0 || c >= 0.0 {
        return Some(0.0);
    }

    // a*t^2 + b*t + c = 0 with c < 0 has exactly one positive root
    let b = 2.0 * offset.dot(velocity);
    let sqrt_disc = (b * b - 4.0 * a * c).sqrt();
    let t = if b >= 0.0 {
        (2.0 * c) / (-b - sqrt_disc)
    } else {
        (-b + sqrt_disc) / (2.0 * a)
    };

    Some(t.max(0.0))
}

/// Converts seconds to a Duration, rounding up to the next nanosecond.
fn ceil_duration(secs: f64) -> Duration {
    let nanos = (secs * 1e9).ceil();
    if nanos >= u64::MAX as f64 {
        Duration::from_nanos(u64::MAX)
    } else {
        Duration::from_nanos(nanos as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexConfig;
    use crate::notification::NotificationKind;
    use crate::space::GridIndex;
    use approx::assert_relative_eq;
    use clipwave_env::EnvError;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    /// Minimal kernel: ordered map keyed by (time, sequence).
    #[derive(Default)]
    struct TestKernel {
        now: SimTime,
        seq: u64,
        pending: BTreeMap<(SimTime, u64), MonitorCheck>,
    }

    impl TestKernel {
        fn pop(&mut self) -> Option<(TimerHandle, MonitorCheck)> {
            let ((at, seq), check) = self.pending.pop_first()?;
            self.now = at;
            Some((TimerHandle(seq), check))
        }

        fn pending_count(&self) -> usize {
            self.pending.len()
        }
    }

    impl Scheduler<MonitorCheck> for TestKernel {
        fn now(&self) -> SimTime {
            self.now
        }

        fn schedule_at(&mut self, at: SimTime, event: MonitorCheck) -> Result<TimerHandle, EnvError> {
            if at < self.now {
                return Err(EnvError::in_past(at, self.now));
            }
            self.seq += 1;
            self.pending.insert((at, self.seq), event);
            Ok(TimerHandle(self.seq))
        }

        fn cancel(&mut self, handle: TimerHandle) -> bool {
            let key = self.pending.keys().find(|(_, seq)| *seq == handle.0).copied();
            key.and_then(|k| self.pending.remove(&k)).is_some()
        }
    }

    /// Constant velocity from an origin at t = 0.
    struct Linear {
        origin: Position,
        velocity: Velocity,
    }

    impl MobilityModel for Linear {
        fn position(&self, now: SimTime) -> Position {
            self.origin + self.velocity * now.as_secs_f64()
        }

        fn velocity(&self, _now: SimTime) -> Option<Velocity> {
            Some(self.velocity)
        }
    }

    fn setup(threshold: f64, refresh_secs: u64) -> (TestKernel, SharedIndex, MovementMonitor) {
        let index = GridIndex::shared(IndexConfig::new(100.0).unwrap()).unwrap();
        let config = MonitorConfig::new(Duration::from_secs(refresh_secs), threshold)
            .unwrap()
            .with_consistency(ConsistencyPolicy::Strict);
        let monitor = MovementMonitor::new(NodeId::from_seed(1), config, index.clone()).unwrap();
        (TestKernel::default(), index, monitor)
    }

    fn run(
        kernel: &mut TestKernel,
        monitor: &mut MovementMonitor,
        model: &Linear,
        stop: SimTime,
    ) -> Vec<Notification> {
        let mut out = Vec::new();
        while let Some((handle, _)) = kernel.pop() {
            if kernel.now > stop {
                break;
            }
            let n = monitor.check(kernel, handle, model).unwrap();
            out.push(n.expect("scheduled check must notify"));
        }
        out
    }

    #[test]
    fn test_timeout_cadence_for_stationary_node() {
        let (mut kernel, _, mut monitor) = setup(50.0, 4);
        let model = Linear { origin: Position::zeros(), velocity: Velocity::zeros() };
        monitor.initialize(&mut kernel, model.position(Duration::ZERO), model.velocity(Duration::ZERO)).unwrap();

        let notes = run(&mut kernel, &mut monitor, &model, Duration::from_secs(12));
        let times: Vec<_> = notes.iter().map(|n| n.time()).collect();
        assert_eq!(times, vec![Duration::from_secs(4), Duration::from_secs(8), Duration::from_secs(12)]);
        assert!(notes.iter().all(|n| n.kind() == NotificationKind::Timeout));
    }

    #[test]
    fn test_displacement_trigger_every_half_second() {
        let (mut kernel, index, mut monitor) = setup(50.0, 4);
        let model = Linear { origin: Position::zeros(), velocity: Velocity::new(100.0, 0.0, 0.0) };
        monitor.initialize(&mut kernel, model.position(Duration::ZERO), model.velocity(Duration::ZERO)).unwrap();

        let notes = run(&mut kernel, &mut monitor, &model, Duration::from_secs(12));
        assert_eq!(notes.len(), 24);

        let mut last = Position::zeros();
        for (i, n) in notes.iter().enumerate() {
            match n {
                Notification::PositionChange { position, time, .. } => {
                    assert_eq!(*time, Duration::from_millis(500 * (i as u64 + 1)));
                    assert_relative_eq!(distance(&last, position), 50.0, epsilon = 1e-9);
                    last = *position;
                }
                other => panic!("unexpected {:?}", other),
            }
        }
        assert_eq!(index.borrow().position(monitor.node()), Some(last));
    }

    #[test]
    fn test_slow_node_times_out_until_threshold_reached() {
        // 1 u/s, threshold 10, refresh 4s: timeouts at 4, 8, change at 10, ...
        let (mut kernel, _, mut monitor) = setup(10.0, 4);
        let model = Linear { origin: Position::zeros(), velocity: Velocity::new(0.0, 1.0, 0.0) };
        monitor.initialize(&mut kernel, Position::zeros(), model.velocity(Duration::ZERO)).unwrap();

        let notes = run(&mut kernel, &mut monitor, &model, Duration::from_secs(20));
        let summary: Vec<_> = notes.iter().map(|n| (n.kind(), n.time().as_secs())).collect();
        assert_eq!(
            summary,
            vec![
                (NotificationKind::Timeout, 4),
                (NotificationKind::Timeout, 8),
                (NotificationKind::PositionChange, 10),
                (NotificationKind::Timeout, 14),
                (NotificationKind::Timeout, 18),
                (NotificationKind::PositionChange, 20),
            ]
        );
    }

    #[test]
    fn test_at_most_one_pending_check() {
        let (mut kernel, _, mut monitor) = setup(50.0, 4);
        monitor.initialize(&mut kernel, Position::zeros(), None).unwrap();
        monitor
            .course_changed(&mut kernel, Position::new(10.0, 0.0, 0.0), Some(Velocity::new(5.0, 0.0, 0.0)))
            .unwrap();
        monitor.course_changed(&mut kernel, Position::new(12.0, 0.0, 0.0), None).unwrap();
        assert_eq!(kernel.pending_count(), 1);

        // Re-initializing replaces the pending check and updates in place
        monitor.initialize(&mut kernel, Position::new(500.0, 0.0, 0.0), None).unwrap();
        assert_eq!(kernel.pending_count(), 1);
    }

    #[test]
    fn test_course_change_reports_crossing_and_repredicts() {
        let (mut kernel, _, mut monitor) = setup(50.0, 4);
        monitor.initialize(&mut kernel, Position::zeros(), Some(Velocity::zeros())).unwrap();
        assert_eq!(monitor.next_due(), Some(Duration::from_secs(4)));

        kernel.now = Duration::from_secs(1);
        let n = monitor
            .course_changed(&mut kernel, Position::new(20.0, 0.0, 0.0), Some(Velocity::new(10.0, 0.0, 0.0)))
            .unwrap();
        assert!(n.is_none());
        // 30 more units at 10 u/s lands exactly on the 4s deadline
        assert_eq!(monitor.next_due(), Some(Duration::from_secs(4)));

        let n = monitor
            .course_changed(&mut kernel, Position::new(60.0, 0.0, 0.0), Some(Velocity::zeros()))
            .unwrap();
        assert!(matches!(n, Some(Notification::PositionChange { .. })));
        assert_eq!(monitor.next_due(), Some(Duration::from_secs(5)));
        assert_eq!(monitor.counters().course_changes, 2);
    }

    #[test]
    fn test_teardown_suppresses_pending_check() {
        let (mut kernel, index, mut monitor) = setup(50.0, 4);
        monitor.initialize(&mut kernel, Position::zeros(), None).unwrap();
        let handle = match monitor.phase() {
            MonitorPhase::Armed { handle, .. } => handle,
            MonitorPhase::Idle => panic!("monitor should be armed"),
        };

        monitor.teardown(&mut kernel).unwrap();
        assert_eq!(monitor.phase(), MonitorPhase::Idle);
        assert_eq!(kernel.pending_count(), 0);
        assert!(!index.borrow().contains(monitor.node()));

        // A check that slipped through anyway is ignored
        kernel.now = Duration::from_secs(4);
        let n = monitor.evaluate(&mut kernel, handle, Position::new(99.0, 0.0, 0.0), None).unwrap();
        assert!(n.is_none());
        assert_eq!(kernel.pending_count(), 0);
        assert_eq!(monitor.counters().stale_checks, 1);
    }

    #[test]
    fn test_missing_index_entry_strict_vs_lenient() {
        let (mut kernel, index, mut monitor) = setup(50.0, 4);
        monitor.initialize(&mut kernel, Position::zeros(), None).unwrap();
        index.borrow_mut().remove(monitor.node()).unwrap();

        let (handle, _) = kernel.pop().unwrap();
        let err = monitor.evaluate(&mut kernel, handle, Position::new(80.0, 0.0, 0.0), None).unwrap_err();
        assert_eq!(err, ClipError::NotFound(monitor.node()));

        let config = monitor.config().with_consistency(ConsistencyPolicy::Lenient);
        let mut lenient = MovementMonitor::new(NodeId::from_seed(2), config, index.clone()).unwrap();
        lenient.initialize(&mut kernel, Position::zeros(), None).unwrap();
        index.borrow_mut().remove(lenient.node()).unwrap();
        let (handle, _) = kernel.pop().unwrap();
        let n = lenient.evaluate(&mut kernel, handle, Position::new(80.0, 0.0, 0.0), None).unwrap();
        assert!(matches!(n, Some(Notification::PositionChange { .. })));
    }

    #[test]
    fn test_duplicate_initialize_across_monitors_fails() {
        let (mut kernel, index, mut monitor) = setup(50.0, 4);
        monitor.initialize(&mut kernel, Position::zeros(), None).unwrap();

        let mut twin = MovementMonitor::new(monitor.node(), *monitor.config(), index).unwrap();
        let err = twin.initialize(&mut kernel, Position::zeros(), None).unwrap_err();
        assert_eq!(err, ClipError::DuplicateInsert(monitor.node()));
    }

    #[test]
    fn test_zero_threshold_means_any_movement() {
        let (mut kernel, _, mut monitor) = setup(0.0, 4);
        let still = Linear { origin: Position::zeros(), velocity: Velocity::zeros() };
        monitor.initialize(&mut kernel, Position::zeros(), still.velocity(Duration::ZERO)).unwrap();
        let (handle, _) = kernel.pop().unwrap();
        let n = monitor.check(&mut kernel, handle, &still).unwrap();
        assert!(matches!(n, Some(Notification::Timeout { .. })));

        // A moving node is polled at the floor interval and always reports
        let mover = Linear { origin: Position::zeros(), velocity: Velocity::new(1.0, 0.0, 0.0) };
        let now = kernel.now;
        monitor.course_changed(&mut kernel, mover.position(now), mover.velocity(now)).unwrap();
        assert_eq!(monitor.next_due(), Some(kernel.now + monitor.config().min_check_interval));
    }

    #[test]
    fn test_time_to_threshold_closed_form() {
        let v = Velocity::new(100.0, 0.0, 0.0);
        assert_eq!(time_to_threshold(&Velocity::zeros(), &v, 50.0), Some(0.5));
        assert_eq!(time_to_threshold(&Velocity::zeros(), &Velocity::zeros(), 50.0), None);
        assert_eq!(time_to_threshold(&Velocity::new(60.0, 0.0, 0.0), &v, 50.0), Some(0.0));

        // Moving back through the origin: 30 units behind, heading forward
        let t = time_to_threshold(&Velocity::new(-30.0, 0.0, 0.0), &Velocity::new(10.0, 0.0, 0.0), 50.0).unwrap();
        assert_relative_eq!(t, 8.0, epsilon = 1e-12);

        // Perpendicular motion: sqrt(50^2 - 30^2) = 40 units at 20 u/s
        let t = time_to_threshold(&Velocity::new(30.0, 0.0, 0.0), &Velocity::new(0.0, 20.0, 0.0), 50.0).unwrap();
        assert_relative_eq!(t, 2.0, epsilon = 1e-12);
    }

    proptest! {
        #[test]
        fn prop_every_scheduled_check_notifies_exactly_once(
            vx in -200.0..200.0f64,
            vy in -200.0..200.0f64,
            threshold in 1.0..500.0f64,
            refresh in 1u64..10,
        ) {
            let (mut kernel, _, mut monitor) = setup(threshold, refresh);
            let model = Linear { origin: Position::new(5.0, -5.0, 0.0), velocity: Velocity::new(vx, vy, 0.0) };
            monitor.initialize(&mut kernel, model.position(Duration::ZERO), model.velocity(Duration::ZERO)).unwrap();

            let stop = Duration::from_secs(30);
            let mut last = model.position(Duration::ZERO);
            let mut last_time = Duration::ZERO;
            while let Some((handle, _)) = kernel.pop() {
                if kernel.now > stop {
                    break;
                }
                let n = monitor.check(&mut kernel, handle, &model).unwrap();
                prop_assert!(n.is_some());
                prop_assert_eq!(kernel.pending_count(), 1);
                match n.unwrap() {
                    Notification::PositionChange { position, time, .. } => {
                        // Fires no later than 1ns after the crossing
                        prop_assert!(distance(&last, &position) >= threshold - 1e-6);
                        prop_assert!(time - last_time <= Duration::from_secs(refresh));
                        last = position;
                        last_time = time;
                    }
                    Notification::Timeout { time, .. } => {
                        prop_assert_eq!(time - last_time, Duration::from_secs(refresh));
                        last_time = time;
                    }
                }
            }
        }
    }
}
