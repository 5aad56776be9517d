//! Ground truth oracle for simulation.
//!
//! The Oracle maintains the "God's eye view" of node motion:
//! - True position and velocity of every installed node
//! - Seeded random-walk course changes
//! - Grid placement of nodes at start-up
//!
//! Motion is piecewise linear: each node keeps the position it had at its
//! last course change plus a constant velocity, so sampling at any instant
//! is exact and never depends on how often it is sampled.

use clipwave_env::{MobilityModel, NodeId, Position, SimTime, Velocity};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Uniform};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::f64::consts::TAU;
use std::time::Duration;

/// Parameters of a planar random walk.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RandomWalk {
    /// Slowest speed drawn at a course change (units/s)
    pub min_speed: f64,

    /// Fastest speed drawn at a course change (units/s)
    pub max_speed: f64,

    /// Time between course changes
    pub course_interval: Duration,
}

impl Default for RandomWalk {
    fn default() -> Self {
        Self {
            min_speed: 2.0,
            max_speed: 4.0,
            course_interval: Duration::from_secs(1),
        }
    }
}

/// Ground truth motion of one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeMotion {
    /// Position at `since`
    pub origin: Position,

    /// Start of the current linear segment
    pub since: SimTime,

    /// Velocity along the current segment
    pub velocity: Velocity,

    /// Course-change parameters for walkers
    pub walk: Option<RandomWalk>,
}

impl NodeMotion {
    /// A node that never moves.
    pub fn stationary(position: Position) -> Self {
        Self::linear(position, Velocity::zeros())
    }

    /// A node moving at a constant velocity forever.
    pub fn linear(position: Position, velocity: Velocity) -> Self {
        Self {
            origin: position,
            since: Duration::ZERO,
            velocity,
            walk: None,
        }
    }

    /// A random walker. Its first heading is drawn when the oracle adds it.
    pub fn random_walk(position: Position, walk: RandomWalk) -> Self {
        Self {
            origin: position,
            since: Duration::ZERO,
            velocity: Velocity::zeros(),
            walk: Some(walk),
        }
    }

    /// Starts a new segment at `now` with `velocity`.
    fn rebase(&mut self, now: SimTime, velocity: Velocity) {
        self.origin = self.position(now);
        self.since = now;
        self.velocity = velocity;
    }
}

impl MobilityModel for NodeMotion {
    fn position(&self, now: SimTime) -> Position {
        let elapsed = now.saturating_sub(self.since).as_secs_f64();
        self.origin + self.velocity * elapsed
    }

    fn velocity(&self, _now: SimTime) -> Option<Velocity> {
        Some(self.velocity)
    }
}

/// Row-first grid placement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridLayout {
    pub min_x: f64,
    pub min_y: f64,
    pub delta_x: f64,
    pub delta_y: f64,
    /// Nodes per row
    pub grid_width: usize,
}

impl Default for GridLayout {
    fn default() -> Self {
        Self {
            min_x: 0.0,
            min_y: 0.0,
            delta_x: 1.0,
            delta_y: 1.0,
            grid_width: 10,
        }
    }
}

impl GridLayout {
    /// Square spacing, `grid_width` nodes per row, starting at the origin.
    pub fn square(spacing: f64, grid_width: usize) -> Self {
        Self {
            delta_x: spacing,
            delta_y: spacing,
            grid_width,
            ..Default::default()
        }
    }

    /// Position of the `i`-th allocated node.
    pub fn position(&self, i: usize) -> Position {
        let width = self.grid_width.max(1);
        Position::new(
            self.min_x + (i % width) as f64 * self.delta_x,
            self.min_y + (i / width) as f64 * self.delta_y,
            0.0,
        )
    }

    /// Positions of the first `count` nodes.
    pub fn positions(&self, count: usize) -> Vec<Position> {
        (0..count).map(|i| self.position(i)).collect()
    }
}

/// The ground truth oracle.
pub struct Oracle {
    /// Seeded RNG for course changes
    rng: ChaCha8Rng,

    /// Motion of every live node
    nodes: BTreeMap<NodeId, NodeMotion>,
}

impl Oracle {
    /// Creates a new oracle with the given physics seed.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            nodes: BTreeMap::new(),
        }
    }

    /// Adds a node at time `now`. Walkers get their first heading here.
    pub fn add_node(&mut self, id: NodeId, mut motion: NodeMotion, now: SimTime) {
        motion.since = now;
        if let Some(walk) = motion.walk {
            motion.velocity = self.draw_velocity(&walk);
        }
        self.nodes.insert(id, motion);
    }

    /// Forgets a node.
    pub fn remove_node(&mut self, id: NodeId) -> Option<NodeMotion> {
        self.nodes.remove(&id)
    }

    pub fn motion(&self, id: NodeId) -> Option<&NodeMotion> {
        self.nodes.get(&id)
    }

    /// True position of `id` at `now`.
    pub fn position(&self, id: NodeId, now: SimTime) -> Option<Position> {
        self.nodes.get(&id).map(|m| m.position(now))
    }

    /// Draws a new heading and speed for a walker.
    ///
    /// Returns the new velocity, or `None` for unknown nodes and nodes that
    /// are not random walkers.
    pub fn change_course(&mut self, id: NodeId, now: SimTime) -> Option<Velocity> {
        let walk = self.nodes.get(&id)?.walk?;
        let velocity = self.draw_velocity(&walk);
        let motion = self.nodes.get_mut(&id)?;
        motion.rebase(now, velocity);
        Some(velocity)
    }

    /// True positions of all nodes at `now`, ordered by id.
    pub fn ground_truth_positions(&self, now: SimTime) -> Vec<(NodeId, Position)> {
        self.nodes.iter().map(|(id, m)| (*id, m.position(now))).collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn draw_velocity(&mut self, walk: &RandomWalk) -> Velocity {
        let heading = Uniform::new(0.0, TAU).sample(&mut self.rng);
        let speed = if walk.max_speed > walk.min_speed {
            Uniform::new_inclusive(walk.min_speed, walk.max_speed).sample(&mut self.rng)
        } else {
            walk.min_speed
        };
        Velocity::new(speed * heading.cos(), speed * heading.sin(), 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_linear_motion_is_exact() {
        let motion = NodeMotion::linear(Position::new(1.0, 0.0, 0.0), Velocity::new(100.0, 0.0, 0.0));
        assert_eq!(motion.position(Duration::from_millis(500)), Position::new(51.0, 0.0, 0.0));
        assert_eq!(motion.position(Duration::from_secs(12)), Position::new(1201.0, 0.0, 0.0));
        assert_eq!(motion.velocity(Duration::ZERO), Some(Velocity::new(100.0, 0.0, 0.0)));
    }

    #[test]
    fn test_grid_layout_row_first() {
        let layout = GridLayout::square(757.0, 4);
        assert_eq!(layout.position(0), Position::new(0.0, 0.0, 0.0));
        assert_eq!(layout.position(3), Position::new(2271.0, 0.0, 0.0));
        assert_eq!(layout.position(4), Position::new(0.0, 757.0, 0.0));
        assert_eq!(layout.positions(16).len(), 16);
    }

    #[test]
    fn test_course_change_keeps_position_continuous() {
        let mut oracle = Oracle::new(7);
        let id = NodeId::from_seed(1);
        oracle.add_node(id, NodeMotion::random_walk(Position::zeros(), RandomWalk::default()), Duration::ZERO);

        let at = Duration::from_secs(1);
        let before = oracle.position(id, at).unwrap();
        let velocity = oracle.change_course(id, at).unwrap();
        let after = oracle.position(id, at).unwrap();

        assert_relative_eq!(before, after, epsilon = 1e-12);
        let speed = velocity.norm();
        assert!((2.0..=4.0 + 1e-12).contains(&speed), "speed {speed}");
        assert_eq!(velocity.z, 0.0);
    }

    #[test]
    fn test_walks_are_deterministic_per_seed() {
        let run = |seed| {
            let mut oracle = Oracle::new(seed);
            let id = NodeId::from_seed(0);
            oracle.add_node(id, NodeMotion::random_walk(Position::zeros(), RandomWalk::default()), Duration::ZERO);
            for s in 1..=10 {
                oracle.change_course(id, Duration::from_secs(s));
            }
            oracle.position(id, Duration::from_secs(11)).unwrap()
        };

        assert_eq!(run(42), run(42));
        assert_ne!(run(42), run(43));
    }

    #[test]
    fn test_stationary_nodes_ignore_course_changes() {
        let mut oracle = Oracle::new(1);
        let id = NodeId::from_seed(3);
        oracle.add_node(id, NodeMotion::stationary(Position::new(5.0, 5.0, 0.0)), Duration::ZERO);

        assert!(oracle.change_course(id, Duration::from_secs(1)).is_none());
        assert!(oracle.change_course(NodeId::from_seed(99), Duration::from_secs(1)).is_none());
        assert_eq!(oracle.ground_truth_positions(Duration::from_secs(9)), vec![(id, Position::new(5.0, 5.0, 0.0))]);

        assert!(oracle.remove_node(id).is_some());
        assert!(oracle.is_empty());
    }
}
