//! Clipped propagation adapter.
//!
//! Sits between a transmission and the receive pipeline and narrows the
//! receivers that the (expensive) reception model is evaluated for:
//!
//! ```text
//! transmit(tx_pos) ──► ClippedPropagation ──► candidates ──► ReceptionModel (per candidate)
//!                           │      ▲
//!                           ▼      │ query_range(tx_pos, clip_range)
//!                         GridIndex
//! ```
//!
//! With indexing disabled every registered node is a candidate, which is the
//! reference behavior clipped runs are compared against.

use crate::config::{validate_clip_range, ClipConfig};
use crate::error::ClipError;
use crate::space::GridIndex;
use clipwave_env::{NodeId, Position, ReceptionModel};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Candidate-set statistics, used to make the clipping tradeoff visible.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateStats {
    /// Transmissions handled
    pub queries: u64,

    /// Candidates returned over all transmissions
    pub candidates: u64,

    /// Registered nodes over all transmissions (the unclipped candidate count)
    pub registered: u64,

    /// Index entries distance-tested over all clipped queries
    pub entries_tested: u64,
}

impl CandidateStats {
    /// Average candidate set size per transmission.
    pub fn avg_candidates(&self) -> f64 {
        if self.queries == 0 {
            0.0
        } else {
            self.candidates as f64 / self.queries as f64
        }
    }

    /// Fraction of receivers that clipping kept away from the reception
    /// model (0.0 = nothing pruned).
    pub fn pruned_fraction(&self) -> f64 {
        if self.registered == 0 {
            0.0
        } else {
            1.0 - self.candidates as f64 / self.registered as f64
        }
    }
}

/// The clipping adapter.
#[derive(Debug, Clone)]
pub struct ClippedPropagation {
    config: ClipConfig,
    stats: CandidateStats,
}

impl ClippedPropagation {
    /// Creates an adapter from a validated configuration.
    pub fn new(config: ClipConfig) -> Result<Self, ClipError> {
        config.validate()?;
        Ok(Self {
            config,
            stats: CandidateStats::default(),
        })
    }

    /// Sets the clip radius for subsequent queries.
    ///
    /// # Errors
    /// `InvalidConfiguration` for negative or NaN radii; the previous radius
    /// is kept. An infinite radius returns every indexed node.
    pub fn set_clip_range(&mut self, radius: f64) -> Result<(), ClipError> {
        validate_clip_range(radius)?;
        self.config.clip_range = radius;
        Ok(())
    }

    /// Switches between clipped (index) and full (every node) delivery.
    pub fn set_indexing_enabled(&mut self, enabled: bool) {
        self.config.indexing_enabled = enabled;
    }

    pub fn clip_range(&self) -> f64 {
        self.config.clip_range
    }

    pub fn indexing_enabled(&self) -> bool {
        self.config.indexing_enabled
    }

    pub fn config(&self) -> &ClipConfig {
        &self.config
    }

    /// Returns the nodes the reception model should be evaluated for.
    ///
    /// Read-only with respect to the index. The transmitter itself is part of
    /// the result if it is indexed; callers skip it when delivering.
    pub fn compute_receiver_candidates(&mut self, index: &GridIndex, transmitter: &Position) -> BTreeSet<NodeId> {
        let registered = index.len();

        let candidates = if self.config.indexing_enabled {
            let (hits, cost) = index.query_range_counted(transmitter, self.config.clip_range);
            self.stats.entries_tested += cost.entries_tested as u64;
            hits
        } else {
            index.node_ids()
        };

        self.stats.queries += 1;
        self.stats.candidates += candidates.len() as u64;
        self.stats.registered += registered as u64;

        debug!(
            "candidates for tx at {:?}: {}/{} (clipped={})",
            transmitter,
            candidates.len(),
            registered,
            self.config.indexing_enabled
        );

        candidates
    }

    /// Returns true if clipping at the current range can drop receptions the
    /// model would accept.
    ///
    /// Logs a warning when it does. The run still proceeds: a short clip
    /// range is an allowed tradeoff, it just must not be silent.
    pub fn check_fidelity<R: ReceptionModel + ?Sized>(&self, model: &R) -> bool {
        let lossy = self.config.indexing_enabled && self.config.clip_range < model.max_range();
        if lossy {
            warn!(
                "clip range {:.1} is below reception range {:.1}: clipped runs may drop receptions",
                self.config.clip_range,
                model.max_range()
            );
        }
        lossy
    }

    pub fn stats(&self) -> CandidateStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = CandidateStats::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexConfig;
    use clipwave_env::distance;

    struct Disk(f64);

    impl ReceptionModel for Disk {
        fn receives(&self, tx: &Position, rx: &Position) -> bool {
            distance(tx, rx) <= self.0
        }

        fn max_range(&self) -> f64 {
            self.0
        }
    }

    fn grid_index(width: u64, spacing: f64) -> GridIndex {
        let mut index = GridIndex::new(IndexConfig::new(spacing).unwrap()).unwrap();
        for i in 0..width * width {
            let pos = Position::new((i % width) as f64 * spacing, (i / width) as f64 * spacing, 0.0);
            index.insert(NodeId::from_seed(i), pos).unwrap();
        }
        index
    }

    #[test]
    fn test_set_clip_range_validation() {
        let mut adapter = ClippedPropagation::new(ClipConfig::default()).unwrap();
        adapter.set_clip_range(1070.0).unwrap();
        assert_eq!(adapter.clip_range(), 1070.0);

        assert!(matches!(adapter.set_clip_range(-0.5), Err(ClipError::InvalidConfiguration(_))));
        assert_eq!(adapter.clip_range(), 1070.0);
        assert!(adapter.set_clip_range(f64::NAN).is_err());
    }

    #[test]
    fn test_infinite_clip_range_keeps_every_node() {
        let index = grid_index(4, 757.0);
        let mut adapter = ClippedPropagation::new(ClipConfig::default()).unwrap();
        adapter.set_clip_range(f64::INFINITY).unwrap();

        let candidates = adapter.compute_receiver_candidates(&index, &Position::zeros());
        assert_eq!(candidates, index.node_ids());
        assert!(!adapter.check_fidelity(&Disk(1e9)));
    }

    #[test]
    fn test_disabled_indexing_returns_every_node() {
        let index = grid_index(4, 757.0);
        let mut adapter = ClippedPropagation::new(ClipConfig::new(1070.0, false).unwrap()).unwrap();

        let candidates = adapter.compute_receiver_candidates(&index, &Position::zeros());
        assert_eq!(candidates, index.node_ids());
        assert_eq!(adapter.stats().pruned_fraction(), 0.0);
    }

    #[test]
    fn test_clipped_candidates_are_neighbours() {
        let index = grid_index(4, 757.0);
        let mut adapter = ClippedPropagation::new(ClipConfig::new(1070.0, true).unwrap()).unwrap();

        // Corner node: itself plus two direct neighbours, diagonal is 1070.55 away
        let candidates = adapter.compute_receiver_candidates(&index, &Position::zeros());
        let expected: BTreeSet<_> = [0, 1, 4].into_iter().map(NodeId::from_seed).collect();
        assert_eq!(candidates, expected);

        let stats = adapter.stats();
        assert_eq!(stats.queries, 1);
        assert_eq!(stats.candidates, 3);
        assert_eq!(stats.registered, 16);
        assert!(stats.pruned_fraction() > 0.8);
    }

    #[test]
    fn test_clipping_never_drops_receivers_within_model_range() {
        let index = grid_index(6, 100.0);
        let model = Disk(150.0);
        let mut adapter = ClippedPropagation::new(ClipConfig::new(150.0, true).unwrap()).unwrap();
        assert!(!adapter.check_fidelity(&model));

        for tx in index.node_ids() {
            let tx_pos = index.position(tx).unwrap();
            let clipped: BTreeSet<_> = adapter
                .compute_receiver_candidates(&index, &tx_pos)
                .into_iter()
                .filter(|rx| model.receives(&tx_pos, &index.position(*rx).unwrap()))
                .collect();

            let full: BTreeSet<_> = index
                .node_ids()
                .into_iter()
                .filter(|rx| model.receives(&tx_pos, &index.position(*rx).unwrap()))
                .collect();

            assert_eq!(clipped, full);
        }
    }

    #[test]
    fn test_short_clip_range_is_flagged() {
        let adapter = ClippedPropagation::new(ClipConfig::new(50.0, true).unwrap()).unwrap();
        assert!(adapter.check_fidelity(&Disk(100.0)));

        let mut unclipped = adapter.clone();
        unclipped.set_indexing_enabled(false);
        assert!(!unclipped.check_fidelity(&Disk(100.0)));
    }
}
