//! ClipWave Fidelity Metrics
//! =========================
//!
//! Quantifies what clipping costs and what it buys by comparing a clipped run
//! against an unclipped run of the same scenario:
//! - **Fidelity**: share of nodes that received exactly as many frames
//! - **Dropped / Extra**: receptions lost or gained under clipping
//! - **Speedup**: wall-clock ratio unclipped / clipped

use serde::{Deserialize, Serialize};

/// Side-by-side comparison of per-node reception counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FidelityReport {
    /// Nodes compared
    pub nodes: usize,

    /// Nodes whose counts match exactly
    pub nodes_matching: usize,

    /// Indices of nodes whose counts differ
    pub mismatched_nodes: Vec<usize>,

    /// Receptions present unclipped but missing clipped
    pub dropped: u64,

    /// Receptions present clipped but missing unclipped
    pub extra: u64,

    /// Wall-clock speedup, if both runs were timed
    pub speedup: Option<f64>,
}

impl FidelityReport {
    /// Compares per-node reception counts.
    ///
    /// Both slices must list nodes in the same order. Extra nodes on either
    /// side are counted as mismatches.
    pub fn compare(clipped: &[u64], unclipped: &[u64]) -> Self {
        let nodes = clipped.len().max(unclipped.len());
        let mut report = FidelityReport {
            nodes,
            ..Default::default()
        };

        for i in 0..nodes {
            let with_clip = clipped.get(i).copied().unwrap_or(0);
            let without_clip = unclipped.get(i).copied().unwrap_or(0);
            let both_present = i < clipped.len() && i < unclipped.len();

            if both_present && with_clip == without_clip {
                report.nodes_matching += 1;
                continue;
            }

            report.mismatched_nodes.push(i);
            if with_clip < without_clip {
                report.dropped += without_clip - with_clip;
            } else {
                report.extra += with_clip - without_clip;
            }
        }

        report
    }

    /// Attaches wall-clock timings of both runs.
    pub fn with_timings(mut self, clipped_secs: f64, unclipped_secs: f64) -> Self {
        self.speedup = if clipped_secs > 0.0 {
            Some(unclipped_secs / clipped_secs)
        } else {
            None
        };
        self
    }

    /// Percentage of nodes with identical counts (100 when nothing compared).
    pub fn fidelity_percent(&self) -> f64 {
        if self.nodes == 0 {
            100.0
        } else {
            self.nodes_matching as f64 / self.nodes as f64 * 100.0
        }
    }

    /// True when clipping changed no reception at all.
    pub fn is_lossless(&self) -> bool {
        self.mismatched_nodes.is_empty()
    }
}
