//! The "SPACE" Engine - Uniform Grid Spatial Index
//!
//! Buckets node positions into axis-aligned cubic cells so that a range
//! query only inspects the handful of cells its bounding box overlaps:
//! - Cell key = `floor(coord / cell_size)` per axis
//! - Each cell holds the ordered set of nodes currently inside it
//! - Empty cells are dropped, so memory follows the node count
//!
//! The index is a pure acceleration structure. `query_range` returns exactly
//! the set a linear scan over every entry would return.

use crate::config::IndexConfig;
use crate::error::ClipError;
use clipwave_env::{distance, NodeId, Position};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

/// The one index instance shared by every monitor (writers) and the
/// clipping adapter (reader) in a single-threaded simulation.
pub type SharedIndex = Rc<RefCell<GridIndex>>;

/// Relative padding applied to query boxes so that rounding in `c ± r` can
/// never exclude a cell holding an in-range node.
const QUERY_BOX_PADDING: f64 = 1e-9;

/// Integer coordinates of a grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CellKey {
    pub x: i64,
    pub y: i64,
    pub z: i64,
}

impl CellKey {
    pub fn new(x: i64, y: i64, z: i64) -> Self {
        Self { x, y, z }
    }

    /// Quantizes a position into its cell. Out-of-range coordinates saturate.
    pub fn containing(position: &Position, cell_size: f64) -> Self {
        Self {
            x: (position.x / cell_size).floor() as i64,
            y: (position.y / cell_size).floor() as i64,
            z: (position.z / cell_size).floor() as i64,
        }
    }

    fn within(&self, lo: &CellKey, hi: &CellKey) -> bool {
        (lo.x..=hi.x).contains(&self.x)
            && (lo.y..=hi.y).contains(&self.y)
            && (lo.z..=hi.z).contains(&self.z)
    }
}

/// The indexed state of one node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Last position reported by the node's monitor
    pub position: Position,

    /// Cell the node is currently bucketed in
    pub cell: CellKey,
}

/// Work done by a single range query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryCost {
    /// Non-empty partitions whose members were distance-tested
    pub partitions_examined: usize,

    /// Entries distance-tested
    pub entries_tested: usize,
}

/// Uniform grid index over node positions.
#[derive(Debug, Clone)]
pub struct GridIndex {
    /// Edge length of a cell
    cell_size: f64,

    /// Partition map: cell -> nodes inside it (never empty)
    cells: HashMap<CellKey, BTreeSet<NodeId>>,

    /// Entry map: node -> position and cell
    entries: HashMap<NodeId, IndexEntry>,
}

impl GridIndex {
    /// Creates an empty index.
    ///
    /// # Arguments
    /// * `config` - Validated index configuration (cell size)
    pub fn new(config: IndexConfig) -> Result<Self, ClipError> {
        config.validate()?;
        Ok(Self {
            cell_size: config.cell_size,
            cells: HashMap::new(),
            entries: HashMap::new(),
        })
    }

    /// Creates an index wrapped for sharing between monitors and the adapter.
    pub fn shared(config: IndexConfig) -> Result<SharedIndex, ClipError> {
        Ok(Rc::new(RefCell::new(Self::new(config)?)))
    }

    /// Returns the cell edge length.
    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    /// Adds a node.
    ///
    /// # Errors
    /// `DuplicateInsert` if the node is already indexed.
    pub fn insert(&mut self, node: NodeId, position: Position) -> Result<CellKey, ClipError> {
        if self.entries.contains_key(&node) {
            return Err(ClipError::DuplicateInsert(node));
        }

        let cell = CellKey::containing(&position, self.cell_size);
        self.cells.entry(cell).or_default().insert(node);
        self.entries.insert(node, IndexEntry { position, cell });

        Ok(cell)
    }

    /// Moves a node to `position`.
    ///
    /// The stored position is always refreshed; partitions only change when
    /// the node crossed into another cell.
    ///
    /// # Errors
    /// `NotFound` if the node was never inserted (or was removed).
    pub fn update(&mut self, node: NodeId, position: Position) -> Result<CellKey, ClipError> {
        let cell = CellKey::containing(&position, self.cell_size);
        let entry = self.entries.get_mut(&node).ok_or(ClipError::NotFound(node))?;
        let old_cell = entry.cell;

        entry.position = position;
        entry.cell = cell;

        if old_cell != cell {
            Self::detach(&mut self.cells, old_cell, node);
            self.cells.entry(cell).or_default().insert(node);
        }

        Ok(cell)
    }

    /// Deletes a node's entry.
    ///
    /// # Errors
    /// `NotFound` if the node is not indexed.
    pub fn remove(&mut self, node: NodeId) -> Result<IndexEntry, ClipError> {
        let entry = self.entries.remove(&node).ok_or(ClipError::NotFound(node))?;
        Self::detach(&mut self.cells, entry.cell, node);
        Ok(entry)
    }

    fn detach(cells: &mut HashMap<CellKey, BTreeSet<NodeId>>, cell: CellKey, node: NodeId) {
        if let Some(members) = cells.get_mut(&cell) {
            members.remove(&node);
            if members.is_empty() {
                cells.remove(&cell);
            }
        }
    }

    /// Returns every node within `radius` of `center` (boundary inclusive).
    pub fn query_range(&self, center: &Position, radius: f64) -> BTreeSet<NodeId> {
        self.query_range_counted(center, radius).0
    }

    /// Same as `query_range`, also reporting how much of the index was touched.
    ///
    /// Only partitions overlapping the query's bounding box are examined.
    /// When the box spans more cells than there are occupied partitions, the
    /// occupied partitions are walked and box-tested instead of enumerating
    /// empty cells.
    pub fn query_range_counted(&self, center: &Position, radius: f64) -> (BTreeSet<NodeId>, QueryCost) {
        let mut results = BTreeSet::new();
        let mut cost = QueryCost::default();

        // Negative and NaN radii match nothing, same as the linear scan
        if !(radius >= 0.0) || self.entries.is_empty() {
            return (results, cost);
        }

        let padded = radius + radius * QUERY_BOX_PADDING + QUERY_BOX_PADDING;
        let reach = Position::new(padded, padded, padded);
        let lo = CellKey::containing(&(center - reach), self.cell_size);
        let hi = CellKey::containing(&(center + reach), self.cell_size);

        let mut visit = |members: &BTreeSet<NodeId>, cost: &mut QueryCost| {
            cost.partitions_examined += 1;
            for node in members {
                cost.entries_tested += 1;
                let entry = &self.entries[node];
                if distance(&entry.position, center) <= radius {
                    results.insert(*node);
                }
            }
        };

        if Self::box_cell_count(&lo, &hi) <= self.cells.len() as f64 {
            for x in lo.x..=hi.x {
                for y in lo.y..=hi.y {
                    for z in lo.z..=hi.z {
                        if let Some(members) = self.cells.get(&CellKey::new(x, y, z)) {
                            visit(members, &mut cost);
                        }
                    }
                }
            }
        } else {
            for (key, members) in &self.cells {
                if key.within(&lo, &hi) {
                    visit(members, &mut cost);
                }
            }
        }

        (results, cost)
    }

    fn box_cell_count(lo: &CellKey, hi: &CellKey) -> f64 {
        // f64 so that saturated keys cannot overflow
        let span = |a: i64, b: i64| (b as f64 - a as f64) + 1.0;
        span(lo.x, hi.x) * span(lo.y, hi.y) * span(lo.z, hi.z)
    }

    /// Returns the indexed position of a node.
    pub fn position(&self, node: NodeId) -> Option<Position> {
        self.entries.get(&node).map(|e| e.position)
    }

    /// Returns the full entry of a node.
    pub fn entry(&self, node: NodeId) -> Option<&IndexEntry> {
        self.entries.get(&node)
    }

    /// Returns the members of one partition.
    pub fn partition(&self, cell: CellKey) -> Option<&BTreeSet<NodeId>> {
        self.cells.get(&cell)
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.entries.contains_key(&node)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every indexed node, in order.
    pub fn node_ids(&self) -> BTreeSet<NodeId> {
        self.entries.keys().copied().collect()
    }

    /// Get statistics about the spatial index
    pub fn stats(&self) -> IndexStats {
        let total_entries = self.entries.len();
        let total_partitions = self.cells.len();
        let avg_entries_per_partition = if total_partitions > 0 {
            total_entries as f64 / total_partitions as f64
        } else {
            0.0
        };

        IndexStats {
            total_entries,
            total_partitions,
            avg_entries_per_partition,
            cell_size: self.cell_size,
        }
    }
}

/// Statistics about the spatial index
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
    pub total_entries: usize,
    pub total_partitions: usize,
    pub avg_entries_per_partition: f64,
    pub cell_size: f64,
}
