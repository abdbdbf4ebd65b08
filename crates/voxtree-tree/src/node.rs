//! Capabilities shared by every non-root node level.

use voxtree_core::constants::TREE_DEPTH;
use voxtree_core::{Coord, CoordBBox};

use crate::Value;

/// Result of asking whether a node could be replaced by a single tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Uniform<T> {
    /// Every voxel is active with this value.
    Active(T),
    /// Every voxel is inactive background.
    Inactive,
}

/// Operations every node below the root supports.
///
/// Implemented by [`LeafNode`](crate::LeafNode) and by each
/// [`InternalNode`](crate::InternalNode) level, so the recursive descent is
/// monomorphized per level. Internal inactive slots store no value, which is
/// why reads and materializing writes take the tree's background.
pub trait TreeNode<T: Value>: Clone + Send + Sync + Sized {
    /// Level of this node counted from the root.
    const LEVEL: usize;
    /// log2 of the voxels per axis the node covers.
    const TOTAL: u32;

    /// Create a node at `origin` whose voxels all hold `value`.
    ///
    /// An inactive internal node holds only inactive slots, so `value` is
    /// expected to be the background in that case.
    fn new_filled(origin: Coord, value: T, active: bool) -> Self;

    fn origin(&self) -> Coord;

    fn get_value(&self, c: Coord, background: T) -> T;

    fn probe_value(&self, c: Coord, background: T) -> (T, bool);

    /// Level of the slot that terminates a descent to `c`.
    fn get_value_depth(&self, c: Coord) -> usize;

    fn set_value_on(&mut self, c: Coord, value: T, background: T);

    fn set_value_off(&mut self, c: Coord, value: T, background: T);

    fn set_active_state(&mut self, c: Coord, on: bool, background: T);

    /// Place a tile at `level` (at or below this node), discarding whatever
    /// occupied that slot.
    fn add_tile(&mut self, level: usize, c: Coord, value: T, active: bool, background: T);

    /// Check if any voxel below this node is active.
    fn has_active(&self) -> bool;

    /// Expand every active tile below this node into leaves.
    fn voxelize(&mut self, background: T);

    /// Collapse uniform descendants into tiles.
    fn prune(&mut self, background: T);

    /// Whether the whole node could be replaced by one tile.
    fn uniform(&self, background: T) -> Option<Uniform<T>>;

    /// Recompute slot bits from the slot contents, bottom-up. Returns
    /// [`has_active`](Self::has_active) for the refreshed node.
    fn sync_active(&mut self) -> bool;

    fn active_voxel_count(&self) -> u64;

    fn active_tile_count(&self) -> u64;

    /// Add this node and its descendants to the per-level `counts`.
    fn node_counts(&self, counts: &mut [usize; TREE_DEPTH]);

    /// Approximate bytes owned by this node and its descendants.
    fn memory_usage(&self) -> usize;

    /// Grow `bbox` to cover every active voxel below this node.
    fn expand_active_bbox(&self, bbox: &mut Option<CoordBBox>);
}

/// Grow an optional box by another box.
pub(crate) fn merge_bbox(bbox: &mut Option<CoordBBox>, other: CoordBBox) {
    *bbox = Some(match bbox {
        Some(b) => b.union(&other),
        None => other,
    });
}
