//! The tree: coordinate-indexed access to a root node and its hierarchy.

use rayon::prelude::*;
use tracing::{debug, trace_span};
use voxtree_core::constants::{LEAF_LEVEL, TREE_DEPTH};
use voxtree_core::{Coord, CoordBBox, Error, ForeachOptions, Result};

use crate::accessor::{ValueAccessor, ValueAccessorMut};
use crate::internal::UpperNode;
use crate::iter::{ActiveValueIter, ActiveValueIterMut, ActiveValueMut, LeafIter, NodeIter, NodeRef};
use crate::leaf::LeafNode;
use crate::leaf_manager::LeafManager;
use crate::node_manager::{split_leaves, split_levels, DynamicNodeManager, NodeManager};
use crate::root::RootNode;
use crate::Value;

/// Tree of `f32` values.
pub type FloatTree = Tree<f32>;
/// Tree of `f64` values.
pub type DoubleTree = Tree<f64>;
/// Tree of `i32` values.
pub type Int32Tree = Tree<i32>;

/// Sparse volume with a fixed 5-4-3 hierarchy below an unbounded root.
///
/// Every coordinate resolves to exactly one slot: a leaf voxel, a tile at
/// some level, or inactive background.
///
/// The active bit of every internal slot is set iff the slot is an active
/// tile or leads to at least one active voxel. Writes and bulk operations
/// keep the bits current before they return.
#[derive(Clone, Debug)]
pub struct Tree<T: Value> {
    pub(crate) root: RootNode<T>,
}

impl<T: Value> Default for Tree<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Value> Tree<T> {
    /// Create an empty tree whose every coordinate reads `background`.
    pub const fn new(background: T) -> Self {
        Self {
            root: RootNode::new(background),
        }
    }

    /// Value of every coordinate outside active tiles and voxels.
    #[inline]
    pub const fn background(&self) -> T {
        self.root.background
    }

    /// The root node, for read-only traversal.
    pub const fn root(&self) -> &RootNode<T> {
        &self.root
    }

    /// True if the tree holds no nodes and no tiles.
    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// Remove every node and tile.
    pub fn clear(&mut self) {
        self.root.clear();
    }

    // Reads

    /// Value at `c`, active or not.
    #[inline]
    pub fn get_value(&self, c: Coord) -> T {
        self.root.get_value(c)
    }

    /// Value at `c` and whether it is active, in one descent.
    #[inline]
    pub fn probe_value(&self, c: Coord) -> (T, bool) {
        self.root.probe_value(c)
    }

    /// Whether the voxel or tile covering `c` is active.
    #[inline]
    pub fn is_value_on(&self, c: Coord) -> bool {
        self.root.probe_value(c).1
    }

    /// Level whose slot terminates the descent to `c`: the level of a tile or
    /// inactive slot, [`LEAF_LEVEL`] for a leaf voxel, or `None` if no root
    /// entry covers `c`.
    #[inline]
    pub fn get_value_depth(&self, c: Coord) -> Option<usize> {
        self.root.get_value_depth(c)
    }

    // Writes

    /// Set the voxel at `c` to `value` and mark it active, materializing any
    /// tile on the way down.
    pub fn set_value(&mut self, c: Coord, value: T) {
        self.root.set_value_on(c, value);
    }

    /// Set the voxel at `c` to `value` and mark it inactive.
    pub fn set_value_off(&mut self, c: Coord, value: T) {
        self.root.set_value_off(c, value);
    }

    /// Change the active state of the voxel at `c`, keeping its value.
    pub fn set_active_state(&mut self, c: Coord, on: bool) {
        self.root.set_active_state(c, on);
    }

    /// Place a tile at `level` covering `c`, discarding any subtree in that
    /// slot.
    ///
    /// Level 0 places a root tile, level [`LEAF_LEVEL`] a single voxel. An
    /// inactive tile above the leaf level clears the slot to background.
    pub fn add_tile(&mut self, level: usize, c: Coord, value: T, active: bool) -> Result<()> {
        if level >= TREE_DEPTH {
            return Err(Error::InvalidLevel {
                level,
                depth: TREE_DEPTH,
            });
        }
        self.root.add_tile(level, c, value, active);
        Ok(())
    }

    /// Expand every active tile into leaves holding the tile value.
    pub fn voxelize(&mut self) {
        let _span = trace_span!("tree.voxelize").entered();
        let tiles = self.root.active_tile_count();
        if tiles == 0 {
            return;
        }
        self.root.voxelize();
        debug!(tiles, leaves = self.leaf_count(), "Voxelized tree");
    }

    /// Collapse uniform subtrees back into tiles and drop empty ones.
    pub fn prune(&mut self) {
        let _span = trace_span!("tree.prune").entered();
        let before = self.root.node_counts();
        self.root.prune();
        let after = self.root.node_counts();
        if before != after {
            debug!(?before, ?after, "Pruned tree");
        }
    }

    /// Recompute every ancestor active bit from the slot contents.
    ///
    /// Every operation of the tree and its managers already leaves the bits
    /// current; this is a full pass over the hierarchy.
    pub fn sync_active_masks(&mut self) {
        let _span = trace_span!("tree.sync_active_masks").entered();
        self.root.sync_active();
    }

    // Statistics

    /// Number of active voxels, counting every voxel of an active tile.
    pub fn active_voxel_count(&self) -> u64 {
        self.root.active_voxel_count()
    }

    /// Number of active tiles at all levels above the leaves.
    pub fn active_tile_count(&self) -> u64 {
        self.root.active_tile_count()
    }

    /// Number of leaf nodes.
    pub fn leaf_count(&self) -> usize {
        self.node_counts()[LEAF_LEVEL]
    }

    /// Number of nodes at each level, root first.
    pub fn node_counts(&self) -> [usize; TREE_DEPTH] {
        self.root.node_counts()
    }

    /// Number of nodes at `level`.
    pub fn node_count(&self, level: usize) -> usize {
        self.node_counts().get(level).copied().unwrap_or(0)
    }

    /// Number of upper nodes hanging off the root.
    pub fn root_child_count(&self) -> usize {
        self.root.child_count()
    }

    /// Approximate bytes owned by the tree.
    pub fn memory_usage(&self) -> usize {
        self.root.memory_usage()
    }

    /// Smallest box holding every active voxel, or `None` for an empty tree.
    pub fn active_bbox(&self) -> Option<CoordBBox> {
        self.root.active_bbox()
    }

    // Iteration

    /// Upper nodes hanging off the root.
    pub fn root_children(&self) -> impl Iterator<Item = &UpperNode<T>> + '_ {
        self.root.children()
    }

    /// Every leaf, depth first.
    pub fn leaves(&self) -> LeafIter<'_, T> {
        LeafIter::new(&self.root)
    }

    /// Apply `op` to every leaf in traversal order, then bring the active
    /// bits above changed leaves up to date.
    pub fn foreach_leaf_mut<F>(&mut self, mut op: F)
    where
        F: FnMut(&mut LeafNode<T>),
    {
        let (leaves, mut parents) = split_leaves(&mut self.root);
        for (index, leaf) in leaves.into_iter().enumerate() {
            let before = leaf.has_active();
            op(leaf);
            let after = leaf.has_active();
            if after != before {
                parents.update(index, after);
            }
        }
    }

    /// Every node in pre-order, root first.
    pub fn nodes(&self) -> NodeIter<'_, T> {
        NodeIter::new(&self.root, LEAF_LEVEL)
    }

    /// Nodes at one level, in pre-order.
    pub fn nodes_at_level(&self, level: usize) -> impl Iterator<Item = NodeRef<'_, T>> + '_ {
        NodeIter::new(&self.root, level).filter(move |node| node.level() == level)
    }

    /// Every active tile and voxel.
    pub fn active_values(&self) -> ActiveValueIter<'_, T> {
        ActiveValueIter::new(&self.root)
    }

    /// Every active tile and voxel with mutable access to the value.
    pub fn active_values_mut(&mut self) -> ActiveValueIterMut<'_, T> {
        ActiveValueIterMut::new(&mut self.root)
    }

    /// Active voxels inside `bbox`, visited coordinate by coordinate.
    pub fn active_voxels_in(&self, bbox: CoordBBox) -> impl Iterator<Item = (Coord, T)> + '_ {
        let mut accessor = self.accessor();
        bbox.iter().filter_map(move |c| {
            let (value, on) = accessor.probe_value(c);
            on.then_some((c, value))
        })
    }

    /// Apply `op` to every active tile and voxel.
    ///
    /// In parallel mode tiles and leaves are distributed over the worker
    /// pool in chunks of at least `grain_size`; each value is visited once.
    pub fn foreach_active_value<F>(&mut self, op: F, options: ForeachOptions)
    where
        F: Fn(ActiveValueMut<'_, T>) + Sync + Send,
    {
        let _span = trace_span!("tree.foreach_active_value", parallel = options.parallel).entered();
        if !options.parallel {
            self.active_values_mut().for_each(op);
            return;
        }
        let grain = options.effective_grain_size();
        let (tiles, leaves) = split_levels(&mut self.root).into_parts();
        rayon::join(
            || tiles.into_par_iter().with_min_len(grain).for_each(&op),
            || {
                leaves.into_par_iter().with_min_len(grain).for_each(|leaf| {
                    for (coord, value) in leaf.active_values_mut() {
                        op(ActiveValueMut {
                            coord,
                            level: LEAF_LEVEL,
                            value,
                        });
                    }
                });
            },
        );
    }

    // Accessors and managers

    /// Cached read accessor.
    pub fn accessor(&self) -> ValueAccessor<'_, T> {
        ValueAccessor::new(&self.root)
    }

    /// Cached read-write accessor.
    pub fn accessor_mut(&mut self) -> ValueAccessorMut<'_, T> {
        ValueAccessorMut::new(&mut self.root)
    }

    /// Flatten the leaves for indexed parallel access.
    pub fn leaf_manager(&mut self) -> LeafManager<'_, T> {
        LeafManager::new(self)
    }

    /// Snapshot of the tile values and leaves, level by level.
    pub fn node_manager(&mut self) -> NodeManager<'_, T> {
        NodeManager::new(self)
    }

    /// Level-by-level traversal that re-reads each level before visiting it.
    pub fn dynamic_node_manager(&mut self) -> DynamicNodeManager<'_, T> {
        DynamicNodeManager::new(self)
    }
}
