//! Level-by-level bulk traversal.
//!
//! [`NodeManager`] splits the tree once into per-level arrays: the active
//! tiles of every root and internal node, plus the leaves. Operations can
//! change values but not structure, so the snapshot stays valid for the
//! manager's lifetime.
//!
//! [`DynamicNodeManager`] hands out whole nodes instead and gathers each
//! level only after the previous one has been processed, so children added
//! or removed at level N are what level N+1 visits.

use std::slice;

use tracing::{debug, trace_span};
use voxtree_core::constants::{LEAF_LEVEL, LOWER_LEVEL, ROOT_LEVEL, TREE_DEPTH, UPPER_LEVEL};
use voxtree_core::{Coord, ForeachOptions};

use crate::internal::{InternalNode, LowerNode, Slot, UpperNode};
use crate::iter::ActiveValueMut;
use crate::leaf::LeafNode;
use crate::mask::BitMask;
use crate::pool::{for_each_indexed, map_indexed};
use crate::root::{RootEntry, RootNode};
use crate::tree::Tree;
use crate::Value;

/// Active tiles of one root or internal node.
#[derive(Debug)]
pub struct NodeTiles<'a, T> {
    /// Origin of the node. The root has none and reports [`Coord::ZERO`].
    pub origin: Coord,
    /// Level of the node, [`ROOT_LEVEL`] for the root.
    pub level: usize,
    /// The node's active tiles in slot order.
    pub tiles: Vec<ActiveValueMut<'a, T>>,
}

/// Active bits of the internal nodes above a list of split-off leaves.
///
/// Leaf `i` sits in slot `leaf_links[i].1` of lower node `leaf_links[i].0`,
/// and likewise for lower nodes inside upper nodes.
#[derive(Default)]
pub(crate) struct LeafParents<'a> {
    upper: Vec<&'a mut BitMask>,
    lower: Vec<&'a mut BitMask>,
    lower_links: Vec<(usize, usize)>,
    leaf_links: Vec<(usize, usize)>,
}

impl LeafParents<'_> {
    /// Record whether leaf `index` now holds any active voxel.
    pub(crate) fn update(&mut self, index: usize, on: bool) {
        let (lower, slot) = self.leaf_links[index];
        self.lower[lower].set(slot, on);
        let any = self.lower[lower].any();
        let (upper, slot) = self.lower_links[lower];
        self.upper[upper].set(slot, any);
    }
}

/// Apply `op(leaf, index)` to every leaf and carry activity changes up to
/// the ancestor bits once all leaves are done.
pub(crate) fn foreach_leaf_tracked<T, F>(
    leaves: &mut [&mut LeafNode<T>],
    parents: &mut LeafParents<'_>,
    options: ForeachOptions,
    op: F,
) where
    T: Value,
    F: Fn(&mut LeafNode<T>, usize) + Sync + Send,
{
    let changes = map_indexed(leaves, options, |leaf, i| {
        let before = leaf.has_active();
        op(&mut **leaf, i);
        let after = leaf.has_active();
        (after != before).then_some(after)
    });
    for (index, change) in changes.into_iter().enumerate() {
        if let Some(on) = change {
            parents.update(index, on);
        }
    }
}

/// Every level of a tree, split into disjoint mutable parts.
pub(crate) struct Levels<'a, T> {
    pub(crate) root: NodeTiles<'a, T>,
    pub(crate) upper: Vec<NodeTiles<'a, T>>,
    pub(crate) lower: Vec<NodeTiles<'a, T>>,
    pub(crate) leaves: Vec<&'a mut LeafNode<T>>,
    pub(crate) parents: LeafParents<'a>,
}

impl<'a, T> Levels<'a, T> {
    /// All tiles in one list, shallowest level first, and the leaves.
    pub(crate) fn into_parts(self) -> (Vec<ActiveValueMut<'a, T>>, Vec<&'a mut LeafNode<T>>) {
        let Self {
            root,
            upper,
            lower,
            leaves,
            ..
        } = self;
        let tiles = std::iter::once(root)
            .chain(upper)
            .chain(lower)
            .flat_map(|node| node.tiles)
            .collect();
        (tiles, leaves)
    }
}

pub(crate) fn split_levels<T: Value>(root: &mut RootNode<T>) -> Levels<'_, T> {
    let mut levels = Levels {
        root: NodeTiles {
            origin: Coord::ZERO,
            level: ROOT_LEVEL,
            tiles: Vec::new(),
        },
        upper: Vec::new(),
        lower: Vec::new(),
        leaves: Vec::new(),
        parents: LeafParents::default(),
    };
    for (&coord, entry) in &mut root.table {
        match entry {
            RootEntry::Tile(value) => levels.root.tiles.push(ActiveValueMut {
                coord,
                level: ROOT_LEVEL,
                value,
            }),
            RootEntry::Child(upper) => split_upper(&mut **upper, &mut levels),
        }
    }
    levels
}

/// The leaves in traversal order, with the bits above them.
pub(crate) fn split_leaves<T: Value>(
    root: &mut RootNode<T>,
) -> (Vec<&mut LeafNode<T>>, LeafParents<'_>) {
    let Levels {
        leaves, parents, ..
    } = split_levels(root);
    (leaves, parents)
}

fn split_upper<'a, T: Value>(node: &'a mut UpperNode<T>, levels: &mut Levels<'a, T>) {
    let InternalNode {
        origin,
        slots,
        active,
    } = node;
    let origin = *origin;
    let index = levels.parents.upper.len();
    levels.parents.upper.push(active);
    let mut tiles = Vec::new();
    for (n, slot) in slots.iter_mut().enumerate() {
        match slot {
            Slot::Inactive => {}
            Slot::Tile(value) => tiles.push(ActiveValueMut {
                coord: UpperNode::<T>::slot_origin_of(origin, n),
                level: UPPER_LEVEL,
                value,
            }),
            Slot::Child(lower) => split_lower(&mut **lower, (index, n), levels),
        }
    }
    levels.upper.push(NodeTiles {
        origin,
        level: UPPER_LEVEL,
        tiles,
    });
}

fn split_lower<'a, T: Value>(
    node: &'a mut LowerNode<T>,
    link: (usize, usize),
    levels: &mut Levels<'a, T>,
) {
    let InternalNode {
        origin,
        slots,
        active,
    } = node;
    let origin = *origin;
    let index = levels.parents.lower.len();
    levels.parents.lower.push(active);
    levels.parents.lower_links.push(link);
    let mut tiles = Vec::new();
    for (n, slot) in slots.iter_mut().enumerate() {
        match slot {
            Slot::Inactive => {}
            Slot::Tile(value) => tiles.push(ActiveValueMut {
                coord: LowerNode::<T>::slot_origin_of(origin, n),
                level: LOWER_LEVEL,
                value,
            }),
            Slot::Child(leaf) => {
                levels.parents.leaf_links.push((index, n));
                levels.leaves.push(&mut **leaf);
            }
        }
    }
    levels.lower.push(NodeTiles {
        origin,
        level: LOWER_LEVEL,
        tiles,
    });
}

/// Per-node operation for [`NodeManager`].
///
/// `index` is the node's position within its level.
pub trait NodeOp<T: Value>: Sync {
    fn tiles(&self, _node: &mut NodeTiles<'_, T>, _index: usize) {}

    fn leaf(&self, _leaf: &mut LeafNode<T>, _index: usize) {}
}

/// Static per-level snapshot of a tree.
///
/// Leaf operations may toggle voxel activity; the ancestor bits are brought
/// up to date when the leaf level finishes.
pub struct NodeManager<'a, T: Value> {
    root: NodeTiles<'a, T>,
    upper: Vec<NodeTiles<'a, T>>,
    lower: Vec<NodeTiles<'a, T>>,
    leaves: Vec<&'a mut LeafNode<T>>,
    parents: LeafParents<'a>,
}

impl<'a, T: Value> NodeManager<'a, T> {
    pub(crate) fn new(tree: &'a mut Tree<T>) -> Self {
        let Levels {
            root,
            upper,
            lower,
            leaves,
            parents,
        } = split_levels(&mut tree.root);
        debug!(
            upper = upper.len(),
            lower = lower.len(),
            leaves = leaves.len(),
            "Built node manager"
        );
        Self {
            root,
            upper,
            lower,
            leaves,
            parents,
        }
    }

    /// Number of nodes captured at `level`; zero past the leaf level.
    pub fn node_count(&self, level: usize) -> usize {
        match level {
            ROOT_LEVEL => 1,
            UPPER_LEVEL => self.upper.len(),
            LOWER_LEVEL => self.lower.len(),
            LEAF_LEVEL => self.leaves.len(),
            _ => 0,
        }
    }

    /// Number of leaves captured.
    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    /// Visit the root, then every upper node, then every lower node, then
    /// every leaf. Each level completes before the next one starts.
    pub fn foreach_top_down<O: NodeOp<T>>(&mut self, op: &O, options: ForeachOptions) {
        let _span = trace_span!("node_manager.top_down", parallel = options.parallel).entered();
        for level in 0..TREE_DEPTH {
            self.visit_level(level, op, options);
        }
    }

    /// As [`foreach_top_down`](Self::foreach_top_down), leaves first.
    pub fn foreach_bottom_up<O: NodeOp<T>>(&mut self, op: &O, options: ForeachOptions) {
        let _span = trace_span!("node_manager.bottom_up", parallel = options.parallel).entered();
        for level in (0..TREE_DEPTH).rev() {
            self.visit_level(level, op, options);
        }
    }

    fn visit_level<O: NodeOp<T>>(&mut self, level: usize, op: &O, options: ForeachOptions) {
        let _span = trace_span!("node_manager.level", level).entered();
        match level {
            ROOT_LEVEL => for_each_indexed(slice::from_mut(&mut self.root), options, |node, i| {
                op.tiles(node, i);
            }),
            UPPER_LEVEL => for_each_indexed(&mut self.upper, options, |node, i| op.tiles(node, i)),
            LOWER_LEVEL => for_each_indexed(&mut self.lower, options, |node, i| op.tiles(node, i)),
            _ => foreach_leaf_tracked(&mut self.leaves, &mut self.parents, options, |leaf, i| {
                op.leaf(leaf, i);
            }),
        }
    }
}

/// Per-node operation for [`DynamicNodeManager`].
///
/// Returning `false` from a node callback skips that node's children.
pub trait DynamicNodeOp<T: Value>: Sync {
    fn root(&self, _root: &mut RootNode<T>) -> bool {
        true
    }

    fn upper(&self, _node: &mut UpperNode<T>, _index: usize) -> bool {
        true
    }

    fn lower(&self, _node: &mut LowerNode<T>, _index: usize) -> bool {
        true
    }

    fn leaf(&self, _leaf: &mut LeafNode<T>, _index: usize) {}
}

/// Top-down traversal that re-reads the children of each visited level.
pub struct DynamicNodeManager<'a, T: Value> {
    root: &'a mut RootNode<T>,
}

impl<'a, T: Value> DynamicNodeManager<'a, T> {
    pub(crate) fn new(tree: &'a mut Tree<T>) -> Self {
        Self {
            root: &mut tree.root,
        }
    }

    /// Visit the root, then the children of every node whose callback
    /// returned `true`, one level at a time.
    pub fn foreach_top_down<O: DynamicNodeOp<T>>(&mut self, op: &O, options: ForeachOptions) {
        let _span =
            trace_span!("dynamic_node_manager.top_down", parallel = options.parallel).entered();
        if op.root(self.root) {
            self.visit_children(op, options);
        }
        // Node callbacks get whole nodes and may toggle activity anywhere.
        self.root.sync_active();
    }

    fn visit_children<O: DynamicNodeOp<T>>(&mut self, op: &O, options: ForeachOptions) {
        let mut upper: Vec<&mut UpperNode<T>> = self.root.children_mut().collect();
        let descend = map_indexed(&mut upper, options, |node, i| op.upper(node, i));
        let mut lower: Vec<&mut LowerNode<T>> = upper
            .into_iter()
            .zip(descend)
            .filter_map(|(node, descend)| descend.then_some(node))
            .flat_map(|node| node.children_mut())
            .collect();
        debug!(lower = lower.len(), "Visiting lower level");

        let descend = map_indexed(&mut lower, options, |node, i| op.lower(node, i));
        let mut leaves: Vec<&mut LeafNode<T>> = lower
            .into_iter()
            .zip(descend)
            .filter_map(|(node, descend)| descend.then_some(node))
            .flat_map(|node| node.children_mut())
            .collect();
        debug!(leaves = leaves.len(), "Visiting leaf level");

        for_each_indexed(&mut leaves, options, |leaf, i| op.leaf(leaf, i));
    }
}
