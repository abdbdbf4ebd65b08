//! Lazy tree iterators over leaves, nodes and active values.
//!
//! Every iterator walks the slot contents rather than the active bits.

use std::collections::btree_map;
use std::iter::Enumerate;
use std::slice;

use voxtree_core::constants::{
    slot_log2, LEAF_LEVEL, LOWER_LEVEL, ROOT_LEVEL, TREE_DEPTH, UPPER_LEVEL,
};
use voxtree_core::{Coord, CoordBBox};

use crate::internal::{InternalNode, LowerNode, Slot, UpperNode};
use crate::leaf::{leaf_voxel, LeafNode};
use crate::mask::{BitMask, OnBits};
use crate::root::{RootEntry, RootNode};
use crate::Value;

type UpperSlots<'a, T> = slice::Iter<'a, Slot<T, LowerNode<T>>>;
type LowerSlots<'a, T> = slice::Iter<'a, Slot<T, LeafNode<T>>>;
type UpperSlotsMut<'a, T> = slice::IterMut<'a, Slot<T, LowerNode<T>>>;
type LowerSlotsMut<'a, T> = slice::IterMut<'a, Slot<T, LeafNode<T>>>;

/// Depth-first iterator over every leaf.
pub struct LeafIter<'a, T> {
    entries: btree_map::Values<'a, Coord, RootEntry<T>>,
    upper: Option<UpperSlots<'a, T>>,
    lower: Option<LowerSlots<'a, T>>,
}

impl<'a, T: Value> LeafIter<'a, T> {
    pub(crate) fn new(root: &'a RootNode<T>) -> Self {
        Self {
            entries: root.table.values(),
            upper: None,
            lower: None,
        }
    }
}

impl<'a, T: Value> Iterator for LeafIter<'a, T> {
    type Item = &'a LeafNode<T>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(lower) = &mut self.lower {
                if let Some(leaf) = lower.find_map(Slot::child) {
                    return Some(leaf);
                }
                self.lower = None;
            }
            if let Some(upper) = &mut self.upper {
                if let Some(node) = upper.find_map(Slot::child) {
                    self.lower = Some(node.slots.iter());
                    continue;
                }
                self.upper = None;
            }
            let node = self.entries.find_map(RootEntry::child)?;
            self.upper = Some(node.slots.iter());
        }
    }
}

/// A node of any level.
#[derive(Clone, Copy, Debug)]
pub enum NodeRef<'a, T> {
    Root(&'a RootNode<T>),
    Upper(&'a UpperNode<T>),
    Lower(&'a LowerNode<T>),
    Leaf(&'a LeafNode<T>),
}

impl<T: Value> NodeRef<'_, T> {
    /// Level of the node counted from the root.
    pub const fn level(&self) -> usize {
        match self {
            Self::Root(_) => ROOT_LEVEL,
            Self::Upper(_) => UPPER_LEVEL,
            Self::Lower(_) => LOWER_LEVEL,
            Self::Leaf(_) => LEAF_LEVEL,
        }
    }

    /// Origin of the node. The root has no extent and reports the origin.
    pub const fn origin(&self) -> Coord {
        match self {
            Self::Root(_) => Coord::ZERO,
            Self::Upper(node) => node.origin(),
            Self::Lower(node) => node.origin(),
            Self::Leaf(node) => node.origin(),
        }
    }
}

/// Pre-order iterator over the nodes of the tree, optionally stopping at a
/// maximum level.
pub struct NodeIter<'a, T> {
    root: Option<&'a RootNode<T>>,
    entries: btree_map::Values<'a, Coord, RootEntry<T>>,
    upper: Option<UpperSlots<'a, T>>,
    lower: Option<LowerSlots<'a, T>>,
    max_level: usize,
}

impl<'a, T: Value> NodeIter<'a, T> {
    pub(crate) fn new(root: &'a RootNode<T>, max_level: usize) -> Self {
        Self {
            root: Some(root),
            entries: root.table.values(),
            upper: None,
            lower: None,
            max_level: max_level.min(TREE_DEPTH - 1),
        }
    }
}

impl<'a, T: Value> Iterator for NodeIter<'a, T> {
    type Item = NodeRef<'a, T>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(root) = self.root.take() {
            return Some(NodeRef::Root(root));
        }
        if self.max_level == ROOT_LEVEL {
            return None;
        }
        if let Some(lower) = &mut self.lower {
            if let Some(leaf) = lower.find_map(Slot::child) {
                return Some(NodeRef::Leaf(leaf));
            }
            self.lower = None;
        }
        if let Some(upper) = &mut self.upper {
            if let Some(node) = upper.find_map(Slot::child) {
                if self.max_level >= LEAF_LEVEL {
                    self.lower = Some(node.slots.iter());
                }
                return Some(NodeRef::Lower(node));
            }
            self.upper = None;
        }
        let node = self.entries.find_map(RootEntry::child)?;
        if self.max_level >= LOWER_LEVEL {
            self.upper = Some(node.slots.iter());
        }
        Some(NodeRef::Upper(node))
    }
}

/// An active tile or voxel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ActiveValue<T> {
    /// Voxel coordinate, or the origin of a tile.
    pub coord: Coord,
    /// Level holding the value; [`LEAF_LEVEL`] for single voxels.
    pub level: usize,
    pub value: T,
}

impl<T> ActiveValue<T> {
    /// True for a single leaf voxel.
    pub const fn is_voxel(&self) -> bool {
        self.level == LEAF_LEVEL
    }

    /// Voxels covered by this value.
    pub fn bbox(&self) -> CoordBBox {
        value_bbox(self.coord, self.level)
    }
}

/// An active tile or voxel with mutable access to its value.
#[derive(Debug)]
pub struct ActiveValueMut<'a, T> {
    pub coord: Coord,
    pub level: usize,
    pub value: &'a mut T,
}

impl<T> ActiveValueMut<'_, T> {
    /// True for a single leaf voxel.
    pub const fn is_voxel(&self) -> bool {
        self.level == LEAF_LEVEL
    }

    /// Voxels covered by the value: one voxel or the whole tile.
    pub fn bbox(&self) -> CoordBBox {
        value_bbox(self.coord, self.level)
    }
}

fn value_bbox(coord: Coord, level: usize) -> CoordBBox {
    let log2 = slot_log2(level).unwrap_or(0);
    CoordBBox::cube(coord, 1 << log2)
}

/// Iterator over every active tile and voxel, in depth-first order.
pub struct ActiveValueIter<'a, T> {
    entries: btree_map::Iter<'a, Coord, RootEntry<T>>,
    upper: Option<(Coord, Enumerate<UpperSlots<'a, T>>)>,
    lower: Option<(Coord, Enumerate<LowerSlots<'a, T>>)>,
    leaf: Option<(&'a LeafNode<T>, OnBits<'a>)>,
}

impl<'a, T: Value> ActiveValueIter<'a, T> {
    pub(crate) fn new(root: &'a RootNode<T>) -> Self {
        Self {
            entries: root.table.iter(),
            upper: None,
            lower: None,
            leaf: None,
        }
    }
}

impl<T: Value> Iterator for ActiveValueIter<'_, T> {
    type Item = ActiveValue<T>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((leaf, bits)) = &mut self.leaf {
                if let Some(n) = bits.next() {
                    return Some(ActiveValue {
                        coord: leaf.offset_to_coord(n),
                        level: LEAF_LEVEL,
                        value: leaf.values[n],
                    });
                }
                self.leaf = None;
            }
            if let Some((origin, slots)) = &mut self.lower {
                match slots.next() {
                    Some((n, Slot::Tile(value))) => {
                        return Some(ActiveValue {
                            coord: LowerNode::<T>::slot_origin_of(*origin, n),
                            level: LOWER_LEVEL,
                            value: *value,
                        });
                    }
                    Some((_, Slot::Child(leaf))) => {
                        self.leaf = Some((&**leaf, leaf.active.iter_on()));
                    }
                    Some((_, Slot::Inactive)) => {}
                    None => self.lower = None,
                }
                continue;
            }
            if let Some((origin, slots)) = &mut self.upper {
                match slots.next() {
                    Some((n, Slot::Tile(value))) => {
                        return Some(ActiveValue {
                            coord: UpperNode::<T>::slot_origin_of(*origin, n),
                            level: UPPER_LEVEL,
                            value: *value,
                        });
                    }
                    Some((_, Slot::Child(lower))) => {
                        self.lower = Some((lower.origin, lower.slots.iter().enumerate()));
                    }
                    Some((_, Slot::Inactive)) => {}
                    None => self.upper = None,
                }
                continue;
            }
            match self.entries.next()? {
                (key, RootEntry::Tile(value)) => {
                    return Some(ActiveValue {
                        coord: *key,
                        level: ROOT_LEVEL,
                        value: *value,
                    });
                }
                (_, RootEntry::Child(upper)) => {
                    self.upper = Some((upper.origin, upper.slots.iter().enumerate()));
                }
            }
        }
    }
}

type LeafValuesMut<'a, T> = (Coord, &'a BitMask, Enumerate<slice::IterMut<'a, T>>);

/// Iterator over every active tile and voxel with mutable access to the
/// values. Active states cannot be changed through it.
pub struct ActiveValueIterMut<'a, T> {
    entries: btree_map::IterMut<'a, Coord, RootEntry<T>>,
    upper: Option<(Coord, Enumerate<UpperSlotsMut<'a, T>>)>,
    lower: Option<(Coord, Enumerate<LowerSlotsMut<'a, T>>)>,
    leaf: Option<LeafValuesMut<'a, T>>,
}

impl<'a, T: Value> ActiveValueIterMut<'a, T> {
    pub(crate) fn new(root: &'a mut RootNode<T>) -> Self {
        Self {
            entries: root.table.iter_mut(),
            upper: None,
            lower: None,
            leaf: None,
        }
    }
}

fn split_internal<T, C, const LOG2DIM: u32>(
    node: &mut InternalNode<T, C, LOG2DIM>,
) -> (Coord, Enumerate<slice::IterMut<'_, Slot<T, C>>>) {
    let InternalNode { origin, slots, .. } = node;
    (*origin, slots.iter_mut().enumerate())
}

fn split_leaf<T>(leaf: &mut LeafNode<T>) -> LeafValuesMut<'_, T> {
    let LeafNode {
        origin,
        values,
        active,
    } = leaf;
    (*origin, &*active, values.iter_mut().enumerate())
}

impl<'a, T: Value> Iterator for ActiveValueIterMut<'a, T> {
    type Item = ActiveValueMut<'a, T>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((origin, mask, values)) = &mut self.leaf {
                if let Some((n, value)) = values.find(|(n, _)| mask.is_on(*n)) {
                    return Some(ActiveValueMut {
                        coord: leaf_voxel(*origin, n),
                        level: LEAF_LEVEL,
                        value,
                    });
                }
                self.leaf = None;
            }
            if let Some((origin, slots)) = &mut self.lower {
                match slots.next() {
                    Some((n, Slot::Tile(value))) => {
                        return Some(ActiveValueMut {
                            coord: LowerNode::<T>::slot_origin_of(*origin, n),
                            level: LOWER_LEVEL,
                            value,
                        });
                    }
                    Some((_, Slot::Child(leaf))) => self.leaf = Some(split_leaf(&mut **leaf)),
                    Some((_, Slot::Inactive)) => {}
                    None => self.lower = None,
                }
                continue;
            }
            if let Some((origin, slots)) = &mut self.upper {
                match slots.next() {
                    Some((n, Slot::Tile(value))) => {
                        return Some(ActiveValueMut {
                            coord: UpperNode::<T>::slot_origin_of(*origin, n),
                            level: UPPER_LEVEL,
                            value,
                        });
                    }
                    Some((_, Slot::Child(lower))) => {
                        self.lower = Some(split_internal(&mut **lower));
                    }
                    Some((_, Slot::Inactive)) => {}
                    None => self.upper = None,
                }
                continue;
            }
            match self.entries.next()? {
                (key, RootEntry::Tile(value)) => {
                    return Some(ActiveValueMut {
                        coord: *key,
                        level: ROOT_LEVEL,
                        value,
                    });
                }
                (_, RootEntry::Child(upper)) => self.upper = Some(split_internal(&mut **upper)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Tree;
    use hashbrown::HashSet;

    fn sample_tree() -> Tree<f32> {
        let mut tree = Tree::new(0.0);
        tree.set_value(Coord::new(0, 0, 0), 1.0);
        tree.set_value(Coord::new(7, 7, 7), 2.0);
        tree.set_value(Coord::new(-1, 0, 0), 3.0);
        tree.set_value(Coord::new(5000, 10, -20), 4.0);
        tree.add_tile(LOWER_LEVEL, Coord::new(64, 0, 0), 5.0, true).unwrap();
        tree.add_tile(UPPER_LEVEL, Coord::new(0, 128, 0), 6.0, true).unwrap();
        tree.add_tile(ROOT_LEVEL, Coord::new(-8192, 0, 0), 7.0, true).unwrap();
        tree
    }

    #[test]
    fn leaves_are_visited_once() {
        let tree = sample_tree();
        let origins: Vec<_> = tree.leaves().map(LeafNode::origin).collect();
        let unique: HashSet<_> = origins.iter().copied().collect();
        assert_eq!(origins.len(), 3);
        assert_eq!(unique.len(), 3);
        assert!(unique.contains(&Coord::new(-8, 0, 0)));
    }

    #[test]
    fn leaf_iter_is_restartable() {
        let tree = sample_tree();
        assert_eq!(tree.leaves().count(), tree.leaves().count());
        let mut iter = tree.leaves();
        while iter.next().is_some() {}
        assert!(iter.next().is_none());
    }

    #[test]
    fn node_iter_counts_match_node_counts() {
        let tree = sample_tree();
        let counts = tree.node_counts();
        for level in 0..TREE_DEPTH {
            assert_eq!(tree.nodes_at_level(level).count(), counts[level], "level {level}");
        }
        assert_eq!(tree.nodes().count(), counts.iter().sum::<usize>());
        assert!(matches!(tree.nodes().next(), Some(NodeRef::Root(_))));
    }

    #[test]
    fn active_values_cover_tiles_and_voxels() {
        let tree = sample_tree();
        let values: Vec<_> = tree.active_values().collect();
        let tiles: Vec<_> = values.iter().filter(|v| !v.is_voxel()).collect();
        assert_eq!(tiles.len(), 3);
        assert_eq!(values.len() - tiles.len(), 4);

        let voxels: u64 = values.iter().map(|v| v.bbox().volume()).sum();
        assert_eq!(voxels, tree.active_voxel_count());

        let root_tile = values.iter().find(|v| v.level == ROOT_LEVEL).unwrap();
        assert_eq!(root_tile.coord, Coord::new(-8192, 0, 0));
        assert_eq!(root_tile.value, 7.0);
    }

    #[test]
    fn active_values_mut_matches_read_only() {
        let mut tree = sample_tree();
        let expected: Vec<_> = tree.active_values().map(|v| (v.coord, v.level)).collect();
        let seen: Vec<_> = tree
            .active_values_mut()
            .map(|v| {
                *v.value *= 2.0;
                (v.coord, v.level)
            })
            .collect();
        assert_eq!(seen, expected);
        assert_eq!(tree.get_value(Coord::new(64, 0, 0)), 10.0);
        assert_eq!(tree.get_value(Coord::new(-8000, 5, 5)), 14.0);
        assert_eq!(tree.get_value(Coord::new(-1, 0, 0)), 6.0);
    }

    #[test]
    fn inactive_voxels_are_skipped() {
        let mut tree = Tree::new(0_i32);
        tree.set_value(Coord::new(1, 1, 1), 5);
        tree.set_value_off(Coord::new(2, 2, 2), 9);
        let values: Vec<_> = tree.active_values().collect();
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].coord, Coord::new(1, 1, 1));
        assert_eq!(tree.active_values_mut().count(), 1);
    }
}
