//! The root node: an unbounded sparse table of upper nodes and root tiles.

use std::collections::BTreeMap;

use rayon::prelude::*;
use voxtree_core::constants::{ROOT_LEVEL, TREE_DEPTH, UPPER_TOTAL};
use voxtree_core::{Coord, CoordBBox};

use crate::internal::UpperNode;
use crate::node::{merge_bbox, TreeNode, Uniform};
use crate::Value;

/// One entry of the root table.
///
/// Coordinates without an entry are inactive background.
#[derive(Clone, Debug)]
pub enum RootEntry<T> {
    /// Active tile covering a whole 4096³ region.
    Tile(T),
    Child(Box<UpperNode<T>>),
}

impl<T: Value> RootEntry<T> {
    /// The tile value, if this entry is a root tile.
    pub const fn tile(&self) -> Option<T> {
        match self {
            Self::Tile(v) => Some(*v),
            Self::Child(_) => None,
        }
    }

    /// The upper node, if this entry holds one.
    pub fn child(&self) -> Option<&UpperNode<T>> {
        match self {
            Self::Child(child) => Some(&**child),
            Self::Tile(_) => None,
        }
    }

    /// The upper node with mutable access, if this entry holds one.
    pub fn child_mut(&mut self) -> Option<&mut UpperNode<T>> {
        match self {
            Self::Child(child) => Some(&mut **child),
            Self::Tile(_) => None,
        }
    }
}

/// Root of the tree, keyed by the 4096-aligned origin of each entry.
///
/// Keys are kept in a `BTreeMap` so root-level iteration is ordered and
/// deterministic.
#[derive(Clone, Debug)]
pub struct RootNode<T> {
    pub(crate) background: T,
    pub(crate) table: BTreeMap<Coord, RootEntry<T>>,
}

impl<T: Value> RootNode<T> {
    /// An empty root reading `background` everywhere.
    pub const fn new(background: T) -> Self {
        Self {
            background,
            table: BTreeMap::new(),
        }
    }

    /// Root table key of the entry covering `c`.
    #[inline]
    pub const fn key(c: Coord) -> Coord {
        c.aligned(UPPER_TOTAL)
    }

    /// Value of every coordinate outside active tiles and voxels.
    #[inline]
    pub const fn background(&self) -> T {
        self.background
    }

    /// Entry covering `c`, if any.
    #[inline]
    pub fn entry(&self, c: Coord) -> Option<&RootEntry<T>> {
        self.table.get(&Self::key(c))
    }

    /// All entries in key order.
    pub fn entries(&self) -> impl Iterator<Item = (Coord, &RootEntry<T>)> + '_ {
        self.table.iter().map(|(k, e)| (*k, e))
    }

    /// True if the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Remove every entry.
    pub fn clear(&mut self) {
        self.table.clear();
    }

    /// Upper nodes in key order.
    pub fn children(&self) -> impl Iterator<Item = &UpperNode<T>> + '_ {
        self.table.values().filter_map(RootEntry::child)
    }

    /// Upper nodes in key order, with mutable access.
    pub fn children_mut(&mut self) -> impl Iterator<Item = &mut UpperNode<T>> + '_ {
        self.table.values_mut().filter_map(RootEntry::child_mut)
    }

    /// Number of upper nodes.
    pub fn child_count(&self) -> usize {
        self.children().count()
    }

    /// Number of root tiles.
    pub fn tile_count(&self) -> usize {
        self.table.values().filter(|e| e.tile().is_some()).count()
    }

    /// Root tiles as `(origin, value)` pairs.
    pub fn active_tiles(&self) -> impl Iterator<Item = (Coord, T)> + '_ {
        self.table
            .iter()
            .filter_map(|(k, e)| e.tile().map(|v| (*k, v)))
    }

    /// Upper node covering `c`, materializing a tile or empty entry first.
    pub fn touch_child(&mut self, c: Coord) -> &mut UpperNode<T> {
        let key = Self::key(c);
        let background = self.background;
        let entry = self
            .table
            .entry(key)
            .or_insert_with(|| RootEntry::Child(Box::new(UpperNode::new(key, background, false))));
        if let RootEntry::Tile(v) = *entry {
            *entry = RootEntry::Child(Box::new(UpperNode::new(key, v, true)));
        }
        match entry {
            RootEntry::Child(child) => child,
            RootEntry::Tile(_) => unreachable!("root entry holds a child after insertion"),
        }
    }

    /// Value at `c`, active or not.
    pub fn get_value(&self, c: Coord) -> T {
        match self.entry(c) {
            None => self.background,
            Some(RootEntry::Tile(v)) => *v,
            Some(RootEntry::Child(child)) => child.get_value(c, self.background),
        }
    }

    /// Value at `c` and whether it is active.
    pub fn probe_value(&self, c: Coord) -> (T, bool) {
        match self.entry(c) {
            None => (self.background, false),
            Some(RootEntry::Tile(v)) => (*v, true),
            Some(RootEntry::Child(child)) => child.probe_value(c, self.background),
        }
    }

    /// Level that terminates a descent to `c`, or `None` if no root entry
    /// covers it.
    pub fn get_value_depth(&self, c: Coord) -> Option<usize> {
        match self.entry(c)? {
            RootEntry::Tile(_) => Some(ROOT_LEVEL),
            RootEntry::Child(child) => Some(child.get_value_depth(c)),
        }
    }

    /// Set the voxel at `c` active with `value`.
    pub fn set_value_on(&mut self, c: Coord, value: T) {
        if self.entry(c).and_then(RootEntry::tile) == Some(value) {
            return;
        }
        let background = self.background;
        self.touch_child(c).set_value_on(c, value, background);
    }

    /// Set the voxel at `c` inactive with `value`.
    pub fn set_value_off(&mut self, c: Coord, value: T) {
        if self.entry(c).is_none() && value == self.background {
            return;
        }
        let background = self.background;
        self.touch_child(c).set_value_off(c, value, background);
    }

    /// Turn the voxel at `c` on or off, keeping its value.
    pub fn set_active_state(&mut self, c: Coord, on: bool) {
        match self.entry(c) {
            Some(RootEntry::Tile(_)) if on => return,
            None if !on => return,
            _ => {}
        }
        let background = self.background;
        self.touch_child(c).set_active_state(c, on, background);
    }

    /// Place a tile at `level`. The caller validates `level`.
    pub fn add_tile(&mut self, level: usize, c: Coord, value: T, active: bool) {
        if level == ROOT_LEVEL {
            let key = Self::key(c);
            if active {
                self.table.insert(key, RootEntry::Tile(value));
            } else {
                self.table.remove(&key);
            }
            return;
        }
        let background = self.background;
        self.touch_child(c).add_tile(level, c, value, active, background);
    }

    /// Expand every active tile into leaves.
    pub fn voxelize(&mut self) {
        let background = self.background;
        self.table.par_iter_mut().for_each(|(key, entry)| {
            if let RootEntry::Tile(v) = *entry {
                *entry = RootEntry::Child(Box::new(UpperNode::new(*key, v, true)));
            }
            if let RootEntry::Child(child) = entry {
                child.voxelize(background);
            }
        });
    }

    /// Collapse uniform subtrees into tiles and drop empty entries.
    pub fn prune(&mut self) {
        let background = self.background;
        self.table.par_iter_mut().for_each(|(_, entry)| {
            if let RootEntry::Child(child) = entry {
                child.prune(background);
                if let Some(Uniform::Active(v)) = child.uniform(background) {
                    *entry = RootEntry::Tile(v);
                }
            }
        });
        self.table.retain(|_, entry| match entry {
            RootEntry::Tile(_) => true,
            RootEntry::Child(child) => child.uniform(background) != Some(Uniform::Inactive),
        });
    }

    /// Recompute the active bits of every internal node.
    pub fn sync_active(&mut self) {
        self.table.par_iter_mut().for_each(|(_, entry)| {
            if let RootEntry::Child(child) = entry {
                child.sync_active();
            }
        });
    }

    /// Number of active voxels, tiles included.
    pub fn active_voxel_count(&self) -> u64 {
        let tile_voxels = 1_u64 << (3 * UPPER_TOTAL);
        self.table
            .values()
            .map(|entry| match entry {
                RootEntry::Tile(_) => tile_voxels,
                RootEntry::Child(child) => child.active_voxel_count(),
            })
            .sum()
    }

    /// Number of active tiles at every level above the leaves.
    pub fn active_tile_count(&self) -> u64 {
        self.table
            .values()
            .map(|entry| match entry {
                RootEntry::Tile(_) => 1,
                RootEntry::Child(child) => child.active_tile_count(),
            })
            .sum()
    }

    /// Number of nodes per level, root first.
    pub fn node_counts(&self) -> [usize; TREE_DEPTH] {
        let mut counts = [0; TREE_DEPTH];
        counts[ROOT_LEVEL] = 1;
        for child in self.children() {
            child.node_counts(&mut counts);
        }
        counts
    }

    /// Approximate bytes owned by the root and its nodes.
    pub fn memory_usage(&self) -> usize {
        let entry_size = std::mem::size_of::<(Coord, RootEntry<T>)>();
        std::mem::size_of::<Self>()
            + self.table.len() * entry_size
            + self.children().map(|child| child.memory_usage()).sum::<usize>()
    }

    /// Smallest box holding every active voxel.
    pub fn active_bbox(&self) -> Option<CoordBBox> {
        let mut bbox = None;
        for (key, entry) in &self.table {
            match entry {
                RootEntry::Tile(_) => {
                    merge_bbox(&mut bbox, CoordBBox::cube(*key, 1 << UPPER_TOTAL));
                }
                RootEntry::Child(child) => child.expand_active_bbox(&mut bbox),
            }
        }
        bbox
    }
}
