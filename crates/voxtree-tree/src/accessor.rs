//! Cached-path value accessors.
//!
//! An accessor remembers the node it last reached at each level below the
//! root, keyed by the node's origin. A lookup tests the cached leaf, lower
//! and upper nodes in that order and resumes the descent from the first one
//! that covers the coordinate; only a full miss goes back to the root table.
//! Coherent access patterns therefore skip most of the descent.
//!
//! Accessors are cheap to create and meant to be used by one thread at a
//! time; make one per worker.

use std::ptr::NonNull;

use voxtree_core::constants::{
    LEAF_LEVEL, LEAF_TOTAL, LOWER_LEVEL, LOWER_TOTAL, ROOT_LEVEL, TREE_DEPTH, UPPER_LEVEL,
    UPPER_TOTAL,
};
use voxtree_core::{Coord, Error, Result};

use crate::internal::{LowerNode, Slot, UpperNode};
use crate::leaf::LeafNode;
use crate::root::{RootEntry, RootNode};
use crate::Value;

/// Outcome of a descent.
#[derive(Clone, Copy)]
enum Hit<L, T> {
    /// No root entry covers the coordinate.
    Empty,
    /// Inactive slot at the given level.
    Inactive(usize),
    /// Active tile at the given level.
    Tile(usize, T),
    Leaf(L),
}

impl<L, T: Value> Hit<L, T> {
    fn depth(&self) -> Option<usize> {
        match self {
            Self::Empty => None,
            Self::Inactive(level) | Self::Tile(level, _) => Some(*level),
            Self::Leaf(_) => Some(LEAF_LEVEL),
        }
    }
}

/// Cache entry covering `c`, if there is one.
#[inline]
fn cached<P: Copy>(entry: Option<(Coord, P)>, c: Coord, log2: u32) -> Option<P> {
    match entry {
        Some((origin, node)) if origin == c.aligned(log2) => Some(node),
        _ => None,
    }
}

type LeafPtr<T> = NonNull<LeafNode<T>>;

/// Deepest cached level covering `c`.
fn deepest_cached<U: Copy, L: Copy, F: Copy>(
    upper: Option<(Coord, U)>,
    lower: Option<(Coord, L)>,
    leaf: Option<(Coord, F)>,
    c: Coord,
) -> Option<usize> {
    if cached(leaf, c, LEAF_TOTAL).is_some() {
        Some(LEAF_LEVEL)
    } else if cached(lower, c, LOWER_TOTAL).is_some() {
        Some(LOWER_LEVEL)
    } else if cached(upper, c, UPPER_TOTAL).is_some() {
        Some(UPPER_LEVEL)
    } else {
        None
    }
}

/// Read-only accessor over a shared tree borrow.
pub struct ValueAccessor<'a, T: Value> {
    root: &'a RootNode<T>,
    upper: Option<(Coord, &'a UpperNode<T>)>,
    lower: Option<(Coord, &'a LowerNode<T>)>,
    leaf: Option<(Coord, &'a LeafNode<T>)>,
}

impl<'a, T: Value> ValueAccessor<'a, T> {
    pub(crate) const fn new(root: &'a RootNode<T>) -> Self {
        Self {
            root,
            upper: None,
            lower: None,
            leaf: None,
        }
    }

    /// Value at `c`, as [`Tree::get_value`](crate::Tree::get_value) would return it.
    pub fn get_value(&mut self, c: Coord) -> T {
        match self.lookup(c) {
            Hit::Empty | Hit::Inactive(_) => self.root.background,
            Hit::Tile(_, v) => v,
            Hit::Leaf(leaf) => leaf.get_value(c),
        }
    }

    /// Value at `c` and whether it is active.
    pub fn probe_value(&mut self, c: Coord) -> (T, bool) {
        match self.lookup(c) {
            Hit::Empty | Hit::Inactive(_) => (self.root.background, false),
            Hit::Tile(_, v) => (v, true),
            Hit::Leaf(leaf) => leaf.probe_value(c),
        }
    }

    /// Whether the voxel or tile covering `c` is active.
    pub fn is_value_on(&mut self, c: Coord) -> bool {
        self.probe_value(c).1
    }

    /// Same result as [`Tree::get_value_depth`](crate::Tree::get_value_depth).
    pub fn get_value_depth(&mut self, c: Coord) -> Option<usize> {
        self.lookup(c).depth()
    }

    /// Deepest cached level whose node covers `c`.
    pub fn cached_level(&self, c: Coord) -> Option<usize> {
        deepest_cached(self.upper, self.lower, self.leaf, c)
    }

    /// Forget every cached node.
    pub fn clear(&mut self) {
        self.upper = None;
        self.lower = None;
        self.leaf = None;
    }

    fn lookup(&mut self, c: Coord) -> Hit<&'a LeafNode<T>, T> {
        if let Some(leaf) = cached(self.leaf, c, LEAF_TOTAL) {
            return Hit::Leaf(leaf);
        }
        if let Some(lower) = cached(self.lower, c, LOWER_TOTAL) {
            return self.lookup_lower(lower, c);
        }
        if let Some(upper) = cached(self.upper, c, UPPER_TOTAL) {
            return self.lookup_upper(upper, c);
        }
        match self.root.entry(c) {
            None => Hit::Empty,
            Some(RootEntry::Tile(v)) => Hit::Tile(ROOT_LEVEL, *v),
            Some(RootEntry::Child(upper)) => {
                let upper = &**upper;
                self.upper = Some((upper.origin, upper));
                self.lower = None;
                self.leaf = None;
                self.lookup_upper(upper, c)
            }
        }
    }

    fn lookup_upper(&mut self, upper: &'a UpperNode<T>, c: Coord) -> Hit<&'a LeafNode<T>, T> {
        match upper.slot(UpperNode::<T>::coord_to_offset(c)) {
            Slot::Inactive => Hit::Inactive(UPPER_LEVEL),
            Slot::Tile(v) => Hit::Tile(UPPER_LEVEL, *v),
            Slot::Child(lower) => {
                let lower = &**lower;
                self.lower = Some((lower.origin, lower));
                self.leaf = None;
                self.lookup_lower(lower, c)
            }
        }
    }

    fn lookup_lower(&mut self, lower: &'a LowerNode<T>, c: Coord) -> Hit<&'a LeafNode<T>, T> {
        match lower.slot(LowerNode::<T>::coord_to_offset(c)) {
            Slot::Inactive => Hit::Inactive(LOWER_LEVEL),
            Slot::Tile(v) => Hit::Tile(LOWER_LEVEL, *v),
            Slot::Child(leaf) => {
                let leaf = &**leaf;
                self.leaf = Some((leaf.origin, leaf));
                Hit::Leaf(leaf)
            }
        }
    }
}

/// Read-write accessor over an exclusive tree borrow.
///
/// Writes go through the cached path and keep the ancestor active bits of
/// the written voxel up to date, so every operation leaves the tree exactly
/// as the matching [`Tree`](crate::Tree) method would.
pub struct ValueAccessorMut<'a, T: Value> {
    root: &'a mut RootNode<T>,
    background: T,
    // Invariants: every cached pointer refers to a boxed node owned by
    // `root`, and each cached node is a descendant of the one cached above
    // it. Nodes are only freed by `add_tile`, which clears the cache.
    upper: Option<(Coord, NonNull<UpperNode<T>>)>,
    lower: Option<(Coord, NonNull<LowerNode<T>>)>,
    leaf: Option<(Coord, LeafPtr<T>)>,
}

impl<'a, T: Value> ValueAccessorMut<'a, T> {
    pub(crate) fn new(root: &'a mut RootNode<T>) -> Self {
        let background = root.background;
        Self {
            root,
            background,
            upper: None,
            lower: None,
            leaf: None,
        }
    }

    /// Value at `c`, as [`Tree::get_value`](crate::Tree::get_value) would return it.
    pub fn get_value(&mut self, c: Coord) -> T {
        match self.lookup(c) {
            Hit::Empty | Hit::Inactive(_) => self.background,
            Hit::Tile(_, v) => v,
            // SAFETY: cached nodes are alive and not aliased mutably while
            // `self` is borrowed.
            Hit::Leaf(leaf) => unsafe { leaf.as_ref() }.get_value(c),
        }
    }

    /// Value at `c` and whether it is active.
    pub fn probe_value(&mut self, c: Coord) -> (T, bool) {
        match self.lookup(c) {
            Hit::Empty | Hit::Inactive(_) => (self.background, false),
            Hit::Tile(_, v) => (v, true),
            // SAFETY: as in `get_value`.
            Hit::Leaf(leaf) => unsafe { leaf.as_ref() }.probe_value(c),
        }
    }

    /// Whether the voxel or tile covering `c` is active.
    pub fn is_value_on(&mut self, c: Coord) -> bool {
        self.probe_value(c).1
    }

    /// Level that terminates a descent to `c`, or `None` outside every root entry.
    pub fn get_value_depth(&mut self, c: Coord) -> Option<usize> {
        self.lookup(c).depth()
    }

    /// Set the voxel at `c` to `value` and mark it active.
    pub fn set_value(&mut self, c: Coord, value: T) {
        if let Hit::Tile(_, v) = self.lookup(c) {
            if v == value {
                return;
            }
        }
        let mut leaf = self.touch_leaf(c);
        // SAFETY: `touch_leaf` returns a live cached leaf.
        unsafe { leaf.as_mut() }.set_value_on(c, value);
        self.propagate_active(c);
    }

    /// Set the voxel at `c` to `value` and mark it inactive.
    pub fn set_value_off(&mut self, c: Coord, value: T) {
        if matches!(self.lookup(c), Hit::Empty | Hit::Inactive(_)) && value == self.background {
            return;
        }
        let mut leaf = self.touch_leaf(c);
        // SAFETY: `touch_leaf` returns a live cached leaf.
        unsafe { leaf.as_mut() }.set_value_off(c, value);
        self.propagate_active(c);
    }

    /// Change the active state of the voxel at `c`, keeping its value.
    pub fn set_active_state(&mut self, c: Coord, on: bool) {
        match self.lookup(c) {
            Hit::Tile(..) if on => return,
            Hit::Empty | Hit::Inactive(_) if !on => return,
            _ => {}
        }
        let mut leaf = self.touch_leaf(c);
        // SAFETY: `touch_leaf` returns a live cached leaf.
        unsafe { leaf.as_mut() }.set_active_state(c, on);
        self.propagate_active(c);
    }

    /// Place a tile, as [`Tree::add_tile`](crate::Tree::add_tile).
    ///
    /// The subtree the tile replaces may contain cached nodes, so the whole
    /// cache is dropped first.
    pub fn add_tile(&mut self, level: usize, c: Coord, value: T, active: bool) -> Result<()> {
        if level >= TREE_DEPTH {
            return Err(Error::InvalidLevel {
                level,
                depth: TREE_DEPTH,
            });
        }
        self.clear();
        self.root.add_tile(level, c, value, active);
        Ok(())
    }

    /// Deepest cached level whose node covers `c`.
    pub fn cached_level(&self, c: Coord) -> Option<usize> {
        deepest_cached(self.upper, self.lower, self.leaf, c)
    }

    /// Forget every cached node.
    pub fn clear(&mut self) {
        self.upper = None;
        self.lower = None;
        self.leaf = None;
    }

    fn lookup(&mut self, c: Coord) -> Hit<LeafPtr<T>, T> {
        if let Some(leaf) = cached(self.leaf, c, LEAF_TOTAL) {
            return Hit::Leaf(leaf);
        }
        if let Some(lower) = cached(self.lower, c, LOWER_TOTAL) {
            return self.lookup_lower(lower, c);
        }
        if let Some(upper) = cached(self.upper, c, UPPER_TOTAL) {
            return self.lookup_upper(upper, c);
        }
        let upper = match self.root.table.get_mut(&RootNode::<T>::key(c)) {
            None => return Hit::Empty,
            Some(RootEntry::Tile(v)) => return Hit::Tile(ROOT_LEVEL, *v),
            Some(RootEntry::Child(upper)) => NonNull::from(&mut **upper),
        };
        self.upper = Some((RootNode::<T>::key(c), upper));
        self.lower = None;
        self.leaf = None;
        self.lookup_upper(upper, c)
    }

    fn lookup_upper(&mut self, upper: NonNull<UpperNode<T>>, c: Coord) -> Hit<LeafPtr<T>, T> {
        // SAFETY: `upper` is a live cached node and no other reference to it
        // exists while `self` is borrowed.
        let node = unsafe { &mut *upper.as_ptr() };
        match &mut node.slots[UpperNode::<T>::coord_to_offset(c)] {
            Slot::Inactive => Hit::Inactive(UPPER_LEVEL),
            Slot::Tile(v) => Hit::Tile(UPPER_LEVEL, *v),
            Slot::Child(lower) => {
                let lower = NonNull::from(&mut **lower);
                self.lower = Some((c.aligned(LOWER_TOTAL), lower));
                self.leaf = None;
                self.lookup_lower(lower, c)
            }
        }
    }

    fn lookup_lower(&mut self, lower: NonNull<LowerNode<T>>, c: Coord) -> Hit<LeafPtr<T>, T> {
        // SAFETY: as in `lookup_upper`.
        let node = unsafe { &mut *lower.as_ptr() };
        match &mut node.slots[LowerNode::<T>::coord_to_offset(c)] {
            Slot::Inactive => Hit::Inactive(LOWER_LEVEL),
            Slot::Tile(v) => Hit::Tile(LOWER_LEVEL, *v),
            Slot::Child(leaf) => {
                let leaf = NonNull::from(&mut **leaf);
                self.leaf = Some((c.aligned(LEAF_TOTAL), leaf));
                Hit::Leaf(leaf)
            }
        }
    }

    /// Leaf containing `c`, materializing tiles and inactive slots on the
    /// way down. Leaves all three cache levels pointing along the path.
    fn touch_leaf(&mut self, c: Coord) -> LeafPtr<T> {
        if let Some(leaf) = cached(self.leaf, c, LEAF_TOTAL) {
            return leaf;
        }
        let background = self.background;
        let lower = if let Some(lower) = cached(self.lower, c, LOWER_TOTAL) {
            lower
        } else {
            let upper = if let Some(upper) = cached(self.upper, c, UPPER_TOTAL) {
                upper
            } else {
                let upper = NonNull::from(self.root.touch_child(c));
                self.upper = Some((RootNode::<T>::key(c), upper));
                upper
            };
            // SAFETY: `upper` is a live cached node, see `lookup_upper`.
            let node = unsafe { &mut *upper.as_ptr() };
            let n = UpperNode::<T>::coord_to_offset(c);
            let lower = NonNull::from(node.touch_child(n, background));
            self.lower = Some((c.aligned(LOWER_TOTAL), lower));
            lower
        };
        // SAFETY: `lower` is a live cached node, see `lookup_upper`.
        let node = unsafe { &mut *lower.as_ptr() };
        let n = LowerNode::<T>::coord_to_offset(c);
        let leaf = NonNull::from(node.touch_child(n, background));
        self.leaf = Some((c.aligned(LEAF_TOTAL), leaf));
        leaf
    }

    /// Refresh the active bits above the cached leaf after a write at `c`.
    fn propagate_active(&mut self, c: Coord) {
        let (Some((_, leaf)), Some((_, lower)), Some((_, upper))) =
            (self.leaf, self.lower, self.upper)
        else {
            return;
        };
        // SAFETY: the three cached nodes are distinct allocations on the
        // path to `c`; `touch_leaf` ran just before.
        let (leaf, lower, upper) =
            unsafe { (leaf.as_ref(), &mut *lower.as_ptr(), &mut *upper.as_ptr()) };
        lower
            .active
            .set(LowerNode::<T>::coord_to_offset(c), leaf.has_active());
        upper
            .active
            .set(UpperNode::<T>::coord_to_offset(c), lower.active.any());
    }
}
