//! Internal nodes: fixed fan-out containers of tiles and children.

use rayon::prelude::*;
use voxtree_core::constants::{LOWER_LOG2DIM, TREE_DEPTH, UPPER_LOG2DIM};
use voxtree_core::{Coord, CoordBBox};

use crate::leaf::LeafNode;
use crate::mask::BitMask;
use crate::node::{merge_bbox, TreeNode, Uniform};
use crate::Value;

/// Content of one internal node slot.
#[derive(Clone, Debug)]
pub enum Slot<T, C> {
    /// Background, no storage.
    Inactive,
    /// Uniform active value covering the whole slot.
    Tile(T),
    /// Owned node at the next level down.
    Child(Box<C>),
}

impl<T: Copy, C> Slot<T, C> {
    /// True for a background slot.
    pub const fn is_inactive(&self) -> bool {
        matches!(self, Self::Inactive)
    }

    /// True for an active tile.
    pub const fn is_tile(&self) -> bool {
        matches!(self, Self::Tile(_))
    }

    /// True if the slot owns a child node.
    pub const fn is_child(&self) -> bool {
        matches!(self, Self::Child(_))
    }

    /// The tile value, if this slot is an active tile.
    pub const fn tile(&self) -> Option<T> {
        match self {
            Self::Tile(v) => Some(*v),
            _ => None,
        }
    }

    /// The child node, if any.
    pub fn child(&self) -> Option<&C> {
        match self {
            Self::Child(child) => Some(&**child),
            _ => None,
        }
    }

    /// The child node with mutable access, if any.
    pub fn child_mut(&mut self) -> Option<&mut C> {
        match self {
            Self::Child(child) => Some(&mut **child),
            _ => None,
        }
    }

    /// Return the child, first replacing a tile or inactive slot with the
    /// node built by `make` from the tile value.
    pub(crate) fn child_or_insert_with(&mut self, make: impl FnOnce(Option<T>) -> C) -> &mut C {
        if !self.is_child() {
            let child = make(self.tile());
            *self = Self::Child(Box::new(child));
        }
        match self {
            Self::Child(child) => child,
            Self::Tile(_) | Self::Inactive => unreachable!("slot holds a child after insertion"),
        }
    }
}

/// Build the child that replaces a tile (`Some`) or an inactive slot.
pub(crate) fn materialize<T: Value, C: TreeNode<T>>(
    origin: Coord,
    tile: Option<T>,
    background: T,
) -> C {
    match tile {
        Some(value) => C::new_filled(origin, value, true),
        None => C::new_filled(origin, background, false),
    }
}

/// Internal node with `(1 << LOG2DIM)³` slots of child type `C`.
///
/// Active bit `n` is set iff slot `n` is an active tile or a child with at
/// least one active voxel below it.
#[derive(Clone, Debug)]
pub struct InternalNode<T, C, const LOG2DIM: u32> {
    pub(crate) origin: Coord,
    pub(crate) slots: Box<[Slot<T, C>]>,
    pub(crate) active: BitMask,
}

/// Internal node whose children are leaves (16³ slots, 128³ voxels).
pub type LowerNode<T> = InternalNode<T, LeafNode<T>, { LOWER_LOG2DIM }>;
/// Internal node whose children are lower nodes (32³ slots, 4096³ voxels).
pub type UpperNode<T> = InternalNode<T, LowerNode<T>, { UPPER_LOG2DIM }>;

impl<T: Value, C: TreeNode<T>, const LOG2DIM: u32> InternalNode<T, C, LOG2DIM> {
    /// Slots per axis.
    pub const DIM: usize = 1 << LOG2DIM;
    /// Total slots.
    pub const SIZE: usize = 1 << (3 * LOG2DIM);
    /// log2 of the voxels per axis covered by one slot.
    pub const SLOT_LOG2: u32 = C::TOTAL;
    /// log2 of the voxels per axis covered by the node.
    pub const NODE_LOG2: u32 = LOG2DIM + C::TOTAL;

    /// Create a node at `origin` (aligned down) with every slot an active
    /// tile of `value`, or every slot inactive.
    pub fn new(origin: Coord, value: T, active: bool) -> Self {
        let slots = (0..Self::SIZE)
            .map(|_| if active { Slot::Tile(value) } else { Slot::Inactive })
            .collect();
        Self {
            origin: origin.aligned(Self::NODE_LOG2),
            slots,
            active: BitMask::filled(Self::SIZE, active),
        }
    }

    /// Slot index of the coordinate `c`.
    #[inline]
    pub const fn coord_to_offset(c: Coord) -> usize {
        let m = (1 << LOG2DIM) - 1;
        let s = C::TOTAL;
        ((((c.x >> s) & m) as usize) << (2 * LOG2DIM))
            | ((((c.y >> s) & m) as usize) << LOG2DIM)
            | (((c.z >> s) & m) as usize)
    }

    /// Origin of slot `n` of a node at `origin`.
    #[inline]
    pub const fn slot_origin_of(origin: Coord, n: usize) -> Coord {
        let m = Self::DIM - 1;
        let s = C::TOTAL;
        origin.offset_by(
            ((n >> (2 * LOG2DIM)) << s) as i32,
            (((n >> LOG2DIM) & m) << s) as i32,
            ((n & m) << s) as i32,
        )
    }

    /// Origin of slot `n` of this node.
    #[inline]
    pub const fn slot_origin(&self, n: usize) -> Coord {
        Self::slot_origin_of(self.origin, n)
    }

    /// Origin of the node, aligned to its extent.
    #[inline]
    pub const fn origin(&self) -> Coord {
        self.origin
    }

    /// Voxel box covered by this node.
    pub const fn bbox(&self) -> CoordBBox {
        CoordBBox::cube(self.origin, 1 << Self::NODE_LOG2)
    }

    /// Slot `n`.
    #[inline]
    pub fn slot(&self, n: usize) -> &Slot<T, C> {
        &self.slots[n]
    }

    /// All slots in offset order.
    pub fn slots(&self) -> &[Slot<T, C>] {
        &self.slots
    }

    /// Active bit per slot.
    pub const fn value_mask(&self) -> &BitMask {
        &self.active
    }

    /// Child at slot `n`, if that slot holds one.
    pub fn child(&self, n: usize) -> Option<&C> {
        self.slots[n].child()
    }

    /// Mutable child at slot `n`, if that slot holds one.
    pub fn child_mut(&mut self, n: usize) -> Option<&mut C> {
        self.slots[n].child_mut()
    }

    /// Child at slot `n`, materializing a tile or inactive slot first.
    pub fn touch_child(&mut self, n: usize, background: T) -> &mut C {
        let origin = self.slot_origin(n);
        let child =
            self.slots[n].child_or_insert_with(|tile| materialize(origin, tile, background));
        self.active.set(n, child.has_active());
        child
    }

    /// Install `child` at slot `n`, dropping whatever was there.
    pub fn set_child(&mut self, n: usize, child: Box<C>) {
        self.active.set(n, child.has_active());
        self.slots[n] = Slot::Child(child);
    }

    /// Replace slot `n` with a tile, dropping any child.
    ///
    /// Inactive tiles hold no value, so `value` is discarded when `active`
    /// is false.
    pub fn set_tile(&mut self, n: usize, value: T, active: bool) {
        self.slots[n] = if active { Slot::Tile(value) } else { Slot::Inactive };
        self.active.set(n, active);
    }

    /// Child nodes in slot order.
    pub fn children(&self) -> impl Iterator<Item = &C> + '_ {
        self.slots.iter().filter_map(Slot::child)
    }

    /// Child nodes in slot order, with mutable access.
    pub fn children_mut(&mut self) -> impl Iterator<Item = &mut C> + '_ {
        self.slots.iter_mut().filter_map(Slot::child_mut)
    }

    /// Number of slots holding a child.
    pub fn child_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_child()).count()
    }

    /// Active tiles as `(tile origin, value)` pairs.
    pub fn active_tiles(&self) -> impl Iterator<Item = (Coord, T)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(n, slot)| slot.tile().map(|v| (self.slot_origin(n), v)))
    }

    /// Active tiles with mutable access to their values.
    pub fn active_tiles_mut(&mut self) -> impl Iterator<Item = (Coord, &mut T)> + '_ {
        let origin = self.origin;
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(move |(n, slot)| match slot {
                Slot::Tile(v) => Some((Self::slot_origin_of(origin, n), v)),
                _ => None,
            })
    }
}

impl<T: Value, C: TreeNode<T>, const LOG2DIM: u32> TreeNode<T> for InternalNode<T, C, LOG2DIM> {
    const LEVEL: usize = C::LEVEL - 1;
    const TOTAL: u32 = LOG2DIM + C::TOTAL;

    fn new_filled(origin: Coord, value: T, active: bool) -> Self {
        Self::new(origin, value, active)
    }

    fn origin(&self) -> Coord {
        self.origin
    }

    fn get_value(&self, c: Coord, background: T) -> T {
        match &self.slots[Self::coord_to_offset(c)] {
            Slot::Inactive => background,
            Slot::Tile(v) => *v,
            Slot::Child(child) => child.get_value(c, background),
        }
    }

    fn probe_value(&self, c: Coord, background: T) -> (T, bool) {
        match &self.slots[Self::coord_to_offset(c)] {
            Slot::Inactive => (background, false),
            Slot::Tile(v) => (*v, true),
            Slot::Child(child) => child.probe_value(c, background),
        }
    }

    fn get_value_depth(&self, c: Coord) -> usize {
        match &self.slots[Self::coord_to_offset(c)] {
            Slot::Inactive | Slot::Tile(_) => Self::LEVEL,
            Slot::Child(child) => child.get_value_depth(c),
        }
    }

    fn set_value_on(&mut self, c: Coord, value: T, background: T) {
        let n = Self::coord_to_offset(c);
        if self.slots[n].tile() == Some(value) {
            return;
        }
        self.touch_child(n, background).set_value_on(c, value, background);
        self.active.set_on(n);
    }

    fn set_value_off(&mut self, c: Coord, value: T, background: T) {
        let n = Self::coord_to_offset(c);
        if self.slots[n].is_inactive() && value == background {
            return;
        }
        let child = self.touch_child(n, background);
        child.set_value_off(c, value, background);
        let on = child.has_active();
        self.active.set(n, on);
    }

    fn set_active_state(&mut self, c: Coord, on: bool, background: T) {
        let n = Self::coord_to_offset(c);
        match self.slots[n] {
            Slot::Tile(_) if on => return,
            Slot::Inactive if !on => return,
            _ => {}
        }
        let child = self.touch_child(n, background);
        child.set_active_state(c, on, background);
        let any = child.has_active();
        self.active.set(n, any);
    }

    fn add_tile(&mut self, level: usize, c: Coord, value: T, active: bool, background: T) {
        let n = Self::coord_to_offset(c);
        if level <= Self::LEVEL {
            self.set_tile(n, value, active);
            return;
        }
        let child = self.touch_child(n, background);
        child.add_tile(level, c, value, active, background);
        let any = child.has_active();
        self.active.set(n, any);
    }

    fn has_active(&self) -> bool {
        self.active.any()
    }

    fn voxelize(&mut self, background: T) {
        let origin = self.origin;
        self.slots
            .par_iter_mut()
            .enumerate()
            .for_each(|(n, slot)| match slot {
                Slot::Tile(v) => {
                    let mut child = C::new_filled(Self::slot_origin_of(origin, n), *v, true);
                    child.voxelize(background);
                    *slot = Slot::Child(Box::new(child));
                }
                Slot::Child(child) => child.voxelize(background),
                Slot::Inactive => {}
            });
    }

    fn prune(&mut self, background: T) {
        self.slots.par_iter_mut().for_each(|slot| {
            if let Slot::Child(child) = slot {
                child.prune(background);
                match child.uniform(background) {
                    Some(Uniform::Active(v)) => *slot = Slot::Tile(v),
                    Some(Uniform::Inactive) => *slot = Slot::Inactive,
                    None => {}
                }
            }
        });
        for (n, slot) in self.slots.iter().enumerate() {
            let on = match slot {
                Slot::Inactive => false,
                Slot::Tile(_) => true,
                Slot::Child(child) => child.has_active(),
            };
            self.active.set(n, on);
        }
    }

    fn uniform(&self, _background: T) -> Option<Uniform<T>> {
        match &self.slots[0] {
            Slot::Tile(first) => self
                .slots
                .iter()
                .all(|s| s.tile() == Some(*first))
                .then_some(Uniform::Active(*first)),
            Slot::Inactive => self
                .slots
                .iter()
                .all(Slot::is_inactive)
                .then_some(Uniform::Inactive),
            Slot::Child(_) => None,
        }
    }

    fn sync_active(&mut self) -> bool {
        let bits: Vec<bool> = self
            .slots
            .par_iter_mut()
            .map(|slot| match slot {
                Slot::Inactive => false,
                Slot::Tile(_) => true,
                Slot::Child(child) => child.sync_active(),
            })
            .collect();
        for (n, on) in bits.into_iter().enumerate() {
            self.active.set(n, on);
        }
        self.active.any()
    }

    fn active_voxel_count(&self) -> u64 {
        let tile_voxels = 1_u64 << (3 * C::TOTAL);
        self.slots
            .iter()
            .map(|slot| match slot {
                Slot::Inactive => 0,
                Slot::Tile(_) => tile_voxels,
                Slot::Child(child) => child.active_voxel_count(),
            })
            .sum()
    }

    fn active_tile_count(&self) -> u64 {
        self.slots
            .iter()
            .map(|slot| match slot {
                Slot::Inactive => 0,
                Slot::Tile(_) => 1,
                Slot::Child(child) => child.active_tile_count(),
            })
            .sum()
    }

    fn node_counts(&self, counts: &mut [usize; TREE_DEPTH]) {
        counts[Self::LEVEL] += 1;
        for child in self.children() {
            child.node_counts(counts);
        }
    }

    fn memory_usage(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.slots.len() * std::mem::size_of::<Slot<T, C>>()
            + self.active.memory_usage()
            + self.children().map(|child| child.memory_usage()).sum::<usize>()
    }

    fn expand_active_bbox(&self, bbox: &mut Option<CoordBBox>) {
        for (n, slot) in self.slots.iter().enumerate() {
            match slot {
                Slot::Inactive => {}
                Slot::Tile(_) => {
                    merge_bbox(bbox, CoordBBox::cube(self.slot_origin(n), 1 << C::TOTAL));
                }
                Slot::Child(child) => child.expand_active_bbox(bbox),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxtree_core::constants::{LEAF_LEVEL, LOWER_LEVEL, UPPER_LEVEL};

    const BG: f32 = 0.0;

    #[test]
    fn offsets_match_slot_origins() {
        let node = LowerNode::<f32>::new(Coord::new(-128, 0, 128), BG, false);
        assert_eq!(node.origin(), Coord::new(-128, 0, 128));
        for n in [0, 1, 15, 16, 255, 256, 4095] {
            let origin = node.slot_origin(n);
            assert!(node.bbox().contains(origin));
            assert_eq!(LowerNode::<f32>::coord_to_offset(origin), n);
            assert_eq!(LowerNode::<f32>::coord_to_offset(origin.offset_by(7, 7, 7)), n);
        }
    }

    #[test]
    fn inactive_node_reads_background() {
        let node = LowerNode::<f32>::new(Coord::ZERO, BG, false);
        assert_eq!(node.get_value(Coord::new(5, 6, 7), BG), BG);
        assert_eq!(node.probe_value(Coord::new(5, 6, 7), BG), (BG, false));
        assert_eq!(node.get_value_depth(Coord::new(5, 6, 7)), LOWER_LEVEL);
        assert!(!node.has_active());
    }

    #[test]
    fn set_value_materializes_leaf() {
        let mut node = LowerNode::<f32>::new(Coord::ZERO, BG, false);
        let c = Coord::new(9, 10, 11);
        node.set_value_on(c, 2.5, BG);
        assert_eq!(node.get_value(c, BG), 2.5);
        assert_eq!(node.get_value_depth(c), LEAF_LEVEL);
        assert_eq!(node.child_count(), 1);
        assert!(node.value_mask().is_on(LowerNode::<f32>::coord_to_offset(c)));
    }

    #[test]
    fn writing_tile_value_keeps_tile() {
        let mut node = LowerNode::<f32>::new(Coord::ZERO, 1.0, true);
        node.set_value_on(Coord::new(3, 3, 3), 1.0, BG);
        assert_eq!(node.child_count(), 0);

        node.set_value_on(Coord::new(3, 3, 3), 2.0, BG);
        assert_eq!(node.child_count(), 1);
        assert_eq!(node.get_value(Coord::new(3, 3, 3), BG), 2.0);
        assert_eq!(node.get_value(Coord::new(4, 3, 3), BG), 1.0);
    }

    #[test]
    fn clearing_last_active_voxel_clears_slot_bit() {
        let mut node = LowerNode::<f32>::new(Coord::ZERO, BG, false);
        let c = Coord::new(1, 2, 3);
        node.set_value_on(c, 4.0, BG);
        node.set_active_state(c, false, BG);
        assert!(!node.has_active());
        assert_eq!(node.probe_value(c, BG), (4.0, false));
    }

    #[test]
    fn add_tile_discards_subtree() {
        let mut node = UpperNode::<f32>::new(Coord::ZERO, BG, false);
        let c = Coord::new(200, 10, 10);
        node.set_value_on(c, 3.0, BG);
        node.add_tile(UPPER_LEVEL, c, 7.0, true, BG);
        assert_eq!(node.child_count(), 0);
        assert_eq!(node.get_value(c, BG), 7.0);
        assert_eq!(node.get_value_depth(c), UPPER_LEVEL);

        node.add_tile(LOWER_LEVEL, c, 8.0, true, BG);
        assert_eq!(node.get_value_depth(c), LOWER_LEVEL);
        assert_eq!(node.get_value(c, BG), 8.0);
        assert_eq!(node.get_value(c.offset_by(8, 0, 0), BG), 7.0);
    }

    #[test]
    fn voxelize_expands_tiles_into_leaves() {
        let mut node = LowerNode::<f32>::new(Coord::ZERO, BG, false);
        node.set_tile(0, 5.0, true);
        node.voxelize(BG);
        assert_eq!(node.child_count(), 1);
        assert_eq!(node.active_tile_count(), 0);
        assert_eq!(node.active_voxel_count(), 512);
        assert_eq!(node.get_value(Coord::new(7, 7, 7), BG), 5.0);
        assert_eq!(node.get_value_depth(Coord::new(7, 7, 7)), LEAF_LEVEL);
    }

    #[test]
    fn prune_collapses_uniform_children() {
        let mut node = LowerNode::<f32>::new(Coord::ZERO, BG, false);
        node.set_tile(0, 5.0, true);
        node.voxelize(BG);
        node.set_value_on(Coord::new(100, 0, 0), 1.0, BG);
        node.set_active_state(Coord::new(100, 0, 0), false, BG);
        node.set_value_off(Coord::new(100, 0, 0), BG, BG);

        node.prune(BG);
        assert_eq!(node.child_count(), 0);
        assert_eq!(node.slot(0).tile(), Some(5.0));
        assert!(node.slot(LowerNode::<f32>::coord_to_offset(Coord::new(100, 0, 0))).is_inactive());
        assert_eq!(node.active_voxel_count(), 512);
    }

    #[test]
    fn uniform_internal_node() {
        let node = LowerNode::<f32>::new(Coord::ZERO, 2.0, true);
        assert_eq!(node.uniform(BG), Some(Uniform::Active(2.0)));
        let node = LowerNode::<f32>::new(Coord::ZERO, BG, false);
        assert_eq!(node.uniform(BG), Some(Uniform::Inactive));
    }

    #[test]
    fn counts_and_bbox() {
        let mut node = UpperNode::<f32>::new(Coord::ZERO, BG, false);
        node.add_tile(LOWER_LEVEL, Coord::new(8, 0, 0), 1.0, true, BG);
        node.set_value_on(Coord::new(300, 0, 0), 1.0, BG);

        let mut counts = [0; TREE_DEPTH];
        node.node_counts(&mut counts);
        assert_eq!(counts, [0, 1, 2, 1]);
        assert_eq!(node.active_tile_count(), 1);
        assert_eq!(node.active_voxel_count(), 513);

        let mut bbox = None;
        node.expand_active_bbox(&mut bbox);
        assert_eq!(
            bbox,
            Some(CoordBBox::new(Coord::new(8, 0, 0), Coord::new(300, 7, 7)))
        );
    }

    #[test]
    fn active_tiles_mut_edits_in_place() {
        let mut node = LowerNode::<i32>::new(Coord::ZERO, 0, false);
        node.set_tile(3, 4, true);
        for (_, v) in node.active_tiles_mut() {
            *v *= 2;
        }
        assert_eq!(node.active_tiles().collect::<Vec<_>>(), vec![(Coord::new(0, 0, 24), 8)]);
    }
}
