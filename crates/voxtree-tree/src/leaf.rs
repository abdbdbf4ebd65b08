//! Leaf nodes: dense 8³ voxel blocks.

use voxtree_core::constants::{LEAF_LEVEL, LEAF_LOG2DIM, LEAF_TOTAL, TREE_DEPTH};
use voxtree_core::{Coord, CoordBBox};

use crate::mask::BitMask;
use crate::node::{TreeNode, Uniform};
use crate::Value;

/// Voxels per axis in a leaf.
pub const LEAF_DIM: usize = 1 << LEAF_LOG2DIM;
/// Voxels in a leaf.
pub const LEAF_SIZE: usize = 1 << (3 * LEAF_LOG2DIM);

/// Bottom-level block storing one value and one active flag per voxel.
#[derive(Clone, Debug)]
pub struct LeafNode<T> {
    pub(crate) origin: Coord,
    pub(crate) values: Box<[T]>,
    pub(crate) active: BitMask,
}

impl<T: Value> LeafNode<T> {
    /// Create a leaf at `origin` with every voxel set to `value`.
    ///
    /// `origin` is aligned down to the leaf grid.
    pub fn new(origin: Coord, value: T, active: bool) -> Self {
        Self {
            origin: origin.aligned(LEAF_TOTAL),
            values: vec![value; LEAF_SIZE].into_boxed_slice(),
            active: BitMask::filled(LEAF_SIZE, active),
        }
    }

    /// Linear voxel index of `c` within its leaf.
    #[inline]
    pub const fn coord_to_offset(c: Coord) -> usize {
        let m = (1 << LEAF_LOG2DIM) - 1;
        (((c.x & m) as usize) << (2 * LEAF_LOG2DIM))
            | (((c.y & m) as usize) << LEAF_LOG2DIM)
            | ((c.z & m) as usize)
    }

    /// Global coordinate of voxel `n` of this leaf.
    #[inline]
    pub const fn offset_to_coord(&self, n: usize) -> Coord {
        leaf_voxel(self.origin, n)
    }

    /// Origin of the leaf, aligned to 8.
    #[inline]
    pub const fn origin(&self) -> Coord {
        self.origin
    }

    /// Voxel box covered by this leaf.
    pub const fn bbox(&self) -> CoordBBox {
        CoordBBox::cube(self.origin, LEAF_DIM as i32)
    }

    /// Value at `c`, active or not.
    #[inline]
    pub fn get_value(&self, c: Coord) -> T {
        self.values[Self::coord_to_offset(c)]
    }

    /// Whether the voxel at `c` is active.
    #[inline]
    pub fn is_value_on(&self, c: Coord) -> bool {
        self.active.is_on(Self::coord_to_offset(c))
    }

    /// Value and active state of the voxel at `c`.
    #[inline]
    pub fn probe_value(&self, c: Coord) -> (T, bool) {
        let n = Self::coord_to_offset(c);
        (self.values[n], self.active.is_on(n))
    }

    /// Set the voxel at `c` to `value` and mark it active.
    #[inline]
    pub fn set_value_on(&mut self, c: Coord, value: T) {
        let n = Self::coord_to_offset(c);
        self.values[n] = value;
        self.active.set_on(n);
    }

    /// Set the voxel at `c` to `value` and mark it inactive.
    #[inline]
    pub fn set_value_off(&mut self, c: Coord, value: T) {
        let n = Self::coord_to_offset(c);
        self.values[n] = value;
        self.active.set_off(n);
    }

    /// Change the active state of the voxel at `c`, keeping its value.
    #[inline]
    pub fn set_active_state(&mut self, c: Coord, on: bool) {
        self.active.set(Self::coord_to_offset(c), on);
    }

    /// Set every voxel to `value` with the given active state.
    pub fn fill(&mut self, value: T, active: bool) {
        self.values.fill(value);
        self.active.fill(active);
    }

    /// Voxel values in offset order.
    pub fn values(&self) -> &[T] {
        &self.values
    }

    /// Mutable voxel values in offset order.
    ///
    /// Active states are untouched; use the `set_*` methods to toggle them.
    pub fn values_mut(&mut self) -> &mut [T] {
        &mut self.values
    }

    /// Active bit per voxel.
    pub const fn value_mask(&self) -> &BitMask {
        &self.active
    }

    /// Number of active voxels.
    pub fn active_voxel_count(&self) -> usize {
        self.active.count_on()
    }

    /// True if any voxel is active.
    pub fn has_active(&self) -> bool {
        self.active.any()
    }

    /// Active voxels as `(coordinate, value)` pairs.
    pub fn active_values(&self) -> impl Iterator<Item = (Coord, T)> + '_ {
        self.active
            .iter_on()
            .map(|n| (self.offset_to_coord(n), self.values[n]))
    }

    /// Active voxels with mutable access to their values.
    pub fn active_values_mut(&mut self) -> impl Iterator<Item = (Coord, &mut T)> + '_ {
        let Self {
            origin,
            values,
            active,
        } = self;
        let origin = *origin;
        let active: &BitMask = active;
        values
            .iter_mut()
            .enumerate()
            .filter(move |(n, _)| active.is_on(*n))
            .map(move |(n, value)| (leaf_voxel(origin, n), value))
    }
}

#[inline]
pub(crate) const fn leaf_voxel(origin: Coord, n: usize) -> Coord {
    let m = LEAF_DIM - 1;
    origin.offset_by(
        (n >> (2 * LEAF_LOG2DIM)) as i32,
        ((n >> LEAF_LOG2DIM) & m) as i32,
        (n & m) as i32,
    )
}

impl<T: Value> TreeNode<T> for LeafNode<T> {
    const LEVEL: usize = LEAF_LEVEL;
    const TOTAL: u32 = LEAF_TOTAL;

    fn new_filled(origin: Coord, value: T, active: bool) -> Self {
        Self::new(origin, value, active)
    }

    fn origin(&self) -> Coord {
        self.origin
    }

    fn get_value(&self, c: Coord, _background: T) -> T {
        Self::get_value(self, c)
    }

    fn probe_value(&self, c: Coord, _background: T) -> (T, bool) {
        Self::probe_value(self, c)
    }

    fn get_value_depth(&self, _c: Coord) -> usize {
        LEAF_LEVEL
    }

    fn set_value_on(&mut self, c: Coord, value: T, _background: T) {
        Self::set_value_on(self, c, value);
    }

    fn set_value_off(&mut self, c: Coord, value: T, _background: T) {
        Self::set_value_off(self, c, value);
    }

    fn set_active_state(&mut self, c: Coord, on: bool, _background: T) {
        Self::set_active_state(self, c, on);
    }

    fn add_tile(&mut self, _level: usize, c: Coord, value: T, active: bool, _background: T) {
        let n = Self::coord_to_offset(c);
        self.values[n] = value;
        self.active.set(n, active);
    }

    fn has_active(&self) -> bool {
        self.active.any()
    }

    fn voxelize(&mut self, _background: T) {}

    fn prune(&mut self, _background: T) {}

    fn uniform(&self, background: T) -> Option<Uniform<T>> {
        let first = self.values[0];
        if self.values.iter().any(|&v| v != first) {
            return None;
        }
        if self.active.all() {
            Some(Uniform::Active(first))
        } else if !self.active.any() && first == background {
            Some(Uniform::Inactive)
        } else {
            None
        }
    }

    fn sync_active(&mut self) -> bool {
        self.active.any()
    }

    fn active_voxel_count(&self) -> u64 {
        self.active.count_on() as u64
    }

    fn active_tile_count(&self) -> u64 {
        0
    }

    fn node_counts(&self, counts: &mut [usize; TREE_DEPTH]) {
        counts[LEAF_LEVEL] += 1;
    }

    fn memory_usage(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.values.len() * std::mem::size_of::<T>()
            + self.active.memory_usage()
    }

    fn expand_active_bbox(&self, bbox: &mut Option<CoordBBox>) {
        for n in self.active.iter_on() {
            let c = self.offset_to_coord(n);
            match bbox {
                Some(b) => b.expand(c),
                None => *bbox = Some(CoordBBox::point(c)),
            }
        }
    }
}
