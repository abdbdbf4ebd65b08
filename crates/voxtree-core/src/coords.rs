//! Voxel coordinates and coordinate bounding boxes.

use bytemuck::{Pod, Zeroable};
use glam::{IVec3, U64Vec3};
use serde::{Deserialize, Serialize};

/// Signed index-space position of a single voxel.
///
/// Ordering is lexicographic over `(x, y, z)`, which is the order every
/// iterator in the tree yields coordinates in.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Pod,
    Zeroable,
    Serialize,
    Deserialize,
)]
#[repr(C)]
pub struct Coord {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Coord {
    /// The origin.
    pub const ZERO: Self = Self::new(0, 0, 0);

    /// Create a new coordinate
    #[inline]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Create a coordinate with all three components equal
    #[inline]
    pub const fn splat(v: i32) -> Self {
        Self::new(v, v, v)
    }

    /// Round each component down to a multiple of `1 << log2`.
    ///
    /// This yields the origin of the node of extent `1 << log2` containing
    /// `self`, for negative coordinates too.
    #[inline]
    pub const fn aligned(self, log2: u32) -> Self {
        let mask = !((1i32 << log2) - 1);
        Self::new(self.x & mask, self.y & mask, self.z & mask)
    }

    /// Translate by the given deltas
    #[inline]
    pub const fn offset_by(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }

    /// Component-wise minimum
    #[inline]
    pub fn min(self, other: Self) -> Self {
        Self::new(
            self.x.min(other.x),
            self.y.min(other.y),
            self.z.min(other.z),
        )
    }

    /// Component-wise maximum
    #[inline]
    pub fn max(self, other: Self) -> Self {
        Self::new(
            self.x.max(other.x),
            self.y.max(other.y),
            self.z.max(other.z),
        )
    }

    /// Convert to glam IVec3
    #[inline]
    pub const fn to_ivec3(self) -> IVec3 {
        IVec3::new(self.x, self.y, self.z)
    }
}

impl From<IVec3> for Coord {
    fn from(v: IVec3) -> Self {
        Self::new(v.x, v.y, v.z)
    }
}

impl From<[i32; 3]> for Coord {
    fn from([x, y, z]: [i32; 3]) -> Self {
        Self::new(x, y, z)
    }
}

impl From<(i32, i32, i32)> for Coord {
    fn from((x, y, z): (i32, i32, i32)) -> Self {
        Self::new(x, y, z)
    }
}

/// Inclusive axis-aligned box of voxel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CoordBBox {
    /// Minimum corner (inclusive)
    pub min: Coord,
    /// Maximum corner (inclusive)
    pub max: Coord,
}

impl CoordBBox {
    /// Create a box from its inclusive corners
    #[inline]
    pub const fn new(min: Coord, max: Coord) -> Self {
        Self { min, max }
    }

    /// The cube of `dim` voxels per axis starting at `origin`.
    #[inline]
    pub const fn cube(origin: Coord, dim: i32) -> Self {
        Self::new(origin, origin.offset_by(dim - 1, dim - 1, dim - 1))
    }

    /// Box holding a single voxel
    #[inline]
    pub const fn point(c: Coord) -> Self {
        Self::new(c, c)
    }

    /// Check if a coordinate lies inside the box
    #[inline]
    pub const fn contains(&self, c: Coord) -> bool {
        c.x >= self.min.x
            && c.x <= self.max.x
            && c.y >= self.min.y
            && c.y <= self.max.y
            && c.z >= self.min.z
            && c.z <= self.max.z
    }

    /// Check if `other` lies entirely inside this box
    #[inline]
    pub const fn contains_bbox(&self, other: &Self) -> bool {
        self.contains(other.min) && self.contains(other.max)
    }

    /// Voxels per axis.
    ///
    /// A box spanning every `i32` has 2³² voxels per axis, which does not
    /// fit the coordinate type.
    #[inline]
    pub const fn dim(&self) -> U64Vec3 {
        U64Vec3::new(
            extent(self.min.x, self.max.x),
            extent(self.min.y, self.max.y),
            extent(self.min.z, self.max.z),
        )
    }

    /// Total number of voxels in the box, saturating at `u64::MAX`.
    #[inline]
    pub const fn volume(&self) -> u64 {
        let d = self.dim();
        d.x.saturating_mul(d.y).saturating_mul(d.z)
    }

    /// Grow the box to include a coordinate
    #[inline]
    pub fn expand(&mut self, c: Coord) {
        self.min = self.min.min(c);
        self.max = self.max.max(c);
    }

    /// Smallest box containing both boxes
    #[inline]
    pub fn union(&self, other: &Self) -> Self {
        Self::new(self.min.min(other.min), self.max.max(other.max))
    }

    /// Iterate every coordinate in the box in lexicographic order.
    pub fn iter(&self) -> impl Iterator<Item = Coord> {
        let Self { min, max } = *self;
        (min.x..=max.x).flat_map(move |x| {
            (min.y..=max.y).flat_map(move |y| (min.z..=max.z).map(move |z| Coord::new(x, y, z)))
        })
    }
}

#[inline]
const fn extent(min: i32, max: i32) -> u64 {
    max.abs_diff(min) as u64 + 1
}
