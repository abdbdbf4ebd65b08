//! Core types for the voxtree sparse volume tree.
//!
//! This crate provides the foundational types shared by the tree crate:
//! - Voxel coordinates and inclusive coordinate boxes
//! - The fixed tree layout (node fan-outs and level numbering)
//! - Traversal configuration
//! - Error types

pub mod config;
pub mod coords;
pub mod error;

pub use config::ForeachOptions;
pub use coords::{Coord, CoordBBox};
pub use error::{Error, Result};

/// Tree layout constants.
///
/// Levels are counted from the root: the root is level 0 and leaves are
/// level [`LEAF_LEVEL`]. A slot at level `n` covers `1 << slot_log2(n)`
/// voxels per axis.
pub mod constants {
    /// log2 of the voxels per axis in a leaf node (8³ voxels)
    pub const LEAF_LOG2DIM: u32 = 3;
    /// log2 of the slots per axis in a lower internal node (16³ slots)
    pub const LOWER_LOG2DIM: u32 = 4;
    /// log2 of the slots per axis in an upper internal node (32³ slots)
    pub const UPPER_LOG2DIM: u32 = 5;

    /// log2 of the voxels per axis covered by a leaf node
    pub const LEAF_TOTAL: u32 = LEAF_LOG2DIM;
    /// log2 of the voxels per axis covered by a lower internal node (128)
    pub const LOWER_TOTAL: u32 = LOWER_LOG2DIM + LEAF_TOTAL;
    /// log2 of the voxels per axis covered by an upper internal node (4096)
    pub const UPPER_TOTAL: u32 = UPPER_LOG2DIM + LOWER_TOTAL;

    /// Level of the root node
    pub const ROOT_LEVEL: usize = 0;
    /// Level of the upper internal nodes
    pub const UPPER_LEVEL: usize = 1;
    /// Level of the lower internal nodes
    pub const LOWER_LEVEL: usize = 2;
    /// Level of the leaf nodes
    pub const LEAF_LEVEL: usize = 3;
    /// Number of levels in the tree
    pub const TREE_DEPTH: usize = LEAF_LEVEL + 1;

    /// log2 of the voxels per axis covered by one slot at `level`.
    ///
    /// A root slot holds an upper node, an upper slot a lower node, a lower
    /// slot a leaf and a leaf slot a single voxel.
    pub const fn slot_log2(level: usize) -> Option<u32> {
        match level {
            ROOT_LEVEL => Some(UPPER_TOTAL),
            UPPER_LEVEL => Some(LOWER_TOTAL),
            LOWER_LEVEL => Some(LEAF_TOTAL),
            LEAF_LEVEL => Some(0),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::constants::*;

    #[test]
    fn layout_extents() {
        assert_eq!(1 << LEAF_TOTAL, 8);
        assert_eq!(1 << LOWER_TOTAL, 128);
        assert_eq!(1 << UPPER_TOTAL, 4096);
        assert_eq!(TREE_DEPTH, 4);
    }

    #[test]
    fn slot_extents_per_level() {
        assert_eq!(slot_log2(ROOT_LEVEL), Some(12));
        assert_eq!(slot_log2(UPPER_LEVEL), Some(7));
        assert_eq!(slot_log2(LOWER_LEVEL), Some(3));
        assert_eq!(slot_log2(LEAF_LEVEL), Some(0));
        assert_eq!(slot_log2(TREE_DEPTH), None);
    }
}
