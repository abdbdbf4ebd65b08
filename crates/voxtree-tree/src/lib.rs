//! Sparse hierarchical volume for the voxtree library.
//!
//! A [`Tree`] maps every integer coordinate to a value and an active flag.
//! Below an unbounded root table sit three fixed levels: upper internal
//! nodes of 32³ slots, lower internal nodes of 16³ slots and leaves of 8³
//! voxels. Uniform regions are stored as tiles at the level that covers
//! them. Bulk work goes through [`LeafManager`], [`NodeManager`] and
//! [`DynamicNodeManager`], which split the tree into disjoint parts and run
//! them on rayon.

use std::fmt;

pub mod accessor;
pub mod internal;
pub mod iter;
pub mod leaf;
pub mod leaf_manager;
pub mod mask;
pub mod node;
pub mod node_manager;
pub mod pool;
pub mod root;
pub mod tree;

pub use accessor::{ValueAccessor, ValueAccessorMut};
pub use internal::{InternalNode, LowerNode, Slot, UpperNode};
pub use iter::{
    ActiveValue, ActiveValueIter, ActiveValueIterMut, ActiveValueMut, LeafIter, NodeIter, NodeRef,
};
pub use leaf::{LeafNode, LEAF_DIM, LEAF_SIZE};
pub use leaf_manager::LeafManager;
pub use mask::BitMask;
pub use node::{TreeNode, Uniform};
pub use node_manager::{DynamicNodeManager, DynamicNodeOp, NodeManager, NodeOp, NodeTiles};
pub use pool::WorkerPool;
pub use root::{RootEntry, RootNode};
pub use tree::{DoubleTree, FloatTree, Int32Tree, Tree};
pub use voxtree_core::{constants, Coord, CoordBBox, Error, ForeachOptions, Result};

/// Types that can be stored in a [`Tree`].
pub trait Value: Copy + PartialEq + Default + Send + Sync + fmt::Debug + 'static {}

impl<T> Value for T where T: Copy + PartialEq + Default + Send + Sync + fmt::Debug + 'static {}
