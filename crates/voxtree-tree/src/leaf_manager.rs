//! Flat, indexable view of every leaf for parallel dispatch.

use rayon::prelude::*;
use tracing::{debug, trace_span};
use voxtree_core::ForeachOptions;

use crate::leaf::LeafNode;
use crate::node_manager::{foreach_leaf_tracked, split_leaves, LeafParents};
use crate::pool::for_each_indexed;
use crate::tree::Tree;
use crate::Value;

/// Every leaf of a tree, gathered once in traversal order.
///
/// The manager holds the tree's exclusive borrow, so the tree cannot gain
/// or lose leaves while it exists. Operations may edit voxel values and
/// active states freely; each leaf is handed to exactly one worker. The
/// active bits above a leaf are updated when [`foreach`](Self::foreach)
/// returns, or when the manager is dropped for leaves handed out by
/// [`leaf_mut`](Self::leaf_mut).
pub struct LeafManager<'a, T: Value> {
    leaves: Vec<&'a mut LeafNode<T>>,
    parents: LeafParents<'a>,
    lent: Vec<usize>,
}

impl<'a, T: Value> LeafManager<'a, T> {
    pub(crate) fn new(tree: &'a mut Tree<T>) -> Self {
        let (leaves, parents) = split_leaves(&mut tree.root);
        debug!(leaves = leaves.len(), "Built leaf manager");
        Self {
            leaves,
            parents,
            lent: Vec::new(),
        }
    }

    /// Number of leaves.
    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    /// True if the tree had no leaves.
    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Leaf at `index` in traversal order.
    pub fn leaf(&self, index: usize) -> Option<&LeafNode<T>> {
        self.leaves.get(index).map(|leaf| &**leaf)
    }

    /// Mutable leaf at `index`.
    pub fn leaf_mut(&mut self, index: usize) -> Option<&mut LeafNode<T>> {
        let leaf = self.leaves.get_mut(index)?;
        self.lent.push(index);
        Some(&mut **leaf)
    }

    /// Leaves in traversal order.
    pub fn iter(&self) -> impl Iterator<Item = &LeafNode<T>> + '_ {
        self.leaves.iter().map(|leaf| &**leaf)
    }

    /// Apply `op(leaf, index)` to every leaf.
    ///
    /// In parallel mode the leaves are split into contiguous chunks of at
    /// least `grain_size` entries.
    pub fn foreach<F>(&mut self, op: F, options: ForeachOptions)
    where
        F: Fn(&mut LeafNode<T>, usize) + Sync + Send,
    {
        let _span = trace_span!(
            "leaf_manager.foreach",
            leaves = self.leaves.len(),
            parallel = options.parallel
        )
        .entered();
        foreach_leaf_tracked(&mut self.leaves, &mut self.parents, options, op);
    }

    /// Map every leaf to a value and fold the results with `combine`.
    ///
    /// `combine` must be associative and `identity` neutral for it; the
    /// grouping of partial results depends on how the work was split.
    pub fn reduce<R, M, C>(&self, identity: R, map: M, combine: C, options: ForeachOptions) -> R
    where
        R: Clone + Send + Sync,
        M: Fn(&LeafNode<T>, usize) -> R + Sync + Send,
        C: Fn(R, R) -> R + Sync + Send,
    {
        let _span = trace_span!("leaf_manager.reduce", parallel = options.parallel).entered();
        if options.parallel {
            self.leaves
                .par_iter()
                .enumerate()
                .with_min_len(options.effective_grain_size())
                .map(|(i, leaf)| map(&**leaf, i))
                .reduce(|| identity.clone(), &combine)
        } else {
            self.leaves
                .iter()
                .enumerate()
                .map(|(i, leaf)| map(&**leaf, i))
                .fold(identity, &combine)
        }
    }

    /// Apply `op` to the values of every leaf. Active states are out of
    /// reach, so no bits need updating afterwards.
    pub fn foreach_values<F>(&mut self, op: F, options: ForeachOptions)
    where
        F: Fn(&mut [T], usize) + Sync + Send,
    {
        let _span =
            trace_span!("leaf_manager.foreach_values", parallel = options.parallel).entered();
        for_each_indexed(&mut self.leaves, options, |leaf, i| op(leaf.values_mut(), i));
    }
}

impl<T: Value> Drop for LeafManager<'_, T> {
    fn drop(&mut self) {
        self.lent.sort_unstable();
        self.lent.dedup();
        for &index in &self.lent {
            let on = self.leaves[index].has_active();
            self.parents.update(index, on);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::WorkerPool;
    use crate::node::TreeNode;
    use approx::assert_relative_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use voxtree_core::constants::LOWER_LEVEL;
    use voxtree_core::{Coord, CoordBBox};

    fn sphere_tree(radius: i32) -> Tree<f32> {
        let mut tree = Tree::new(0.0);
        let r2 = radius * radius;
        for c in CoordBBox::cube(Coord::splat(-radius), 2 * radius + 1).iter() {
            let d2 = c.x * c.x + c.y * c.y + c.z * c.z;
            if d2 <= r2 && d2 >= (radius - 2) * (radius - 2) {
                tree.set_value(c, (d2 % 17) as f32 * 0.5);
            }
        }
        tree
    }

    fn double(leaf: &mut LeafNode<f32>, _index: usize) {
        for (_, value) in leaf.active_values_mut() {
            *value *= 2.0;
        }
    }

    #[test]
    fn parallel_doubling_matches_sequential() {
        let reference = sphere_tree(20);
        let mut expected = reference.clone();
        expected
            .leaf_manager()
            .foreach(double, ForeachOptions::sequential());

        for threads in [1, 2, 4] {
            let pool = WorkerPool::new(threads).unwrap();
            for grain in [0, 1, 7, 64, 1000] {
                let mut tree = reference.clone();
                pool.install(|| {
                    tree.leaf_manager()
                        .foreach(double, ForeachOptions::parallel(grain));
                });
                let actual: Vec<_> = tree.active_values().collect();
                let wanted: Vec<_> = expected.active_values().collect();
                assert_eq!(actual, wanted, "threads {threads}, grain {grain}");
            }
        }
    }

    #[test]
    fn every_leaf_visited_once_with_its_index() {
        let mut tree = sphere_tree(12);
        let mut manager = tree.leaf_manager();
        let count = manager.leaf_count();
        assert!(count > 1);
        let calls = AtomicUsize::new(0);
        let index_sum = AtomicUsize::new(0);
        manager.foreach(
            |_, i| {
                calls.fetch_add(1, Ordering::Relaxed);
                index_sum.fetch_add(i, Ordering::Relaxed);
            },
            ForeachOptions::parallel(3),
        );
        assert_eq!(calls.load(Ordering::Relaxed), count);
        assert_eq!(index_sum.load(Ordering::Relaxed), count * (count - 1) / 2);
    }

    #[test]
    fn leaves_follow_iteration_order() {
        let mut tree = sphere_tree(10);
        let origins: Vec<_> = tree.leaves().map(LeafNode::origin).collect();
        let manager = tree.leaf_manager();
        let managed: Vec<_> = manager.iter().map(LeafNode::origin).collect();
        assert_eq!(managed, origins);
        assert_eq!(manager.leaf(0).map(LeafNode::origin), origins.first().copied());
        assert!(manager.leaf(origins.len()).is_none());
    }

    #[test]
    fn reduce_sums_active_values() {
        let mut tree = sphere_tree(16);
        let expected: f64 = tree.active_values().map(|v| f64::from(v.value)).sum();
        let expected_voxels = tree.active_voxel_count();
        let manager = tree.leaf_manager();
        let sum_leaf = |leaf: &LeafNode<f32>, _: usize| -> f64 {
            leaf.active_values().map(|(_, v)| f64::from(v)).sum()
        };
        for options in [ForeachOptions::sequential(), ForeachOptions::parallel(5)] {
            let sum = manager.reduce(0.0, sum_leaf, |a, b| a + b, options);
            assert_relative_eq!(sum, expected, max_relative = 1e-9);
        }
        let voxels = manager.reduce(
            0,
            |leaf, _| leaf.active_voxel_count(),
            |a, b| a + b,
            ForeachOptions::parallel(1),
        );
        assert_eq!(voxels as u64, expected_voxels);
    }

    #[test]
    fn deactivating_leaves_clears_ancestor_bits() {
        let mut tree = Tree::new(0.0_f32);
        tree.set_value(Coord::new(1, 2, 3), 1.0);
        tree.set_value(Coord::new(600, 2, 3), 1.0);
        tree.leaf_manager()
            .foreach(|leaf, _| leaf.fill(0.0, false), ForeachOptions::parallel(1));

        assert_eq!(tree.active_voxel_count(), 0);
        let upper = tree.root_children().next().unwrap();
        assert!(!upper.has_active());
        assert_eq!(upper.value_mask().count_on(), 0);
        assert!(upper.children().all(|lower| !lower.has_active()));

        tree.prune();
        assert_eq!(tree.leaf_count(), 0);
        assert!(tree.is_empty());
    }

    #[test]
    fn toggled_leaves_only_touch_their_own_ancestors() {
        let mut tree = Tree::new(0.0_f32);
        tree.set_value(Coord::new(1, 2, 3), 1.0);
        tree.set_value(Coord::new(9, 2, 3), 1.0);
        tree.set_value(Coord::new(600, 2, 3), 1.0);
        tree.add_tile(LOWER_LEVEL, Coord::new(16, 0, 0), 4.0, true).unwrap();
        tree.leaf_manager().foreach(
            |leaf, _| {
                if leaf.origin().x < 16 {
                    leaf.fill(0.0, false);
                }
            },
            ForeachOptions::sequential(),
        );

        let upper = tree.root_children().next().unwrap();
        assert_eq!(upper.value_mask().count_on(), 2);
        let first = upper.children().next().unwrap();
        assert_eq!(first.value_mask().count_on(), 1);
        assert!(first.has_active());
        assert_eq!(tree.active_voxel_count(), 1 + 512);
    }

    #[test]
    fn lent_leaves_update_bits_on_drop() {
        let mut tree = Tree::new(0_i32);
        let c = Coord::new(-5, 6, 7);
        tree.set_value(c, 3);
        {
            let mut manager = tree.leaf_manager();
            manager.leaf_mut(0).unwrap().set_active_state(c, false);
            assert!(manager.leaf_mut(1).is_none());
        }
        assert!(!tree.root_children().next().unwrap().has_active());
        assert_eq!(tree.probe_value(c), (3, false));

        tree.leaf_manager()
            .leaf_mut(0)
            .unwrap()
            .set_active_state(c, true);
        let upper = tree.root_children().next().unwrap();
        assert!(upper.has_active());
        assert!(upper.children().all(|lower| lower.has_active()));
    }

    #[test]
    fn value_only_foreach_keeps_active_states() {
        let mut tree = sphere_tree(6);
        let bits_before: Vec<usize> = tree
            .root_children()
            .map(|upper| upper.value_mask().count_on())
            .collect();
        tree.leaf_manager().foreach_values(
            |values, _| values.iter_mut().for_each(|v| *v += 1.0),
            ForeachOptions::parallel(2),
        );
        let bits_after: Vec<usize> = tree
            .root_children()
            .map(|upper| upper.value_mask().count_on())
            .collect();
        assert_eq!(bits_after, bits_before);
        assert_eq!(tree.get_value(Coord::new(100, 100, 100)), 0.0);
        let (value, on) = tree.probe_value(Coord::new(6, 0, 0));
        assert!(on);
        assert_relative_eq!(value, (36 % 17) as f32 * 0.5 + 1.0);
    }
}
