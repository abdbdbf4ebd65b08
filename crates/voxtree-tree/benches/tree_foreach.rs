//! Bulk update benchmarks: doubling every active value through each
//! traversal strategy, sequentially and on worker pools of several sizes.

mod common;

use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use voxtree_tree::{
    Coord, DynamicNodeOp, FloatTree, ForeachOptions, LeafNode, NodeOp, NodeTiles, WorkerPool,
};

struct Double;

impl NodeOp<f32> for Double {
    fn tiles(&self, node: &mut NodeTiles<'_, f32>, _index: usize) {
        for tile in &mut node.tiles {
            *tile.value *= 2.0;
        }
    }

    fn leaf(&self, leaf: &mut LeafNode<f32>, index: usize) {
        double_leaf(leaf, index);
    }
}

impl DynamicNodeOp<f32> for Double {
    fn leaf(&self, leaf: &mut LeafNode<f32>, index: usize) {
        double_leaf(leaf, index);
    }
}

fn double_leaf(leaf: &mut LeafNode<f32>, _index: usize) {
    for (_, value) in leaf.active_values_mut() {
        *value *= 2.0;
    }
}

fn bench_sequential(c: &mut Criterion, reference: &FloatTree) {
    let mut group = c.benchmark_group("foreach_sequential");
    group.bench_function("value_iter", |b| {
        b.iter_batched_ref(
            || reference.clone(),
            |tree| {
                for value in tree.active_values_mut() {
                    *value.value *= 2.0;
                }
            },
            BatchSize::LargeInput,
        );
    });
    group.bench_function("leaf_iter", |b| {
        b.iter_batched_ref(
            || reference.clone(),
            |tree| tree.foreach_leaf_mut(|leaf| double_leaf(leaf, 0)),
            BatchSize::LargeInput,
        );
    });
    group.finish();
}

fn bench_threaded(c: &mut Criterion, reference: &FloatTree) {
    let mut group = c.benchmark_group("foreach_threaded");
    let options = ForeachOptions::parallel(1);

    for threads in [1, 2, 4, 8] {
        let pool = WorkerPool::new(threads).expect("worker pool");
        group.bench_with_input(BenchmarkId::new("value", threads), &pool, |b, pool| {
            b.iter_batched_ref(
                || reference.clone(),
                |tree| {
                    pool.install(|| {
                        tree.foreach_active_value(|value| *value.value *= 2.0, options);
                    });
                },
                BatchSize::LargeInput,
            );
        });
        group.bench_with_input(BenchmarkId::new("leaf_manager", threads), &pool, |b, pool| {
            b.iter_batched_ref(
                || reference.clone(),
                |tree| pool.install(|| tree.leaf_manager().foreach(double_leaf, options)),
                BatchSize::LargeInput,
            );
        });
        group.bench_with_input(BenchmarkId::new("node_manager", threads), &pool, |b, pool| {
            b.iter_batched_ref(
                || reference.clone(),
                |tree| pool.install(|| tree.node_manager().foreach_top_down(&Double, options)),
                BatchSize::LargeInput,
            );
        });
        group.bench_with_input(
            BenchmarkId::new("dynamic_node_manager", threads),
            &pool,
            |b, pool| {
                b.iter_batched_ref(
                    || reference.clone(),
                    |tree| {
                        pool.install(|| {
                            tree.dynamic_node_manager()
                                .foreach_top_down(&Double, options);
                        });
                    },
                    BatchSize::LargeInput,
                );
            },
        );
    }

    group.finish();
}

fn bench_foreach(c: &mut Criterion) {
    common::init_tracing();
    let reference = common::sphere_tree(Coord::ZERO, 128, 3);
    bench_sequential(c, &reference);
    bench_threaded(c, &reference);
}

criterion_group!(benches, bench_foreach);
criterion_main!(benches);
