//! Point-query benchmarks: root-table lookups, direct leaf access and
//! value iteration, each with and without a cached accessor.

mod common;

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use voxtree_tree::constants::ROOT_LEVEL;
use voxtree_tree::{Coord, CoordBBox, FloatTree};

const QUERIES_PER_TILE: usize = 1_000;

/// Root tiles of 4096³ on a regular grid, `per_axis` per axis.
fn tiled_tree(per_axis: i32) -> FloatTree {
    let mut tree = FloatTree::new(0.0);
    let start = -4096 * (per_axis / 2);
    for i in 0..per_axis {
        for j in 0..per_axis {
            for k in 0..per_axis {
                let origin = Coord::new(start + 4096 * i, start + 4096 * j, start + 4096 * k);
                tree.add_tile(ROOT_LEVEL, origin, 1.0, true)
                    .expect("root level is valid");
            }
        }
    }
    tree
}

fn octant(index: usize) -> Coord {
    let pick = |bit: usize| if index & bit == 0 { 0 } else { -4096 };
    Coord::new(pick(1), pick(2), pick(4))
}

/// Queries grouped by octant: every lookup after the first in a group
/// lands in the same root tile.
fn coalesced_queries() -> Vec<Coord> {
    (0..8)
        .flat_map(|tile| std::iter::repeat(octant(tile)).take(QUERIES_PER_TILE))
        .collect()
}

/// Queries cycling through the octants: consecutive lookups never share
/// a root tile.
fn interleaved_queries() -> Vec<Coord> {
    (0..QUERIES_PER_TILE)
        .flat_map(|_| (0..8).map(octant))
        .collect()
}

fn depth_sum(depths: impl Iterator<Item = Option<usize>>) -> usize {
    depths.map(|d| d.unwrap_or(0)).sum()
}

fn bench_root_query(c: &mut Criterion) {
    common::init_tracing();
    let mut group = c.benchmark_group("root_query");

    for (tiles, per_axis) in [(1, 1), (8, 2), (64, 4)] {
        let tree = tiled_tree(per_axis);
        for (layout, queries) in [
            ("coalesced", coalesced_queries()),
            ("interleaved", interleaved_queries()),
        ] {
            let name = format!("{tiles}_tiles_{layout}");
            group.bench_with_input(BenchmarkId::new("direct", &name), &queries, |b, queries| {
                b.iter(|| {
                    let root = tree.root();
                    depth_sum(queries.iter().map(|&ijk| root.get_value_depth(ijk)))
                });
            });
            group.bench_with_input(BenchmarkId::new("accessor", &name), &queries, |b, queries| {
                b.iter(|| {
                    let mut accessor = tree.accessor();
                    depth_sum(queries.iter().map(|&ijk| accessor.get_value_depth(ijk)))
                });
            });
        }
    }

    group.finish();
}

fn bench_direct_access(c: &mut Criterion) {
    common::init_tracing();
    let tree = common::sphere_tree(Coord::ZERO, 96, 3);
    let bbox = CoordBBox::new(Coord::splat(-100), Coord::splat(100));
    let coords: Vec<Coord> = bbox.iter().step_by(7).collect();

    let mut group = c.benchmark_group("direct_access");
    group.bench_function("tree_get_value", |b| {
        b.iter(|| coords.iter().map(|&ijk| tree.get_value(ijk)).sum::<f32>());
    });
    group.bench_function("accessor_get_value", |b| {
        b.iter(|| {
            let mut accessor = tree.accessor();
            coords.iter().map(|&ijk| accessor.get_value(ijk)).sum::<f32>()
        });
    });
    group.bench_function("accessor_set_value", |b| {
        b.iter_batched_ref(
            || tree.clone(),
            |tree| {
                let mut accessor = tree.accessor_mut();
                for &ijk in &coords {
                    let value = accessor.get_value(ijk);
                    accessor.set_value(ijk, value * 0.5);
                }
            },
            criterion::BatchSize::LargeInput,
        );
    });
    group.finish();
}

fn bench_iterator_access(c: &mut Criterion) {
    common::init_tracing();
    let tree = common::sphere_tree(Coord::ZERO, 96, 3);

    let mut group = c.benchmark_group("iterator_access");
    group.bench_function("active_values", |b| {
        b.iter(|| tree.active_values().map(|v| v.value).sum::<f32>());
    });
    group.bench_function("leaves", |b| {
        b.iter(|| {
            tree.leaves()
                .flat_map(|leaf| leaf.active_values())
                .map(|(_, v)| v)
                .sum::<f32>()
        });
    });
    group.bench_function("hierarchy", |b| {
        b.iter(|| {
            let mut total = 0.0_f32;
            for upper in tree.root_children() {
                for lower in upper.children() {
                    for leaf in lower.children() {
                        total += leaf.active_values().map(|(_, v)| v).sum::<f32>();
                    }
                }
            }
            total
        });
    });
    group.bench_function("bbox_range", |b| {
        let bbox = CoordBBox::new(Coord::new(-100, -100, -8), Coord::new(100, 100, 8));
        b.iter(|| black_box(tree.active_voxels_in(bbox).count()));
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_root_query,
    bench_direct_access,
    bench_iterator_access
);
criterion_main!(benches);
