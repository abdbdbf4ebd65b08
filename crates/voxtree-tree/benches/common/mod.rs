//! Shared setup for the tree benchmarks.

use tracing_subscriber::EnvFilter;
use voxtree_tree::{Coord, CoordBBox, FloatTree};

/// Log to stderr, filtered by `RUST_LOG` (warnings by default).
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

/// Narrow-band sphere shell: active voxels within `band` of the surface,
/// valued by signed distance.
pub fn sphere_tree(center: Coord, radius: i32, band: i32) -> FloatTree {
    let mut tree = FloatTree::new(band as f32);
    let extent = radius + band;
    let bbox = CoordBBox::new(
        center.offset_by(-extent, -extent, -extent),
        center.offset_by(extent, extent, extent),
    );
    let mut accessor = tree.accessor_mut();
    for c in bbox.iter() {
        let d = c.to_ivec3() - center.to_ivec3();
        let dist = (d.as_vec3().length() - radius as f32).clamp(-band as f32, band as f32);
        if dist.abs() < band as f32 {
            accessor.set_value(c, dist);
        }
    }
    tree
}
