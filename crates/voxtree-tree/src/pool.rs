//! Fork-join execution for bulk traversals.

use rayon::prelude::*;
use tracing::debug;
use voxtree_core::{Error, ForeachOptions, Result};

/// Bounded worker pool for running traversals on a fixed number of threads.
///
/// Traversals started outside [`install`](Self::install) run on rayon's
/// global pool.
#[derive(Debug)]
pub struct WorkerPool {
    pool: rayon::ThreadPool,
}

impl WorkerPool {
    /// Create a pool with `threads` workers. Zero is clamped to one.
    pub fn new(threads: usize) -> Result<Self> {
        let threads = threads.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("voxtree-worker-{i}"))
            .build()
            .map_err(|e| Error::ThreadPool(e.to_string()))?;
        debug!(threads, "Created worker pool");
        Ok(Self { pool })
    }

    /// Number of worker threads.
    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Run `f` inside the pool; parallel work it starts uses these workers.
    pub fn install<R, F>(&self, f: F) -> R
    where
        R: Send,
        F: FnOnce() -> R + Send,
    {
        self.pool.install(f)
    }
}

/// Apply `op(item, index)` to every element, in parallel chunks of at least
/// the configured grain size when requested.
pub(crate) fn for_each_indexed<I, F>(items: &mut [I], options: ForeachOptions, op: F)
where
    I: Send,
    F: Fn(&mut I, usize) + Sync + Send,
{
    if options.parallel {
        items
            .par_iter_mut()
            .enumerate()
            .with_min_len(options.effective_grain_size())
            .for_each(|(i, item)| op(item, i));
    } else {
        for (i, item) in items.iter_mut().enumerate() {
            op(item, i);
        }
    }
}

/// Like [`for_each_indexed`], collecting one result per element in order.
pub(crate) fn map_indexed<I, R, F>(items: &mut [I], options: ForeachOptions, op: F) -> Vec<R>
where
    I: Send,
    R: Send,
    F: Fn(&mut I, usize) -> R + Sync + Send,
{
    if options.parallel {
        items
            .par_iter_mut()
            .enumerate()
            .with_min_len(options.effective_grain_size())
            .map(|(i, item)| op(item, i))
            .collect()
    } else {
        items
            .iter_mut()
            .enumerate()
            .map(|(i, item)| op(item, i))
            .collect()
    }
}
