//! Traversal configuration.

use serde::{Deserialize, Serialize};

/// How a bulk `foreach` distributes its work.
///
/// A grain size of zero is treated as one: the request to parallelize is
/// honoured, never dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForeachOptions {
    /// Run on the worker pool instead of the calling thread.
    pub parallel: bool,
    /// Minimum number of elements per parallel work chunk.
    pub grain_size: usize,
}

impl Default for ForeachOptions {
    fn default() -> Self {
        Self {
            parallel: true,
            grain_size: 1,
        }
    }
}

impl ForeachOptions {
    /// Visit everything on the calling thread.
    pub const fn sequential() -> Self {
        Self {
            parallel: false,
            grain_size: 1,
        }
    }

    /// Visit in parallel with the given minimum chunk size.
    pub const fn parallel(grain_size: usize) -> Self {
        Self {
            parallel: true,
            grain_size,
        }
    }

    /// Same options with a different grain size.
    #[must_use]
    pub const fn with_grain_size(self, grain_size: usize) -> Self {
        Self { grain_size, ..self }
    }

    /// Grain size clamped to at least one element.
    #[inline]
    pub const fn effective_grain_size(&self) -> usize {
        if self.grain_size == 0 {
            1
        } else {
            self.grain_size
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_grain_is_clamped() {
        let options = ForeachOptions::parallel(0);
        assert!(options.parallel);
        assert_eq!(options.effective_grain_size(), 1);
    }

    #[test]
    fn defaults_match_benchmark_settings() {
        let options = ForeachOptions::default();
        assert!(options.parallel);
        assert_eq!(options.effective_grain_size(), 1);
        assert!(!ForeachOptions::sequential().parallel);
    }

    #[test]
    fn with_grain_size_keeps_mode() {
        let options = ForeachOptions::sequential().with_grain_size(64);
        assert!(!options.parallel);
        assert_eq!(options.effective_grain_size(), 64);
    }
}
