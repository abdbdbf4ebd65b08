//! Error types for the tree.

use thiserror::Error;

/// Crate-wide error type.
///
/// Lookups never fail: coordinates outside populated space resolve to the
/// background value. Errors only come from invalid requests and from the
/// worker pool.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A tile was requested at a level the tree does not have
    #[error("Invalid tree level {level}: the tree has {depth} levels")]
    InvalidLevel { level: usize, depth: usize },

    /// The worker pool could not be created
    #[error("Thread pool error: {0}")]
    ThreadPool(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
