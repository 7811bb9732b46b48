//! Error types for the cache.

use std::fmt;

/// Errors surfaced by [`crate::Cache::get_or_compute`].
#[derive(Debug)]
pub enum CacheError<E> {
    /// `compute` returned an error; propagated to every joined waiter.
    Compute(E),
    /// The L2 on-disk store could not be read or written.
    Io(std::io::Error),
    /// The leading caller's task was dropped (panicked or cancelled) before
    /// it could deliver a result.
    Lost,
}

impl<E: fmt::Display> fmt::Display for CacheError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::Compute(e) => write!(f, "compute failed: {e}"),
            CacheError::Io(e) => write!(f, "cache storage error: {e}"),
            CacheError::Lost => write!(f, "in-flight computation was lost before completing"),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for CacheError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CacheError::Compute(e) => Some(e),
            CacheError::Io(e) => Some(e),
            CacheError::Lost => None,
        }
    }
}

impl<E: Clone> Clone for CacheError<E> {
    fn clone(&self) -> Self {
        match self {
            CacheError::Compute(e) => CacheError::Compute(e.clone()),
            CacheError::Io(e) => CacheError::Io(std::io::Error::new(e.kind(), e.to_string())),
            CacheError::Lost => CacheError::Lost,
        }
    }
}
