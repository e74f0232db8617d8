//! # Pipeline Module
//!
//! Fills the cache and runs filters over it.
//!
//! ## Pipeline Stages
//! 1. **Resolve** - Map caller paths to cache keys
//! 2. **Populate** - Compute missing column values in chunks, with
//!    periodic checkpoints so an interrupted run loses little work
//! 3. **Filter** - Reduce the candidates filter by filter
//! 4. **Sort** - Order survivors by a cache column
//!
//! ## Parallelism
//! Uses a bounded rayon pool for per-row computation inside a chunk and
//! rayon parallel iterators for fast predicates. All cache writes happen
//! on the calling thread.

mod executor;
mod populate;

pub use executor::{Builder, SieveOutcome};
pub use populate::{PopulateReport, RowFailure};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation flag shared between a `Builder` and
/// whoever wants to stop it (e.g. a Ctrl+C handler).
///
/// Population checks it between chunks and saves its progress before
/// stopping; filtering checks it between filters.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let token = CancellationToken::new();
        let handle = token.clone();

        assert!(!token.is_cancelled());
        handle.cancel();
        assert!(token.is_cancelled());
    }
}
