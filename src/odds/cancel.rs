//! Generation-counter cancellation
//!
//! Long-running steps remember the generation they started in and check
//! it at every yield point. Cancelling bumps the generation, so every step
//! that started earlier sees itself as stale and winds down.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Shared cancellation token; clones observe the same generation
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    generation: Arc<AtomicU64>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generation to remember at the start of a step
    pub fn current(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Invalidate every step started before now; returns the new generation
    pub fn cancel(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// True once the token has moved past `since`
    pub fn is_cancelled(&self, since: u64) -> bool {
        self.current() != since
    }
}
