//! Cost-based worker sizing
//!
//! One duplication of the world state is measured; its time and size decide
//! how many more copies are worth making. The thresholds are tuning knobs
//! from `SizingPolicy`. Only the floor of one worker is fixed.

use crate::core::config::SizingPolicy;
use crate::world::snapshot::DuplicationCost;

/// Portable stand-in for heap statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryBudget {
    /// Total bytes snapshots may occupy
    pub max_bytes: u64,
    /// Bytes already occupied (source state, measured copy, live pool)
    pub used_bytes: u64,
}

impl MemoryBudget {
    pub fn remaining(&self) -> u64 {
        self.max_bytes.saturating_sub(self.used_bytes)
    }
}

/// Number of workers to build after one measured duplication
pub fn plan_worker_count(
    cost: &DuplicationCost,
    memory: MemoryBudget,
    parallelism: usize,
    policy: &SizingPolicy,
) -> usize {
    let parallelism = parallelism.max(1);
    if cost.elapsed > policy.long_copy() || parallelism == 1 {
        tracing::debug!(
            "Sizing: copy took {:?} on {} threads, using one worker",
            cost.elapsed,
            parallelism
        );
        return 1;
    }

    let copy_bytes = cost.bytes.max(policy.min_copy_bytes).max(1);
    let affordable = (memory.remaining() / copy_bytes).max(1);
    let affordable = usize::try_from(affordable).unwrap_or(usize::MAX);

    let time_cap = if cost.elapsed > policy.short_copy() {
        (parallelism / 2).max(1)
    } else {
        parallelism
    };

    let workers = affordable.min(time_cap).max(1);
    tracing::debug!(
        "Sizing: copy {} bytes in {:?}, {} bytes free, {} workers",
        cost.bytes,
        cost.elapsed,
        memory.remaining(),
        workers
    );
    workers
}
