//! Independent copies of world state and the cost of making them
//!
//! A snapshot owns all of its data; two snapshots never share a mutable
//! sub-structure, so a worker can mutate its own copy freely.

use std::time::{Duration, Instant};

use ahash::AHashMap;

use crate::core::error::Result;
use crate::world::state::WorldState;

/// Measured cost of one duplication
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DuplicationCost {
    pub elapsed: Duration,
    pub bytes: u64,
}

/// An exclusively owned copy of world state
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    state: WorldState,
}

impl Snapshot {
    /// Duplicate `source`; only a failed allocation is an error
    pub fn duplicate(source: &WorldState) -> Result<Self> {
        Ok(Self {
            state: source.try_duplicate()?,
        })
    }

    /// Duplicate `source` once, timing the copy and sizing the result
    pub fn measure(source: &WorldState) -> Result<(Self, DuplicationCost)> {
        let start = Instant::now();
        let snapshot = Self::duplicate(source)?;
        let cost = DuplicationCost {
            elapsed: start.elapsed(),
            bytes: snapshot.state.footprint_bytes(),
        };
        tracing::debug!(
            "Duplicated world state: {} units, {} bytes in {:?}",
            snapshot.state.unit_count(),
            cost.bytes,
            cost.elapsed
        );
        Ok((snapshot, cost))
    }

    /// Wrap a state the caller already owns
    pub fn from_state(state: WorldState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &WorldState {
        &self.state
    }

    pub(crate) fn state_mut(&mut self) -> &mut WorldState {
        &mut self.state
    }

    pub fn into_state(self) -> WorldState {
        self.state
    }
}

fn try_clone_map<K, V>(source: &AHashMap<K, V>) -> Result<AHashMap<K, V>>
where
    K: Clone + Eq + std::hash::Hash,
    V: Clone,
{
    let mut copy = AHashMap::new();
    copy.try_reserve(source.len())?;
    for (key, value) in source {
        copy.insert(key.clone(), value.clone());
    }
    Ok(copy)
}

impl WorldState {
    /// Deep copy that reports allocation failure instead of aborting
    pub fn try_duplicate(&self) -> Result<WorldState> {
        Ok(WorldState {
            dice_sides: self.dice_sides,
            players: try_clone_map(&self.players)?,
            unit_types: try_clone_map(&self.unit_types)?,
            territories: try_clone_map(&self.territories)?,
            units: try_clone_map(&self.units)?,
            next_unit_id: self.next_unit_id,
        })
    }
}
