//! Unit value lookup for value-swing statistics

use ahash::AHashMap;

use crate::core::types::{PlayerId, UnitTypeId};
use crate::world::state::WorldState;
use crate::world::unit::Unit;

/// Cost of each unit type, with optional per-player overrides
#[derive(Debug, Clone, Default)]
pub struct CostTable {
    defaults: AHashMap<UnitTypeId, u32>,
    overrides: AHashMap<(PlayerId, UnitTypeId), u32>,
}

impl CostTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Base costs of every unit type in the state
    pub fn from_state(state: &WorldState) -> Self {
        Self {
            defaults: state.unit_types().map(|t| (t.id, t.cost)).collect(),
            overrides: AHashMap::new(),
        }
    }

    pub fn with_cost(mut self, unit_type: UnitTypeId, cost: u32) -> Self {
        self.defaults.insert(unit_type, cost);
        self
    }

    /// A player-specific price, e.g. from a technology discount
    pub fn with_player_cost(mut self, player: PlayerId, unit_type: UnitTypeId, cost: u32) -> Self {
        self.overrides.insert((player, unit_type), cost);
        self
    }

    /// Unknown types are worth nothing
    pub fn cost(&self, player: PlayerId, unit_type: UnitTypeId) -> u32 {
        self.overrides
            .get(&(player, unit_type))
            .or_else(|| self.defaults.get(&unit_type))
            .copied()
            .unwrap_or(0)
    }

    /// Total value of a roster, priced for `player`
    pub fn value_of<'a>(&self, player: PlayerId, units: impl IntoIterator<Item = &'a Unit>) -> u64 {
        units
            .into_iter()
            .map(|u| u64::from(self.cost(player, u.unit_type)))
            .sum()
    }
}
