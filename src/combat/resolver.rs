//! The combat-resolution boundary
//!
//! A `CombatResolver` fights one battle to completion against a snapshot.
//! It may only mutate the snapshot through its `BattleBridge`, which records
//! every change so the trial runner can invert them afterwards.

use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::combat::options::{BattleOptions, TerritoryEffect};
use crate::combat::outcome::TrialOutcome;
use crate::core::error::Result;
use crate::core::types::{PlayerId, TerritoryId, UnitId};
use crate::world::change::{Change, ChangeJournal};
use crate::world::state::WorldState;
use crate::world::unit::Unit;

/// Everything a resolver needs to know about the battle to fight
#[derive(Debug, Clone, Copy)]
pub struct BattleSetup<'a> {
    pub attacker: PlayerId,
    pub defender: PlayerId,
    pub location: TerritoryId,
    pub attackers: &'a [Unit],
    pub defenders: &'a [Unit],
    /// Ships firing into the battle from outside; never take casualties
    pub bombarding: &'a [Unit],
    pub territory_effects: &'a [TerritoryEffect],
    pub options: &'a BattleOptions,
    /// Attacker casualty order resolved from the options, if any
    pub attacker_losses: Option<&'a [UnitId]>,
    /// Defender casualty order resolved from the options, if any
    pub defender_losses: Option<&'a [UnitId]>,
    /// A battle still running after this many rounds is a draw
    pub max_rounds: u32,
}

/// Recording access to a snapshot for the duration of one battle
pub struct BattleBridge<'a> {
    state: &'a mut WorldState,
    rng: &'a mut ChaCha8Rng,
    journal: ChangeJournal,
}

impl<'a> BattleBridge<'a> {
    pub fn new(state: &'a mut WorldState, rng: &'a mut ChaCha8Rng) -> Self {
        Self {
            state,
            rng,
            journal: ChangeJournal::new(),
        }
    }

    pub fn state(&self) -> &WorldState {
        self.state
    }

    /// Apply a change to the snapshot and record it for reverting
    pub fn apply(&mut self, change: Change) -> Result<()> {
        self.journal.record(self.state, change)
    }

    /// One die roll in `1..=sides`
    pub fn roll(&mut self, sides: u32) -> u32 {
        self.rng.gen_range(1..=sides.max(1))
    }

    pub fn rng(&mut self) -> &mut ChaCha8Rng {
        self.rng
    }

    /// Undo every change made through this bridge
    pub fn revert(mut self) -> Result<()> {
        self.journal.revert(self.state)
    }
}

/// Fights a single battle
///
/// Implementations must be deterministic given the bridge's RNG, and must
/// report survivors as subsets of `setup.attackers` and `setup.defenders`.
pub trait CombatResolver: Send + Sync {
    fn resolve(&self, setup: &BattleSetup<'_>, bridge: &mut BattleBridge<'_>) -> Result<TrialOutcome>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::UnitTypeId;
    use crate::world::state::Territory;
    use crate::world::unit::{Domain, UnitType};
    use rand::SeedableRng;

    #[test]
    fn test_bridge_revert_restores_state() {
        let mut world = WorldState::new(6);
        world.add_player(PlayerId(1), "Red");
        world.add_unit_type(UnitType::new(UnitTypeId(1), "infantry", Domain::Land));
        world.add_territory(Territory::land(TerritoryId(1), "Hill", None));
        let unit = world
            .spawn_unit(TerritoryId(1), UnitTypeId(1), PlayerId(1))
            .expect("spawn should succeed");
        let before = world.clone();

        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut bridge = BattleBridge::new(&mut world, &mut rng);
        bridge
            .apply(Change::remove(TerritoryId(1), [unit.id]))
            .expect("remove should apply");
        assert!(bridge.state().units_at(TerritoryId(1)).is_empty());
        bridge.revert().expect("revert should apply");

        assert_eq!(world, before);
    }

    #[test]
    fn test_rolls_stay_on_the_die() {
        let mut world = WorldState::new(6);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut bridge = BattleBridge::new(&mut world, &mut rng);
        for _ in 0..200 {
            let roll = bridge.roll(6);
            assert!((1..=6).contains(&roll));
        }
    }
}
