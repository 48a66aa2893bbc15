//! Trial execution against one exclusively owned snapshot
//!
//! A batch stages the battle into the snapshot once (missing units created,
//! damage synced, the location cleared and refilled), then runs each trial
//! through the resolver and reverts the trial's changes before the next
//! one. The staging itself is reverted when the batch ends, so the snapshot
//! leaves every batch exactly as it entered.

use std::sync::Arc;

use ahash::AHashSet;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::combat::options::{BattleOptions, TerritoryEffect};
use crate::combat::order_of_losses::units_by_order_of_losses;
use crate::combat::outcome::TrialOutcome;
use crate::combat::resolver::{BattleBridge, BattleSetup, CombatResolver};
use crate::core::error::Result;
use crate::core::types::{PlayerId, TerritoryId, UnitId};
use crate::odds::aggregate::ResultAggregator;
use crate::odds::cancel::CancellationToken;
use crate::world::change::{Change, ChangeJournal};
use crate::world::snapshot::Snapshot;
use crate::world::state::WorldState;
use crate::world::unit::Unit;

/// The forces and place of one battle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Battle {
    pub attacker: PlayerId,
    pub defender: PlayerId,
    pub location: TerritoryId,
    #[serde(default)]
    pub attackers: Vec<Unit>,
    #[serde(default)]
    pub defenders: Vec<Unit>,
    #[serde(default)]
    pub bombarding: Vec<Unit>,
    #[serde(default)]
    pub territory_effects: Vec<TerritoryEffect>,
}

impl Battle {
    pub fn new(attacker: PlayerId, defender: PlayerId, location: TerritoryId) -> Self {
        Self {
            attacker,
            defender,
            location,
            attackers: Vec::new(),
            defenders: Vec::new(),
            bombarding: Vec::new(),
            territory_effects: Vec::new(),
        }
    }

    pub fn with_attackers(mut self, units: impl IntoIterator<Item = Unit>) -> Self {
        self.attackers = units.into_iter().collect();
        self
    }

    pub fn with_defenders(mut self, units: impl IntoIterator<Item = Unit>) -> Self {
        self.defenders = units.into_iter().collect();
        self
    }

    pub fn with_bombarding(mut self, units: impl IntoIterator<Item = Unit>) -> Self {
        self.bombarding = units.into_iter().collect();
        self
    }

    pub fn with_territory_effects(mut self, effects: Vec<TerritoryEffect>) -> Self {
        self.territory_effects = effects;
        self
    }

    /// A side with no units means nothing gets fought
    pub fn is_degenerate(&self) -> bool {
        self.attackers.is_empty() || self.defenders.is_empty()
    }
}

/// Runs trials for one worker
pub struct TrialRunner {
    snapshot: Snapshot,
    resolver: Arc<dyn CombatResolver>,
    max_rounds: u32,
}

impl std::fmt::Debug for TrialRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrialRunner")
            .field("units", &self.snapshot.state().unit_count())
            .field("max_rounds", &self.max_rounds)
            .finish()
    }
}

impl TrialRunner {
    pub fn new(snapshot: Snapshot, resolver: Arc<dyn CombatResolver>, max_rounds: u32) -> Self {
        Self {
            snapshot,
            resolver,
            max_rounds,
        }
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// Stage, fight and revert a single trial
    pub fn run_trial(
        &mut self,
        battle: &Battle,
        options: &BattleOptions,
        rng: &mut ChaCha8Rng,
    ) -> Result<TrialOutcome> {
        let never = CancellationToken::new();
        let results = self.run_batch(battle, options, 1, rng, &never, never.current())?;
        Ok(results
            .outcomes()
            .first()
            .cloned()
            .unwrap_or_else(|| TrialOutcome::no_battle(&battle.attackers, &battle.defenders)))
    }

    /// Run up to `run_count` trials, stopping early once `cancel` moves past `generation`
    ///
    /// A cancelled batch returns the trials finished so far.
    pub fn run_batch(
        &mut self,
        battle: &Battle,
        options: &BattleOptions,
        run_count: usize,
        rng: &mut ChaCha8Rng,
        cancel: &CancellationToken,
        generation: u64,
    ) -> Result<ResultAggregator> {
        let mut results = ResultAggregator::with_capacity(run_count);

        let staged = if battle.is_degenerate() {
            None
        } else {
            self.stage(battle)?
        };
        let Some(mut staging) = staged else {
            for _ in 0..run_count {
                if cancel.is_cancelled(generation) {
                    break;
                }
                results.add(TrialOutcome::no_battle(&battle.attackers, &battle.defenders));
            }
            return Ok(results);
        };

        let fought = self.fight_all(battle, options, run_count, rng, cancel, generation, &mut results);
        let restored = staging.revert(self.snapshot.state_mut());
        fought?;
        restored?;

        tracing::debug!(
            "Batch finished: {} of {} trials at {}",
            results.count(),
            run_count,
            battle.location
        );
        Ok(results)
    }

    #[allow(clippy::too_many_arguments)]
    fn fight_all(
        &mut self,
        battle: &Battle,
        options: &BattleOptions,
        run_count: usize,
        rng: &mut ChaCha8Rng,
        cancel: &CancellationToken,
        generation: u64,
        results: &mut ResultAggregator,
    ) -> Result<()> {
        let state = self.snapshot.state_mut();
        let attacker_losses = units_by_order_of_losses(
            options.attacker_order_of_losses.as_deref(),
            &battle.attackers,
            state,
        )?;
        let defender_losses = units_by_order_of_losses(
            options.defender_order_of_losses.as_deref(),
            &battle.defenders,
            state,
        )?;

        let setup = BattleSetup {
            attacker: battle.attacker,
            defender: battle.defender,
            location: battle.location,
            attackers: &battle.attackers,
            defenders: &battle.defenders,
            bombarding: &battle.bombarding,
            territory_effects: &battle.territory_effects,
            options,
            attacker_losses: attacker_losses.as_deref(),
            defender_losses: defender_losses.as_deref(),
            max_rounds: self.max_rounds,
        };

        for _ in 0..run_count {
            if cancel.is_cancelled(generation) {
                break;
            }
            let mut bridge = BattleBridge::new(state, rng);
            let resolved = self.resolver.resolve(&setup, &mut bridge);
            bridge.revert()?;
            results.add(resolved?);
        }
        Ok(())
    }

    /// Put the battle's units into the snapshot; None for an unknown location
    fn stage(&mut self, battle: &Battle) -> Result<Option<ChangeJournal>> {
        let state = self.snapshot.state_mut();
        if state.territory(battle.location).is_none() {
            tracing::warn!(
                "Battle location {} is not in the world state, no battle fought",
                battle.location
            );
            return Ok(None);
        }

        let mut journal = ChangeJournal::new();
        let result = stage_into(state, battle, &mut journal);
        if let Err(err) = result {
            journal.revert(state)?;
            return Err(err);
        }
        Ok(Some(journal))
    }
}

fn stage_into(state: &mut WorldState, battle: &Battle, journal: &mut ChangeJournal) -> Result<()> {
    let mut seen = AHashSet::new();
    let supplied: Vec<Unit> = battle
        .attackers
        .iter()
        .chain(&battle.defenders)
        .chain(&battle.bombarding)
        .filter(|u| seen.insert(u.id))
        .copied()
        .collect();

    let missing: Vec<Unit> = supplied
        .iter()
        .filter(|u| !state.contains_unit(u.id))
        .map(|u| Unit { hits: 0, ..*u })
        .collect();
    journal.record(state, Change::CreateUnits(missing))?;

    let damage: Vec<Change> = supplied
        .iter()
        .filter_map(|u| {
            let current = state.unit(u.id)?.hits;
            (current != u.hits).then_some(Change::UnitHits {
                unit: u.id,
                from: current,
                to: u.hits,
            })
        })
        .collect();
    journal.record(state, Change::Composite(damage))?;

    let present: Vec<UnitId> = state
        .territory(battle.location)
        .map(|t| t.unit_ids().collect())
        .unwrap_or_default();
    journal.record(state, Change::remove(battle.location, present))?;

    let fighting = battle.attackers.iter().chain(&battle.defenders).map(|u| u.id);
    journal.record(state, Change::place(battle.location, fighting))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combat::dice::DiceResolver;
    use crate::core::types::UnitTypeId;
    use crate::world::state::Territory;
    use crate::world::unit::{Domain, UnitType};
    use rand::SeedableRng;

    const RED: PlayerId = PlayerId(1);
    const BLUE: PlayerId = PlayerId(2);
    const FIELD: TerritoryId = TerritoryId(1);
    const FORT: TerritoryId = TerritoryId(2);

    fn world() -> WorldState {
        let mut world = WorldState::new(6);
        world.add_player(RED, "Red");
        world.add_player(BLUE, "Blue");
        world.add_unit_type(
            UnitType::new(UnitTypeId(1), "infantry", Domain::Land)
                .with_cost(3)
                .with_combat(1, 2),
        );
        world.add_unit_type(
            UnitType::new(UnitTypeId(2), "armour", Domain::Land)
                .with_cost(6)
                .with_combat(3, 3)
                .with_hit_points(2),
        );
        world.add_territory(Territory::land(FIELD, "Field", Some(RED)));
        world.add_territory(Territory::land(FORT, "Fort", Some(BLUE)));
        world
    }

    fn runner(world: WorldState) -> TrialRunner {
        TrialRunner::new(Snapshot::from_state(world), Arc::new(DiceResolver::new()), 100)
    }

    fn battle(world: &mut WorldState) -> Battle {
        let attackers: Vec<Unit> = (0..4)
            .map(|_| world.spawn_unit(FIELD, UnitTypeId(2), RED).expect("spawn should succeed"))
            .collect();
        let defenders: Vec<Unit> = (0..3)
            .map(|_| world.spawn_unit(FORT, UnitTypeId(1), BLUE).expect("spawn should succeed"))
            .collect();
        Battle::new(RED, BLUE, FORT)
            .with_attackers(attackers)
            .with_defenders(defenders)
    }

    #[test]
    fn test_batch_leaves_snapshot_unchanged() {
        let mut world = world();
        let battle = battle(&mut world);
        let mut runner = runner(world.clone());
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let cancel = CancellationToken::new();

        let results = runner
            .run_batch(&battle, &BattleOptions::default(), 50, &mut rng, &cancel, cancel.current())
            .expect("batch should run");

        assert_eq!(results.count(), 50);
        assert_eq!(runner.snapshot().state(), &world);
    }

    #[test]
    fn test_unknown_units_are_created_then_removed() {
        let mut world = world();
        let mut battle = battle(&mut world);
        let mut damaged = Unit::new(UnitId(900), UnitTypeId(2), RED);
        damaged.hits = 1;
        battle.attackers.push(damaged);
        let mut runner = runner(world.clone());
        let mut rng = ChaCha8Rng::seed_from_u64(2);

        let outcome = runner
            .run_trial(&battle, &BattleOptions::default(), &mut rng)
            .expect("trial should run");

        assert!(outcome.winner.is_some());
        assert!(outcome.rounds >= 1);
        assert_eq!(runner.snapshot().state(), &world);
    }

    #[test]
    fn test_empty_side_is_degenerate() {
        let mut world = world();
        let battle = Battle {
            attackers: Vec::new(),
            ..battle(&mut world)
        };
        let mut runner = runner(world);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let cancel = CancellationToken::new();

        let results = runner
            .run_batch(&battle, &BattleOptions::default(), 10, &mut rng, &cancel, cancel.current())
            .expect("batch should run");

        assert_eq!(results.count(), 10);
        assert!(results.outcomes().iter().all(|o| o.winner.is_none() && o.rounds == 0));
    }

    #[test]
    fn test_unknown_location_is_degenerate() {
        let mut world = world();
        let battle = Battle {
            location: TerritoryId(77),
            ..battle(&mut world)
        };
        let mut runner = runner(world.clone());
        let mut rng = ChaCha8Rng::seed_from_u64(4);

        let outcome = runner
            .run_trial(&battle, &BattleOptions::default(), &mut rng)
            .expect("trial should run");
        assert_eq!(outcome.winner, None);
        assert_eq!(runner.snapshot().state(), &world);
    }

    #[test]
    fn test_cancelled_batch_stops_early() {
        let mut world = world();
        let battle = battle(&mut world);
        let mut runner = runner(world);
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let cancel = CancellationToken::new();
        let started = cancel.current();
        cancel.cancel();

        let results = runner
            .run_batch(&battle, &BattleOptions::default(), 1000, &mut rng, &cancel, started)
            .expect("batch should run");
        assert_eq!(results.count(), 0);
    }

    #[test]
    fn test_same_seed_same_results() {
        let mut world = world();
        let battle = battle(&mut world);
        let cancel = CancellationToken::new();

        let mut first = runner(world.clone());
        let mut second = runner(world);
        let a = first
            .run_batch(
                &battle,
                &BattleOptions::default(),
                25,
                &mut ChaCha8Rng::seed_from_u64(9),
                &cancel,
                cancel.current(),
            )
            .expect("batch should run");
        let b = second
            .run_batch(
                &battle,
                &BattleOptions::default(),
                25,
                &mut ChaCha8Rng::seed_from_u64(9),
                &cancel,
                cancel.current(),
            )
            .expect("batch should run");
        assert_eq!(a.outcomes(), b.outcomes());
    }

    #[test]
    fn test_bad_order_of_losses_is_an_error() {
        let mut world = world();
        let battle = battle(&mut world);
        let mut runner = runner(world.clone());
        let options = BattleOptions {
            attacker_order_of_losses: Some("3^dragon".into()),
            ..BattleOptions::default()
        };

        let result = runner.run_trial(&battle, &options, &mut ChaCha8Rng::seed_from_u64(6));
        assert!(result.is_err());
        assert_eq!(runner.snapshot().state(), &world);
    }
}
