//! Default dice-based battle resolution
//!
//! Each round both sides roll one die per fighting unit and score a hit on
//! a roll at or below the unit's (terrain-adjusted) strength. Casualties are
//! taken simultaneously. Bombarding ships only fire in the first round.

use ahash::AHashSet;

use crate::combat::options::{combat_bonus, TerritoryEffect};
use crate::combat::outcome::{BattleWinner, TrialOutcome};
use crate::combat::resolver::{BattleBridge, BattleSetup, CombatResolver};
use crate::combat::retreat::{should_retreat, RetreatView};
use crate::core::error::{OddsError, Result};
use crate::core::types::{TerritoryId, UnitId};
use crate::world::change::Change;
use crate::world::state::WorldState;
use crate::world::unit::Unit;

/// Plain dice combat, one roll per unit per round
#[derive(Debug, Clone, Copy, Default)]
pub struct DiceResolver;

impl DiceResolver {
    pub fn new() -> Self {
        Self
    }
}

/// A unit as seen by the combat loop
#[derive(Debug, Clone, Copy)]
struct Combatant {
    id: UnitId,
    power: u32,
    cost: u32,
    hits: u8,
    hp_left: u8,
    is_land: bool,
    is_air: bool,
    /// Set while riding a transport at sea; such units do not fight
    cargo_of: Option<UnitId>,
}

impl Combatant {
    fn fights(&self) -> bool {
        self.cargo_of.is_none()
    }
}

/// Hits assigned to one side in one round
#[derive(Debug, Default)]
struct Casualties {
    /// (roster index, extra damage) for units that survive damaged
    damaged: Vec<(usize, u8)>,
    /// Roster indices of units killed outright
    killed: Vec<usize>,
}

fn roster(
    units: &[Unit],
    state: &WorldState,
    effects: &[TerritoryEffect],
    attacking: bool,
    at_sea: bool,
) -> Result<Vec<Combatant>> {
    let dice = state.dice_sides();
    let ids: AHashSet<UnitId> = units.iter().map(|u| u.id).collect();
    let mut roster = Vec::with_capacity(units.len());

    for unit in units {
        let unit_type = state.type_of(unit)?;
        if unit_type.is_infrastructure {
            continue;
        }

        let base = if attacking {
            unit_type.attack
        } else {
            unit_type.defense
        };
        let bonus = combat_bonus(effects, unit.unit_type, attacking);
        let power = (base as i64 + bonus as i64).clamp(0, dice as i64) as u32;

        // Staging may have put damage on the arena record
        let hits = state.unit(unit.id).map_or(unit.hits, |u| u.hits);
        let cargo_of = unit
            .transported_by
            .filter(|transport| at_sea && ids.contains(transport));

        roster.push(Combatant {
            id: unit.id,
            power,
            cost: unit_type.cost,
            hits,
            hp_left: unit_type.hit_points.saturating_sub(hits).max(1),
            is_land: unit_type.is_land(),
            is_air: unit_type.is_air(),
            cargo_of,
        });
    }

    Ok(roster)
}

fn has_fighters(roster: &[Combatant]) -> bool {
    roster.iter().any(Combatant::fights)
}

fn total_power(roster: &[Combatant]) -> u32 {
    roster.iter().filter(|c| c.fights()).map(|c| c.power).sum()
}

fn roll_hits(bridge: &mut BattleBridge<'_>, roster: &[Combatant], dice: u32) -> u32 {
    let mut hits = 0;
    for combatant in roster.iter().filter(|c| c.fights() && c.power > 0) {
        if bridge.roll(dice) <= combatant.power {
            hits += 1;
        }
    }
    hits
}

/// Roster indices in the order casualties are taken
///
/// Units named by the fixed order of losses go first, the rest weakest and
/// cheapest first.
fn casualty_order(roster: &[Combatant], losses: Option<&[UnitId]>) -> Vec<usize> {
    let mut order = Vec::with_capacity(roster.len());
    let mut listed = AHashSet::new();

    if let Some(losses) = losses {
        for id in losses {
            if let Some(index) = roster.iter().position(|c| c.id == *id && c.fights()) {
                if listed.insert(index) {
                    order.push(index);
                }
            }
        }
    }

    let mut rest: Vec<usize> = (0..roster.len())
        .filter(|i| roster[*i].fights() && !listed.contains(i))
        .collect();
    rest.sort_by_key(|i| (roster[*i].power, roster[*i].cost, roster[*i].id));
    order.extend(rest);
    order
}

fn select_casualties(
    roster: &[Combatant],
    hits: u32,
    losses: Option<&[UnitId]>,
    keep_one_land: bool,
) -> Casualties {
    let order = casualty_order(roster, losses);
    let mut remaining = hits;
    let mut casualties = Casualties::default();

    // Multi-hit units soak damage before anything dies
    let mut damage = vec![0u8; roster.len()];
    for &index in &order {
        while remaining > 0 && roster[index].hp_left - damage[index] > 1 {
            damage[index] += 1;
            remaining -= 1;
        }
    }

    for &index in &order {
        if remaining == 0 {
            break;
        }
        casualties.killed.push(index);
        remaining -= 1;
    }

    if keep_one_land {
        spare_last_land_unit(roster, &mut casualties.killed);
    }

    casualties.damaged = damage
        .into_iter()
        .enumerate()
        .filter(|(index, amount)| *amount > 0 && !casualties.killed.contains(index))
        .collect();
    casualties
}

/// Swap the last land casualty for the cheapest surviving non-land unit
fn spare_last_land_unit(roster: &[Combatant], killed: &mut [usize]) {
    let land_survives = roster
        .iter()
        .enumerate()
        .any(|(i, c)| c.fights() && c.is_land && !killed.contains(&i));
    if land_survives {
        return;
    }

    let Some(last_land) = killed.iter().rposition(|&i| roster[i].is_land) else {
        return;
    };
    let replacement = roster
        .iter()
        .enumerate()
        .filter(|(i, c)| c.fights() && !c.is_land && !killed.contains(i))
        .min_by_key(|(_, c)| (c.cost, c.power, c.id))
        .map(|(i, _)| i);

    if let Some(replacement) = replacement {
        killed[last_land] = replacement;
    }
}

fn apply_casualties(
    bridge: &mut BattleBridge<'_>,
    location: TerritoryId,
    roster: &mut Vec<Combatant>,
    casualties: Casualties,
) -> Result<()> {
    for (index, amount) in casualties.damaged {
        let combatant = &mut roster[index];
        let to = combatant.hits.saturating_add(amount);
        bridge.apply(Change::UnitHits {
            unit: combatant.id,
            from: combatant.hits,
            to,
        })?;
        combatant.hits = to;
        combatant.hp_left -= amount;
    }

    let mut dead: AHashSet<UnitId> = casualties.killed.iter().map(|&i| roster[i].id).collect();
    // Cargo goes down with its transport
    let sunk: Vec<UnitId> = roster
        .iter()
        .filter(|c| c.cargo_of.is_some_and(|t| dead.contains(&t)))
        .map(|c| c.id)
        .collect();
    dead.extend(sunk);

    let removed: Vec<UnitId> = roster
        .iter()
        .filter(|c| dead.contains(&c.id))
        .map(|c| c.id)
        .collect();
    bridge.apply(Change::remove(location, removed))?;
    roster.retain(|c| !dead.contains(&c.id));
    Ok(())
}

fn roster_ids(roster: &[Combatant]) -> AHashSet<UnitId> {
    roster.iter().map(|c| c.id).collect()
}

/// Supplied units still standing
///
/// Units that never entered the roster (infrastructure) take no part in
/// the battle and are always still there.
fn survivors(supplied: &[Unit], entered: &AHashSet<UnitId>, roster: &[Combatant]) -> Vec<Unit> {
    let alive = roster_ids(roster);
    supplied
        .iter()
        .filter(|u| alive.contains(&u.id) || !entered.contains(&u.id))
        .copied()
        .collect()
}

impl CombatResolver for DiceResolver {
    fn resolve(&self, setup: &BattleSetup<'_>, bridge: &mut BattleBridge<'_>) -> Result<TrialOutcome> {
        let (at_sea, dice, mut attackers, mut defenders, bombarding) = {
            let state = bridge.state();
            let territory = state
                .territory(setup.location)
                .ok_or(OddsError::UnknownTerritory(setup.location))?;
            let at_sea = territory.is_water;
            let effects = setup.territory_effects;
            (
                at_sea,
                state.dice_sides(),
                roster(setup.attackers, state, effects, true, at_sea)?,
                roster(setup.defenders, state, effects, false, at_sea)?,
                roster(setup.bombarding, state, effects, true, false)?,
            )
        };
        let keep_one_land = setup.options.keep_one_attacking_land_unit && !at_sea;
        let attackers_entered = roster_ids(&attackers);
        let defenders_entered = roster_ids(&defenders);

        let mut round = 0;
        let winner = loop {
            let attackers_alive = has_fighters(&attackers);
            let defenders_alive = has_fighters(&defenders);
            if !attackers_alive || !defenders_alive {
                break match (attackers_alive, defenders_alive) {
                    (true, false) if at_sea || attackers.iter().any(|c| c.fights() && c.is_land) => {
                        BattleWinner::Attacker
                    }
                    (false, true) => BattleWinner::Defender,
                    _ => BattleWinner::Draw,
                };
            }

            if round >= setup.max_rounds {
                break BattleWinner::Draw;
            }
            let bombard_power = if round == 0 { total_power(&bombarding) } else { 0 };
            if total_power(&attackers) + bombard_power == 0 && total_power(&defenders) == 0 {
                break BattleWinner::Draw;
            }

            round += 1;
            let mut attacker_hits = roll_hits(bridge, &attackers, dice);
            if round == 1 {
                attacker_hits += roll_hits(bridge, &bombarding, dice);
            }
            let defender_hits = roll_hits(bridge, &defenders, dice);

            let defender_casualties =
                select_casualties(&defenders, attacker_hits, setup.defender_losses, false);
            let attacker_casualties =
                select_casualties(&attackers, defender_hits, setup.attacker_losses, keep_one_land);
            apply_casualties(bridge, setup.location, &mut defenders, defender_casualties)?;
            apply_casualties(bridge, setup.location, &mut attackers, attacker_casualties)?;

            if has_fighters(&attackers) && has_fighters(&defenders) {
                let fighting: Vec<&Combatant> = attackers.iter().filter(|c| c.fights()).collect();
                let view = RetreatView {
                    round,
                    units_left: fighting.len(),
                    air_units_left: fighting.iter().filter(|c| c.is_air).count(),
                };
                if should_retreat(setup.options, view) {
                    break BattleWinner::Defender;
                }
            }
        };

        Ok(TrialOutcome {
            winner: Some(winner),
            remaining_attackers: survivors(setup.attackers, &attackers_entered, &attackers),
            remaining_defenders: survivors(setup.defenders, &defenders_entered, &defenders),
            rounds: round,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combat::options::BattleOptions;
    use crate::core::types::{PlayerId, UnitTypeId};
    use crate::world::state::Territory;
    use crate::world::unit::{Domain, UnitType};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    const RED: PlayerId = PlayerId(1);
    const BLUE: PlayerId = PlayerId(2);
    const PLAINS: TerritoryId = TerritoryId(1);
    const STRAIT: TerritoryId = TerritoryId(2);

    const INFANTRY: UnitTypeId = UnitTypeId(1);
    const ARMOUR: UnitTypeId = UnitTypeId(2);
    const FIGHTER: UnitTypeId = UnitTypeId(3);
    const GUNNER: UnitTypeId = UnitTypeId(4);
    const BATTLESHIP: UnitTypeId = UnitTypeId(5);
    const TRANSPORT: UnitTypeId = UnitTypeId(6);
    const DESTROYER: UnitTypeId = UnitTypeId(7);
    const FORTRESS: UnitTypeId = UnitTypeId(8);
    const FACTORY: UnitTypeId = UnitTypeId(9);

    fn world() -> WorldState {
        let mut world = WorldState::new(6);
        world.add_player(RED, "Red");
        world.add_player(BLUE, "Blue");
        world.add_unit_type(UnitType::new(INFANTRY, "infantry", Domain::Land).with_cost(3));
        world.add_unit_type(UnitType::new(ARMOUR, "armour", Domain::Land).with_cost(6));
        world.add_unit_type(UnitType::new(FIGHTER, "fighter", Domain::Air).with_cost(10));
        world.add_unit_type(
            UnitType::new(GUNNER, "gunner", Domain::Land)
                .with_cost(4)
                .with_combat(6, 6),
        );
        world.add_unit_type(
            UnitType::new(BATTLESHIP, "battleship", Domain::Sea)
                .with_cost(20)
                .with_combat(6, 6)
                .with_hit_points(2),
        );
        world.add_unit_type(UnitType::new(TRANSPORT, "transport", Domain::Sea).with_cost(7));
        world.add_unit_type(UnitType::new(DESTROYER, "destroyer", Domain::Sea).with_cost(8));
        world.add_unit_type(
            UnitType::new(FORTRESS, "fortress", Domain::Land)
                .with_cost(12)
                .with_combat(0, 6)
                .with_hit_points(3),
        );
        world.add_unit_type(
            UnitType::new(FACTORY, "factory", Domain::Land)
                .with_cost(15)
                .infrastructure(),
        );
        world.add_territory(Territory::land(PLAINS, "Plains", Some(BLUE)));
        world.add_territory(Territory::sea(STRAIT, "Strait"));
        world
    }

    fn spawn(world: &mut WorldState, at: TerritoryId, unit_type: UnitTypeId, owner: PlayerId) -> Unit {
        world.spawn_unit(at, unit_type, owner).expect("spawn should succeed")
    }

    struct Battle<'a> {
        location: TerritoryId,
        attackers: &'a [Unit],
        defenders: &'a [Unit],
        bombarding: &'a [Unit],
        options: BattleOptions,
        attacker_losses: Option<&'a [UnitId]>,
        max_rounds: u32,
    }

    impl<'a> Battle<'a> {
        fn new(location: TerritoryId, attackers: &'a [Unit], defenders: &'a [Unit]) -> Self {
            Self {
                location,
                attackers,
                defenders,
                bombarding: &[],
                options: BattleOptions::default(),
                attacker_losses: None,
                max_rounds: 100,
            }
        }

        fn fight(&self, world: &mut WorldState) -> TrialOutcome {
            let setup = BattleSetup {
                attacker: RED,
                defender: BLUE,
                location: self.location,
                attackers: self.attackers,
                defenders: self.defenders,
                bombarding: self.bombarding,
                territory_effects: &[],
                options: &self.options,
                attacker_losses: self.attacker_losses,
                defender_losses: None,
                max_rounds: self.max_rounds,
            };
            let mut rng = ChaCha8Rng::seed_from_u64(11);
            let mut bridge = BattleBridge::new(world, &mut rng);
            let outcome = DiceResolver::new()
                .resolve(&setup, &mut bridge)
                .expect("battle should resolve");
            bridge.revert().expect("revert should apply");
            outcome
        }
    }

    #[test]
    fn test_certain_hits_win_in_one_round() {
        let mut world = world();
        let attackers: Vec<Unit> = (0..3).map(|_| spawn(&mut world, PLAINS, GUNNER, RED)).collect();
        let defenders: Vec<Unit> = (0..2).map(|_| spawn(&mut world, PLAINS, INFANTRY, BLUE)).collect();

        let outcome = Battle::new(PLAINS, &attackers, &defenders).fight(&mut world);

        assert!(outcome.attacker_won());
        assert_eq!(outcome.rounds, 1);
        assert_eq!(outcome.remaining_attackers, attackers);
        assert!(outcome.remaining_defenders.is_empty());
    }

    #[test]
    fn test_state_restored_after_revert() {
        let mut world = world();
        let attackers: Vec<Unit> = (0..3).map(|_| spawn(&mut world, PLAINS, GUNNER, RED)).collect();
        let defenders = vec![spawn(&mut world, PLAINS, FORTRESS, BLUE)];
        let before = world.clone();

        Battle::new(PLAINS, &attackers, &defenders).fight(&mut world);
        assert_eq!(world, before);
    }

    #[test]
    fn test_air_only_cannot_take_land() {
        let mut world = world();
        let fighters = vec![spawn(&mut world, PLAINS, FIGHTER, RED)];
        let defenders = vec![spawn(&mut world, PLAINS, INFANTRY, BLUE)];
        let mut world_armed = world.clone();
        world_armed.add_unit_type(
            UnitType::new(FIGHTER, "fighter", Domain::Air)
                .with_cost(10)
                .with_combat(6, 0),
        );

        let outcome = Battle::new(PLAINS, &fighters, &defenders).fight(&mut world_armed);
        assert!(outcome.is_draw());
        assert_eq!(outcome.remaining_attackers.len(), 1);
    }

    #[test]
    fn test_powerless_sides_draw_without_fighting() {
        let mut world = world();
        let attackers = vec![spawn(&mut world, PLAINS, INFANTRY, RED)];
        let defenders = vec![spawn(&mut world, PLAINS, ARMOUR, BLUE)];

        let outcome = Battle::new(PLAINS, &attackers, &defenders).fight(&mut world);
        assert!(outcome.is_draw());
        assert_eq!(outcome.rounds, 0);
    }

    #[test]
    fn test_round_cap_is_a_draw() {
        let mut world = world();
        let attackers = vec![spawn(&mut world, PLAINS, GUNNER, RED)];
        let defenders = vec![spawn(&mut world, PLAINS, GUNNER, BLUE)];

        let mut battle = Battle::new(PLAINS, &attackers, &defenders);
        battle.max_rounds = 0;
        let outcome = battle.fight(&mut world);
        assert!(outcome.is_draw());
        assert_eq!(outcome.remaining_attackers.len(), 1);
        assert_eq!(outcome.remaining_defenders.len(), 1);
    }

    #[test]
    fn test_mutual_destruction_is_a_draw() {
        let mut world = world();
        let attackers = vec![spawn(&mut world, PLAINS, GUNNER, RED)];
        let defenders = vec![spawn(&mut world, PLAINS, GUNNER, BLUE)];

        let outcome = Battle::new(PLAINS, &attackers, &defenders).fight(&mut world);
        assert!(outcome.is_draw());
        assert_eq!(outcome.rounds, 1);
        assert!(outcome.remaining_attackers.is_empty());
        assert!(outcome.remaining_defenders.is_empty());
    }

    #[test]
    fn test_two_hit_ship_takes_two_rounds() {
        let mut world = world();
        let attackers = vec![spawn(&mut world, STRAIT, BATTLESHIP, RED)];
        let defenders = vec![spawn(&mut world, STRAIT, TRANSPORT, BLUE)];
        let target = vec![spawn(&mut world, STRAIT, BATTLESHIP, BLUE)];
        let mut world_one = world.clone();

        // Battleship vs a defenceless transport: one round
        let outcome = Battle::new(STRAIT, &attackers, &defenders).fight(&mut world_one);
        assert!(outcome.attacker_won());
        assert_eq!(outcome.rounds, 1);

        // Battleship vs battleship: both damaged, then both sunk
        let outcome = Battle::new(STRAIT, &attackers, &target).fight(&mut world);
        assert!(outcome.is_draw());
        assert_eq!(outcome.rounds, 2);
    }

    #[test]
    fn test_keep_one_land_unit() {
        let mut world = world();
        let attackers = vec![
            spawn(&mut world, PLAINS, INFANTRY, RED),
            spawn(&mut world, PLAINS, FIGHTER, RED),
        ];
        let defenders = vec![spawn(&mut world, PLAINS, FORTRESS, BLUE)];

        let mut battle = Battle::new(PLAINS, &attackers, &defenders);
        battle.max_rounds = 1;
        let outcome = battle.fight(&mut world);
        assert_eq!(outcome.remaining_attackers, vec![attackers[1]]);

        battle.options.keep_one_attacking_land_unit = true;
        let outcome = battle.fight(&mut world);
        assert_eq!(outcome.remaining_attackers, vec![attackers[0]]);
    }

    #[test]
    fn test_order_of_losses_overrides_default() {
        let mut world = world();
        let attackers = vec![
            spawn(&mut world, PLAINS, INFANTRY, RED),
            spawn(&mut world, PLAINS, ARMOUR, RED),
        ];
        let defenders = vec![spawn(&mut world, PLAINS, FORTRESS, BLUE)];
        let losses = vec![attackers[1].id];

        let mut battle = Battle::new(PLAINS, &attackers, &defenders);
        battle.max_rounds = 1;
        battle.attacker_losses = Some(&losses);
        let outcome = battle.fight(&mut world);
        assert_eq!(outcome.remaining_attackers, vec![attackers[0]]);
    }

    #[test]
    fn test_retreat_hands_defender_the_win() {
        let mut world = world();
        let attackers: Vec<Unit> = (0..3).map(|_| spawn(&mut world, PLAINS, INFANTRY, RED)).collect();
        let defenders = vec![spawn(&mut world, PLAINS, FORTRESS, BLUE)];

        let mut battle = Battle::new(PLAINS, &attackers, &defenders);
        battle.options.retreat_after_round = Some(1);
        let outcome = battle.fight(&mut world);

        assert!(outcome.defender_won());
        assert_eq!(outcome.rounds, 1);
        assert_eq!(outcome.remaining_attackers.len(), 2);
    }

    #[test]
    fn test_cargo_sinks_with_transport() {
        let mut world = world();
        let transport = spawn(&mut world, STRAIT, TRANSPORT, RED);
        let destroyer = spawn(&mut world, STRAIT, DESTROYER, RED);
        let cargo_id = world.allocate_unit_id();
        let cargo = Unit::new(cargo_id, INFANTRY, RED).carried_by(transport.id);
        world.spawn(STRAIT, cargo).expect("spawn should succeed");
        let attackers = vec![transport, destroyer, cargo];
        let defenders = vec![spawn(&mut world, STRAIT, BATTLESHIP, BLUE)];

        let mut battle = Battle::new(STRAIT, &attackers, &defenders);
        battle.max_rounds = 1;
        let outcome = battle.fight(&mut world);
        assert_eq!(outcome.remaining_attackers, vec![destroyer]);
    }

    #[test]
    fn test_bombardment_fires_in_first_round() {
        let mut world = world();
        let attackers = vec![spawn(&mut world, PLAINS, INFANTRY, RED)];
        let defenders = vec![spawn(&mut world, PLAINS, INFANTRY, BLUE)];
        let ships = vec![spawn(&mut world, STRAIT, BATTLESHIP, RED)];

        let mut battle = Battle::new(PLAINS, &attackers, &defenders);
        battle.bombarding = &ships;
        let outcome = battle.fight(&mut world);
        assert!(outcome.attacker_won());
        assert_eq!(outcome.rounds, 1);
    }

    #[test]
    fn test_infrastructure_does_not_fight() {
        let mut world = world();
        let attackers = vec![spawn(&mut world, PLAINS, INFANTRY, RED)];
        let defenders = vec![spawn(&mut world, PLAINS, FACTORY, BLUE)];

        let outcome = Battle::new(PLAINS, &attackers, &defenders).fight(&mut world);
        assert!(outcome.attacker_won());
        assert_eq!(outcome.rounds, 0);
        assert_eq!(outcome.remaining_defenders, defenders);
    }

    #[test]
    fn test_infrastructure_survives_lost_battle() {
        let mut world = world();
        let attackers = vec![
            spawn(&mut world, PLAINS, GUNNER, RED),
            spawn(&mut world, PLAINS, GUNNER, RED),
        ];
        let infantry = spawn(&mut world, PLAINS, INFANTRY, BLUE);
        let factory = spawn(&mut world, PLAINS, FACTORY, BLUE);
        let defenders = vec![infantry, factory];

        let outcome = Battle::new(PLAINS, &attackers, &defenders).fight(&mut world);
        assert!(outcome.attacker_won());
        assert_eq!(outcome.remaining_defenders, vec![factory]);
    }
}
