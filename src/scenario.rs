//! TOML battle scenarios for headless runs
//!
//! A scenario describes a small world (players, unit types, territories
//! with their garrisons) and one battle in it, all by name:
//!
//! ```toml
//! runs = 2000
//!
//! [[players]]
//! id = 1
//! name = "Red"
//!
//! [[unit_types]]
//! id = 1
//! name = "infantry"
//! cost = 3
//! attack = 1
//! defense = 2
//! domain = "land"
//!
//! [[territories]]
//! id = 1
//! name = "Karelia"
//! owner = 2
//! units = [{ type = "infantry", owner = 2, count = 3 }]
//!
//! [battle]
//! attacker = 1
//! defender = 2
//! location = "Karelia"
//! attackers = [{ type = "infantry", count = 5 }]
//! ```
//!
//! When `battle.defenders` is left out, the defender's garrison at the
//! location defends.

use std::path::Path;

use serde::Deserialize;

use crate::combat::options::{BattleOptions, TerritoryEffect};
use crate::core::error::{OddsError, Result};
use crate::core::types::{PlayerId, TerritoryId, UnitTypeId};
use crate::odds::aggregate::ValueSwingContext;
use crate::odds::runner::Battle;
use crate::world::costs::CostTable;
use crate::world::state::{Territory, WorldState};
use crate::world::unit::{Domain, Unit, UnitType};

fn default_dice_sides() -> u32 {
    6
}

fn default_runs() -> usize {
    2000
}

fn default_count() -> u32 {
    1
}

fn default_hit_points() -> u8 {
    1
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlayerDef {
    pub id: u32,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UnitTypeDef {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub cost: u32,
    #[serde(default)]
    pub attack: u32,
    #[serde(default)]
    pub defense: u32,
    #[serde(default = "default_hit_points")]
    pub hit_points: u8,
    pub domain: Domain,
    #[serde(default)]
    pub infrastructure: bool,
}

/// `count` units of one type
#[derive(Debug, Clone, Deserialize)]
pub struct UnitGroup {
    #[serde(rename = "type")]
    pub unit_type: String,
    /// Only read for garrisons; battle groups belong to their side's player
    pub owner: Option<u32>,
    #[serde(default = "default_count")]
    pub count: u32,
    /// Damage already taken
    #[serde(default)]
    pub hits: u8,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TerritoryDef {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub water: bool,
    pub owner: Option<u32>,
    #[serde(default)]
    pub units: Vec<UnitGroup>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EffectDef {
    pub name: String,
    #[serde(default)]
    pub unit_types: Vec<String>,
    #[serde(default)]
    pub attack_bonus: i32,
    #[serde(default)]
    pub defense_bonus: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BattleDef {
    pub attacker: u32,
    pub defender: u32,
    pub location: String,
    #[serde(default)]
    pub attackers: Vec<UnitGroup>,
    /// None means the defender's garrison at the location
    pub defenders: Option<Vec<UnitGroup>>,
    #[serde(default)]
    pub bombarding: Vec<UnitGroup>,
    #[serde(default)]
    pub territory_effects: Vec<EffectDef>,
    #[serde(default)]
    pub options: BattleOptions,
}

/// A scenario file as written
#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    #[serde(default = "default_dice_sides")]
    pub dice_sides: u32,
    #[serde(default = "default_runs")]
    pub runs: usize,
    #[serde(default)]
    pub free_for_all: bool,
    pub players: Vec<PlayerDef>,
    pub unit_types: Vec<UnitTypeDef>,
    pub territories: Vec<TerritoryDef>,
    pub battle: BattleDef,
}

/// A scenario turned into engine inputs
#[derive(Debug, Clone)]
pub struct LoadedScenario {
    pub world: WorldState,
    pub battle: Battle,
    pub options: BattleOptions,
    pub costs: CostTable,
    pub value_swing: ValueSwingContext,
    pub runs: usize,
}

impl Scenario {
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Load a scenario from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Build the world and the battle
    pub fn build(&self) -> Result<LoadedScenario> {
        let mut world = WorldState::new(self.dice_sides);

        for player in &self.players {
            world.add_player(PlayerId(player.id), player.name.clone());
        }

        for def in &self.unit_types {
            let mut unit_type = UnitType::new(UnitTypeId(def.id), def.name.clone(), def.domain)
                .with_cost(def.cost)
                .with_combat(def.attack, def.defense)
                .with_hit_points(def.hit_points);
            if def.infrastructure {
                unit_type = unit_type.infrastructure();
            }
            world.add_unit_type(unit_type);
        }

        for def in &self.territories {
            let id = TerritoryId(def.id);
            let territory = if def.water {
                Territory::sea(id, def.name.clone())
            } else {
                Territory::land(id, def.name.clone(), def.owner.map(PlayerId))
            };
            world.add_territory(territory);
        }

        for def in &self.territories {
            for group in &def.units {
                let owner = group.owner.ok_or_else(|| {
                    OddsError::ScenarioError(format!(
                        "garrison of {} in {} needs an owner",
                        group.unit_type, def.name
                    ))
                })?;
                spawn_group(&mut world, TerritoryId(def.id), group, PlayerId(owner))?;
            }
        }

        let battle_def = &self.battle;
        let attacker = PlayerId(battle_def.attacker);
        let defender = PlayerId(battle_def.defender);
        let location = world
            .territory_by_name(&battle_def.location)
            .map(|t| t.id)
            .ok_or_else(|| {
                OddsError::ScenarioError(format!("unknown location '{}'", battle_def.location))
            })?;

        let attackers = detached_units(&mut world, &battle_def.attackers, attacker)?;
        let bombarding = detached_units(&mut world, &battle_def.bombarding, attacker)?;
        let defenders = match &battle_def.defenders {
            Some(groups) => detached_units(&mut world, groups, defender)?,
            None => world
                .units_at(location)
                .into_iter()
                .filter(|u| u.owner == defender)
                .collect(),
        };

        let territory_effects = battle_def
            .territory_effects
            .iter()
            .map(|effect| {
                let unit_types = effect
                    .unit_types
                    .iter()
                    .map(|name| type_id(&world, name))
                    .collect::<Result<Vec<_>>>()?;
                Ok(TerritoryEffect {
                    name: effect.name.clone(),
                    unit_types,
                    attack_bonus: effect.attack_bonus,
                    defense_bonus: effect.defense_bonus,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let battle = Battle::new(attacker, defender, location)
            .with_attackers(attackers)
            .with_defenders(defenders)
            .with_bombarding(bombarding)
            .with_territory_effects(territory_effects);
        let costs = CostTable::from_state(&world);
        let value_swing = ValueSwingContext::for_battle(&world, &battle, &costs, self.free_for_all);

        tracing::debug!(
            "Loaded scenario: {} attackers vs {} defenders at {}",
            battle.attackers.len(),
            battle.defenders.len(),
            battle_def.location
        );

        Ok(LoadedScenario {
            world,
            battle,
            options: battle_def.options.clone(),
            costs,
            value_swing,
            runs: self.runs,
        })
    }
}

fn type_id(world: &WorldState, name: &str) -> Result<UnitTypeId> {
    world
        .unit_type_by_name(name)
        .map(|t| t.id)
        .ok_or_else(|| OddsError::UnknownUnitType(name.to_string()))
}

fn spawn_group(
    world: &mut WorldState,
    territory: TerritoryId,
    group: &UnitGroup,
    owner: PlayerId,
) -> Result<()> {
    let unit_type = type_id(world, &group.unit_type)?;
    for _ in 0..group.count {
        let mut unit = Unit::new(world.allocate_unit_id(), unit_type, owner);
        unit.hits = group.hits;
        world.spawn(territory, unit)?;
    }
    Ok(())
}

/// Units with fresh IDs that are not placed anywhere yet
fn detached_units(world: &mut WorldState, groups: &[UnitGroup], owner: PlayerId) -> Result<Vec<Unit>> {
    let mut units = Vec::new();
    for group in groups {
        let unit_type = type_id(world, &group.unit_type)?;
        for _ in 0..group.count {
            let mut unit = Unit::new(world.allocate_unit_id(), unit_type, owner);
            unit.hits = group.hits;
            units.push(unit);
        }
    }
    Ok(units)
}
