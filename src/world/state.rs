//! Arena world state: players, unit types, territories and units by stable ID
//!
//! Territories hold unit IDs, never units. All mutation during a trial goes
//! through `Change` values (see `world::change`), which call the crate-private
//! primitives at the bottom of this file.

use std::collections::BTreeSet;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::core::error::{OddsError, Result};
use crate::core::types::{PlayerId, TerritoryId, UnitId, UnitTypeId};
use crate::world::unit::{Unit, UnitType};

/// A participant in the game
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
}

/// A land territory or sea zone
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Territory {
    pub id: TerritoryId,
    pub name: String,
    pub is_water: bool,
    /// None for sea zones and unowned neutral land
    pub owner: Option<PlayerId>,
    pub(crate) units: BTreeSet<UnitId>,
}

impl Territory {
    pub fn land(id: TerritoryId, name: impl Into<String>, owner: Option<PlayerId>) -> Self {
        Self {
            id,
            name: name.into(),
            is_water: false,
            owner,
            units: BTreeSet::new(),
        }
    }

    pub fn sea(id: TerritoryId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            is_water: true,
            owner: None,
            units: BTreeSet::new(),
        }
    }

    /// Unowned land
    pub fn is_neutral(&self) -> bool {
        !self.is_water && self.owner.is_none()
    }

    pub fn unit_ids(&self) -> impl Iterator<Item = UnitId> + '_ {
        self.units.iter().copied()
    }

    pub fn unit_count(&self) -> usize {
        self.units.len()
    }
}

/// The mutable world data a battle needs
#[derive(Debug, Clone, PartialEq)]
pub struct WorldState {
    pub(crate) dice_sides: u32,
    pub(crate) players: AHashMap<PlayerId, Player>,
    pub(crate) unit_types: AHashMap<UnitTypeId, UnitType>,
    pub(crate) territories: AHashMap<TerritoryId, Territory>,
    pub(crate) units: AHashMap<UnitId, Unit>,
    pub(crate) next_unit_id: u32,
}

impl Default for WorldState {
    fn default() -> Self {
        Self::new(6)
    }
}

impl WorldState {
    pub fn new(dice_sides: u32) -> Self {
        Self {
            dice_sides: dice_sides.max(1),
            players: AHashMap::new(),
            unit_types: AHashMap::new(),
            territories: AHashMap::new(),
            units: AHashMap::new(),
            next_unit_id: 1,
        }
    }

    pub fn dice_sides(&self) -> u32 {
        self.dice_sides
    }

    // === BUILDING ===

    pub fn add_player(&mut self, id: PlayerId, name: impl Into<String>) {
        self.players.insert(
            id,
            Player {
                id,
                name: name.into(),
            },
        );
    }

    pub fn add_unit_type(&mut self, unit_type: UnitType) {
        self.unit_types.insert(unit_type.id, unit_type);
    }

    pub fn add_territory(&mut self, territory: Territory) {
        self.territories.insert(territory.id, territory);
    }

    /// Create a unit with a fresh ID and place it in a territory
    pub fn spawn_unit(
        &mut self,
        territory: TerritoryId,
        unit_type: UnitTypeId,
        owner: PlayerId,
    ) -> Result<Unit> {
        let unit = Unit::new(self.allocate_unit_id(), unit_type, owner);
        self.spawn(territory, unit)?;
        Ok(unit)
    }

    /// Insert a fully described unit and place it in a territory
    pub fn spawn(&mut self, territory: TerritoryId, unit: Unit) -> Result<()> {
        if !self.unit_types.contains_key(&unit.unit_type) {
            return Err(OddsError::UnknownUnitType(unit.unit_type.to_string()));
        }
        if !self.players.contains_key(&unit.owner) {
            return Err(OddsError::UnknownPlayer(unit.owner));
        }
        if !self.territories.contains_key(&territory) {
            return Err(OddsError::UnknownTerritory(territory));
        }
        self.insert_unit(unit)?;
        self.place(territory, unit.id)?;
        self.next_unit_id = self.next_unit_id.max(unit.id.0.saturating_add(1));
        Ok(())
    }

    /// A unit ID not used by any unit in this state
    pub fn allocate_unit_id(&mut self) -> UnitId {
        while self.units.contains_key(&UnitId(self.next_unit_id)) {
            self.next_unit_id = self.next_unit_id.wrapping_add(1);
        }
        let id = UnitId(self.next_unit_id);
        self.next_unit_id = self.next_unit_id.wrapping_add(1);
        id
    }

    // === QUERIES ===

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(&id)
    }

    pub fn unit_type(&self, id: UnitTypeId) -> Option<&UnitType> {
        self.unit_types.get(&id)
    }

    pub fn unit_type_by_name(&self, name: &str) -> Option<&UnitType> {
        self.unit_types.values().find(|t| t.name == name)
    }

    pub fn unit_types(&self) -> impl Iterator<Item = &UnitType> {
        self.unit_types.values()
    }

    pub fn territory(&self, id: TerritoryId) -> Option<&Territory> {
        self.territories.get(&id)
    }

    pub fn territory_by_name(&self, name: &str) -> Option<&Territory> {
        self.territories.values().find(|t| t.name == name)
    }

    pub fn unit(&self, id: UnitId) -> Option<&Unit> {
        self.units.get(&id)
    }

    pub fn contains_unit(&self, id: UnitId) -> bool {
        self.units.contains_key(&id)
    }

    /// Units located in a territory, in ID order
    pub fn units_at(&self, territory: TerritoryId) -> Vec<Unit> {
        self.territories
            .get(&territory)
            .map(|t| t.units.iter().filter_map(|id| self.units.get(id)).copied().collect())
            .unwrap_or_default()
    }

    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    pub fn territory_count(&self) -> usize {
        self.territories.len()
    }

    /// Type of a unit, failing if either is missing from this state
    pub fn type_of(&self, unit: &Unit) -> Result<&UnitType> {
        self.unit_types
            .get(&unit.unit_type)
            .ok_or_else(|| OddsError::UnknownUnitType(unit.unit_type.to_string()))
    }

    /// Approximate heap size of this state in bytes
    ///
    /// Used as the portable memory signal for worker sizing.
    pub fn footprint_bytes(&self) -> u64 {
        use std::mem::size_of;

        let map_entry = |key: usize, value: usize| (key + value + 1) as u64;
        let players: u64 = self
            .players
            .values()
            .map(|p| map_entry(size_of::<PlayerId>(), size_of::<Player>()) + p.name.len() as u64)
            .sum();
        let unit_types: u64 = self
            .unit_types
            .values()
            .map(|t| {
                map_entry(size_of::<UnitTypeId>(), size_of::<UnitType>()) + t.name.len() as u64
            })
            .sum();
        let territories: u64 = self
            .territories
            .values()
            .map(|t| {
                map_entry(size_of::<TerritoryId>(), size_of::<Territory>())
                    + t.name.len() as u64
                    + (t.units.len() * size_of::<UnitId>() * 2) as u64
            })
            .sum();
        let units = self.units.len() as u64 * map_entry(size_of::<UnitId>(), size_of::<Unit>());

        size_of::<Self>() as u64 + players + unit_types + territories + units
    }

    // === PRIMITIVES (used by Change::apply) ===

    pub(crate) fn insert_unit(&mut self, unit: Unit) -> Result<()> {
        if self.units.contains_key(&unit.id) {
            return Err(OddsError::InvalidChange(format!(
                "{} already exists",
                unit.id
            )));
        }
        self.units.insert(unit.id, unit);
        Ok(())
    }

    pub(crate) fn remove_unit(&mut self, unit: &Unit) -> Result<()> {
        match self.units.get(&unit.id) {
            Some(existing) if existing == unit => {
                self.units.remove(&unit.id);
                Ok(())
            }
            Some(_) => Err(OddsError::InvalidChange(format!(
                "{} does not match the record being removed",
                unit.id
            ))),
            None => Err(OddsError::UnknownUnit(unit.id)),
        }
    }

    pub(crate) fn place(&mut self, territory: TerritoryId, unit: UnitId) -> Result<()> {
        if !self.units.contains_key(&unit) {
            return Err(OddsError::UnknownUnit(unit));
        }
        let territory = self
            .territories
            .get_mut(&territory)
            .ok_or(OddsError::UnknownTerritory(territory))?;
        if !territory.units.insert(unit) {
            return Err(OddsError::InvalidChange(format!(
                "{} is already in {}",
                unit, territory.id
            )));
        }
        Ok(())
    }

    pub(crate) fn displace(&mut self, territory: TerritoryId, unit: UnitId) -> Result<()> {
        let territory = self
            .territories
            .get_mut(&territory)
            .ok_or(OddsError::UnknownTerritory(territory))?;
        if !territory.units.remove(&unit) {
            return Err(OddsError::InvalidChange(format!(
                "{} is not in {}",
                unit, territory.id
            )));
        }
        Ok(())
    }

    pub(crate) fn set_hits(&mut self, unit: UnitId, from: u8, to: u8) -> Result<()> {
        let record = self.units.get_mut(&unit).ok_or(OddsError::UnknownUnit(unit))?;
        if record.hits != from {
            return Err(OddsError::InvalidChange(format!(
                "{} has {} hits, expected {}",
                unit, record.hits, from
            )));
        }
        record.hits = to;
        Ok(())
    }
}
