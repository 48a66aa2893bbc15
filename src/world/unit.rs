//! Unit types and unit records
//!
//! A `Unit` is a small copyable record; everything descriptive lives on its
//! `UnitType` so trial outcomes can carry whole units cheaply.

use serde::{Deserialize, Serialize};

use crate::core::types::{PlayerId, UnitId, UnitTypeId};

/// Movement domain of a unit type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Land,
    Sea,
    Air,
}

/// Static description of a kind of unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitType {
    pub id: UnitTypeId,
    pub name: String,
    /// Purchase cost, the basis of the value-swing statistic
    pub cost: u32,
    /// Hits on a die roll <= attack
    pub attack: u32,
    /// Hits on a die roll <= defense
    pub defense: u32,
    pub hit_points: u8,
    pub domain: Domain,
    /// Factories and similar: present in a territory but never fight
    #[serde(default)]
    pub is_infrastructure: bool,
}

impl UnitType {
    pub fn new(id: UnitTypeId, name: impl Into<String>, domain: Domain) -> Self {
        Self {
            id,
            name: name.into(),
            cost: 0,
            attack: 0,
            defense: 0,
            hit_points: 1,
            domain,
            is_infrastructure: false,
        }
    }

    pub fn with_cost(mut self, cost: u32) -> Self {
        self.cost = cost;
        self
    }

    pub fn with_combat(mut self, attack: u32, defense: u32) -> Self {
        self.attack = attack;
        self.defense = defense;
        self
    }

    pub fn with_hit_points(mut self, hit_points: u8) -> Self {
        self.hit_points = hit_points.max(1);
        self
    }

    pub fn infrastructure(mut self) -> Self {
        self.is_infrastructure = true;
        self
    }

    pub fn is_land(&self) -> bool {
        self.domain == Domain::Land
    }

    pub fn is_air(&self) -> bool {
        self.domain == Domain::Air
    }
}

/// One unit in the world arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Unit {
    pub id: UnitId,
    pub unit_type: UnitTypeId,
    pub owner: PlayerId,
    /// Damage already taken; the unit dies when this reaches its hit points
    pub hits: u8,
    /// Carrier of this unit while it is embarked
    pub transported_by: Option<UnitId>,
}

impl Unit {
    pub fn new(id: UnitId, unit_type: UnitTypeId, owner: PlayerId) -> Self {
        Self {
            id,
            unit_type,
            owner,
            hits: 0,
            transported_by: None,
        }
    }

    pub fn carried_by(mut self, transport: UnitId) -> Self {
        self.transported_by = Some(transport);
        self
    }

    pub fn is_transported(&self) -> bool {
        self.transported_by.is_some()
    }
}
