//! Per-calculation battle options and territory effects
//!
//! These are plain data handed to the resolver unchanged. The trial runner
//! never interprets them.

use serde::{Deserialize, Serialize};

use crate::core::types::UnitTypeId;

/// Headless-player behavior for a simulated battle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BattleOptions {
    /// Attacker retreats once this round has been fought (None = never)
    pub retreat_after_round: Option<u32>,

    /// Attacker retreats once this many units or fewer remain (None = never)
    pub retreat_after_units_left: Option<u32>,

    /// Attacker retreats when nothing but air units remain
    ///
    /// Combined with `retreat_after_units_left`, that many non-air units may
    /// also remain (e.g. one strong tank that is always taken last).
    pub retreat_when_only_air_left: bool,

    /// Attacker casualty selection never kills the last land unit while a
    /// non-land unit could be taken instead
    pub keep_one_attacking_land_unit: bool,

    /// Attackers landed from the sea and cannot retreat
    pub amphibious: bool,

    /// Fixed order of losses for the attacker, e.g. `"2^infantry;*^armour"`
    pub attacker_order_of_losses: Option<String>,

    /// Fixed order of losses for the defender
    pub defender_order_of_losses: Option<String>,
}

impl BattleOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when any attacker retreat rule is active
    pub fn has_retreat_rule(&self) -> bool {
        self.retreat_after_round.is_some()
            || self.retreat_after_units_left.is_some()
            || self.retreat_when_only_air_left
    }
}

/// Terrain modifier to attack and defense values
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerritoryEffect {
    pub name: String,
    /// Affected unit types; empty means every unit
    #[serde(default)]
    pub unit_types: Vec<UnitTypeId>,
    #[serde(default)]
    pub attack_bonus: i32,
    #[serde(default)]
    pub defense_bonus: i32,
}

impl TerritoryEffect {
    pub fn applies_to(&self, unit_type: UnitTypeId) -> bool {
        self.unit_types.is_empty() || self.unit_types.contains(&unit_type)
    }
}

/// Sum of bonuses from all effects that touch a unit type
pub fn combat_bonus(effects: &[TerritoryEffect], unit_type: UnitTypeId, attacking: bool) -> i32 {
    effects
        .iter()
        .filter(|e| e.applies_to(unit_type))
        .map(|e| if attacking { e.attack_bonus } else { e.defense_bonus })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options_never_retreat() {
        let options = BattleOptions::default();
        assert!(!options.has_retreat_rule());
        assert!(!options.amphibious);
    }

    #[test]
    fn test_combat_bonus_filters_by_type() {
        let effects = vec![
            TerritoryEffect {
                name: "mountain".into(),
                unit_types: vec![UnitTypeId(2)],
                attack_bonus: -1,
                defense_bonus: 0,
            },
            TerritoryEffect {
                name: "fortified".into(),
                unit_types: Vec::new(),
                attack_bonus: 0,
                defense_bonus: 1,
            },
        ];

        assert_eq!(combat_bonus(&effects, UnitTypeId(2), true), -1);
        assert_eq!(combat_bonus(&effects, UnitTypeId(1), true), 0);
        assert_eq!(combat_bonus(&effects, UnitTypeId(1), false), 1);
    }
}
