//! Attacker retreat decisions for headless battles
//!
//! The simulated attacker may always retreat into the battle site itself;
//! the calculator does not know where the attackers came from.

use crate::combat::options::BattleOptions;

/// What the attacker has left after a round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetreatView {
    /// Rounds fought so far, including the current one
    pub round: u32,
    pub units_left: usize,
    pub air_units_left: usize,
}

/// Should the attacker withdraw now
pub fn should_retreat(options: &BattleOptions, view: RetreatView) -> bool {
    if options.amphibious {
        return false;
    }

    if let Some(after_round) = options.retreat_after_round {
        if view.round >= after_round {
            return true;
        }
    }

    if options.retreat_when_only_air_left {
        let allowed_non_air = options.retreat_after_units_left.unwrap_or(0) as usize;
        if view.air_units_left + allowed_non_air >= view.units_left {
            return true;
        }
    }

    if let Some(units) = options.retreat_after_units_left {
        if units as usize >= view.units_left {
            return true;
        }
    }

    false
}
