//! Result of one resolved battle

use serde::{Deserialize, Serialize};

use crate::core::types::Side;
use crate::world::unit::Unit;

/// Who won a battle that was actually fought
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BattleWinner {
    Attacker,
    Defender,
    /// Mutual destruction, air-only attackers over land, or round cap reached
    Draw,
}

/// One trial: winner, survivors on both sides, rounds fought
///
/// Survivor lists are always subsets of the units supplied to the trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialOutcome {
    /// None when no battle took place (an empty side or an unknown location)
    pub winner: Option<BattleWinner>,
    pub remaining_attackers: Vec<Unit>,
    pub remaining_defenders: Vec<Unit>,
    pub rounds: u32,
}

impl TrialOutcome {
    /// Degenerate outcome: nobody fought, everyone is still there
    pub fn no_battle(attackers: &[Unit], defenders: &[Unit]) -> Self {
        Self {
            winner: None,
            remaining_attackers: attackers.to_vec(),
            remaining_defenders: defenders.to_vec(),
            rounds: 0,
        }
    }

    pub fn attacker_won(&self) -> bool {
        self.winner == Some(BattleWinner::Attacker)
    }

    pub fn defender_won(&self) -> bool {
        self.winner == Some(BattleWinner::Defender)
    }

    pub fn is_draw(&self) -> bool {
        self.winner == Some(BattleWinner::Draw)
    }

    pub fn won_by(&self, side: Side) -> bool {
        match side {
            Side::Attacker => self.attacker_won(),
            Side::Defender => self.defender_won(),
        }
    }

    pub fn remaining(&self, side: Side) -> &[Unit] {
        match side {
            Side::Attacker => &self.remaining_attackers,
            Side::Defender => &self.remaining_defenders,
        }
    }

    pub fn units_left(&self, side: Side) -> usize {
        self.remaining(side).len()
    }
}
