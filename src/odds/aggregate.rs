//! Statistics over a batch of trial outcomes
//!
//! The full outcome list is kept so the representative trial can be found
//! after the fact. Every statistic is computed on demand from that list,
//! which makes merging a plain concatenation.

use std::time::Duration;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::combat::outcome::TrialOutcome;
use crate::core::config::ValueSwingWeights;
use crate::core::types::{PlayerId, Side};
use crate::odds::runner::Battle;
use crate::world::costs::CostTable;
use crate::world::state::WorldState;
use crate::world::unit::Unit;

/// Where the battle was fought, for the value-swing special cases
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValueSwingContext {
    pub is_water: bool,
    /// Land owned by nobody; the defenders are not a real opponent
    pub is_neutral: bool,
    /// Free-for-all game: a positive swing also helps third parties
    pub free_for_all: bool,
    /// Units riding transports that sink with them
    pub defending_cargo_value: u64,
}

impl ValueSwingContext {
    /// Read the location flags and the defending cargo off a battle
    pub fn for_battle(state: &WorldState, battle: &Battle, costs: &CostTable, free_for_all: bool) -> Self {
        let territory = state.territory(battle.location);
        let is_water = territory.map(|t| t.is_water).unwrap_or(false);
        let cargo = battle.defenders.iter().filter(|u| u.is_transported());
        Self {
            is_water,
            is_neutral: territory.map(|t| t.is_neutral()).unwrap_or(false),
            free_for_all,
            defending_cargo_value: if is_water { costs.value_of(battle.defender, cargo) } else { 0 },
        }
    }
}

/// Accumulated trial outcomes plus the wall-clock time spent on them
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultAggregator {
    outcomes: Vec<TrialOutcome>,
    time: Duration,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(trials: usize) -> Self {
        Self {
            outcomes: Vec::with_capacity(trials),
            time: Duration::ZERO,
        }
    }

    pub fn add(&mut self, outcome: TrialOutcome) {
        self.outcomes.push(outcome);
    }

    /// Fold another aggregator in: outcomes concatenated, time summed
    pub fn merge(&mut self, other: ResultAggregator) {
        self.outcomes.extend(other.outcomes);
        self.time += other.time;
    }

    pub fn outcomes(&self) -> &[TrialOutcome] {
        &self.outcomes
    }

    /// Effective sample size; below the requested count after a cancel
    pub fn count(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn time(&self) -> Duration {
        self.time
    }

    pub fn set_time(&mut self, time: Duration) {
        self.time = time;
    }

    fn fraction(&self, matches: impl Fn(&TrialOutcome) -> bool) -> f64 {
        if self.outcomes.is_empty() {
            return 0.0;
        }
        let hits = self.outcomes.iter().filter(|&o| matches(o)).count();
        hits as f64 / self.outcomes.len() as f64
    }

    // === WIN RATES ===

    pub fn attacker_win_percent(&self) -> f64 {
        self.fraction(TrialOutcome::attacker_won)
    }

    pub fn defender_win_percent(&self) -> f64 {
        self.fraction(TrialOutcome::defender_won)
    }

    pub fn draw_percent(&self) -> f64 {
        self.fraction(TrialOutcome::is_draw)
    }

    // === SURVIVORS ===

    pub fn average_units_left(&self, side: Side) -> f64 {
        if self.outcomes.is_empty() {
            return 0.0;
        }
        let total: usize = self.outcomes.iter().map(|o| o.units_left(side)).sum();
        total as f64 / self.outcomes.len() as f64
    }

    /// Mean survivors over the trials `side` won; 0 if it never won
    pub fn average_units_left_when_won(&self, side: Side) -> f64 {
        let (won, total) = self
            .outcomes
            .iter()
            .filter(|o| o.won_by(side))
            .fold((0usize, 0usize), |(won, total), o| (won + 1, total + o.units_left(side)));
        if won == 0 {
            0.0
        } else {
            total as f64 / won as f64
        }
    }

    /// Mean rounds fought; 1 when nothing was simulated
    pub fn average_rounds_fought(&self) -> f64 {
        let rounds: u64 = self.outcomes.iter().map(|o| u64::from(o.rounds)).sum();
        if rounds == 0 {
            return 1.0;
        }
        rounds as f64 / self.outcomes.len() as f64
    }

    /// The trial whose survivor counts sit closest to the means
    ///
    /// Distance is the sum of absolute deviations on both sides. Ties go to
    /// the earliest stored outcome.
    pub fn representative_outcome(&self) -> Option<&TrialOutcome> {
        let mean_attackers = self.average_units_left(Side::Attacker);
        let mean_defenders = self.average_units_left(Side::Defender);

        self.outcomes
            .iter()
            .enumerate()
            .min_by_key(|(index, o)| {
                let distance = (o.units_left(Side::Attacker) as f64 - mean_attackers).abs()
                    + (o.units_left(Side::Defender) as f64 - mean_defenders).abs();
                (OrderedFloat(distance), *index)
            })
            .map(|(_, o)| o)
    }

    // === VALUE ===

    /// Mean value of each side's survivors: (attacker, defender)
    pub fn average_value_left_over(
        &self,
        attacker: PlayerId,
        defender: PlayerId,
        costs: &CostTable,
    ) -> (f64, f64) {
        if self.outcomes.is_empty() {
            return (0.0, 0.0);
        }
        let (attackers, defenders) = self.outcomes.iter().fold((0u64, 0u64), |(a, d), o| {
            (
                a + costs.value_of(attacker, &o.remaining_attackers),
                d + costs.value_of(defender, &o.remaining_defenders),
            )
        });
        let n = self.outcomes.len() as f64;
        (attackers as f64 / n, defenders as f64 / n)
    }

    /// Expected defender value lost minus expected attacker value lost
    #[allow(clippy::too_many_arguments)]
    pub fn average_value_swing(
        &self,
        attacker: PlayerId,
        attackers: &[Unit],
        defender: PlayerId,
        defenders: &[Unit],
        costs: &CostTable,
        context: ValueSwingContext,
        weights: &ValueSwingWeights,
    ) -> f64 {
        if self.outcomes.is_empty() {
            return 0.0;
        }

        let attacker_start = costs.value_of(attacker, attackers) as f64;
        let defender_start = costs.value_of(defender, defenders) as f64;
        let (attacker_left, defender_left) = self.average_value_left_over(attacker, defender, costs);

        let mut swing = if context.is_neutral {
            // Neutral defenders are not anybody's loss
            attacker_left - attacker_start
        } else {
            (defender_start - defender_left) - (attacker_start - attacker_left)
        };

        if context.is_water && context.defending_cargo_value > 0 {
            swing += context.defending_cargo_value as f64
                * self.attacker_win_percent()
                * weights.cargo_win_weight;
        }

        if context.free_for_all && swing > 0.0 {
            swing *= weights.free_for_all_weight;
        }

        swing
    }
}
