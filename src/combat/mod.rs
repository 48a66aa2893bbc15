//! Battle resolution: the pluggable resolver boundary and the default dice resolver

pub mod dice;
pub mod options;
pub mod order_of_losses;
pub mod outcome;
pub mod resolver;
pub mod retreat;

pub use dice::DiceResolver;
pub use options::{combat_bonus, BattleOptions, TerritoryEffect};
pub use order_of_losses::{
    is_valid_order_of_losses, parse_order_of_losses, units_by_order_of_losses, LossSection,
};
pub use outcome::{BattleWinner, TrialOutcome};
pub use resolver::{BattleBridge, BattleSetup, CombatResolver};
pub use retreat::{should_retreat, RetreatView};
