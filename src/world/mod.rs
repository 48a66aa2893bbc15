//! World state for battle simulation
//!
//! An arena of players, unit types, territories and units addressed by stable
//! IDs. Trials mutate private snapshots through reversible `Change` values.

pub mod change;
pub mod costs;
pub mod snapshot;
pub mod state;
pub mod unit;

pub use change::{Change, ChangeJournal};
pub use costs::CostTable;
pub use snapshot::{DuplicationCost, Snapshot};
pub use state::{Player, Territory, WorldState};
pub use unit::{Domain, Unit, UnitType};
