pub mod config;
pub mod error;
pub mod types;

pub use config::{load_config, EngineConfig, SizingPolicy, ValueSwingWeights};
pub use error::{OddsError, Result};
pub use types::{PlayerId, Side, TerritoryId, UnitId, UnitTypeId};
