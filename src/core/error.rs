use std::collections::TryReserveError;

use thiserror::Error;

use crate::core::types::{PlayerId, TerritoryId, UnitId};

#[derive(Error, Debug)]
pub enum OddsError {
    #[error("Territory not found: {0}")]
    UnknownTerritory(TerritoryId),

    #[error("Unit not found: {0}")]
    UnknownUnit(UnitId),

    #[error("Unit type not found: {0}")]
    UnknownUnitType(String),

    #[error("Player not found: {0}")]
    UnknownPlayer(PlayerId),

    #[error("Invalid change: {0}")]
    InvalidChange(String),

    #[error("Allocation failed while duplicating world state: {0}")]
    Allocation(#[from] TryReserveError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid order of losses: {0}")]
    InvalidOrderOfLosses(String),

    #[error("Worker thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Battle calculator has been shut down")]
    ShutDown,

    #[error("Worker failed: {0}")]
    WorkerFailed(String),

    #[error("Scenario error: {0}")]
    ScenarioError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, OddsError>;
