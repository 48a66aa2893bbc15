//! Battle Odds - Monte Carlo battle outcome estimation
//!
//! Runs many randomized dice battles against private copies of a world
//! state, spread over a pool of workers, and aggregates the outcomes into
//! win rates, expected survivors and value swing.

pub mod combat;
pub mod core;
pub mod odds;
pub mod scenario;
pub mod world;
