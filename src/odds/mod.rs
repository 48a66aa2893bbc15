//! The battle-odds engine: trial runners, statistics and the worker pool

pub mod aggregate;
pub mod cancel;
pub mod distribute;
pub mod runner;
pub mod sizing;
pub mod supervisor;

pub use crate::combat::outcome::{BattleWinner, TrialOutcome};
pub use aggregate::{ResultAggregator, ValueSwingContext};
pub use cancel::CancellationToken;
pub use distribute::split;
pub use runner::{Battle, TrialRunner};
pub use sizing::{plan_worker_count, MemoryBudget};
pub use supervisor::{ConfigurationTicket, Phase, PoolOutcome, WorkerPoolSupervisor};
