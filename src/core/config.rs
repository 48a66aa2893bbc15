//! Engine configuration with documented constants
//!
//! All tunables of the odds engine are collected here with explanations of
//! their purpose and how they interact with each other.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::error::{OddsError, Result};

/// Worker-count policy driven by the cost of one world-state duplication
///
/// Only the floor of one worker and the single measuring duplication are
/// fixed behavior. The thresholds are tuning knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SizingPolicy {
    /// Copy time above which only one worker is created (milliseconds)
    ///
    /// At 20s a second copy would stall the caller longer than the
    /// extra parallelism could ever repay.
    pub long_copy_ms: u64,

    /// Copy time above which the pool is capped at half the hardware threads
    pub short_copy_ms: u64,

    /// Floor for the measured size of one copy (bytes)
    ///
    /// Small maps measure close to zero, which would otherwise let the
    /// memory estimate allow an unbounded number of copies.
    pub min_copy_bytes: u64,
}

impl Default for SizingPolicy {
    fn default() -> Self {
        Self {
            long_copy_ms: 20_000,
            short_copy_ms: 3_000,
            min_copy_bytes: 100_000,
        }
    }
}

impl SizingPolicy {
    pub fn long_copy(&self) -> Duration {
        Duration::from_millis(self.long_copy_ms)
    }

    pub fn short_copy(&self) -> Duration {
        Duration::from_millis(self.short_copy_ms)
    }
}

/// Weights for the special cases of the value-swing statistic
///
/// These were tuned by play-testing rather than derived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValueSwingWeights {
    /// Share of defending cargo value credited per unit of attacker win fraction
    ///
    /// Cargo units in a sea battle never fight; they sink with their
    /// transport, so their value is lost whenever the attacker wins.
    pub cargo_win_weight: f64,

    /// Scale applied to a positive swing in free-for-all games
    ///
    /// Weakening one opponent in a free-for-all also helps the others.
    pub free_for_all_weight: f64,
}

impl Default for ValueSwingWeights {
    fn default() -> Self {
        Self {
            cargo_win_weight: 1.0,
            free_for_all_weight: 0.5,
        }
    }
}

/// Configuration for the odds engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    // === WORKER POOL ===
    /// Maximum number of worker threads (None = hardware parallelism)
    pub max_threads: Option<usize>,

    /// Prefix for the names of the engine's rayon threads
    pub thread_name_prefix: String,

    /// Cost-based sizing thresholds
    pub sizing: SizingPolicy,

    /// Portable memory budget for snapshot copies (bytes)
    ///
    /// Stands in for the maximum heap size: the sizing step divides the
    /// part of this budget not already used by live snapshots by the
    /// measured size of one copy.
    pub memory_budget_bytes: u64,

    // === SIMULATION ===
    /// Fixed base seed for reproducible calculations (None = fresh entropy)
    ///
    /// Each worker derives its own ChaCha stream from the base seed, so a
    /// fixed seed and a fixed worker count reproduce every statistic.
    pub seed: Option<u64>,

    /// Round cap for the default resolver; a battle still running is a draw
    pub max_rounds: u32,

    // === STATISTICS ===
    /// Value-swing special-case weights
    pub value_swing: ValueSwingWeights,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_threads: None,
            thread_name_prefix: "battle-odds".to_string(),
            sizing: SizingPolicy::default(),
            memory_budget_bytes: 4 * 1024 * 1024 * 1024,
            seed: None,
            max_rounds: 100,
            value_swing: ValueSwingWeights::default(),
        }
    }
}

impl EngineConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a config from TOML; missing fields take their defaults
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Number of threads the engine may use
    pub fn thread_count(&self) -> usize {
        let hardware = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        self.max_threads.unwrap_or(hardware).max(1)
    }

    /// Validate configuration for internal consistency
    pub fn validate(&self) -> Result<()> {
        if self.max_threads == Some(0) {
            return Err(OddsError::InvalidConfig(
                "max_threads must be at least 1".into(),
            ));
        }

        if self.sizing.short_copy_ms > self.sizing.long_copy_ms {
            return Err(OddsError::InvalidConfig(format!(
                "sizing.short_copy_ms ({}) should be <= sizing.long_copy_ms ({})",
                self.sizing.short_copy_ms, self.sizing.long_copy_ms
            )));
        }

        if self.sizing.min_copy_bytes == 0 {
            return Err(OddsError::InvalidConfig(
                "sizing.min_copy_bytes must be positive".into(),
            ));
        }

        if self.max_rounds == 0 {
            return Err(OddsError::InvalidConfig("max_rounds must be positive".into()));
        }

        let weights = &self.value_swing;
        if !weights.cargo_win_weight.is_finite() || !weights.free_for_all_weight.is_finite() {
            return Err(OddsError::InvalidConfig(
                "value_swing weights must be finite".into(),
            ));
        }

        Ok(())
    }
}

/// Load an engine config from a TOML file
pub fn load_config(path: &Path) -> Result<EngineConfig> {
    let contents = std::fs::read_to_string(path)?;
    EngineConfig::from_toml_str(&contents)
}
