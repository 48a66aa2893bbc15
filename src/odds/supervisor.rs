//! Worker pool supervision and lifecycle coordination
//!
//! The supervisor owns a rayon thread pool and, once configured, a set of
//! trial runners that each hold a private snapshot of the world state.
//!
//! Reconfiguring measures one duplication of the new state, sizes the pool
//! from that measurement and builds the remaining copies on the thread pool.
//! Calculations wait until no reconfiguration is pending, then run one batch
//! per worker in parallel and merge the results in worker order.
//!
//! Every long-running step remembers the cancellation generation it started
//! in. Reconfiguring, `cancel` and `shutdown` all bump the generation, which
//! makes in-flight builds and batches wind down at their next check.

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use rayon::ThreadPool;

use crate::combat::dice::DiceResolver;
use crate::combat::options::BattleOptions;
use crate::combat::resolver::CombatResolver;
use crate::core::config::EngineConfig;
use crate::core::error::{OddsError, Result};
use crate::odds::aggregate::ResultAggregator;
use crate::odds::cancel::CancellationToken;
use crate::odds::distribute::split;
use crate::odds::runner::{Battle, TrialRunner};
use crate::odds::sizing::{plan_worker_count, MemoryBudget};
use crate::world::snapshot::{DuplicationCost, Snapshot};
use crate::world::state::WorldState;

/// Lifecycle phase of the supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    ConfiguringPool,
    Ready,
    Computing,
    ShutDown,
}

/// How a reconfiguration ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolOutcome {
    /// The new pool is in service
    Ready {
        worker_count: usize,
        copy_time: Duration,
        copy_bytes: u64,
    },
    /// Superseded by a newer reconfiguration, a cancel, or shutdown
    Abandoned,
}

/// Handle to a reconfiguration running in the background
#[derive(Debug)]
pub struct ConfigurationTicket {
    receiver: Receiver<Result<PoolOutcome>>,
}

impl ConfigurationTicket {
    /// Block until the reconfiguration has been committed or abandoned
    pub fn wait(self) -> Result<PoolOutcome> {
        self.receiver.recv().map_err(|_| {
            OddsError::WorkerFailed("pool construction ended without reporting".into())
        })?
    }
}

type ReadyListener = Arc<dyn Fn(usize) + Send + Sync>;

struct WorkerPool {
    workers: Vec<Mutex<TrialRunner>>,
    bytes: u64,
}

struct BuiltPool {
    pool: WorkerPool,
    cost: DuplicationCost,
}

struct Lifecycle {
    phase: Phase,
    /// Reconfigurations requested and not yet committed or abandoned
    pending: usize,
    /// A duplication job is running
    building: bool,
    /// Calculations currently running
    computing: usize,
    pool: Option<Arc<WorkerPool>>,
    data_set: bool,
}

impl Lifecycle {
    fn settle(&mut self) {
        if self.phase == Phase::ShutDown || self.pending > 0 {
            return;
        }
        self.phase = match (self.data_set, self.computing) {
            (false, _) => Phase::Uninitialized,
            (true, 0) => Phase::Ready,
            (true, _) => Phase::Computing,
        };
    }
}

struct Shared {
    config: EngineConfig,
    resolver: Arc<dyn CombatResolver>,
    lifecycle: Mutex<Lifecycle>,
    changed: Condvar,
    cancel: CancellationToken,
    options: Mutex<BattleOptions>,
    listeners: Mutex<Vec<ReadyListener>>,
    calculating: Mutex<()>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        lock(&self.lifecycle)
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, Lifecycle>) -> MutexGuard<'a, Lifecycle> {
        self.changed.wait(guard).unwrap_or_else(PoisonError::into_inner)
    }

    fn is_stale(&self, generation: u64) -> bool {
        self.cancel.is_cancelled(generation)
    }

    /// Measure one copy, size the pool, then make the remaining copies
    fn build(&self, source: &WorldState, generation: u64) -> Result<Option<BuiltPool>> {
        let (first, cost) = Snapshot::measure(source)?;
        if self.is_stale(generation) {
            return Ok(None);
        }

        let live_bytes = self.lifecycle().pool.as_ref().map_or(0, |p| p.bytes);
        let memory = MemoryBudget {
            max_bytes: self.config.memory_budget_bytes,
            used_bytes: source
                .footprint_bytes()
                .saturating_add(cost.bytes)
                .saturating_add(live_bytes),
        };
        let worker_count =
            plan_worker_count(&cost, memory, self.config.thread_count(), &self.config.sizing);

        let mut snapshots = Vec::with_capacity(worker_count);
        snapshots.push(first);
        let extra = worker_count - 1;

        if worker_count <= 2 {
            for _ in 0..extra {
                if self.is_stale(generation) {
                    return Ok(None);
                }
                snapshots.push(Snapshot::duplicate(source)?);
            }
        } else {
            let copies: Vec<Option<Snapshot>> = (0..extra)
                .into_par_iter()
                .map(|_| {
                    if self.is_stale(generation) {
                        Ok(None)
                    } else {
                        Snapshot::duplicate(source).map(Some)
                    }
                })
                .collect::<Result<_>>()?;
            for copy in copies {
                match copy {
                    Some(snapshot) => snapshots.push(snapshot),
                    None => return Ok(None),
                }
            }
        }

        if self.is_stale(generation) {
            return Ok(None);
        }

        let workers = snapshots
            .into_iter()
            .map(|snapshot| {
                Mutex::new(TrialRunner::new(
                    snapshot,
                    Arc::clone(&self.resolver),
                    self.config.max_rounds,
                ))
            })
            .collect();
        Ok(Some(BuiltPool {
            pool: WorkerPool {
                workers,
                bytes: cost.bytes.saturating_mul(worker_count as u64),
            },
            cost,
        }))
    }

    /// Install or discard a finished build and wake every waiter
    fn commit(&self, built: Result<Option<BuiltPool>>, generation: u64) -> Result<PoolOutcome> {
        let outcome = {
            let mut life = self.lifecycle();
            life.building = false;
            life.pending = life.pending.saturating_sub(1);

            let outcome = match built {
                Ok(Some(built))
                    if !self.is_stale(generation) && life.phase != Phase::ShutDown =>
                {
                    let worker_count = built.pool.workers.len();
                    life.pool = Some(Arc::new(built.pool));
                    life.data_set = true;
                    Ok(PoolOutcome::Ready {
                        worker_count,
                        copy_time: built.cost.elapsed,
                        copy_bytes: built.cost.bytes,
                    })
                }
                Ok(_) => {
                    life.pool = None;
                    life.data_set = false;
                    Ok(PoolOutcome::Abandoned)
                }
                Err(err) => {
                    // The previous pool, if any, stays in service
                    life.data_set = life.pool.is_some();
                    Err(err)
                }
            };
            life.settle();
            self.changed.notify_all();
            outcome
        };

        match &outcome {
            Ok(PoolOutcome::Ready {
                worker_count,
                copy_time,
                copy_bytes,
            }) => {
                tracing::info!(
                    "Battle calculator ready: {} workers, world copy {} bytes in {:?}",
                    worker_count,
                    copy_bytes,
                    copy_time
                );
                // Listeners may register further listeners
                let listeners: Vec<ReadyListener> = lock(&self.listeners).clone();
                for listener in &listeners {
                    listener(*worker_count);
                }
            }
            Ok(PoolOutcome::Abandoned) => {
                tracing::warn!("Abandoned stale worker pool construction");
            }
            Err(err) => {
                tracing::warn!("Worker pool construction failed: {}", err);
            }
        }
        outcome
    }
}

/// Runs battle trials in parallel against private copies of a world state
pub struct WorkerPoolSupervisor {
    threads: ThreadPool,
    shared: Arc<Shared>,
}

impl WorkerPoolSupervisor {
    /// Supervisor with the default dice resolver
    pub fn new(config: EngineConfig) -> Result<Self> {
        Self::with_resolver(config, Arc::new(DiceResolver::new()))
    }

    pub fn with_resolver(config: EngineConfig, resolver: Arc<dyn CombatResolver>) -> Result<Self> {
        config.validate()?;
        let prefix = config.thread_name_prefix.clone();
        let threads = rayon::ThreadPoolBuilder::new()
            .num_threads(config.thread_count())
            .thread_name(move |index| format!("{}-{}", prefix, index))
            .build()?;

        Ok(Self {
            threads,
            shared: Arc::new(Shared {
                config,
                resolver,
                lifecycle: Mutex::new(Lifecycle {
                    phase: Phase::Uninitialized,
                    pending: 0,
                    building: false,
                    computing: 0,
                    pool: None,
                    data_set: false,
                }),
                changed: Condvar::new(),
                cancel: CancellationToken::new(),
                options: Mutex::new(BattleOptions::default()),
                listeners: Mutex::new(Vec::new()),
                calculating: Mutex::new(()),
            }),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    // === LIFECYCLE ===

    /// Start replacing the world state; the ticket reports how it ended
    ///
    /// Invalidates the current pool and any running calculation at once,
    /// then waits for an earlier pool construction to finish before
    /// starting this one.
    pub fn reconfigure(&self, state: Arc<WorldState>) -> Result<ConfigurationTicket> {
        let generation = {
            let mut life = self.shared.lifecycle();
            if life.phase == Phase::ShutDown {
                return Err(OddsError::ShutDown);
            }
            life.pending += 1;
            life.data_set = false;
            life.phase = Phase::ConfiguringPool;
            let generation = self.shared.cancel.cancel();

            while life.building {
                life = self.shared.wait(life);
            }
            if life.phase == Phase::ShutDown {
                life.pending = life.pending.saturating_sub(1);
                self.shared.changed.notify_all();
                return Err(OddsError::ShutDown);
            }
            life.building = true;
            generation
        };

        tracing::debug!(
            "Reconfiguring battle calculator: {} units, {} territories",
            state.unit_count(),
            state.territory_count()
        );

        let (sender, receiver) = bounded(1);
        let shared = Arc::clone(&self.shared);
        self.threads.spawn(move || {
            let built = panic::catch_unwind(AssertUnwindSafe(|| shared.build(&state, generation)))
                .unwrap_or_else(|_| {
                    Err(OddsError::WorkerFailed("pool construction panicked".into()))
                });
            let outcome = shared.commit(built, generation);
            // The caller may have dropped the ticket
            let _ = sender.send(outcome);
        });

        Ok(ConfigurationTicket { receiver })
    }

    /// Replace the world state and wait for the new pool
    pub fn set_world_state(&self, state: Arc<WorldState>) -> Result<PoolOutcome> {
        self.reconfigure(state)?.wait()
    }

    /// Drop the pool; calculations return empty results until reconfigured
    pub fn clear_world_state(&self) {
        let mut life = self.shared.lifecycle();
        self.shared.cancel.cancel();
        life.pool = None;
        life.data_set = false;
        life.settle();
        self.shared.changed.notify_all();
    }

    /// Abort running calculations and pool construction
    ///
    /// A calculation in progress returns the trials finished so far. A pool
    /// under construction is abandoned.
    pub fn cancel(&self) {
        let _life = self.shared.lifecycle();
        self.shared.cancel.cancel();
        tracing::debug!("Battle calculation cancelled");
    }

    /// Cancel everything and release the workers; terminal
    pub fn shutdown(&self) {
        let mut life = self.shared.lifecycle();
        if life.phase == Phase::ShutDown {
            return;
        }
        self.shared.cancel.cancel();
        life.phase = Phase::ShutDown;
        life.pool = None;
        life.data_set = false;
        self.shared.changed.notify_all();
        tracing::info!("Battle calculator shut down");
    }

    /// Call `listener` with the worker count whenever a pool is committed
    pub fn on_ready(&self, listener: impl Fn(usize) + Send + Sync + 'static) {
        lock(&self.shared.listeners).push(Arc::new(listener));
    }

    pub fn phase(&self) -> Phase {
        self.shared.lifecycle().phase
    }

    /// Workers in the committed pool; 0 when none is in service
    pub fn worker_count(&self) -> usize {
        let life = self.shared.lifecycle();
        life.pool.as_ref().map_or(0, |p| p.workers.len())
    }

    /// True when a calculation would run against a committed pool
    pub fn is_ready(&self) -> bool {
        let life = self.shared.lifecycle();
        life.data_set && life.pending == 0 && life.pool.is_some()
    }

    // === OPTIONS ===

    pub fn options(&self) -> BattleOptions {
        lock(&self.shared.options).clone()
    }

    pub fn set_options(&self, options: BattleOptions) {
        *lock(&self.shared.options) = options;
    }

    pub fn set_retreat_after_round(&self, round: Option<u32>) {
        lock(&self.shared.options).retreat_after_round = round;
    }

    pub fn set_retreat_after_units_left(&self, units: Option<u32>) {
        lock(&self.shared.options).retreat_after_units_left = units;
    }

    pub fn set_retreat_when_only_air_left(&self, enabled: bool) {
        lock(&self.shared.options).retreat_when_only_air_left = enabled;
    }

    pub fn set_keep_one_attacking_land_unit(&self, enabled: bool) {
        lock(&self.shared.options).keep_one_attacking_land_unit = enabled;
    }

    pub fn set_amphibious(&self, amphibious: bool) {
        lock(&self.shared.options).amphibious = amphibious;
    }

    pub fn set_attacker_order_of_losses(&self, order: Option<String>) {
        lock(&self.shared.options).attacker_order_of_losses = order;
    }

    pub fn set_defender_order_of_losses(&self, order: Option<String>) {
        lock(&self.shared.options).defender_order_of_losses = order;
    }

    // === CALCULATION ===

    /// Run `run_count` trials of `battle` across the workers
    ///
    /// Waits for a pending reconfiguration first. Without a committed pool
    /// the result is empty; after a cancel it holds the trials finished so
    /// far. Worker errors are logged once per distinct message and the
    /// first is returned.
    pub fn calculate(&self, battle: &Battle, run_count: usize) -> Result<ResultAggregator> {
        let _serial = lock(&self.shared.calculating);

        let (pool, generation) = {
            let mut life = self.shared.lifecycle();
            while life.pending > 0 && life.phase != Phase::ShutDown {
                life = self.shared.wait(life);
            }
            let pool = match (&life.pool, life.data_set) {
                (Some(pool), true) if life.phase != Phase::ShutDown => Arc::clone(pool),
                _ => {
                    tracing::debug!("No worker pool in service, returning an empty result");
                    return Ok(ResultAggregator::new());
                }
            };
            life.computing += 1;
            life.settle();
            (pool, self.shared.cancel.current())
        };

        let options = self.options();
        let seed = self.shared.config.seed.unwrap_or_else(rand::random);
        let shares = split(run_count, pool.workers.len());
        let cancel = &self.shared.cancel;
        let start = Instant::now();

        tracing::debug!(
            "Calculating {} trials on {} workers at {}",
            run_count,
            pool.workers.len(),
            battle.location
        );

        let batches: Vec<Result<ResultAggregator>> = self.threads.install(|| {
            pool.workers
                .par_iter()
                .zip(shares.par_iter())
                .enumerate()
                .map(|(index, (worker, &share))| {
                    let mut rng = ChaCha8Rng::seed_from_u64(seed);
                    rng.set_stream(index as u64);
                    lock(worker).run_batch(battle, &options, share, &mut rng, cancel, generation)
                })
                .collect()
        });

        let mut merged = ResultAggregator::with_capacity(run_count);
        let mut failures: BTreeMap<String, usize> = BTreeMap::new();
        let mut first_error = None;
        for batch in batches {
            match batch {
                Ok(results) => merged.merge(results),
                Err(err) => {
                    *failures.entry(err.to_string()).or_default() += 1;
                    first_error.get_or_insert(err);
                }
            }
        }
        for (message, workers) in &failures {
            tracing::error!("{} battle calculator worker(s) failed: {}", workers, message);
        }
        merged.set_time(start.elapsed());

        {
            let mut life = self.shared.lifecycle();
            life.computing = life.computing.saturating_sub(1);
            life.settle();
            self.shared.changed.notify_all();
        }

        if let Some(err) = first_error {
            return Err(err);
        }
        tracing::debug!(
            "Calculated {} of {} trials in {:?}",
            merged.count(),
            run_count,
            merged.time()
        );
        Ok(merged)
    }
}

impl Drop for WorkerPoolSupervisor {
    fn drop(&mut self) {
        self.shutdown();
    }
}
