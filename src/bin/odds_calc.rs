//! Headless Odds Calculator
//!
//! Loads a battle scenario, runs it many times on the worker pool and
//! prints the win rates and expected losses.

use std::path::PathBuf;
use std::sync::Arc;

use battle_odds::core::config::{load_config, EngineConfig};
use battle_odds::core::types::Side;
use battle_odds::odds::{BattleWinner, WorkerPoolSupervisor};
use battle_odds::scenario::Scenario;
use clap::Parser;
use serde::Serialize;

/// Battle odds calculator
#[derive(Parser, Debug)]
#[command(name = "odds_calc")]
#[command(about = "Estimate battle odds by running many randomized trials")]
struct Args {
    /// Scenario file (TOML)
    scenario: PathBuf,

    /// Engine config file (TOML); defaults are used when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of trials; overrides the scenario's `runs`
    #[arg(long)]
    runs: Option<usize>,

    /// Random seed for deterministic runs
    #[arg(long)]
    seed: Option<u64>,

    /// Output format: json or text
    #[arg(long, default_value = "json")]
    format: String,
}

/// JSON output structure
#[derive(Serialize)]
struct OddsSummary {
    trials: usize,
    workers: usize,
    seed: u64,
    attacker_win_percent: f64,
    defender_win_percent: f64,
    draw_percent: f64,
    average_attackers_left: f64,
    average_defenders_left: f64,
    average_attackers_left_when_won: f64,
    average_defenders_left_when_won: f64,
    average_rounds: f64,
    attacker_value_left: f64,
    defender_value_left: f64,
    value_swing: f64,
    representative_winner: Option<String>,
    representative_attackers_left: usize,
    representative_defenders_left: usize,
    time_ms: u128,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> battle_odds::core::error::Result<()> {
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => EngineConfig::default(),
    };
    let seed = args.seed.or(config.seed).unwrap_or_else(rand::random);
    config.seed = Some(seed);

    let scenario = Scenario::load(&args.scenario)?.build()?;
    let runs = args.runs.unwrap_or(scenario.runs);
    let weights = config.value_swing.clone();

    let supervisor = WorkerPoolSupervisor::new(config)?;
    supervisor.set_options(scenario.options.clone());
    supervisor.set_world_state(Arc::new(scenario.world.clone()))?;

    let results = supervisor.calculate(&scenario.battle, runs)?;
    let battle = &scenario.battle;
    let (attacker_value_left, defender_value_left) =
        results.average_value_left_over(battle.attacker, battle.defender, &scenario.costs);
    let representative = results.representative_outcome();

    let summary = OddsSummary {
        trials: results.count(),
        workers: supervisor.worker_count(),
        seed,
        attacker_win_percent: results.attacker_win_percent() * 100.0,
        defender_win_percent: results.defender_win_percent() * 100.0,
        draw_percent: results.draw_percent() * 100.0,
        average_attackers_left: results.average_units_left(Side::Attacker),
        average_defenders_left: results.average_units_left(Side::Defender),
        average_attackers_left_when_won: results.average_units_left_when_won(Side::Attacker),
        average_defenders_left_when_won: results.average_units_left_when_won(Side::Defender),
        average_rounds: results.average_rounds_fought(),
        attacker_value_left,
        defender_value_left,
        value_swing: results.average_value_swing(
            battle.attacker,
            &battle.attackers,
            battle.defender,
            &battle.defenders,
            &scenario.costs,
            scenario.value_swing,
            &weights,
        ),
        representative_winner: representative
            .and_then(|o| o.winner)
            .map(|w| winner_name(w).to_string()),
        representative_attackers_left: representative.map_or(0, |o| o.remaining_attackers.len()),
        representative_defenders_left: representative.map_or(0, |o| o.remaining_defenders.len()),
        time_ms: results.time().as_millis(),
    };

    match args.format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&summary)?),
        _ => {
            println!("Battle Odds");
            println!("===========");
            println!("Trials: {} on {} workers (seed {})", summary.trials, summary.workers, summary.seed);
            println!("Attacker wins: {:.1}%", summary.attacker_win_percent);
            println!("Defender wins: {:.1}%", summary.defender_win_percent);
            println!("Draws:         {:.1}%", summary.draw_percent);
            println!();
            println!(
                "Units left:    {:.2} attackers, {:.2} defenders",
                summary.average_attackers_left, summary.average_defenders_left
            );
            println!(
                "When won:      {:.2} attackers, {:.2} defenders",
                summary.average_attackers_left_when_won, summary.average_defenders_left_when_won
            );
            println!(
                "Value left:    {:.1} attacker, {:.1} defender",
                summary.attacker_value_left, summary.defender_value_left
            );
            println!("Value swing:   {:+.1}", summary.value_swing);
            println!("Rounds:        {:.2}", summary.average_rounds);
            if let Some(winner) = &summary.representative_winner {
                println!(
                    "Typical trial: {} with {} attackers and {} defenders left",
                    winner, summary.representative_attackers_left, summary.representative_defenders_left
                );
            }
            println!("Time:          {} ms", summary.time_ms);
        }
    }

    supervisor.shutdown();
    Ok(())
}

fn winner_name(winner: BattleWinner) -> &'static str {
    match winner {
        BattleWinner::Attacker => "attacker",
        BattleWinner::Defender => "defender",
        BattleWinner::Draw => "draw",
    }
}
