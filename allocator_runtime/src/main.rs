/// Allocator simulator.
///
/// Loads a JSON scenario, runs it through the allocator kernel step by
/// step, and prints each step's allocation hash. `verify` replays the
/// scenario twice and compares the history hashes.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use allocator_runtime::drift::verify_determinism;
use allocator_runtime::scenario::Scenario;

#[derive(Parser, Debug)]
#[command(name = "allocator-sim", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a scenario and print per-step hashes
    Run {
        /// Path to the scenario JSON
        #[arg(long, env = "ALLOCATOR_SCENARIO")]
        scenario: PathBuf,

        /// Number of steps; defaults to the scenario's own count
        #[arg(long)]
        steps: Option<u64>,

        /// Override the scenario seed
        #[arg(long)]
        seed: Option<u64>,

        /// Print the tracked-resource record for every step
        #[arg(long)]
        tracked: bool,
    },

    /// Replay a scenario twice and check the hashes agree
    Verify {
        #[arg(long, env = "ALLOCATOR_SCENARIO")]
        scenario: PathBuf,

        #[arg(long)]
        steps: Option<u64>,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            scenario,
            steps,
            seed,
            tracked,
        } => run(&scenario, steps, seed, tracked),
        Command::Verify { scenario, steps } => verify(&scenario, steps),
    }
}

fn load(path: &Path) -> anyhow::Result<Scenario> {
    Scenario::from_path(path).with_context(|| format!("loading scenario {}", path.display()))
}

fn run(path: &Path, steps: Option<u64>, seed: Option<u64>, tracked: bool) -> anyhow::Result<()> {
    let scenario = load(path)?;
    let steps = steps.unwrap_or(scenario.steps);
    let mut session = scenario.build_session("cli", seed)?;

    for _ in 0..steps {
        let outcome = session.step()?;
        println!("step {:>4}  {}", outcome.step, outcome.allocation_hash);
        if tracked {
            if let Some(record) = &outcome.report.tracked {
                println!(
                    "           {}: requested {} allocated {}",
                    record.resource,
                    record.total_requested(),
                    record.total_allocated()
                );
            }
        }
    }

    println!();
    for (id, count) in session.pool().entries() {
        println!("{id:<24} {count}");
    }
    println!("history {}", session.history_hash());
    Ok(())
}

fn verify(path: &Path, steps: Option<u64>) -> anyhow::Result<()> {
    let scenario = load(path)?;
    let steps = steps.unwrap_or(scenario.steps);
    let hash = verify_determinism(&scenario, steps)?;
    println!("PASS  {steps} steps  {hash}");
    Ok(())
}
