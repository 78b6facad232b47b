// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Headless simulation runner.
//!
//! Loads a scene description, builds a space, and steps it for the
//! requested number of ticks. Exit status: 0 on a completed run, 1 on bad
//! usage or any simulation error.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use anyhow::Context as _;
use clap::Parser;
use tracing::info;

use krill_core::{Registry, SceneDoc, Space, Strategy, Threading};

#[derive(Debug, Parser)]
#[command(name = "krill", about = "Deterministic multi-robot simulation runner")]
struct Args {
    /// Scene description file.
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: PathBuf,

    /// Run without visualisation (headless is the only mode this runner
    /// supports; the flag is accepted for scene portability).
    #[arg(short = 'n', long = "no-visualization")]
    no_visualization: bool,

    /// Silence all log output.
    #[arg(short = 'z', long = "silent")]
    silent: bool,

    /// Print wall-clock and simulated-time statistics after the run.
    #[arg(short = 't', long = "time")]
    time: bool,

    /// Number of ticks to simulate.
    #[arg(long = "ticks", default_value_t = 1000)]
    ticks: u64,

    /// Worker threads (0 runs everything inline).
    #[arg(long = "threads", default_value_t = 0)]
    threads: usize,

    /// Load-balancing strategy: scatter_gather, balance_quantity, or
    /// balance_length.
    #[arg(long = "strategy", default_value = "balance_length")]
    strategy: String,
}

fn main() -> ExitCode {
    // Unknown flags and missing values exit 1, not clap's default 2;
    // help and version remain successful invocations.
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(error) => {
            let _ = error.print();
            return match error.kind() {
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                    ExitCode::SUCCESS
                }
                _ => ExitCode::FAILURE,
            };
        }
    };
    if !args.silent {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .init();
    }
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> anyhow::Result<()> {
    let strategy = match args.strategy.as_str() {
        "scatter_gather" => Strategy::ScatterGather,
        "balance_quantity" => Strategy::BalanceQuantity,
        "balance_length" => Strategy::BalanceLength,
        other => anyhow::bail!("unknown strategy `{other}`"),
    };
    let threading = if args.threads == 0 {
        Threading::SingleThread
    } else {
        Threading::Multi {
            strategy,
            workers: args.threads,
        }
    };

    if !args.no_visualization {
        info!("no visualiser is linked into this runner; proceeding headless");
    }
    let doc = SceneDoc::from_path(&args.config)
        .with_context(|| format!("loading scene `{}`", args.config.display()))?;
    let registry = Registry::with_builtins();
    let mut space =
        Space::from_scene(&doc, &registry, threading).context("building the space")?;

    info!(
        ticks = args.ticks,
        robots = space.controllable_count(),
        "simulation starting"
    );
    let started = Instant::now();
    for _ in 0..args.ticks {
        space.update().context("advancing the simulation")?;
    }
    let wall = started.elapsed();

    if args.time {
        let clock = space.clock();
        println!(
            "simulated {:.3} s in {:.3} s wall clock ({:.1}x realtime, {} ticks)",
            clock.elapsed_seconds(),
            wall.as_secs_f64(),
            clock.elapsed_seconds() / wall.as_secs_f64().max(f64::EPSILON),
            clock.tick,
        );
    }
    info!("simulation finished");
    Ok(())
}
