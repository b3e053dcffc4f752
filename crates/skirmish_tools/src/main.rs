//! Skirmish - Development Tools
//!
//! # Usage
//!
//! ```bash
//! # Check every scenario in a directory
//! cargo run -p skirmish_tools -- validate scenarios
//!
//! # Play a scenario and watch each round
//! cargo run -p skirmish_tools -- simulate scenarios/gatehouse.ron --render
//!
//! # Machine-readable report
//! cargo run -p skirmish_tools -- simulate scenarios/gatehouse.ron --rounds 5 --json
//!
//! # Where can pawn 0 go this round?
//! cargo run -p skirmish_tools -- reach scenarios/gatehouse.ron --pawn 0
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use skirmish_tools::{
    load_scenario, log_filter, render_battle, render_reachability, run_scenario, scenario_files,
    AsciiConfig,
};

#[derive(Parser)]
#[command(name = "skirmish-tools")]
#[command(about = "Development tools for the Skirmish battle engine")]
#[command(version)]
struct Cli {
    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate scenario files
    Validate {
        /// Scenario file, or directory of scenario files
        #[arg(default_value = "scenarios")]
        path: PathBuf,
    },

    /// Play a scenario headlessly
    Simulate {
        /// Scenario file to load
        path: PathBuf,

        /// Rounds to play (default: the scenario's own count)
        #[arg(short, long)]
        rounds: Option<u32>,

        /// Print the report as JSON on stdout
        #[arg(long)]
        json: bool,

        /// Draw the battlefield after every round
        #[arg(long)]
        render: bool,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,
    },

    /// Show where a pawn can move after deployment
    Reach {
        /// Scenario file to load
        path: PathBuf,

        /// Pawn index
        #[arg(short, long, default_value = "0")]
        pawn: usize,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr; stdout is for reports
    let directives = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(log_filter(cli.verbose, directives.as_deref()))
        .init();

    let ok = match cli.command {
        Commands::Validate { path } => cmd_validate(&path),
        Commands::Simulate {
            path,
            rounds,
            json,
            render,
            no_color,
        } => cmd_simulate(&path, rounds, json, render, no_color),
        Commands::Reach { path, pawn } => cmd_reach(&path, pawn),
    };

    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Validate one scenario file or a directory of them
fn cmd_validate(path: &Path) -> bool {
    tracing::info!("Validating scenarios in: {}", path.display());
    let files = match scenario_files(path) {
        Ok(files) => files,
        Err(e) => {
            tracing::error!("{e}");
            return false;
        }
    };

    let mut failures = 0;
    for file in &files {
        // Deploying catches what validation cannot, such as a full formation
        let result = load_scenario(file).map(|scenario| scenario.build().map(|_| scenario));
        match result {
            Ok(Ok(scenario)) => tracing::info!("{}: '{}' ok", file.display(), scenario.name),
            Ok(Err(e)) => {
                failures += 1;
                tracing::error!("{}: cannot deploy: {e}", file.display());
            }
            Err(e) => {
                failures += 1;
                tracing::error!("{e}");
            }
        }
    }

    if failures == 0 {
        tracing::info!("Validation passed ({} files)", files.len());
        true
    } else {
        tracing::error!("Validation failed: {failures} of {} files", files.len());
        false
    }
}

/// Play a scenario and print its report
fn cmd_simulate(
    path: &Path,
    rounds: Option<u32>,
    json: bool,
    render: bool,
    no_color: bool,
) -> bool {
    let scenario = match load_scenario(path) {
        Ok(scenario) => scenario,
        Err(e) => {
            tracing::error!("{e}");
            return false;
        }
    };

    let config = AsciiConfig {
        use_color: !no_color,
        show_legend: true,
    };
    let result = run_scenario(&scenario, rounds, |battle, summary| {
        tracing::debug!(
            round = summary.round,
            resolutions = summary.resolutions,
            "Round played"
        );
        if render && !json {
            println!("{}", render_battle(battle, &config));
        }
    });

    let (battle, report) = match result {
        Ok(done) => done,
        Err(e) => {
            tracing::error!("Scenario '{}' failed: {e}", scenario.name);
            return false;
        }
    };

    if json {
        match serde_json::to_string_pretty(&report) {
            Ok(text) => println!("{text}"),
            Err(e) => {
                tracing::error!("Failed to encode report: {e}");
                return false;
            }
        }
        return true;
    }

    if !render {
        println!("{}", render_battle(&battle, &config));
    }
    for round in &report.rounds {
        println!(
            "round {:>3}: {} resolutions (max {} per step), stopped {:?}, waiting {:?}",
            round.round, round.resolutions, round.max_step_resolutions, round.stopped, round.waiting
        );
    }
    println!("state hash: {:016x}", report.state_hash);
    true
}

/// Print the reachability map of one pawn
fn cmd_reach(path: &Path, pawn: usize) -> bool {
    let result = load_scenario(path)
        .map_err(|e| e.to_string())
        .and_then(|scenario| scenario.build().map_err(|e| e.to_string()))
        .and_then(|mut battle| {
            let reach = battle.reachable(pawn).map_err(|e| e.to_string())?;
            Ok((battle, reach))
        });

    match result {
        Ok((battle, reach)) => {
            let unit = &battle.pawns()[pawn];
            println!(
                "{} (player {}) at {}, speed {}",
                unit.troop.unit.name,
                unit.owner(),
                unit.tile,
                unit.troop.unit.speed
            );
            print!(
                "{}",
                render_reachability(battle.battlefield(), &reach, unit.tile, unit.speed())
            );
            let within = reach.within(unit.speed()).count();
            println!("{within} tiles reachable this round");
            true
        }
        Err(e) => {
            tracing::error!("{e}");
            false
        }
    }
}
