//! Tournament CLI
//!
//! Run the worker loop and manage the bot roster.

use anyhow::{Context, Result};
use arena_runner::{ArtifactStore, SimulatorExecutor};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

use tournament::config::{load_config, Config};
use tournament::shutdown::signal_listener;
use tournament::telemetry::init_tracing;
use tournament::{SqliteStore, Store, Worker, WorkerOptions};

#[derive(Debug, Parser)]
#[command(name = "tournament", version, about = "Unattended bot tournament worker")]
struct Cli {
    /// TOML config file; built-in defaults when omitted
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Debug logging (overridden by RUST_LOG)
    #[arg(long, short)]
    verbose: bool,

    /// Log one JSON object per line
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Play matches until interrupted
    Run {
        /// Stop after this many matches
        #[arg(long)]
        max_matches: Option<u64>,
    },
    /// Register a bot; its files live in <bot_root>/<name>
    AddBot {
        name: String,
        #[arg(long)]
        mu: Option<f64>,
        #[arg(long)]
        sigma: Option<f64>,
        /// Register without entering it into matchmaking
        #[arg(long)]
        disabled: bool,
    },
    DisableBot { name: String },
    EnableBot { name: String },
    /// Print all bots by conservative score
    Leaderboard,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json_logs)?;

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => Config::default(),
    };
    config.validate().context("invalid configuration")?;

    let store = SqliteStore::open(&config.paths.database)
        .with_context(|| format!("opening database {}", config.paths.database.display()))?;

    match cli.command {
        Command::Run { max_matches } => run(config, store, max_matches).await,
        Command::AddBot {
            name,
            mu,
            sigma,
            disabled,
        } => {
            let defaults = config.rating.default_rating();
            let rating = arena_core::Rating::new(mu.unwrap_or(defaults.mu), sigma.unwrap_or(defaults.sigma));
            anyhow::ensure!(rating.sigma > 0.0, "--sigma must be positive");
            let bot = store.register_bot(&name, rating, !disabled)?;
            let dir = config.paths.bot_root.join(&bot.name);
            if !dir.is_dir() {
                eprintln!("Warning: bot directory {} does not exist yet", dir.display());
            }
            println!(
                "Added {} (mu {:.2}, sigma {:.2}{})",
                bot.name,
                bot.mu,
                bot.sigma,
                if bot.enabled { "" } else { ", disabled" }
            );
            Ok(())
        }
        Command::DisableBot { name } => {
            store.set_enabled(&name, false)?;
            println!("Disabled {name}");
            Ok(())
        }
        Command::EnableBot { name } => {
            store.set_enabled(&name, true)?;
            println!("Enabled {name}");
            Ok(())
        }
        Command::Leaderboard => {
            print_leaderboard(&store)?;
            Ok(())
        }
    }
}

async fn run(config: Config, store: SqliteStore, max_matches: Option<u64>) -> Result<()> {
    let artifacts = ArtifactStore::new(&config.paths.replay_root, &config.paths.error_log_root);
    let options = WorkerOptions {
        size: config.matchmaking.match_size(),
        map_sizes: config.simulator.map_sizes.clone(),
        backoff: config.matchmaking.backoff(),
        max_matches,
    };
    let executor = SimulatorExecutor::new(
        config.simulator,
        &config.paths.bot_root,
        &config.paths.work_dir,
        artifacts,
    )?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let listener = tokio::spawn(signal_listener(shutdown_tx));

    info!(
        database = %config.paths.database.display(),
        bot_root = %config.paths.bot_root.display(),
        size = ?options.size,
        "tournament worker starting"
    );
    let mut worker = Worker::new(Arc::new(store), executor, config.rating.model(), options);
    tokio::select! {
        _ = worker.run(shutdown_rx) => Ok(()),
        _ = listener => {
            warn!("in-flight match abandoned, nothing recorded for it");
            anyhow::bail!("aborted by a second signal")
        }
    }
}

fn print_leaderboard(store: &SqliteStore) -> Result<()> {
    let mut bots = store.all_bots()?;
    bots.sort_by(|a, b| b.score().total_cmp(&a.score()).then_with(|| a.name.cmp(&b.name)));

    println!("\n=== Bot Leaderboard ===");
    println!(
        "{:>4} {:<24} {:>8} {:>8} {:>8} {:>8}",
        "#", "Bot", "Score", "Mu", "Sigma", "Games"
    );
    println!("{}", "-".repeat(66));
    for (i, bot) in bots.iter().enumerate() {
        println!(
            "{:>4} {:<24} {:>8.2} {:>8.2} {:>8.2} {:>8}{}",
            i + 1,
            bot.name,
            bot.score(),
            bot.mu,
            bot.sigma,
            bot.matches_played,
            if bot.enabled { "" } else { "  (disabled)" }
        );
    }
    println!();
    Ok(())
}
