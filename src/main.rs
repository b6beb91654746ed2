//! RCH Resource Gate CLI
//!
//! Entry point for the `rch-gate` command-line tool.

use clap::{Parser, Subcommand};
use rch_resource_gate::config::REPO_CONFIG_PATH;
use rch_resource_gate::replay::load_events;
use rch_resource_gate::{logging, replay, EffectiveConfig, ReplayError};
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(name = "rch-gate")]
#[command(about = "Resource cache gate for RCH build/sync pipelines", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a recorded build/sync event stream through fresh gates
    Replay {
        /// JSON-lines event file
        events: PathBuf,

        /// Register a recording waiter for this project before replay (repeatable)
        #[arg(long = "wait", short = 'w')]
        wait: Vec<String>,

        /// Path to repo config file (default: .rch/gate.toml)
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,

        /// Override cache.root
        #[arg(long)]
        cache_root: Option<PathBuf>,
    },

    /// Print the effective configuration with provenance
    Config {
        /// Path to repo config file (default: .rch/gate.toml)
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Replay {
            events,
            wait,
            config,
            cache_root,
        } => run_replay(events, wait, config, cache_root),
        Commands::Config { config } => run_config(config),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run_replay(
    events_path: PathBuf,
    wait: Vec<String>,
    config_path: Option<PathBuf>,
    cache_root: Option<PathBuf>,
) -> Result<(), ReplayError> {
    let cli_overrides = cache_root.map(|root| {
        serde_json::json!({
            "cache": { "root": root.display().to_string() }
        })
    });
    let config = load_config(config_path, cli_overrides)?.gate_config()?;
    logging::init(&config.log.filter);

    let events = load_events(&events_path)?;
    let report = replay(&config, &events, &wait);

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn run_config(config_path: Option<PathBuf>) -> Result<(), ReplayError> {
    let effective = load_config(config_path, None)?;
    println!("{}", effective.to_json()?);
    Ok(())
}

fn load_config(
    config_path: Option<PathBuf>,
    cli_overrides: Option<serde_json::Value>,
) -> Result<EffectiveConfig, ReplayError> {
    let host = std::env::var_os("HOME")
        .map(|home| PathBuf::from(home).join(".config/rch/gate.toml"));
    let repo = config_path.unwrap_or_else(|| PathBuf::from(REPO_CONFIG_PATH));

    Ok(EffectiveConfig::build(
        host.as_deref(),
        Some(repo.as_path()),
        cli_overrides,
    )?)
}
