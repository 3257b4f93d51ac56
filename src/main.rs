//! Pump.fun trading agent - explainable entries, hard risk limits, paper execution
//!
//! # WARNING
//! - Paper trading only. Simulated fills are not a promise of live results.
//! - Most pump.fun tokens go to zero (rug pulls, abandonment).
//! - The kill switch blocks new entries; it never force-closes positions.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

use pumpfun_agent::cli::commands;
use pumpfun_agent::config::Config;

/// Pump.fun trading agent
#[derive(Parser)]
#[command(name = "agent")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "agent.toml")]
    config: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "AGENT_JSON_LOGS")]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Paper trade against the synthetic event feed
    Run {
        /// Stop after this many seconds (default: until Ctrl-C)
        #[arg(long)]
        duration_secs: Option<u64>,

        /// Seed the simulator and the event feed
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Show the last saved session
    Status,

    /// Show the effective configuration
    Config,

    /// Check the configuration against the conservative policy
    CheckConfig,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pumpfun_agent=info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Parse CLI arguments
    let cli = Cli::parse();

    init_tracing(cli.json_logs);

    // Load configuration
    let config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    // Execute command
    let result = match cli.command {
        Commands::Run { duration_secs, seed } => commands::run(&config, duration_secs, seed).await,
        Commands::Status => commands::status(&config).await,
        Commands::Config => commands::show_config(&config),
        Commands::CheckConfig => commands::check_config(&config),
    };

    if let Err(e) = result {
        error!("Command failed: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}
