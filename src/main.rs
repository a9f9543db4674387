//! Spot Rotation Agent
//!
//! # WARNING
//! - This bot trades with real money in live mode. Only use funds you can
//!   afford to lose.
//! - Paper mode is the default; live mode requires ROTATOR_ENV=production.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::error;

use spot_rotator::cli::commands;
use spot_rotator::config::RuntimeConfig;

/// Spot rotation agent - periodic portfolio rotation against an aggregator
#[derive(Parser)]
#[command(name = "rotator")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the rotation loop
    Start {
        /// Force paper mode regardless of configured execution mode
        #[arg(long)]
        paper: bool,
    },

    /// Show current positions, P&L and risk state
    Status,

    /// Show current configuration (secrets masked)
    Config,

    /// Check system health (database, chain RPC, aggregator)
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("spot_rotator=info".parse().unwrap()),
        )
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = match RuntimeConfig::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    // Execute command
    let result = match cli.command {
        Commands::Start { paper } => commands::start(&config, paper).await,
        Commands::Status => commands::status(&config).await,
        Commands::Config => commands::show_config(&config),
        Commands::Health => commands::health(&config).await,
    };

    if let Err(e) = result {
        error!("Command failed: {e}");
        std::process::exit(1);
    }

    Ok(())
}
