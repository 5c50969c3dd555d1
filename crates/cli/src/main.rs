//! uiscout CLI: the main entry point.
//!
//! Commands:
//! - `init`      Write a default `uiscout.toml`
//! - `plan`      Show the task chains a shard would run
//! - `validate`  Check the project configuration

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use uiscout_core::scenario::Shard;

mod commands;

#[derive(Parser)]
#[command(
    name = "uiscout",
    about = "uiscout: AI-guided UI scenario runner",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Project config file (defaults to ./uiscout.toml)
    #[arg(short, long, global = true, env = "UISCOUT_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the task chains selected by a shard
    Plan {
        /// Shard to plan, as current/total
        #[arg(short, long, default_value = "1/1")]
        shard: Shard,
    },

    /// Load and validate the configuration, templates and scenario graph
    Validate,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Init { force } => commands::init::run(config, force).await?,
        Commands::Plan { shard } => commands::plan::run(config, shard).await?,
        Commands::Validate => commands::validate::run(config).await?,
    }

    Ok(())
}
