//! ctxrelay CLI: the main entry point.
//!
//! Commands:
//! - `onboard`   Write the default config file
//! - `status`    Show vault, bridge, and momentum status
//! - `backup`    Take a vault snapshot now
//! - `backups`   List snapshots
//! - `restore`   Restore a snapshot
//! - `filter`    Pick the best of several candidate answers
//! - `amplify`   Expand an answer into a sectioned form
//! - `demo`      Walk through a transition in a throwaway vault

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "ctxrelay",
    about = "ctxrelay — context continuity across AI platforms",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use this config file instead of ~/.ctxrelay/config.toml
    #[arg(short, long, global = true, env = "CTXRELAY_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default configuration file
    Onboard,

    /// Show system status
    Status,

    /// Take a vault snapshot now
    Backup,

    /// List vault snapshots
    Backups,

    /// Restore a vault snapshot
    Restore {
        /// Snapshot timestamp (Unix ms); defaults to the newest
        #[arg(short, long)]
        timestamp: Option<i64>,
    },

    /// Score candidate answers and print the winner
    Filter {
        /// The question the answers respond to
        #[arg(short, long)]
        question: String,

        /// Candidate answers
        #[arg(required = true)]
        answers: Vec<String>,
    },

    /// Amplify an answer
    Amplify {
        /// The question the answer responds to
        #[arg(short, long)]
        question: String,

        answer: String,
    },

    /// Run a short in-memory demonstration
    Demo,
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
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Status => commands::status::run(config).await?,
        Commands::Backup => commands::backup::run(config).await?,
        Commands::Backups => commands::backup::list(config).await?,
        Commands::Restore { timestamp } => commands::backup::restore(config, timestamp).await?,
        Commands::Filter { question, answers } => {
            commands::answers::filter(config, &question, &answers).await?
        }
        Commands::Amplify { question, answer } => {
            commands::answers::amplify(config, &question, &answer).await?
        }
        Commands::Demo => commands::demo::run(config).await?,
    }

    Ok(())
}
