//! weft CLI: the main entry point.
//!
//! Commands:
//! - `checkpoints`  List and inspect saved checkpoints, show where the next run resumes
//! - `config`       Print the effective (or default) configuration
//! - `doctor`       Diagnose configuration and storage health

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "weft",
    about = "weft: graph-strategy agent engine tooling",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect saved checkpoints
    Checkpoints {
        /// Agent id (defaults to agent.id from the config)
        #[arg(short, long, global = true)]
        agent: Option<String>,

        #[command(subcommand)]
        action: CheckpointAction,
    },

    /// Print the configuration
    Config {
        /// Print the built-in defaults instead of the loaded config
        #[arg(long)]
        default: bool,
    },

    /// Diagnose configuration and storage health
    Doctor,
}

#[derive(Subcommand)]
enum CheckpointAction {
    /// List checkpoints, oldest first
    List,
    /// Show the latest checkpoint
    Latest,
    /// Show one checkpoint in full
    Show {
        /// Checkpoint id
        id: String,
    },
    /// Show where the next run resumes
    Resume,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Checkpoints { agent, action } => match action {
            CheckpointAction::List => commands::checkpoints::list(agent).await?,
            CheckpointAction::Latest => commands::checkpoints::latest(agent).await?,
            CheckpointAction::Show { id } => commands::checkpoints::show(agent, &id).await?,
            CheckpointAction::Resume => commands::checkpoints::resume(agent).await?,
        },
        Commands::Config { default } => commands::config_cmd::show(default)?,
        Commands::Doctor => commands::doctor::run().await?,
    }

    Ok(())
}
