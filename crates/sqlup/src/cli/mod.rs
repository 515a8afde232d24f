mod init;
mod output;
mod status;
mod up;

pub use init::InitCommand;
pub use status::StatusCommand;
pub use up::UpCommand;

use std::path::Path;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use sqlup_core::config::SqlupConfig;

/// SQLUP - Forward-only SQL migrations
#[derive(Parser)]
#[command(name = "sqlup")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// CLI commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Create a config file and the Scripts folder layout.
    Init(InitCommand),

    /// Run all pending scripts.
    Up(UpCommand),

    /// Show applied and pending scripts.
    Status(StatusCommand),
}

impl Cli {
    /// Execute the CLI command.
    pub async fn execute(self) -> Result<()> {
        init_tracing(self.verbose);

        match self.command {
            Commands::Init(cmd) => cmd.execute(),
            Commands::Up(cmd) => cmd.execute().await,
            Commands::Status(cmd) => cmd.execute().await,
        }
    }
}

fn init_tracing(verbose: bool) {
    let log_level = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.to_string()))
        .with_writer(std::io::stderr)
        .init();
}

/// Load `.env`, then the config file, then apply a URL override.
pub(crate) fn load_config(path: &str, database_url: Option<String>) -> Result<SqlupConfig> {
    // Load .env if present
    dotenvy::dotenv().ok();

    if !Path::new(path).exists() {
        anyhow::bail!(
            "Configuration file not found: {}\nRun `sqlup init` to create one.",
            path
        );
    }

    let mut config = SqlupConfig::from_file(path)
        .with_context(|| format!("Failed to load configuration from {}", path))?;
    if let Some(url) = database_url {
        config.database.url = url;
    }
    // Script folders are relative to the config file
    if config.scripts.base_dir.is_relative() {
        if let Some(parent) = Path::new(path).parent() {
            config.scripts.base_dir = parent.join(&config.scripts.base_dir);
        }
    }
    config.validate()?;
    Ok(config)
}
