use anyhow::Result;
use clap::Parser;
use console::style;
use tokio_util::sync::CancellationToken;

use sqlup_runtime::{connect, Upgrader};

use super::load_config;
use super::output::{banner, print_event};

/// Run all pending scripts.
#[derive(Parser)]
pub struct UpCommand {
    /// Configuration file path.
    #[arg(short, long, default_value = "sqlup.toml")]
    pub config: String,

    /// Database URL, overriding the configuration file.
    #[arg(long, env = "SQLUP_DATABASE_URL")]
    pub database_url: Option<String>,

    /// List the scripts that would run without running them.
    #[arg(long)]
    pub dry_run: bool,
}

impl UpCommand {
    pub async fn execute(self) -> Result<()> {
        let config = load_config(&self.config, self.database_url)?;

        let cancel = CancellationToken::new();
        let upgrader = Upgrader::from_config(&config)?
            .with_event_sink(print_event)
            .with_cancellation(cancel.clone());

        let mut conn = connect(&config.database).await?;

        if self.dry_run {
            banner("Dry run");
            let plan = upgrader.pending(&mut conn).await?;
            if plan.is_empty() {
                println!("  {} Database is up to date", style("ℹ").blue());
            } else {
                for script in plan.scripts() {
                    println!("  {} {}", style("→").dim(), style(script.name()).yellow());
                }
                println!();
                println!("  {} {} script(s) pending", style("ℹ").blue(), plan.len());
            }
            println!();
            return Ok(());
        }

        banner("Upgrade");

        let ctrl_c = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, stopping after the current script");
                ctrl_c.cancel();
            }
        });

        let result = upgrader.perform_upgrade(&mut conn).await;

        println!();
        if let Some(error) = result.error {
            match result.failed_script {
                Some(script) => anyhow::bail!("Upgrade failed in {}: {}", script, error),
                None => anyhow::bail!("Upgrade failed: {}", error),
            }
        }

        if result.executed.is_empty() {
            println!("  {} Database is up to date", style("ℹ").blue());
        } else {
            println!(
                "  {} Success! Applied {} script(s)",
                style("✓").green(),
                result.executed.len()
            );
        }
        println!();

        Ok(())
    }
}
