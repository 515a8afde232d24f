use anyhow::Result;
use clap::Parser;
use console::style;
use serde::Serialize;

use sqlup_core::event::SkipReason;
use sqlup_runtime::{connect, JournalEntry, Upgrader};

use super::load_config;
use super::output::banner;

/// Show applied and pending scripts.
#[derive(Parser)]
pub struct StatusCommand {
    /// Configuration file path.
    #[arg(short, long, default_value = "sqlup.toml")]
    pub config: String,

    /// Database URL, overriding the configuration file.
    #[arg(long, env = "SQLUP_DATABASE_URL")]
    pub database_url: Option<String>,

    /// Print the report as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct StatusReport {
    applied: Vec<AppliedScript>,
    pending: Vec<String>,
    drifted: Vec<String>,
}

#[derive(Debug, Serialize)]
struct AppliedScript {
    script: String,
    checksum: String,
    applied_at: String,
}

impl From<JournalEntry> for AppliedScript {
    fn from(entry: JournalEntry) -> Self {
        Self {
            script: entry.script_name,
            checksum: entry.checksum,
            applied_at: entry.applied_at.to_rfc3339(),
        }
    }
}

impl StatusCommand {
    pub async fn execute(self) -> Result<()> {
        let config = load_config(&self.config, self.database_url)?;
        let upgrader = Upgrader::from_config(&config)?;
        let mut conn = connect(&config.database).await?;

        let applied = upgrader.applied(&mut conn).await?;
        let plan = upgrader.pending(&mut conn).await?;

        let report = StatusReport {
            applied: applied.into_iter().map(AppliedScript::from).collect(),
            pending: plan.scripts().iter().map(|s| s.name().to_string()).collect(),
            drifted: plan
                .skipped()
                .iter()
                .filter(|(_, reason)| *reason == SkipReason::ChecksumDrift)
                .map(|(name, _)| name.clone())
                .collect(),
        };

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print_report(&report);
        }
        Ok(())
    }
}

fn print_report(report: &StatusReport) {
    banner("Status");

    if report.applied.is_empty() && report.pending.is_empty() {
        println!("  {} No scripts found", style("ℹ").blue());
        println!();
        return;
    }

    if !report.applied.is_empty() {
        println!("  {} Applied:", style("✓").green());
        for entry in &report.applied {
            println!(
                "    {} {} {}",
                style(&entry.script).cyan(),
                style("at").dim(),
                entry.applied_at
            );
        }
    }

    if !report.pending.is_empty() {
        if !report.applied.is_empty() {
            println!();
        }
        println!("  {} Pending:", style("○").yellow());
        for name in &report.pending {
            println!("    {} {}", style("→").dim(), style(name).yellow());
        }
    }

    if !report.drifted.is_empty() {
        println!();
        println!("  {} Changed after being applied:", style("⚠").yellow());
        for name in &report.drifted {
            println!("    {} {}", style("!").yellow(), name);
        }
    }

    println!();
    println!(
        "  {} {} applied, {} pending",
        style("ℹ").blue(),
        report.applied.len(),
        report.pending.len()
    );
    println!();
}
