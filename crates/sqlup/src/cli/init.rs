use anyhow::Result;
use clap::Parser;
use console::style;
use std::fs;
use std::path::Path;

use sqlup_runtime::layout::{MIGRATIONS_DIR, PROGRAMMABILITY_DIR, SCRIPTS_DIR};

const CONFIG_FILE: &str = "sqlup.toml";

const CONFIG_TEMPLATE: &str = r#"[database]
url = "${DATABASE_URL}"

[scripts]
base_dir = "."

[app]
environment_name = "{{environment}}"

[upgrade]
transaction_scope = "whole_run"
variable_mode = "strict"

[upgrade.variables]
"#;

const FIRST_MIGRATION: &str = r#"-- Runs once. Edit freely until it has been applied anywhere.
-- Scripts run in file-name order; $EnvironmentName$ is substituted.
"#;

/// Create a config file and the Scripts folder layout.
#[derive(Parser)]
pub struct InitCommand {
    /// Directory to initialize.
    #[arg(default_value = ".")]
    pub path: String,

    /// Value of the `EnvironmentName` variable.
    #[arg(short, long, default_value = "Development")]
    pub environment: String,
}

impl InitCommand {
    pub fn execute(self) -> Result<()> {
        let dir = Path::new(&self.path);
        create_layout(dir, &self.environment)?;

        println!();
        println!(
            "  {} Initialized {}",
            style("✓").green(),
            style(dir.join(CONFIG_FILE).display()).cyan()
        );
        println!();
        println!("Next steps:");
        println!("  {} set DATABASE_URL", style("→").dim());
        println!(
            "  {} add scripts under {}/{}",
            style("→").dim(),
            SCRIPTS_DIR,
            MIGRATIONS_DIR
        );
        println!("  {} to apply them", style("sqlup up").dim());
        println!();

        Ok(())
    }
}

/// Write `sqlup.toml` and the `Scripts` folders under `dir`.
///
/// Refuses to overwrite an existing config file.
pub fn create_layout(dir: &Path, environment: &str) -> Result<()> {
    let config = dir.join(CONFIG_FILE);
    if config.exists() {
        anyhow::bail!("Configuration file already exists: {}", config.display());
    }

    let scripts = dir.join(SCRIPTS_DIR);
    fs::create_dir_all(scripts.join(MIGRATIONS_DIR))?;
    fs::create_dir_all(scripts.join(PROGRAMMABILITY_DIR))?;

    let first = scripts.join(MIGRATIONS_DIR).join("0001_init.sql");
    if !first.exists() {
        fs::write(first, FIRST_MIGRATION)?;
    }

    let environment = environment.replace('\\', "\\\\").replace('"', "\\\"");
    fs::write(config, CONFIG_TEMPLATE.replace("{{environment}}", &environment))?;
    Ok(())
}
