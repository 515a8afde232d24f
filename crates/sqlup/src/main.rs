use anyhow::Result;
use clap::Parser;

use sqlup::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    cli.execute().await
}
