//! billtracker CLI: NH legislative bill ingestion.
//!
//! Pulls the General Court bill feed, enriches each bill with its full text
//! and a topical category, and keeps a local searchable database current.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
