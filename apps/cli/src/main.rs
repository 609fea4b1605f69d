//! paperfilter CLI — relevance-filtered arXiv ingestion.
//!
//! Fetches the latest papers from an arXiv feed, scores them against your
//! topics, and keeps the relevant ones with their PDFs.

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
