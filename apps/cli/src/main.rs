//! curator CLI: link ingestion into a versioned content repository.
//!
//! Reads batches of shared links, extracts and classifies them, and commits
//! the reconciled result to the configured content store.

mod commands;
mod server;

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
