//! leadqual CLI: qualify a CSV of B2B leads against an ideal customer profile.
//!
//! Enriches each lead, scores it per category, recommends an offer and drafts
//! an outreach sequence, persisting every stage to the local record store.

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
