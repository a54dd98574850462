//! Courier CLI — resilient, idempotent follow-up delivery pipeline.
//!
//! Pages contacts out of the internal source, fans them out to a bounded
//! worker pool, and delivers each follow-up at most once.

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
