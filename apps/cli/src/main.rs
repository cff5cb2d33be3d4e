//! TermForge CLI — bulk glossary ingestion and AI backfill pipeline.
//!
//! Turns wide tabular glossary workbooks into structured content records
//! and fills the gaps through AI backends with quality scoring and cost
//! control.

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
