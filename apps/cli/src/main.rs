//! tickerflow CLI: run the staged investment-research pipeline.
//!
//! Each step's result is cached; later steps derive their inputs from what
//! earlier steps left in the cache.

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
