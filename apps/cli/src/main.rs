//! colgen CLI: fill a dataset column with AI-generated text.
//!
//! Each row's selected columns are rendered into a prompt template, sent to a
//! remote or local completion backend, cleaned up, and written back.

mod commands;
mod progress;

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
