use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;
mod ui;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging from core crate
    crib_core::logging::init()?;

    // Parse CLI arguments
    let parsed = cli::Cli::parse();

    // Dispatch to CLI handler
    if let Err(err) = parsed.dispatch().await {
        eprintln!("error: {:#}", err);
        std::process::exit(1);
    }

    Ok(())
}
