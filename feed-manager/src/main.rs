//! Feed manager binary.

use anyhow::Result;
use clap::Parser;

use feed_common::logging::{init_logging, LogConfig};
use feed_manager::cli::{instrument, serve, Cli, Commands};
use feed_manager::config::Settings;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    init_logging(LogConfig::from_env())
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {e}"))?;

    let cli = Cli::parse();
    let settings = Settings::new()?;

    match cli.command {
        Commands::Serve { symbols } => serve::execute(settings, symbols).await,
        Commands::Instrument { symbol } => instrument::execute(settings, symbol).await,
    }
}
