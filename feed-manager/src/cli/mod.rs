//! Command-line interface.

pub mod instrument;
pub mod serve;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "feed-manager", version, about = "Exchange market-data feed manager")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Stream market data, aggregate candles and persist trades
    Serve {
        /// Symbols to track, overriding configuration
        #[arg(short, long)]
        symbols: Vec<String>,
    },
    /// Fetch and print one instrument definition
    Instrument {
        /// Symbol to look up, e.g. BTCUSDT
        symbol: String,
    },
}
