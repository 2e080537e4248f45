//! Layered configuration.
//!
//! Sources, later ones winning: `config/default`, `config/{RUN_MODE}`,
//! `config/local`, then environment variables prefixed `FEED` with `__`
//! as the section separator (`FEED__STREAM__HEARTBEAT_SECS=5`).

use std::env;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default)]
    pub provider: ProviderSettings,
    #[serde(default)]
    pub stream: StreamSettings,
    #[serde(default)]
    pub candles: CandleSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite URL, `sqlite://feed.db` or `sqlite::memory:`
    #[serde(default = "default_database_url")]
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSettings {
    #[serde(default = "default_rest_url")]
    pub rest_url: String,
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
    #[serde(default = "default_category")]
    pub category: String,
    /// Symbols to track at startup
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamSettings {
    /// Idle seconds before a ping goes out
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
    /// Order book subscription depth
    #[serde(default = "default_depth")]
    pub depth: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CandleSettings {
    /// Bucket width in milliseconds
    #[serde(default = "default_buoy_duration_ms")]
    pub buoy_duration_ms: u64,
    /// How often candle views refresh and trades flush to storage
    #[serde(default = "default_refresh_secs")]
    pub refresh_secs: u64,
}

fn default_database_url() -> String {
    "sqlite://feed.db".to_string()
}

fn default_rest_url() -> String {
    "https://api.bybit.com".to_string()
}

fn default_ws_url() -> String {
    "wss://stream.bybit.com/v5/public/spot".to_string()
}

fn default_category() -> String {
    "spot".to_string()
}

fn default_symbols() -> Vec<String> {
    vec!["BTCUSDT".to_string()]
}

fn default_heartbeat_secs() -> u64 {
    15
}

fn default_depth() -> u32 {
    50
}

fn default_buoy_duration_ms() -> u64 {
    60_000
}

fn default_refresh_secs() -> u64 {
    5
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: default_database_url(),
        }
    }
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            rest_url: default_rest_url(),
            ws_url: default_ws_url(),
            category: default_category(),
            symbols: default_symbols(),
        }
    }
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            heartbeat_secs: default_heartbeat_secs(),
            depth: default_depth(),
        }
    }
}

impl Default for CandleSettings {
    fn default() -> Self {
        Self {
            buoy_duration_ms: default_buoy_duration_ms(),
            refresh_secs: default_refresh_secs(),
        }
    }
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(Environment::with_prefix("FEED").separator("__"))
            .build()?
            .try_deserialize()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database: DatabaseSettings::default(),
            provider: ProviderSettings::default(),
            stream: StreamSettings::default(),
            candles: CandleSettings::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.stream.heartbeat_secs, 15);
        assert_eq!(settings.stream.depth, 50);
        assert_eq!(settings.provider.category, "spot");
        assert_eq!(settings.candles.buoy_duration_ms, 60_000);
        assert_eq!(settings.database.url, "sqlite://feed.db");
    }

    #[test]
    fn test_empty_sources_yield_defaults() {
        let settings: Settings = Config::builder()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(settings.provider.symbols, vec!["BTCUSDT"]);
        assert_eq!(settings.candles.refresh_secs, 5);
    }
}
