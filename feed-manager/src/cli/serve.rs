//! `serve` command: the long-running feed.
//!
//! Connects the stream, tracks the configured symbols and then loops on a
//! refresh timer: fold new trades into each symbol's candle view, flush
//! new trades to storage, log the active candle. Runs until Ctrl-C.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Result;
use tracing::{error, info, warn};

use crate::config::Settings;
use crate::connect::HostResolver;
use crate::manager::{CandleView, MarketDataManager};
use crate::provider::bybit::{BybitClient, BybitConfig};
use crate::storage::DbStorage;

const PROVIDER: &str = "bybit";

pub async fn execute(settings: Settings, symbol_override: Vec<String>) -> Result<()> {
    let symbols = if symbol_override.is_empty() {
        settings.provider.symbols.clone()
    } else {
        symbol_override
    };
    anyhow::ensure!(!symbols.is_empty(), "no symbols to track");

    let db = DbStorage::connect(&settings.database.url).await?;

    let resolver = HostResolver::new();
    let client = BybitClient::new(
        BybitConfig {
            rest_url: settings.provider.rest_url.clone(),
            ws_url: settings.provider.ws_url.clone(),
            category: settings.provider.category.clone(),
            depth: settings.stream.depth,
            heartbeat_secs: settings.stream.heartbeat_secs,
        },
        resolver,
    );

    let server_ms = client.sync_server_time().await?;
    info!(server_ms, "Exchange clock synced");

    client.connect();

    let mut views: HashMap<String, CandleView> = HashMap::new();
    let mut flush_cursors: HashMap<String, usize> = HashMap::new();

    for symbol in &symbols {
        let info = client.instrument_info(symbol).await?;
        if db.record_instrument(PROVIDER, &info).await? {
            info!(symbol = %symbol, "Instrument definition stored");
        }
        let manager = client.track_instrument(&info)?;

        backfill_recent(&client, &db, &manager, symbol).await;

        views.insert(
            symbol.clone(),
            CandleView::new(manager, settings.candles.buoy_duration_ms),
        );
        flush_cursors.insert(symbol.clone(), 0);
    }
    info!(symbols = ?symbols, "Feed running");

    let mut refresh =
        tokio::time::interval(Duration::from_secs(settings.candles.refresh_secs.max(1)));
    refresh.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = refresh.tick() => {
                refresh_views(&client, &mut views);
                flush_trades(&client, &db, &mut flush_cursors).await;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }

    // Final flush so a clean shutdown loses nothing
    flush_trades(&client, &db, &mut flush_cursors).await;
    Ok(())
}

/// Persist the exchange's recent-trade history. It goes straight to
/// storage, not into the live cache, so it cannot violate stream order.
async fn backfill_recent(
    client: &BybitClient,
    db: &DbStorage,
    manager: &MarketDataManager,
    symbol: &str,
) {
    let recent = match client.recent_trades(symbol, 100).await {
        Ok(recent) => recent,
        Err(e) => {
            warn!(symbol, error = %e, "Recent-trade backfill failed");
            return;
        }
    };

    let trades: Vec<_> = recent
        .iter()
        .filter_map(|t| match manager.normalize_recent(t) {
            Ok(trade) => Some(trade),
            Err(e) => {
                warn!(symbol, error = %e, "Skipping bad history entry");
                None
            }
        })
        .collect();

    match db.record_trades(PROVIDER, &trades).await {
        Ok(stored) => info!(symbol, stored, "Trade history backfilled"),
        Err(e) => warn!(symbol, error = %e, "History flush failed"),
    }
}

fn refresh_views(client: &BybitClient, views: &mut HashMap<String, CandleView>) {
    let now_ms = client.server_now_ms();
    for (symbol, view) in views.iter_mut() {
        match view.refresh(now_ms) {
            Ok(()) => {
                let active = view.active();
                info!(
                    symbol = %symbol,
                    sealed = view.sealed().count(),
                    mean = active.mean,
                    volume = active.volume,
                    "Candles refreshed"
                );
            }
            Err(e) => {
                // Out-of-order delivery poisons the grid, start it over
                warn!(symbol = %symbol, error = %e, "Candle refresh failed, resetting view");
                view.reset();
            }
        }
    }
}

async fn flush_trades(
    client: &BybitClient,
    db: &DbStorage,
    cursors: &mut HashMap<String, usize>,
) {
    for (symbol, cursor) in cursors.iter_mut() {
        let Some(manager) = client.manager(symbol) else {
            continue;
        };
        let (batch, len) =
            manager.with_trades(|cache| (cache.since(*cursor).to_vec(), cache.len()));
        if batch.is_empty() {
            continue;
        }

        match db.record_trades(PROVIDER, &batch).await {
            Ok(stored) => {
                *cursor = len;
                info!(symbol = %symbol, stored, "Trades persisted");
            }
            Err(e) => {
                // Cursor stays put, the batch retries next tick
                error!(symbol = %symbol, error = %e, "Trade flush failed");
            }
        }
    }
}
