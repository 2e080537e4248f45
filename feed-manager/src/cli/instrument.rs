//! `instrument` command: one-shot instrument lookup.

use anyhow::Result;

use crate::config::Settings;
use crate::connect::HostResolver;
use crate::provider::bybit::{BybitClient, BybitConfig};

pub async fn execute(settings: Settings, symbol: String) -> Result<()> {
    let client = BybitClient::new(
        BybitConfig {
            rest_url: settings.provider.rest_url,
            ws_url: settings.provider.ws_url,
            category: settings.provider.category,
            depth: settings.stream.depth,
            heartbeat_secs: settings.stream.heartbeat_secs,
        },
        HostResolver::new(),
    );

    let info = client.instrument_info(&symbol).await?;

    println!("symbol:          {}", info.symbol);
    println!("base coin:       {}", info.base_coin);
    println!("quote coin:      {}", info.quote_coin);
    println!("status:          {}", info.status);
    println!("tick size:       {}", info.price_filter.tick_size);
    println!("base precision:  {}", info.lot_size_filter.base_precision);
    println!("quote precision: {}", info.lot_size_filter.quote_precision);
    println!(
        "order qty:       {} .. {}",
        info.lot_size_filter.min_order_qty, info.lot_size_filter.max_order_qty
    );
    println!(
        "order amt:       {} .. {}",
        info.lot_size_filter.min_order_amt, info.lot_size_filter.max_order_amt
    );

    Ok(())
}
