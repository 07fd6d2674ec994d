//! Market data aggregation service: binary entrypoint.
//! Boots the Axum HTTP server with the live providers wired in.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use market_data_aggregator::{
    app, init_tracing, metrics::Metrics, spawn_cache_sweeper, Aggregator, MarketDataConfig,
    ReferenceTables,
};
use shuttle_axum::ShuttleAxum;

/// Expired cache entries are swept at this interval.
const SWEEP_EVERY: Duration = Duration::from_secs(600);

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = MarketDataConfig::from_env();
    let tables = ReferenceTables::load_default().context("load market tables")?;
    tracing::info!(
        tickers = tables.tickers.len(),
        sectors = tables.sectors.len(),
        series = tables.economic_series.len(),
        "reference tables loaded"
    );

    let aggregator = Arc::new(Aggregator::from_config(&cfg, tables).context("build aggregator")?);
    for s in aggregator.status() {
        if !s.configured {
            tracing::warn!(provider = %s.name, "provider not configured; it will report errors");
        }
    }
    spawn_cache_sweeper(aggregator.clone(), SWEEP_EVERY);

    let metrics = Metrics::init(cfg.yahoo.cache_ttl.as_secs()).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "metrics recorder unavailable; /metrics will be empty");
        Metrics::detached()
    });

    Ok(app(aggregator, &metrics).into())
}
