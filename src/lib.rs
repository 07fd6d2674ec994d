// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod aggregate;
pub mod api;
pub mod cache;
pub mod clock;
pub mod config;
pub mod indicators;
pub mod ingest;
pub mod metrics;
pub mod model;
pub mod rate_limit;
pub mod relevance;
pub mod sector;
pub mod sentiment;

// ---- Re-exports for stable public API ----
pub use crate::aggregate::{spawn_cache_sweeper, Aggregator};
pub use crate::api::{create_router, AppState};
pub use crate::config::{MarketDataConfig, ReferenceTables};
pub use crate::model::{MarketSnapshot, Symbol};

use shuttle_axum::axum::Router;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global tracing subscriber. `RUST_LOG` overrides the default
/// filter; `LOG_FORMAT=json` switches to JSON lines. A subscriber that is
/// already installed (e.g. by the hosting runtime) is left alone.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("market_data_aggregator=info,warn"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let res = if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .try_init()
    };
    if res.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

/// Full application router: API routes plus `/metrics`.
pub fn app(aggregator: std::sync::Arc<Aggregator>, metrics: &metrics::Metrics) -> Router {
    create_router(AppState::new(aggregator)).merge(metrics.router())
}
