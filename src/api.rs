use std::sync::Arc;

use serde::Deserialize;
use shuttle_axum::axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::aggregate::Aggregator;
use crate::ingest::types::ProviderError;
use crate::model::{parse_symbols, AssetClass, IndicatorGroup};

/// Upper bound on symbols per snapshot request.
pub const MAX_SYMBOLS: usize = 25;

#[derive(Clone)]
pub struct AppState {
    pub aggregator: Arc<Aggregator>,
}

impl AppState {
    pub fn new(aggregator: Arc<Aggregator>) -> Self {
        Self { aggregator }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/snapshot", get(snapshot))
        .route("/headlines", get(headlines))
        .route("/indices", get(indices))
        .route("/indicators", get(indicators))
        .route("/status", get(status))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(Deserialize)]
struct SnapshotQuery {
    #[serde(default)]
    symbols: String,
    #[serde(default)]
    asset: Option<String>,
}

fn bad_request(msg: String) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "error": msg })),
    )
        .into_response()
}

fn unavailable(e: ProviderError) -> Response {
    (
        StatusCode::BAD_GATEWAY,
        Json(serde_json::json!({ "error": e.to_string() })),
    )
        .into_response()
}

async fn snapshot(State(state): State<AppState>, Query(q): Query<SnapshotQuery>) -> Response {
    let symbols = parse_symbols(&q.symbols);
    if symbols.is_empty() {
        return bad_request("symbols is required, e.g. ?symbols=AAPL,MSFT".into());
    }
    if symbols.len() > MAX_SYMBOLS {
        return bad_request(format!("at most {MAX_SYMBOLS} symbols per request"));
    }
    let asset = match q.asset.as_deref() {
        None => AssetClass::Equity,
        Some(raw) => match AssetClass::parse(raw) {
            Some(a) => a,
            None => {
                return bad_request(format!(
                    "unknown asset {raw:?}, expected equity, forex or crypto"
                ))
            }
        },
    };
    Json(state.aggregator.fetch_assets(&symbols, asset).await).into_response()
}

#[derive(Deserialize)]
struct HeadlinesQuery {
    #[serde(default = "default_category")]
    category: String,
    #[serde(default = "default_page_size")]
    page_size: u32,
}

fn default_category() -> String {
    "business".into()
}

fn default_page_size() -> u32 {
    10
}

async fn headlines(State(state): State<AppState>, Query(q): Query<HeadlinesQuery>) -> Response {
    let page_size = q.page_size.clamp(1, 100);
    Json(state.aggregator.headlines(&q.category, page_size).await).into_response()
}

async fn status(State(state): State<AppState>) -> Response {
    Json(state.aggregator.status()).into_response()
}

async fn indices(State(state): State<AppState>) -> Response {
    match state.aggregator.market_indices().await {
        Ok(m) => Json(m).into_response(),
        Err(e) => unavailable(e),
    }
}

#[derive(Deserialize)]
struct IndicatorsQuery {
    #[serde(default)]
    group: Option<String>,
}

async fn indicators(State(state): State<AppState>, Query(q): Query<IndicatorsQuery>) -> Response {
    let group = match q.group.as_deref() {
        None => IndicatorGroup::Core,
        Some(raw) => match IndicatorGroup::parse(raw) {
            Some(g) => g,
            None => {
                let known: Vec<&str> = IndicatorGroup::ALL.iter().map(|g| g.as_str()).collect();
                return bad_request(format!(
                    "unknown group {raw:?}, expected one of {}",
                    known.join(", ")
                ));
            }
        },
    };
    match state.aggregator.indicator_group(group).await {
        Ok(m) => Json(m).into_response(),
        Err(e) => unavailable(e),
    }
}
