//! Yahoo Finance chart API: primary equity quotes and the daily price history
//! that feeds the technical indicators. No API key required.

use async_trait::async_trait;
use chrono::DateTime;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::cache::TtlCache;
use crate::clock::SharedClock;
use crate::config::ProviderSettings;
use crate::ingest::http::{HttpRequest, Transport};
use crate::ingest::provider_core::{parse_json, ProviderCore};
use crate::ingest::providers::technical::HistorySource;
use crate::ingest::types::{
    Capability, DataProvider, DataRequest, Payload, ProviderError, ProviderResult, ProviderStatus,
};
use crate::model::{AssetClass, PriceBar, PriceInfo, Symbol};

const BASE_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";

/// Index symbols reported by [`YahooProvider::market_indices`].
pub const MARKET_INDICES: &[(&str, &str)] = &[
    ("^GSPC", "S&P 500"),
    ("^DJI", "Dow Jones"),
    ("^IXIC", "NASDAQ"),
    ("^GSPTSE", "TSX Composite"),
    ("^VIX", "VIX"),
];

pub struct YahooProvider {
    core: ProviderCore,
    quotes: TtlCache<PriceInfo>,
    history: TtlCache<Vec<PriceBar>>,
    base_url: String,
}

impl YahooProvider {
    pub const NAME: &'static str = "yahoo";

    pub fn new(
        settings: ProviderSettings,
        transport: Arc<dyn Transport>,
        clock: SharedClock,
    ) -> Self {
        let ttl = settings.cache_ttl;
        Self {
            core: ProviderCore::new(
                Self::NAME,
                "Yahoo Finance",
                settings,
                false,
                transport,
                clock.clone(),
            ),
            quotes: TtlCache::new(ttl, clock.clone()),
            history: TtlCache::new(ttl, clock),
            base_url: BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.core = self.core.with_timeout(timeout);
        self
    }

    pub async fn quote(&self, symbol: &Symbol, asset: AssetClass) -> ProviderResult<PriceInfo> {
        let ticker = yahoo_ticker(symbol, asset);
        let key = self.core.cache_key("quote", &[&ticker]);
        let req = HttpRequest::get(format!("{}/{}", self.base_url, ticker))
            .param("range", "5d")
            .param("interval", "1d");
        self.core
            .cached_get(&self.quotes, &key, req, |body| parse_quote(body, &ticker))
            .await
    }

    /// Daily bars for the last year, oldest first.
    pub async fn history(&self, symbol: &Symbol) -> ProviderResult<Vec<PriceBar>> {
        let key = self.core.cache_key("history", &[symbol.as_str(), "1y"]);
        let req = HttpRequest::get(format!("{}/{}", self.base_url, symbol))
            .param("range", "1y")
            .param("interval", "1d");
        self.core
            .cached_get(&self.history, &key, req, |body| {
                let bars = parse_bars(body)?;
                if bars.is_empty() {
                    return Err(ProviderError::NoData(format!("no history for {symbol}")));
                }
                Ok(bars)
            })
            .await
    }

    /// Quotes for the major North American indices, keyed by display name.
    /// Failed indices are left out.
    pub async fn market_indices(&self) -> BTreeMap<String, PriceInfo> {
        let mut out = BTreeMap::new();
        for (sym, label) in MARKET_INDICES {
            match self.quote(&Symbol::new(sym), AssetClass::Equity).await {
                Ok(q) => {
                    out.insert(label.to_string(), q);
                }
                Err(e) => {
                    tracing::warn!(target: "ingest", index = sym, error = %e, "index quote failed")
                }
            }
        }
        out
    }
}

#[async_trait]
impl DataProvider for YahooProvider {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn capabilities(&self) -> &'static [Capability] {
        &[Capability::Price]
    }

    async fn fetch(&self, request: &DataRequest) -> ProviderResult<Payload> {
        match request {
            DataRequest::Quote { symbol, asset } => {
                self.quote(symbol, *asset).await.map(Payload::Quote)
            }
            DataRequest::MarketIndices => {
                let indices = self.market_indices().await;
                if indices.is_empty() {
                    return Err(ProviderError::NoData("no index quotes".into()));
                }
                Ok(Payload::Quotes(indices))
            }
            other => Err(ProviderError::Unsupported {
                provider: Self::NAME,
                request: other.label(),
            }),
        }
    }

    fn status(&self) -> ProviderStatus {
        self.core.status(self.quotes.len() + self.history.len())
    }

    fn sweep_caches(&self) -> usize {
        self.quotes.sweep_expired() + self.history.sweep_expired()
    }
}

#[async_trait]
impl HistorySource for YahooProvider {
    async fn daily_history(&self, symbol: &Symbol) -> ProviderResult<Vec<PriceBar>> {
        self.history(symbol).await
    }
}

fn yahoo_ticker(symbol: &Symbol, asset: AssetClass) -> String {
    match asset {
        AssetClass::Equity => symbol.to_string(),
        AssetClass::Forex => format!("{symbol}=X"),
        AssetClass::Crypto => format!("{symbol}-USD"),
    }
}

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    #[serde(default)]
    regular_market_price: Option<f64>,
    #[serde(default)]
    previous_close: Option<f64>,
    #[serde(default)]
    chart_previous_close: Option<f64>,
    #[serde(default)]
    regular_market_volume: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteSeries>,
}

#[derive(Debug, Default, Deserialize)]
struct QuoteSeries {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

fn first_result(body: &str) -> ProviderResult<ChartResult> {
    let env: ChartEnvelope = parse_json(body)?;
    if let Some(err) = env.chart.error {
        let msg = err.description.unwrap_or_else(|| "chart error".into());
        return Err(ProviderError::NoData(msg));
    }
    env.chart
        .result
        .and_then(|v| v.into_iter().next())
        .ok_or_else(|| ProviderError::NoData("empty chart result".into()))
}

fn bars_of(r: &ChartResult) -> Vec<PriceBar> {
    let empty = QuoteSeries::default();
    let q = r.indicators.quote.first().unwrap_or(&empty);
    let at = |v: &Vec<Option<f64>>, i: usize| v.get(i).copied().flatten();
    r.timestamp
        .iter()
        .enumerate()
        .filter_map(|(i, ts)| {
            let date = DateTime::from_timestamp(*ts, 0)?.date_naive();
            Some(PriceBar {
                date,
                open: at(&q.open, i)?,
                high: at(&q.high, i)?,
                low: at(&q.low, i)?,
                close: at(&q.close, i)?,
                volume: at(&q.volume, i).unwrap_or(0.0),
            })
        })
        .collect()
}

fn parse_bars(body: &str) -> ProviderResult<Vec<PriceBar>> {
    Ok(bars_of(&first_result(body)?))
}

fn parse_quote(body: &str, ticker: &str) -> ProviderResult<PriceInfo> {
    let r = first_result(body)?;
    let bars = bars_of(&r);

    let price = r
        .meta
        .regular_market_price
        .or_else(|| bars.last().map(|b| b.close))
        .filter(|p| *p > 0.0)
        .ok_or_else(|| ProviderError::NoData(format!("no price for {ticker}")))?;

    let prev = r
        .meta
        .previous_close
        .or_else(|| (bars.len() >= 2).then(|| bars[bars.len() - 2].close))
        .or(r.meta.chart_previous_close)
        .unwrap_or(price);

    let change = price - prev;
    let change_percent = if prev > 0.0 { change / prev * 100.0 } else { 0.0 };

    Ok(PriceInfo {
        price,
        change,
        change_percent,
        volume: r
            .meta
            .regular_market_volume
            .or_else(|| bars.last().map(|b| b.volume)),
        source: YahooProvider::NAME.to_string(),
    })
}
