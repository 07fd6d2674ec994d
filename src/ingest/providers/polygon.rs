//! Polygon.io previous-day aggregates: secondary quotes for equities, forex
//! pairs and crypto.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use crate::cache::TtlCache;
use crate::clock::SharedClock;
use crate::config::ProviderSettings;
use crate::ingest::http::{HttpRequest, Transport};
use crate::ingest::provider_core::{parse_json, ProviderCore};
use crate::ingest::types::{
    Capability, DataProvider, DataRequest, Payload, ProviderError, ProviderResult, ProviderStatus,
};
use crate::model::{AssetClass, PriceInfo, Symbol};

const BASE_URL: &str = "https://api.polygon.io";

pub struct PolygonProvider {
    core: ProviderCore,
    quotes: TtlCache<PriceInfo>,
    base_url: String,
}

impl PolygonProvider {
    pub const NAME: &'static str = "polygon";

    pub fn new(
        settings: ProviderSettings,
        transport: Arc<dyn Transport>,
        clock: SharedClock,
    ) -> Self {
        let ttl = settings.cache_ttl;
        Self {
            core: ProviderCore::new(
                Self::NAME,
                "Polygon",
                settings,
                true,
                transport,
                clock.clone(),
            ),
            quotes: TtlCache::new(ttl, clock),
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

    /// Previous trading day's close for an equity, forex pair (`EURUSD`) or
    /// crypto asset (`BTC`).
    pub async fn quote(&self, symbol: &Symbol, asset: AssetClass) -> ProviderResult<PriceInfo> {
        let api_key = self.core.api_key()?;
        let ticker = polygon_ticker(symbol, asset);
        let key = self.core.cache_key("prev", &[&ticker]);
        let req = HttpRequest::get(format!("{}/v2/aggs/ticker/{}/prev", self.base_url, ticker))
            .param("adjusted", "true")
            .param("apiKey", api_key);
        self.core
            .cached_get(&self.quotes, &key, req, |body| parse_prev(body, &ticker))
            .await
    }
}

#[async_trait]
impl DataProvider for PolygonProvider {
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
            other => Err(ProviderError::Unsupported {
                provider: Self::NAME,
                request: other.label(),
            }),
        }
    }

    fn status(&self) -> ProviderStatus {
        self.core.status(self.quotes.len())
    }

    fn sweep_caches(&self) -> usize {
        self.quotes.sweep_expired()
    }
}

fn polygon_ticker(symbol: &Symbol, asset: AssetClass) -> String {
    match asset {
        AssetClass::Equity => symbol.to_string(),
        AssetClass::Forex => format!("C:{symbol}"),
        AssetClass::Crypto => format!("X:{symbol}USD"),
    }
}

#[derive(Debug, Deserialize)]
struct PrevResponse {
    #[serde(default)]
    results: Vec<Aggregate>,
}

#[derive(Debug, Deserialize)]
struct Aggregate {
    #[serde(rename = "c")]
    close: f64,
    #[serde(rename = "o")]
    open: f64,
    #[serde(rename = "v", default)]
    volume: Option<f64>,
}

fn parse_prev(body: &str, ticker: &str) -> ProviderResult<PriceInfo> {
    let resp: PrevResponse = parse_json(body)?;
    let agg = resp
        .results
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::NoData(format!("no aggregate for {ticker}")))?;

    // Day move is measured open to close of the aggregate bar.
    let change = agg.close - agg.open;
    let change_percent = if agg.open > 0.0 {
        change / agg.open * 100.0
    } else {
        0.0
    };
    Ok(PriceInfo {
        price: agg.close,
        change,
        change_percent,
        volume: agg.volume,
        source: PolygonProvider::NAME.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::system_clock;
    use crate::ingest::http::ScriptedTransport;

    #[test]
    fn prev_close_maps_open_to_close_move() {
        let body = r#"{"ticker":"AAPL","status":"OK","resultsCount":1,
            "results":[{"T":"AAPL","c":123.45,"h":125.0,"l":120.0,"o":120.0,"v":5.5e7}]}"#;
        let q = parse_prev(body, "AAPL").unwrap();
        assert_eq!(q.price, 123.45);
        assert!((q.change - 3.45).abs() < 1e-9);
        assert!((q.change_percent - 2.875).abs() < 1e-9);
        assert_eq!(q.source, "polygon");
    }

    #[test]
    fn empty_results_is_no_data() {
        let r = parse_prev(r#"{"status":"OK","resultsCount":0,"results":[]}"#, "AAPL");
        assert!(matches!(r, Err(ProviderError::NoData(_))));
    }

    #[test]
    fn ticker_prefixes() {
        assert_eq!(polygon_ticker(&Symbol::new("eurusd"), AssetClass::Forex), "C:EURUSD");
        assert_eq!(polygon_ticker(&Symbol::new("btc"), AssetClass::Crypto), "X:BTCUSD");
    }

    #[tokio::test]
    async fn request_shape_and_missing_key() {
        let t = Arc::new(ScriptedTransport::new());
        t.push_ok(r#"{"results":[{"c":10.0,"o":8.0}]}"#);
        let p =
            PolygonProvider::new(ProviderSettings::with_key("secret"), t.clone(), system_clock())
                .with_base_url("https://poly.test");
        let q = p.quote(&Symbol::new("MSFT"), AssetClass::Equity).await.unwrap();
        assert_eq!(q.price, 10.0);
        let req = &t.requests()[0];
        assert_eq!(req.url, "https://poly.test/v2/aggs/ticker/MSFT/prev");
        assert_eq!(req.query_value("apiKey"), Some("secret"));

        let unkeyed = PolygonProvider::new(ProviderSettings::keyless(), t.clone(), system_clock());
        let err = unkeyed.quote(&Symbol::new("MSFT"), AssetClass::Equity).await.unwrap_err();
        assert_eq!(err.to_string(), "Polygon API key not configured");
        assert_eq!(t.request_count(), 1);
    }
}
