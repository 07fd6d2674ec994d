// src/aggregate/mod.rs
//! Fan-out over every configured provider, fan-in of raw outcomes, and the
//! structuring pass that turns them into a [`MarketSnapshot`].

pub mod structure;
pub mod window;

use metrics::{counter, gauge};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::clock::{system_clock, SharedClock};
use crate::config::{MarketDataConfig, ReferenceTables};
use crate::ingest::ensure_metrics_described;
use crate::ingest::http::{ReqwestTransport, Transport};
use crate::ingest::providers::{
    FinnhubProvider, FredProvider, NewsApiProvider, PolygonProvider, TechnicalProvider,
    YahooProvider,
};
use crate::ingest::types::{
    DataProvider, DataRequest, NewsQuery, Payload, ProviderError, ProviderResult, ProviderStatus,
};
use crate::model::{
    AssetClass, DateWindow, EconomicIndicator, IndicatorGroup, MarketSnapshot, NewsArticle,
    PriceInfo, Symbol,
};
use crate::sentiment::SentimentClassifier;

pub use structure::{structure, ProviderData, ProviderOutcome, Role, StructureInput};
pub use window::date_window;

pub const DEFAULT_NEWS_PAGE_SIZE: u32 = 6;

type Provider = Arc<dyn DataProvider>;

/// Providers by role plus the reference tables they are queried with.
pub struct Aggregator {
    primary_price: Option<Provider>,
    secondary_price: Option<Provider>,
    news: Vec<Provider>,
    economic: Option<Provider>,
    technical: Option<Provider>,
    tables: Arc<ReferenceTables>,
    clock: SharedClock,
    news_page_size: u32,
}

#[derive(Default)]
pub struct AggregatorBuilder {
    primary_price: Option<Provider>,
    secondary_price: Option<Provider>,
    news: Vec<Provider>,
    economic: Option<Provider>,
    technical: Option<Provider>,
    clock: Option<SharedClock>,
    news_page_size: Option<u32>,
}

impl AggregatorBuilder {
    pub fn primary_price(mut self, p: Provider) -> Self {
        self.primary_price = Some(p);
        self
    }

    pub fn secondary_price(mut self, p: Provider) -> Self {
        self.secondary_price = Some(p);
        self
    }

    pub fn news(mut self, p: Provider) -> Self {
        self.news.push(p);
        self
    }

    pub fn economic(mut self, p: Provider) -> Self {
        self.economic = Some(p);
        self
    }

    pub fn technical(mut self, p: Provider) -> Self {
        self.technical = Some(p);
        self
    }

    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn news_page_size(mut self, n: u32) -> Self {
        self.news_page_size = Some(n);
        self
    }

    pub fn build(self, tables: ReferenceTables) -> Aggregator {
        Aggregator {
            primary_price: self.primary_price,
            secondary_price: self.secondary_price,
            news: self.news,
            economic: self.economic,
            technical: self.technical,
            tables: Arc::new(tables),
            clock: self.clock.unwrap_or_else(system_clock),
            news_page_size: self.news_page_size.unwrap_or(DEFAULT_NEWS_PAGE_SIZE),
        }
    }
}

/// What one provider task is asked to fetch.
enum Plan {
    Quotes(Vec<(Symbol, AssetClass)>),
    News(Vec<NewsQuery>),
    Indicators(Vec<(String, String)>),
    Technical(Vec<Symbol>),
}

impl Aggregator {
    pub fn builder() -> AggregatorBuilder {
        AggregatorBuilder::default()
    }

    /// Wire up the live providers from configuration.
    pub fn from_config(cfg: &MarketDataConfig, tables: ReferenceTables) -> anyhow::Result<Self> {
        let transport: Arc<dyn Transport> = Arc::new(ReqwestTransport::new(cfg.http_timeout)?);
        let clock = system_clock();
        let t = cfg.http_timeout;

        let yahoo = Arc::new(
            YahooProvider::new(cfg.yahoo.clone(), transport.clone(), clock.clone()).with_timeout(t),
        );
        let polygon = PolygonProvider::new(cfg.polygon.clone(), transport.clone(), clock.clone())
            .with_timeout(t);
        let newsapi = NewsApiProvider::new(
            cfg.newsapi.clone(),
            transport.clone(),
            clock.clone(),
            SentimentClassifier::new(tables.sentiment_for(NewsApiProvider::NAME)),
        )
        .with_terms_per_ticker(cfg.news_terms_per_ticker)
        .with_timeout(t);
        let finnhub = FinnhubProvider::new(
            cfg.finnhub.clone(),
            transport.clone(),
            clock.clone(),
            SentimentClassifier::new(tables.sentiment_for(FinnhubProvider::NAME)),
        )
        .with_timeout(t);
        let fred = FredProvider::new(cfg.fred.clone(), transport, clock.clone()).with_timeout(t);
        let technical = TechnicalProvider::new(yahoo.clone(), cfg.yahoo.cache_ttl, clock.clone());

        Ok(Self::builder()
            .primary_price(yahoo)
            .secondary_price(Arc::new(polygon))
            .news(Arc::new(newsapi))
            .news(Arc::new(finnhub))
            .economic(Arc::new(fred))
            .technical(Arc::new(technical))
            .clock(clock)
            .news_page_size(cfg.news_page_size)
            .build(tables))
    }

    fn providers(&self) -> Vec<(Role, Provider)> {
        let mut out = Vec::new();
        if let Some(p) = &self.primary_price {
            out.push((Role::PrimaryPrice, p.clone()));
        }
        if let Some(p) = &self.secondary_price {
            out.push((Role::SecondaryPrice, p.clone()));
        }
        for p in &self.news {
            out.push((Role::News, p.clone()));
        }
        if let Some(p) = &self.economic {
            out.push((Role::Economic, p.clone()));
        }
        if let Some(p) = &self.technical {
            out.push((Role::Technical, p.clone()));
        }
        out
    }

    fn plan(&self, role: Role, symbols: &[Symbol], asset: AssetClass, window: DateWindow) -> Plan {
        let quotes = || -> Vec<(Symbol, AssetClass)> {
            symbols.iter().map(|s| (s.clone(), asset)).collect()
        };
        match role {
            // Sector ETFs ride along with the primary quotes only.
            Role::PrimaryPrice => {
                let mut all = quotes();
                for etf in self.tables.sector_etfs() {
                    if !all.iter().any(|(s, _)| *s == etf) {
                        all.push((etf, AssetClass::Equity));
                    }
                }
                Plan::Quotes(all)
            }
            Role::SecondaryPrice => Plan::Quotes(quotes()),
            Role::News => Plan::News(
                symbols
                    .iter()
                    .map(|s| NewsQuery {
                        symbol: s.clone(),
                        terms: self.tables.search_terms(s),
                        window,
                        page_size: self.news_page_size,
                    })
                    .collect(),
            ),
            Role::Economic => Plan::Indicators(
                self.tables
                    .economic_series
                    .iter()
                    .map(|s| (s.series_id.clone(), s.title.clone()))
                    .collect(),
            ),
            Role::Technical => Plan::Technical(symbols.to_vec()),
        }
    }

    /// One aggregation pass over equities. Always returns a snapshot; provider
    /// failures are recorded in it, never propagated.
    pub async fn fetch(&self, symbols: &[Symbol]) -> MarketSnapshot {
        self.fetch_assets(symbols, AssetClass::Equity).await
    }

    /// Like [`Aggregator::fetch`], quoting `symbols` as `asset` (e.g. `EURUSD`
    /// as forex, `BTC` as crypto). Sector ETFs are always equities.
    pub async fn fetch_assets(&self, symbols: &[Symbol], asset: AssetClass) -> MarketSnapshot {
        ensure_metrics_described();
        let now = self.clock.now();
        let window = date_window(now);
        if window.weekend {
            tracing::info!(
                target: "aggregate",
                from = %window.from,
                to = %window.to,
                "weekend window"
            );
        }

        let tasks: Vec<(Role, &'static str, JoinHandle<ProviderResult<ProviderData>>)> = self
            .providers()
            .into_iter()
            .map(|(role, p)| {
                let name = p.name();
                let plan = self.plan(role, symbols, asset, window);
                (role, name, tokio::spawn(run_plan(p, plan)))
            })
            .collect();

        let mut outcomes = Vec::with_capacity(tasks.len());
        for (role, name, handle) in tasks {
            let result = joined(handle).await;
            if let Err(e) = &result {
                tracing::warn!(target: "aggregate", provider = name, error = %e, "provider error");
                counter!("provider_errors_total", "provider" => name, "kind" => e.kind())
                    .increment(1);
            }
            outcomes.push(ProviderOutcome {
                provider: name.to_string(),
                role,
                result,
            });
        }

        let snapshot = structure(
            outcomes,
            StructureInput {
                symbols,
                tables: &self.tables,
                window,
                generated_at: now,
            },
        );
        gauge!("snapshot_last_run_ts").set(now.timestamp() as f64);
        tracing::info!(
            target: "aggregate",
            symbols = symbols.len(),
            available = snapshot.available_sources.len(),
            errors = snapshot.error_sources.len(),
            data_points = snapshot.data_points(),
            "snapshot built"
        );
        snapshot
    }

    /// Market headlines for `category` from every news provider, queried
    /// concurrently and deduplicated in provider order. Providers that fail
    /// are skipped.
    pub async fn headlines(&self, category: &str, page_size: u32) -> Vec<NewsArticle> {
        let req = DataRequest::Headlines {
            category: category.to_string(),
            page_size,
        };
        let tasks: Vec<(&'static str, JoinHandle<ProviderResult<Vec<NewsArticle>>>)> = self
            .news
            .iter()
            .map(|p| {
                let name = p.name();
                let (p, req) = (p.clone(), req.clone());
                let handle = tokio::spawn(async move {
                    p.fetch(&req).await.and_then(Payload::into_articles)
                });
                (name, handle)
            })
            .collect();

        let mut all = Vec::new();
        for (name, handle) in tasks {
            match joined(handle).await {
                Ok(v) => all.extend(v),
                Err(e) => {
                    tracing::warn!(
                        target: "aggregate",
                        provider = name,
                        error = %e,
                        "headlines failed"
                    )
                }
            }
        }
        crate::ingest::dedup_articles(all).0
    }

    /// Quotes for the major indices from the primary price provider.
    pub async fn market_indices(&self) -> ProviderResult<BTreeMap<String, PriceInfo>> {
        let p = self
            .primary_price
            .as_ref()
            .ok_or_else(|| ProviderError::NoData("no price provider configured".into()))?;
        p.fetch(&DataRequest::MarketIndices)
            .await
            .and_then(Payload::into_quotes)
    }

    /// Every series of `group` from the economic provider, keyed by series id.
    pub async fn indicator_group(
        &self,
        group: IndicatorGroup,
    ) -> ProviderResult<BTreeMap<String, EconomicIndicator>> {
        let p = self
            .economic
            .as_ref()
            .ok_or_else(|| ProviderError::NoData("no economic provider configured".into()))?;
        p.fetch(&DataRequest::IndicatorGroup(group))
            .await
            .and_then(Payload::into_indicators)
    }

    pub fn status(&self) -> Vec<ProviderStatus> {
        self.providers().iter().map(|(_, p)| p.status()).collect()
    }

    /// Drop expired entries from every provider cache.
    pub fn sweep_caches(&self) -> usize {
        self.providers().iter().map(|(_, p)| p.sweep_caches()).sum()
    }
}

/// Periodically sweep provider caches so idle keys do not pile up.
pub fn spawn_cache_sweeper(aggregator: Arc<Aggregator>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            let removed = aggregator.sweep_caches();
            if removed > 0 {
                tracing::debug!(target: "aggregate", removed, "cache sweep");
            }
        }
    })
}

/// A provider task's result; a panicked or cancelled task counts as a
/// network failure of that provider.
async fn joined<T>(handle: JoinHandle<ProviderResult<T>>) -> ProviderResult<T> {
    match handle.await {
        Ok(r) => r,
        Err(e) => Err(ProviderError::Network(format!("provider task failed: {e}"))),
    }
}

async fn run_plan(p: Provider, plan: Plan) -> ProviderResult<ProviderData> {
    match plan {
        Plan::Quotes(symbols) => {
            let reqs = symbols
                .into_iter()
                .map(|(s, asset)| {
                    let req = DataRequest::Quote {
                        symbol: s.clone(),
                        asset,
                    };
                    (s, req)
                })
                .collect();
            gather(p.as_ref(), reqs, Payload::into_quote)
                .await
                .map(ProviderData::Prices)
        }
        Plan::News(queries) => {
            let reqs = queries
                .into_iter()
                .map(|q| (q.symbol.clone(), DataRequest::News(q)))
                .collect();
            gather(p.as_ref(), reqs, Payload::into_articles)
                .await
                .map(|m| ProviderData::News(m.into_values().flatten().collect()))
        }
        Plan::Indicators(series) => {
            let reqs = series
                .into_iter()
                .map(|(series_id, title)| {
                    (series_id.clone(), DataRequest::Indicator { series_id, title })
                })
                .collect();
            gather(p.as_ref(), reqs, Payload::into_indicator)
                .await
                .map(ProviderData::Indicators)
        }
        Plan::Technical(symbols) => {
            let reqs = symbols
                .into_iter()
                .map(|s| (s.clone(), DataRequest::Technical { symbol: s }))
                .collect();
            gather(p.as_ref(), reqs, Payload::into_technical)
                .await
                .map(ProviderData::Technical)
        }
    }
}

/// Run `requests` against one provider in order. Individual failures are
/// skipped; the provider fails only when every request failed, with the first
/// error.
async fn gather<K, T>(
    p: &dyn DataProvider,
    requests: Vec<(K, DataRequest)>,
    extract: fn(Payload) -> ProviderResult<T>,
) -> ProviderResult<BTreeMap<K, T>>
where
    K: Ord + std::fmt::Display,
{
    let mut out = BTreeMap::new();
    let mut first_err = None;
    for (key, req) in requests {
        match p.fetch(&req).await.and_then(extract) {
            Ok(v) => {
                out.insert(key, v);
            }
            Err(e) => {
                tracing::debug!(
                    target: "aggregate",
                    provider = p.name(),
                    key = %key,
                    error = %e,
                    "request failed"
                );
                first_err.get_or_insert(e);
            }
        }
    }
    match first_err {
        Some(e) if out.is_empty() => Err(e),
        _ => Ok(out),
    }
}
