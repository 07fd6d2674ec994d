// src/ingest/types.rs
use crate::model::{
    AssetClass, DateWindow, EconomicIndicator, IndicatorGroup, NewsArticle, PriceInfo, Symbol,
    TechnicalInfo,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Failure at the provider boundary. Providers never panic past this type;
/// the aggregator records it and keeps going.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("{0} API key not configured")]
    NotConfigured(&'static str),
    #[error("network error: {0}")]
    Network(String),
    #[error("timeout")]
    Timeout,
    #[error("parse error: {0}")]
    Parse(String),
    #[error("no data: {0}")]
    NoData(String),
    #[error("{provider} does not support {request}")]
    Unsupported {
        provider: &'static str,
        request: &'static str,
    },
}

impl ProviderError {
    /// Short label used as a metrics dimension.
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::NotConfigured(_) => "not_configured",
            ProviderError::Network(_) | ProviderError::Timeout => "network",
            ProviderError::Parse(_) => "parse",
            ProviderError::NoData(_) => "no_data",
            ProviderError::Unsupported { .. } => "unsupported",
        }
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Price,
    News,
    EconomicIndicator,
    Technical,
}

/// Per-symbol news lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct NewsQuery {
    pub symbol: Symbol,
    /// Company search terms; providers that search by free text use these.
    pub terms: Vec<String>,
    pub window: DateWindow,
    pub page_size: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DataRequest {
    Quote { symbol: Symbol, asset: AssetClass },
    News(NewsQuery),
    Headlines { category: String, page_size: u32 },
    Indicator { series_id: String, title: String },
    IndicatorGroup(IndicatorGroup),
    MarketIndices,
    Technical { symbol: Symbol },
}

impl DataRequest {
    pub fn label(&self) -> &'static str {
        match self {
            DataRequest::Quote { .. } => "quote",
            DataRequest::News(_) => "news",
            DataRequest::Headlines { .. } => "headlines",
            DataRequest::Indicator { .. } => "indicator",
            DataRequest::IndicatorGroup(_) => "indicator_group",
            DataRequest::MarketIndices => "market_indices",
            DataRequest::Technical { .. } => "technical",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Quote(PriceInfo),
    /// Quotes keyed by display name.
    Quotes(BTreeMap<String, PriceInfo>),
    Articles(Vec<NewsArticle>),
    Indicator(EconomicIndicator),
    /// Indicators keyed by series id.
    Indicators(BTreeMap<String, EconomicIndicator>),
    Technical(TechnicalInfo),
}

impl Payload {
    pub fn into_quote(self) -> ProviderResult<PriceInfo> {
        match self {
            Payload::Quote(q) => Ok(q),
            other => Err(mismatch("quote", &other)),
        }
    }

    pub fn into_quotes(self) -> ProviderResult<BTreeMap<String, PriceInfo>> {
        match self {
            Payload::Quotes(q) => Ok(q),
            other => Err(mismatch("quotes", &other)),
        }
    }

    pub fn into_articles(self) -> ProviderResult<Vec<NewsArticle>> {
        match self {
            Payload::Articles(a) => Ok(a),
            other => Err(mismatch("articles", &other)),
        }
    }

    pub fn into_indicator(self) -> ProviderResult<EconomicIndicator> {
        match self {
            Payload::Indicator(i) => Ok(i),
            other => Err(mismatch("indicator", &other)),
        }
    }

    pub fn into_indicators(self) -> ProviderResult<BTreeMap<String, EconomicIndicator>> {
        match self {
            Payload::Indicators(i) => Ok(i),
            other => Err(mismatch("indicators", &other)),
        }
    }

    pub fn into_technical(self) -> ProviderResult<TechnicalInfo> {
        match self {
            Payload::Technical(t) => Ok(t),
            other => Err(mismatch("technical", &other)),
        }
    }

    fn variant(&self) -> &'static str {
        match self {
            Payload::Quote(_) => "quote",
            Payload::Quotes(_) => "quotes",
            Payload::Articles(_) => "articles",
            Payload::Indicator(_) => "indicator",
            Payload::Indicators(_) => "indicators",
            Payload::Technical(_) => "technical",
        }
    }
}

fn mismatch(expected: &str, got: &Payload) -> ProviderError {
    ProviderError::Parse(format!("expected {expected} payload, got {}", got.variant()))
}

/// Point-in-time view of a provider's cache and quota usage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderStatus {
    pub name: String,
    pub configured: bool,
    pub cache_entries: usize,
    pub requests_in_window: Option<u32>,
    pub rate_limit: Option<u32>,
    pub last_request_at: Option<DateTime<Utc>>,
}

/// One external data source.
#[async_trait::async_trait]
pub trait DataProvider: Send + Sync {
    fn name(&self) -> &'static str;

    fn capabilities(&self) -> &'static [Capability];

    async fn fetch(&self, request: &DataRequest) -> ProviderResult<Payload>;

    fn status(&self) -> ProviderStatus {
        ProviderStatus {
            name: self.name().to_string(),
            configured: true,
            cache_entries: 0,
            requests_in_window: None,
            rate_limit: None,
            last_request_at: None,
        }
    }

    /// Drop expired cache entries; returns how many were removed.
    fn sweep_caches(&self) -> usize {
        0
    }
}
