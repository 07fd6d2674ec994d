// src/config/providers.rs
use serde::Serialize;
use std::time::Duration;

use crate::cache::DEFAULT_TTL;
use crate::ingest::http::DEFAULT_TIMEOUT;
use crate::rate_limit::DEFAULT_LIMIT;

pub const ENV_CACHE_DURATION: &str = "MARKET_DATA_CACHE_DURATION";
pub const ENV_HTTP_TIMEOUT: &str = "MARKET_DATA_HTTP_TIMEOUT_SECS";
pub const ENV_NEWS_PAGE_SIZE: &str = "NEWS_PAGE_SIZE";
pub const ENV_NEWS_TERMS: &str = "NEWS_TERMS_PER_TICKER";

/// Key, quota and cache lifetime for one provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderSettings {
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub rate_limit: u32,
    pub cache_ttl: Duration,
}

impl ProviderSettings {
    pub fn keyless() -> Self {
        Self {
            api_key: None,
            rate_limit: DEFAULT_LIMIT,
            cache_ttl: DEFAULT_TTL,
        }
    }

    pub fn with_key(key: impl Into<String>) -> Self {
        Self {
            api_key: Some(key.into()),
            ..Self::keyless()
        }
    }
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self::keyless()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketDataConfig {
    pub yahoo: ProviderSettings,
    pub polygon: ProviderSettings,
    pub newsapi: ProviderSettings,
    pub finnhub: ProviderSettings,
    pub fred: ProviderSettings,
    pub http_timeout: Duration,
    /// Articles requested per news search.
    pub news_page_size: u32,
    /// Company search terms used per ticker by free-text news search.
    pub news_terms_per_ticker: usize,
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            yahoo: ProviderSettings::keyless(),
            polygon: ProviderSettings::keyless(),
            newsapi: ProviderSettings::keyless(),
            finnhub: ProviderSettings::keyless(),
            fred: ProviderSettings::keyless(),
            http_timeout: DEFAULT_TIMEOUT,
            news_page_size: 6,
            news_terms_per_ticker: 2,
        }
    }
}

impl MarketDataConfig {
    /// Read settings from the process environment (after `.env` is loaded).
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Build settings from any key lookup; unparsable numbers fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Self::default();
        let ttl = parse_num::<u64>(&lookup, ENV_CACHE_DURATION)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TTL);

        let settings = |key_var: Option<&str>, limit_var: &str| ProviderSettings {
            api_key: key_var.and_then(|k| non_empty(lookup(k))),
            rate_limit: parse_num::<u32>(&lookup, limit_var)
                .filter(|n| *n > 0)
                .unwrap_or(DEFAULT_LIMIT),
            cache_ttl: ttl,
        };

        Self {
            yahoo: settings(None, "YFINANCE_RATE_LIMIT"),
            polygon: settings(Some("POLYGON_API_KEY"), "POLYGON_RATE_LIMIT"),
            newsapi: settings(Some("NEWSAPI_US_KEY"), "NEWSAPI_RATE_LIMIT"),
            finnhub: settings(Some("FINNHUB_API_KEY"), "FINNHUB_RATE_LIMIT"),
            fred: settings(Some("FRED_API_KEY"), "FRED_RATE_LIMIT"),
            http_timeout: parse_num::<u64>(&lookup, ENV_HTTP_TIMEOUT)
                .filter(|n| *n > 0)
                .map(Duration::from_secs)
                .unwrap_or(d.http_timeout),
            news_page_size: parse_num::<u32>(&lookup, ENV_NEWS_PAGE_SIZE)
                .filter(|n| (1..=100).contains(n))
                .unwrap_or(d.news_page_size),
            news_terms_per_ticker: parse_num::<usize>(&lookup, ENV_NEWS_TERMS)
                .filter(|n| *n > 0)
                .unwrap_or(d.news_terms_per_ticker),
        }
    }
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn parse_num<N: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<N> {
    lookup(key).and_then(|v| v.trim().parse::<N>().ok())
}
