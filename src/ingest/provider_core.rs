//! Shared request pipeline embedded by every network-backed provider:
//! configuration check, cache lookup, rate limit, bounded HTTP GET, parse,
//! cache store.

use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::cache::TtlCache;
use crate::clock::SharedClock;
use crate::config::ProviderSettings;
use crate::ingest::http::{HttpRequest, Transport, TransportError, DEFAULT_TIMEOUT};
use crate::ingest::types::{ProviderError, ProviderResult, ProviderStatus};
use crate::rate_limit::RateLimiter;

pub struct ProviderCore {
    name: &'static str,
    /// Human-facing vendor name used in "not configured" errors.
    vendor: &'static str,
    settings: ProviderSettings,
    requires_key: bool,
    limiter: RateLimiter,
    transport: Arc<dyn Transport>,
    clock: SharedClock,
    timeout: Duration,
    last_request: Mutex<Option<DateTime<Utc>>>,
}

impl ProviderCore {
    pub fn new(
        name: &'static str,
        vendor: &'static str,
        settings: ProviderSettings,
        requires_key: bool,
        transport: Arc<dyn Transport>,
        clock: SharedClock,
    ) -> Self {
        let limiter = RateLimiter::new(name, settings.rate_limit);
        Self {
            name,
            vendor,
            settings,
            requires_key,
            limiter,
            transport,
            clock,
            timeout: DEFAULT_TIMEOUT,
            last_request: Mutex::new(None),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    pub fn is_configured(&self) -> bool {
        !self.requires_key || self.settings.api_key.is_some()
    }

    /// API key, or `NotConfigured` when the provider needs one and has none.
    pub fn api_key(&self) -> ProviderResult<&str> {
        match self.settings.api_key.as_deref() {
            Some(k) => Ok(k),
            None if !self.requires_key => Ok(""),
            None => Err(ProviderError::NotConfigured(self.vendor)),
        }
    }

    /// Deterministic cache key: `provider:operation:param1:param2…`.
    pub fn cache_key(&self, operation: &str, params: &[&str]) -> String {
        let mut k = format!("{}:{}", self.name, operation);
        for p in params {
            k.push(':');
            k.push_str(p);
        }
        k
    }

    /// Serve `key` from `cache` or perform `request`, parse the body and cache
    /// the result. Cache hits consume no rate budget.
    pub async fn cached_get<T, F>(
        &self,
        cache: &TtlCache<T>,
        key: &str,
        request: HttpRequest,
        parse: F,
    ) -> ProviderResult<T>
    where
        T: Clone,
        F: FnOnce(&str) -> ProviderResult<T>,
    {
        if !self.is_configured() {
            return Err(ProviderError::NotConfigured(self.vendor));
        }
        if let Some(hit) = cache.get(key) {
            counter!("provider_cache_hits_total", "provider" => self.name).increment(1);
            tracing::debug!(target: "ingest", provider = self.name, key, "cache hit");
            return Ok(hit);
        }

        let body = self.get_text(&request).await?;
        let value = parse(&body)?;
        cache.set(key, value.clone(), Some(self.settings.cache_ttl));
        Ok(value)
    }

    /// Rate-limited GET bounded by the provider timeout. Non-2xx is a network error.
    pub async fn get_text(&self, request: &HttpRequest) -> ProviderResult<String> {
        self.limiter.acquire().await;
        self.mark_request();
        counter!("provider_requests_total", "provider" => self.name).increment(1);

        let started = Instant::now();
        let res = tokio::time::timeout(self.timeout, self.transport.get(request)).await;
        histogram!("provider_fetch_ms", "provider" => self.name)
            .record(started.elapsed().as_secs_f64() * 1000.0);

        let resp = match res {
            Err(_) | Ok(Err(TransportError::Timeout)) => return Err(ProviderError::Timeout),
            Ok(Err(TransportError::Failed(msg))) => return Err(ProviderError::Network(msg)),
            Ok(Ok(r)) => r,
        };
        if !resp.is_success() {
            return Err(ProviderError::Network(format!(
                "HTTP {} from {}",
                resp.status, self.vendor
            )));
        }
        Ok(resp.body)
    }

    pub fn status(&self, cache_entries: usize) -> ProviderStatus {
        ProviderStatus {
            name: self.name.to_string(),
            configured: self.is_configured(),
            cache_entries,
            requests_in_window: self.limiter.requests_in_window(),
            rate_limit: Some(self.limiter.limit()),
            last_request_at: *self.last_request.lock().unwrap_or_else(|p| p.into_inner()),
        }
    }

    fn mark_request(&self) {
        let now = self.clock.now();
        *self.last_request.lock().unwrap_or_else(|p| p.into_inner()) = Some(now);
    }
}

/// Parse a JSON body, mapping failures to `Parse`.
pub fn parse_json<T: serde::de::DeserializeOwned>(body: &str) -> ProviderResult<T> {
    serde_json::from_str(body).map_err(|e| ProviderError::Parse(e.to_string()))
}

/// Round to `places` decimal places.
pub fn round_to(x: f64, places: i32) -> f64 {
    let f = 10f64.powi(places);
    (x * f).round() / f
}
