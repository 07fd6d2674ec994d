//! Locally computed technical indicators. Price history comes from a
//! [`HistorySource`]; no network call or rate budget of its own.

use async_trait::async_trait;
use std::sync::Arc;

use crate::cache::TtlCache;
use crate::clock::SharedClock;
use crate::indicators;
use crate::ingest::types::{
    Capability, DataProvider, DataRequest, Payload, ProviderError, ProviderResult, ProviderStatus,
};
use crate::model::{PriceBar, Symbol, TechnicalInfo};

/// Anything that can hand out daily bars, oldest first.
#[async_trait]
pub trait HistorySource: Send + Sync {
    async fn daily_history(&self, symbol: &Symbol) -> ProviderResult<Vec<PriceBar>>;
}

pub struct TechnicalProvider {
    history: Arc<dyn HistorySource>,
    computed: TtlCache<TechnicalInfo>,
}

impl TechnicalProvider {
    pub const NAME: &'static str = "technical_indicators";

    pub fn new(
        history: Arc<dyn HistorySource>,
        ttl: std::time::Duration,
        clock: SharedClock,
    ) -> Self {
        Self {
            history,
            computed: TtlCache::new(ttl, clock),
        }
    }

    /// Indicators for one symbol. A short history yields an empty set, not
    /// an error; a missing history is `NoData`.
    pub async fn indicators(&self, symbol: &Symbol) -> ProviderResult<TechnicalInfo> {
        let key = format!("{}:indicators:{}", Self::NAME, symbol);
        if let Some(hit) = self.computed.get(&key) {
            return Ok(hit);
        }
        let bars = self.history.daily_history(symbol).await?;
        if bars.is_empty() {
            return Err(ProviderError::NoData(format!("no history for {symbol}")));
        }
        let info = indicators::compute(&bars);
        if info.is_empty() {
            tracing::debug!(
                target: "ingest",
                symbol = %symbol,
                bars = bars.len(),
                "history too short for indicators"
            );
        }
        self.computed.set(key, info.clone(), None);
        Ok(info)
    }
}

#[async_trait]
impl DataProvider for TechnicalProvider {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn capabilities(&self) -> &'static [Capability] {
        &[Capability::Technical]
    }

    async fn fetch(&self, request: &DataRequest) -> ProviderResult<Payload> {
        match request {
            DataRequest::Technical { symbol } => {
                self.indicators(symbol).await.map(Payload::Technical)
            }
            other => Err(ProviderError::Unsupported {
                provider: Self::NAME,
                request: other.label(),
            }),
        }
    }

    fn status(&self) -> ProviderStatus {
        ProviderStatus {
            name: Self::NAME.to_string(),
            configured: true,
            cache_entries: self.computed.len(),
            requests_in_window: None,
            rate_limit: None,
            last_request_at: None,
        }
    }

    fn sweep_caches(&self) -> usize {
        self.computed.sweep_expired()
    }
}
