//! FRED series observations. Each indicator is the latest observation
//! compared with the one before it.

use async_trait::async_trait;
use chrono::{Months, NaiveDate};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::cache::TtlCache;
use crate::clock::SharedClock;
use crate::config::ProviderSettings;
use crate::ingest::http::{HttpRequest, Transport};
use crate::ingest::provider_core::{parse_json, round_to, ProviderCore};
use crate::ingest::types::{
    Capability, DataProvider, DataRequest, Payload, ProviderError, ProviderResult, ProviderStatus,
};
use crate::model::{EconomicIndicator, IndicatorGroup};

const BASE_URL: &str = "https://api.stlouisfed.org/fred";

/// `(series_id, title)` pairs in `group`.
pub fn group_series(group: IndicatorGroup) -> &'static [(&'static str, &'static str)] {
    match group {
        IndicatorGroup::Core => &[
            ("UNRATE", "Unemployment Rate"),
            ("CPIAUCSL", "Consumer Price Index"),
            ("CPILFESL", "Core CPI"),
            ("GDP", "Gross Domestic Product"),
            ("FEDFUNDS", "Federal Funds Rate"),
            ("GS10", "10-Year Treasury Rate"),
            ("PCEPI", "PCE Price Index"),
            ("PCEPILFE", "Core PCE Price Index"),
        ],
        IndicatorGroup::Inflation => &[
            ("CPIAUCSL", "CPI All Items"),
            ("CPILFESL", "Core CPI"),
            ("PCEPI", "PCE Price Index"),
            ("PCEPILFE", "Core PCE Price Index"),
        ],
        IndicatorGroup::InterestRates => &[
            ("FEDFUNDS", "Federal Funds Rate"),
            ("GS3M", "3-Month Treasury"),
            ("GS2", "2-Year Treasury"),
            ("GS5", "5-Year Treasury"),
            ("GS10", "10-Year Treasury"),
            ("GS30", "30-Year Treasury"),
            ("PRIME", "Prime Rate"),
        ],
        IndicatorGroup::LaborMarket => &[
            ("UNRATE", "Unemployment Rate"),
            ("CIVPART", "Labor Force Participation"),
            ("EMRATIO", "Employment-Population Ratio"),
            ("AHETPI", "Average Hourly Earnings"),
            ("JTSJOL", "Job Openings"),
        ],
        IndicatorGroup::MarketIndicators => &[
            ("UMCSENT", "Consumer Sentiment"),
            ("HOUST", "Housing Starts"),
            ("RSAFS", "Retail Sales"),
            ("INDPRO", "Industrial Production"),
        ],
    }
}

pub struct FredProvider {
    core: ProviderCore,
    series: TtlCache<EconomicIndicator>,
    base_url: String,
}

impl FredProvider {
    pub const NAME: &'static str = "fred";

    pub fn new(
        settings: ProviderSettings,
        transport: Arc<dyn Transport>,
        clock: SharedClock,
    ) -> Self {
        let ttl = settings.cache_ttl;
        Self {
            core: ProviderCore::new(Self::NAME, "FRED", settings, true, transport, clock.clone()),
            series: TtlCache::new(ttl, clock),
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

    /// Latest observation of one series over the past year.
    pub async fn indicator(
        &self,
        series_id: &str,
        title: &str,
    ) -> ProviderResult<EconomicIndicator> {
        let api_key = self.core.api_key()?;
        let today = self.core.clock().now().date_naive();
        let start = today.checked_sub_months(Months::new(12)).unwrap_or(today);
        let key = self.core.cache_key("series", &[series_id]);
        // GDP is only published quarterly.
        let frequency = if series_id == "GDP" { "q" } else { "m" };
        let req = HttpRequest::get(format!("{}/series/observations", self.base_url))
            .param("series_id", series_id)
            .param("api_key", api_key)
            .param("file_type", "json")
            .param("observation_start", start.format("%Y-%m-%d").to_string())
            .param("observation_end", today.format("%Y-%m-%d").to_string())
            .param("units", "lin")
            .param("frequency", frequency)
            .param("sort_order", "desc");
        self.core
            .cached_get(&self.series, &key, req, |body| {
                parse_observations(body, series_id, title)
            })
            .await
    }

    /// Every series in `group`, keyed by series id. Series that fail are
    /// logged and left out; the group fails only when nothing came back.
    pub async fn group(
        &self,
        group: IndicatorGroup,
    ) -> ProviderResult<BTreeMap<String, EconomicIndicator>> {
        let mut out = BTreeMap::new();
        let mut first_err = None;
        for (id, title) in group_series(group) {
            match self.indicator(id, title).await {
                Ok(ind) => {
                    out.insert(id.to_string(), ind);
                }
                Err(e) => {
                    tracing::warn!(
                        target: "ingest",
                        provider = Self::NAME,
                        series = *id,
                        error = %e,
                        "series failed"
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
}

#[async_trait]
impl DataProvider for FredProvider {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn capabilities(&self) -> &'static [Capability] {
        &[Capability::EconomicIndicator]
    }

    async fn fetch(&self, request: &DataRequest) -> ProviderResult<Payload> {
        match request {
            DataRequest::Indicator { series_id, title } => self
                .indicator(series_id, title)
                .await
                .map(Payload::Indicator),
            DataRequest::IndicatorGroup(group) => self.group(*group).await.map(Payload::Indicators),
            other => Err(ProviderError::Unsupported {
                provider: Self::NAME,
                request: other.label(),
            }),
        }
    }

    fn status(&self) -> ProviderStatus {
        self.core.status(self.series.len())
    }

    fn sweep_caches(&self) -> usize {
        self.series.sweep_expired()
    }
}

#[derive(Debug, Deserialize)]
struct ObservationsResponse {
    #[serde(default)]
    observations: Vec<Observation>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Observation {
    date: String,
    value: String,
}

/// Observations arrive newest first. FRED marks missing values with ".".
fn parse_observations(
    body: &str,
    series_id: &str,
    title: &str,
) -> ProviderResult<EconomicIndicator> {
    let resp: ObservationsResponse = parse_json(body)?;
    if let Some(msg) = resp.error_message {
        return Err(ProviderError::Network(msg));
    }
    let mut valid = resp.observations.iter().filter_map(|o| {
        let v = o.value.trim().parse::<f64>().ok()?;
        Some((o.date.as_str(), v))
    });
    let (date, value) = valid
        .next()
        .ok_or_else(|| ProviderError::NoData(format!("no observations for {series_id}")))?;
    let previous_value = valid.next().map(|(_, v)| v);

    let (change, change_percent) = match previous_value {
        Some(prev) if prev != 0.0 => {
            let change = value - prev;
            (round_to(change, 3), round_to(change / prev * 100.0, 2))
        }
        _ => (0.0, 0.0),
    };

    Ok(EconomicIndicator {
        series_id: series_id.to_string(),
        title: title.to_string(),
        value,
        previous_value,
        change,
        change_percent,
        date: NaiveDate::parse_from_str(date, "%Y-%m-%d").ok(),
    })
}
