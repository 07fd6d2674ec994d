//! Normalized data model shared by providers, the structuring stage and the API.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Ticker symbol, e.g. `AAPL` or `XLK`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    /// Trimmed, upper-cased ticker.
    pub fn new(s: impl AsRef<str>) -> Self {
        Self(s.as_ref().trim().to_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Symbol::new(s)
    }
}

/// Parse a comma separated list like `"aapl, msft,,TSLA"`; empties dropped,
/// duplicates removed, order kept.
pub fn parse_symbols(raw: &str) -> Vec<Symbol> {
    let mut out: Vec<Symbol> = Vec::new();
    for part in raw.split(',') {
        if part.trim().is_empty() {
            continue;
        }
        let s = Symbol::new(part);
        if !out.contains(&s) {
            out.push(s);
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetClass {
    Equity,
    Forex,
    Crypto,
}

impl AssetClass {
    /// Case-insensitive `equity`, `forex` or `crypto`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "equity" | "stock" => Some(AssetClass::Equity),
            "forex" | "fx" => Some(AssetClass::Forex),
            "crypto" => Some(AssetClass::Crypto),
            _ => None,
        }
    }
}

/// Named bundles of related economic series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorGroup {
    Core,
    Inflation,
    InterestRates,
    LaborMarket,
    MarketIndicators,
}

impl IndicatorGroup {
    pub const ALL: [IndicatorGroup; 5] = [
        IndicatorGroup::Core,
        IndicatorGroup::Inflation,
        IndicatorGroup::InterestRates,
        IndicatorGroup::LaborMarket,
        IndicatorGroup::MarketIndicators,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            IndicatorGroup::Core => "core",
            IndicatorGroup::Inflation => "inflation",
            IndicatorGroup::InterestRates => "interest_rates",
            IndicatorGroup::LaborMarket => "labor_market",
            IndicatorGroup::MarketIndicators => "market_indicators",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|g| g.as_str() == s)
    }
}

/// Latest quote for one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceInfo {
    pub price: f64,
    /// Absolute move against the previous reference price.
    pub change: f64,
    pub change_percent: f64,
    #[serde(default)]
    pub volume: Option<f64>,
    pub source: String,
}

impl PriceInfo {
    pub fn is_usable(&self) -> bool {
        self.price.is_finite() && self.price > 0.0
    }
}

/// One daily OHLCV bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    #[default]
    Neutral,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsArticle {
    /// Provider-native id, empty when the provider has none.
    #[serde(default)]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub content: String,
    pub url: String,
    pub source: String,
    pub published_at: Option<DateTime<Utc>>,
    pub sentiment: Sentiment,
    /// Ticker the article was fetched for.
    pub related_ticker: Option<Symbol>,
    /// Search term that surfaced the article, if any.
    #[serde(default)]
    pub search_term: Option<String>,
    pub provider: String,
}

impl NewsArticle {
    /// Text the relevance and sentiment stages look at.
    pub fn haystack(&self) -> String {
        format!("{} {} {}", self.title, self.summary, self.content)
    }
}

/// Positive/negative/neutral article counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentimentTally {
    pub positive: u32,
    pub negative: u32,
    pub neutral: u32,
}

impl SentimentTally {
    pub fn total(&self) -> u32 {
        self.positive + self.negative + self.neutral
    }

    pub fn record(&mut self, s: Sentiment) {
        match s {
            Sentiment::Positive => self.positive += 1,
            Sentiment::Negative => self.negative += 1,
            Sentiment::Neutral => self.neutral += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentSummary {
    pub positive_pct: f64,
    pub negative_pct: f64,
    pub neutral_pct: f64,
    pub overall: Sentiment,
    pub counts: SentimentTally,
}

impl Default for SentimentSummary {
    fn default() -> Self {
        Self {
            positive_pct: 0.0,
            negative_pct: 0.0,
            neutral_pct: 0.0,
            overall: Sentiment::Neutral,
            counts: SentimentTally::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EconomicIndicator {
    pub series_id: String,
    pub title: String,
    pub value: f64,
    pub previous_value: Option<f64>,
    pub change: f64,
    pub change_percent: f64,
    pub date: Option<NaiveDate>,
}

/// Technical indicators for one symbol. All fields are `None` when the
/// history was too short to compute anything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TechnicalInfo {
    pub observations: usize,
    pub rsi: Option<f64>,
    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
    pub macd_histogram: Option<f64>,
    pub sma_20: Option<f64>,
    pub sma_50: Option<f64>,
    pub sma_200: Option<f64>,
    pub ema_12: Option<f64>,
    pub ema_26: Option<f64>,
    pub bollinger_upper: Option<f64>,
    pub bollinger_middle: Option<f64>,
    pub bollinger_lower: Option<f64>,
    pub stochastic_k: Option<f64>,
    pub stochastic_d: Option<f64>,
    pub atr: Option<f64>,
    pub current_price: Option<f64>,
    /// Percent moves over roughly one, three and twelve months of trading days.
    pub price_change_1m: Option<f64>,
    pub price_change_3m: Option<f64>,
    pub price_change_1y: Option<f64>,
    /// Annualized volatility of daily returns, in percent.
    pub volatility: Option<f64>,
}

impl TechnicalInfo {
    pub fn is_empty(&self) -> bool {
        self.rsi.is_none()
            && self.macd.is_none()
            && self.sma_20.is_none()
            && self.ema_12.is_none()
            && self.bollinger_middle.is_none()
            && self.stochastic_k.is_none()
            && self.atr.is_none()
    }
}

/// Inclusive date range used by date-bounded providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub weekend: bool,
}

impl DateWindow {
    pub fn from_param(&self) -> String {
        self.from.format("%Y-%m-%d").to_string()
    }

    pub fn to_param(&self) -> String {
        self.to.format("%Y-%m-%d").to_string()
    }
}

/// Consolidated result of one aggregation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub price_data: BTreeMap<Symbol, PriceInfo>,
    pub ticker_news: BTreeMap<Symbol, Vec<NewsArticle>>,
    pub news_sentiment: SentimentSummary,
    pub economic_indicators: BTreeMap<String, EconomicIndicator>,
    pub technical_data: BTreeMap<Symbol, TechnicalInfo>,
    pub sector_performance: BTreeMap<String, f64>,
    pub available_sources: Vec<String>,
    pub error_sources: Vec<String>,
    /// Failure reason per provider listed in `error_sources`.
    pub source_errors: BTreeMap<String, String>,
    pub portfolio: PortfolioSummary,
    pub date_window: DateWindow,
    pub generated_at: DateTime<Utc>,
}

/// Priced symbols of a snapshot and the sum of their prices.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSummary {
    pub total_symbols: usize,
    pub symbols: Vec<Symbol>,
    pub total_value: f64,
}

impl PortfolioSummary {
    pub fn from_prices(prices: &BTreeMap<Symbol, PriceInfo>) -> Self {
        Self {
            total_symbols: prices.len(),
            symbols: prices.keys().cloned().collect(),
            total_value: prices.values().map(|p| p.price).sum(),
        }
    }
}

impl MarketSnapshot {
    /// Rough count of data points, handy for logging.
    pub fn data_points(&self) -> usize {
        self.price_data.len()
            + self.ticker_news.values().map(Vec::len).sum::<usize>()
            + self.economic_indicators.len()
            + self.technical_data.len()
            + self.sector_performance.len()
    }
}
