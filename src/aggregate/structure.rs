//! Raw per-provider results and their pure transform into a
//! [`MarketSnapshot`].

use chrono::{DateTime, Utc};
use metrics::counter;
use std::collections::BTreeMap;

use crate::config::ReferenceTables;
use crate::ingest::dedup_articles;
use crate::ingest::types::ProviderError;
use crate::model::{
    DateWindow, EconomicIndicator, MarketSnapshot, NewsArticle, PortfolioSummary, PriceInfo,
    SentimentTally, Symbol, TechnicalInfo,
};
use crate::relevance::RelevanceFilter;
use crate::{sector, sentiment};

/// What a provider was asked to do in one aggregation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Role {
    PrimaryPrice,
    SecondaryPrice,
    News,
    Economic,
    Technical,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProviderData {
    Prices(BTreeMap<Symbol, PriceInfo>),
    News(Vec<NewsArticle>),
    Indicators(BTreeMap<String, EconomicIndicator>),
    Technical(BTreeMap<Symbol, TechnicalInfo>),
}

/// One provider's contribution, success or failure.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderOutcome {
    pub provider: String,
    pub role: Role,
    pub result: Result<ProviderData, ProviderError>,
}

impl ProviderOutcome {
    pub fn ok(provider: impl Into<String>, role: Role, data: ProviderData) -> Self {
        Self {
            provider: provider.into(),
            role,
            result: Ok(data),
        }
    }

    pub fn err(provider: impl Into<String>, role: Role, e: ProviderError) -> Self {
        Self {
            provider: provider.into(),
            role,
            result: Err(e),
        }
    }
}

/// Inputs of the structuring stage besides the raw results.
#[derive(Debug, Clone)]
pub struct StructureInput<'a> {
    pub symbols: &'a [Symbol],
    pub tables: &'a ReferenceTables,
    pub window: DateWindow,
    pub generated_at: DateTime<Utc>,
}

fn prices_for(outcomes: &[ProviderOutcome], role: Role) -> Option<&BTreeMap<Symbol, PriceInfo>> {
    outcomes.iter().find_map(|o| match (&o.result, o.role == role) {
        (Ok(ProviderData::Prices(m)), true) => Some(m),
        _ => None,
    })
}

/// Primary quote when usable, else the secondary one. Never averaged.
fn merged_quote(
    symbol: &Symbol,
    primary: Option<&BTreeMap<Symbol, PriceInfo>>,
    secondary: Option<&BTreeMap<Symbol, PriceInfo>>,
) -> Option<PriceInfo> {
    [primary, secondary]
        .into_iter()
        .flatten()
        .filter_map(|m| m.get(symbol))
        .find(|q| q.is_usable())
        .cloned()
}

/// Build the snapshot. Pure apart from metrics counters.
pub fn structure(outcomes: Vec<ProviderOutcome>, input: StructureInput<'_>) -> MarketSnapshot {
    let primary = prices_for(&outcomes, Role::PrimaryPrice);
    let secondary = prices_for(&outcomes, Role::SecondaryPrice);

    let price_data: BTreeMap<Symbol, PriceInfo> = input
        .symbols
        .iter()
        .filter_map(|s| merged_quote(s, primary, secondary).map(|q| (s.clone(), q)))
        .collect();

    let etf_quotes: BTreeMap<Symbol, PriceInfo> = input
        .tables
        .sector_etfs()
        .into_iter()
        .filter_map(|etf| merged_quote(&etf, primary, secondary).map(|q| (etf, q)))
        .collect();
    let sector_performance = sector::sector_performance(&input.tables.sectors, &etf_quotes);

    // Each provider's articles are deduplicated and tallied on their own
    // before the cross-provider pass.
    let mut tallies: Vec<SentimentTally> = Vec::new();
    let mut pooled: Vec<NewsArticle> = Vec::new();
    let mut duplicates = 0usize;
    for o in &outcomes {
        if let Ok(ProviderData::News(articles)) = &o.result {
            let (kept, removed) = dedup_articles(articles.clone());
            duplicates += removed;
            tallies.push(sentiment::tally(&kept));
            pooled.extend(kept);
        }
    }
    let (pooled, removed) = dedup_articles(pooled);
    duplicates += removed;

    let filter = RelevanceFilter::for_symbols(input.tables, input.symbols);
    let mut ticker_news: BTreeMap<Symbol, Vec<NewsArticle>> = BTreeMap::new();
    let mut irrelevant = 0usize;
    for a in pooled {
        match filter.attribute(&a) {
            Some(t) => ticker_news.entry(t).or_default().push(a),
            None => irrelevant += 1,
        }
    }
    counter!("news_dedup_total").increment(duplicates as u64);
    counter!("news_irrelevant_total").increment(irrelevant as u64);
    tracing::debug!(target: "aggregate", duplicates, irrelevant, "news structured");

    let mut economic_indicators = BTreeMap::new();
    let mut technical_data = BTreeMap::new();
    let mut available_sources = Vec::new();
    let mut error_sources = Vec::new();
    let mut source_errors = BTreeMap::new();
    for o in outcomes {
        match o.result {
            Ok(data) => {
                match data {
                    ProviderData::Indicators(m) => economic_indicators.extend(m),
                    ProviderData::Technical(m) => technical_data.extend(m),
                    ProviderData::Prices(_) | ProviderData::News(_) => {}
                }
                if !available_sources.contains(&o.provider) {
                    available_sources.push(o.provider);
                }
            }
            Err(e) => {
                source_errors.insert(o.provider.clone(), e.to_string());
                if !error_sources.contains(&o.provider) {
                    error_sources.push(o.provider);
                }
            }
        }
    }

    MarketSnapshot {
        portfolio: PortfolioSummary::from_prices(&price_data),
        price_data,
        ticker_news,
        news_sentiment: sentiment::combine(&tallies),
        economic_indicators,
        technical_data,
        sector_performance,
        available_sources,
        error_sources,
        source_errors,
        date_window: input.window,
        generated_at: input.generated_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::window::date_window;
    use crate::model::Sentiment;
    use chrono::TimeZone;

    fn quote(price: f64, change: f64, source: &str) -> PriceInfo {
        PriceInfo {
            price,
            change,
            change_percent: 0.0,
            volume: None,
            source: source.into(),
        }
    }

    fn art(ticker: &str, title: &str, url: &str, provider: &str, s: Sentiment) -> NewsArticle {
        NewsArticle {
            id: String::new(),
            title: title.into(),
            summary: String::new(),
            content: String::new(),
            url: url.into(),
            source: "Wire".into(),
            published_at: None,
            sentiment: s,
            related_ticker: Some(Symbol::new(ticker)),
            search_term: None,
            provider: provider.into(),
        }
    }

    fn run(outcomes: Vec<ProviderOutcome>, symbols: &[Symbol]) -> MarketSnapshot {
        let tables = ReferenceTables::default_seed();
        let now = Utc.with_ymd_and_hms(2024, 5, 8, 12, 0, 0).unwrap();
        structure(
            outcomes,
            StructureInput {
                symbols,
                tables: &tables,
                window: date_window(now),
                generated_at: now,
            },
        )
    }

    #[test]
    fn zero_primary_price_falls_back_to_secondary() {
        let sym = Symbol::new("AAPL");
        let mut p = BTreeMap::new();
        p.insert(sym.clone(), quote(0.0, 0.0, "yahoo"));
        let mut s = BTreeMap::new();
        s.insert(sym.clone(), quote(123.45, 1.0, "polygon"));
        let snap = run(
            vec![
                ProviderOutcome::ok("yahoo", Role::PrimaryPrice, ProviderData::Prices(p)),
                ProviderOutcome::ok("polygon", Role::SecondaryPrice, ProviderData::Prices(s)),
            ],
            &[sym.clone()],
        );
        assert_eq!(snap.price_data[&sym].price, 123.45);
        assert_eq!(snap.price_data[&sym].source, "polygon");
        assert_eq!(snap.portfolio.symbols, vec![sym.clone()]);
        assert_eq!(snap.portfolio.total_value, 123.45);
    }

    #[test]
    fn sectors_always_reported() {
        let mut p = BTreeMap::new();
        p.insert(Symbol::new("XLK"), quote(202.0, 2.0, "yahoo"));
        let snap = run(
            vec![ProviderOutcome::ok("yahoo", Role::PrimaryPrice, ProviderData::Prices(p))],
            &[],
        );
        assert_eq!(snap.sector_performance.len(), 11);
        assert_eq!(snap.sector_performance["Technology"], 1.0);
        assert_eq!(snap.sector_performance["Energy"], 0.0);
        assert!(snap.price_data.is_empty());
        // sector proxies are not part of the portfolio
        assert_eq!(snap.portfolio.total_symbols, 0);
    }

    #[test]
    fn news_is_deduped_attributed_and_tallied() {
        let aapl = Symbol::new("AAPL");
        let msft = Symbol::new("MSFT");
        let newsapi = vec![
            art("AAPL", "Apple unveils new iPhone", "https://a/1", "newsapi", Sentiment::Positive),
            art("AAPL", "Apple unveils new iPhone", "https://a/1", "newsapi", Sentiment::Positive),
            art("AAPL", "Markets wobble", "https://a/2", "newsapi", Sentiment::Negative),
        ];
        let finnhub = vec![
            art("AAPL", "Apple unveils new iPhone", "https://a/1", "finnhub", Sentiment::Positive),
            art("MSFT", "Microsoft Azure outage", "https://m/1", "finnhub", Sentiment::Neutral),
        ];
        let snap = run(
            vec![
                ProviderOutcome::ok("newsapi", Role::News, ProviderData::News(newsapi)),
                ProviderOutcome::ok("finnhub", Role::News, ProviderData::News(finnhub)),
            ],
            &[aapl.clone(), msft.clone()],
        );
        assert_eq!(snap.ticker_news[&aapl].len(), 1);
        assert_eq!(snap.ticker_news[&aapl][0].provider, "newsapi");
        assert_eq!(snap.ticker_news[&msft].len(), 1);
        // newsapi {1,1,0} + finnhub {1,0,1}
        assert_eq!(snap.news_sentiment.counts.positive, 2);
        assert_eq!(snap.news_sentiment.counts.total(), 4);
        assert_eq!(snap.news_sentiment.overall, Sentiment::Positive);
    }

    #[test]
    fn bookkeeping_lists_every_provider_once() {
        let snap = run(
            vec![
                ProviderOutcome::ok(
                    "yahoo",
                    Role::PrimaryPrice,
                    ProviderData::Prices(BTreeMap::new()),
                ),
                ProviderOutcome::err("fred", Role::Economic, ProviderError::NotConfigured("FRED")),
                ProviderOutcome::err("polygon", Role::SecondaryPrice, ProviderError::Timeout),
            ],
            &[Symbol::new("AAPL")],
        );
        assert_eq!(snap.available_sources, vec!["yahoo".to_string()]);
        assert_eq!(snap.error_sources, vec!["fred".to_string(), "polygon".to_string()]);
        assert_eq!(snap.source_errors["polygon"], "timeout");
        assert_eq!(snap.source_errors["fred"], "FRED API key not configured");
    }
}
