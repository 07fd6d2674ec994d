// tests/aggregator.rs
//
// End-to-end aggregation over in-memory providers: partial failure, price
// fallback, news dedup/relevance/sentiment, weekend windowing, fan-out,
// headlines, indices and indicator groups.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use market_data_aggregator::aggregate::Aggregator;
use market_data_aggregator::clock::ManualClock;
use market_data_aggregator::config::ReferenceTables;
use market_data_aggregator::ingest::types::{
    Capability, DataProvider, DataRequest, Payload, ProviderError, ProviderResult,
};
use market_data_aggregator::model::{
    EconomicIndicator, IndicatorGroup, NewsArticle, PriceInfo, Sentiment, Symbol, TechnicalInfo,
};

/// Provider answering from a fixed table keyed by request; anything not in
/// the table (or everything, when `fail_with` is set) errors.
struct MockProvider {
    name: &'static str,
    answers: HashMap<String, Payload>,
    fail_with: Option<ProviderError>,
    delay: Duration,
    seen: Mutex<Vec<DataRequest>>,
}

impl MockProvider {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            answers: HashMap::new(),
            fail_with: None,
            delay: Duration::ZERO,
            seen: Mutex::new(Vec::new()),
        }
    }

    fn failing(name: &'static str, e: ProviderError) -> Self {
        Self {
            fail_with: Some(e),
            ..Self::new(name)
        }
    }

    fn answer(mut self, key: &str, p: Payload) -> Self {
        self.answers.insert(key.to_string(), p);
        self
    }

    fn delayed(mut self, d: Duration) -> Self {
        self.delay = d;
        self
    }

    fn seen(&self) -> Vec<DataRequest> {
        self.seen.lock().unwrap().clone()
    }
}

fn request_key(r: &DataRequest) -> String {
    match r {
        DataRequest::Quote { symbol, .. } => format!("quote:{symbol}"),
        DataRequest::News(q) => format!("news:{}", q.symbol),
        DataRequest::Headlines { category, .. } => format!("headlines:{category}"),
        DataRequest::Indicator { series_id, .. } => format!("indicator:{series_id}"),
        DataRequest::IndicatorGroup(g) => format!("group:{}", g.as_str()),
        DataRequest::MarketIndices => "indices".to_string(),
        DataRequest::Technical { symbol } => format!("technical:{symbol}"),
    }
}

#[async_trait]
impl DataProvider for MockProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    fn capabilities(&self) -> &'static [Capability] {
        &[Capability::Price, Capability::News]
    }

    async fn fetch(&self, request: &DataRequest) -> ProviderResult<Payload> {
        self.seen.lock().unwrap().push(request.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(e) = &self.fail_with {
            return Err(e.clone());
        }
        self.answers
            .get(&request_key(request))
            .cloned()
            .ok_or_else(|| ProviderError::NoData(request_key(request)))
    }
}

fn quote(price: f64, change: f64, source: &str) -> Payload {
    Payload::Quote(PriceInfo {
        price,
        change,
        change_percent: 0.0,
        volume: None,
        source: source.into(),
    })
}

fn article(ticker: &str, title: &str, url: &str, provider: &str, s: Sentiment) -> NewsArticle {
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

fn indicator(id: &str, value: f64) -> Payload {
    Payload::Indicator(EconomicIndicator {
        series_id: id.into(),
        title: id.into(),
        value,
        previous_value: None,
        change: 0.0,
        change_percent: 0.0,
        date: None,
    })
}

fn clock_at(y: i32, m: u32, d: u32) -> Arc<ManualClock> {
    Arc::new(ManualClock::new(Utc.with_ymd_and_hms(y, m, d, 14, 0, 0).unwrap()))
}

#[tokio::test]
async fn two_of_five_failing_providers_leave_the_rest_intact() {
    let aapl = Symbol::new("AAPL");
    let primary = MockProvider::new("yahoo")
        .answer("quote:AAPL", quote(190.0, 2.0, "yahoo"))
        .answer("quote:XLK", quote(210.0, 10.0, "yahoo"));
    let secondary = MockProvider::failing("polygon", ProviderError::NotConfigured("Polygon"));
    let news = MockProvider::new("newsapi").answer(
        "news:AAPL",
        Payload::Articles(vec![article(
            "AAPL",
            "Apple shares rally",
            "https://n/1",
            "newsapi",
            Sentiment::Positive,
        )]),
    );
    let economic = MockProvider::failing("fred", ProviderError::Timeout);
    let technical = MockProvider::new("technical_indicators").answer(
        "technical:AAPL",
        Payload::Technical(TechnicalInfo {
            observations: 250,
            rsi: Some(55.0),
            ..TechnicalInfo::default()
        }),
    );

    let agg = Aggregator::builder()
        .primary_price(Arc::new(primary))
        .secondary_price(Arc::new(secondary))
        .news(Arc::new(news))
        .economic(Arc::new(economic))
        .technical(Arc::new(technical))
        .clock(clock_at(2024, 5, 8))
        .build(ReferenceTables::default_seed());

    let snap = agg.fetch(&[aapl.clone()]).await;

    assert_eq!(
        snap.available_sources,
        vec!["yahoo", "newsapi", "technical_indicators"]
    );
    assert_eq!(snap.error_sources, vec!["polygon", "fred"]);
    assert_eq!(snap.source_errors["fred"], "timeout");
    assert_eq!(snap.price_data[&aapl].price, 190.0);
    assert_eq!(snap.ticker_news[&aapl].len(), 1);
    assert_eq!(snap.technical_data[&aapl].rsi, Some(55.0));
    assert!(snap.economic_indicators.is_empty());
    assert_eq!(snap.sector_performance["Technology"], 5.0);
    assert_eq!(snap.sector_performance.len(), 11);
}

#[tokio::test]
async fn zero_primary_price_uses_secondary() {
    let aapl = Symbol::new("AAPL");
    let agg = Aggregator::builder()
        .primary_price(Arc::new(
            MockProvider::new("yahoo").answer("quote:AAPL", quote(0.0, 0.0, "yahoo")),
        ))
        .secondary_price(Arc::new(
            MockProvider::new("polygon").answer("quote:AAPL", quote(123.45, 3.45, "polygon")),
        ))
        .clock(clock_at(2024, 5, 8))
        .build(ReferenceTables::default_seed());

    let snap = agg.fetch(&[aapl.clone()]).await;
    assert_eq!(snap.price_data[&aapl].price, 123.45);
    assert_eq!(snap.price_data[&aapl].source, "polygon");
}

#[tokio::test]
async fn symbol_missing_everywhere_is_absent_not_error() {
    let agg = Aggregator::builder()
        .primary_price(Arc::new(
            MockProvider::new("yahoo").answer("quote:AAPL", quote(190.0, 1.0, "yahoo")),
        ))
        .clock(clock_at(2024, 5, 8))
        .build(ReferenceTables::default_seed());

    let snap = agg.fetch(&[Symbol::new("AAPL"), Symbol::new("ZZZZ")]).await;
    assert!(snap.price_data.contains_key(&Symbol::new("AAPL")));
    assert!(!snap.price_data.contains_key(&Symbol::new("ZZZZ")));
    assert_eq!(snap.available_sources, vec!["yahoo"]);
}

#[tokio::test]
async fn news_across_providers_is_deduped_filtered_and_combined() {
    let aapl = Symbol::new("AAPL");
    let msft = Symbol::new("MSFT");
    let newsapi = MockProvider::new("newsapi")
        .answer(
            "news:AAPL",
            Payload::Articles(vec![
                article(
                    "AAPL",
                    "Apple beats estimates",
                    "https://n/a1",
                    "newsapi",
                    Sentiment::Positive,
                ),
                article(
                    "AAPL",
                    "Apple gains ground",
                    "https://n/a2",
                    "newsapi",
                    Sentiment::Positive,
                ),
                article(
                    "AAPL",
                    "Apple faces probe",
                    "https://n/a3",
                    "newsapi",
                    Sentiment::Negative,
                ),
            ]),
        )
        .answer(
            "news:MSFT",
            Payload::Articles(vec![
                // fetched for MSFT but only talks about Apple: never re-attributed
                article(
                    "MSFT",
                    "Apple supplier update",
                    "https://n/m1",
                    "newsapi",
                    Sentiment::Positive,
                ),
            ]),
        );
    let finnhub = MockProvider::new("finnhub")
        .answer(
            "news:AAPL",
            Payload::Articles(vec![
                article(
                    "AAPL",
                    "Apple beats estimates",
                    "https://n/a1",
                    "finnhub",
                    Sentiment::Positive,
                ),
                article("AAPL", "Apple event recap", "https://n/a4", "finnhub", Sentiment::Neutral),
            ]),
        )
        .answer(
            "news:MSFT",
            Payload::Articles(vec![
                article(
                    "MSFT",
                    "Microsoft cloud slows",
                    "https://n/m2",
                    "finnhub",
                    Sentiment::Negative,
                ),
                article(
                    "MSFT",
                    "Weekly market wrap",
                    "https://n/m3",
                    "finnhub",
                    Sentiment::Neutral,
                ),
            ]),
        );

    let agg = Aggregator::builder()
        .news(Arc::new(newsapi))
        .news(Arc::new(finnhub))
        .clock(clock_at(2024, 5, 8))
        .build(ReferenceTables::default_seed());

    let snap = agg.fetch(&[aapl.clone(), msft.clone()]).await;

    let aapl_titles: Vec<&str> = snap.ticker_news[&aapl].iter().map(|a| a.title.as_str()).collect();
    assert_eq!(
        aapl_titles,
        vec![
            "Apple beats estimates",
            "Apple gains ground",
            "Apple faces probe",
            "Apple event recap"
        ]
    );
    let msft_titles: Vec<&str> = snap.ticker_news[&msft].iter().map(|a| a.title.as_str()).collect();
    assert_eq!(msft_titles, vec!["Microsoft cloud slows"]);

    // newsapi {3 pos, 1 neg, 0 neu} + finnhub {1 pos, 1 neg, 2 neu}
    let s = &snap.news_sentiment;
    assert_eq!((s.counts.positive, s.counts.negative, s.counts.neutral), (4, 2, 2));
    assert_eq!(s.positive_pct, 50.0);
    assert_eq!(s.negative_pct, 25.0);
    assert_eq!(s.neutral_pct, 25.0);
    assert_eq!(s.overall, Sentiment::Positive);
}

#[tokio::test]
async fn saturday_queries_use_window_ending_friday() {
    let news = Arc::new(MockProvider::new("newsapi"));
    let agg = Aggregator::builder()
        .news(news.clone())
        // Saturday 11 May 2024
        .clock(clock_at(2024, 5, 11))
        .build(ReferenceTables::default_seed());

    let snap = agg.fetch(&[Symbol::new("AAPL")]).await;
    assert!(snap.date_window.weekend);
    assert_eq!(snap.date_window.to.to_string(), "2024-05-10");
    assert_eq!(snap.date_window.from.to_string(), "2024-05-03");

    let seen = news.seen();
    assert_eq!(seen.len(), 1);
    match &seen[0] {
        DataRequest::News(q) => {
            assert_eq!(q.window, snap.date_window);
            assert_eq!(q.terms[0], "Apple");
        }
        other => panic!("unexpected request {other:?}"),
    }
    // nothing answered: provider is an error source, snapshot still returned
    assert_eq!(snap.error_sources, vec!["newsapi"]);
    assert_eq!(snap.news_sentiment.overall, Sentiment::Neutral);
}

#[tokio::test]
async fn economic_series_are_keyed_by_id() {
    let fred = MockProvider::new("fred")
        .answer("indicator:UNRATE", indicator("UNRATE", 3.9))
        .answer("indicator:GDP", indicator("GDP", 28000.0));
    let agg = Aggregator::builder()
        .economic(Arc::new(fred))
        .clock(clock_at(2024, 5, 8))
        .build(ReferenceTables::default_seed());

    let snap = agg.fetch(&[Symbol::new("AAPL")]).await;
    assert_eq!(snap.economic_indicators.len(), 2);
    assert_eq!(snap.economic_indicators["UNRATE"].value, 3.9);
    assert_eq!(snap.available_sources, vec!["fred"]);
}

#[tokio::test(start_paused = true)]
async fn providers_run_concurrently() {
    let slow = |name: &'static str| {
        Arc::new(
            MockProvider::new(name)
                .answer("quote:AAPL", quote(1.0, 0.0, name))
                .delayed(Duration::from_secs(5)),
        )
    };
    let agg = Aggregator::builder()
        .secondary_price(slow("polygon"))
        .news(slow("newsapi"))
        .news(slow("finnhub"))
        .clock(clock_at(2024, 5, 8))
        .build(ReferenceTables::default_seed());

    let t0 = tokio::time::Instant::now();
    agg.fetch(&[Symbol::new("AAPL")]).await;
    // one request each, 5 s apiece: concurrent fan-out finishes in ~5 s
    assert!(t0.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn headlines_merge_news_providers() {
    let a = MockProvider::new("newsapi").answer(
        "headlines:business",
        Payload::Articles(vec![article(
            "AAPL",
            "Stocks open higher",
            "https://h/1",
            "newsapi",
            Sentiment::Positive,
        )]),
    );
    let b = MockProvider::new("finnhub").answer(
        "headlines:business",
        Payload::Articles(vec![
            article("AAPL", "Stocks open higher", "https://h/1", "finnhub", Sentiment::Positive),
            article("AAPL", "Oil slips", "https://h/2", "finnhub", Sentiment::Negative),
        ]),
    );
    let agg = Aggregator::builder()
        .news(Arc::new(a))
        .news(Arc::new(b))
        .build(ReferenceTables::default_seed());

    let v = agg.headlines("business", 10).await;
    assert_eq!(v.len(), 2);
    assert_eq!(agg.status().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn headlines_query_news_providers_concurrently() {
    let slow = |name: &'static str, url: &'static str| {
        Arc::new(
            MockProvider::new(name)
                .answer(
                    "headlines:general",
                    Payload::Articles(vec![article("AAPL", name, url, name, Sentiment::Neutral)]),
                )
                .delayed(Duration::from_secs(5)),
        )
    };
    let agg = Aggregator::builder()
        .news(slow("newsapi", "https://h/1"))
        .news(slow("finnhub", "https://h/2"))
        .build(ReferenceTables::default_seed());

    let t0 = tokio::time::Instant::now();
    let v = agg.headlines("general", 10).await;
    assert!(t0.elapsed() < Duration::from_secs(10));
    // provider order is kept
    let titles: Vec<&str> = v.iter().map(|a| a.title.as_str()).collect();
    assert_eq!(titles, vec!["newsapi", "finnhub"]);
}

#[tokio::test]
async fn indices_and_indicator_groups_use_role_providers() {
    let Payload::Quote(sp500) = quote(5200.0, 10.0, "yahoo") else {
        unreachable!()
    };
    let Payload::Indicator(unrate) = indicator("UNRATE", 3.9) else {
        unreachable!()
    };
    let indices = [("S&P 500".to_string(), sp500)].into_iter().collect();
    let labor = [("UNRATE".to_string(), unrate)].into_iter().collect();

    let primary = MockProvider::new("yahoo").answer("indices", Payload::Quotes(indices));
    let fred = MockProvider::new("fred").answer("group:labor_market", Payload::Indicators(labor));
    let agg = Aggregator::builder()
        .primary_price(Arc::new(primary))
        .economic(Arc::new(fred))
        .build(ReferenceTables::default_seed());

    assert_eq!(agg.market_indices().await.unwrap()["S&P 500"].price, 5200.0);
    let m = agg.indicator_group(IndicatorGroup::LaborMarket).await.unwrap();
    assert_eq!(m["UNRATE"].value, 3.9);
    assert!(matches!(
        agg.indicator_group(IndicatorGroup::Inflation).await,
        Err(ProviderError::NoData(_))
    ));

    let bare = Aggregator::builder().build(ReferenceTables::default_seed());
    assert!(bare.market_indices().await.is_err());
}

#[derive(Default)]
struct Sweepable {
    sweeps: std::sync::atomic::AtomicUsize,
}

#[async_trait]
impl DataProvider for Sweepable {
    fn name(&self) -> &'static str {
        "sweepable"
    }

    fn capabilities(&self) -> &'static [Capability] {
        &[Capability::Price]
    }

    async fn fetch(&self, _request: &DataRequest) -> ProviderResult<Payload> {
        Err(ProviderError::NoData("unused".into()))
    }

    fn sweep_caches(&self) -> usize {
        self.sweeps
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        1
    }
}

#[tokio::test(start_paused = true)]
async fn cache_sweeper_runs_on_its_interval() {
    let p = Arc::new(Sweepable::default());
    let agg = Arc::new(
        Aggregator::builder()
            .primary_price(p.clone())
            .build(ReferenceTables::default_seed()),
    );
    assert_eq!(agg.sweep_caches(), 1);

    let handle = market_data_aggregator::spawn_cache_sweeper(agg, Duration::from_secs(600));
    // ticks at 0 s, 600 s and 1200 s
    tokio::time::sleep(Duration::from_secs(1250)).await;
    handle.abort();
    assert_eq!(p.sweeps.load(std::sync::atomic::Ordering::SeqCst), 4);
}
