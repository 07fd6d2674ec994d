//! Finnhub: company news per symbol in the date window and general market
//! news by category.

use async_trait::async_trait;
use chrono::DateTime;
use serde::Deserialize;
use std::sync::Arc;

use crate::cache::TtlCache;
use crate::clock::SharedClock;
use crate::config::ProviderSettings;
use crate::ingest::http::{HttpRequest, Transport};
use crate::ingest::normalize_text;
use crate::ingest::provider_core::{parse_json, ProviderCore};
use crate::ingest::types::{
    Capability, DataProvider, DataRequest, Payload, ProviderError, ProviderResult, ProviderStatus,
};
use crate::model::{DateWindow, NewsArticle, Symbol};
use crate::sentiment::SentimentClassifier;

const BASE_URL: &str = "https://finnhub.io/api/v1";

pub struct FinnhubProvider {
    core: ProviderCore,
    news: TtlCache<Vec<NewsArticle>>,
    classifier: SentimentClassifier,
    base_url: String,
}

impl FinnhubProvider {
    pub const NAME: &'static str = "finnhub";

    pub fn new(
        settings: ProviderSettings,
        transport: Arc<dyn Transport>,
        clock: SharedClock,
        classifier: SentimentClassifier,
    ) -> Self {
        let ttl = settings.cache_ttl;
        Self {
            core: ProviderCore::new(
                Self::NAME,
                "Finnhub",
                settings,
                true,
                transport,
                clock.clone(),
            ),
            news: TtlCache::new(ttl, clock),
            classifier,
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

    pub async fn company_news(
        &self,
        symbol: &Symbol,
        window: &DateWindow,
    ) -> ProviderResult<Vec<NewsArticle>> {
        let token = self.core.api_key()?;
        let (from, to) = (window.from_param(), window.to_param());
        let key = self.core.cache_key("company", &[symbol.as_str(), &from, &to]);
        let req = HttpRequest::get(format!("{}/company-news", self.base_url))
            .param("symbol", symbol.as_str())
            .param("from", from)
            .param("to", to)
            .param("token", token);
        let articles = self
            .core
            .cached_get(&self.news, &key, req, |body| self.parse_news(body))
            .await?;
        Ok(articles
            .into_iter()
            .map(|mut a| {
                a.related_ticker = Some(symbol.clone());
                a
            })
            .collect())
    }

    /// General market news (`general`, `forex`, `crypto`, `merger`).
    pub async fn latest_news(&self, category: &str) -> ProviderResult<Vec<NewsArticle>> {
        let token = self.core.api_key()?;
        let key = self.core.cache_key("news", &[category]);
        let req = HttpRequest::get(format!("{}/news", self.base_url))
            .param("category", category)
            .param("minId", "0")
            .param("token", token);
        self.core
            .cached_get(&self.news, &key, req, |body| self.parse_news(body))
            .await
    }

    fn parse_news(&self, body: &str) -> ProviderResult<Vec<NewsArticle>> {
        match parse_json::<NewsBody>(body)? {
            NewsBody::Error { error } => Err(ProviderError::Network(error)),
            NewsBody::List(items) => Ok(items
                .into_iter()
                .filter_map(|raw| self.to_article(raw))
                .collect()),
        }
    }

    fn to_article(&self, raw: RawNews) -> Option<NewsArticle> {
        let title = normalize_text(&raw.headline);
        if title.is_empty() || raw.url.is_empty() {
            return None;
        }
        let summary = normalize_text(&raw.summary);
        let sentiment = self.classifier.classify(&format!("{title} {summary}"));
        Some(NewsArticle {
            id: if raw.id == 0 { String::new() } else { raw.id.to_string() },
            title,
            summary,
            content: String::new(),
            url: raw.url,
            source: raw.source,
            published_at: (raw.datetime > 0)
                .then(|| DateTime::from_timestamp(raw.datetime, 0))
                .flatten(),
            sentiment,
            related_ticker: None,
            search_term: None,
            provider: Self::NAME.to_string(),
        })
    }
}

#[async_trait]
impl DataProvider for FinnhubProvider {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn capabilities(&self) -> &'static [Capability] {
        &[Capability::News]
    }

    async fn fetch(&self, request: &DataRequest) -> ProviderResult<Payload> {
        match request {
            DataRequest::News(q) => self
                .company_news(&q.symbol, &q.window)
                .await
                .map(Payload::Articles),
            DataRequest::Headlines { category, .. } => {
                self.latest_news(category).await.map(Payload::Articles)
            }
            other => Err(ProviderError::Unsupported {
                provider: Self::NAME,
                request: other.label(),
            }),
        }
    }

    fn status(&self) -> ProviderStatus {
        self.core.status(self.news.len())
    }

    fn sweep_caches(&self) -> usize {
        self.news.sweep_expired()
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NewsBody {
    List(Vec<RawNews>),
    Error { error: String },
}

#[derive(Debug, Deserialize)]
struct RawNews {
    #[serde(default)]
    id: i64,
    #[serde(default)]
    datetime: i64,
    #[serde(default)]
    headline: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    source: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::system_clock;
    use crate::config::ReferenceTables;
    use crate::ingest::http::ScriptedTransport;
    use crate::model::Sentiment;
    use chrono::NaiveDate;

    fn provider(t: Arc<ScriptedTransport>) -> FinnhubProvider {
        let tables = ReferenceTables::default_seed();
        let clf = SentimentClassifier::new(tables.sentiment_for(FinnhubProvider::NAME));
        FinnhubProvider::new(ProviderSettings::with_key("fk"), t, system_clock(), clf)
            .with_base_url("https://fh.test/api/v1")
    }

    fn window() -> DateWindow {
        DateWindow {
            from: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            to: NaiveDate::from_ymd_opt(2024, 5, 8).unwrap(),
            weekend: false,
        }
    }

    #[tokio::test]
    async fn company_news_is_tagged_and_classified() {
        let t = Arc::new(ScriptedTransport::new());
        t.push_ok(
            r#"[{"category":"company","datetime":1714750000,"headline":"Microsoft posts higher cloud revenue",
                 "id":101,"image":"","related":"MSFT","source":"Yahoo","summary":"Azure results","url":"https://y.test/1"},
                {"datetime":0,"headline":"","id":102,"url":"https://y.test/2"}]"#,
        );
        let p = provider(t.clone());
        let v = p.company_news(&Symbol::new("MSFT"), &window()).await.unwrap();
        assert_eq!(v.len(), 1);
        assert_eq!(v[0].id, "101");
        assert_eq!(v[0].related_ticker, Some(Symbol::new("MSFT")));
        // "higher" only exists in the Finnhub lexicon
        assert_eq!(v[0].sentiment, Sentiment::Positive);
        assert!(v[0].published_at.is_some());

        let req = &t.requests()[0];
        assert_eq!(req.url, "https://fh.test/api/v1/company-news");
        assert_eq!(req.query_value("symbol"), Some("MSFT"));
        assert_eq!(req.query_value("token"), Some("fk"));
    }

    #[tokio::test]
    async fn error_object_is_reported() {
        let t = Arc::new(ScriptedTransport::new());
        t.push_ok(r#"{"error":"Invalid API key"}"#);
        let p = provider(t);
        let err = p.latest_news("general").await.unwrap_err();
        assert_eq!(err, ProviderError::Network("Invalid API key".into()));
    }
}
