//! NewsAPI.org: free-text search for company terms in the current date window,
//! plus top business headlines.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;

use crate::cache::TtlCache;
use crate::clock::SharedClock;
use crate::config::ProviderSettings;
use crate::ingest::http::{HttpRequest, Transport};
use crate::ingest::normalize_text;
use crate::ingest::provider_core::{parse_json, ProviderCore};
use crate::ingest::types::{
    Capability, DataProvider, DataRequest, NewsQuery, Payload, ProviderError, ProviderResult,
    ProviderStatus,
};
use crate::model::{DateWindow, NewsArticle, Symbol};
use crate::sentiment::SentimentClassifier;

const BASE_URL: &str = "https://newsapi.org/v2";

pub struct NewsApiProvider {
    core: ProviderCore,
    searches: TtlCache<Vec<NewsArticle>>,
    classifier: SentimentClassifier,
    terms_per_ticker: usize,
    base_url: String,
}

impl NewsApiProvider {
    pub const NAME: &'static str = "newsapi";

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
                "NewsAPI",
                settings,
                true,
                transport,
                clock.clone(),
            ),
            searches: TtlCache::new(ttl, clock),
            classifier,
            terms_per_ticker: 2,
            base_url: BASE_URL.to_string(),
        }
    }

    pub fn with_terms_per_ticker(mut self, n: usize) -> Self {
        self.terms_per_ticker = n.max(1);
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.core = self.core.with_timeout(timeout);
        self
    }

    /// `everything` search for one term, most popular first.
    pub async fn search(
        &self,
        term: &str,
        window: &DateWindow,
        page_size: u32,
    ) -> ProviderResult<Vec<NewsArticle>> {
        let api_key = self.core.api_key()?;
        let (from, to) = (window.from_param(), window.to_param());
        let size = page_size.to_string();
        let key = self.core.cache_key("everything", &[term, &from, &to, &size]);
        let req = HttpRequest::get(format!("{}/everything", self.base_url))
            .param("q", term)
            .param("from", from)
            .param("to", to)
            .param("language", "en")
            .param("sortBy", "popularity")
            .param("pageSize", size)
            .param("apiKey", api_key);
        self.core
            .cached_get(&self.searches, &key, req, |body| self.parse_articles(body))
            .await
    }

    /// Top US headlines for a category such as `business`.
    pub async fn top_headlines(
        &self,
        category: &str,
        page_size: u32,
    ) -> ProviderResult<Vec<NewsArticle>> {
        let api_key = self.core.api_key()?;
        let size = page_size.to_string();
        let key = self.core.cache_key("top", &[category, &size]);
        let req = HttpRequest::get(format!("{}/top-headlines", self.base_url))
            .param("category", category)
            .param("country", "us")
            .param("pageSize", size)
            .param("apiKey", api_key);
        self.core
            .cached_get(&self.searches, &key, req, |body| self.parse_articles(body))
            .await
    }

    /// Search the leading company terms for one ticker and tag the results.
    /// Fails only when every search failed.
    async fn company_news(&self, q: &NewsQuery) -> ProviderResult<Vec<NewsArticle>> {
        let mut out = Vec::new();
        let mut first_err = None;
        let mut any_ok = false;
        for term in q.terms.iter().take(self.terms_per_ticker) {
            match self.search(term, &q.window, q.page_size).await {
                Ok(articles) => {
                    any_ok = true;
                    out.extend(articles.into_iter().map(|a| tag(a, &q.symbol, term)));
                }
                Err(e) => {
                    tracing::debug!(
                        target: "ingest",
                        provider = Self::NAME,
                        term = %term,
                        error = %e,
                        "search failed"
                    );
                    first_err.get_or_insert(e);
                }
            }
        }
        match (any_ok, first_err) {
            (false, Some(e)) => Err(e),
            (false, None) => Err(ProviderError::NoData(format!(
                "no search terms for {}",
                q.symbol
            ))),
            _ => Ok(out),
        }
    }

    fn parse_articles(&self, body: &str) -> ProviderResult<Vec<NewsArticle>> {
        let resp: EverythingResponse = parse_json(body)?;
        if resp.status != "ok" {
            return Err(ProviderError::Network(
                resp.message.unwrap_or_else(|| format!("status {}", resp.status)),
            ));
        }
        Ok(resp
            .articles
            .into_iter()
            .filter_map(|raw| self.to_article(raw))
            .collect())
    }

    fn to_article(&self, raw: RawArticle) -> Option<NewsArticle> {
        let title = normalize_text(raw.title.as_deref().unwrap_or_default());
        let url = raw.url.unwrap_or_default();
        // NewsAPI blanks out takedowns as "[Removed]".
        if title.is_empty() || url.is_empty() || title == "[Removed]" {
            return None;
        }
        let summary = normalize_text(raw.description.as_deref().unwrap_or_default());
        let content = normalize_text(raw.content.as_deref().unwrap_or_default());
        let sentiment = self.classifier.classify(&format!("{title} {summary}"));
        Some(NewsArticle {
            id: String::new(),
            title,
            summary,
            content,
            url,
            source: raw.source.and_then(|s| s.name).unwrap_or_default(),
            published_at: raw
                .published_at
                .as_deref()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|d| d.with_timezone(&Utc)),
            sentiment,
            related_ticker: None,
            search_term: None,
            provider: Self::NAME.to_string(),
        })
    }
}

fn tag(mut a: NewsArticle, symbol: &Symbol, term: &str) -> NewsArticle {
    a.related_ticker = Some(symbol.clone());
    a.search_term = Some(term.to_string());
    a
}

#[async_trait]
impl DataProvider for NewsApiProvider {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn capabilities(&self) -> &'static [Capability] {
        &[Capability::News]
    }

    async fn fetch(&self, request: &DataRequest) -> ProviderResult<Payload> {
        match request {
            DataRequest::News(q) => self.company_news(q).await.map(Payload::Articles),
            DataRequest::Headlines {
                category,
                page_size,
            } => self
                .top_headlines(category, *page_size)
                .await
                .map(Payload::Articles),
            other => Err(ProviderError::Unsupported {
                provider: Self::NAME,
                request: other.label(),
            }),
        }
    }

    fn status(&self) -> ProviderStatus {
        self.core.status(self.searches.len())
    }

    fn sweep_caches(&self) -> usize {
        self.searches.sweep_expired()
    }
}

#[derive(Debug, Deserialize)]
struct EverythingResponse {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    articles: Vec<RawArticle>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawArticle {
    #[serde(default)]
    source: Option<RawSource>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    published_at: Option<String>,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSource {
    #[serde(default)]
    name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::system_clock;
    use crate::config::ReferenceTables;
    use crate::ingest::http::ScriptedTransport;
    use crate::model::Sentiment;
    use chrono::NaiveDate;

    const BODY: &str = r#"{"status":"ok","totalResults":3,"articles":[
        {"source":{"id":null,"name":"Reuters"},"author":"x","title":"Apple shares surge on record iPhone sales",
         "description":"Strong quarter","url":"https://r.test/a","publishedAt":"2024-05-03T14:00:00Z",
         "content":"Apple Inc reported… [+1200 chars]"},
        {"source":{"name":"Removed"},"title":"[Removed]","url":"https://removed.test"},
        {"source":{"name":"CNBC"},"title":"Markets slide","description":null,"url":"https://c.test/b",
         "publishedAt":"bad date","content":null}]}"#;

    fn provider(t: Arc<ScriptedTransport>) -> NewsApiProvider {
        let clf = SentimentClassifier::new(&ReferenceTables::default_seed().sentiment);
        NewsApiProvider::new(ProviderSettings::with_key("nk"), t, system_clock(), clf)
            .with_base_url("https://news.test/v2")
    }

    fn window() -> DateWindow {
        DateWindow {
            from: NaiveDate::from_ymd_opt(2024, 4, 26).unwrap(),
            to: NaiveDate::from_ymd_opt(2024, 5, 3).unwrap(),
            weekend: false,
        }
    }

    #[tokio::test]
    async fn search_parses_and_classifies() {
        let t = Arc::new(ScriptedTransport::new());
        t.push_ok(BODY);
        let p = provider(t.clone());
        let v = p.search("Apple", &window(), 6).await.unwrap();
        assert_eq!(v.len(), 2);
        assert_eq!(v[0].source, "Reuters");
        assert_eq!(v[0].sentiment, Sentiment::Positive);
        assert_eq!(v[0].content, "Apple Inc reported");
        assert!(v[0].published_at.is_some());
        assert!(v[1].published_at.is_none());

        let req = &t.requests()[0];
        assert_eq!(req.url, "https://news.test/v2/everything");
        assert_eq!(req.query_value("from"), Some("2024-04-26"));
        assert_eq!(req.query_value("to"), Some("2024-05-03"));
        assert_eq!(req.query_value("pageSize"), Some("6"));
        assert_eq!(req.query_value("sortBy"), Some("popularity"));
    }

    #[tokio::test]
    async fn company_news_uses_leading_terms_and_tags() {
        let t = Arc::new(ScriptedTransport::new());
        t.push_ok(BODY).push_ok(r#"{"status":"ok","articles":[]}"#);
        let p = provider(t.clone());
        let q = NewsQuery {
            symbol: Symbol::new("AAPL"),
            terms: vec!["Apple".into(), "Apple Inc".into(), "iPhone".into()],
            window: window(),
            page_size: 6,
        };
        let v = p.fetch(&DataRequest::News(q)).await.unwrap().into_articles().unwrap();
        assert_eq!(t.request_count(), 2);
        assert!(v.iter().all(|a| a.related_ticker == Some(Symbol::new("AAPL"))));
        assert_eq!(v[0].search_term.as_deref(), Some("Apple"));
    }

    #[tokio::test]
    async fn all_searches_failing_is_an_error() {
        let t = Arc::new(ScriptedTransport::new());
        t.push_ok(r#"{"status":"error","code":"apiKeyInvalid","message":"Your API key is invalid"}"#);
        let p = provider(t.clone()).with_terms_per_ticker(1);
        let q = NewsQuery {
            symbol: Symbol::new("AAPL"),
            terms: vec!["Apple".into()],
            window: window(),
            page_size: 6,
        };
        let err = p.fetch(&DataRequest::News(q)).await.unwrap_err();
        assert_eq!(err, ProviderError::Network("Your API key is invalid".into()));
    }
}
