// src/ingest/mod.rs
pub mod http;
pub mod provider_core;
pub mod providers;
pub mod types;

use metrics::{describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;
use std::collections::HashSet;

use crate::model::NewsArticle;

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("provider_requests_total", "Outbound requests per provider.");
        describe_counter!(
            "provider_cache_hits_total",
            "Requests answered from the provider cache."
        );
        describe_counter!(
            "provider_errors_total",
            "Provider fetches that ended in an error."
        );
        describe_counter!(
            "provider_rate_limited_total",
            "Requests that had to wait for the rate window."
        );
        describe_histogram!("provider_fetch_ms", "Outbound request time in milliseconds.");
        describe_counter!("news_dedup_total", "Articles removed as duplicates.");
        describe_counter!(
            "news_irrelevant_total",
            "Articles dropped by the ticker relevance gate."
        );
        describe_gauge!(
            "snapshot_last_run_ts",
            "Unix ts when a market snapshot was last built."
        );
    });
}

const MAX_TEXT_CHARS: usize = 1500;

/// Normalize article text: decode entities, strip tags, fold typographic
/// quotes, collapse whitespace, cap length.
pub fn normalize_text(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    if let Ok(re) = RE_TAGS.get_or_try_init(|| regex::Regex::new(r"(?is)</?[^>]+>")) {
        out = re.replace_all(&out, "").to_string();
    }

    // NewsAPI truncates content with a "[+1234 chars]" marker.
    static RE_TRUNC: OnceCell<regex::Regex> = OnceCell::new();
    if let Ok(re) =
        RE_TRUNC.get_or_try_init(|| regex::Regex::new(r"\s*…?\s*\[\+\d+ chars\]\s*$"))
    {
        out = re.replace(&out, "").to_string();
    }

    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    if let Ok(re) = RE_WS.get_or_try_init(|| regex::Regex::new(r"\s+")) {
        out = re.replace_all(&out, " ").to_string();
    }
    out = out.trim().to_string();

    if out.chars().count() > MAX_TEXT_CHARS {
        out = out.chars().take(MAX_TEXT_CHARS).collect();
    }
    out
}

fn key_hash(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(text.as_bytes());
    let mut out = String::with_capacity(24);
    for b in digest.iter().take(12) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Composite keys identifying an article: title+URL always, provider
/// id+headline when the provider assigns ids.
pub fn article_keys(a: &NewsArticle) -> Vec<String> {
    let title = a.title.trim().to_lowercase();
    let mut keys = vec![key_hash(&format!("t|{}|{}", title, a.url.trim()))];
    if !a.id.is_empty() {
        keys.push(key_hash(&format!("i|{}|{}|{}", a.provider, a.id, title)));
    }
    keys
}

/// Remembers article keys; the first occurrence wins.
#[derive(Debug, Default)]
pub struct Deduplicator {
    seen: HashSet<String>,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` the first time an article is offered, `false` for repeats.
    pub fn admit(&mut self, a: &NewsArticle) -> bool {
        let keys = article_keys(a);
        if keys.iter().any(|k| self.seen.contains(k)) {
            return false;
        }
        self.seen.extend(keys);
        true
    }
}

/// Drop repeated articles, keeping order. Returns (kept, removed).
pub fn dedup_articles(articles: Vec<NewsArticle>) -> (Vec<NewsArticle>, usize) {
    let mut d = Deduplicator::new();
    let before = articles.len();
    let kept: Vec<NewsArticle> = articles.into_iter().filter(|a| d.admit(a)).collect();
    let removed = before - kept.len();
    (kept, removed)
}
