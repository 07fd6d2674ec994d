// src/relevance.rs
//! Ticker relevance gate for news articles.
//!
//! Each ticker has a list of lowercase phrases (company name, products,
//! executives). An article is attributed to the ticker it was fetched for only
//! when its title, summary or content contains one of that ticker's phrases,
//! compared case-insensitively. Articles that fail are dropped; an article is
//! never moved to a different ticker.

use std::collections::HashMap;

use crate::config::ReferenceTables;
use crate::model::{NewsArticle, Symbol};

/// Lowercased, trimmed, non-empty copies of `phrases`.
pub(crate) fn lowered(phrases: &[String]) -> Vec<String> {
    phrases
        .iter()
        .map(|p| p.trim().to_lowercase())
        .filter(|p| !p.is_empty())
        .collect()
}

/// Per-ticker keyword lists.
#[derive(Debug, Clone)]
pub struct RelevanceFilter {
    keywords: HashMap<Symbol, Vec<String>>,
}

impl RelevanceFilter {
    /// Keyword lists for `symbols`. Tickers missing from the tables match
    /// their own lowercase symbol.
    pub fn for_symbols(tables: &ReferenceTables, symbols: &[Symbol]) -> Self {
        let keywords = symbols
            .iter()
            .map(|s| (s.clone(), lowered(&tables.keywords(s))))
            .filter(|(_, words)| !words.is_empty())
            .collect();
        Self { keywords }
    }

    /// Does `article` mention `ticker`? Unknown tickers never match.
    pub fn is_relevant(&self, article: &NewsArticle, ticker: &Symbol) -> bool {
        let Some(words) = self.keywords.get(ticker) else {
            return false;
        };
        let text = article.haystack().to_lowercase();
        words.iter().any(|w| text.contains(w.as_str()))
    }

    /// Ticker this article belongs to, if it passes the gate for the ticker it
    /// was fetched for.
    pub fn attribute(&self, article: &NewsArticle) -> Option<Symbol> {
        let ticker = article.related_ticker.as_ref()?;
        self.is_relevant(article, ticker).then(|| ticker.clone())
    }
}
