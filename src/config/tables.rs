//! # Reference Tables
//!
//! Keyword and lookup tables that drive news search, relevance, sentiment
//! and sector performance. They are plain data, loaded once at startup:
//!
//! - `$MARKET_TABLES_PATH` (TOML or JSON), else
//! - `config/market_tables.toml`, else
//! - `config/market_tables.json`, else
//! - the built-in [`ReferenceTables::default_seed`].
//!
//! Keywords are trimmed and lowercased on load; empty entries are dropped.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use crate::model::Symbol;

pub const ENV_TABLES_PATH: &str = "MARKET_TABLES_PATH";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SentimentKeywords {
    #[serde(default)]
    pub positive: Vec<String>,
    #[serde(default)]
    pub negative: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TickerEntry {
    /// Free-text terms for news search, most specific first.
    #[serde(default)]
    pub search_terms: Vec<String>,
    /// Lowercase phrases that mark an article as being about this ticker.
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorEtf {
    pub sector: String,
    pub etf: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesSpec {
    pub series_id: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceTables {
    pub sentiment: SentimentKeywords,
    /// Provider-specific lexicons, keyed by provider name.
    #[serde(default)]
    pub sentiment_overrides: BTreeMap<String, SentimentKeywords>,
    #[serde(default)]
    pub tickers: BTreeMap<String, TickerEntry>,
    #[serde(default)]
    pub sectors: Vec<SectorEtf>,
    #[serde(default)]
    pub economic_series: Vec<SeriesSpec>,
}

impl Default for ReferenceTables {
    fn default() -> Self {
        Self::default_seed()
    }
}

impl ReferenceTables {
    /// Lexicon for `provider`, falling back to the shared one.
    pub fn sentiment_for(&self, provider: &str) -> &SentimentKeywords {
        self.sentiment_overrides
            .get(provider)
            .unwrap_or(&self.sentiment)
    }

    /// Search terms for `symbol`; unknown tickers search by the ticker itself.
    pub fn search_terms(&self, symbol: &Symbol) -> Vec<String> {
        match self.tickers.get(symbol.as_str()) {
            Some(t) if !t.search_terms.is_empty() => t.search_terms.clone(),
            _ => vec![symbol.as_str().to_string()],
        }
    }

    /// Relevance keywords for `symbol`; unknown tickers match the lowercase ticker.
    pub fn keywords(&self, symbol: &Symbol) -> Vec<String> {
        match self.tickers.get(symbol.as_str()) {
            Some(t) if !t.keywords.is_empty() => t.keywords.clone(),
            _ => vec![symbol.as_str().to_ascii_lowercase()],
        }
    }

    pub fn sector_etfs(&self) -> Vec<Symbol> {
        self.sectors.iter().map(|s| Symbol::new(&s.etf)).collect()
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading market tables from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        parse_tables(&content, &ext)
    }

    /// Env var, then `config/` fallbacks, then the built-in seed.
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_TABLES_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            }
            return Err(anyhow!("{ENV_TABLES_PATH} points to non-existent path"));
        }
        for candidate in ["config/market_tables.toml", "config/market_tables.json"] {
            let p = PathBuf::from(candidate);
            if p.exists() {
                return Self::load_from(&p);
            }
        }
        Ok(Self::default_seed())
    }

    fn cleaned(mut self) -> Self {
        self.sentiment = clean_lexicon(self.sentiment);
        self.sentiment_overrides = self
            .sentiment_overrides
            .into_iter()
            .map(|(k, v)| (k.trim().to_ascii_lowercase(), clean_lexicon(v)))
            .collect();
        self.tickers = self
            .tickers
            .into_iter()
            .filter(|(k, _)| !k.trim().is_empty())
            .map(|(k, t)| {
                let entry = TickerEntry {
                    search_terms: clean_terms(t.search_terms),
                    keywords: clean_keywords(t.keywords),
                };
                (k.trim().to_ascii_uppercase(), entry)
            })
            .collect();
        self.sectors.retain(|s| !s.sector.trim().is_empty() && !s.etf.trim().is_empty());
        for s in &mut self.sectors {
            s.sector = s.sector.trim().to_string();
            s.etf = s.etf.trim().to_ascii_uppercase();
        }
        self.economic_series.retain(|s| !s.series_id.trim().is_empty());
        self
    }

    /// Built-in tables covering the common large caps, the SPDR sector ETFs
    /// and the headline FRED series.
    pub fn default_seed() -> Self {
        let positive = [
            "surge", "jump", "rise", "gain", "up", "positive", "growth", "profit", "earnings",
            "beat", "exceed", "strong", "bullish", "rally", "recovery",
        ];
        let negative = [
            "fall", "drop", "decline", "loss", "down", "negative", "weak", "bearish", "crash",
            "plunge", "concern", "risk", "worry", "fear", "sell-off",
        ];
        let sentiment = SentimentKeywords {
            positive: strings(&positive),
            negative: strings(&negative),
        };

        // Finnhub headlines are terse; a wider lexicon catches more of them.
        let mut finnhub = sentiment.clone();
        finnhub
            .positive
            .extend(strings(&["increase", "higher", "better", "success", "win"]));
        finnhub
            .negative
            .extend(strings(&["decrease", "lower", "worse", "fail", "lose"]));

        let mut tickers = BTreeMap::new();
        for (sym, terms, keywords) in [
            (
                "AAPL",
                &["Apple", "Apple Inc", "iPhone", "iPad", "Mac"][..],
                &["apple", "iphone", "ipad", "mac", "tim cook", "ios"][..],
            ),
            (
                "MSFT",
                &["Microsoft", "Microsoft Corporation", "Windows", "Office", "Azure"][..],
                &["microsoft", "windows", "office", "azure", "satya nadella", "xbox"][..],
            ),
            (
                "GOOGL",
                &["Google", "Alphabet", "YouTube", "Android", "Chrome"][..],
                &["google", "alphabet", "youtube", "android", "chrome", "sundar pichai"][..],
            ),
            (
                "TSLA",
                &["Tesla", "Tesla Inc", "Elon Musk"][..],
                &["tesla", "elon musk", "model s", "model 3", "cybertruck"][..],
            ),
            (
                "NVDA",
                &["NVIDIA", "NVIDIA Corporation", "GPU"][..],
                &["nvidia", "gpu", "jensen huang", "rtx", "ai chips"][..],
            ),
            (
                "AMZN",
                &["Amazon", "Amazon.com", "AWS"][..],
                &["amazon", "aws", "jeff bezos", "prime", "echo"][..],
            ),
            (
                "META",
                &["Meta", "Facebook", "Instagram", "WhatsApp"][..],
                &["meta", "facebook", "instagram", "mark zuckerberg", "whatsapp"][..],
            ),
            (
                "NFLX",
                &["Netflix", "Netflix Inc"][..],
                &["netflix", "streaming", "ted sarandos"][..],
            ),
            (
                "JPM",
                &["JPMorgan", "JPMorgan Chase", "JP Morgan"][..],
                &["jpmorgan", "jp morgan", "jamie dimon", "chase"][..],
            ),
            (
                "JNJ",
                &["Johnson & Johnson", "J&J"][..],
                &["johnson & johnson", "j&j", "pharmaceuticals"][..],
            ),
        ] {
            tickers.insert(
                sym.to_string(),
                TickerEntry {
                    search_terms: strings(terms),
                    keywords: strings(keywords),
                },
            );
        }

        let sectors = [
            ("Technology", "XLK"),
            ("Healthcare", "XLV"),
            ("Financial", "XLF"),
            ("Consumer Discretionary", "XLY"),
            ("Consumer Staples", "XLP"),
            ("Energy", "XLE"),
            ("Industrial", "XLI"),
            ("Materials", "XLB"),
            ("Real Estate", "XLRE"),
            ("Utilities", "XLU"),
            ("Communication Services", "XLC"),
        ]
        .into_iter()
        .map(|(sector, etf)| SectorEtf {
            sector: sector.to_string(),
            etf: etf.to_string(),
        })
        .collect();

        let economic_series = [
            ("UNRATE", "Unemployment Rate"),
            ("CPIAUCSL", "Consumer Price Index"),
            ("CPILFESL", "Core CPI"),
            ("GDP", "Gross Domestic Product"),
            ("FEDFUNDS", "Federal Funds Rate"),
            ("GS10", "10-Year Treasury Rate"),
            ("PCEPI", "PCE Price Index"),
            ("PCEPILFE", "Core PCE Price Index"),
        ]
        .into_iter()
        .map(|(id, title)| SeriesSpec {
            series_id: id.to_string(),
            title: title.to_string(),
        })
        .collect();

        let mut sentiment_overrides = BTreeMap::new();
        sentiment_overrides.insert("finnhub".to_string(), finnhub);

        Self {
            sentiment,
            sentiment_overrides,
            tickers,
            sectors,
            economic_series,
        }
    }
}

fn parse_tables(s: &str, hint_ext: &str) -> Result<ReferenceTables> {
    let parsed = if hint_ext == "json" {
        serde_json::from_str::<ReferenceTables>(s).map_err(anyhow::Error::from)
    } else {
        toml::from_str::<ReferenceTables>(s)
            .map_err(anyhow::Error::from)
            .or_else(|_| serde_json::from_str::<ReferenceTables>(s).map_err(anyhow::Error::from))
    };
    parsed
        .map(ReferenceTables::cleaned)
        .context("unsupported market tables format")
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn clean_lexicon(l: SentimentKeywords) -> SentimentKeywords {
    SentimentKeywords {
        positive: clean_keywords(l.positive),
        negative: clean_keywords(l.negative),
    }
}

fn clean_keywords(items: Vec<String>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    items
        .into_iter()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty() && seen.insert(s.clone()))
        .collect()
}

fn clean_terms(items: Vec<String>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty() && seen.insert(s.to_lowercase()))
        .collect()
}
