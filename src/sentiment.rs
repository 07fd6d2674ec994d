//! Keyword-count sentiment: per-article classification and the cross-provider
//! combination used in snapshots.

use crate::config::tables::SentimentKeywords;
use crate::model::{NewsArticle, Sentiment, SentimentSummary, SentimentTally};
use crate::relevance::lowered;

/// Classifies text by counting distinct positive and negative keywords.
#[derive(Debug, Clone)]
pub struct SentimentClassifier {
    positive: Vec<String>,
    negative: Vec<String>,
}

impl SentimentClassifier {
    pub fn new(keywords: &SentimentKeywords) -> Self {
        Self {
            positive: dedup(lowered(&keywords.positive)),
            negative: dedup(lowered(&keywords.negative)),
        }
    }

    /// (positive keywords present, negative keywords present) in `text`,
    /// matched case-insensitively as substrings. A keyword counts once however
    /// often it appears.
    pub fn counts(&self, text: &str) -> (usize, usize) {
        let text = text.to_lowercase();
        let hits = |set: &[String]| set.iter().filter(|w| text.contains(w.as_str())).count();
        (hits(&self.positive), hits(&self.negative))
    }

    pub fn classify(&self, text: &str) -> Sentiment {
        let (pos, neg) = self.counts(text);
        match pos.cmp(&neg) {
            std::cmp::Ordering::Greater => Sentiment::Positive,
            std::cmp::Ordering::Less => Sentiment::Negative,
            std::cmp::Ordering::Equal => Sentiment::Neutral,
        }
    }
}

fn dedup(mut words: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    words.retain(|w| seen.insert(w.clone()));
    words
}

/// Count labels over one provider's articles.
pub fn tally(articles: &[NewsArticle]) -> SentimentTally {
    let mut t = SentimentTally::default();
    for a in articles {
        t.record(a.sentiment);
    }
    t
}

/// Merge provider tallies by summing counts. Percentages are of the summed
/// total; the overall label is the strictly largest bucket, neutral on ties.
pub fn combine(tallies: &[SentimentTally]) -> SentimentSummary {
    let mut sum = SentimentTally::default();
    for t in tallies {
        sum.positive += t.positive;
        sum.negative += t.negative;
        sum.neutral += t.neutral;
    }
    let total = sum.total();
    if total == 0 {
        return SentimentSummary::default();
    }

    let pct = |n: u32| n as f64 / total as f64 * 100.0;
    let overall = if sum.positive > sum.negative && sum.positive > sum.neutral {
        Sentiment::Positive
    } else if sum.negative > sum.positive && sum.negative > sum.neutral {
        Sentiment::Negative
    } else {
        Sentiment::Neutral
    };

    SentimentSummary {
        positive_pct: pct(sum.positive),
        negative_pct: pct(sum.negative),
        neutral_pct: pct(sum.neutral),
        overall,
        counts: sum,
    }
}
