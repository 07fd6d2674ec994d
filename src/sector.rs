//! Sector performance from sector ETF quotes.

use std::collections::BTreeMap;

use crate::config::tables::SectorEtf;
use crate::ingest::provider_core::round_to;
use crate::model::{PriceInfo, Symbol};

/// Daily percent move implied by a quote: the previous close is
/// `price - change`. `None` when that is not positive.
pub fn daily_move_pct(q: &PriceInfo) -> Option<f64> {
    let prev = q.price - q.change;
    if !q.price.is_finite() || !prev.is_finite() || prev <= 0.0 {
        return None;
    }
    Some(round_to((q.price - prev) / prev * 100.0, 2))
}

/// Percent move per sector. Every sector in `table` is reported; sectors whose
/// ETF quote is missing or unusable report `0.0`.
pub fn sector_performance(
    table: &[SectorEtf],
    quotes: &BTreeMap<Symbol, PriceInfo>,
) -> BTreeMap<String, f64> {
    table
        .iter()
        .map(|row| {
            let pct = quotes
                .get(&Symbol::new(&row.etf))
                .filter(|q| q.is_usable())
                .and_then(daily_move_pct)
                .unwrap_or(0.0);
            (row.sector.clone(), pct)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quote(price: f64, change: f64) -> PriceInfo {
        PriceInfo {
            price,
            change,
            change_percent: 0.0,
            volume: None,
            source: "yahoo".into(),
        }
    }

    fn row(sector: &str, etf: &str) -> SectorEtf {
        SectorEtf {
            sector: sector.into(),
            etf: etf.into(),
        }
    }

    #[test]
    fn move_is_relative_to_previous_close() {
        assert_eq!(daily_move_pct(&quote(102.0, 2.0)), Some(2.0));
        assert_eq!(daily_move_pct(&quote(99.0, -1.0)), Some(-1.0));
        assert_eq!(daily_move_pct(&quote(5.0, 5.0)), None);
    }

    #[test]
    fn missing_etf_reports_zero() {
        let table = vec![row("Technology", "XLK"), row("Energy", "XLE")];
        let mut quotes = BTreeMap::new();
        quotes.insert(Symbol::new("XLK"), quote(210.0, 10.0));
        let perf = sector_performance(&table, &quotes);
        assert_eq!(perf.len(), 2);
        assert_eq!(perf["Technology"], 5.0);
        assert_eq!(perf["Energy"], 0.0);
    }
}
