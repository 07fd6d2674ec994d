//! Technical indicators over a daily price history (oldest bar first).
//!
//! Every function looks only at the tail of the series and returns `None`
//! when there is not enough data or the value is undefined (e.g. a flat
//! range for the stochastic oscillator).
//!
//! Conventions:
//! - SMA windows are plain means of the last `n` values.
//! - EMAs are the bias-corrected weighted mean over the whole series with
//!   `alpha = 2 / (span + 1)`, so early values are not dragged toward zero.
//! - Standard deviation is the sample deviation (`n - 1`).
//! - RSI averages gains and losses with a simple rolling mean.
//! - A month is 20 trading days and a year 252 when annualizing.

use crate::model::{PriceBar, TechnicalInfo};

/// Below this many bars nothing is computed.
pub const MIN_OBSERVATIONS: usize = 20;

pub const RSI_PERIOD: usize = 14;
pub const MACD_FAST: usize = 12;
pub const MACD_SLOW: usize = 26;
pub const MACD_SIGNAL: usize = 9;
pub const BOLLINGER_PERIOD: usize = 20;
pub const BOLLINGER_WIDTH: f64 = 2.0;
pub const STOCH_K: usize = 14;
pub const STOCH_D: usize = 3;
pub const ATR_PERIOD: usize = 14;
pub const TRADING_DAYS_PER_MONTH: usize = 20;
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Full indicator set for `bars`; empty when there are fewer than
/// [`MIN_OBSERVATIONS`].
pub fn compute(bars: &[PriceBar]) -> TechnicalInfo {
    if bars.len() < MIN_OBSERVATIONS {
        return TechnicalInfo {
            observations: bars.len(),
            ..TechnicalInfo::default()
        };
    }
    let close: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let high: Vec<f64> = bars.iter().map(|b| b.high).collect();
    let low: Vec<f64> = bars.iter().map(|b| b.low).collect();

    let (macd_line, signal, hist) = match macd(&close) {
        Some((m, s, h)) => (Some(m), Some(s), Some(h)),
        None => (None, None, None),
    };
    let (bb_upper, bb_mid, bb_lower) = match bollinger(&close, BOLLINGER_PERIOD, BOLLINGER_WIDTH) {
        Some((u, m, l)) => (Some(u), Some(m), Some(l)),
        None => (None, None, None),
    };
    let (stoch_k, stoch_d) = stochastic(&high, &low, &close, STOCH_K, STOCH_D);

    TechnicalInfo {
        observations: bars.len(),
        rsi: rsi(&close, RSI_PERIOD),
        macd: macd_line,
        macd_signal: signal,
        macd_histogram: hist,
        sma_20: sma(&close, 20),
        sma_50: sma(&close, 50),
        sma_200: sma(&close, 200),
        ema_12: ema_series(&close, MACD_FAST).last().copied(),
        ema_26: ema_series(&close, MACD_SLOW).last().copied(),
        bollinger_upper: bb_upper,
        bollinger_middle: bb_mid,
        bollinger_lower: bb_lower,
        stochastic_k: stoch_k,
        stochastic_d: stoch_d,
        atr: atr(&high, &low, &close, ATR_PERIOD),
        current_price: close.last().copied(),
        price_change_1m: period_return(&close, 1),
        price_change_3m: period_return(&close, 3),
        price_change_1y: period_return(&close, 12),
        volatility: volatility(&close),
    }
}

/// Mean of the last `period` values.
pub fn sma(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    let tail = &values[values.len() - period..];
    Some(tail.iter().sum::<f64>() / period as f64)
}

/// Sample standard deviation of the last `period` values.
pub fn rolling_std(values: &[f64], period: usize) -> Option<f64> {
    if period < 2 || values.len() < period {
        return None;
    }
    let tail = &values[values.len() - period..];
    let mean = tail.iter().sum::<f64>() / period as f64;
    let var = tail.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (period - 1) as f64;
    Some(var.sqrt())
}

/// Bias-corrected EMA at every point of `values`.
pub fn ema_series(values: &[f64], span: usize) -> Vec<f64> {
    let alpha = 2.0 / (span as f64 + 1.0);
    let decay = 1.0 - alpha;
    let mut num = 0.0;
    let mut den = 0.0;
    values
        .iter()
        .map(|x| {
            num = x + decay * num;
            den = 1.0 + decay * den;
            num / den
        })
        .collect()
}

/// `100 - 100 / (1 + avg_gain / avg_loss)` over the last `period` moves.
/// A window with only gains is 100; a window with no movement is undefined.
pub fn rsi(close: &[f64], period: usize) -> Option<f64> {
    if period == 0 || close.len() < period + 1 {
        return None;
    }
    let tail = &close[close.len() - period - 1..];
    let (mut gain, mut loss) = (0.0, 0.0);
    for w in tail.windows(2) {
        let d = w[1] - w[0];
        if d > 0.0 {
            gain += d;
        } else {
            loss -= d;
        }
    }
    let (avg_gain, avg_loss) = (gain / period as f64, loss / period as f64);
    if avg_loss == 0.0 {
        return (avg_gain > 0.0).then_some(100.0);
    }
    Some(100.0 - 100.0 / (1.0 + avg_gain / avg_loss))
}

/// (MACD line, signal, histogram) for the last bar.
pub fn macd(close: &[f64]) -> Option<(f64, f64, f64)> {
    if close.is_empty() {
        return None;
    }
    let fast = ema_series(close, MACD_FAST);
    let slow = ema_series(close, MACD_SLOW);
    let line: Vec<f64> = fast.iter().zip(&slow).map(|(f, s)| f - s).collect();
    let signal = ema_series(&line, MACD_SIGNAL);
    let (m, s) = (*line.last()?, *signal.last()?);
    Some((m, s, m - s))
}

/// (upper, middle, lower) bands.
pub fn bollinger(close: &[f64], period: usize, width: f64) -> Option<(f64, f64, f64)> {
    let mid = sma(close, period)?;
    let sd = rolling_std(close, period)?;
    Some((mid + width * sd, mid, mid - width * sd))
}

fn percent_k(high: &[f64], low: &[f64], close: &[f64], end: usize, period: usize) -> Option<f64> {
    let start = (end + 1).checked_sub(period)?;
    let hh = high[start..=end].iter().copied().fold(f64::MIN, f64::max);
    let ll = low[start..=end].iter().copied().fold(f64::MAX, f64::min);
    let range = hh - ll;
    (range > 0.0).then(|| 100.0 * (close[end] - ll) / range)
}

/// (%K, %D). %D is the mean of the last `d_period` %K values and is `None`
/// if any of them is undefined.
pub fn stochastic(
    high: &[f64],
    low: &[f64],
    close: &[f64],
    k_period: usize,
    d_period: usize,
) -> (Option<f64>, Option<f64>) {
    let n = close.len().min(high.len()).min(low.len());
    if n == 0 || k_period == 0 {
        return (None, None);
    }
    let last = n - 1;
    let k = percent_k(high, low, close, last, k_period);
    if d_period == 0 || n < k_period + d_period - 1 {
        return (k, None);
    }
    let ks: Option<Vec<f64>> = (n - d_period..n)
        .map(|end| percent_k(high, low, close, end, k_period))
        .collect();
    let d = ks.map(|v| v.iter().sum::<f64>() / d_period as f64);
    (k, d)
}

/// Percent move from the close `months` trading months back to the last close.
pub fn period_return(close: &[f64], months: usize) -> Option<f64> {
    let span = months * TRADING_DAYS_PER_MONTH;
    if span == 0 || close.len() < span {
        return None;
    }
    let start = close[close.len() - span];
    let end = *close.last()?;
    (start != 0.0).then(|| (end - start) / start * 100.0)
}

/// Annualized sample deviation of daily percent changes, in percent.
pub fn volatility(close: &[f64]) -> Option<f64> {
    if close.len() < MIN_OBSERVATIONS {
        return None;
    }
    let returns: Vec<f64> = close
        .windows(2)
        .filter(|w| w[0] != 0.0)
        .map(|w| w[1] / w[0] - 1.0)
        .collect();
    let sd = rolling_std(&returns, returns.len())?;
    Some(sd * TRADING_DAYS_PER_YEAR.sqrt() * 100.0)
}

/// Mean true range over the last `period` bars. The first bar has no previous
/// close, so its true range is its high-low span.
pub fn atr(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Option<f64> {
    let n = close.len().min(high.len()).min(low.len());
    if period == 0 || n < period {
        return None;
    }
    let tr = |i: usize| {
        let hl = high[i] - low[i];
        if i == 0 {
            return hl;
        }
        let pc = close[i - 1];
        hl.max((high[i] - pc).abs()).max((low[i] - pc).abs())
    };
    Some((n - period..n).map(tr).sum::<f64>() / period as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn bars(closes: &[f64]) -> Vec<PriceBar> {
        let d0 = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, c)| PriceBar {
                date: d0 + chrono::Days::new(i as u64),
                open: *c,
                high: c + 1.0,
                low: c - 1.0,
                close: *c,
                volume: 1000.0,
            })
            .collect()
    }

    #[test]
    fn short_history_is_empty_not_error() {
        let info = compute(&bars(&[10.0; 19]));
        assert!(info.is_empty());
        assert_eq!(info.observations, 19);
    }

    #[test]
    fn rsi_edges() {
        let up: Vec<f64> = (0..20).map(|i| i as f64).collect();
        assert_eq!(rsi(&up, 14), Some(100.0));
        assert_eq!(rsi(&[5.0; 20], 14), None);
        // 7 gains of 1 and 7 losses of 1
        let zigzag: Vec<f64> = (0..15).map(|i| (i % 2) as f64).collect();
        assert!((rsi(&zigzag, 14).unwrap() - 50.0).abs() < 1e-12);
    }

    #[test]
    fn ema_of_constant_is_constant() {
        let v = ema_series(&[4.0; 30], 12);
        assert!(v.iter().all(|x| (x - 4.0).abs() < 1e-12));
    }

    #[test]
    fn ema_first_two_points_match_adjusted_weights() {
        // span 3 => alpha 0.5: second value = (2 + 0.5*1) / 1.5
        let v = ema_series(&[1.0, 2.0], 3);
        assert_eq!(v[0], 1.0);
        assert!((v[1] - 2.5 / 1.5).abs() < 1e-12);
    }

    #[test]
    fn returns_need_a_full_month_of_bars() {
        let closes: Vec<f64> = (1..=60).map(|i| i as f64).collect();
        // 20 bars back from 60 is 41
        assert!((period_return(&closes, 1).unwrap() - (60.0 - 41.0) / 41.0 * 100.0).abs() < 1e-12);
        assert!((period_return(&closes, 3).unwrap() - 5900.0).abs() < 1e-9);
        assert_eq!(period_return(&closes, 12), None);

        let info = compute(&bars(&closes));
        assert!(info.price_change_1m.is_some());
        assert!(info.price_change_1y.is_none());
    }

    #[test]
    fn volatility_of_steady_growth_is_zero() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 * 1.01f64.powi(i)).collect();
        assert!(volatility(&closes).unwrap().abs() < 1e-9);
        assert_eq!(volatility(&closes[..19]), None);
    }

    #[test]
    fn flat_range_has_no_stochastic() {
        let h = [1.0; 20];
        assert_eq!(stochastic(&h, &h, &h, 14, 3), (None, None));
    }

    #[test]
    fn atr_uses_previous_close_gaps() {
        let high = [11.0, 15.0];
        let low = [9.0, 14.0];
        let close = [10.0, 14.5];
        // bar 0: 2.0, bar 1: max(1, 5, 4) = 5
        assert_eq!(atr(&high, &low, &close, 2), Some(3.5));
    }

    #[test]
    fn full_set_on_twenty_bars() {
        let closes: Vec<f64> = (0..20).map(|i| 100.0 + (i as f64 * 0.7).sin() * 3.0).collect();
        let info = compute(&bars(&closes));
        assert!(info.rsi.is_some());
        assert!(info.sma_20.is_some());
        assert!(info.sma_50.is_none());
        assert!(info.stochastic_d.is_some());
        assert_eq!(info.current_price, closes.last().copied());
        let (u, m, l) = (
            info.bollinger_upper.unwrap(),
            info.bollinger_middle.unwrap(),
            info.bollinger_lower.unwrap(),
        );
        assert!(u > m && m > l);
        assert!(((u - m) - (m - l)).abs() < 1e-9);
    }
}
