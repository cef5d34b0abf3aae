//! Technical indicator computation over K-line history.
//!
//! Everything here is a pure function of `&[Kline]` — no I/O, no state — so
//! the indicator math is testable without an exchange. Series shorter than
//! an indicator's period produce neutral values (RSI 50, zero ATR, empty
//! support/resistance) rather than panicking; the decision client treats
//! those as "no signal".

use vela_core::types::{Bollinger, IndicatorSet, Kline, Macd, Trend};

/// Simple moving average of the last `period` closes.
///
/// Falls back to the mean of the whole series when it is shorter than
/// `period`, and to 0 for an empty series.
pub fn sma(closes: &[f64], period: usize) -> f64 {
    if closes.is_empty() {
        return 0.0;
    }
    let window = &closes[closes.len().saturating_sub(period)..];
    window.iter().sum::<f64>() / window.len() as f64
}

/// Exponential moving average series, seeded with the first value.
fn ema_series(values: &[f64], period: usize) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }
    let alpha = 2.0 / (period as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());
    let mut prev = values[0];
    out.push(prev);
    for &v in &values[1..] {
        prev = alpha * v + (1.0 - alpha) * prev;
        out.push(prev);
    }
    out
}

/// Relative strength index over `period` (simple-average variant).
///
/// Returns the neutral 50 when there are fewer than `period + 1` closes.
pub fn rsi(closes: &[f64], period: usize) -> f64 {
    if closes.len() < period + 1 {
        return 50.0;
    }
    let deltas: Vec<f64> =
        closes.windows(2).map(|w| w[1] - w[0]).collect();
    let recent = &deltas[deltas.len() - period..];
    let avg_gain: f64 = recent.iter().filter(|d| **d > 0.0).sum::<f64>() / period as f64;
    let avg_loss: f64 = -recent.iter().filter(|d| **d < 0.0).sum::<f64>() / period as f64;
    if avg_loss == 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}

/// MACD(12, 26, 9): line, signal, histogram at the latest close.
pub fn macd(closes: &[f64]) -> Macd {
    if closes.len() < 2 {
        return Macd { line: 0.0, signal: 0.0, histogram: 0.0 };
    }
    let ema12 = ema_series(closes, 12);
    let ema26 = ema_series(closes, 26);
    let line_series: Vec<f64> =
        ema12.iter().zip(&ema26).map(|(a, b)| a - b).collect();
    let signal_series = ema_series(&line_series, 9);

    let line = *line_series.last().unwrap_or(&0.0);
    let signal = *signal_series.last().unwrap_or(&0.0);
    Macd { line, signal, histogram: line - signal }
}

/// Bollinger bands over `period` closes with `k` standard deviations.
pub fn bollinger(closes: &[f64], period: usize, k: f64) -> Bollinger {
    let middle = sma(closes, period);
    if closes.is_empty() {
        return Bollinger { upper: 0.0, middle: 0.0, lower: 0.0 };
    }
    let window = &closes[closes.len().saturating_sub(period)..];
    let variance =
        window.iter().map(|c| (c - middle).powi(2)).sum::<f64>() / window.len() as f64;
    let std_dev = variance.sqrt();
    Bollinger { upper: middle + k * std_dev, middle, lower: middle - k * std_dev }
}

/// Average true range over the last `period` candles.
///
/// TR = max(high − low, |high − prev close|, |low − prev close|).
pub fn atr(klines: &[Kline], period: usize) -> f64 {
    if klines.len() < 2 {
        return 0.0;
    }
    let trs: Vec<f64> = klines
        .windows(2)
        .map(|w| {
            let prev_close = w[0].close;
            let (high, low) = (w[1].high, w[1].low);
            (high - low).max((high - prev_close).abs()).max((low - prev_close).abs())
        })
        .collect();
    let recent = &trs[trs.len().saturating_sub(period)..];
    recent.iter().sum::<f64>() / recent.len() as f64
}

/// ATR as a percentage of price — the volatility figure shown to the
/// decision client.
pub fn volatility_pct(atr: f64, price: f64) -> f64 {
    if price > 0.0 { atr / price * 100.0 } else { 0.0 }
}

/// Classify the trend from price vs SMA20 vs SMA50.
pub fn trend(price: f64, sma_20: f64, sma_50: f64) -> Trend {
    if price > sma_20 && sma_20 > sma_50 {
        Trend::StrongUp
    } else if price > sma_20 {
        Trend::MildUp
    } else if price < sma_20 && sma_20 < sma_50 {
        Trend::StrongDown
    } else if price < sma_20 {
        Trend::MildDown
    } else {
        Trend::Sideways
    }
}

/// Local minima of the close series — candidate support levels.
///
/// A close is a local minimum when it is the smallest value in a ±10 bar
/// window. Returns up to the last 3, ascending.
pub fn support_levels(closes: &[f64]) -> Vec<f64> {
    local_extrema(closes, false)
}

/// Local maxima of the close series — candidate resistance levels.
pub fn resistance_levels(closes: &[f64]) -> Vec<f64> {
    local_extrema(closes, true)
}

fn local_extrema(closes: &[f64], maxima: bool) -> Vec<f64> {
    const WINDOW: usize = 10;
    if closes.len() <= 2 * WINDOW {
        return Vec::new();
    }
    let mut levels = Vec::new();
    for i in WINDOW..closes.len() - WINDOW {
        let window = &closes[i - WINDOW..=i + WINDOW];
        let extreme = if maxima {
            window.iter().cloned().fold(f64::MIN, f64::max)
        } else {
            window.iter().cloned().fold(f64::MAX, f64::min)
        };
        if closes[i] == extreme {
            levels.push(closes[i]);
        }
    }
    let mut out: Vec<f64> = levels.into_iter().rev().take(3).collect();
    out.sort_by(|a, b| a.partial_cmp(b).expect("levels are finite"));
    out
}

/// Assemble the full indicator set from K-line history (most recent candle
/// last).
pub fn analyze(klines: &[Kline]) -> IndicatorSet {
    let closes: Vec<f64> = klines.iter().map(|k| k.close).collect();
    let last = closes.last().copied().unwrap_or(0.0);
    let sma_20 = sma(&closes, 20);
    let sma_50 = sma(&closes, 50);

    IndicatorSet {
        rsi: rsi(&closes, 14),
        macd: macd(&closes),
        bollinger: bollinger(&closes, 20, 2.0),
        sma_20,
        sma_50,
        atr: atr(klines, 14),
        trend: trend(last, sma_20, sma_50),
        support_levels: support_levels(&closes),
        resistance_levels: resistance_levels(&closes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candles(closes: &[f64]) -> Vec<Kline> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Kline {
                open_time: i as u64 * 3_600_000,
                open: c,
                high: c + 1.0,
                low: c - 1.0,
                close: c,
                volume: 10.0,
                close_time: (i as u64 + 1) * 3_600_000 - 1,
            })
            .collect()
    }

    #[test]
    fn rsi_neutral_on_short_series() {
        assert_eq!(rsi(&[100.0, 101.0], 14), 50.0);
    }

    #[test]
    fn rsi_saturates_on_monotonic_rise() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        assert_eq!(rsi(&closes, 14), 100.0);
    }

    #[test]
    fn rsi_low_on_monotonic_fall() {
        let closes: Vec<f64> = (0..30).map(|i| 130.0 - i as f64).collect();
        assert!(rsi(&closes, 14) < 1.0);
    }

    #[test]
    fn bollinger_bands_bracket_sma() {
        let closes: Vec<f64> = (0..40).map(|i| 100.0 + (i % 5) as f64).collect();
        let b = bollinger(&closes, 20, 2.0);
        assert!(b.lower < b.middle && b.middle < b.upper);
        assert!((b.middle - sma(&closes, 20)).abs() < 1e-9);
    }

    #[test]
    fn atr_reflects_candle_range() {
        // Every candle has high-low = 2 and |close jumps| = 0.
        let klines = candles(&[100.0; 20]);
        let a = atr(&klines, 14);
        assert!((a - 2.0).abs() < 1e-9);
    }

    #[test]
    fn volatility_relative_to_price() {
        assert!((volatility_pct(350.0, 70_000.0) - 0.5).abs() < 1e-9);
        assert_eq!(volatility_pct(350.0, 0.0), 0.0);
    }

    #[test]
    fn trend_classification() {
        assert_eq!(trend(110.0, 105.0, 100.0), Trend::StrongUp);
        assert_eq!(trend(110.0, 105.0, 108.0), Trend::MildUp);
        assert_eq!(trend(90.0, 95.0, 100.0), Trend::StrongDown);
        assert_eq!(trend(90.0, 95.0, 92.0), Trend::MildDown);
        assert_eq!(trend(100.0, 100.0, 100.0), Trend::Sideways);
    }

    #[test]
    fn support_and_resistance_pick_local_extrema() {
        // Build a series with a clear valley at 90 and a peak at 120.
        let mut closes = vec![100.0; 15];
        closes.push(90.0); // local minimum
        closes.extend(vec![100.0; 15]);
        closes.push(120.0); // local maximum
        closes.extend(vec![100.0; 15]);

        let sup = support_levels(&closes);
        let res = resistance_levels(&closes);
        assert!(sup.contains(&90.0));
        assert!(res.contains(&120.0));
    }

    #[test]
    fn extrema_window_is_symmetric() {
        // 90 has a lower close exactly 10 bars later; a ±10 bar window sees
        // it and rejects 90 as a support level.
        let mut closes = vec![100.0; 15];
        closes.push(90.0);
        closes.extend(vec![100.0; 9]);
        closes.push(80.0);
        closes.extend(vec![100.0; 15]);

        let sup = support_levels(&closes);
        assert!(sup.contains(&80.0));
        assert!(!sup.contains(&90.0));
    }

    #[test]
    fn analyze_on_empty_series_is_neutral() {
        let ind = analyze(&[]);
        assert_eq!(ind.rsi, 50.0);
        assert_eq!(ind.atr, 0.0);
        assert!(ind.support_levels.is_empty());
    }
}
