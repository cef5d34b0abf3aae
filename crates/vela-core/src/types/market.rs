//! Market data structures — candles, indicators, and per-symbol snapshots.

use serde::{Deserialize, Serialize};

/// One K-line (candlestick).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Kline {
    /// Open time, ms since epoch.
    pub open_time: u64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    /// Base-asset volume.
    pub volume: f64,
    /// Close time, ms since epoch.
    pub close_time: u64,
}

/// Five-state trend classification from price vs SMA20 vs SMA50.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    StrongUp,
    MildUp,
    Sideways,
    MildDown,
    StrongDown,
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::StrongUp => "strong uptrend",
            Self::MildUp => "mild uptrend",
            Self::Sideways => "sideways",
            Self::MildDown => "mild downtrend",
            Self::StrongDown => "strong downtrend",
        };
        f.write_str(s)
    }
}

/// MACD triple: line, signal, histogram.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Macd {
    pub line: f64,
    pub signal: f64,
    pub histogram: f64,
}

/// Bollinger bands.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bollinger {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

/// Technical indicators computed from K-line history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorSet {
    pub rsi: f64,
    pub macd: Macd,
    pub bollinger: Bollinger,
    pub sma_20: f64,
    pub sma_50: f64,
    /// Average true range over 14 periods.
    pub atr: f64,
    pub trend: Trend,
    /// Up to three recent support levels, ascending.
    pub support_levels: Vec<f64>,
    /// Up to three recent resistance levels, ascending.
    pub resistance_levels: Vec<f64>,
}

/// Everything the decision client sees about one symbol's market.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub symbol: String,
    pub last_price: f64,
    /// 24h price change, percent.
    pub change_24h_pct: f64,
    /// 24h quote-asset volume, USDT.
    pub quote_volume_24h: f64,
    /// Current funding rate of the perpetual (e.g. 0.0001 = 1 bp).
    pub funding_rate: f64,
    pub indicators: IndicatorSet,
}
