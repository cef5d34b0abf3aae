//! Performance tracking and the append-only decision audit log.
//!
//! [`PerformanceTracker`] accumulates closed trades and an equity curve in
//! memory and derives the headline statistics (win rate, profit factor,
//! Sharpe, max drawdown). [`AuditLog`] persists one JSON line per decision
//! cycle so every action the system took — or refused to take — can be
//! reconstructed after the fact.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use vela_core::types::{Decision, Side};

// ---------------------------------------------------------------------------
// Trade records and summary
// ---------------------------------------------------------------------------

/// One closed (or partially closed) trade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub symbol: String,
    pub side: Side,
    pub pnl: f64,
    /// What closed it: "CLOSE", a TP tier, a stop, etc.
    pub closed_by: String,
    pub closed_at: u64,
}

/// Point on the equity curve, sampled once per engine cycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: u64,
    pub equity: f64,
}

/// Headline statistics derived from the trade log and equity curve.
#[derive(Debug, Clone, Serialize)]
pub struct PerfSummary {
    pub trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub win_rate: f64,
    pub total_pnl: f64,
    pub profit_factor: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown_pct: f64,
}

// ---------------------------------------------------------------------------
// PerformanceTracker
// ---------------------------------------------------------------------------

/// In-memory accumulator of trading performance.
#[derive(Debug, Default)]
pub struct PerformanceTracker {
    trades: Vec<TradeRecord>,
    equity_curve: Vec<EquityPoint>,
}

impl PerformanceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_trade(&mut self, trade: TradeRecord) {
        info!(
            "[{}] trade recorded: {} pnl={:+.2} via {}",
            trade.symbol, trade.side, trade.pnl, trade.closed_by,
        );
        self.trades.push(trade);
    }

    /// Sample the equity curve. Called once per cycle with fresh account
    /// equity.
    pub fn record_equity(&mut self, timestamp: u64, equity: f64) {
        self.equity_curve.push(EquityPoint { timestamp, equity });
    }

    pub fn trade_count(&self) -> usize {
        self.trades.len()
    }

    pub fn total_pnl(&self) -> f64 {
        self.trades.iter().map(|t| t.pnl).sum()
    }

    /// Win rate over the most recent `window` trades; `None` until any trade
    /// has closed.
    pub fn recent_win_rate(&self, window: usize) -> Option<f64> {
        if self.trades.is_empty() {
            return None;
        }
        let start = self.trades.len().saturating_sub(window);
        let recent = &self.trades[start..];
        let wins = recent.iter().filter(|t| t.pnl > 0.0).count();
        Some(wins as f64 / recent.len() as f64)
    }

    /// Annualized Sharpe ratio over per-sample equity returns. Crypto trades
    /// every day, so annualization uses sqrt(365).
    pub fn sharpe_ratio(&self) -> f64 {
        let returns: Vec<f64> = self
            .equity_curve
            .windows(2)
            .filter(|w| w[0].equity > 0.0)
            .map(|w| (w[1].equity - w[0].equity) / w[0].equity)
            .collect();
        if returns.len() < 2 {
            return 0.0;
        }
        let mean = returns.iter().sum::<f64>() / returns.len() as f64;
        let var = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>()
            / (returns.len() - 1) as f64;
        let std = var.sqrt();
        if std == 0.0 {
            return 0.0;
        }
        mean / std * 365f64.sqrt()
    }

    /// Largest peak-to-trough equity drop, %.
    pub fn max_drawdown_pct(&self) -> f64 {
        let mut peak = f64::MIN;
        let mut worst = 0.0f64;
        for point in &self.equity_curve {
            peak = peak.max(point.equity);
            if peak > 0.0 {
                worst = worst.max((peak - point.equity) / peak * 100.0);
            }
        }
        worst
    }

    pub fn summary(&self) -> PerfSummary {
        let wins = self.trades.iter().filter(|t| t.pnl > 0.0).count();
        let losses = self.trades.iter().filter(|t| t.pnl < 0.0).count();
        let gross_profit: f64 = self.trades.iter().map(|t| t.pnl.max(0.0)).sum();
        let gross_loss: f64 = self.trades.iter().map(|t| (-t.pnl).max(0.0)).sum();
        PerfSummary {
            trades: self.trades.len(),
            wins,
            losses,
            win_rate: if self.trades.is_empty() {
                0.0
            } else {
                wins as f64 / self.trades.len() as f64
            },
            total_pnl: self.total_pnl(),
            profit_factor: if gross_loss > 0.0 { gross_profit / gross_loss } else { 0.0 },
            sharpe_ratio: self.sharpe_ratio(),
            max_drawdown_pct: self.max_drawdown_pct(),
        }
    }

    /// Log the summary at INFO — called on shutdown and periodically.
    pub fn log_summary(&self) {
        let s = self.summary();
        info!(
            "performance: {} trades, win rate {:.0}%, pnl {:+.2}, profit factor {:.2}, \
             sharpe {:.2}, max drawdown {:.2}%",
            s.trades,
            s.win_rate * 100.0,
            s.total_pnl,
            s.profit_factor,
            s.sharpe_ratio,
            s.max_drawdown_pct,
        );
    }
}

// ---------------------------------------------------------------------------
// AuditLog
// ---------------------------------------------------------------------------

/// Append-only JSONL audit of every decision cycle.
pub struct AuditLog {
    file: File,
}

impl AuditLog {
    /// Open (or create) the audit file in append mode.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating audit directory {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("opening audit log {}", path.display()))?;
        Ok(Self { file })
    }

    /// Record one decision cycle: the decision, the risk verdict, and what
    /// execution did with it.
    pub fn record(
        &mut self,
        timestamp: u64,
        symbol: &str,
        decision: &Decision,
        verdict: &str,
        outcome: &str,
    ) -> Result<()> {
        let line = json!({
            "timestamp": timestamp,
            "symbol": symbol,
            "decision": decision,
            "verdict": verdict,
            "outcome": outcome,
        });
        writeln!(self.file, "{line}").context("writing audit record")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trade(pnl: f64) -> TradeRecord {
        TradeRecord {
            symbol: "BTCUSDT".into(),
            side: Side::Long,
            pnl,
            closed_by: "CLOSE".into(),
            closed_at: 0,
        }
    }

    #[test]
    fn win_rate_over_recent_window() {
        let mut t = PerformanceTracker::new();
        assert!(t.recent_win_rate(10).is_none());
        for pnl in [10.0, -5.0, 20.0, 15.0] {
            t.record_trade(trade(pnl));
        }
        assert!((t.recent_win_rate(10).unwrap() - 0.75).abs() < 1e-9);
        // Window of 2 covers only the last two (both wins).
        assert!((t.recent_win_rate(2).unwrap() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn summary_profit_factor() {
        let mut t = PerformanceTracker::new();
        for pnl in [30.0, -10.0, 20.0] {
            t.record_trade(trade(pnl));
        }
        let s = t.summary();
        assert_eq!(s.trades, 3);
        assert_eq!(s.wins, 2);
        assert!((s.total_pnl - 40.0).abs() < 1e-9);
        assert!((s.profit_factor - 5.0).abs() < 1e-9);
    }

    #[test]
    fn max_drawdown_from_equity_curve() {
        let mut t = PerformanceTracker::new();
        for (ts, eq) in [(0, 100.0), (1, 120.0), (2, 90.0), (3, 110.0)] {
            t.record_equity(ts, eq);
        }
        // 120 -> 90 is a 25% drawdown.
        assert!((t.max_drawdown_pct() - 25.0).abs() < 1e-9);
    }

    #[test]
    fn sharpe_zero_without_variance() {
        let mut t = PerformanceTracker::new();
        for ts in 0..5u64 {
            t.record_equity(ts, 100.0);
        }
        assert_eq!(t.sharpe_ratio(), 0.0);
    }

    #[test]
    fn audit_log_appends_jsonl() {
        let dir = std::env::temp_dir().join(format!("vela-audit-{}", std::process::id()));
        let path = dir.join("decisions.jsonl");
        let mut log = AuditLog::open(&path).unwrap();
        log.record(1, "BTCUSDT", &Decision::hold("test"), "accept", "skipped: hold").unwrap();
        log.record(2, "BTCUSDT", &Decision::hold("test"), "accept", "skipped: hold").unwrap();
        drop(log);

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
        let first: serde_json::Value = serde_json::from_str(content.lines().next().unwrap()).unwrap();
        assert_eq!(first["symbol"], "BTCUSDT");
        assert_eq!(first["decision"]["action"], "HOLD");
        std::fs::remove_dir_all(&dir).ok();
    }
}
