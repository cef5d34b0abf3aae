//! Per-symbol bookkeeping the exchange cannot report.
//!
//! The exchange is authoritative for balances and open positions, but it has
//! no memory of how a position got its size: roll count and timing, pyramid
//! layers, which take-profit tiers already fired, or the entry price before
//! profit-rolling averaged it away. [`PositionBook`] carries that local
//! state, keyed by symbol, plus the post-failure trade cooldown.
//!
//! A position seen on the exchange without book state (process restart) is
//! adopted with its current entry price as the original.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use vela_core::types::TpTier;

/// Laddered take-profit plan with per-tier fill tracking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TpPlan {
    pub tiers: Vec<TpTier>,
    filled: Vec<bool>,
}

impl TpPlan {
    pub fn new(tiers: Vec<TpTier>) -> Self {
        let filled = vec![false; tiers.len()];
        Self { tiers, filled }
    }

    /// Lowest unfilled tier whose profit threshold the position has reached.
    pub fn next_due(&self, profit_pct: f64) -> Option<(usize, TpTier)> {
        self.tiers
            .iter()
            .enumerate()
            .find(|(i, t)| !self.filled[*i] && profit_pct >= t.profit_pct)
            .map(|(i, t)| (i, *t))
    }

    pub fn mark_filled(&mut self, index: usize) {
        if let Some(slot) = self.filled.get_mut(index) {
            *slot = true;
        }
    }

    pub fn all_filled(&self) -> bool {
        self.filled.iter().all(|f| *f)
    }
}

/// Local state for one symbol's position lifecycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SymbolState {
    /// Entry price of the very first tranche, before rolls and pyramids
    /// moved the weighted average.
    pub original_entry_price: Option<f64>,
    pub roll_count: u32,
    /// Timestamp of the last roll, ms.
    pub last_roll_at: Option<u64>,
    pub pyramid_level: u32,
    pub tp_plan: Option<TpPlan>,
    /// No new decisions for the symbol until this timestamp, ms.
    pub cooldown_until: Option<u64>,
}

/// Book of per-symbol lifecycle state.
#[derive(Debug, Default)]
pub struct PositionBook {
    symbols: HashMap<String, SymbolState>,
}

impl PositionBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, symbol: &str) -> Option<&SymbolState> {
        self.symbols.get(symbol)
    }

    fn entry(&mut self, symbol: &str) -> &mut SymbolState {
        self.symbols.entry(symbol.to_string()).or_default()
    }

    /// Record a fresh position open.
    pub fn on_open(&mut self, symbol: &str, entry_price: f64) {
        let st = self.entry(symbol);
        st.original_entry_price = Some(entry_price);
        st.roll_count = 0;
        st.last_roll_at = None;
        st.pyramid_level = 0;
        st.tp_plan = None;
    }

    /// Adopt a position found on the exchange with no local state.
    pub fn adopt(&mut self, symbol: &str, entry_price: f64) {
        let st = self.entry(symbol);
        if st.original_entry_price.is_none() {
            st.original_entry_price = Some(entry_price);
        }
    }

    /// Clear position lifecycle state after a full close. The cooldown, if
    /// any, survives — it gates the symbol, not the position.
    pub fn on_close(&mut self, symbol: &str) {
        if let Some(st) = self.symbols.get_mut(symbol) {
            *st = SymbolState { cooldown_until: st.cooldown_until, ..SymbolState::default() };
        }
    }

    pub fn original_entry(&self, symbol: &str) -> Option<f64> {
        self.state(symbol).and_then(|s| s.original_entry_price)
    }

    // -- rolls --------------------------------------------------------------

    pub fn roll_count(&self, symbol: &str) -> u32 {
        self.state(symbol).map(|s| s.roll_count).unwrap_or(0)
    }

    /// Milliseconds since the last roll, if one happened.
    pub fn ms_since_last_roll(&self, symbol: &str, now_ms: u64) -> Option<u64> {
        self.state(symbol)
            .and_then(|s| s.last_roll_at)
            .map(|at| now_ms.saturating_sub(at))
    }

    pub fn record_roll(&mut self, symbol: &str, now_ms: u64) {
        let st = self.entry(symbol);
        st.roll_count += 1;
        st.last_roll_at = Some(now_ms);
    }

    // -- pyramids -----------------------------------------------------------

    pub fn pyramid_level(&self, symbol: &str) -> u32 {
        self.state(symbol).map(|s| s.pyramid_level).unwrap_or(0)
    }

    pub fn record_pyramid(&mut self, symbol: &str) {
        self.entry(symbol).pyramid_level += 1;
    }

    // -- take-profit ladder -------------------------------------------------

    pub fn set_tp_plan(&mut self, symbol: &str, tiers: Vec<TpTier>) {
        self.entry(symbol).tp_plan = Some(TpPlan::new(tiers));
    }

    pub fn tp_plan_mut(&mut self, symbol: &str) -> Option<&mut TpPlan> {
        self.symbols.get_mut(symbol).and_then(|s| s.tp_plan.as_mut())
    }

    // -- cooldown -----------------------------------------------------------

    pub fn start_cooldown(&mut self, symbol: &str, until_ms: u64) {
        self.entry(symbol).cooldown_until = Some(until_ms);
    }

    /// True while the symbol is under a post-failure cooldown. An expired
    /// cooldown is cleared on observation.
    pub fn in_cooldown(&mut self, symbol: &str, now_ms: u64) -> bool {
        let Some(st) = self.symbols.get_mut(symbol) else { return false };
        match st.cooldown_until {
            Some(until) if now_ms < until => true,
            Some(_) => {
                st.cooldown_until = None;
                false
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_resets_lifecycle_state() {
        let mut book = PositionBook::new();
        book.on_open("BTCUSDT", 100.0);
        book.record_roll("BTCUSDT", 1_000);
        book.record_pyramid("BTCUSDT");
        assert_eq!(book.roll_count("BTCUSDT"), 1);

        book.on_open("BTCUSDT", 105.0);
        assert_eq!(book.roll_count("BTCUSDT"), 0);
        assert_eq!(book.pyramid_level("BTCUSDT"), 0);
        assert_eq!(book.original_entry("BTCUSDT"), Some(105.0));
    }

    #[test]
    fn close_clears_state_but_keeps_cooldown() {
        let mut book = PositionBook::new();
        book.on_open("ETHUSDT", 2000.0);
        book.record_roll("ETHUSDT", 1_000);
        book.start_cooldown("ETHUSDT", 10_000);

        book.on_close("ETHUSDT");
        assert_eq!(book.roll_count("ETHUSDT"), 0);
        assert_eq!(book.original_entry("ETHUSDT"), None);
        assert!(book.in_cooldown("ETHUSDT", 5_000));
        assert!(!book.in_cooldown("ETHUSDT", 15_000));
        // Expired cooldown is cleared once observed.
        assert!(book.state("ETHUSDT").unwrap().cooldown_until.is_none());
    }

    #[test]
    fn adopt_keeps_existing_original_entry() {
        let mut book = PositionBook::new();
        book.on_open("SOLUSDT", 150.0);
        book.adopt("SOLUSDT", 160.0);
        assert_eq!(book.original_entry("SOLUSDT"), Some(150.0));

        book.adopt("DOGEUSDT", 0.2);
        assert_eq!(book.original_entry("DOGEUSDT"), Some(0.2));
    }

    #[test]
    fn tp_plan_fires_tiers_in_order_once() {
        let mut plan = TpPlan::new(vec![
            TpTier { profit_pct: 10.0, close_pct: 30.0 },
            TpTier { profit_pct: 20.0, close_pct: 50.0 },
        ]);
        assert!(plan.next_due(5.0).is_none());

        let (i, tier) = plan.next_due(12.0).unwrap();
        assert_eq!(i, 0);
        assert!((tier.close_pct - 30.0).abs() < 1e-9);
        plan.mark_filled(i);

        // Profit jumped over both thresholds: the second tier is next.
        let (i, _) = plan.next_due(25.0).unwrap();
        assert_eq!(i, 1);
        plan.mark_filled(i);
        assert!(plan.all_filled());
        assert!(plan.next_due(50.0).is_none());
    }

    #[test]
    fn roll_spacing_measured_from_last_roll() {
        let mut book = PositionBook::new();
        book.on_open("BTCUSDT", 100.0);
        assert_eq!(book.ms_since_last_roll("BTCUSDT", 5_000), None);
        book.record_roll("BTCUSDT", 60_000);
        assert_eq!(book.ms_since_last_roll("BTCUSDT", 90_000), Some(30_000));
    }
}
