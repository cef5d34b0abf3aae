//! AI decision client — structured prompts out, validated decisions in.
//!
//! [`DecisionProvider`] is the seam the engine talks through; the production
//! [`client::AiClient`] speaks an OpenAI-style chat-completions API, while
//! tests script the provider directly. Parsing is strict and fails closed:
//! a response that does not validate becomes a zero-confidence HOLD, never a
//! capital-committing action.

pub mod client;
pub mod parse;
pub mod prompt;

use anyhow::Result;
use async_trait::async_trait;
use vela_core::types::{AccountSnapshot, Decision, MarketSnapshot, Position};

pub use client::AiClient;

/// Context for an entry-mode decision (no open position for the symbol).
///
/// Allowed actions: BUY, SELL, HOLD, FUNDING_ARB.
pub struct EntryContext<'a> {
    pub market: &'a MarketSnapshot,
    pub account: &'a AccountSnapshot,
    /// Win rate over the recent closed trades, if enough history exists.
    pub recent_win_rate: Option<f64>,
}

/// Context for a position-management decision.
///
/// Allowed actions: HOLD, CLOSE, ROLL, PYRAMID, MULTI_TP, MOVE_SL_BREAKEVEN,
/// ATR_STOP, ADJUST_LEVERAGE, HEDGE, REBALANCE.
pub struct ManageContext<'a> {
    pub market: &'a MarketSnapshot,
    pub account: &'a AccountSnapshot,
    pub position: &'a Position,
    /// Hours the position has been held.
    pub holding_hours: f64,
}

/// Source of trading decisions for one symbol in one cycle.
#[async_trait]
pub trait DecisionProvider: Send + Sync {
    /// Decide whether to open a position. Network faults are `Err` (the
    /// cycle skips); malformed responses are `Ok(Decision::hold(..))`.
    async fn decide_entry(&self, ctx: &EntryContext<'_>) -> Result<Decision>;

    /// Decide how to manage an open position.
    async fn decide_manage(&self, ctx: &ManageContext<'_>) -> Result<Decision>;
}
