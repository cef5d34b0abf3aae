//! AI decision types — a strict tagged union over the loosely-typed JSON the
//! decision API returns.
//!
//! The AI client parses raw responses into [`Decision`] at its boundary;
//! anything malformed fails closed to [`Action::Hold`], never to a
//! capital-committing action. Downstream code only ever sees validated,
//! clamped values.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Action parameter structs
// ---------------------------------------------------------------------------

/// Parameters for opening a position (BUY / SELL / FUNDING_ARB sizing).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EntryParams {
    /// Margin to commit, % of available balance.
    pub position_size_pct: f64,
    pub leverage: u32,
    /// Stop-loss offset from entry, %.
    pub stop_loss_pct: f64,
    /// Take-profit offset from entry, %.
    pub take_profit_pct: f64,
}

impl Default for EntryParams {
    fn default() -> Self {
        Self { position_size_pct: 5.0, leverage: 3, stop_loss_pct: 2.0, take_profit_pct: 4.0 }
    }
}

/// Parameters for rolling unrealized profit into added size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RollParams {
    /// Unrealized-profit % required before a roll is permitted.
    pub profit_threshold_pct: f64,
    /// Leverage applied to the rolled tranche.
    pub leverage: u32,
}

impl Default for RollParams {
    fn default() -> Self {
        Self { profit_threshold_pct: 10.0, leverage: 2 }
    }
}

/// Parameters for a pyramid add-on layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PyramidParams {
    /// First-layer size in USDT; later layers shrink by `reduction_factor`.
    pub base_size_usdt: f64,
    pub reduction_factor: f64,
    pub max_pyramids: u32,
}

impl Default for PyramidParams {
    fn default() -> Self {
        Self { base_size_usdt: 100.0, reduction_factor: 0.5, max_pyramids: 3 }
    }
}

/// One multi-TP tier: close `close_pct` of remaining quantity once profit
/// reaches `profit_pct`. Tiers are monotonic in `profit_pct` and fire at
/// most once.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TpTier {
    pub profit_pct: f64,
    pub close_pct: f64,
}

/// Parameters for laddered take-profits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MultiTpParams {
    pub tiers: Vec<TpTier>,
}

/// Parameters for moving the stop-loss to breakeven.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BreakevenParams {
    /// Unrealized-profit % that triggers the move.
    pub profit_trigger_pct: f64,
    /// Offset from entry price, % (favorable side).
    pub breakeven_offset_pct: f64,
}

impl Default for BreakevenParams {
    fn default() -> Self {
        Self { profit_trigger_pct: 5.0, breakeven_offset_pct: 0.1 }
    }
}

/// Parameters for an ATR-adaptive stop-loss.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AtrStopParams {
    pub atr_multiplier: f64,
}

impl Default for AtrStopParams {
    fn default() -> Self {
        Self { atr_multiplier: 2.0 }
    }
}

/// Parameters for funding-rate arbitrage entries.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FundingArbParams {
    /// Absolute funding rate required (e.g. 0.01 = 1%).
    pub threshold_rate: f64,
    /// Conservative sizing for the arb leg.
    pub position_size_pct: f64,
    pub leverage: u32,
}

impl Default for FundingArbParams {
    fn default() -> Self {
        Self { threshold_rate: 0.01, position_size_pct: 3.0, leverage: 2 }
    }
}

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

/// A trading action with its parameters — the tagged union keyed by the
/// decision API's `action` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Buy(EntryParams),
    Sell(EntryParams),
    Hold,
    Close,
    Roll(RollParams),
    Pyramid(PyramidParams),
    MultiTp(MultiTpParams),
    MoveSlBreakeven(BreakevenParams),
    AtrStop(AtrStopParams),
    AdjustLeverage { leverage: u32 },
    Hedge { hedge_ratio: f64 },
    Rebalance { target_size_usdt: f64 },
    FundingArb(FundingArbParams),
}

impl Action {
    /// Wire label, matching the decision API vocabulary.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Buy(_) => "BUY",
            Self::Sell(_) => "SELL",
            Self::Hold => "HOLD",
            Self::Close => "CLOSE",
            Self::Roll(_) => "ROLL",
            Self::Pyramid(_) => "PYRAMID",
            Self::MultiTp(_) => "MULTI_TP",
            Self::MoveSlBreakeven(_) => "MOVE_SL_BREAKEVEN",
            Self::AtrStop(_) => "ATR_STOP",
            Self::AdjustLeverage { .. } => "ADJUST_LEVERAGE",
            Self::Hedge { .. } => "HEDGE",
            Self::Rebalance { .. } => "REBALANCE",
            Self::FundingArb(_) => "FUNDING_ARB",
        }
    }

    /// Allowed when no position exists for the symbol.
    pub fn is_entry(&self) -> bool {
        matches!(self, Self::Buy(_) | Self::Sell(_) | Self::Hold | Self::FundingArb(_))
    }

    /// Allowed when a position exists for the symbol.
    pub fn is_management(&self) -> bool {
        !matches!(self, Self::Buy(_) | Self::Sell(_) | Self::FundingArb(_))
    }

    /// Commits new capital (subject to the stricter confidence floor, the
    /// margin ceiling, and the daily-loss / drawdown blocks).
    pub fn commits_capital(&self) -> bool {
        matches!(
            self,
            Self::Buy(_)
                | Self::Sell(_)
                | Self::Roll(_)
                | Self::Pyramid(_)
                | Self::Hedge { .. }
                | Self::Rebalance { .. }
                | Self::FundingArb(_)
        )
    }

    /// Reduces risk; exempt from daily-loss and drawdown blocks.
    pub fn is_risk_reducing(&self) -> bool {
        matches!(
            self,
            Self::Close | Self::MultiTp(_) | Self::MoveSlBreakeven(_) | Self::AtrStop(_)
        )
    }

    /// Requires the account to be in dual-side (hedge) position mode.
    pub fn requires_hedge_mode(&self) -> bool {
        matches!(self, Self::Hedge { .. } | Self::FundingArb(_))
    }
}

// ---------------------------------------------------------------------------
// Decision
// ---------------------------------------------------------------------------

/// Output of the decision client for one symbol in one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    #[serde(flatten)]
    pub action: Action,
    /// 0..=100; below the configured threshold the decision is treated as HOLD.
    pub confidence: u8,
    /// Free text for audit and logging only — never consumed by control flow.
    pub reasoning: String,
}

impl Decision {
    /// A zero-confidence HOLD, used when parsing fails or a policy degrades
    /// an action.
    pub fn hold(reason: impl Into<String>) -> Self {
        Self { action: Action::Hold, confidence: 0, reasoning: reason.into() }
    }
}
