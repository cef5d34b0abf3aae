//! Risk guard — the gatekeeper between a decision and its execution.
//!
//! [`validate`] is a pure function of (decision, account snapshot, position,
//! risk state, limits). It returns a [`Verdict`], never an error: a rejected
//! decision is normal control flow, logged and degraded to HOLD by the
//! engine. Checks run in a fixed order and short-circuit on the first
//! failure.
//!
//! Risk-reducing actions (CLOSE, MULTI_TP, MOVE_SL_BREAKEVEN, ATR_STOP) stay
//! allowed under the daily-loss and drawdown blocks — a losing day must
//! never lock the operator out of reducing exposure.

use serde::{Deserialize, Serialize};

use vela_core::config::RiskLimits;
use vela_core::time_util::utc_day;
use vela_core::types::{AccountSnapshot, Action, Decision, Position};

// ---------------------------------------------------------------------------
// Verdict
// ---------------------------------------------------------------------------

/// Outcome of a risk check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    /// Human-readable reason, for logging only.
    Reject(String),
}

impl Verdict {
    pub fn is_accept(&self) -> bool {
        matches!(self, Self::Accept)
    }

    fn reject(reason: impl Into<String>) -> Self {
        Self::Reject(reason.into())
    }
}

// ---------------------------------------------------------------------------
// RiskState
// ---------------------------------------------------------------------------

/// Mutable risk accounting the guard reads: daily realized PnL and peak
/// equity. Updated by the engine after executions, rolled at UTC midnight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskState {
    pub initial_capital: f64,
    pub daily_realized_pnl: f64,
    pub peak_equity: f64,
    /// UTC day index of the last daily reset.
    day: u64,
}

impl RiskState {
    pub fn new(initial_capital: f64, now_ms: u64) -> Self {
        Self {
            initial_capital,
            daily_realized_pnl: 0.0,
            peak_equity: initial_capital,
            day: utc_day(now_ms),
        }
    }

    /// Record realized PnL from a closed or reduced position.
    pub fn record_realized(&mut self, pnl: f64, now_ms: u64) {
        self.roll_day(now_ms);
        self.daily_realized_pnl += pnl;
    }

    /// Track peak equity for drawdown computation.
    pub fn observe_equity(&mut self, equity: f64) {
        if equity > self.peak_equity {
            self.peak_equity = equity;
        }
    }

    /// Reset daily accounting when the UTC day changes.
    pub fn roll_day(&mut self, now_ms: u64) {
        let today = utc_day(now_ms);
        if today != self.day {
            self.day = today;
            self.daily_realized_pnl = 0.0;
        }
    }

    /// Today's realized loss as % of initial capital (0 when profitable).
    pub fn daily_loss_pct(&self) -> f64 {
        if self.daily_realized_pnl >= 0.0 || self.initial_capital <= 0.0 {
            0.0
        } else {
            -self.daily_realized_pnl / self.initial_capital * 100.0
        }
    }

    /// Current drawdown from peak equity, %.
    pub fn drawdown_pct(&self, equity: f64) -> f64 {
        if self.peak_equity <= 0.0 {
            return 0.0;
        }
        ((self.peak_equity - equity) / self.peak_equity * 100.0).max(0.0)
    }
}

// ---------------------------------------------------------------------------
// Margin requirement per action
// ---------------------------------------------------------------------------

/// Margin a capital-committing action would consume, USDT.
///
/// Returns 0 for actions that commit no new capital.
pub fn required_margin(
    action: &Action,
    account: &AccountSnapshot,
    position: Option<&Position>,
) -> f64 {
    match action {
        Action::Buy(p) | Action::Sell(p) => {
            account.available_balance * p.position_size_pct / 100.0
        }
        Action::FundingArb(p) => account.available_balance * p.position_size_pct / 100.0,
        // ROLL commits half the unrealized profit as fresh margin.
        Action::Roll(_) => position.map(|pos| pos.unrealized_pnl * 0.5).unwrap_or(0.0).max(0.0),
        Action::Pyramid(p) => {
            let level = position.map(|pos| pos.pyramid_level).unwrap_or(0);
            let size = p.base_size_usdt * p.reduction_factor.powi(level as i32);
            let leverage = position.map(|pos| pos.leverage.max(1)).unwrap_or(1);
            size / leverage as f64
        }
        Action::Hedge { hedge_ratio } => position
            .map(|pos| pos.notional() * hedge_ratio / pos.leverage.max(1) as f64)
            .unwrap_or(0.0),
        Action::Rebalance { target_size_usdt } => position
            .map(|pos| {
                let delta = target_size_usdt - pos.notional();
                if delta > 0.0 { delta / pos.leverage.max(1) as f64 } else { 0.0 }
            })
            .unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Leverage an action requests, if it carries one.
fn requested_leverage(action: &Action) -> Option<u32> {
    match action {
        Action::Buy(p) | Action::Sell(p) => Some(p.leverage),
        Action::Roll(p) => Some(p.leverage),
        Action::AdjustLeverage { leverage } => Some(*leverage),
        Action::FundingArb(p) => Some(p.leverage),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// validate
// ---------------------------------------------------------------------------

/// Validate a decision against account state and risk limits.
///
/// Check order (short-circuit on first failure):
/// 1. confidence floor for the action class
/// 2. dual-side mode for HEDGE / FUNDING_ARB
/// 3. margin ceiling for capital-committing actions
/// 4. leverage bounds
/// 5. max concurrent positions (entry actions only)
/// 6. daily-loss block (risk-reducing actions exempt)
/// 7. drawdown block (risk-reducing actions exempt)
pub fn validate(
    decision: &Decision,
    account: &AccountSnapshot,
    position: Option<&Position>,
    state: &RiskState,
    limits: &RiskLimits,
) -> Verdict {
    let action = &decision.action;

    // HOLD is a no-op; nothing to guard.
    if matches!(action, Action::Hold) {
        return Verdict::Accept;
    }

    // 1. Confidence floor.
    let threshold = if action.commits_capital() {
        limits.confidence_threshold_capital
    } else {
        limits.confidence_threshold
    };
    if decision.confidence < threshold {
        return Verdict::reject(format!(
            "confidence {} below threshold {threshold} for {}",
            decision.confidence,
            action.label(),
        ));
    }

    // 2. Account-mode gate for dual-side strategies.
    if action.requires_hedge_mode()
        && account.position_mode != vela_core::types::PositionMode::Hedge
    {
        return Verdict::reject(format!(
            "{} requires dual-side position mode",
            action.label()
        ));
    }

    // 3. Margin ceiling.
    if action.commits_capital() {
        let margin = required_margin(action, account, position);
        let ceiling = account.available_balance * limits.max_position_pct / 100.0;
        if margin > ceiling {
            return Verdict::reject(format!(
                "required margin {margin:.2} exceeds ceiling {ceiling:.2} \
                 ({}% of available balance)",
                limits.max_position_pct,
            ));
        }
    }

    // 4. Leverage bounds.
    if let Some(leverage) = requested_leverage(action) {
        if leverage < limits.min_leverage || leverage > limits.max_leverage {
            return Verdict::reject(format!(
                "leverage {leverage}x outside [{}, {}]",
                limits.min_leverage, limits.max_leverage,
            ));
        }
    }

    // 5. Concurrency cap — entry actions only.
    if matches!(action, Action::Buy(_) | Action::Sell(_) | Action::FundingArb(_))
        && account.open_positions >= limits.max_positions
    {
        return Verdict::reject(format!(
            "max concurrent positions reached ({}/{})",
            account.open_positions, limits.max_positions,
        ));
    }

    // 6. Daily-loss block.
    if !action.is_risk_reducing() && state.daily_loss_pct() >= limits.daily_loss_limit_pct {
        return Verdict::reject(format!(
            "daily loss {:.2}% at or over limit {:.2}%",
            state.daily_loss_pct(),
            limits.daily_loss_limit_pct,
        ));
    }

    // 7. Drawdown block.
    let drawdown = state.drawdown_pct(account.equity());
    if !action.is_risk_reducing() && drawdown >= limits.max_drawdown_pct {
        return Verdict::reject(format!(
            "drawdown {drawdown:.2}% at or over limit {:.2}%",
            limits.max_drawdown_pct,
        ));
    }

    Verdict::Accept
}

#[cfg(test)]
mod tests {
    use super::*;
    use vela_core::types::{EntryParams, PositionMode, Side};

    fn account(available: f64) -> AccountSnapshot {
        AccountSnapshot {
            wallet_balance: available,
            margin_balance: available,
            available_balance: available,
            total_unrealized_pnl: 0.0,
            position_mode: PositionMode::OneWay,
            open_positions: 0,
        }
    }

    fn state(capital: f64) -> RiskState {
        RiskState::new(capital, 0)
    }

    fn buy(confidence: u8, size_pct: f64, leverage: u32) -> Decision {
        Decision {
            action: Action::Buy(EntryParams {
                position_size_pct: size_pct,
                leverage,
                stop_loss_pct: 2.0,
                take_profit_pct: 4.0,
            }),
            confidence,
            reasoning: String::new(),
        }
    }

    fn position(pnl: f64, pnl_pct: f64) -> Position {
        Position {
            symbol: "BTCUSDT".into(),
            side: Side::Long,
            entry_price: 100.0,
            current_price: 100.0 + pnl_pct,
            quantity: 1.0,
            leverage: 3,
            unrealized_pnl: pnl,
            unrealized_pnl_pct: pnl_pct,
            opened_at: 0,
            stop_loss_price: None,
            take_profit_price: None,
            pyramid_level: 0,
            roll_count: 0,
        }
    }

    // P1: confidence below threshold always rejects, regardless of other fields.
    #[test]
    fn low_confidence_rejects_everything_else_aside() {
        let limits = RiskLimits::default();
        let acct = account(10_000.0);
        let st = state(10_000.0);
        let d = buy(50, 1.0, 2); // tiny size, sane leverage — still rejected
        assert!(!validate(&d, &acct, None, &st, &limits).is_accept());

        let close = Decision { action: Action::Close, confidence: 10, reasoning: String::new() };
        assert!(!validate(&close, &acct, None, &st, &limits).is_accept());
    }

    // Scenario 1: BUY 5% with 10% cap and conf 80 is accepted.
    #[test]
    fn entry_within_margin_ceiling_accepted() {
        let limits = RiskLimits::default();
        let acct = account(1000.0);
        let st = state(1000.0);
        let d = buy(80, 5.0, 3);
        assert!(validate(&d, &acct, None, &st, &limits).is_accept());
    }

    // P6: margin above the ceiling is rejected.
    #[test]
    fn entry_over_margin_ceiling_rejected() {
        let limits = RiskLimits::default();
        let acct = account(1000.0);
        let st = state(1000.0);
        let d = buy(95, 25.0, 3); // 25% > 10% cap
        let v = validate(&d, &acct, None, &st, &limits);
        assert!(matches!(v, Verdict::Reject(ref r) if r.contains("margin")));
    }

    #[test]
    fn leverage_out_of_bounds_rejected() {
        let mut limits = RiskLimits::default();
        limits.max_leverage = 10;
        let acct = account(1000.0);
        let st = state(1000.0);
        let d = buy(90, 5.0, 15);
        assert!(!validate(&d, &acct, None, &st, &limits).is_accept());
    }

    #[test]
    fn max_positions_blocks_entries_only() {
        let limits = RiskLimits::default();
        let mut acct = account(1000.0);
        acct.open_positions = limits.max_positions;
        let st = state(1000.0);

        let d = buy(90, 5.0, 3);
        assert!(!validate(&d, &acct, None, &st, &limits).is_accept());

        // Management of an existing position is not entry-gated.
        let close = Decision { action: Action::Close, confidence: 80, reasoning: String::new() };
        assert!(validate(&close, &acct, Some(&position(0.0, 0.0)), &st, &limits).is_accept());
    }

    // Scenario 4: daily loss over the limit blocks BUY but not CLOSE.
    #[test]
    fn daily_loss_blocks_capital_but_not_close() {
        let limits = RiskLimits::default();
        let acct = account(1000.0);
        let mut st = state(1000.0);
        st.record_realized(-60.0, 0); // 6% of 1000 > 5% limit

        let d = buy(90, 5.0, 3);
        let v = validate(&d, &acct, None, &st, &limits);
        assert!(matches!(v, Verdict::Reject(ref r) if r.contains("daily loss")));

        let close = Decision { action: Action::Close, confidence: 80, reasoning: String::new() };
        assert!(validate(&close, &acct, Some(&position(-60.0, -6.0)), &st, &limits).is_accept());
    }

    #[test]
    fn drawdown_blocks_capital_but_not_risk_reducers() {
        let limits = RiskLimits::default();
        let mut st = state(1000.0);
        st.observe_equity(1000.0);
        let acct = account(800.0); // 20% below the 1000 peak, > 15% limit

        let d = buy(90, 5.0, 3);
        assert!(!validate(&d, &acct, None, &st, &limits).is_accept());

        let close = Decision { action: Action::Close, confidence: 80, reasoning: String::new() };
        assert!(validate(&close, &acct, Some(&position(0.0, 0.0)), &st, &limits).is_accept());
    }

    #[test]
    fn hedge_requires_dual_side_mode() {
        let limits = RiskLimits::default();
        let acct = account(1000.0); // OneWay
        let st = state(1000.0);
        let d = Decision {
            action: Action::Hedge { hedge_ratio: 0.5 },
            confidence: 90,
            reasoning: String::new(),
        };
        let v = validate(&d, &acct, Some(&position(0.0, 0.0)), &st, &limits);
        assert!(matches!(v, Verdict::Reject(ref r) if r.contains("dual-side")));

        let mut hedged = account(1000.0);
        hedged.position_mode = PositionMode::Hedge;
        assert!(validate(&d, &hedged, Some(&position(0.0, 0.0)), &st, &limits).is_accept());
    }

    #[test]
    fn daily_accounting_rolls_at_utc_midnight() {
        let mut st = state(1000.0);
        st.record_realized(-60.0, 0);
        assert!(st.daily_loss_pct() > 5.0);
        // Next UTC day: the counter resets.
        st.roll_day(86_400_000);
        assert_eq!(st.daily_loss_pct(), 0.0);
    }

    #[test]
    fn roll_margin_is_half_unrealized_profit() {
        let pos = position(40.0, 10.0);
        let acct = account(1000.0);
        let m = required_margin(
            &Action::Roll(vela_core::types::RollParams::default()),
            &acct,
            Some(&pos),
        );
        assert!((m - 20.0).abs() < 1e-9);
    }
}
