//! Prompt construction for the decision API.
//!
//! One system prompt per mode states the allowed action set and the exact
//! JSON schema; the user prompt carries the market snapshot, indicators, and
//! account (plus position details in manage mode). Keeping these as plain
//! string builders makes the prompts auditable in tests.

use std::fmt::Write;

use super::{EntryContext, ManageContext};

/// System prompt for entry-mode decisions.
pub const ENTRY_SYSTEM_PROMPT: &str = r#"You are the decision core of an automated crypto futures trading system.
There is currently NO open position for this symbol.

Allowed actions: "BUY", "SELL", "HOLD", "FUNDING_ARB".

Core principles:
1. Never trade against the trend.
2. Protecting capital beats chasing profit.
3. Act only on high-certainty setups.
4. Leverage never exceeds 20x.

Respond with exactly one JSON object:
{
    "action": "BUY" | "SELL" | "HOLD" | "FUNDING_ARB",
    "confidence": 0-100,
    "reasoning": "short rationale (max 100 words)",
    "position_size": 1-100,
    "leverage": 1-20,
    "stop_loss_pct": 0.5-10,
    "take_profit_pct": 1-20
}"#;

/// System prompt for position-management decisions.
pub const MANAGE_SYSTEM_PROMPT: &str = r#"You are the decision core of an automated crypto futures trading system.
There IS an open position for this symbol; decide how to manage it.

Allowed actions: "HOLD", "CLOSE", "ROLL", "PYRAMID", "MULTI_TP",
"MOVE_SL_BREAKEVEN", "ATR_STOP", "ADJUST_LEVERAGE", "HEDGE", "REBALANCE".

Respond with exactly one JSON object containing "action", "confidence"
(0-100), "reasoning", and the action's parameters:
- ROLL: "profit_threshold_pct", "leverage"
- PYRAMID: "base_size_usdt", "reduction_factor", "max_pyramids"
- MULTI_TP: "tp_levels": [{"profit_pct": .., "close_pct": ..}, ...]
- MOVE_SL_BREAKEVEN: "profit_trigger_pct", "breakeven_offset_pct"
- ATR_STOP: "atr_multiplier"
- ADJUST_LEVERAGE: "leverage"
- HEDGE: "hedge_ratio"
- REBALANCE: "target_size_usdt""#;

fn market_section(out: &mut String, ctx_market: &vela_core::types::MarketSnapshot) {
    let m = ctx_market;
    let ind = &m.indicators;
    let rsi_tag = if ind.rsi < 30.0 {
        " [oversold]"
    } else if ind.rsi > 70.0 {
        " [overbought]"
    } else {
        ""
    };
    let _ = writeln!(out, "## Market ({})", m.symbol);
    let _ = writeln!(out, "Price: ${:.2}", m.last_price);
    let _ = writeln!(out, "24h change: {:+.2}%", m.change_24h_pct);
    let _ = writeln!(out, "24h quote volume: ${:.0}", m.quote_volume_24h);
    let _ = writeln!(out, "Funding rate: {:.6}", m.funding_rate);
    let _ = writeln!(out, "\n## Indicators");
    let _ = writeln!(out, "RSI(14): {:.2}{rsi_tag}", ind.rsi);
    let _ = writeln!(
        out,
        "MACD: line={:.4} signal={:.4} histogram={:.4}",
        ind.macd.line, ind.macd.signal, ind.macd.histogram
    );
    let _ = writeln!(
        out,
        "Bollinger: upper={:.2} middle={:.2} lower={:.2}",
        ind.bollinger.upper, ind.bollinger.middle, ind.bollinger.lower
    );
    let _ = writeln!(out, "SMA20={:.2} SMA50={:.2}", ind.sma_20, ind.sma_50);
    let _ = writeln!(
        out,
        "ATR(14): {:.2} (volatility {:.2}%)",
        ind.atr,
        crate::analyzer::volatility_pct(ind.atr, m.last_price)
    );
    let _ = writeln!(out, "Trend: {}", ind.trend);
    let _ = writeln!(out, "Support: {:?}", ind.support_levels);
    let _ = writeln!(out, "Resistance: {:?}", ind.resistance_levels);
}

fn account_section(out: &mut String, account: &vela_core::types::AccountSnapshot) {
    let _ = writeln!(out, "\n## Account");
    let _ = writeln!(out, "Available balance: ${:.2}", account.available_balance);
    let _ = writeln!(out, "Open positions: {}", account.open_positions);
    let _ = writeln!(out, "Total unrealized PnL: ${:+.2}", account.total_unrealized_pnl);
}

/// Build the user prompt for an entry-mode decision.
pub fn build_entry_prompt(ctx: &EntryContext<'_>) -> String {
    let mut out = String::new();
    market_section(&mut out, ctx.market);
    account_section(&mut out, ctx.account);
    if let Some(win_rate) = ctx.recent_win_rate {
        let _ = writeln!(out, "\n## Recent performance");
        let _ = writeln!(out, "Recent win rate: {:.0}%", win_rate * 100.0);
    }
    out.push_str("\nAnalyze and decide (JSON only).");
    out
}

/// Build the user prompt for a position-management decision.
pub fn build_manage_prompt(ctx: &ManageContext<'_>) -> String {
    let mut out = String::new();
    market_section(&mut out, ctx.market);
    account_section(&mut out, ctx.account);

    let p = ctx.position;
    let _ = writeln!(out, "\n## Open position");
    let _ = writeln!(out, "Side: {}", p.side);
    let _ = writeln!(out, "Entry price: ${:.2}", p.entry_price);
    let _ = writeln!(out, "Current price: ${:.2}", p.current_price);
    let _ = writeln!(out, "Quantity: {}", p.quantity);
    let _ = writeln!(out, "Leverage: {}x", p.leverage);
    let _ = writeln!(out, "Unrealized PnL: ${:+.2} ({:+.2}%)", p.unrealized_pnl, p.unrealized_pnl_pct);
    let _ = writeln!(out, "Holding time: {:.1}h", ctx.holding_hours);
    let _ = writeln!(out, "Pyramid level: {}", p.pyramid_level);
    let _ = writeln!(out, "Roll count: {}", p.roll_count);

    out.push_str("\nEvaluate the position and decide (JSON only).");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use vela_core::types::{
        AccountSnapshot, Bollinger, IndicatorSet, Macd, MarketSnapshot, Position, PositionMode,
        Side, Trend,
    };

    fn snapshot() -> (MarketSnapshot, AccountSnapshot) {
        let market = MarketSnapshot {
            symbol: "BTCUSDT".into(),
            last_price: 60000.0,
            change_24h_pct: 1.5,
            quote_volume_24h: 1_000_000.0,
            funding_rate: 0.0001,
            indicators: IndicatorSet {
                rsi: 25.0,
                macd: Macd { line: 1.0, signal: 0.5, histogram: 0.5 },
                bollinger: Bollinger { upper: 61000.0, middle: 60000.0, lower: 59000.0 },
                sma_20: 59500.0,
                sma_50: 59000.0,
                atr: 350.0,
                trend: Trend::StrongUp,
                support_levels: vec![58000.0],
                resistance_levels: vec![62000.0],
            },
        };
        let account = AccountSnapshot {
            wallet_balance: 1000.0,
            margin_balance: 1000.0,
            available_balance: 900.0,
            total_unrealized_pnl: 12.0,
            position_mode: PositionMode::OneWay,
            open_positions: 1,
        };
        (market, account)
    }

    #[test]
    fn entry_prompt_flags_oversold_rsi() {
        let (market, account) = snapshot();
        let ctx = EntryContext { market: &market, account: &account, recent_win_rate: Some(0.6) };
        let prompt = build_entry_prompt(&ctx);
        assert!(prompt.contains("[oversold]"));
        assert!(prompt.contains("Recent win rate: 60%"));
    }

    #[test]
    fn manage_prompt_includes_position_details() {
        let (market, account) = snapshot();
        let position = Position {
            symbol: "BTCUSDT".into(),
            side: Side::Long,
            entry_price: 58000.0,
            current_price: 60000.0,
            quantity: 0.5,
            leverage: 3,
            unrealized_pnl: 1000.0,
            unrealized_pnl_pct: 3.45,
            opened_at: 0,
            stop_loss_price: None,
            take_profit_price: None,
            pyramid_level: 1,
            roll_count: 0,
        };
        let ctx = ManageContext {
            market: &market,
            account: &account,
            position: &position,
            holding_hours: 4.2,
        };
        let prompt = build_manage_prompt(&ctx);
        assert!(prompt.contains("Entry price: $58000.00"));
        assert!(prompt.contains("Holding time: 4.2h"));
        assert!(prompt.contains("Pyramid level: 1"));
    }
}
