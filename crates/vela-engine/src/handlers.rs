//! Action execution against the exchange gateway.
//!
//! [`dispatch`] maps a validated [`Action`] to gateway calls. Every handler
//! separates three outcomes: [`Outcome::Executed`] (orders hit the
//! exchange), [`Outcome::Skipped`] (a local precondition failed, nothing
//! sent), and `Err` (the exchange refused or the network died — the engine
//! puts the symbol on cooldown).
//!
//! Sizing rules:
//! - entries commit `position_size_pct`% of available balance as margin,
//!   notional = margin × leverage
//! - ROLL converts half the unrealized profit into fresh margin, at most
//!   twice per position and no more often than every 3 minutes
//! - PYRAMID layers shrink geometrically and stop at `max_pyramids`
//! - quantities are rounded to the symbol's lot precision; a size that
//!   rounds to zero or falls under the minimum notional is a skip, not an
//!   error

use anyhow::Result;
use tracing::{info, warn};

use vela_core::config::RiskLimits;
use vela_core::types::{
    AccountSnapshot, Action, AtrStopParams, BreakevenParams, EntryParams, FundingArbParams,
    MarketSnapshot, MultiTpParams, OrderRequest, OrderType, Position, PyramidParams, RollParams,
    Side,
};
use vela_exchange::Gateway;
use vela_exchange::binance::{quantity_is_zero, round_quantity};

use crate::book::PositionBook;

/// Rolls allowed per position lifetime.
const MAX_ROLLS: u32 = 2;
/// Minimum spacing between rolls, ms.
const ROLL_SPACING_MS: u64 = 180_000;

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Result of executing one action.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Orders were placed. `realized_pnl` is set when the action closed or
    /// reduced exposure at a known PnL.
    Executed { detail: String, realized_pnl: Option<f64> },
    /// A local precondition failed; nothing was sent to the exchange.
    Skipped { reason: String },
}

impl Outcome {
    fn executed(detail: impl Into<String>) -> Self {
        Self::Executed { detail: detail.into(), realized_pnl: None }
    }

    fn closed(detail: impl Into<String>, pnl: f64) -> Self {
        Self::Executed { detail: detail.into(), realized_pnl: Some(pnl) }
    }

    fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped { reason: reason.into() }
    }

    pub fn is_executed(&self) -> bool {
        matches!(self, Self::Executed { .. })
    }
}

/// Everything a handler may need about the current cycle.
pub struct ActionContext<'a> {
    pub symbol: &'a str,
    pub account: &'a AccountSnapshot,
    pub market: &'a MarketSnapshot,
    pub position: Option<&'a Position>,
    pub now_ms: u64,
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Execute a validated action. HOLD is a no-op skip; management actions with
/// no open position skip rather than error (the position may have closed
/// between snapshot and execution).
pub async fn dispatch(
    gw: &dyn Gateway,
    book: &mut PositionBook,
    limits: &RiskLimits,
    action: &Action,
    ctx: &ActionContext<'_>,
) -> Result<Outcome> {
    let position = ctx.position;
    let need_position = || Outcome::skipped("no open position for symbol");

    match action {
        Action::Hold => Ok(Outcome::skipped("hold")),
        Action::Buy(p) => open_entry(gw, book, ctx, Side::Long, p, limits).await,
        Action::Sell(p) => open_entry(gw, book, ctx, Side::Short, p, limits).await,
        Action::Close => match position {
            Some(pos) => close_position(gw, book, pos).await,
            None => Ok(need_position()),
        },
        Action::Roll(p) => match position {
            Some(pos) => roll_profit(gw, book, ctx, pos, p).await,
            None => Ok(need_position()),
        },
        Action::Pyramid(p) => match position {
            Some(pos) => pyramid_add(gw, book, ctx, pos, p, limits).await,
            None => Ok(need_position()),
        },
        Action::MultiTp(p) => match position {
            Some(pos) => install_tp_ladder(gw, book, pos, p).await,
            None => Ok(need_position()),
        },
        Action::MoveSlBreakeven(p) => match position {
            Some(pos) => move_sl_breakeven(gw, pos, p).await,
            None => Ok(need_position()),
        },
        Action::AtrStop(p) => match position {
            Some(pos) => atr_stop(gw, ctx, pos, p).await,
            None => Ok(need_position()),
        },
        Action::AdjustLeverage { leverage } => {
            gw.set_leverage(ctx.symbol, *leverage).await?;
            Ok(Outcome::executed(format!("leverage set to {leverage}x")))
        }
        Action::Hedge { hedge_ratio } => match position {
            Some(pos) => hedge(gw, pos, *hedge_ratio).await,
            None => Ok(need_position()),
        },
        Action::Rebalance { target_size_usdt } => match position {
            Some(pos) => rebalance(gw, pos, *target_size_usdt, limits).await,
            None => Ok(need_position()),
        },
        Action::FundingArb(p) => funding_arb(gw, book, ctx, p, limits).await,
    }
}

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// Place protective stop-loss / take-profit triggers around a fresh fill.
/// A bracket failure leaves the position standing and is logged, not
/// propagated — the next cycle can repair the stop.
async fn place_brackets(
    gw: &dyn Gateway,
    symbol: &str,
    side: Side,
    quantity: f64,
    fill_price: f64,
    stop_loss_pct: f64,
    take_profit_pct: f64,
) {
    let (sl_price, tp_price) = match side {
        Side::Long => (
            fill_price * (1.0 - stop_loss_pct / 100.0),
            fill_price * (1.0 + take_profit_pct / 100.0),
        ),
        Side::Short => (
            fill_price * (1.0 + stop_loss_pct / 100.0),
            fill_price * (1.0 - take_profit_pct / 100.0),
        ),
    };

    let sl = OrderRequest::trigger(symbol, side.exit_order(), OrderType::StopMarket, quantity, sl_price);
    if let Err(e) = gw.place_order(&sl).await {
        warn!("[{symbol}] stop-loss placement failed: {e:#}");
    }
    let tp = OrderRequest::trigger(
        symbol,
        side.exit_order(),
        OrderType::TakeProfitMarket,
        quantity,
        tp_price,
    );
    if let Err(e) = gw.place_order(&tp).await {
        warn!("[{symbol}] take-profit placement failed: {e:#}");
    }
}

async fn open_entry(
    gw: &dyn Gateway,
    book: &mut PositionBook,
    ctx: &ActionContext<'_>,
    side: Side,
    params: &EntryParams,
    limits: &RiskLimits,
) -> Result<Outcome> {
    let price = ctx.market.last_price;
    let margin = ctx.account.available_balance * params.position_size_pct / 100.0;
    let notional = margin * params.leverage as f64;
    if notional < limits.min_notional_usdt {
        return Ok(Outcome::skipped(format!(
            "entry notional {notional:.2} below minimum {:.2}",
            limits.min_notional_usdt
        )));
    }
    let quantity = round_quantity(ctx.symbol, notional / price);
    if quantity_is_zero(ctx.symbol, quantity) {
        return Ok(Outcome::skipped("entry quantity rounds to zero lot"));
    }

    gw.set_leverage(ctx.symbol, params.leverage).await?;
    let ack = gw
        .place_order(&OrderRequest::market(ctx.symbol, side.entry_order(), quantity))
        .await?;
    let fill_price = if ack.avg_price > 0.0 { ack.avg_price } else { price };

    place_brackets(
        gw,
        ctx.symbol,
        side,
        quantity,
        fill_price,
        params.stop_loss_pct,
        params.take_profit_pct,
    )
    .await;

    book.on_open(ctx.symbol, fill_price);
    info!(
        "[{}] opened {side} qty={quantity} @ {fill_price:.2} margin={margin:.2} lev={}x",
        ctx.symbol, params.leverage,
    );
    Ok(Outcome::executed(format!("opened {side} {quantity} @ {fill_price:.2}")))
}

async fn close_position(
    gw: &dyn Gateway,
    book: &mut PositionBook,
    pos: &Position,
) -> Result<Outcome> {
    gw.cancel_stop_orders(&pos.symbol).await?;
    let mut order = OrderRequest::market(&pos.symbol, pos.side.exit_order(), pos.quantity);
    order.reduce_only = true;
    gw.place_order(&order).await?;

    book.on_close(&pos.symbol);
    info!("[{}] closed {} qty={} pnl={:+.2}", pos.symbol, pos.side, pos.quantity, pos.unrealized_pnl);
    Ok(Outcome::closed(
        format!("closed {} {} @ market", pos.side, pos.quantity),
        pos.unrealized_pnl,
    ))
}

// ---------------------------------------------------------------------------
// Profit rolling and pyramiding
// ---------------------------------------------------------------------------

async fn roll_profit(
    gw: &dyn Gateway,
    book: &mut PositionBook,
    ctx: &ActionContext<'_>,
    pos: &Position,
    params: &RollParams,
) -> Result<Outcome> {
    if pos.unrealized_pnl_pct < params.profit_threshold_pct {
        return Ok(Outcome::skipped(format!(
            "profit {:.2}% below roll threshold {:.2}%",
            pos.unrealized_pnl_pct, params.profit_threshold_pct
        )));
    }
    let rolls = book.roll_count(&pos.symbol);
    if rolls >= MAX_ROLLS {
        return Ok(Outcome::skipped(format!("roll limit reached ({rolls}/{MAX_ROLLS})")));
    }
    if let Some(since) = book.ms_since_last_roll(&pos.symbol, ctx.now_ms) {
        if since < ROLL_SPACING_MS {
            return Ok(Outcome::skipped(format!(
                "last roll {}s ago, spacing is {}s",
                since / 1000,
                ROLL_SPACING_MS / 1000
            )));
        }
    }

    // Half the unrealized profit becomes fresh margin for the added tranche.
    let margin = pos.unrealized_pnl * 0.5;
    let notional = margin * params.leverage as f64;
    let quantity = round_quantity(&pos.symbol, notional / ctx.market.last_price);
    if quantity_is_zero(&pos.symbol, quantity) {
        return Ok(Outcome::skipped("roll tranche rounds to zero lot"));
    }

    gw.place_order(&OrderRequest::market(&pos.symbol, pos.side.entry_order(), quantity))
        .await?;
    book.record_roll(&pos.symbol, ctx.now_ms);
    info!(
        "[{}] rolled {margin:.2} profit into qty={quantity} (roll {}/{MAX_ROLLS})",
        pos.symbol,
        rolls + 1,
    );
    Ok(Outcome::executed(format!("rolled profit, added {quantity}")))
}

async fn pyramid_add(
    gw: &dyn Gateway,
    book: &mut PositionBook,
    ctx: &ActionContext<'_>,
    pos: &Position,
    params: &PyramidParams,
    limits: &RiskLimits,
) -> Result<Outcome> {
    let level = book.pyramid_level(&pos.symbol);
    if level >= params.max_pyramids {
        return Ok(Outcome::skipped(format!(
            "pyramid limit reached ({level}/{})",
            params.max_pyramids
        )));
    }
    // Each layer shrinks geometrically from the base size.
    let size = params.base_size_usdt * params.reduction_factor.powi(level as i32);
    if size < limits.min_notional_usdt {
        return Ok(Outcome::skipped(format!(
            "pyramid layer {size:.2} below minimum notional {:.2}",
            limits.min_notional_usdt
        )));
    }
    let quantity = round_quantity(&pos.symbol, size / ctx.market.last_price);
    if quantity_is_zero(&pos.symbol, quantity) {
        return Ok(Outcome::skipped("pyramid layer rounds to zero lot"));
    }

    gw.place_order(&OrderRequest::market(&pos.symbol, pos.side.entry_order(), quantity))
        .await?;
    book.record_pyramid(&pos.symbol);
    info!("[{}] pyramid layer {} added: {size:.2} USDT qty={quantity}", pos.symbol, level + 1);
    Ok(Outcome::executed(format!("pyramid layer {} added", level + 1)))
}

// ---------------------------------------------------------------------------
// Take-profit ladder
// ---------------------------------------------------------------------------

/// Install (or replace) the laddered take-profit plan, then fire any tier
/// already due at the current profit level.
async fn install_tp_ladder(
    gw: &dyn Gateway,
    book: &mut PositionBook,
    pos: &Position,
    params: &MultiTpParams,
) -> Result<Outcome> {
    book.set_tp_plan(&pos.symbol, params.tiers.clone());
    match service_tp_plan(gw, book, pos).await? {
        Some(outcome) => Ok(outcome),
        None => Ok(Outcome::executed(format!("tp ladder installed ({} tiers)", params.tiers.len()))),
    }
}

/// Fire the next due tier of an installed ladder, if any. Called on every
/// cycle for positions with a plan; returns `None` when nothing is due.
pub async fn service_tp_plan(
    gw: &dyn Gateway,
    book: &mut PositionBook,
    pos: &Position,
) -> Result<Option<Outcome>> {
    let Some(plan) = book.tp_plan_mut(&pos.symbol) else { return Ok(None) };
    let Some((index, tier)) = plan.next_due(pos.unrealized_pnl_pct) else { return Ok(None) };

    let quantity = round_quantity(&pos.symbol, pos.quantity * tier.close_pct / 100.0);
    if quantity_is_zero(&pos.symbol, quantity) {
        // Remainder too small to split; burn the tier so it stops retrying.
        plan.mark_filled(index);
        return Ok(Some(Outcome::skipped("tp tier quantity rounds to zero lot")));
    }

    let mut order = OrderRequest::market(&pos.symbol, pos.side.exit_order(), quantity);
    order.reduce_only = true;
    gw.place_order(&order).await?;

    let realized = pos.unrealized_pnl * tier.close_pct / 100.0;
    let plan = book.tp_plan_mut(&pos.symbol).expect("plan installed above");
    plan.mark_filled(index);
    info!(
        "[{}] tp tier {} fired at {:.2}% profit: closed {quantity} ({:.0}%)",
        pos.symbol,
        index + 1,
        pos.unrealized_pnl_pct,
        tier.close_pct,
    );
    Ok(Some(Outcome::closed(format!("tp tier {} closed {quantity}", index + 1), realized)))
}

// ---------------------------------------------------------------------------
// Stop management
// ---------------------------------------------------------------------------

async fn move_sl_breakeven(
    gw: &dyn Gateway,
    pos: &Position,
    params: &BreakevenParams,
) -> Result<Outcome> {
    if pos.unrealized_pnl_pct < params.profit_trigger_pct {
        return Ok(Outcome::skipped(format!(
            "profit {:.2}% below breakeven trigger {:.2}%",
            pos.unrealized_pnl_pct, params.profit_trigger_pct
        )));
    }
    // Offset lands the stop slightly on the profitable side of entry.
    let offset = params.breakeven_offset_pct / 100.0;
    let stop_price = match pos.side {
        Side::Long => pos.entry_price * (1.0 + offset),
        Side::Short => pos.entry_price * (1.0 - offset),
    };

    gw.cancel_stop_orders(&pos.symbol).await?;
    let order = OrderRequest::trigger(
        &pos.symbol,
        pos.side.exit_order(),
        OrderType::StopMarket,
        pos.quantity,
        stop_price,
    );
    gw.place_order(&order).await?;
    info!("[{}] stop moved to breakeven at {stop_price:.2}", pos.symbol);
    Ok(Outcome::executed(format!("stop moved to breakeven {stop_price:.2}")))
}

async fn atr_stop(
    gw: &dyn Gateway,
    ctx: &ActionContext<'_>,
    pos: &Position,
    params: &AtrStopParams,
) -> Result<Outcome> {
    let atr = ctx.market.indicators.atr;
    if atr <= 0.0 {
        return Ok(Outcome::skipped("no ATR available"));
    }
    let distance = atr * params.atr_multiplier;
    let stop_price = match pos.side {
        Side::Long => ctx.market.last_price - distance,
        Side::Short => ctx.market.last_price + distance,
    };
    if stop_price <= 0.0 {
        return Ok(Outcome::skipped("atr stop price not positive"));
    }

    gw.cancel_stop_orders(&pos.symbol).await?;
    let order = OrderRequest::trigger(
        &pos.symbol,
        pos.side.exit_order(),
        OrderType::StopMarket,
        pos.quantity,
        stop_price,
    );
    gw.place_order(&order).await?;
    info!(
        "[{}] atr stop set at {stop_price:.2} ({}x ATR {atr:.2})",
        pos.symbol, params.atr_multiplier,
    );
    Ok(Outcome::executed(format!("atr stop set at {stop_price:.2}")))
}

// ---------------------------------------------------------------------------
// Hedging, rebalancing, funding arbitrage
// ---------------------------------------------------------------------------

async fn hedge(gw: &dyn Gateway, pos: &Position, hedge_ratio: f64) -> Result<Outcome> {
    let quantity = round_quantity(&pos.symbol, pos.quantity * hedge_ratio);
    if quantity_is_zero(&pos.symbol, quantity) {
        return Ok(Outcome::skipped("hedge quantity rounds to zero lot"));
    }
    // Opposite-side entry; legal only in dual-side mode, which the risk
    // guard verified before dispatch.
    gw.place_order(&OrderRequest::market(
        &pos.symbol,
        pos.side.opposite().entry_order(),
        quantity,
    ))
    .await?;
    info!("[{}] hedged {:.0}% of position, qty={quantity}", pos.symbol, hedge_ratio * 100.0);
    Ok(Outcome::executed(format!("hedged qty={quantity}")))
}

async fn rebalance(
    gw: &dyn Gateway,
    pos: &Position,
    target_size_usdt: f64,
    limits: &RiskLimits,
) -> Result<Outcome> {
    let delta = target_size_usdt - pos.notional();
    // Dead-band: resizing inside the minimum notional just churns fees.
    if delta.abs() < limits.min_notional_usdt {
        return Ok(Outcome::skipped(format!(
            "size delta {delta:+.2} inside dead-band {:.2}",
            limits.min_notional_usdt
        )));
    }
    let quantity = round_quantity(&pos.symbol, delta.abs() / pos.current_price);
    if quantity_is_zero(&pos.symbol, quantity) {
        return Ok(Outcome::skipped("rebalance quantity rounds to zero lot"));
    }

    let order = if delta > 0.0 {
        OrderRequest::market(&pos.symbol, pos.side.entry_order(), quantity)
    } else {
        let mut o = OrderRequest::market(&pos.symbol, pos.side.exit_order(), quantity);
        o.reduce_only = true;
        o
    };
    gw.place_order(&order).await?;
    info!("[{}] rebalanced by {delta:+.2} USDT, qty={quantity}", pos.symbol);
    Ok(Outcome::executed(format!("rebalanced {delta:+.2} USDT")))
}

async fn funding_arb(
    gw: &dyn Gateway,
    book: &mut PositionBook,
    ctx: &ActionContext<'_>,
    params: &FundingArbParams,
    limits: &RiskLimits,
) -> Result<Outcome> {
    let rate = ctx.market.funding_rate;
    if rate.abs() < params.threshold_rate {
        return Ok(Outcome::skipped(format!(
            "funding rate {rate:.6} inside threshold {:.6}",
            params.threshold_rate
        )));
    }
    // Positive funding: longs pay shorts, so take the short side (and vice
    // versa) to collect the payment.
    let side = if rate > 0.0 { Side::Short } else { Side::Long };
    let entry = EntryParams {
        position_size_pct: params.position_size_pct,
        leverage: params.leverage,
        ..EntryParams::default()
    };
    let outcome = open_entry(gw, book, ctx, side, &entry, limits).await?;
    if outcome.is_executed() {
        info!("[{}] funding arb {side} at rate {rate:.6}", ctx.symbol);
    }
    Ok(outcome)
}
