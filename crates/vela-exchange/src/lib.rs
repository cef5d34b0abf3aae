//! # vela-exchange
//!
//! Exchange gateway for Binance USDT-margined futures.
//!
//! The [`Gateway`] trait is the seam between the decision engine and the
//! exchange: every market query and order operation the engine needs, behind
//! an async interface the tests can mock. [`binance::BinanceFutures`] is the
//! production implementation over signed `/fapi` REST.

pub mod binance;

use anyhow::Result;
use async_trait::async_trait;
use vela_core::types::{AccountSnapshot, Kline, OrderAck, OrderRequest, Position, PositionMode};

/// 24h rolling ticker statistics for one symbol.
#[derive(Debug, Clone, Copy)]
pub struct Ticker24h {
    pub last_price: f64,
    /// Price change over 24h, percent.
    pub change_pct: f64,
    /// Quote-asset (USDT) volume over 24h.
    pub quote_volume: f64,
}

/// Uniform interface over the futures exchange.
///
/// All operations take `&self`; implementations must be safe to call from a
/// single sequential loop without internal ordering assumptions. Every call
/// carries a bounded timeout — a hung exchange surfaces as an error, not a
/// stalled cycle.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Fresh account snapshot (balances, position mode, open-position count).
    async fn account(&self) -> Result<AccountSnapshot>;

    /// Open positions, optionally filtered by symbol. Flat symbols are
    /// omitted — a closed position disappears rather than reporting zero.
    async fn positions(&self, symbol: Option<&str>) -> Result<Vec<Position>>;

    /// K-line history, most recent last.
    async fn klines(&self, symbol: &str, interval: &str, limit: u32) -> Result<Vec<Kline>>;

    /// 24h rolling window statistics.
    async fn ticker_24h(&self, symbol: &str) -> Result<Ticker24h>;

    /// Current funding rate of the perpetual.
    async fn funding_rate(&self, symbol: &str) -> Result<f64>;

    /// Submit an order. Returns the exchange acknowledgement.
    async fn place_order(&self, order: &OrderRequest) -> Result<OrderAck>;

    /// Cancel all resting STOP_MARKET / TAKE_PROFIT_MARKET orders for a
    /// symbol. Used before replacing a stop — stops are replaced, never
    /// layered.
    async fn cancel_stop_orders(&self, symbol: &str) -> Result<()>;

    /// Set leverage for a symbol.
    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<()>;

    /// Whether the account is in one-way or dual-side (hedge) mode.
    async fn position_mode(&self) -> Result<PositionMode>;
}
