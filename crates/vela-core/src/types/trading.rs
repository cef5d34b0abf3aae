//! Trading-related data structures — positions, account snapshots, and orders.
//!
//! These types flow between the decision engine and the exchange gateway.
//! Exchange truth is authoritative: positions and snapshots are always
//! re-fetched after a mutating call, never extrapolated locally.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Sides and modes
// ---------------------------------------------------------------------------

/// Position direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// The opposite direction (used for hedging and exits).
    pub fn opposite(self) -> Self {
        match self {
            Self::Long => Self::Short,
            Self::Short => Self::Long,
        }
    }

    /// Order side that opens or adds to a position on this side.
    pub fn entry_order(self) -> OrderSide {
        match self {
            Self::Long => OrderSide::Buy,
            Self::Short => OrderSide::Sell,
        }
    }

    /// Order side that reduces or closes a position on this side.
    pub fn exit_order(self) -> OrderSide {
        match self {
            Self::Long => OrderSide::Sell,
            Self::Short => OrderSide::Buy,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Long => write!(f, "LONG"),
            Self::Short => write!(f, "SHORT"),
        }
    }
}

/// Exchange account position mode.
///
/// One-way allows a single net position per symbol; hedge (dual-side) mode
/// allows simultaneous long and short. HEDGE and FUNDING_ARB actions require
/// hedge mode and are rejected by the risk guard otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionMode {
    OneWay,
    Hedge,
}

// ---------------------------------------------------------------------------
// Position
// ---------------------------------------------------------------------------

/// One open exchange exposure.
///
/// `quantity` is always positive while the position is open; a closed
/// position is removed from the active set rather than retained at zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    /// Exchange instrument id (e.g. `"BTCUSDT"`).
    pub symbol: String,
    pub side: Side,
    /// Weighted-average entry price across all tranches.
    pub entry_price: f64,
    /// Current mark price.
    pub current_price: f64,
    /// Base-asset units, > 0 while open.
    pub quantity: f64,
    pub leverage: u32,
    pub unrealized_pnl: f64,
    /// Unrealized PnL as % of position notional.
    pub unrealized_pnl_pct: f64,
    /// Open timestamp, ms since epoch.
    pub opened_at: u64,
    pub stop_loss_price: Option<f64>,
    pub take_profit_price: Option<f64>,
    /// Count of pyramid add-on entries made so far.
    pub pyramid_level: u32,
    /// Count of profit-rolled re-entries made so far.
    pub roll_count: u32,
}

impl Position {
    /// Dollar-equivalent size before leverage.
    pub fn notional(&self) -> f64 {
        self.quantity * self.current_price
    }

}

// ---------------------------------------------------------------------------
// AccountSnapshot
// ---------------------------------------------------------------------------

/// Point-in-time view of the futures account.
///
/// Read fresh from the exchange at the start of every per-symbol evaluation
/// and after each execution — never cached across cycles, since stale
/// balances would corrupt risk checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub wallet_balance: f64,
    pub margin_balance: f64,
    pub available_balance: f64,
    pub total_unrealized_pnl: f64,
    pub position_mode: PositionMode,
    /// Number of currently open positions across all symbols.
    pub open_positions: usize,
}

impl AccountSnapshot {
    /// Equity = wallet balance plus unrealized PnL.
    pub fn equity(&self) -> f64 {
        self.wallet_balance + self.total_unrealized_pnl
    }
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

/// Buy or sell, in exchange wire terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }
}

/// Order types used by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    StopMarket,
    TakeProfitMarket,
}

impl OrderType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Market => "MARKET",
            Self::StopMarket => "STOP_MARKET",
            Self::TakeProfitMarket => "TAKE_PROFIT_MARKET",
        }
    }
}

/// An order request sent to the exchange gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    /// Base-asset quantity, already rounded to symbol precision.
    pub quantity: f64,
    /// Trigger price for STOP_MARKET / TAKE_PROFIT_MARKET.
    pub stop_price: Option<f64>,
    /// Only reduce an existing position, never open or flip.
    pub reduce_only: bool,
    /// Client-assigned order id for idempotent attribution.
    pub client_order_id: Option<String>,
}

impl OrderRequest {
    /// Plain market order.
    pub fn market(symbol: &str, side: OrderSide, quantity: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            side,
            order_type: OrderType::Market,
            quantity,
            stop_price: None,
            reduce_only: false,
            client_order_id: None,
        }
    }

    /// Reduce-only trigger order (stop-loss or take-profit).
    pub fn trigger(
        symbol: &str,
        side: OrderSide,
        order_type: OrderType,
        quantity: f64,
        stop_price: f64,
    ) -> Self {
        Self {
            symbol: symbol.to_string(),
            side,
            order_type,
            quantity,
            stop_price: Some(stop_price),
            reduce_only: true,
            client_order_id: None,
        }
    }
}

/// Exchange acknowledgement for a placed order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderAck {
    pub order_id: u64,
    pub symbol: String,
    /// Average fill price if reported, else 0 for resting trigger orders.
    pub avg_price: f64,
    pub executed_qty: f64,
    pub status: String,
}
