//! # vela-engine
//!
//! The decision engine: market analysis, AI decision client, risk guard,
//! action execution, and performance tracking, wired into one sequential
//! control loop per configured symbol.
//!
//! The engine is generic over [`vela_exchange::Gateway`] and
//! [`ai::DecisionProvider`] so the whole loop runs against in-memory mocks
//! in tests.

pub mod ai;
pub mod analyzer;
pub mod book;
pub mod engine;
pub mod handlers;
pub mod perf;
pub mod risk;

pub use engine::{DecisionEngine, EngineConfig};

#[cfg(test)]
pub(crate) mod testutil {
    //! In-memory gateway and scripted decision provider for engine tests.

    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
    use std::time::Duration;

    use anyhow::{Result, anyhow};
    use async_trait::async_trait;

    use vela_core::config::RiskLimits;
    use vela_core::types::{
        AccountSnapshot, Decision, Kline, OrderAck, OrderRequest, OrderType, Position,
        PositionMode, Side,
    };
    use vela_exchange::{Gateway, Ticker24h};

    use crate::ai::{DecisionProvider, EntryContext, ManageContext};
    use crate::engine::EngineConfig;

    pub fn test_config() -> EngineConfig {
        EngineConfig {
            symbols: vec!["BTCUSDT".to_string()],
            interval: Duration::from_secs(1),
            limits: RiskLimits::default(),
            initial_capital: 1000.0,
            kline_interval: "15m".to_string(),
            kline_limit: 100,
            cooldown: Duration::from_secs(900),
            audit_path: None,
        }
    }

    /// Deterministic k-line history oscillating gently around `price`.
    pub fn klines_around(price: f64) -> Vec<Kline> {
        (0..120)
            .map(|i| {
                let close = price * (1.0 + ((i % 10) as f64 - 5.0) * 0.0005);
                Kline {
                    open_time: i as u64 * 900_000,
                    open: close,
                    high: close * 1.001,
                    low: close * 0.999,
                    close,
                    volume: 100.0,
                    close_time: i as u64 * 900_000 + 899_999,
                }
            })
            .collect()
    }

    /// Gateway double: serves canned market data, records orders, and keeps
    /// a single mutable position that market orders open, reduce, or close.
    pub struct MockGateway {
        available: f64,
        klines: Vec<Kline>,
        orders: Mutex<Vec<OrderRequest>>,
        position: Mutex<Option<Position>>,
        leverage_calls: Mutex<Vec<(String, u32)>>,
        cancel_calls: AtomicUsize,
        fail_orders: AtomicBool,
        mode: Mutex<PositionMode>,
        funding: Mutex<f64>,
        next_order_id: AtomicU64,
    }

    impl MockGateway {
        pub fn new(available: f64, klines: Vec<Kline>) -> Self {
            Self {
                available,
                klines,
                orders: Mutex::new(Vec::new()),
                position: Mutex::new(None),
                leverage_calls: Mutex::new(Vec::new()),
                cancel_calls: AtomicUsize::new(0),
                fail_orders: AtomicBool::new(false),
                mode: Mutex::new(PositionMode::OneWay),
                funding: Mutex::new(0.0001),
                next_order_id: AtomicU64::new(1),
            }
        }

        pub fn long_position(symbol: &str, entry: f64, quantity: f64, pnl_pct: f64) -> Position {
            let current = entry * (1.0 + pnl_pct / 100.0);
            Position {
                symbol: symbol.to_string(),
                side: Side::Long,
                entry_price: entry,
                current_price: current,
                quantity,
                leverage: 3,
                unrealized_pnl: quantity * entry * pnl_pct / 100.0,
                unrealized_pnl_pct: pnl_pct,
                opened_at: 0,
                stop_loss_price: None,
                take_profit_price: None,
                pyramid_level: 0,
                roll_count: 0,
            }
        }

        pub fn set_position(&self, position: Option<Position>) {
            *self.position.lock().unwrap() = position;
        }

        pub fn set_position_mode(&self, mode: PositionMode) {
            *self.mode.lock().unwrap() = mode;
        }

        pub fn set_funding_rate(&self, rate: f64) {
            *self.funding.lock().unwrap() = rate;
        }

        pub fn fail_orders(&self, fail: bool) {
            self.fail_orders.store(fail, Ordering::SeqCst);
        }

        pub fn orders(&self) -> Vec<OrderRequest> {
            self.orders.lock().unwrap().clone()
        }

        pub fn leverage_calls(&self) -> Vec<(String, u32)> {
            self.leverage_calls.lock().unwrap().clone()
        }

        pub fn cancel_calls(&self) -> usize {
            self.cancel_calls.load(Ordering::SeqCst)
        }

        fn last_price(&self) -> f64 {
            self.klines.last().map(|k| k.close).unwrap_or(0.0)
        }
    }

    #[async_trait]
    impl Gateway for MockGateway {
        async fn account(&self) -> Result<AccountSnapshot> {
            let position = self.position.lock().unwrap();
            Ok(AccountSnapshot {
                wallet_balance: self.available,
                margin_balance: self.available,
                available_balance: self.available,
                total_unrealized_pnl: position.as_ref().map(|p| p.unrealized_pnl).unwrap_or(0.0),
                position_mode: *self.mode.lock().unwrap(),
                open_positions: usize::from(position.is_some()),
            })
        }

        async fn positions(&self, symbol: Option<&str>) -> Result<Vec<Position>> {
            let position = self.position.lock().unwrap();
            Ok(position
                .iter()
                .filter(|p| symbol.is_none_or(|s| s == p.symbol))
                .cloned()
                .collect())
        }

        async fn klines(&self, _symbol: &str, _interval: &str, limit: u32) -> Result<Vec<Kline>> {
            let start = self.klines.len().saturating_sub(limit as usize);
            Ok(self.klines[start..].to_vec())
        }

        async fn ticker_24h(&self, _symbol: &str) -> Result<Ticker24h> {
            Ok(Ticker24h {
                last_price: self.last_price(),
                change_pct: 1.0,
                quote_volume: 1_000_000.0,
            })
        }

        async fn funding_rate(&self, _symbol: &str) -> Result<f64> {
            Ok(*self.funding.lock().unwrap())
        }

        async fn place_order(&self, order: &OrderRequest) -> Result<OrderAck> {
            if self.fail_orders.load(Ordering::SeqCst) {
                return Err(anyhow!("exchange rejected order"));
            }
            self.orders.lock().unwrap().push(order.clone());

            // Market orders move the single tracked position; trigger orders
            // rest and do nothing here.
            if order.order_type == OrderType::Market {
                let mut position = self.position.lock().unwrap();
                match position.as_mut() {
                    Some(pos) if order.reduce_only => {
                        if order.quantity >= pos.quantity {
                            *position = None;
                        } else {
                            pos.quantity -= order.quantity;
                        }
                    }
                    Some(pos) => pos.quantity += order.quantity,
                    None => {
                        let side = if order.side == Side::Long.entry_order() {
                            Side::Long
                        } else {
                            Side::Short
                        };
                        let price = self.last_price();
                        let mut pos =
                            Self::long_position(&order.symbol, price, order.quantity, 0.0);
                        pos.side = side;
                        *position = Some(pos);
                    }
                }
            }

            Ok(OrderAck {
                order_id: self.next_order_id.fetch_add(1, Ordering::SeqCst),
                symbol: order.symbol.clone(),
                avg_price: self.last_price(),
                executed_qty: order.quantity,
                status: "FILLED".to_string(),
            })
        }

        async fn cancel_stop_orders(&self, _symbol: &str) -> Result<()> {
            self.cancel_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<()> {
            self.leverage_calls.lock().unwrap().push((symbol.to_string(), leverage));
            Ok(())
        }

        async fn position_mode(&self) -> Result<PositionMode> {
            Ok(*self.mode.lock().unwrap())
        }
    }

    /// Decision provider that replays a fixed script, then holds.
    pub struct ScriptedProvider {
        script: Mutex<VecDeque<Decision>>,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        pub fn new(script: Vec<Decision>) -> Self {
            Self { script: Mutex::new(script.into()), calls: AtomicUsize::new(0) }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn next(&self) -> Decision {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Decision::hold("script exhausted"))
        }
    }

    #[async_trait]
    impl DecisionProvider for ScriptedProvider {
        async fn decide_entry(&self, _ctx: &EntryContext<'_>) -> Result<Decision> {
            Ok(self.next())
        }

        async fn decide_manage(&self, _ctx: &ManageContext<'_>) -> Result<Decision> {
            Ok(self.next())
        }
    }
}
