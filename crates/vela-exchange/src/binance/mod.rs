//! Binance USDT-margined futures REST client.
//!
//! All signed requests go through [`auth::build_signed_query`] with the
//! `X-MBX-APIKEY` header and a `recvWindow`. A `testnet` flag at construction
//! routes everything to the sandbox base URL.
//!
//! # REST endpoints
//!
//! | Operation          | Method | Path                        |
//! |--------------------|--------|-----------------------------|
//! | Account info       | GET    | `/fapi/v2/account`          |
//! | Positions          | GET    | `/fapi/v2/positionRisk`     |
//! | K-lines            | GET    | `/fapi/v1/klines`           |
//! | Ticker price       | GET    | `/fapi/v1/ticker/price`     |
//! | 24h ticker         | GET    | `/fapi/v1/ticker/24hr`      |
//! | Funding rate       | GET    | `/fapi/v1/premiumIndex`     |
//! | Place order        | POST   | `/fapi/v1/order`            |
//! | Open orders        | GET    | `/fapi/v1/openOrders`       |
//! | Cancel order       | DELETE | `/fapi/v1/order`            |
//! | Set leverage       | POST   | `/fapi/v1/leverage`         |
//! | Position mode      | GET    | `/fapi/v1/positionSide/dual`|

pub mod auth;

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use vela_core::error::VelaError;
use vela_core::time_util::now_ms;
use vela_core::types::{
    AccountSnapshot, Kline, OrderAck, OrderRequest, OrderType, Position, PositionMode, Side,
};

use crate::{Gateway, Ticker24h};

const MAINNET_URL: &str = "https://fapi.binance.com";
const TESTNET_URL: &str = "https://testnet.binancefuture.com";

/// Binance futures gateway over signed `/fapi` REST.
pub struct BinanceFutures {
    http: reqwest::Client,
    api_key: String,
    secret_key: String,
    base_url: String,
    /// `recvWindow` for signed requests, ms.
    recv_window: u64,
}

impl BinanceFutures {
    /// Create a new client. `testnet` routes to the sandbox endpoint.
    pub fn new(api_key: String, secret_key: String, testnet: bool) -> Self {
        let base_url = if testnet { TESTNET_URL } else { MAINNET_URL }.to_string();
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("reqwest client construction cannot fail with static config");
        Self { http, api_key, secret_key, base_url, recv_window: 5_000 }
    }

    /// Override the base URL (tests against a local mock server).
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    // -----------------------------------------------------------------------
    // Request plumbing
    // -----------------------------------------------------------------------

    async fn get_public(&self, path: &str, params: &[(&str, &str)]) -> Result<Value> {
        let url = format!("{}{path}", self.base_url);
        let resp = self
            .http
            .get(&url)
            .query(params)
            .send()
            .await
            .with_context(|| format!("GET {path} request failed"))?
            .error_for_status()
            .with_context(|| format!("GET {path} HTTP error"))?;
        Ok(resp.json().await?)
    }

    async fn signed(&self, method: reqwest::Method, path: &str, params: &[(&str, &str)]) -> Result<Value> {
        let timestamp = now_ms().to_string();
        let recv_str = self.recv_window.to_string();
        let mut all: Vec<(&str, &str)> = params.to_vec();
        all.push(("recvWindow", &recv_str));
        all.push(("timestamp", &timestamp));

        let query = auth::build_signed_query(&all, &self.secret_key);
        let url = format!("{}{path}?{query}", self.base_url);

        let resp = self
            .http
            .request(method.clone(), &url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await
            .with_context(|| format!("{method} {path} request failed"))?;

        let status = resp.status();
        let body: Value = resp.json().await.with_context(|| format!("{method} {path} bad body"))?;
        if !status.is_success() {
            // Binance error bodies carry {"code": -xxxx, "msg": "..."}.
            let msg = body.get("msg").and_then(Value::as_str).unwrap_or("unknown");
            let code = body.get("code").and_then(Value::as_i64).unwrap_or(0);
            return Err(VelaError::Exchange(format!(
                "{method} {path} rejected ({status}): code={code} {msg}"
            ))
            .into());
        }
        Ok(body)
    }
}

// ---------------------------------------------------------------------------
// Response parsing helpers
// ---------------------------------------------------------------------------

/// Binance returns most decimals as JSON strings; accept either form.
fn field_f64(v: &Value, key: &str) -> Result<f64> {
    let field = v.get(key).ok_or_else(|| anyhow!("missing field `{key}`"))?;
    match field {
        Value::String(s) => s.parse::<f64>().with_context(|| format!("field `{key}`={s}")),
        Value::Number(n) => n.as_f64().ok_or_else(|| anyhow!("field `{key}` not f64")),
        _ => Err(anyhow!("field `{key}` has unexpected type")),
    }
}

fn field_u64(v: &Value, key: &str) -> Result<u64> {
    v.get(key)
        .and_then(Value::as_u64)
        .ok_or_else(|| anyhow!("missing or non-integer field `{key}`"))
}

/// Parse one `/fapi/v2/positionRisk` entry. Returns `None` for flat symbols.
fn parse_position(v: &Value) -> Result<Option<Position>> {
    let amt = field_f64(v, "positionAmt")?;
    if amt == 0.0 {
        return Ok(None);
    }
    let symbol = v
        .get("symbol")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("position missing symbol"))?
        .to_string();
    let entry_price = field_f64(v, "entryPrice")?;
    let mark_price = field_f64(v, "markPrice")?;
    let unrealized_pnl = field_f64(v, "unRealizedProfit")?;
    let leverage = field_f64(v, "leverage")? as u32;
    let opened_at = field_u64(v, "updateTime").unwrap_or(0);

    let side = if amt > 0.0 { Side::Long } else { Side::Short };
    let quantity = amt.abs();
    let notional = quantity * entry_price;
    let unrealized_pnl_pct =
        if notional > 0.0 { unrealized_pnl / notional * 100.0 } else { 0.0 };

    Ok(Some(Position {
        symbol,
        side,
        entry_price,
        current_price: mark_price,
        quantity,
        leverage,
        unrealized_pnl,
        unrealized_pnl_pct,
        opened_at,
        stop_loss_price: None,
        take_profit_price: None,
        pyramid_level: 0,
        roll_count: 0,
    }))
}

/// Parse one `/fapi/v1/klines` row (array-of-arrays, string decimals).
fn parse_kline(row: &Value) -> Result<Kline> {
    let arr = row.as_array().ok_or_else(|| anyhow!("kline row is not an array"))?;
    if arr.len() < 7 {
        return Err(anyhow!("kline row too short: {}", arr.len()));
    }
    let num = |v: &Value| -> Result<f64> {
        match v {
            Value::String(s) => Ok(s.parse::<f64>()?),
            Value::Number(n) => n.as_f64().ok_or_else(|| anyhow!("not f64")),
            _ => Err(anyhow!("unexpected kline field type")),
        }
    };
    Ok(Kline {
        open_time: arr[0].as_u64().ok_or_else(|| anyhow!("bad open_time"))?,
        open: num(&arr[1])?,
        high: num(&arr[2])?,
        low: num(&arr[3])?,
        close: num(&arr[4])?,
        volume: num(&arr[5])?,
        close_time: arr[6].as_u64().ok_or_else(|| anyhow!("bad close_time"))?,
    })
}

// ---------------------------------------------------------------------------
// Quantity / price formatting
// ---------------------------------------------------------------------------

/// Quantity decimals per symbol, following the exchange's lot-step filters
/// for the majors this system trades.
pub fn quantity_decimals(symbol: &str) -> u32 {
    if symbol.contains("BNB") || symbol.contains("SOL") || symbol.contains("DOGE") {
        1
    } else {
        3
    }
}

/// Round a quantity to the symbol's lot precision.
pub fn round_quantity(symbol: &str, quantity: f64) -> f64 {
    let scale = 10f64.powi(quantity_decimals(symbol) as i32);
    (quantity * scale).round() / scale
}

/// Round and format a quantity to the symbol's lot precision.
pub fn format_quantity(symbol: &str, quantity: f64) -> String {
    let decimals = quantity_decimals(symbol) as usize;
    format!("{quantity:.decimals$}")
}

/// Round and format a USDT price (2 decimals).
pub fn format_price(price: f64) -> String {
    format!("{price:.2}")
}

/// True if the rounded quantity collapses to zero — the account is too small
/// for the symbol's minimum lot.
pub fn quantity_is_zero(symbol: &str, quantity: f64) -> bool {
    let decimals = quantity_decimals(symbol);
    let scale = 10f64.powi(decimals as i32);
    (quantity * scale).round() == 0.0
}

// ---------------------------------------------------------------------------
// Gateway implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl Gateway for BinanceFutures {
    async fn account(&self) -> Result<AccountSnapshot> {
        let acct = self.signed(reqwest::Method::GET, "/fapi/v2/account", &[]).await?;

        let wallet_balance = field_f64(&acct, "totalWalletBalance")?;
        let margin_balance = field_f64(&acct, "totalMarginBalance")?;
        let available_balance = field_f64(&acct, "availableBalance")?;
        let total_unrealized_pnl = field_f64(&acct, "totalUnrealizedProfit")?;

        let open_positions = acct
            .get("positions")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter(|p| field_f64(p, "positionAmt").map(|a| a != 0.0).unwrap_or(false))
                    .count()
            })
            .unwrap_or(0);

        let position_mode = self.position_mode().await?;

        Ok(AccountSnapshot {
            wallet_balance,
            margin_balance,
            available_balance,
            total_unrealized_pnl,
            position_mode,
            open_positions,
        })
    }

    async fn positions(&self, symbol: Option<&str>) -> Result<Vec<Position>> {
        let mut params: Vec<(&str, &str)> = Vec::new();
        if let Some(sym) = symbol {
            params.push(("symbol", sym));
        }
        let body = self.signed(reqwest::Method::GET, "/fapi/v2/positionRisk", &params).await?;
        let arr = body.as_array().ok_or_else(|| anyhow!("positionRisk: expected array"))?;

        let mut out = Vec::new();
        for entry in arr {
            if let Some(pos) = parse_position(entry)? {
                out.push(pos);
            }
        }
        Ok(out)
    }

    async fn klines(&self, symbol: &str, interval: &str, limit: u32) -> Result<Vec<Kline>> {
        let limit_str = limit.to_string();
        let body = self
            .get_public(
                "/fapi/v1/klines",
                &[("symbol", symbol), ("interval", interval), ("limit", &limit_str)],
            )
            .await?;
        let arr = body.as_array().ok_or_else(|| anyhow!("klines: expected array"))?;
        arr.iter().map(parse_kline).collect()
    }

    async fn ticker_24h(&self, symbol: &str) -> Result<Ticker24h> {
        let body = self.get_public("/fapi/v1/ticker/24hr", &[("symbol", symbol)]).await?;
        Ok(Ticker24h {
            last_price: field_f64(&body, "lastPrice")?,
            change_pct: field_f64(&body, "priceChangePercent")?,
            quote_volume: field_f64(&body, "quoteVolume")?,
        })
    }

    async fn funding_rate(&self, symbol: &str) -> Result<f64> {
        let body = self.get_public("/fapi/v1/premiumIndex", &[("symbol", symbol)]).await?;
        field_f64(&body, "lastFundingRate")
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderAck> {
        let qty = format_quantity(&order.symbol, order.quantity);
        let stop_price = order.stop_price.map(format_price);
        let cid = order
            .client_order_id
            .clone()
            .unwrap_or_else(|| format!("vela-{}", Uuid::new_v4().simple()));

        let mut params: Vec<(&str, &str)> = vec![
            ("symbol", &order.symbol),
            ("side", order.side.as_str()),
            ("type", order.order_type.as_str()),
            ("quantity", &qty),
            ("newClientOrderId", &cid),
        ];
        if let Some(ref sp) = stop_price {
            params.push(("stopPrice", sp));
        }
        if order.reduce_only {
            params.push(("reduceOnly", "true"));
        }

        let body = self.signed(reqwest::Method::POST, "/fapi/v1/order", &params).await?;

        let ack = OrderAck {
            order_id: field_u64(&body, "orderId")?,
            symbol: order.symbol.clone(),
            avg_price: field_f64(&body, "avgPrice").unwrap_or(0.0),
            executed_qty: field_f64(&body, "executedQty").unwrap_or(0.0),
            status: body
                .get("status")
                .and_then(Value::as_str)
                .unwrap_or("UNKNOWN")
                .to_string(),
        };
        info!(
            "[{}] order placed: {} {} qty={qty} id={} status={}",
            order.symbol,
            order.side.as_str(),
            order.order_type.as_str(),
            ack.order_id,
            ack.status,
        );
        Ok(ack)
    }

    async fn cancel_stop_orders(&self, symbol: &str) -> Result<()> {
        let body = self
            .signed(reqwest::Method::GET, "/fapi/v1/openOrders", &[("symbol", symbol)])
            .await?;
        let orders = body.as_array().ok_or_else(|| anyhow!("openOrders: expected array"))?;

        for order in orders {
            let order_type = order.get("type").and_then(Value::as_str).unwrap_or("");
            if order_type != OrderType::StopMarket.as_str()
                && order_type != OrderType::TakeProfitMarket.as_str()
            {
                continue;
            }
            let order_id = field_u64(order, "orderId")?.to_string();
            match self
                .signed(
                    reqwest::Method::DELETE,
                    "/fapi/v1/order",
                    &[("symbol", symbol), ("orderId", &order_id)],
                )
                .await
            {
                Ok(_) => debug!("[{symbol}] cancelled {order_type} order {order_id}"),
                // Already-filled or already-cancelled stops are fine to skip.
                Err(e) => warn!("[{symbol}] cancel of order {order_id} failed: {e}"),
            }
        }
        Ok(())
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<()> {
        let lev = leverage.to_string();
        self.signed(
            reqwest::Method::POST,
            "/fapi/v1/leverage",
            &[("symbol", symbol), ("leverage", &lev)],
        )
        .await?;
        debug!("[{symbol}] leverage set to {leverage}x");
        Ok(())
    }

    async fn position_mode(&self) -> Result<PositionMode> {
        let body = self.signed(reqwest::Method::GET, "/fapi/v1/positionSide/dual", &[]).await?;
        let dual = body
            .get("dualSidePosition")
            .and_then(Value::as_bool)
            .ok_or_else(|| anyhow!("positionSide/dual: missing dualSidePosition"))?;
        Ok(if dual { PositionMode::Hedge } else { PositionMode::OneWay })
    }
}
