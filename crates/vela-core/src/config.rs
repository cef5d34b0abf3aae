//! Configuration for the Vela trading system.
//!
//! Runtime settings come from environment variables — the only external
//! configuration surface. Risk constants live in [`RiskLimits`] with sensible
//! defaults; tests and callers may override individual fields.
//!
//! Missing required variables or an empty symbol list are fatal: the loop
//! must never start with partial credentials.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::VelaError;

fn config_err(msg: String) -> anyhow::Error {
    VelaError::Config(msg).into()
}

// ---------------------------------------------------------------------------
// Settings (environment surface)
// ---------------------------------------------------------------------------

/// Application settings read from environment variables.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Binance API key.
    pub api_key: String,
    /// Binance API secret (HMAC-SHA256 signing key).
    pub api_secret: String,
    /// Route REST calls to the futures testnet.
    pub testnet: bool,
    /// AI decision API key.
    pub ai_api_key: String,
    /// AI chat-completions base URL.
    pub ai_base_url: String,
    /// Initial capital in USDT — seeds daily-loss and drawdown accounting.
    pub initial_capital: f64,
    /// Max margin per position as a percentage of available balance.
    pub max_position_pct: f64,
    /// Fallback leverage when the AI omits one.
    pub default_leverage: u32,
    /// Seconds between trading cycles.
    pub interval_secs: u64,
    /// Symbols traded, in cycle order.
    pub symbols: Vec<String>,
}

impl Settings {
    /// Read settings from the process environment.
    ///
    /// Required: `BINANCE_API_KEY`, `BINANCE_API_SECRET`, `AI_API_KEY`.
    /// Everything else has a default.
    pub fn from_env() -> Result<Self> {
        let api_key = required("BINANCE_API_KEY")?;
        let api_secret = required("BINANCE_API_SECRET")?;
        let ai_api_key = required("AI_API_KEY")?;

        let testnet = std::env::var("BINANCE_TESTNET")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let ai_base_url = std::env::var("AI_BASE_URL")
            .unwrap_or_else(|_| "https://api.deepseek.com".to_string());

        let initial_capital = parse_var("INITIAL_CAPITAL", 100.0)?;
        let max_position_pct = parse_var("MAX_POSITION_PCT", 10.0)?;
        let default_leverage = parse_var("DEFAULT_LEVERAGE", 3u32)?;
        let interval_secs = parse_var("TRADING_INTERVAL_SECONDS", 300u64)?;

        let symbols_raw =
            std::env::var("TRADING_SYMBOLS").unwrap_or_else(|_| "BTCUSDT,ETHUSDT".to_string());
        let symbols: Vec<String> = symbols_raw
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
        if symbols.is_empty() {
            return Err(config_err("TRADING_SYMBOLS resolved to an empty symbol list".into()));
        }

        if initial_capital <= 0.0 {
            return Err(config_err(format!(
                "INITIAL_CAPITAL must be positive, got {initial_capital}"
            )));
        }
        if !(0.0..=100.0).contains(&max_position_pct) {
            return Err(config_err(format!(
                "MAX_POSITION_PCT must be in 0..=100, got {max_position_pct}"
            )));
        }

        Ok(Self {
            api_key,
            api_secret,
            testnet,
            ai_api_key,
            ai_base_url,
            initial_capital,
            max_position_pct,
            default_leverage,
            interval_secs,
            symbols,
        })
    }
}

fn required(name: &str) -> Result<String> {
    let v = std::env::var(name).with_context(|| format!("missing required env var {name}"))?;
    if v.trim().is_empty() {
        return Err(config_err(format!("env var {name} is empty")));
    }
    Ok(v)
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("invalid {name}={raw}: {e}")),
        Err(_) => Ok(default),
    }
}

// ---------------------------------------------------------------------------
// RiskLimits (static risk configuration)
// ---------------------------------------------------------------------------

/// Risk limits applied by the risk guard. Not mutated at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskLimits {
    /// Max margin per position as % of available balance.
    pub max_position_pct: f64,
    /// Leverage bounds.
    pub min_leverage: u32,
    pub max_leverage: u32,
    /// Max simultaneously open positions (entry gate only).
    pub max_positions: usize,
    /// Daily realized loss limit as % of initial capital.
    pub daily_loss_limit_pct: f64,
    /// Max drawdown from peak equity, %.
    pub max_drawdown_pct: f64,
    /// Minimum notional per order, USDT.
    pub min_notional_usdt: f64,
    /// Confidence floor for standard actions.
    pub confidence_threshold: u8,
    /// Confidence floor for capital-committing actions.
    pub confidence_threshold_capital: u8,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_position_pct: 10.0,
            min_leverage: 1,
            max_leverage: 20,
            max_positions: 10,
            daily_loss_limit_pct: 5.0,
            max_drawdown_pct: 15.0,
            min_notional_usdt: 10.0,
            confidence_threshold: 65,
            confidence_threshold_capital: 75,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_limits_are_sane() {
        let limits = RiskLimits::default();
        assert!(limits.min_leverage <= limits.max_leverage);
        assert!(limits.confidence_threshold <= limits.confidence_threshold_capital);
        assert!(limits.daily_loss_limit_pct < limits.max_drawdown_pct);
    }
}
