//! Typed error definitions for the Vela trading system.
//!
//! Provides [`VelaError`] for domain-specific faults that deserve a stable
//! type behind the `anyhow` chain: callers can downcast to distinguish an
//! exchange rejection from a decision-API failure. All variants implement
//! `std::error::Error` via `thiserror`.
//!
//! Note the error taxonomy: a rejected decision or an unmet handler
//! pre-condition is *not* an error — those travel as `Verdict::Reject` and
//! `Outcome::Skipped` values in vela-engine. `VelaError` covers actual faults.

use thiserror::Error;

/// Domain-specific errors for the Vela trading system.
#[derive(Debug, Error)]
pub enum VelaError {
    /// Configuration parsing or validation error (fatal at startup).
    #[error("config error: {0}")]
    Config(String),

    /// Exchange REST rejection (non-2xx with a Binance error body).
    #[error("exchange error: {0}")]
    Exchange(String),

    /// AI decision API returned an unusable response envelope.
    #[error("ai client error: {0}")]
    AiClient(String),
}
