//! # vela-core
//!
//! Core crate for the Vela trading system, providing:
//!
//! - **Types** (`types`) — positions, decisions, account snapshots, market data
//! - **Configuration** (`config`) — environment-driven settings and risk limits
//! - **Error types** (`error`) — domain-specific `VelaError` via thiserror
//! - **Time utilities** (`time_util`) — millisecond timestamps
//! - **Logging** (`logging`) — tracing-based structured logging

pub mod config;
pub mod error;
pub mod logging;
pub mod time_util;
pub mod types;

// Re-export types at crate root for convenience.
pub use types::*;
