//! # vela-runner
//!
//! Main entry point for the Vela trading system.
//!
//! Reads credentials and trading parameters from the environment, probes the
//! exchange once to fail fast on bad credentials, then hands control to the
//! decision engine until Ctrl+C.
//!
//! # Usage
//!
//! ```bash
//! BINANCE_API_KEY=... BINANCE_API_SECRET=... AI_API_KEY=... vela-runner --log-level info
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use vela_core::config::Settings;
use vela_engine::{DecisionEngine, EngineConfig};
use vela_exchange::Gateway;
use vela_exchange::binance::BinanceFutures;

/// AI-driven crypto futures trading runner.
#[derive(Parser)]
#[command(name = "vela-runner", about = "AI-driven crypto futures trading runner")]
struct Cli {
    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Optional log directory for file output.
    #[arg(long)]
    log_dir: Option<String>,

    /// Disable the decision audit file.
    #[arg(long)]
    no_audit: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Initialize logging
    vela_core::logging::init_logging(&cli.log_level, cli.log_dir.as_deref(), "vela-runner");

    // 2. Load configuration — partial credentials are fatal here, not later
    let settings = Settings::from_env().context("loading settings from environment")?;
    info!(
        "vela-runner starting — {} symbol(s), {}s interval, testnet={}",
        settings.symbols.len(),
        settings.interval_secs,
        settings.testnet,
    );

    // 3. Build the gateway and probe the account once to fail fast
    let gateway = BinanceFutures::new(
        settings.api_key.clone(),
        settings.api_secret.clone(),
        settings.testnet,
    );
    let account = gateway.account().await.context("startup account probe failed")?;
    info!(
        "exchange reachable — equity={:.2} available={:.2} mode={:?} open positions={}",
        account.equity(),
        account.available_balance,
        account.position_mode,
        account.open_positions,
    );
    if account.available_balance <= 0.0 {
        warn!("available balance is zero — entries will be skipped");
    }

    // Seed every traded symbol with the default leverage; decisions override
    // it per entry.
    for symbol in &settings.symbols {
        if let Err(e) = gateway.set_leverage(symbol, settings.default_leverage).await {
            warn!("[{symbol}] default leverage setup failed: {e:#}");
        }
    }

    // 4. Build the decision provider and engine
    let provider =
        vela_engine::ai::AiClient::new(settings.ai_api_key.clone(), settings.ai_base_url.clone());
    let mut config = EngineConfig::from_settings(&settings);
    if cli.no_audit {
        config.audit_path = None;
    }
    let mut engine = DecisionEngine::new(gateway, provider, config)?;

    // 5. Run until shutdown
    info!("engine running — press Ctrl+C to stop");
    tokio::select! {
        _ = engine.run() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    // 6. Final performance summary
    engine.performance().log_summary();
    info!("goodbye");
    Ok(())
}
