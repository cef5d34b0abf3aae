//! The decision engine — one sequential control loop over all symbols.
//!
//! Each cycle, per symbol: snapshot exchange truth, analyze the market, ask
//! the decision provider (entry mode without a position, manage mode with
//! one), validate through the risk guard, execute, and audit. Any single
//! failure — network, exchange rejection, malformed AI output — degrades
//! that symbol's evaluation and never takes the loop down.
//!
//! A failed execution puts the symbol on a 15-minute cooldown; the exchange
//! may have partially acted, so the system waits rather than re-firing. An
//! open position is still evaluated during the cooldown, restricted to
//! risk-reducing actions.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, error, info, warn};

use vela_core::config::{RiskLimits, Settings};
use vela_core::time_util::now_ms;
use vela_core::types::{Action, Decision, MarketSnapshot, Position};
use vela_exchange::Gateway;

use crate::ai::{DecisionProvider, EntryContext, ManageContext};
use crate::analyzer;
use crate::book::PositionBook;
use crate::handlers::{self, ActionContext, Outcome};
use crate::perf::{AuditLog, PerformanceTracker, TradeRecord};
use crate::risk::{self, RiskState, Verdict};

/// Trades considered for the recent win rate fed back into entry prompts.
const WIN_RATE_WINDOW: usize = 10;

/// Engine configuration, independent of the environment surface.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub symbols: Vec<String>,
    pub interval: Duration,
    pub limits: RiskLimits,
    pub initial_capital: f64,
    /// K-line interval and history depth fed to the analyzer.
    pub kline_interval: String,
    pub kline_limit: u32,
    /// Symbol cooldown after a failed execution.
    pub cooldown: Duration,
    /// Decision audit file (JSONL); `None` disables auditing.
    pub audit_path: Option<PathBuf>,
}

impl EngineConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        let limits = RiskLimits {
            max_position_pct: settings.max_position_pct,
            ..RiskLimits::default()
        };
        Self {
            symbols: settings.symbols.clone(),
            interval: Duration::from_secs(settings.interval_secs),
            limits,
            initial_capital: settings.initial_capital,
            kline_interval: "15m".to_string(),
            kline_limit: 100,
            cooldown: Duration::from_secs(900),
            audit_path: Some(PathBuf::from("logs/decisions.jsonl")),
        }
    }
}

/// The control loop over gateway, decision provider, risk guard, and
/// execution.
pub struct DecisionEngine<G, P> {
    gateway: G,
    provider: P,
    config: EngineConfig,
    book: PositionBook,
    risk: RiskState,
    perf: PerformanceTracker,
    audit: Option<AuditLog>,
    cycle: u64,
}

impl<G: Gateway, P: DecisionProvider> DecisionEngine<G, P> {
    pub fn new(gateway: G, provider: P, config: EngineConfig) -> Result<Self> {
        let audit = match &config.audit_path {
            Some(path) => Some(AuditLog::open(path).context("opening decision audit log")?),
            None => None,
        };
        let risk = RiskState::new(config.initial_capital, now_ms());
        Ok(Self {
            gateway,
            provider,
            config,
            book: PositionBook::new(),
            risk,
            perf: PerformanceTracker::new(),
            audit,
            cycle: 0,
        })
    }

    pub fn performance(&self) -> &PerformanceTracker {
        &self.perf
    }

    /// Run forever. Cycle failures are logged and the loop continues; the
    /// caller decides when to stop (typically via `select!` with a shutdown
    /// signal).
    pub async fn run(&mut self) {
        info!(
            "engine started: {} symbols, {}s interval",
            self.config.symbols.len(),
            self.config.interval.as_secs(),
        );
        loop {
            if let Err(e) = self.run_cycle().await {
                error!("cycle {} failed: {e:#}", self.cycle);
            }
            tokio::time::sleep(self.config.interval).await;
        }
    }

    /// One pass over all symbols.
    pub async fn run_cycle(&mut self) -> Result<()> {
        self.cycle += 1;
        let now = now_ms();
        self.risk.roll_day(now);

        let account = self.gateway.account().await.context("account snapshot")?;
        self.risk.observe_equity(account.equity());
        self.perf.record_equity(now, account.equity());
        debug!(
            "cycle {}: equity={:.2} available={:.2} positions={}",
            self.cycle,
            account.equity(),
            account.available_balance,
            account.open_positions,
        );

        // Symbols are evaluated sequentially; one symbol's failure must not
        // starve the rest.
        let symbols = self.config.symbols.clone();
        for symbol in &symbols {
            if let Err(e) = self.evaluate_symbol(symbol).await {
                error!("[{symbol}] evaluation failed: {e:#}");
            }
        }

        if self.cycle % 12 == 0 {
            self.perf.log_summary();
        }
        Ok(())
    }

    /// Evaluate one symbol: snapshot, decide, validate, execute, audit.
    async fn evaluate_symbol(&mut self, symbol: &str) -> Result<()> {
        let now = now_ms();
        let cooling = self.book.in_cooldown(symbol, now);

        // Exchange truth, fresh for this symbol.
        let account = self.gateway.account().await.context("account snapshot")?;
        let market = self.market_snapshot(symbol).await.context("market snapshot")?;
        let mut position = self
            .gateway
            .positions(Some(symbol))
            .await
            .context("position query")?
            .into_iter()
            .next();

        if let Some(pos) = position.clone() {
            self.book.adopt(symbol, pos.entry_price);
            // An installed take-profit ladder fires on price alone, before
            // any new decision is requested.
            if let Some(outcome) = handlers::service_tp_plan(&self.gateway, &mut self.book, &pos)
                .await
                .context("tp ladder service")?
            {
                self.settle(symbol, &pos, &outcome, now);
                position = self.resync(symbol).await?;
                if position.is_none() {
                    return Ok(());
                }
            }
        }

        // During a post-failure cooldown no new capital is committed: entry
        // evaluation is suspended entirely, while an open position is still
        // evaluated so it can be closed or de-risked.
        if cooling && position.is_none() {
            debug!("[{symbol}] in cooldown, no entry evaluation");
            return Ok(());
        }

        // Ask the provider; enforce the mode restriction on what comes back.
        let decision = match &position {
            Some(pos) => {
                let holding_hours = (now.saturating_sub(pos.opened_at)) as f64 / 3_600_000.0;
                let ctx = ManageContext { market: &market, account: &account, position: pos, holding_hours };
                let d = self.provider.decide_manage(&ctx).await.context("manage decision")?;
                if !d.action.is_management() {
                    warn!("[{symbol}] {} not allowed with an open position", d.action.label());
                    Decision::hold(format!("{} rejected: position already open", d.action.label()))
                } else if cooling
                    && !d.action.is_risk_reducing()
                    && !matches!(d.action, Action::Hold)
                {
                    info!("[{symbol}] {} deferred until cooldown ends", d.action.label());
                    Decision::hold(format!("{} deferred: symbol cooling down", d.action.label()))
                } else {
                    d
                }
            }
            None => {
                let ctx = EntryContext {
                    market: &market,
                    account: &account,
                    recent_win_rate: self.perf.recent_win_rate(WIN_RATE_WINDOW),
                };
                let d = self.provider.decide_entry(&ctx).await.context("entry decision")?;
                if !d.action.is_entry() {
                    warn!("[{symbol}] {} not allowed without a position", d.action.label());
                    Decision::hold(format!("{} rejected: no open position", d.action.label()))
                } else {
                    d
                }
            }
        };
        info!(
            "[{symbol}] decision: {} confidence={} — {}",
            decision.action.label(),
            decision.confidence,
            decision.reasoning,
        );

        // Risk gate.
        let verdict = risk::validate(
            &decision,
            &account,
            position.as_ref(),
            &self.risk,
            &self.config.limits,
        );
        if let Verdict::Reject(reason) = &verdict {
            info!("[{symbol}] rejected by risk guard: {reason}");
            self.audit(now, symbol, &decision, &format!("reject: {reason}"), "not executed");
            return Ok(());
        }

        // Execute.
        let ctx = ActionContext {
            symbol,
            account: &account,
            market: &market,
            position: position.as_ref(),
            now_ms: now,
        };
        match handlers::dispatch(&self.gateway, &mut self.book, &self.config.limits, &decision.action, &ctx)
            .await
        {
            Ok(outcome) => {
                match &outcome {
                    Outcome::Executed { detail, .. } => {
                        info!("[{symbol}] executed: {detail}");
                        if let Some(pos) = &position {
                            self.settle(symbol, pos, &outcome, now);
                        }
                        self.audit(now, symbol, &decision, "accept", &format!("executed: {detail}"));
                        // The exchange is the source of truth after any
                        // mutation.
                        self.resync(symbol).await?;
                    }
                    Outcome::Skipped { reason } => {
                        debug!("[{symbol}] skipped: {reason}");
                        self.audit(now, symbol, &decision, "accept", &format!("skipped: {reason}"));
                    }
                }
            }
            Err(e) => {
                warn!("[{symbol}] execution failed, cooling down: {e:#}");
                let until = now + self.config.cooldown.as_millis() as u64;
                self.book.start_cooldown(symbol, until);
                self.audit(now, symbol, &decision, "accept", &format!("failed: {e:#}"));
            }
        }
        Ok(())
    }

    /// Record realized PnL from an executed outcome into risk accounting and
    /// the performance log.
    fn settle(&mut self, symbol: &str, pos: &Position, outcome: &Outcome, now: u64) {
        if let Outcome::Executed { detail, realized_pnl: Some(pnl) } = outcome {
            self.risk.record_realized(*pnl, now);
            self.perf.record_trade(TradeRecord {
                symbol: symbol.to_string(),
                side: pos.side,
                pnl: *pnl,
                closed_by: detail.clone(),
                closed_at: now,
            });
        }
    }

    /// Re-read the symbol's position from the exchange and reconcile the
    /// book with it.
    async fn resync(&mut self, symbol: &str) -> Result<Option<Position>> {
        let fresh = self
            .gateway
            .positions(Some(symbol))
            .await
            .context("position resync")?
            .into_iter()
            .next();
        match &fresh {
            Some(pos) => self.book.adopt(symbol, pos.entry_price),
            None => self.book.on_close(symbol),
        }
        Ok(fresh)
    }

    /// Assemble the market snapshot the analyzer and prompts consume.
    async fn market_snapshot(&self, symbol: &str) -> Result<MarketSnapshot> {
        let klines = self
            .gateway
            .klines(symbol, &self.config.kline_interval, self.config.kline_limit)
            .await?;
        let indicators = analyzer::analyze(&klines);
        let ticker = self.gateway.ticker_24h(symbol).await?;
        let funding_rate = self.gateway.funding_rate(symbol).await?;
        Ok(MarketSnapshot {
            symbol: symbol.to_string(),
            last_price: ticker.last_price,
            change_24h_pct: ticker.change_pct,
            quote_volume_24h: ticker.quote_volume,
            funding_rate,
            indicators,
        })
    }

    fn audit(&mut self, now: u64, symbol: &str, decision: &Decision, verdict: &str, outcome: &str) {
        if let Some(log) = &mut self.audit {
            if let Err(e) = log.record(now, symbol, decision, verdict, outcome) {
                warn!("audit write failed: {e:#}");
            }
        }
    }
}
