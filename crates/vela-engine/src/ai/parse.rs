//! Strict parsing of decision-API responses.
//!
//! The model returns prose wrapped around (hopefully) one JSON object. We
//! extract the outermost `{...}` span, deserialize into a loose raw form,
//! then validate into the typed [`Decision`]. Every failure path — no JSON,
//! bad JSON, unknown action, missing required parameters, non-monotonic TP
//! tiers — degrades to a zero-confidence HOLD with a warning; parsing never
//! yields a capital-committing action it cannot fully validate.

use serde::Deserialize;
use tracing::warn;

use vela_core::types::{
    Action, AtrStopParams, BreakevenParams, Decision, EntryParams, FundingArbParams,
    MultiTpParams, PyramidParams, RollParams, TpTier,
};

/// Loose mirror of the flat JSON object the model emits.
#[derive(Debug, Default, Deserialize)]
struct RawDecision {
    action: Option<String>,
    confidence: Option<f64>,
    reasoning: Option<String>,
    #[serde(alias = "position_size_pct")]
    position_size: Option<f64>,
    leverage: Option<f64>,
    stop_loss_pct: Option<f64>,
    take_profit_pct: Option<f64>,
    profit_threshold_pct: Option<f64>,
    base_size_usdt: Option<f64>,
    reduction_factor: Option<f64>,
    max_pyramids: Option<f64>,
    #[serde(alias = "tiers")]
    tp_levels: Option<Vec<RawTpTier>>,
    profit_trigger_pct: Option<f64>,
    breakeven_offset_pct: Option<f64>,
    atr_multiplier: Option<f64>,
    hedge_ratio: Option<f64>,
    target_size_usdt: Option<f64>,
    threshold_rate: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawTpTier {
    profit_pct: f64,
    close_pct: f64,
}

fn clamp(v: f64, lo: f64, hi: f64) -> f64 {
    v.clamp(lo, hi)
}

/// Extract the outermost `{...}` span from a response.
fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Parse a raw model response into a validated [`Decision`].
pub fn parse_decision(response: &str) -> Decision {
    let Some(json) = extract_json(response) else {
        warn!("decision response contained no JSON object");
        return Decision::hold("no JSON object in AI response");
    };

    let raw: RawDecision = match serde_json::from_str(json) {
        Ok(raw) => raw,
        Err(e) => {
            warn!("decision JSON failed to parse: {e}");
            return Decision::hold(format!("malformed decision JSON: {e}"));
        }
    };

    let Some(action_str) = raw.action.as_deref() else {
        warn!("decision JSON missing `action`");
        return Decision::hold("decision missing action field");
    };

    let confidence = clamp(raw.confidence.unwrap_or(0.0), 0.0, 100.0) as u8;
    let reasoning = raw.reasoning.clone().unwrap_or_default();

    let entry_params = |raw: &RawDecision| {
        let d = EntryParams::default();
        EntryParams {
            position_size_pct: clamp(raw.position_size.unwrap_or(d.position_size_pct), 1.0, 100.0),
            leverage: clamp(raw.leverage.unwrap_or(d.leverage as f64), 1.0, 20.0) as u32,
            stop_loss_pct: clamp(raw.stop_loss_pct.unwrap_or(d.stop_loss_pct), 0.5, 10.0),
            take_profit_pct: clamp(raw.take_profit_pct.unwrap_or(d.take_profit_pct), 1.0, 20.0),
        }
    };

    let action = match action_str {
        "BUY" => Action::Buy(entry_params(&raw)),
        "SELL" => Action::Sell(entry_params(&raw)),
        "HOLD" => Action::Hold,
        "CLOSE" => Action::Close,
        "ROLL" => {
            let d = RollParams::default();
            Action::Roll(RollParams {
                profit_threshold_pct: clamp(
                    raw.profit_threshold_pct.unwrap_or(d.profit_threshold_pct),
                    1.0,
                    100.0,
                ),
                leverage: clamp(raw.leverage.unwrap_or(d.leverage as f64), 1.0, 20.0) as u32,
            })
        }
        "PYRAMID" => {
            let d = PyramidParams::default();
            Action::Pyramid(PyramidParams {
                base_size_usdt: raw.base_size_usdt.unwrap_or(d.base_size_usdt).max(0.0),
                reduction_factor: clamp(
                    raw.reduction_factor.unwrap_or(d.reduction_factor),
                    0.1,
                    1.0,
                ),
                max_pyramids: clamp(raw.max_pyramids.unwrap_or(d.max_pyramids as f64), 1.0, 10.0)
                    as u32,
            })
        }
        "MULTI_TP" => {
            let Some(levels) = raw.tp_levels.as_ref().filter(|l| !l.is_empty()) else {
                warn!("MULTI_TP decision missing tp_levels");
                return Decision::hold("MULTI_TP without tp_levels");
            };
            let tiers: Vec<TpTier> = levels
                .iter()
                .map(|l| TpTier {
                    profit_pct: l.profit_pct,
                    close_pct: clamp(l.close_pct, 1.0, 100.0),
                })
                .collect();
            let monotonic = tiers.windows(2).all(|w| w[0].profit_pct < w[1].profit_pct);
            if !monotonic || tiers.iter().any(|t| t.profit_pct <= 0.0) {
                warn!("MULTI_TP tiers not strictly increasing");
                return Decision::hold("MULTI_TP tiers must be strictly increasing");
            }
            Action::MultiTp(MultiTpParams { tiers })
        }
        "MOVE_SL_BREAKEVEN" => {
            let d = BreakevenParams::default();
            Action::MoveSlBreakeven(BreakevenParams {
                profit_trigger_pct: clamp(
                    raw.profit_trigger_pct.unwrap_or(d.profit_trigger_pct),
                    0.5,
                    100.0,
                ),
                breakeven_offset_pct: clamp(
                    raw.breakeven_offset_pct.unwrap_or(d.breakeven_offset_pct),
                    0.0,
                    5.0,
                ),
            })
        }
        "ATR_STOP" => {
            let d = AtrStopParams::default();
            Action::AtrStop(AtrStopParams {
                atr_multiplier: clamp(raw.atr_multiplier.unwrap_or(d.atr_multiplier), 0.5, 5.0),
            })
        }
        "ADJUST_LEVERAGE" => {
            let Some(lev) = raw.leverage else {
                warn!("ADJUST_LEVERAGE decision missing leverage");
                return Decision::hold("ADJUST_LEVERAGE without leverage");
            };
            Action::AdjustLeverage { leverage: clamp(lev, 1.0, 20.0) as u32 }
        }
        "HEDGE" => {
            let Some(ratio) = raw.hedge_ratio else {
                warn!("HEDGE decision missing hedge_ratio");
                return Decision::hold("HEDGE without hedge_ratio");
            };
            Action::Hedge { hedge_ratio: clamp(ratio, 0.1, 1.0) }
        }
        "REBALANCE" => {
            let Some(target) = raw.target_size_usdt else {
                warn!("REBALANCE decision missing target_size_usdt");
                return Decision::hold("REBALANCE without target_size_usdt");
            };
            Action::Rebalance { target_size_usdt: target.max(0.0) }
        }
        "FUNDING_ARB" => {
            let d = FundingArbParams::default();
            Action::FundingArb(FundingArbParams {
                threshold_rate: raw.threshold_rate.unwrap_or(d.threshold_rate).abs(),
                position_size_pct: clamp(
                    raw.position_size.unwrap_or(d.position_size_pct),
                    1.0,
                    100.0,
                ),
                leverage: clamp(raw.leverage.unwrap_or(d.leverage as f64), 1.0, 5.0) as u32,
            })
        }
        other => {
            warn!("decision carried unknown action `{other}`");
            return Decision::hold(format!("unknown action `{other}`"));
        }
    };

    Decision { action, confidence, reasoning }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_buy_with_clamped_leverage() {
        let raw = r#"Here is my decision:
            {"action": "BUY", "confidence": 85, "reasoning": "breakout",
             "position_size": 8, "leverage": 50, "stop_loss_pct": 2, "take_profit_pct": 6}"#;
        let d = parse_decision(raw);
        match d.action {
            Action::Buy(p) => {
                assert_eq!(p.leverage, 20); // clamped from 50
                assert!((p.position_size_pct - 8.0).abs() < 1e-9);
            }
            other => panic!("expected BUY, got {other:?}"),
        }
        assert_eq!(d.confidence, 85);
    }

    #[test]
    fn missing_json_falls_to_hold() {
        let d = parse_decision("I think you should buy, probably.");
        assert_eq!(d.action, Action::Hold);
        assert_eq!(d.confidence, 0);
    }

    #[test]
    fn unknown_action_falls_to_hold() {
        let d = parse_decision(r#"{"action": "YOLO", "confidence": 99, "reasoning": "x"}"#);
        assert_eq!(d.action, Action::Hold);
    }

    #[test]
    fn buy_without_params_uses_conservative_defaults() {
        let d = parse_decision(r#"{"action": "BUY", "confidence": 70, "reasoning": "x"}"#);
        match d.action {
            Action::Buy(p) => assert_eq!(p, EntryParams::default()),
            other => panic!("expected BUY, got {other:?}"),
        }
    }

    #[test]
    fn multi_tp_requires_monotonic_tiers() {
        let ok = parse_decision(
            r#"{"action": "MULTI_TP", "confidence": 80, "reasoning": "x",
                "tp_levels": [{"profit_pct": 10, "close_pct": 30}, {"profit_pct": 20, "close_pct": 50}]}"#,
        );
        assert!(matches!(ok.action, Action::MultiTp(_)));

        let bad = parse_decision(
            r#"{"action": "MULTI_TP", "confidence": 80, "reasoning": "x",
                "tp_levels": [{"profit_pct": 20, "close_pct": 30}, {"profit_pct": 10, "close_pct": 50}]}"#,
        );
        assert_eq!(bad.action, Action::Hold);

        let empty = parse_decision(
            r#"{"action": "MULTI_TP", "confidence": 80, "reasoning": "x", "tp_levels": []}"#,
        );
        assert_eq!(empty.action, Action::Hold);
    }

    #[test]
    fn hedge_without_ratio_falls_to_hold() {
        let d = parse_decision(r#"{"action": "HEDGE", "confidence": 90, "reasoning": "x"}"#);
        assert_eq!(d.action, Action::Hold);
    }

    #[test]
    fn rebalance_requires_target() {
        let d = parse_decision(r#"{"action": "REBALANCE", "confidence": 90, "reasoning": "x"}"#);
        assert_eq!(d.action, Action::Hold);

        let ok = parse_decision(
            r#"{"action": "REBALANCE", "confidence": 90, "reasoning": "x", "target_size_usdt": 150}"#,
        );
        assert!(matches!(ok.action, Action::Rebalance { target_size_usdt } if target_size_usdt == 150.0));
    }

    #[test]
    fn confidence_clamped_to_bounds() {
        let d = parse_decision(r#"{"action": "HOLD", "confidence": 250, "reasoning": "x"}"#);
        assert_eq!(d.confidence, 100);
    }
}
