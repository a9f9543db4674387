//! Rotation, exit and promotion decision
//!
//! At most one action per tick, selected by a fixed priority ladder. The
//! decision is deterministic over its snapshot: ties break on mint order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::config::RuntimeConfig;
use crate::ranker::RankedItem;
use crate::types::{Mint, SlotType};

/// Fixed vocabulary of decision reasons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    CircuitPause,
    TrailingStopExit,
    StaleTimeoutExit,
    StaleRotationWithReplacement,
    ScoutStopLossExit,
    CoreLossExit,
    ScoutUnderperformGraceExpired,
    TakeProfit,
    OpportunityCostRotation,
    Promotion,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::CircuitPause => "circuit_pause",
            ReasonCode::TrailingStopExit => "trailing_stop_exit",
            ReasonCode::StaleTimeoutExit => "stale_timeout_exit",
            ReasonCode::StaleRotationWithReplacement => "stale_rotation_with_replacement",
            ReasonCode::ScoutStopLossExit => "scout_stop_loss_exit",
            ReasonCode::CoreLossExit => "core_loss_exit",
            ReasonCode::ScoutUnderperformGraceExpired => "scout_underperform_grace_expired",
            ReasonCode::TakeProfit => "take_profit",
            ReasonCode::OpportunityCostRotation => "opportunity_cost_rotation",
            ReasonCode::Promotion => "promotion",
        }
    }
}

/// The single selected action for this tick
#[derive(Debug, Clone, PartialEq)]
pub enum RotationAction {
    /// Nothing fired
    Hold,
    /// Circuit tripped: orchestration halts this tick
    Pause { reason: String },
    /// Sell one held position in full
    Exit { mint: Mint, reason: ReasonCode },
    /// Sell one held position and buy a replacement in the same tick
    Rotate {
        sell: Mint,
        buy: Mint,
        reason: ReasonCode,
        rank_delta: f64,
    },
    /// Scout to core; no trade
    Promote { mint: Mint },
}

/// Append-only record of one decision
#[derive(Debug, Clone, Serialize)]
pub struct RotationLogEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Entries within one tick share this logical clock
    pub tick_seq: u64,
    pub action: String,
    pub sell_mint: Option<Mint>,
    pub buy_mint: Option<Mint>,
    pub reason_code: String,
    pub rank_delta: Option<f64>,
    pub meta: serde_json::Value,
}

/// Snapshot the decision runs over
pub struct DecisionInputs<'a> {
    pub held: &'a [RankedItem],
    pub candidates: &'a [RankedItem],
    /// Pause reason when the risk circuit is tripped
    pub circuit_paused: Option<String>,
    /// Per-mint whale net flow, when the confirm hook is wired
    pub whale_flows: &'a HashMap<Mint, f64>,
    pub now: DateTime<Utc>,
    pub tick_seq: u64,
}

#[derive(Debug, Clone)]
pub struct Decision {
    pub action: RotationAction,
    pub log: Option<RotationLogEntry>,
}

/// Run the priority ladder. First rule that fires wins.
pub fn decide(cfg: &RuntimeConfig, inputs: &DecisionInputs<'_>) -> Decision {
    // 1. Circuit pause
    if let Some(reason) = &inputs.circuit_paused {
        return Decision {
            action: RotationAction::Pause {
                reason: reason.clone(),
            },
            log: Some(log_entry(
                inputs,
                "pause",
                None,
                None,
                ReasonCode::CircuitPause,
                None,
                serde_json::json!({ "reason": reason }),
            )),
        };
    }

    // 2. Trailing-stop exit: worst-rank triggered position
    if let Some(item) = worst_rank(inputs.held, |i| i.flags.trailing_stop_triggered) {
        return exit_decision(inputs, item, ReasonCode::TrailingStopExit);
    }

    // 3. Stale exit, optionally paired with a replacement buy
    if let Some(item) = worst_rank(inputs.held, |i| i.flags.stale_exit_due) {
        let held_minimum = inputs
            .held
            .iter()
            .map(|i| i.rank)
            .fold(f64::INFINITY, f64::min);
        let replacement = best_rank(inputs.candidates, |c| {
            c.rank >= held_minimum + cfg.stale_replacement_margin
        });
        if let Some(candidate) = replacement {
            let delta = candidate.rank - item.rank;
            return Decision {
                action: RotationAction::Rotate {
                    sell: item.mint.clone(),
                    buy: candidate.mint.clone(),
                    reason: ReasonCode::StaleRotationWithReplacement,
                    rank_delta: delta,
                },
                log: Some(log_entry(
                    inputs,
                    "rotation",
                    Some(item.mint.clone()),
                    Some(candidate.mint.clone()),
                    ReasonCode::StaleRotationWithReplacement,
                    Some(delta),
                    serde_json::json!({ "hours_held": item.hours_held }),
                )),
            };
        }
        return exit_decision(inputs, item, ReasonCode::StaleTimeoutExit);
    }

    // 4. Scout stop loss / core loss exit
    if let Some(item) = worst_rank(inputs.held, |i| i.flags.scout_stop_loss_triggered) {
        return exit_decision(inputs, item, ReasonCode::ScoutStopLossExit);
    }
    if let Some(item) = worst_rank(inputs.held, |i| i.flags.core_loss_exit_triggered) {
        return exit_decision(inputs, item, ReasonCode::CoreLossExit);
    }

    // 5. Scout grace expired
    if let Some(item) = worst_rank(inputs.held, |i| i.flags.scout_grace_expired) {
        return exit_decision(inputs, item, ReasonCode::ScoutUnderperformGraceExpired);
    }

    // 6. Take profit: highest-PnL flagged position
    if let Some(item) = inputs
        .held
        .iter()
        .filter(|i| i.flags.take_profit_triggered)
        .max_by(|a, b| {
            a.pnl_pct
                .partial_cmp(&b.pnl_pct)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.mint.cmp(&a.mint))
        })
    {
        return exit_decision(inputs, item, ReasonCode::TakeProfit);
    }

    // 7. Opportunity-cost rotation: best candidate-over-held delta
    if let Some((held, candidate, delta)) = best_rotation_pair(cfg, inputs) {
        return Decision {
            action: RotationAction::Rotate {
                sell: held.mint.clone(),
                buy: candidate.mint.clone(),
                reason: ReasonCode::OpportunityCostRotation,
                rank_delta: delta,
            },
            log: Some(log_entry(
                inputs,
                "rotation",
                Some(held.mint.clone()),
                Some(candidate.mint.clone()),
                ReasonCode::OpportunityCostRotation,
                Some(delta),
                serde_json::json!({
                    "held_rank": held.rank,
                    "candidate_rank": candidate.rank,
                }),
            )),
        };
    }

    // 8. Promotion
    if let Some(item) = best_promotable(cfg, inputs) {
        return Decision {
            action: RotationAction::Promote {
                mint: item.mint.clone(),
            },
            log: Some(log_entry(
                inputs,
                "promotion",
                None,
                Some(item.mint.clone()),
                ReasonCode::Promotion,
                None,
                serde_json::json!({
                    "pnl_pct": item.pnl_pct,
                    "signal_score": item.signal_score,
                    "hours_held": item.hours_held,
                }),
            )),
        };
    }

    Decision {
        action: RotationAction::Hold,
        log: None,
    }
}

fn exit_decision(inputs: &DecisionInputs<'_>, item: &RankedItem, reason: ReasonCode) -> Decision {
    Decision {
        action: RotationAction::Exit {
            mint: item.mint.clone(),
            reason,
        },
        log: Some(log_entry(
            inputs,
            "exit",
            Some(item.mint.clone()),
            None,
            reason,
            None,
            serde_json::json!({
                "rank": item.rank,
                "pnl_pct": item.pnl_pct,
                "hours_held": item.hours_held,
            }),
        )),
    }
}

fn log_entry(
    inputs: &DecisionInputs<'_>,
    action: &str,
    sell: Option<Mint>,
    buy: Option<Mint>,
    reason: ReasonCode,
    rank_delta: Option<f64>,
    meta: serde_json::Value,
) -> RotationLogEntry {
    RotationLogEntry {
        id: Uuid::new_v4(),
        timestamp: inputs.now,
        tick_seq: inputs.tick_seq,
        action: action.to_string(),
        sell_mint: sell,
        buy_mint: buy,
        reason_code: reason.as_str().to_string(),
        rank_delta,
        meta,
    }
}

/// Lowest-rank item matching the predicate, ties broken by mint order
fn worst_rank<'a, F>(items: &'a [RankedItem], predicate: F) -> Option<&'a RankedItem>
where
    F: Fn(&RankedItem) -> bool,
{
    items.iter().filter(|i| predicate(i)).min_by(|a, b| {
        a.rank
            .partial_cmp(&b.rank)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.mint.cmp(&b.mint))
    })
}

/// Highest-rank item matching the predicate, ties broken by mint order
fn best_rank<'a, F>(items: &'a [RankedItem], predicate: F) -> Option<&'a RankedItem>
where
    F: Fn(&RankedItem) -> bool,
{
    items.iter().filter(|i| predicate(i)).max_by(|a, b| {
        a.rank
            .partial_cmp(&b.rank)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.mint.cmp(&a.mint))
    })
}

/// Best (held, candidate) pair by rank delta, subject to the margin and
/// liquidity guards
fn best_rotation_pair<'a>(
    cfg: &RuntimeConfig,
    inputs: &'a DecisionInputs<'_>,
) -> Option<(&'a RankedItem, &'a RankedItem, f64)> {
    let mut best: Option<(&RankedItem, &RankedItem, f64)> = None;
    for held in inputs.held {
        for candidate in inputs.candidates {
            if candidate.liquidity_usd < cfg.cap_min_pool_tvl_usd_scout {
                continue;
            }
            let delta = candidate.rank - held.rank;
            if delta <= cfg.rotation_margin {
                continue;
            }
            let better = match best {
                None => true,
                Some((bh, bc, bd)) => {
                    delta > bd
                        || (delta == bd
                            && (held.mint < bh.mint
                                || (held.mint == bh.mint && candidate.mint < bc.mint)))
                }
            };
            if better {
                best = Some((held, candidate, delta));
            }
        }
    }
    best
}

/// Best promotable scout, or None
fn best_promotable<'a>(
    cfg: &RuntimeConfig,
    inputs: &'a DecisionInputs<'_>,
) -> Option<&'a RankedItem> {
    let core_used = inputs
        .held
        .iter()
        .filter(|i| i.slot_type == Some(SlotType::Core))
        .count();
    if core_used >= cfg.core_slots {
        return None;
    }

    let top_rank = inputs
        .held
        .iter()
        .map(|i| i.rank)
        .fold(f64::NEG_INFINITY, f64::max);

    best_rank(inputs.held, |p| {
        p.slot_type == Some(SlotType::Scout)
            && !p.quarantined
            && p.pnl_pct >= cfg.promotion_min_pnl_pct
            && p.signal_score >= cfg.promotion_min_signal_score
            && p.hours_held * 60.0 >= cfg.promotion_delay_minutes
            // Continuation: above its short MA and not the tick's top rank,
            // which would invite a mean-reversion promotion at the peak
            && p.above_short_ma
            && p.rank < top_rank
            && whale_confirmed(cfg, inputs, &p.mint)
    })
}

fn whale_confirmed(cfg: &RuntimeConfig, inputs: &DecisionInputs<'_>, mint: &Mint) -> bool {
    if !cfg.whale_confirm_enabled || cfg.whale_confirm_dry_run {
        return true;
    }
    inputs.whale_flows.get(mint).map(|f| *f > 0.0).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranker::RankFlags;
    use chrono::TimeZone;

    fn mint(tag: u8) -> Mint {
        // Distinct, valid-shaped identifiers
        let c = (b'A' + tag) as char;
        Mint::new_unchecked(format!("{}{}", c, "1".repeat(40)))
    }

    fn item(tag: u8, rank: f64, slot: Option<SlotType>) -> RankedItem {
        RankedItem {
            mint: mint(tag),
            rank,
            pnl_pct: 0.0,
            pnl_usd: 0.0,
            hours_held: 10.0,
            flags: RankFlags::default(),
            quarantined: false,
            slot_type: slot,
            signal_score: 0.5,
            above_short_ma: true,
            ticks_observed: 50,
            liquidity_usd: 500_000.0,
            current_price_usd: 1.0,
        }
    }

    fn inputs<'a>(
        held: &'a [RankedItem],
        candidates: &'a [RankedItem],
        paused: Option<String>,
        flows: &'a HashMap<Mint, f64>,
    ) -> DecisionInputs<'a> {
        DecisionInputs {
            held,
            candidates,
            circuit_paused: paused,
            whale_flows: flows,
            now: Utc.timestamp_opt(1_000_000, 0).unwrap(),
            tick_seq: 7,
        }
    }

    #[test]
    fn test_circuit_pause_preempts_everything() {
        let cfg = RuntimeConfig::default();
        let mut a = item(0, -5.0, Some(SlotType::Core));
        a.flags.trailing_stop_triggered = true;
        let held = vec![a];
        let flows = HashMap::new();
        let d = decide(
            &cfg,
            &inputs(&held, &[], Some("daily_drawdown_breached".into()), &flows),
        );
        assert!(matches!(d.action, RotationAction::Pause { .. }));
        assert_eq!(d.log.unwrap().reason_code, "circuit_pause");
    }

    #[test]
    fn test_trailing_stop_selects_worst_rank() {
        let cfg = RuntimeConfig::default();
        let mut a = item(0, 1.0, Some(SlotType::Core));
        a.flags.trailing_stop_triggered = true;
        let mut b = item(1, -2.0, Some(SlotType::Core));
        b.flags.trailing_stop_triggered = true;
        let held = vec![a, b.clone()];
        let flows = HashMap::new();
        let d = decide(&cfg, &inputs(&held, &[], None, &flows));
        match d.action {
            RotationAction::Exit { mint, reason } => {
                assert_eq!(mint, b.mint);
                assert_eq!(reason, ReasonCode::TrailingStopExit);
            }
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test]
    fn test_stale_exit_without_replacement() {
        let cfg = RuntimeConfig::default();
        let mut a = item(0, 0.2, Some(SlotType::Core));
        a.flags.is_stale = true;
        a.flags.stale_exit_due = true;
        let held = vec![a];
        let flows = HashMap::new();
        let d = decide(&cfg, &inputs(&held, &[], None, &flows));
        match d.action {
            RotationAction::Exit { reason, .. } => {
                assert_eq!(reason, ReasonCode::StaleTimeoutExit)
            }
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test]
    fn test_stale_rotation_with_replacement() {
        let cfg = RuntimeConfig::default();
        let mut a = item(0, 0.2, Some(SlotType::Core));
        a.flags.is_stale = true;
        a.flags.stale_exit_due = true;
        let held = vec![a.clone()];
        // Candidate comfortably above held minimum + margin
        let candidate = item(5, 2.0, None);
        let candidates = vec![candidate.clone()];
        let flows = HashMap::new();
        let d = decide(&cfg, &inputs(&held, &candidates, None, &flows));
        match d.action {
            RotationAction::Rotate { sell, buy, reason, .. } => {
                assert_eq!(sell, a.mint);
                assert_eq!(buy, candidate.mint);
                assert_eq!(reason, ReasonCode::StaleRotationWithReplacement);
            }
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test]
    fn test_take_profit_picks_highest_pnl() {
        let cfg = RuntimeConfig::default();
        let mut a = item(0, 1.0, Some(SlotType::Core));
        a.pnl_pct = 0.45;
        a.flags.take_profit_triggered = true;
        let mut b = item(1, 1.0, Some(SlotType::Core));
        b.pnl_pct = 0.80;
        b.flags.take_profit_triggered = true;
        let held = vec![a, b.clone()];
        let flows = HashMap::new();
        let d = decide(&cfg, &inputs(&held, &[], None, &flows));
        match d.action {
            RotationAction::Exit { mint, reason } => {
                assert_eq!(mint, b.mint);
                assert_eq!(reason, ReasonCode::TakeProfit);
            }
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test]
    fn test_opportunity_rotation_needs_margin() {
        let mut cfg = RuntimeConfig::default();
        cfg.rotation_margin = 0.35;
        let held = vec![item(0, 1.0, Some(SlotType::Scout))];
        // Delta exactly at margin: not selected (strict >)
        let candidates = vec![item(5, 1.35, None)];
        let flows = HashMap::new();
        let d = decide(&cfg, &inputs(&held, &candidates, None, &flows));
        assert_eq!(d.action, RotationAction::Hold);

        let candidates = vec![item(5, 1.36, None)];
        let d = decide(&cfg, &inputs(&held, &candidates, None, &flows));
        assert!(matches!(
            d.action,
            RotationAction::Rotate {
                reason: ReasonCode::OpportunityCostRotation,
                ..
            }
        ));
    }

    fn promotable(tag: u8) -> RankedItem {
        let mut p = item(tag, 1.0, Some(SlotType::Scout));
        p.pnl_pct = 0.30;
        p.signal_score = 0.8;
        p.hours_held = 2.0;
        p.above_short_ma = true;
        p
    }

    #[test]
    fn test_promotion_happy_path() {
        let cfg = RuntimeConfig::default();
        // A core anchor outranks the scout so the avoid-top rule passes
        let anchor = item(9, 3.0, Some(SlotType::Core));
        let scout = promotable(0);
        let held = vec![anchor, scout.clone()];
        let flows = HashMap::new();
        let d = decide(&cfg, &inputs(&held, &[], None, &flows));
        match d.action {
            RotationAction::Promote { mint } => assert_eq!(mint, scout.mint),
            other => panic!("unexpected action: {other:?}"),
        }
        assert_eq!(d.log.unwrap().reason_code, "promotion");
    }

    #[test]
    fn test_quarantine_blocks_promotion_seed_scenario() {
        // Scout held 60 min, signal 2.0, pnl 0.30 -- promotable on every
        // numeric gate, but quarantined
        let cfg = RuntimeConfig::default();
        let anchor = item(9, 3.0, Some(SlotType::Core));
        let mut scout = promotable(0);
        scout.hours_held = 1.0;
        scout.signal_score = 2.0;
        scout.quarantined = true;
        let held = vec![anchor, scout];
        let flows = HashMap::new();
        let d = decide(&cfg, &inputs(&held, &[], None, &flows));
        assert_eq!(d.action, RotationAction::Hold);
        assert!(d.log.is_none());
    }

    #[test]
    fn test_promotion_blocked_when_core_full() {
        let mut cfg = RuntimeConfig::default();
        cfg.core_slots = 1;
        let anchor = item(9, 3.0, Some(SlotType::Core));
        let held = vec![anchor, promotable(0)];
        let flows = HashMap::new();
        let d = decide(&cfg, &inputs(&held, &[], None, &flows));
        assert_eq!(d.action, RotationAction::Hold);
    }

    #[test]
    fn test_avoid_top_rule_blocks_top_ranked_scout() {
        let cfg = RuntimeConfig::default();
        // The scout IS the top rank this tick
        let mut scout = promotable(0);
        scout.rank = 5.0;
        let held = vec![item(9, 1.0, Some(SlotType::Core)), scout];
        let flows = HashMap::new();
        let d = decide(&cfg, &inputs(&held, &[], None, &flows));
        assert_eq!(d.action, RotationAction::Hold);
    }

    #[test]
    fn test_promotion_delay_gate() {
        let cfg = RuntimeConfig::default();
        let anchor = item(9, 3.0, Some(SlotType::Core));
        let mut scout = promotable(0);
        scout.hours_held = cfg.promotion_delay_minutes / 60.0 - 0.1;
        let held = vec![anchor, scout];
        let flows = HashMap::new();
        let d = decide(&cfg, &inputs(&held, &[], None, &flows));
        assert_eq!(d.action, RotationAction::Hold);
    }

    #[test]
    fn test_whale_confirm_blocks_without_flow() {
        let mut cfg = RuntimeConfig::default();
        cfg.whale_confirm_enabled = true;
        cfg.whale_confirm_dry_run = false;
        let anchor = item(9, 3.0, Some(SlotType::Core));
        let scout = promotable(0);
        let held = vec![anchor, scout.clone()];
        let flows = HashMap::new();
        let d = decide(&cfg, &inputs(&held, &[], None, &flows));
        assert_eq!(d.action, RotationAction::Hold);

        let mut flows = HashMap::new();
        flows.insert(scout.mint.clone(), 12.5);
        let d = decide(&cfg, &inputs(&held, &[], None, &flows));
        assert!(matches!(d.action, RotationAction::Promote { .. }));
    }

    #[test]
    fn test_at_most_one_action_ladder_precedence() {
        // Trailing stop and take profit both fire on different positions:
        // trailing stop wins, exactly one action
        let cfg = RuntimeConfig::default();
        let mut a = item(0, 1.0, Some(SlotType::Core));
        a.flags.trailing_stop_triggered = true;
        let mut b = item(1, 2.0, Some(SlotType::Core));
        b.pnl_pct = 0.9;
        b.flags.take_profit_triggered = true;
        let held = vec![a.clone(), b];
        let flows = HashMap::new();
        let d = decide(&cfg, &inputs(&held, &[], None, &flows));
        match d.action {
            RotationAction::Exit { mint, reason } => {
                assert_eq!(mint, a.mint);
                assert_eq!(reason, ReasonCode::TrailingStopExit);
            }
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test]
    fn test_hold_when_nothing_fires() {
        let cfg = RuntimeConfig::default();
        let held = vec![item(0, 1.0, Some(SlotType::Core))];
        let flows = HashMap::new();
        let d = decide(&cfg, &inputs(&held, &[], None, &flows));
        assert_eq!(d.action, RotationAction::Hold);
        assert!(d.log.is_none());
    }

    #[test]
    fn test_determinism() {
        let cfg = RuntimeConfig::default();
        let mut a = item(0, 1.0, Some(SlotType::Scout));
        a.flags.scout_stop_loss_triggered = true;
        let held = vec![a];
        let flows = HashMap::new();
        let d1 = decide(&cfg, &inputs(&held, &[], None, &flows));
        let d2 = decide(&cfg, &inputs(&held, &[], None, &flows));
        assert_eq!(d1.action, d2.action);
    }
}
