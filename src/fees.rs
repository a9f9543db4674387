//! Fee governor
//!
//! Computes a priority-fee ceiling per swap leg from per-leg economics.
//! Deterministic: same config and context always produce the same decision.

use serde::{Deserialize, Serialize};

use crate::config::{RiskProfile, RuntimeConfig};
use crate::types::SlotType;

/// Slot class of a trade, governing fee caps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lane {
    Core,
    Scout,
}

impl From<SlotType> for Lane {
    fn from(slot: SlotType) -> Self {
        match slot {
            SlotType::Core => Lane::Core,
            SlotType::Scout => Lane::Scout,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Normal,
    High,
}

/// Priority level forwarded to the aggregator's fee parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PriorityLevel {
    Low,
    Medium,
    High,
    VeryHigh,
}

impl PriorityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriorityLevel::Low => "low",
            PriorityLevel::Medium => "medium",
            PriorityLevel::High => "high",
            PriorityLevel::VeryHigh => "veryHigh",
        }
    }
}

/// Inputs for one fee decision
#[derive(Debug, Clone, Copy)]
pub struct TradeContext {
    pub lane: Lane,
    pub side: Side,
    pub notional_sol: f64,
    pub urgency: Urgency,
    /// Retry-ladder index, 1-based
    pub attempt: u32,
}

/// One fee decision with its diagnostic trail
#[derive(Debug, Clone)]
pub struct FeeDecision {
    pub max_lamports: u64,
    pub priority_level: PriorityLevel,
    pub reason_trail: Vec<String>,
    /// Caller must refuse the trade when set
    pub skip_recommended: bool,
    pub effective_ratio: f64,
    pub clamped_to_min: bool,
    pub clamped_to_max: bool,
}

/// Compute the fee for a trade. Falls back to the legacy per-profile ladder
/// when the governor is disabled or explicitly bypassed.
pub fn decide(cfg: &RuntimeConfig, ctx: &TradeContext, bypass_governor: bool) -> FeeDecision {
    if !cfg.fee_governor_enabled || bypass_governor {
        return legacy_fallback(cfg, ctx);
    }
    govern(cfg, ctx)
}

/// The capacity-aware computation
fn govern(cfg: &RuntimeConfig, ctx: &TradeContext) -> FeeDecision {
    let mut trail = Vec::new();
    let notional_lamports = ctx.notional_sol * 1e9;

    // 1-2. Per-leg ratio and haircut
    let base_ratio = match ctx.lane {
        Lane::Scout => cfg.fee_ratio_per_leg_scout,
        Lane::Core => cfg.fee_ratio_per_leg_core,
    };
    let base_fee = notional_lamports * base_ratio * cfg.fee_safety_haircut;
    trail.push(format!(
        "base_fee={base_fee:.0} (ratio={base_ratio} haircut={})",
        cfg.fee_safety_haircut
    ));

    // 3-4. Retry ladder
    let ladder = &cfg.retry_ladder_multipliers;
    let idx = (ctx.attempt.max(1) as usize - 1).min(ladder.len().saturating_sub(1));
    let multiplier = ladder.get(idx).copied().unwrap_or(1.0);
    let mut fee = base_fee * multiplier;
    trail.push(format!("attempt={} multiplier={multiplier}", ctx.attempt));

    // 5. Floor by side
    let min_floor = match ctx.side {
        Side::Sell => cfg.min_priority_fee_lamports_exit,
        Side::Buy => cfg.min_priority_fee_lamports_entry,
    } as f64;
    let mut clamped_to_min = false;
    if fee < min_floor {
        fee = min_floor;
        clamped_to_min = true;
        trail.push(format!("clamped_to_min={min_floor:.0}"));
    }

    // 6. Ceiling by lane. When the floor exceeds the ceiling, the floor wins.
    let max_ceiling = match ctx.lane {
        Lane::Scout => cfg.max_priority_fee_lamports_scout,
        Lane::Core => cfg.max_priority_fee_lamports_core,
    } as f64;
    let mut clamped_to_max = false;
    if fee > max_ceiling && !clamped_to_min {
        fee = max_ceiling;
        clamped_to_max = true;
        trail.push(format!("clamped_to_max={max_ceiling:.0}"));
    }

    // 7-8. Effective ratio and hard guard (strictly greater than the cap)
    let effective_ratio = if notional_lamports > 0.0 {
        fee / notional_lamports
    } else {
        0.0
    };
    let skip_recommended =
        cfg.fee_ratio_guard_enabled && effective_ratio > cfg.max_fee_ratio_hard_per_leg;
    if skip_recommended {
        trail.push(format!(
            "skip: effective_ratio={effective_ratio:.6} exceeds_hard_cap={}",
            cfg.max_fee_ratio_hard_per_leg
        ));
    }

    // 9. Priority level
    let priority_level = if ctx.urgency == Urgency::High || ctx.side == Side::Sell {
        PriorityLevel::High
    } else {
        PriorityLevel::Medium
    };

    FeeDecision {
        max_lamports: fee as u64,
        priority_level,
        reason_trail: trail,
        skip_recommended,
        effective_ratio,
        clamped_to_min,
        clamped_to_max,
    }
}

/// Legacy fallback by risk profile, used when the governor is off or a
/// USDC-to-SOL liquidation bypasses it
fn legacy_fallback(cfg: &RuntimeConfig, ctx: &TradeContext) -> FeeDecision {
    let profile =
        RiskProfile::from_name(&cfg.risk_profile).unwrap_or(RiskProfile::Conservative);
    let max_lamports = profile.fallback_priority_fee_lamports();
    let priority_level = match profile {
        RiskProfile::Degen => PriorityLevel::VeryHigh,
        RiskProfile::High => PriorityLevel::High,
        RiskProfile::Moderate => PriorityLevel::Medium,
        RiskProfile::Conservative => PriorityLevel::Low,
    };
    let notional_lamports = ctx.notional_sol * 1e9;
    FeeDecision {
        max_lamports,
        priority_level,
        reason_trail: vec![format!("legacy_fallback profile={}", profile.name())],
        skip_recommended: false,
        effective_ratio: if notional_lamports > 0.0 {
            max_lamports as f64 / notional_lamports
        } else {
            0.0
        },
        clamped_to_min: false,
        clamped_to_max: false,
    }
}
