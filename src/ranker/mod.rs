//! Composite ranking of held positions and discovery candidates
//!
//! Additive score over weighted features, higher = keep. Deterministic:
//! identical inputs always produce identical ranks, no RNG anywhere.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::clients::market_data::MarketSnapshot;
use crate::config::RuntimeConfig;
use crate::ledger::{CoverageReport, PositionTracking};
use crate::math::{clamp, pnl_pct, round_usd};
use crate::types::{Mint, Regime, Signal, SlotType};

/// Exit-trigger flags evaluated on held positions
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct RankFlags {
    pub trailing_stop_triggered: bool,
    pub is_stale: bool,
    /// Stale elevated to exit: `hours_held >= stale_exit_hours`
    pub stale_exit_due: bool,
    pub scout_stop_loss_triggered: bool,
    pub core_loss_exit_triggered: bool,
    pub scout_grace_expired: bool,
    pub take_profit_triggered: bool,
}

/// One ranked row, for a held position or a candidate
#[derive(Debug, Clone, Serialize)]
pub struct RankedItem {
    pub mint: Mint,
    pub rank: f64,
    pub pnl_pct: f64,
    pub pnl_usd: f64,
    pub hours_held: f64,
    pub flags: RankFlags,
    pub quarantined: bool,
    /// None for candidates
    pub slot_type: Option<SlotType>,
    pub signal_score: f64,
    pub above_short_ma: bool,
    pub ticks_observed: u32,
    pub liquidity_usd: f64,
    pub current_price_usd: f64,
}

/// Inputs for ranking one held position
pub struct HeldInput<'a> {
    pub tracking: &'a PositionTracking,
    pub coverage: &'a CoverageReport,
    pub signal: Signal,
    pub market: Option<&'a MarketSnapshot>,
    /// Recent prices, oldest first
    pub history: &'a [f64],
    pub ticks_observed: u32,
}

/// Inputs for ranking one discovery candidate
pub struct CandidateInput<'a> {
    pub mint: Mint,
    pub signal: Signal,
    pub market: &'a MarketSnapshot,
    pub history: &'a [f64],
    pub ticks_observed: u32,
}

/// Rank a held position
pub fn rank_held(cfg: &RuntimeConfig, input: &HeldInput<'_>, now: DateTime<Utc>) -> RankedItem {
    let tracking = input.tracking;
    let current = tracking.last_price_usd;
    let peak = tracking.peak_price_usd;
    let entry = input.coverage.effective_entry_price_usd;
    let hours_held = tracking.hours_held(now);

    let pnl = pnl_pct(entry, current);
    let pnl_usd = round_usd((current - entry) * tracking.total_tokens);

    let active_trail_pct = active_trail(cfg, pnl);
    let stop_price = peak * (1.0 - active_trail_pct);

    let is_stale = hours_held >= cfg.stale_position_hours && pnl.abs() <= cfg.stale_pnl_band_pct;
    let trailing_triggered = peak > 0.0 && current <= stop_price;

    let slot = tracking.slot_type;
    let flags = RankFlags {
        trailing_stop_triggered: trailing_triggered,
        is_stale,
        stale_exit_due: is_stale && hours_held >= cfg.stale_exit_hours,
        scout_stop_loss_triggered: slot == SlotType::Scout && pnl <= -cfg.scout_stop_loss_pct,
        core_loss_exit_triggered: slot == SlotType::Core && pnl <= -cfg.loss_exit_pct,
        scout_grace_expired: slot == SlotType::Scout
            && hours_held * 60.0 >= cfg.scout_underperform_minutes
            && pnl <= 0.0,
        take_profit_triggered: take_profit_due(cfg, slot, pnl, hours_held),
    };

    let liquidity = input.market.map(|m| m.liquidity_usd).unwrap_or(0.0);
    let volume = input.market.map(|m| m.volume_24h_usd).unwrap_or(0.0);
    let holders = input.market.map(|m| m.holders).unwrap_or(0);

    let rank = cfg.ranking_signal_weight * clamp(input.signal.score, -1.0, 1.0)
        + cfg.ranking_momentum_weight * f_momentum(input.history, input.signal.regime)
        + cfg.ranking_time_decay_weight * f_time_decay(hours_held)
        + cfg.ranking_trailing_weight * f_trailing_room(peak, current, active_trail_pct)
        + cfg.ranking_freshness_weight * f_freshness(input.signal.age_secs, cfg.signal_fresh_secs)
        + cfg.ranking_quality_weight * f_quality(liquidity, volume, holders)
        + cfg.ranking_stale_penalty * indicator(is_stale)
        + cfg.ranking_trailing_stop_penalty * indicator(trailing_triggered);

    RankedItem {
        mint: tracking.mint.clone(),
        rank,
        pnl_pct: pnl,
        pnl_usd,
        hours_held,
        flags,
        quarantined: input.coverage.quarantined,
        slot_type: Some(slot),
        signal_score: input.signal.score,
        above_short_ma: above_short_ma(input.history, current, cfg.short_ma_window_ticks),
        ticks_observed: input.ticks_observed,
        liquidity_usd: liquidity,
        current_price_usd: current,
    }
}

/// Rank a candidate. Returns None when the candidate fails the gate or the
/// resulting rank is not worth holding (<= 0.5).
pub fn rank_candidate(
    cfg: &RuntimeConfig,
    input: &CandidateInput<'_>,
    _now: DateTime<Utc>,
) -> Option<RankedItem> {
    let market = input.market;

    // Gate: some positive evidence, and enough liquidity to exit
    let has_pulse = input.signal.score > 0.0
        || market.scanner_score > 0.0
        || market.price_change_24h > 0.0;
    if !has_pulse || market.liquidity_usd < cfg.scanner_min_liquidity {
        return None;
    }

    // A signal over a thin observation history is not yet trustworthy
    let signal_score = if input.ticks_observed >= cfg.min_ticks_for_signals {
        input.signal.score
    } else {
        0.0
    };

    // Same weights as held, omitting the trailing and stale terms
    let rank = cfg.ranking_signal_weight * clamp(signal_score, -1.0, 1.0)
        + cfg.ranking_momentum_weight * f_momentum(input.history, input.signal.regime)
        + cfg.ranking_time_decay_weight * f_time_decay(0.0)
        + cfg.ranking_freshness_weight * f_freshness(input.signal.age_secs, cfg.signal_fresh_secs)
        + cfg.ranking_quality_weight
            * f_quality(market.liquidity_usd, market.volume_24h_usd, market.holders);

    if rank <= 0.5 {
        return None;
    }

    Some(RankedItem {
        mint: input.mint.clone(),
        rank,
        pnl_pct: 0.0,
        pnl_usd: 0.0,
        hours_held: 0.0,
        flags: RankFlags::default(),
        quarantined: false,
        slot_type: None,
        signal_score: input.signal.score,
        above_short_ma: above_short_ma(input.history, market.price_usd, cfg.short_ma_window_ticks),
        ticks_observed: input.ticks_observed,
        liquidity_usd: market.liquidity_usd,
        current_price_usd: market.price_usd,
    })
}

/// Allocation scale for a mint with a short observation history: capped at
/// `pre_full_alloc_max_pct` and ramped by `sqrt(ticks / min_ticks)`.
pub fn allocation_scale(cfg: &RuntimeConfig, target_weight: f64, ticks_observed: u32) -> f64 {
    if ticks_observed >= cfg.min_ticks_for_full_alloc {
        return target_weight;
    }
    let ramp = (ticks_observed as f64 / cfg.min_ticks_for_full_alloc as f64).sqrt();
    target_weight.min(cfg.pre_full_alloc_max_pct) * ramp
}

/// The trailing percentage in force: tight above the profit threshold
pub fn active_trail(cfg: &RuntimeConfig, pnl: f64) -> f64 {
    if pnl >= cfg.trailing_stop_profit_threshold_pct {
        cfg.trailing_stop_tight_pct
    } else {
        cfg.trailing_stop_base_pct
    }
}

fn take_profit_due(cfg: &RuntimeConfig, slot: SlotType, pnl: f64, hours_held: f64) -> bool {
    match slot {
        SlotType::Core => pnl >= cfg.take_profit_pct,
        SlotType::Scout => {
            pnl >= cfg.scout_take_profit_pct
                && hours_held * 60.0 >= cfg.scout_tp_min_hold_minutes
        }
    }
}

fn indicator(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

/// Short-window momentum: percent change across the window, scaled so a 10%
/// move saturates, halved outside a trending regime.
fn f_momentum(history: &[f64], regime: Regime) -> f64 {
    if history.len() < 2 {
        return 0.0;
    }
    let first = history[0];
    let last = history[history.len() - 1];
    if first <= 0.0 {
        return 0.0;
    }
    let change = (last - first) / first;
    let scaled = clamp(change / 0.10, -1.0, 1.0);
    match regime {
        Regime::Trend => scaled,
        Regime::Range => scaled * 0.5,
    }
}

/// Holding-age decay, 1 at entry falling toward 0 with a 24h half-life shape
fn f_time_decay(hours_held: f64) -> f64 {
    (-hours_held / 24.0).exp()
}

/// Distance above the active stop, normalized by the trail width
fn f_trailing_room(peak: f64, current: f64, active_trail_pct: f64) -> f64 {
    if peak <= 0.0 || active_trail_pct <= 0.0 {
        return 0.0;
    }
    let stop = peak * (1.0 - active_trail_pct);
    clamp((current - stop) / (peak * active_trail_pct), -1.0, 1.0)
}

/// Signal recency in [0, 1]
fn f_freshness(age_secs: f64, fresh_secs: u64) -> f64 {
    if fresh_secs == 0 {
        return 0.0;
    }
    clamp(1.0 - age_secs / fresh_secs as f64, 0.0, 1.0)
}

/// Blend of log-saturating liquidity, volume and holder-count terms
fn f_quality(liquidity_usd: f64, volume_24h_usd: f64, holders: u64) -> f64 {
    let liq = clamp((liquidity_usd + 1.0).log10() / 6.0, 0.0, 1.0);
    let vol = clamp((volume_24h_usd + 1.0).log10() / 6.0, 0.0, 1.0);
    let hold = clamp((holders as f64 + 1.0).log10() / 4.0, 0.0, 1.0);
    (liq + vol + hold) / 3.0
}

fn above_short_ma(history: &[f64], current: f64, window: usize) -> bool {
    if history.is_empty() || window == 0 {
        return false;
    }
    let start = history.len().saturating_sub(window);
    let slice = &history[start..];
    let mean: f64 = slice.iter().sum::<f64>() / slice.len() as f64;
    current > mean
}
