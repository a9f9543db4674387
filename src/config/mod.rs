//! Runtime configuration loading, normalization and validation
//!
//! One flat parameter record consumed across the tick. Load order is
//! defaults, then `config.toml`, then environment with the `ROTATOR__`
//! prefix. Percentages are stored internally as decimals in [0, 1];
//! user-visible values like `25.0` are normalized once at the boundary.

pub mod profiles;
pub mod store;

use serde::{Deserialize, Serialize};
use std::path::Path;

pub use profiles::RiskProfile;
pub use store::ConfigStore;

use crate::error::{Error, Result};
use crate::math::normalize_pct;

/// Execution mode for the swap pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    #[default]
    Paper,
    Live,
}

impl ExecutionMode {
    pub fn is_live(&self) -> bool {
        matches!(self, ExecutionMode::Live)
    }
}

/// The merged, typed parameter set. One consistent snapshot per tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    // === Execution ===
    #[serde(default)]
    pub execution_mode: ExecutionMode,
    #[serde(default = "default_max_slippage_bps")]
    pub max_slippage_bps: u32,
    #[serde(default = "default_max_single_swap_sol")]
    pub max_single_swap_sol: f64,
    #[serde(default = "default_min_trade_usd")]
    pub min_trade_usd: f64,
    #[serde(default = "default_loop_seconds")]
    pub loop_seconds: u64,

    // === Risk ===
    #[serde(default = "default_max_daily_drawdown_pct")]
    pub max_daily_drawdown_pct: f64,
    #[serde(default = "default_max_position_pct_per_asset")]
    pub max_position_pct_per_asset: f64,
    #[serde(default = "default_max_turnover_pct_per_day")]
    pub max_turnover_pct_per_day: f64,
    #[serde(default = "default_take_profit_pct")]
    pub take_profit_pct: f64,

    // === Slots ===
    #[serde(default = "default_core_slots")]
    pub core_slots: usize,
    #[serde(default = "default_scout_slots")]
    pub scout_slots: usize,
    #[serde(default = "default_core_position_pct_target")]
    pub core_position_pct_target: f64,
    #[serde(default = "default_scout_buy_sol")]
    pub scout_buy_sol: f64,
    #[serde(default = "default_min_sol_reserve")]
    pub min_sol_reserve: f64,

    // === Ranking weights ===
    #[serde(default = "default_ranking_signal_weight")]
    pub ranking_signal_weight: f64,
    #[serde(default = "default_ranking_momentum_weight")]
    pub ranking_momentum_weight: f64,
    #[serde(default = "default_ranking_time_decay_weight")]
    pub ranking_time_decay_weight: f64,
    #[serde(default = "default_ranking_trailing_weight")]
    pub ranking_trailing_weight: f64,
    #[serde(default = "default_ranking_freshness_weight")]
    pub ranking_freshness_weight: f64,
    #[serde(default = "default_ranking_quality_weight")]
    pub ranking_quality_weight: f64,
    #[serde(default = "default_ranking_stale_penalty")]
    pub ranking_stale_penalty: f64,
    #[serde(default = "default_ranking_trailing_stop_penalty")]
    pub ranking_trailing_stop_penalty: f64,

    // === Exit ===
    #[serde(default = "default_trailing_stop_base_pct")]
    pub trailing_stop_base_pct: f64,
    #[serde(default = "default_trailing_stop_tight_pct")]
    pub trailing_stop_tight_pct: f64,
    #[serde(default = "default_trailing_stop_profit_threshold_pct")]
    pub trailing_stop_profit_threshold_pct: f64,
    #[serde(default = "default_stale_position_hours")]
    pub stale_position_hours: f64,
    #[serde(default = "default_stale_exit_hours")]
    pub stale_exit_hours: f64,
    #[serde(default = "default_scout_stop_loss_pct")]
    pub scout_stop_loss_pct: f64,
    #[serde(default = "default_scout_take_profit_pct")]
    pub scout_take_profit_pct: f64,
    #[serde(default = "default_scout_tp_min_hold_minutes")]
    pub scout_tp_min_hold_minutes: f64,
    #[serde(default = "default_loss_exit_pct")]
    pub loss_exit_pct: f64,
    #[serde(default = "default_stale_pnl_band_pct")]
    pub stale_pnl_band_pct: f64,
    #[serde(default = "default_scout_underperform_minutes")]
    pub scout_underperform_minutes: f64,

    // === Fees ===
    #[serde(default = "default_true")]
    pub fee_governor_enabled: bool,
    #[serde(default = "default_fee_ratio_per_leg_scout")]
    pub fee_ratio_per_leg_scout: f64,
    #[serde(default = "default_fee_ratio_per_leg_core")]
    pub fee_ratio_per_leg_core: f64,
    #[serde(default = "default_min_priority_fee_lamports_entry")]
    pub min_priority_fee_lamports_entry: u64,
    #[serde(default = "default_min_priority_fee_lamports_exit")]
    pub min_priority_fee_lamports_exit: u64,
    #[serde(default = "default_max_priority_fee_lamports_scout")]
    pub max_priority_fee_lamports_scout: u64,
    #[serde(default = "default_max_priority_fee_lamports_core")]
    pub max_priority_fee_lamports_core: u64,
    #[serde(default = "default_retry_ladder_multipliers")]
    pub retry_ladder_multipliers: Vec<f64>,
    #[serde(default = "default_fee_safety_haircut")]
    pub fee_safety_haircut: f64,
    #[serde(default = "default_max_fee_ratio_hard_per_leg")]
    pub max_fee_ratio_hard_per_leg: f64,
    #[serde(default = "default_true")]
    pub fee_ratio_guard_enabled: bool,

    // === Capital ===
    #[serde(default = "default_cap_max_total_exposure_pct")]
    pub cap_max_total_exposure_pct: f64,
    #[serde(default = "default_cap_max_core_exposure_pct")]
    pub cap_max_core_exposure_pct: f64,
    #[serde(default = "default_cap_max_scout_exposure_pct")]
    pub cap_max_scout_exposure_pct: f64,
    #[serde(default = "default_cap_max_mint_exposure_pct")]
    pub cap_max_mint_exposure_pct: f64,
    #[serde(default = "default_cap_risk_per_trade_scout_pct")]
    pub cap_risk_per_trade_scout_pct: f64,
    #[serde(default = "default_cap_risk_per_trade_core_pct")]
    pub cap_risk_per_trade_core_pct: f64,
    #[serde(default = "default_cap_max_impact_pct_entry")]
    pub cap_max_impact_pct_entry: f64,
    #[serde(default = "default_cap_max_impact_pct_exit")]
    pub cap_max_impact_pct_exit: f64,
    #[serde(default = "default_cap_roundtrip_min_ratio_scout")]
    pub cap_roundtrip_min_ratio_scout: f64,
    #[serde(default = "default_cap_roundtrip_min_ratio_core")]
    pub cap_roundtrip_min_ratio_core: f64,
    #[serde(default = "default_cap_liquidity_safety_haircut")]
    pub cap_liquidity_safety_haircut: f64,
    #[serde(default = "default_cap_min_pool_tvl_usd_scout")]
    pub cap_min_pool_tvl_usd_scout: f64,
    #[serde(default = "default_cap_min_pool_tvl_usd_core")]
    pub cap_min_pool_tvl_usd_core: f64,
    #[serde(default = "default_cap_scout_size_min_usd")]
    pub cap_scout_size_min_usd: f64,
    #[serde(default = "default_cap_scout_size_max_usd")]
    pub cap_scout_size_max_usd: f64,
    #[serde(default = "default_cap_scout_size_base_usd")]
    pub cap_scout_size_base_usd: f64,
    #[serde(default = "default_cap_scout_size_base_equity")]
    pub cap_scout_size_base_equity: f64,

    // === Universe ===
    #[serde(default = "default_scout_token_cooldown_hours")]
    pub scout_token_cooldown_hours: f64,
    #[serde(default = "default_scanner_min_liquidity")]
    pub scanner_min_liquidity: f64,
    #[serde(default = "default_min_ticks_for_signals")]
    pub min_ticks_for_signals: u32,
    #[serde(default = "default_min_ticks_for_full_alloc")]
    pub min_ticks_for_full_alloc: u32,
    #[serde(default = "default_pre_full_alloc_max_pct")]
    pub pre_full_alloc_max_pct: f64,
    #[serde(default = "default_dust_threshold_usd")]
    pub dust_threshold_usd: f64,
    #[serde(default = "default_min_position_usd")]
    pub min_position_usd: f64,

    // === Promotion ===
    #[serde(default = "default_promotion_min_pnl_pct")]
    pub promotion_min_pnl_pct: f64,
    #[serde(default = "default_promotion_min_signal_score")]
    pub promotion_min_signal_score: f64,
    #[serde(default = "default_promotion_delay_minutes")]
    pub promotion_delay_minutes: f64,
    #[serde(default)]
    pub whale_confirm_enabled: bool,
    #[serde(default = "default_true")]
    pub whale_confirm_dry_run: bool,

    // === Rotation ===
    #[serde(default = "default_rotation_margin")]
    pub rotation_margin: f64,
    #[serde(default = "default_stale_replacement_margin")]
    pub stale_replacement_margin: f64,

    // === Circuit ===
    #[serde(default)]
    pub manual_pause: bool,

    // === Ambient ===
    #[serde(default = "default_risk_profile")]
    pub risk_profile: String,
    #[serde(default = "default_true")]
    pub manual_scout_buy_enabled: bool,
    #[serde(default = "default_rpc_timeout_ms")]
    pub rpc_timeout_ms: u64,
    #[serde(default = "default_quote_timeout_ms")]
    pub quote_timeout_ms: u64,
    #[serde(default = "default_market_data_ttl_secs")]
    pub market_data_ttl_secs: u64,
    #[serde(default = "default_signal_fresh_secs")]
    pub signal_fresh_secs: u64,
    #[serde(default = "default_telemetry_retention_days")]
    pub telemetry_retention_days: u32,
    #[serde(default = "default_momentum_window_ticks")]
    pub momentum_window_ticks: usize,
    #[serde(default = "default_short_ma_window_ticks")]
    pub short_ma_window_ticks: usize,
}

// Default value functions
fn default_max_slippage_bps() -> u32 { 150 }
fn default_max_single_swap_sol() -> f64 { 5.0 }
fn default_min_trade_usd() -> f64 { 10.0 }
fn default_loop_seconds() -> u64 { 60 }

fn default_max_daily_drawdown_pct() -> f64 { 0.05 }
fn default_max_position_pct_per_asset() -> f64 { 0.25 }
fn default_max_turnover_pct_per_day() -> f64 { 2.0 }
fn default_take_profit_pct() -> f64 { 0.40 }

fn default_core_slots() -> usize { 3 }
fn default_scout_slots() -> usize { 4 }
fn default_core_position_pct_target() -> f64 { 0.20 }
fn default_scout_buy_sol() -> f64 { 0.25 }
fn default_min_sol_reserve() -> f64 { 0.05 }

fn default_ranking_signal_weight() -> f64 { 1.0 }
fn default_ranking_momentum_weight() -> f64 { 0.8 }
fn default_ranking_time_decay_weight() -> f64 { 0.3 }
fn default_ranking_trailing_weight() -> f64 { 0.5 }
fn default_ranking_freshness_weight() -> f64 { 0.4 }
fn default_ranking_quality_weight() -> f64 { 0.4 }
fn default_ranking_stale_penalty() -> f64 { -0.75 }
fn default_ranking_trailing_stop_penalty() -> f64 { -1.5 }

fn default_trailing_stop_base_pct() -> f64 { 0.25 }
fn default_trailing_stop_tight_pct() -> f64 { 0.12 }
fn default_trailing_stop_profit_threshold_pct() -> f64 { 0.50 }
fn default_stale_position_hours() -> f64 { 24.0 }
fn default_stale_exit_hours() -> f64 { 48.0 }
fn default_scout_stop_loss_pct() -> f64 { 0.18 }
fn default_scout_take_profit_pct() -> f64 { 0.35 }
fn default_scout_tp_min_hold_minutes() -> f64 { 30.0 }
fn default_loss_exit_pct() -> f64 { 0.30 }
fn default_stale_pnl_band_pct() -> f64 { 0.05 }
fn default_scout_underperform_minutes() -> f64 { 240.0 }

fn default_fee_ratio_per_leg_scout() -> f64 { 0.003 }
fn default_fee_ratio_per_leg_core() -> f64 { 0.0015 }
fn default_min_priority_fee_lamports_entry() -> u64 { 100_000 }
fn default_min_priority_fee_lamports_exit() -> u64 { 200_000 }
fn default_max_priority_fee_lamports_scout() -> u64 { 2_000_000 }
fn default_max_priority_fee_lamports_core() -> u64 { 5_000_000 }
fn default_retry_ladder_multipliers() -> Vec<f64> { vec![1.0, 2.0, 4.0, 8.0] }
fn default_fee_safety_haircut() -> f64 { 0.85 }
fn default_max_fee_ratio_hard_per_leg() -> f64 { 0.01 }

fn default_cap_max_total_exposure_pct() -> f64 { 0.90 }
fn default_cap_max_core_exposure_pct() -> f64 { 0.60 }
fn default_cap_max_scout_exposure_pct() -> f64 { 0.30 }
fn default_cap_max_mint_exposure_pct() -> f64 { 0.25 }
fn default_cap_risk_per_trade_scout_pct() -> f64 { 0.01 }
fn default_cap_risk_per_trade_core_pct() -> f64 { 0.02 }
fn default_cap_max_impact_pct_entry() -> f64 { 0.015 }
fn default_cap_max_impact_pct_exit() -> f64 { 0.03 }
fn default_cap_roundtrip_min_ratio_scout() -> f64 { 3.0 }
fn default_cap_roundtrip_min_ratio_core() -> f64 { 5.0 }
fn default_cap_liquidity_safety_haircut() -> f64 { 0.7 }
fn default_cap_min_pool_tvl_usd_scout() -> f64 { 50_000.0 }
fn default_cap_min_pool_tvl_usd_core() -> f64 { 250_000.0 }
fn default_cap_scout_size_min_usd() -> f64 { 15.0 }
fn default_cap_scout_size_max_usd() -> f64 { 150.0 }
fn default_cap_scout_size_base_usd() -> f64 { 50.0 }
fn default_cap_scout_size_base_equity() -> f64 { 2_000.0 }

fn default_scout_token_cooldown_hours() -> f64 { 12.0 }
fn default_scanner_min_liquidity() -> f64 { 25_000.0 }
fn default_min_ticks_for_signals() -> u32 { 5 }
fn default_min_ticks_for_full_alloc() -> u32 { 20 }
fn default_pre_full_alloc_max_pct() -> f64 { 0.10 }
fn default_dust_threshold_usd() -> f64 { 2.0 }
fn default_min_position_usd() -> f64 { 5.0 }

fn default_promotion_min_pnl_pct() -> f64 { 0.10 }
fn default_promotion_min_signal_score() -> f64 { 0.35 }
fn default_promotion_delay_minutes() -> f64 { 45.0 }

fn default_rotation_margin() -> f64 { 0.35 }
fn default_stale_replacement_margin() -> f64 { 0.25 }

fn default_risk_profile() -> String { "moderate".to_string() }
fn default_rpc_timeout_ms() -> u64 { 10_000 }
fn default_quote_timeout_ms() -> u64 { 8_000 }
fn default_market_data_ttl_secs() -> u64 { 30 }
fn default_signal_fresh_secs() -> u64 { 300 }
fn default_telemetry_retention_days() -> u32 { 14 }
fn default_momentum_window_ticks() -> usize { 12 }
fn default_short_ma_window_ticks() -> usize { 20 }

fn default_true() -> bool { true }

impl Default for RuntimeConfig {
    fn default() -> Self {
        // Every field has a serde default, so an empty object deserializes
        // into the canonical defaults.
        serde_json::from_value(serde_json::json!({})).expect("defaults are total")
    }
}

impl RuntimeConfig {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()).required(false))
            .add_source(
                config::Environment::with_prefix("ROTATOR")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| Error::ConfigValidation(e.to_string()))?;

        let mut cfg: RuntimeConfig = settings
            .try_deserialize()
            .map_err(|e| Error::ConfigValidation(e.to_string()))?;

        cfg.normalize();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Normalize user-visible percentage values into internal decimals.
    /// Idempotent: values already in [0, 1] are untouched.
    pub fn normalize(&mut self) {
        for field in [
            &mut self.max_daily_drawdown_pct,
            &mut self.max_position_pct_per_asset,
            &mut self.take_profit_pct,
            &mut self.core_position_pct_target,
            &mut self.trailing_stop_base_pct,
            &mut self.trailing_stop_tight_pct,
            &mut self.trailing_stop_profit_threshold_pct,
            &mut self.scout_stop_loss_pct,
            &mut self.scout_take_profit_pct,
            &mut self.loss_exit_pct,
            &mut self.stale_pnl_band_pct,
            &mut self.cap_max_total_exposure_pct,
            &mut self.cap_max_core_exposure_pct,
            &mut self.cap_max_scout_exposure_pct,
            &mut self.cap_max_mint_exposure_pct,
            &mut self.cap_risk_per_trade_scout_pct,
            &mut self.cap_risk_per_trade_core_pct,
            &mut self.cap_max_impact_pct_entry,
            &mut self.cap_max_impact_pct_exit,
            &mut self.pre_full_alloc_max_pct,
            &mut self.promotion_min_pnl_pct,
        ] {
            *field = normalize_pct(*field);
        }
    }

    /// Validate configuration values. Every numeric field has an inclusive
    /// min/max; string enums are exhaustively checked by serde.
    pub fn validate(&self) -> Result<()> {
        fn check_unit(name: &str, v: f64) -> Result<()> {
            if !(0.0..=1.0).contains(&v) {
                return Err(Error::ConfigValidation(format!(
                    "{name} must be in [0, 1], got {v}"
                )));
            }
            Ok(())
        }
        fn check_positive(name: &str, v: f64) -> Result<()> {
            if v <= 0.0 {
                return Err(Error::ConfigValidation(format!(
                    "{name} must be positive, got {v}"
                )));
            }
            Ok(())
        }
        fn check_non_negative(name: &str, v: f64) -> Result<()> {
            if v < 0.0 {
                return Err(Error::ConfigValidation(format!(
                    "{name} must be non-negative, got {v}"
                )));
            }
            Ok(())
        }

        if self.max_slippage_bps > 10_000 {
            return Err(Error::ConfigValidation(
                "max_slippage_bps cannot exceed 10000 (100%)".into(),
            ));
        }
        if self.loop_seconds == 0 {
            return Err(Error::ConfigValidation("loop_seconds must be >= 1".into()));
        }
        check_positive("max_single_swap_sol", self.max_single_swap_sol)?;
        check_non_negative("min_trade_usd", self.min_trade_usd)?;

        check_unit("max_daily_drawdown_pct", self.max_daily_drawdown_pct)?;
        check_unit("max_position_pct_per_asset", self.max_position_pct_per_asset)?;
        check_positive("max_turnover_pct_per_day", self.max_turnover_pct_per_day)?;
        check_unit("take_profit_pct", self.take_profit_pct)?;

        if self.core_slots == 0 || self.core_slots > 32 {
            return Err(Error::ConfigValidation("core_slots must be in [1, 32]".into()));
        }
        if self.scout_slots == 0 || self.scout_slots > 64 {
            return Err(Error::ConfigValidation("scout_slots must be in [1, 64]".into()));
        }
        check_unit("core_position_pct_target", self.core_position_pct_target)?;
        check_positive("scout_buy_sol", self.scout_buy_sol)?;
        check_non_negative("min_sol_reserve", self.min_sol_reserve)?;

        check_unit("trailing_stop_base_pct", self.trailing_stop_base_pct)?;
        check_unit("trailing_stop_tight_pct", self.trailing_stop_tight_pct)?;
        check_unit(
            "trailing_stop_profit_threshold_pct",
            self.trailing_stop_profit_threshold_pct,
        )?;
        if self.trailing_stop_tight_pct > self.trailing_stop_base_pct {
            return Err(Error::ConfigValidation(
                "trailing_stop_tight_pct must not exceed trailing_stop_base_pct".into(),
            ));
        }
        check_positive("stale_position_hours", self.stale_position_hours)?;
        if self.stale_exit_hours < self.stale_position_hours {
            return Err(Error::ConfigValidation(
                "stale_exit_hours must be >= stale_position_hours".into(),
            ));
        }
        check_unit("scout_stop_loss_pct", self.scout_stop_loss_pct)?;
        check_unit("scout_take_profit_pct", self.scout_take_profit_pct)?;
        check_non_negative("scout_tp_min_hold_minutes", self.scout_tp_min_hold_minutes)?;
        check_unit("loss_exit_pct", self.loss_exit_pct)?;
        check_unit("stale_pnl_band_pct", self.stale_pnl_band_pct)?;
        check_non_negative("scout_underperform_minutes", self.scout_underperform_minutes)?;

        check_unit("fee_ratio_per_leg_scout", self.fee_ratio_per_leg_scout)?;
        check_unit("fee_ratio_per_leg_core", self.fee_ratio_per_leg_core)?;
        check_unit("fee_safety_haircut", self.fee_safety_haircut)?;
        check_unit("max_fee_ratio_hard_per_leg", self.max_fee_ratio_hard_per_leg)?;
        if self.retry_ladder_multipliers.is_empty() {
            return Err(Error::ConfigValidation(
                "retry_ladder_multipliers must not be empty".into(),
            ));
        }
        for (i, m) in self.retry_ladder_multipliers.iter().enumerate() {
            if *m < 1.0 {
                return Err(Error::ConfigValidation(format!(
                    "retry_ladder_multipliers[{i}] must be >= 1.0, got {m}"
                )));
            }
        }

        check_unit("cap_max_total_exposure_pct", self.cap_max_total_exposure_pct)?;
        check_unit("cap_max_core_exposure_pct", self.cap_max_core_exposure_pct)?;
        check_unit("cap_max_scout_exposure_pct", self.cap_max_scout_exposure_pct)?;
        check_unit("cap_max_mint_exposure_pct", self.cap_max_mint_exposure_pct)?;
        check_unit("cap_risk_per_trade_scout_pct", self.cap_risk_per_trade_scout_pct)?;
        check_unit("cap_risk_per_trade_core_pct", self.cap_risk_per_trade_core_pct)?;
        check_unit("cap_max_impact_pct_entry", self.cap_max_impact_pct_entry)?;
        check_unit("cap_max_impact_pct_exit", self.cap_max_impact_pct_exit)?;
        check_positive("cap_roundtrip_min_ratio_scout", self.cap_roundtrip_min_ratio_scout)?;
        check_positive("cap_roundtrip_min_ratio_core", self.cap_roundtrip_min_ratio_core)?;
        check_unit("cap_liquidity_safety_haircut", self.cap_liquidity_safety_haircut)?;
        check_non_negative("cap_min_pool_tvl_usd_scout", self.cap_min_pool_tvl_usd_scout)?;
        check_non_negative("cap_min_pool_tvl_usd_core", self.cap_min_pool_tvl_usd_core)?;
        check_positive("cap_scout_size_min_usd", self.cap_scout_size_min_usd)?;
        if self.cap_scout_size_max_usd < self.cap_scout_size_min_usd {
            return Err(Error::ConfigValidation(
                "cap_scout_size_max_usd must be >= cap_scout_size_min_usd".into(),
            ));
        }
        check_positive("cap_scout_size_base_usd", self.cap_scout_size_base_usd)?;
        check_positive("cap_scout_size_base_equity", self.cap_scout_size_base_equity)?;

        check_positive("scout_token_cooldown_hours", self.scout_token_cooldown_hours)?;
        check_non_negative("scanner_min_liquidity", self.scanner_min_liquidity)?;
        if self.min_ticks_for_full_alloc == 0 {
            return Err(Error::ConfigValidation(
                "min_ticks_for_full_alloc must be >= 1".into(),
            ));
        }
        check_unit("pre_full_alloc_max_pct", self.pre_full_alloc_max_pct)?;
        check_non_negative("dust_threshold_usd", self.dust_threshold_usd)?;
        check_non_negative("min_position_usd", self.min_position_usd)?;

        check_unit("promotion_min_pnl_pct", self.promotion_min_pnl_pct)?;
        if !(-1.0..=1.0).contains(&self.promotion_min_signal_score) {
            return Err(Error::ConfigValidation(
                "promotion_min_signal_score must be in [-1, 1]".into(),
            ));
        }
        check_non_negative("promotion_delay_minutes", self.promotion_delay_minutes)?;
        check_non_negative("rotation_margin", self.rotation_margin)?;
        check_non_negative("stale_replacement_margin", self.stale_replacement_margin)?;

        if RiskProfile::from_name(&self.risk_profile).is_none() {
            return Err(Error::ConfigValidation(format!(
                "unknown risk_profile: {}",
                self.risk_profile
            )));
        }

        // Execution mode lock: live only in production
        if self.execution_mode.is_live() && !execution_mode_unlocked() {
            return Err(Error::ConfigValidation(
                "execution_mode=live requires ROTATOR_ENV=production".into(),
            ));
        }

        Ok(())
    }

    /// Get masked configuration summary for display (hide secrets)
    pub fn masked_display(&self) -> String {
        format!(
            r#"Configuration:
  Execution:
    mode: {:?}
    loop: {}s
    max_slippage: {}bps
  Risk:
    profile: {}
    max_daily_drawdown: {:.1}%
    max_turnover/day: {:.0}%
    take_profit: {:.1}%
  Slots:
    core: {} / scout: {}
    scout_buy: {} SOL
  Fees:
    governor: {}
    ratio/leg scout: {:.4} core: {:.4}
    hard cap ratio: {:.4}
  Universe:
    cooldown: {}h
    min_liquidity: ${:.0}
"#,
            self.execution_mode,
            self.loop_seconds,
            self.max_slippage_bps,
            self.risk_profile,
            self.max_daily_drawdown_pct * 100.0,
            self.max_turnover_pct_per_day * 100.0,
            self.take_profit_pct * 100.0,
            self.core_slots,
            self.scout_slots,
            self.scout_buy_sol,
            self.fee_governor_enabled,
            self.fee_ratio_per_leg_scout,
            self.fee_ratio_per_leg_core,
            self.max_fee_ratio_hard_per_leg,
            self.scout_token_cooldown_hours,
            self.scanner_min_liquidity,
        )
    }
}

/// The configured lock that prevents promotion to `live` outside production
fn execution_mode_unlocked() -> bool {
    std::env::var("ROTATOR_ENV").map(|v| v == "production").unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let cfg = RuntimeConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.loop_seconds, 60);
        assert_eq!(cfg.core_slots, 3);
        assert!(cfg.fee_governor_enabled);
        assert_eq!(cfg.execution_mode, ExecutionMode::Paper);
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let mut cfg = RuntimeConfig::default();
        cfg.take_profit_pct = 40.0;
        cfg.normalize();
        assert_eq!(cfg.take_profit_pct, 0.40);
        cfg.normalize();
        assert_eq!(cfg.take_profit_pct, 0.40);
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let mut cfg = RuntimeConfig::default();
        cfg.max_slippage_bps = 20_000;
        assert!(matches!(cfg.validate(), Err(Error::ConfigValidation(_))));

        let mut cfg = RuntimeConfig::default();
        cfg.retry_ladder_multipliers = vec![];
        assert!(cfg.validate().is_err());

        let mut cfg = RuntimeConfig::default();
        cfg.trailing_stop_tight_pct = 0.30;
        cfg.trailing_stop_base_pct = 0.20;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_profile() {
        let mut cfg = RuntimeConfig::default();
        cfg.risk_profile = "yolo".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_live_mode_locked_outside_production() {
        std::env::remove_var("ROTATOR_ENV");
        let mut cfg = RuntimeConfig::default();
        cfg.execution_mode = ExecutionMode::Live;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_stale_exit_must_exceed_stale() {
        let mut cfg = RuntimeConfig::default();
        cfg.stale_position_hours = 48.0;
        cfg.stale_exit_hours = 24.0;
        assert!(cfg.validate().is_err());
    }
}
