//! Named risk-profile presets
//!
//! A profile is a bundle of overrides overlaid on the current config.
//! Selecting one does not touch fields outside its bundle.

use serde::{Deserialize, Serialize};

use super::RuntimeConfig;

/// Named risk profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskProfile {
    Conservative,
    Moderate,
    High,
    Degen,
}

impl RiskProfile {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "conservative" => Some(RiskProfile::Conservative),
            "moderate" => Some(RiskProfile::Moderate),
            "high" => Some(RiskProfile::High),
            "degen" => Some(RiskProfile::Degen),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RiskProfile::Conservative => "conservative",
            RiskProfile::Moderate => "moderate",
            RiskProfile::High => "high",
            RiskProfile::Degen => "degen",
        }
    }

    /// Legacy priority-fee fallback used when the fee governor is disabled
    pub fn fallback_priority_fee_lamports(&self) -> u64 {
        match self {
            RiskProfile::Degen => 5_000_000,
            RiskProfile::High => 2_000_000,
            RiskProfile::Moderate => 1_000_000,
            RiskProfile::Conservative => 500_000,
        }
    }

    /// Overlay this profile's bundle onto a config
    pub fn apply(&self, cfg: &mut RuntimeConfig) {
        cfg.risk_profile = self.name().to_string();
        match self {
            RiskProfile::Conservative => {
                cfg.max_daily_drawdown_pct = 0.03;
                cfg.max_turnover_pct_per_day = 1.0;
                cfg.take_profit_pct = 0.25;
                cfg.scout_stop_loss_pct = 0.12;
                cfg.loss_exit_pct = 0.20;
                cfg.cap_max_total_exposure_pct = 0.60;
                cfg.scout_buy_sol = 0.10;
            }
            RiskProfile::Moderate => {
                cfg.max_daily_drawdown_pct = 0.05;
                cfg.max_turnover_pct_per_day = 2.0;
                cfg.take_profit_pct = 0.40;
                cfg.scout_stop_loss_pct = 0.18;
                cfg.loss_exit_pct = 0.30;
                cfg.cap_max_total_exposure_pct = 0.90;
                cfg.scout_buy_sol = 0.25;
            }
            RiskProfile::High => {
                cfg.max_daily_drawdown_pct = 0.08;
                cfg.max_turnover_pct_per_day = 3.0;
                cfg.take_profit_pct = 0.60;
                cfg.scout_stop_loss_pct = 0.25;
                cfg.loss_exit_pct = 0.40;
                cfg.cap_max_total_exposure_pct = 0.95;
                cfg.scout_buy_sol = 0.50;
            }
            RiskProfile::Degen => {
                cfg.max_daily_drawdown_pct = 0.12;
                cfg.max_turnover_pct_per_day = 5.0;
                cfg.take_profit_pct = 1.00;
                cfg.scout_stop_loss_pct = 0.35;
                cfg.loss_exit_pct = 0.50;
                cfg.cap_max_total_exposure_pct = 1.00;
                cfg.scout_buy_sol = 1.00;
            }
        }
    }
}
