//! Daily risk circuit
//!
//! Per-day (CST midnight bounded) baseline equity, observed equity and
//! turnover. Once tripped by drawdown or turnover the circuit stays tripped
//! until the day boundary; manual pause is orthogonal and config-driven.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::RuntimeConfig;

/// CST is a fixed UTC-6 offset for day-boundary purposes
fn cst() -> FixedOffset {
    FixedOffset::west_opt(6 * 3600).expect("static offset")
}

/// Day key in CST, e.g. "2026-03-01"
pub fn day_key(now: DateTime<Utc>) -> String {
    now.with_timezone(&cst()).format("%Y-%m-%d").to_string()
}

pub const REASON_DRAWDOWN: &str = "daily_drawdown_breached";
pub const REASON_TURNOVER: &str = "daily_turnover_cap";
pub const REASON_MANUAL: &str = "manual_pause";

/// Singleton per trading day
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskState {
    pub day_key: String,
    pub baseline_equity_usd: f64,
    pub current_equity_usd: f64,
    pub turnover_usd: f64,
    pub paused: bool,
    pub pause_reason: Option<String>,
}

impl RiskState {
    pub fn new(day_key: String, baseline_equity_usd: f64) -> Self {
        Self {
            day_key,
            baseline_equity_usd,
            current_equity_usd: baseline_equity_usd,
            turnover_usd: 0.0,
            paused: false,
            pause_reason: None,
        }
    }

    pub fn drawdown_pct(&self) -> f64 {
        if self.baseline_equity_usd <= 0.0 {
            return 0.0;
        }
        (self.baseline_equity_usd - self.current_equity_usd) / self.baseline_equity_usd
    }

    pub fn turnover_pct(&self) -> f64 {
        if self.baseline_equity_usd <= 0.0 {
            return 0.0;
        }
        self.turnover_usd / self.baseline_equity_usd
    }
}

/// The drawdown/turnover breaker
pub struct RiskCircuit {
    state: RiskState,
}

impl RiskCircuit {
    pub fn new(now: DateTime<Utc>, baseline_equity_usd: f64) -> Self {
        Self {
            state: RiskState::new(day_key(now), baseline_equity_usd),
        }
    }

    pub fn from_state(state: RiskState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &RiskState {
        &self.state
    }

    /// Roll the day at CST midnight: baseline reset to current equity,
    /// turnover zeroed, auto-trips cleared. Returns true when a roll happened.
    pub fn roll_day_if_needed(&mut self, now: DateTime<Utc>) -> bool {
        let key = day_key(now);
        if key == self.state.day_key {
            return false;
        }
        info!(
            old_day = %self.state.day_key,
            new_day = %key,
            "risk circuit day boundary: baseline reset"
        );
        let equity = self.state.current_equity_usd;
        self.state = RiskState::new(key, equity);
        true
    }

    /// Record the latest observed equity
    pub fn observe_equity(&mut self, equity_usd: f64) {
        self.state.current_equity_usd = equity_usd;
        if self.state.baseline_equity_usd <= 0.0 && equity_usd > 0.0 {
            self.state.baseline_equity_usd = equity_usd;
        }
    }

    /// Accumulate executed notional into the daily turnover
    pub fn add_turnover(&mut self, usd: f64) {
        if usd > 0.0 {
            self.state.turnover_usd += usd;
        }
    }

    /// Evaluate the breaker. Trips latch until the day boundary.
    pub fn evaluate(&mut self, cfg: &RuntimeConfig) -> Option<String> {
        if !self.state.paused {
            if self.state.drawdown_pct() >= cfg.max_daily_drawdown_pct {
                self.trip(REASON_DRAWDOWN);
            } else if self.state.turnover_pct() >= cfg.max_turnover_pct_per_day {
                self.trip(REASON_TURNOVER);
            }
        }
        self.pause_reason(cfg)
    }

    /// Current pause reason, accounting for the orthogonal manual pause
    pub fn pause_reason(&self, cfg: &RuntimeConfig) -> Option<String> {
        if cfg.manual_pause {
            return Some(REASON_MANUAL.to_string());
        }
        if self.state.paused {
            return self.state.pause_reason.clone();
        }
        None
    }

    fn trip(&mut self, reason: &str) {
        warn!(
            reason,
            drawdown_pct = self.state.drawdown_pct(),
            turnover_pct = self.state.turnover_pct(),
            "risk circuit tripped"
        );
        self.state.paused = true;
        self.state.pause_reason = Some(reason.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn cfg() -> RuntimeConfig {
        RuntimeConfig::default()
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_drawdown_trip_seed_scenario() {
        // Baseline 1000, equity 949: drawdown 5.1% >= 5% limit
        let mut circuit = RiskCircuit::new(at(0), 1000.0);
        circuit.observe_equity(949.0);
        let reason = circuit.evaluate(&cfg());
        assert_eq!(reason.as_deref(), Some(REASON_DRAWDOWN));
        assert!(circuit.state().paused);
    }

    #[test]
    fn test_trip_latches_across_recovery() {
        let mut circuit = RiskCircuit::new(at(0), 1000.0);
        circuit.observe_equity(940.0);
        circuit.evaluate(&cfg()).unwrap();
        // Equity recovers, circuit stays tripped
        circuit.observe_equity(1_000.0);
        let reason = circuit.evaluate(&cfg());
        assert_eq!(reason.as_deref(), Some(REASON_DRAWDOWN));
    }

    #[test]
    fn test_turnover_cap() {
        let mut circuit = RiskCircuit::new(at(0), 1000.0);
        circuit.add_turnover(1_500.0);
        circuit.add_turnover(600.0);
        // 2100 / 1000 = 2.1 >= 2.0 default
        let reason = circuit.evaluate(&cfg());
        assert_eq!(reason.as_deref(), Some(REASON_TURNOVER));
    }

    #[test]
    fn test_manual_pause_is_orthogonal() {
        let circuit = RiskCircuit::new(at(0), 1000.0);
        let mut cfg = cfg();
        cfg.manual_pause = true;
        assert_eq!(circuit.pause_reason(&cfg).as_deref(), Some(REASON_MANUAL));
        cfg.manual_pause = false;
        assert!(circuit.pause_reason(&cfg).is_none());
    }

    #[test]
    fn test_day_roll_clears_auto_trip_and_resets() {
        let mut circuit = RiskCircuit::new(at(0), 1000.0);
        circuit.observe_equity(940.0);
        circuit.evaluate(&cfg()).unwrap();
        circuit.add_turnover(500.0);

        // Next CST day
        let rolled = circuit.roll_day_if_needed(at(86_400 * 2));
        assert!(rolled);
        let state = circuit.state();
        assert!(!state.paused);
        assert_eq!(state.turnover_usd, 0.0);
        assert_eq!(state.baseline_equity_usd, 940.0);
        assert!(circuit.evaluate(&cfg()).is_none());
    }

    #[test]
    fn test_same_day_does_not_roll() {
        let mut circuit = RiskCircuit::new(at(0), 1000.0);
        assert!(!circuit.roll_day_if_needed(at(60)));
    }

    #[test]
    fn test_day_key_is_cst() {
        // 2026-01-02T03:00Z is still 2026-01-01 in UTC-6
        let t = Utc.with_ymd_and_hms(2026, 1, 2, 3, 0, 0).unwrap();
        assert_eq!(day_key(t), "2026-01-01");
        let t = Utc.with_ymd_and_hms(2026, 1, 2, 7, 0, 0).unwrap();
        assert_eq!(day_key(t), "2026-01-02");
    }
}
