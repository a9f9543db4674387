//! Per-tick telemetry and observer broadcast

use chrono::{DateTime, Utc};
use serde::Serialize;

/// One durable row per tick
#[derive(Debug, Clone, Serialize)]
pub struct TickTelemetry {
    pub ts: DateTime<Utc>,
    pub tick_seq: u64,
    pub equity_usd: f64,
    pub sol_balance_lamports: u64,
    pub positions: usize,
    pub candidates: usize,
    pub action: String,
    pub reason_code: Option<String>,
    pub paused: bool,
    pub quarantined: usize,
    pub duration_ms: u64,
}

/// State update pushed to attached observers after each tick
#[derive(Debug, Clone, Serialize)]
pub struct TickSummary {
    pub tick_seq: u64,
    pub ts: DateTime<Utc>,
    pub equity_usd: f64,
    pub positions: usize,
    pub action: String,
    pub reason_code: Option<String>,
    pub paused: bool,
}

impl From<&TickTelemetry> for TickSummary {
    fn from(t: &TickTelemetry) -> Self {
        Self {
            tick_seq: t.tick_seq,
            ts: t.ts,
            equity_usd: t.equity_usd,
            positions: t.positions,
            action: t.action.clone(),
            reason_code: t.reason_code.clone(),
            paused: t.paused,
        }
    }
}
