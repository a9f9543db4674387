//! Swap execution: intents, preflight, simulation and the send pipeline

pub mod intent;
pub mod pipeline;
pub mod simulation;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::Error;
use crate::types::Mint;

pub use intent::TradeIntent;
pub use pipeline::SwapPipeline;

/// Terminal outcome of one swap intent, exhaustive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeStatus {
    Sent,
    Paper,
    InsufficientFunds,
    SimulationFailed,
    Error,
}

impl TradeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeStatus::Sent => "sent",
            TradeStatus::Paper => "paper",
            TradeStatus::InsufficientFunds => "insufficient_funds",
            TradeStatus::SimulationFailed => "simulation_failed",
            TradeStatus::Error => "error",
        }
    }

    /// A terminal that moved (or would move, in paper) funds
    pub fn is_fill(&self) -> bool {
        matches!(self, TradeStatus::Sent | TradeStatus::Paper)
    }
}

impl FromStr for TradeStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "sent" => Ok(TradeStatus::Sent),
            "paper" => Ok(TradeStatus::Paper),
            "insufficient_funds" => Ok(TradeStatus::InsufficientFunds),
            "simulation_failed" => Ok(TradeStatus::SimulationFailed),
            "error" => Ok(TradeStatus::Error),
            other => Err(Error::Internal(format!("unknown trade status: {other}"))),
        }
    }
}

/// Append-only record of every swap intent outcome, paper or live
#[derive(Debug, Clone, Serialize)]
pub struct TradeEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub input_mint: Mint,
    pub output_mint: Mint,
    pub in_amount_base_units: u64,
    pub out_amount_base_units: u64,
    pub status: TradeStatus,
    pub tx_sig: Option<String>,
    pub reason_code: String,
    pub fees_lamports: u64,
    pub priority_fee_lamports: u64,
    /// Computed on sells once the ledger consumes lots
    pub realized_pnl_usd: Option<f64>,
    pub meta: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        for s in [
            TradeStatus::Sent,
            TradeStatus::Paper,
            TradeStatus::InsufficientFunds,
            TradeStatus::SimulationFailed,
            TradeStatus::Error,
        ] {
            assert_eq!(s.as_str().parse::<TradeStatus>().unwrap(), s);
        }
    }

    #[test]
    fn test_fill_classification() {
        assert!(TradeStatus::Sent.is_fill());
        assert!(TradeStatus::Paper.is_fill());
        assert!(!TradeStatus::Error.is_fill());
    }
}
