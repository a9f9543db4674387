//! Trade intents and fee-context inference

use serde::Serialize;

use crate::fees::{Lane, Side, TradeContext, Urgency};
use crate::types::Mint;

/// One swap the decision layer wants executed
#[derive(Debug, Clone, Serialize)]
pub struct TradeIntent {
    pub input_mint: Mint,
    pub output_mint: Mint,
    pub amount_base_units: u64,
    /// Free-form strategy tag, e.g. "scout_entry", "trailing_stop_exit"
    pub strategy_tag: String,
    pub reason_code: String,
    /// Defensive liquidation: skip the governor and use the legacy fallback
    pub is_usdc_to_sol: bool,
    /// Retry-ladder index, 1-based, bumped across ticks on re-attempts
    pub attempt: u32,
    pub meta: serde_json::Value,
}

impl TradeIntent {
    pub fn side(&self) -> Side {
        if self.input_mint.is_sol() {
            Side::Buy
        } else {
            Side::Sell
        }
    }

    pub fn lane(&self) -> Lane {
        let tag = self.strategy_tag.to_lowercase();
        let meta_scout = self
            .meta
            .get("lane")
            .and_then(|v| v.as_str())
            .map(|s| s == "scout")
            .unwrap_or(false);
        if tag.contains("scout") || tag.contains("autonomous") || meta_scout {
            Lane::Scout
        } else {
            Lane::Core
        }
    }

    pub fn urgency(&self) -> Urgency {
        if self.side() == Side::Sell {
            return Urgency::High;
        }
        let tag = self.strategy_tag.to_lowercase();
        let meta_high = self
            .meta
            .get("urgency")
            .and_then(|v| v.as_str())
            .map(|s| s == "high")
            .unwrap_or(false);
        if tag.contains("exit") || tag.contains("stop") || tag.contains("trailing") || meta_high {
            Urgency::High
        } else {
            Urgency::Normal
        }
    }

    /// Assemble the fee-governor context once the notional is known
    pub fn fee_context(&self, notional_sol: f64) -> TradeContext {
        TradeContext {
            lane: self.lane(),
            side: self.side(),
            notional_sol,
            urgency: self.urgency(),
            attempt: self.attempt,
        }
    }
}
