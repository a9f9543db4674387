//! Mutable per-mint position state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Mint, PositionSource, SlotType};

/// One mutable row per held mint. Created on first buy, updated each tick,
/// destroyed on full exit or dust classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionTracking {
    pub mint: Mint,
    pub entry_time: DateTime<Utc>,
    pub entry_price_usd: f64,
    pub total_tokens: f64,
    pub last_price_usd: f64,
    pub peak_price_usd: f64,
    pub slot_type: SlotType,
    pub source: PositionSource,
}

impl PositionTracking {
    pub fn new(
        mint: Mint,
        entry_price_usd: f64,
        total_tokens: f64,
        source: PositionSource,
        entry_time: DateTime<Utc>,
    ) -> Self {
        Self {
            mint,
            entry_time,
            entry_price_usd,
            total_tokens,
            last_price_usd: entry_price_usd,
            peak_price_usd: entry_price_usd,
            slot_type: SlotType::Scout,
            source,
        }
    }

    /// Per-tick price refresh. Peak only ratchets up here.
    pub fn observe_price(&mut self, price_usd: f64) {
        if price_usd < 0.0 {
            return;
        }
        self.last_price_usd = price_usd;
        if price_usd > self.peak_price_usd {
            self.peak_price_usd = price_usd;
        }
    }

    /// Promotion to core resets the peak so the trailing stop starts fresh
    pub fn promote_to_core(&mut self, current_price_usd: f64) {
        self.slot_type = SlotType::Core;
        self.peak_price_usd = current_price_usd;
        self.last_price_usd = current_price_usd;
    }

    pub fn hours_held(&self, now: DateTime<Utc>) -> f64 {
        (now - self.entry_time).num_milliseconds().max(0) as f64 / 3_600_000.0
    }

    pub fn market_value_usd(&self) -> f64 {
        self.total_tokens * self.last_price_usd
    }
}
