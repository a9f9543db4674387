//! Slot accounting over the two position tiers
//!
//! Core and scout slots are bounded by config. The board is a pure view over
//! the ledger's tracking rows; transitions themselves are executed by the
//! orchestrator through the ledger.

use crate::config::RuntimeConfig;
use crate::ledger::PositionTracking;
use crate::types::{PositionSource, SlotType};

/// Occupancy snapshot for one tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotUsage {
    pub core_used: usize,
    pub scout_used: usize,
}

impl SlotUsage {
    pub fn from_positions<'a>(positions: impl IntoIterator<Item = &'a PositionTracking>) -> Self {
        let mut usage = SlotUsage::default();
        for p in positions {
            match p.slot_type {
                SlotType::Core => usage.core_used += 1,
                SlotType::Scout => usage.scout_used += 1,
            }
        }
        usage
    }

    pub fn has_free_core(&self, cfg: &RuntimeConfig) -> bool {
        self.core_used < cfg.core_slots
    }

    pub fn has_free_scout(&self, cfg: &RuntimeConfig) -> bool {
        self.scout_used < cfg.scout_slots
    }
}

/// A position whose USD value fell below the dust threshold is eligible for
/// silent removal, unless the sniper sub-agent owns it.
pub fn is_dust(position: &PositionTracking, cfg: &RuntimeConfig) -> bool {
    position.source != PositionSource::Sniper
        && position.market_value_usd() < cfg.dust_threshold_usd
}

/// A wallet holding large enough to deserve tracking
pub fn above_tracking_threshold(value_usd: f64, cfg: &RuntimeConfig) -> bool {
    value_usd >= cfg.min_position_usd
}
