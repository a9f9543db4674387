//! Position ledger
//!
//! The single source of truth for cost basis. The ranker and the rotation
//! decision consume its output; only the tick orchestrator mutates it.
//! Every mutation writes through to the durable tables.

pub mod coverage;
pub mod lots;
pub mod tracking;

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub use coverage::CoverageReport;
pub use lots::{CostBasis, Lot, LotBook};
pub use tracking::PositionTracking;

use crate::error::{Error, Result};
use crate::math::{round_qty, round_usd, QTY_TOLERANCE};
use crate::storage::Database;
use crate::types::{Mint, PositionSource};

/// Outcome of a FIFO sell
#[derive(Debug, Clone, Copy)]
pub struct SellOutcome {
    pub consumed_cost_basis_usd: f64,
    pub realized_pnl_usd: f64,
}

pub struct Ledger {
    book: LotBook,
    tracking: HashMap<Mint, PositionTracking>,
    db: Option<Arc<Database>>,
}

impl Ledger {
    pub fn new(db: Option<Arc<Database>>) -> Self {
        Self {
            book: LotBook::new(),
            tracking: HashMap::new(),
            db,
        }
    }

    /// Restore lots and tracking rows from the durable tables
    pub fn restore(db: Arc<Database>) -> Result<Self> {
        let mut book = LotBook::new();
        for lot in db.load_open_lots()? {
            book.push(lot);
        }
        let mut tracking = HashMap::new();
        for row in db.load_tracking()? {
            tracking.insert(row.mint.clone(), row);
        }
        info!(
            "Ledger restored: {} tracked mint(s)",
            tracking.len()
        );
        Ok(Self {
            book,
            tracking,
            db: Some(db),
        })
    }

    /// Append a new lot and upsert the tracking row. On subsequent buys the
    /// entry price becomes the volume-weighted mean over unclosed lots.
    pub fn record_buy(
        &mut self,
        mint: &Mint,
        quantity: f64,
        usd_value: f64,
        unit_price_usd: f64,
        source: PositionSource,
        at: DateTime<Utc>,
    ) -> Result<Lot> {
        if quantity <= 0.0 {
            return Err(Error::LedgerInvariantBreach(format!(
                "record_buy with non-positive quantity {quantity} for {mint}"
            )));
        }
        let lot = Lot::new(mint.clone(), quantity, unit_price_usd, source, at);
        self.book.push(lot.clone());

        match self.tracking.get_mut(mint) {
            Some(row) => {
                row.total_tokens = round_qty(row.total_tokens + quantity);
                let basis = self.book.cost_basis(mint);
                if basis.avg_cost_usd > 0.0 {
                    row.entry_price_usd = basis.avg_cost_usd;
                }
                row.observe_price(unit_price_usd);
            }
            None => {
                self.tracking.insert(
                    mint.clone(),
                    PositionTracking::new(mint.clone(), unit_price_usd, quantity, source, at),
                );
            }
        }

        self.persist_lot(&lot)?;
        self.persist_tracking(mint)?;
        debug!(
            mint = %mint,
            quantity,
            usd_value,
            unit_price_usd,
            "recorded buy lot"
        );
        Ok(lot)
    }

    /// Consume lots FIFO and realize P&L against the consumed cost basis
    pub fn record_sell(
        &mut self,
        mint: &Mint,
        quantity: f64,
        proceeds_usd: f64,
        _at: DateTime<Utc>,
    ) -> Result<SellOutcome> {
        let consumption = self.book.consume_fifo(mint, quantity)?;
        let realized = round_usd(proceeds_usd - consumption.consumed_cost_basis_usd);

        if let Some(row) = self.tracking.get_mut(mint) {
            row.total_tokens = round_qty((row.total_tokens - quantity).max(0.0));
        }

        for lot in &consumption.touched {
            self.persist_lot(lot)?;
        }
        self.persist_tracking(mint)?;

        debug!(
            mint = %mint,
            quantity,
            proceeds_usd,
            consumed = consumption.consumed_cost_basis_usd,
            realized,
            "recorded sell"
        );
        Ok(SellOutcome {
            consumed_cost_basis_usd: consumption.consumed_cost_basis_usd,
            realized_pnl_usd: realized,
        })
    }

    /// Aggregation over non-closed lots
    pub fn get_cost_basis(&self, mint: &Mint) -> CostBasis {
        self.book.cost_basis(mint)
    }

    /// Batched equivalent for tick-time ranking
    pub fn get_batch_cost_basis(&self, mints: &[Mint]) -> HashMap<Mint, CostBasis> {
        mints
            .iter()
            .map(|m| (m.clone(), self.book.cost_basis(m)))
            .collect()
    }

    /// Synthesize a lot for a wallet holding seen above threshold without
    /// tracking. The discovered price becomes the entry.
    pub fn wallet_discovery_ingest(
        &mut self,
        mint: &Mint,
        quantity: f64,
        price_usd: f64,
        earliest_on_chain_time: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<Lot> {
        let acquired_at = earliest_on_chain_time.unwrap_or(now);
        info!(
            mint = %mint,
            quantity,
            price_usd,
            "wallet discovery: synthesizing lot"
        );
        self.record_buy(
            mint,
            quantity,
            round_usd(quantity * price_usd),
            price_usd,
            PositionSource::WalletDiscovery,
            acquired_at,
        )
    }

    /// Assess lot coverage against the authoritative wallet balance
    pub fn coverage(&self, mint: &Mint, wallet_qty: f64, current_price: f64) -> CoverageReport {
        let basis = self.book.cost_basis(mint);
        let tracking_entry = self
            .tracking
            .get(mint)
            .map(|t| t.entry_price_usd)
            .unwrap_or(0.0);
        let report = coverage::assess(
            mint,
            wallet_qty,
            basis.total_quantity_open,
            basis.avg_cost_usd,
            tracking_entry,
            current_price,
        );
        if report.quarantined {
            warn!(
                mint = %mint,
                ratio = ?report.ratio,
                detail = %report.detail,
                "position quarantined"
            );
        }
        report
    }

    /// Per-tick price refresh for a tracked mint
    pub fn observe_price(&mut self, mint: &Mint, price_usd: f64) -> Result<()> {
        if let Some(row) = self.tracking.get_mut(mint) {
            row.observe_price(price_usd);
            self.persist_tracking(mint)?;
        }
        Ok(())
    }

    /// Reconcile a tracked quantity against the observed wallet balance
    pub fn sync_wallet_quantity(&mut self, mint: &Mint, wallet_qty: f64) -> Result<()> {
        if let Some(row) = self.tracking.get_mut(mint) {
            if (row.total_tokens - wallet_qty).abs() > QTY_TOLERANCE {
                row.total_tokens = round_qty(wallet_qty);
                self.persist_tracking(mint)?;
            }
        }
        Ok(())
    }

    /// Promotion resets the peak so the trailing stop starts fresh
    pub fn promote_to_core(&mut self, mint: &Mint, current_price_usd: f64) -> Result<()> {
        let row = self
            .tracking
            .get_mut(mint)
            .ok_or_else(|| Error::Internal(format!("promote: no tracking for {mint}")))?;
        row.promote_to_core(current_price_usd);
        self.persist_tracking(mint)?;
        info!(mint = %mint, price = current_price_usd, "promoted to core, peak reset");
        Ok(())
    }

    /// Full exit: close all open lots and remove the tracking row
    pub fn full_exit(&mut self, mint: &Mint) -> Result<Option<PositionTracking>> {
        let touched = self.book.close_all(mint);
        for lot in &touched {
            self.persist_lot(lot)?;
        }
        let removed = self.tracking.remove(mint);
        if removed.is_some() {
            if let Some(db) = &self.db {
                db.delete_tracking(mint)?;
            }
        }
        self.book.compact();
        Ok(removed)
    }

    pub fn tracking(&self, mint: &Mint) -> Option<&PositionTracking> {
        self.tracking.get(mint)
    }

    pub fn positions(&self) -> Vec<PositionTracking> {
        self.tracking.values().cloned().collect()
    }

    pub fn held_mints(&self) -> Vec<Mint> {
        self.tracking.keys().cloned().collect()
    }

    pub fn is_held(&self, mint: &Mint) -> bool {
        self.tracking.contains_key(mint)
    }

    /// Internal consistency check. A breach is fatal to trading.
    pub fn verify_integrity(&self) -> Result<()> {
        for (mint, lots) in self.tracking.iter().map(|(m, _)| (m, self.book.lots_for(m))) {
            for lot in lots {
                if lot.quantity_remaining < 0.0
                    || lot.quantity_remaining > lot.quantity_original + QTY_TOLERANCE
                {
                    return Err(Error::LedgerInvariantBreach(format!(
                        "lot {} for {mint}: remaining {} vs original {}",
                        lot.id, lot.quantity_remaining, lot.quantity_original
                    )));
                }
                if lot.closed != (lot.quantity_remaining == 0.0) {
                    return Err(Error::LedgerInvariantBreach(format!(
                        "lot {} for {mint}: closed={} remaining={}",
                        lot.id, lot.closed, lot.quantity_remaining
                    )));
                }
            }
        }
        Ok(())
    }

    fn persist_lot(&self, lot: &Lot) -> Result<()> {
        if let Some(db) = &self.db {
            db.upsert_lot(lot)?;
        }
        Ok(())
    }

    fn persist_tracking(&self, mint: &Mint) -> Result<()> {
        if let (Some(db), Some(row)) = (&self.db, self.tracking.get(mint)) {
            db.upsert_tracking(row)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn mint() -> Mint {
        Mint::new_unchecked("LedgerMint11111111111111111111111111111111")
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_buy_sell_roundtrip_restores_open_quantity() {
        let mut ledger = Ledger::new(None);
        let prior = ledger.get_cost_basis(&mint()).total_quantity_open;

        ledger
            .record_buy(&mint(), 100.0, 100.0, 1.0, PositionSource::Bot, at(1))
            .unwrap();
        ledger.record_sell(&mint(), 100.0, 100.0, at(2)).unwrap();

        assert_eq!(ledger.get_cost_basis(&mint()).total_quantity_open, prior);
    }

    #[test]
    fn test_fifo_sell_realized_pnl() {
        // Seed scenario: L1 (100 @ 1.00), L2 (50 @ 2.00); sell 120 for 240
        let mut ledger = Ledger::new(None);
        ledger
            .record_buy(&mint(), 100.0, 100.0, 1.0, PositionSource::Bot, at(1))
            .unwrap();
        ledger
            .record_buy(&mint(), 50.0, 100.0, 2.0, PositionSource::Bot, at(2))
            .unwrap();

        let outcome = ledger.record_sell(&mint(), 120.0, 240.0, at(3)).unwrap();
        assert_eq!(outcome.consumed_cost_basis_usd, 140.0);
        assert_eq!(outcome.realized_pnl_usd, 100.0);
        assert_eq!(ledger.get_cost_basis(&mint()).total_quantity_open, 30.0);
    }

    #[test]
    fn test_realized_pnl_sums_exactly() {
        let mut ledger = Ledger::new(None);
        ledger
            .record_buy(&mint(), 300.0, 300.0, 1.0, PositionSource::Bot, at(1))
            .unwrap();

        let mut total_proceeds = 0.0;
        let mut total_consumed = 0.0;
        let mut total_realized = 0.0;
        for (qty, proceeds) in [(100.0, 150.0), (50.0, 40.0), (150.0, 150.0)] {
            let o = ledger.record_sell(&mint(), qty, proceeds, at(2)).unwrap();
            total_proceeds += proceeds;
            total_consumed += o.consumed_cost_basis_usd;
            total_realized += o.realized_pnl_usd;
        }
        assert_eq!(total_realized, total_proceeds - total_consumed);
    }

    #[test]
    fn test_subsequent_buy_updates_vwap_entry() {
        let mut ledger = Ledger::new(None);
        ledger
            .record_buy(&mint(), 100.0, 100.0, 1.0, PositionSource::Bot, at(1))
            .unwrap();
        ledger
            .record_buy(&mint(), 100.0, 300.0, 3.0, PositionSource::Bot, at(2))
            .unwrap();

        let row = ledger.tracking(&mint()).unwrap();
        assert_eq!(row.total_tokens, 200.0);
        assert_eq!(row.entry_price_usd, 2.0);
    }

    #[test]
    fn test_wallet_discovery_creates_tracking() {
        let mut ledger = Ledger::new(None);
        ledger
            .wallet_discovery_ingest(&mint(), 500.0, 0.02, None, at(100))
            .unwrap();

        let row = ledger.tracking(&mint()).unwrap();
        assert_eq!(row.source, PositionSource::WalletDiscovery);
        assert_eq!(row.entry_price_usd, 0.02);
        assert_eq!(row.total_tokens, 500.0);

        let lots = ledger.book.lots_for(&mint());
        assert_eq!(lots.len(), 1);
        assert_eq!(lots[0].acquired_at, at(100));
    }

    #[test]
    fn test_full_exit_closes_lots_and_removes_tracking() {
        let mut ledger = Ledger::new(None);
        ledger
            .record_buy(&mint(), 100.0, 100.0, 1.0, PositionSource::Bot, at(1))
            .unwrap();
        let removed = ledger.full_exit(&mint()).unwrap();
        assert!(removed.is_some());
        assert!(ledger.tracking(&mint()).is_none());
        assert_eq!(ledger.get_cost_basis(&mint()).total_quantity_open, 0.0);
    }

    #[test]
    fn test_quarantine_coverage_flow() {
        // Seed scenario: fifo 100 vs wallet 500 -> ratio 0.2, quarantined
        let mut ledger = Ledger::new(None);
        ledger
            .record_buy(&mint(), 100.0, 100.0, 1.0, PositionSource::Bot, at(1))
            .unwrap();
        let report = ledger.coverage(&mint(), 500.0, 1.5);
        assert!(report.quarantined);
        assert_eq!(report.effective_entry_price_usd, 1.0);
    }

    #[test]
    fn test_integrity_check_passes_on_normal_flow() {
        let mut ledger = Ledger::new(None);
        ledger
            .record_buy(&mint(), 100.0, 100.0, 1.0, PositionSource::Bot, at(1))
            .unwrap();
        ledger.record_sell(&mint(), 40.0, 60.0, at(2)).unwrap();
        ledger.verify_integrity().unwrap();
    }
}
