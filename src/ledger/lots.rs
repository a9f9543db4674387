//! FIFO lot book
//!
//! One immutable buy record per lot, consumed oldest-first on sells.
//! Consumption order is ascending `acquired_at`, tie-broken by id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::math::{round_qty, round_usd, QTY_TOLERANCE};
use crate::types::{Mint, PositionSource};

/// One immutable buy record, subject to FIFO consumption
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lot {
    pub id: Uuid,
    pub mint: Mint,
    pub acquired_at: DateTime<Utc>,
    pub quantity_remaining: f64,
    pub quantity_original: f64,
    pub unit_cost_usd: f64,
    pub source: PositionSource,
    pub closed: bool,
}

impl Lot {
    pub fn new(
        mint: Mint,
        quantity: f64,
        unit_cost_usd: f64,
        source: PositionSource,
        acquired_at: DateTime<Utc>,
    ) -> Self {
        let quantity = round_qty(quantity);
        Self {
            id: Uuid::new_v4(),
            mint,
            acquired_at,
            quantity_remaining: quantity,
            quantity_original: quantity,
            unit_cost_usd,
            source,
            closed: quantity <= 0.0,
        }
    }

    pub fn cost_basis_usd(&self) -> f64 {
        round_usd(self.quantity_remaining * self.unit_cost_usd)
    }
}

/// Aggregation over non-closed lots for one mint
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CostBasis {
    pub total_quantity_open: f64,
    pub total_cost_basis_usd: f64,
    pub avg_cost_usd: f64,
}

/// Result of one FIFO consumption
#[derive(Debug, Clone)]
pub struct FifoConsumption {
    pub consumed_cost_basis_usd: f64,
    pub quantity_consumed: f64,
    /// Lots touched by this consumption, for write-through
    pub touched: Vec<Lot>,
}

/// Per-mint lot storage, kept in FIFO order
#[derive(Debug, Default)]
pub struct LotBook {
    lots: HashMap<Mint, Vec<Lot>>,
}

impl LotBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a lot, preserving (acquired_at, id) order
    pub fn push(&mut self, lot: Lot) {
        let lots = self.lots.entry(lot.mint.clone()).or_default();
        lots.push(lot);
        lots.sort_by(|a, b| {
            a.acquired_at
                .cmp(&b.acquired_at)
                .then_with(|| a.id.cmp(&b.id))
        });
    }

    pub fn lots_for(&self, mint: &Mint) -> &[Lot] {
        self.lots.get(mint).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Open quantity for a mint. Sniper-source lots are excluded: the sniper
    /// sub-agent shares the wallet but is hidden from rotation, and its lots
    /// must not skew coverage or cost-basis arithmetic.
    pub fn open_quantity(&self, mint: &Mint) -> f64 {
        round_qty(
            self.lots_for(mint)
                .iter()
                .filter(|l| !l.closed && l.source != PositionSource::Sniper)
                .map(|l| l.quantity_remaining)
                .sum(),
        )
    }

    /// Cost-basis aggregation over non-closed, non-sniper lots
    pub fn cost_basis(&self, mint: &Mint) -> CostBasis {
        let mut qty = 0.0;
        let mut cost = 0.0;
        for lot in self
            .lots_for(mint)
            .iter()
            .filter(|l| !l.closed && l.source != PositionSource::Sniper)
        {
            qty += lot.quantity_remaining;
            cost += lot.quantity_remaining * lot.unit_cost_usd;
        }
        let qty = round_qty(qty);
        let cost = round_usd(cost);
        CostBasis {
            total_quantity_open: qty,
            total_cost_basis_usd: cost,
            avg_cost_usd: if qty > 0.0 { cost / qty } else { 0.0 },
        }
    }

    /// Consume `quantity` in FIFO order. The last partially-consumed lot has
    /// its `quantity_remaining` decremented; lots reaching zero are closed.
    pub fn consume_fifo(&mut self, mint: &Mint, quantity: f64) -> Result<FifoConsumption> {
        let quantity = round_qty(quantity);
        if quantity <= 0.0 {
            return Err(Error::LedgerInvariantBreach(format!(
                "consume_fifo called with non-positive quantity {quantity} for {mint}"
            )));
        }

        let lots = self.lots.get_mut(mint).ok_or_else(|| Error::InsufficientToken {
            have: 0,
            requested: quantity as u64,
        })?;

        let mut remaining = quantity;
        let mut consumed_cost = 0.0;
        let mut touched = Vec::new();

        for lot in lots.iter_mut().filter(|l| !l.closed) {
            if remaining <= QTY_TOLERANCE {
                break;
            }
            let take = round_qty(remaining.min(lot.quantity_remaining));
            consumed_cost += take * lot.unit_cost_usd;
            lot.quantity_remaining = round_qty(lot.quantity_remaining - take);
            if lot.quantity_remaining <= QTY_TOLERANCE {
                lot.quantity_remaining = 0.0;
                lot.closed = true;
            }
            remaining = round_qty(remaining - take);
            touched.push(lot.clone());
        }

        if remaining > QTY_TOLERANCE {
            return Err(Error::InsufficientToken {
                have: (quantity - remaining) as u64,
                requested: quantity as u64,
            });
        }

        Ok(FifoConsumption {
            consumed_cost_basis_usd: round_usd(consumed_cost),
            quantity_consumed: quantity,
            touched,
        })
    }

    /// Close every open lot for a mint (full exit / reconciled-away)
    pub fn close_all(&mut self, mint: &Mint) -> Vec<Lot> {
        let mut touched = Vec::new();
        if let Some(lots) = self.lots.get_mut(mint) {
            for lot in lots.iter_mut().filter(|l| !l.closed) {
                lot.quantity_remaining = 0.0;
                lot.closed = true;
                touched.push(lot.clone());
            }
        }
        touched
    }

    /// Drop closed lots for mints with no open quantity (memory hygiene;
    /// the persisted rows are the history)
    pub fn compact(&mut self) {
        self.lots.retain(|_, lots| {
            lots.retain(|l| !l.closed);
            !lots.is_empty()
        });
    }

    pub fn mints(&self) -> impl Iterator<Item = &Mint> {
        self.lots.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn mint() -> Mint {
        Mint::new_unchecked("TestMint1111111111111111111111111111111111")
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_fifo_sell_across_two_lots() {
        // L1 qty=100 @ 1.00 t=1; L2 qty=50 @ 2.00 t=2; sell 120
        let mut book = LotBook::new();
        book.push(Lot::new(mint(), 100.0, 1.00, PositionSource::Bot, at(1)));
        book.push(Lot::new(mint(), 50.0, 2.00, PositionSource::Bot, at(2)));

        let result = book.consume_fifo(&mint(), 120.0).unwrap();
        // L1 consumed entirely (100.00), L2 consumed 20 (40.00)
        assert_eq!(result.consumed_cost_basis_usd, 140.0);

        let basis = book.cost_basis(&mint());
        assert_eq!(basis.total_quantity_open, 30.0);
        assert_eq!(basis.total_cost_basis_usd, 60.0);
        assert_eq!(basis.avg_cost_usd, 2.0);

        let lots = book.lots_for(&mint());
        assert!(lots[0].closed);
        assert_eq!(lots[0].quantity_remaining, 0.0);
        assert!(!lots[1].closed);
        assert_eq!(lots[1].quantity_remaining, 30.0);
    }

    #[test]
    fn test_fifo_order_tie_broken_by_id() {
        let mut book = LotBook::new();
        let mut a = Lot::new(mint(), 10.0, 1.0, PositionSource::Bot, at(5));
        let mut b = Lot::new(mint(), 10.0, 2.0, PositionSource::Bot, at(5));
        // Force a deterministic id ordering
        if a.id > b.id {
            std::mem::swap(&mut a.id, &mut b.id);
        }
        let first_id = a.id;
        book.push(b);
        book.push(a);

        let result = book.consume_fifo(&mint(), 10.0).unwrap();
        assert_eq!(result.touched.len(), 1);
        assert_eq!(result.touched[0].id, first_id);
    }

    #[test]
    fn test_consume_more_than_open_fails() {
        let mut book = LotBook::new();
        book.push(Lot::new(mint(), 10.0, 1.0, PositionSource::Bot, at(1)));
        assert!(book.consume_fifo(&mint(), 11.0).is_err());
    }

    #[test]
    fn test_sniper_lots_excluded_from_aggregates() {
        let mut book = LotBook::new();
        book.push(Lot::new(mint(), 100.0, 1.0, PositionSource::Bot, at(1)));
        book.push(Lot::new(mint(), 400.0, 1.0, PositionSource::Sniper, at(2)));

        assert_eq!(book.open_quantity(&mint()), 100.0);
        assert_eq!(book.cost_basis(&mint()).total_quantity_open, 100.0);
    }

    #[test]
    fn test_close_all_marks_closed() {
        let mut book = LotBook::new();
        book.push(Lot::new(mint(), 100.0, 1.0, PositionSource::Bot, at(1)));
        book.push(Lot::new(mint(), 50.0, 2.0, PositionSource::Bot, at(2)));
        let touched = book.close_all(&mint());
        assert_eq!(touched.len(), 2);
        assert_eq!(book.open_quantity(&mint()), 0.0);
        assert!(book.lots_for(&mint()).iter().all(|l| l.closed));
    }

    #[test]
    fn test_closed_iff_zero_remaining() {
        let mut book = LotBook::new();
        book.push(Lot::new(mint(), 10.0, 1.0, PositionSource::Bot, at(1)));
        book.consume_fifo(&mint(), 10.0).unwrap();
        let lot = &book.lots_for(&mint())[0];
        assert!(lot.closed);
        assert_eq!(lot.quantity_remaining, 0.0);
        assert_eq!(lot.quantity_original, 10.0);
    }
}
