//! Lot coverage assessment
//!
//! Compares the ledger's open quantity against the authoritative wallet
//! balance each tick. The outcome only affects the entry price handed to the
//! ranker and the quarantine flag; lots themselves are never altered here.

use crate::math::pnl_pct;
use crate::types::Mint;

/// Coverage window bounds, inclusive on both ends
pub const COVERAGE_RATIO_MIN: f64 = 0.5;
pub const COVERAGE_RATIO_MAX: f64 = 1.5;

/// Divergence between ledger avg cost and tracking entry price that flags
/// quarantine even when the ratio is healthy
const AVG_COST_DIVERGENCE_MAX: f64 = 0.5;

/// Outcome of one coverage assessment
#[derive(Debug, Clone)]
pub struct CoverageReport {
    pub mint: Mint,
    pub wallet_qty: f64,
    pub fifo_qty: f64,
    /// `fifo_qty / wallet_qty`, absent when the wallet balance is zero
    pub ratio: Option<f64>,
    /// Promotion of this mint is blocked while set
    pub quarantined: bool,
    /// Entry price the ranker must use this tick
    pub effective_entry_price_usd: f64,
    /// Wallet shows zero: tracking removal and lot close-out are due
    pub schedule_removal: bool,
    pub detail: String,
}

/// Assess coverage for one held mint.
///
/// `fifo_qty` must already exclude sniper-source lots; `tracking_entry` is
/// the entry price on the tracking row, `current_price` the latest observed
/// market price.
pub fn assess(
    mint: &Mint,
    wallet_qty: f64,
    fifo_qty: f64,
    ledger_avg_cost: f64,
    tracking_entry: f64,
    current_price: f64,
) -> CoverageReport {
    // Wallet shows nothing: the position is exited no matter what the book says
    if wallet_qty <= 0.0 {
        return CoverageReport {
            mint: mint.clone(),
            wallet_qty,
            fifo_qty,
            ratio: None,
            quarantined: false,
            effective_entry_price_usd: fallback_price(tracking_entry, current_price),
            schedule_removal: true,
            detail: "wallet_zero".into(),
        };
    }

    let ratio = fifo_qty / wallet_qty;

    if fifo_qty > 0.0 && (COVERAGE_RATIO_MIN..=COVERAGE_RATIO_MAX).contains(&ratio) {
        // Healthy window. A large divergence between the book's average cost
        // and the tracking entry still blocks promotion, but the book wins
        // for pricing.
        let diverged = tracking_entry > 0.0
            && pnl_pct(tracking_entry, ledger_avg_cost).abs() > AVG_COST_DIVERGENCE_MAX;
        return CoverageReport {
            mint: mint.clone(),
            wallet_qty,
            fifo_qty,
            ratio: Some(ratio),
            quarantined: diverged,
            effective_entry_price_usd: ledger_avg_cost,
            schedule_removal: false,
            detail: if diverged {
                "avg_cost_divergence".into()
            } else {
                "healthy".into()
            },
        };
    }

    // Under- or over-covered: the book is suspect. Fall back to the tracking
    // entry price, then the current price, and block promotion this tick.
    CoverageReport {
        mint: mint.clone(),
        wallet_qty,
        fifo_qty,
        ratio: Some(ratio),
        quarantined: true,
        effective_entry_price_usd: fallback_price(tracking_entry, current_price),
        schedule_removal: false,
        detail: format!("coverage_ratio_{ratio:.4}"),
    }
}

fn fallback_price(tracking_entry: f64, current_price: f64) -> f64 {
    if tracking_entry > 0.0 {
        tracking_entry
    } else {
        current_price
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mint() -> Mint {
        Mint::new_unchecked("CoverMint11111111111111111111111111111111")
    }

    #[test]
    fn test_healthy_uses_avg_cost() {
        let report = assess(&mint(), 100.0, 100.0, 1.25, 1.20, 1.40);
        assert!(!report.quarantined);
        assert_eq!(report.effective_entry_price_usd, 1.25);
        assert!(!report.schedule_removal);
    }

    #[test]
    fn test_boundary_ratios_are_healthy_inclusive() {
        // ratio exactly 0.5
        let report = assess(&mint(), 200.0, 100.0, 1.0, 1.0, 1.0);
        assert_eq!(report.ratio, Some(0.5));
        assert!(!report.quarantined);
        // ratio exactly 1.5
        let report = assess(&mint(), 100.0, 150.0, 1.0, 1.0, 1.0);
        assert_eq!(report.ratio, Some(1.5));
        assert!(!report.quarantined);
    }

    #[test]
    fn test_undercoverage_quarantines_with_tracking_fallback() {
        // fifo 100 vs wallet 500: ratio 0.2 < 0.5
        let report = assess(&mint(), 500.0, 100.0, 2.0, 1.10, 1.50);
        assert!(report.quarantined);
        assert_eq!(report.effective_entry_price_usd, 1.10);
        assert!(!report.schedule_removal);
    }

    #[test]
    fn test_overcoverage_quarantines() {
        let report = assess(&mint(), 100.0, 200.0, 2.0, 1.10, 1.50);
        assert_eq!(report.ratio, Some(2.0));
        assert!(report.quarantined);
    }

    #[test]
    fn test_fallback_to_current_when_entry_non_positive() {
        let report = assess(&mint(), 500.0, 100.0, 2.0, 0.0, 1.50);
        assert!(report.quarantined);
        assert_eq!(report.effective_entry_price_usd, 1.50);
    }

    #[test]
    fn test_wallet_zero_schedules_removal() {
        let report = assess(&mint(), 0.0, 100.0, 1.0, 1.0, 1.0);
        assert!(report.schedule_removal);
        assert!(!report.quarantined);
        assert!(report.ratio.is_none());
    }

    #[test]
    fn test_avg_cost_divergence_quarantines_but_keeps_avg() {
        // Healthy ratio, avg cost 2.0 vs entry 1.0 -> 100% divergence > 50%
        let report = assess(&mint(), 100.0, 100.0, 2.0, 1.0, 2.1);
        assert!(report.quarantined);
        assert_eq!(report.effective_entry_price_usd, 2.0);
        assert_eq!(report.detail, "avg_cost_divergence");
    }

    #[test]
    fn test_zero_fifo_with_wallet_balance_quarantines() {
        let report = assess(&mint(), 100.0, 0.0, 0.0, 1.0, 1.2);
        assert!(report.quarantined);
        assert_eq!(report.effective_entry_price_usd, 1.0);
    }
}
