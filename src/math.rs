//! Money arithmetic helpers
//!
//! All cost-basis and P&L math funnels through these functions. Quantities
//! round half-even to 1e-9, USD amounts to 1e-6. Comparisons at boundary
//! values must be exact after rounding.

/// Tolerance used when reconciling ledger quantities against tracking rows
pub const QTY_TOLERANCE: f64 = 1e-6;

/// Round half-even at the given number of decimal places
fn round_half_even(value: f64, decimals: i32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let scale = 10f64.powi(decimals);
    let scaled = value * scale;
    let floor = scaled.floor();
    let frac = scaled - floor;
    // Exactly-halfway cases go to the even neighbor
    let rounded = if (frac - 0.5).abs() < 1e-9 {
        if (floor as i64) % 2 == 0 {
            floor
        } else {
            floor + 1.0
        }
    } else {
        scaled.round()
    };
    rounded / scale
}

/// Round a token quantity (UI units) to 1e-9
pub fn round_qty(value: f64) -> f64 {
    round_half_even(value, 9)
}

/// Round a USD amount to 1e-6
pub fn round_usd(value: f64) -> f64 {
    round_half_even(value, 6)
}

/// Truncating clamp
pub fn clamp(value: f64, min: f64, max: f64) -> f64 {
    value.max(min).min(max)
}

/// Percent change of `current` over `entry`, as a decimal. Zero entry yields
/// zero rather than infinity.
pub fn pnl_pct(entry: f64, current: f64) -> f64 {
    if entry <= 0.0 {
        return 0.0;
    }
    (current - entry) / entry
}

/// Normalize a user-visible percentage (e.g. 25.0) into an internal decimal
/// (0.25). Values already in [0, 1] are passed through unchanged, so the
/// function is idempotent.
pub fn normalize_pct(value: f64) -> f64 {
    if value > 1.0 {
        value / 100.0
    } else {
        value
    }
}

/// Inverse of [`normalize_pct`] for display
pub fn display_pct(decimal: f64) -> f64 {
    decimal * 100.0
}

/// Convert lamports to SOL
pub fn lamports_to_sol(lamports: u64) -> f64 {
    lamports as f64 / 1e9
}

/// Convert SOL to lamports, truncating
pub fn sol_to_lamports(sol: f64) -> u64 {
    if sol <= 0.0 {
        return 0;
    }
    (sol * 1e9) as u64
}

/// Convert base units to UI units given token decimals
pub fn base_units_to_ui(base_units: u64, decimals: u8) -> f64 {
    base_units as f64 / 10f64.powi(decimals as i32)
}

/// Convert UI units to base units given token decimals, truncating
pub fn ui_to_base_units(ui: f64, decimals: u8) -> u64 {
    if ui <= 0.0 {
        return 0;
    }
    (ui * 10f64.powi(decimals as i32)) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_half_even_ties() {
        // .5 ties go to the even neighbor
        assert_eq!(round_half_even(0.5, 0), 0.0);
        assert_eq!(round_half_even(1.5, 0), 2.0);
        assert_eq!(round_half_even(2.5, 0), 2.0);
        assert_eq!(round_half_even(3.5, 0), 4.0);
    }

    #[test]
    fn test_round_qty_precision() {
        assert_eq!(round_qty(1.0000000004), 1.0);
        assert_eq!(round_qty(1.0000000016), 1.000000002);
    }

    #[test]
    fn test_round_usd_precision() {
        assert_eq!(round_usd(140.0000004), 140.0);
        assert_eq!(round_usd(99.9999996), 100.0);
    }

    #[test]
    fn test_pnl_pct() {
        assert_eq!(pnl_pct(1.0, 1.5), 0.5);
        assert_eq!(pnl_pct(2.0, 1.0), -0.5);
        assert_eq!(pnl_pct(0.0, 5.0), 0.0);
    }

    #[test]
    fn test_normalize_pct_roundtrip() {
        // User-facing 25.0 becomes 0.25; 0.25 stays 0.25
        assert_eq!(normalize_pct(25.0), 0.25);
        assert_eq!(normalize_pct(0.25), 0.25);
        assert_eq!(normalize_pct(normalize_pct(25.0)), 0.25);
        assert_eq!(display_pct(normalize_pct(25.0)), 25.0);
        // 1.0 means 100%, not 1%
        assert_eq!(normalize_pct(1.0), 1.0);
    }

    #[test]
    fn test_unit_conversions() {
        assert_eq!(sol_to_lamports(1.5), 1_500_000_000);
        assert_eq!(lamports_to_sol(2_000_000_000), 2.0);
        assert_eq!(base_units_to_ui(1_000_000, 6), 1.0);
        assert_eq!(ui_to_base_units(2.5, 6), 2_500_000);
        assert_eq!(ui_to_base_units(-1.0, 6), 0);
    }

    #[test]
    fn test_clamp() {
        assert_eq!(clamp(5.0, -1.0, 1.0), 1.0);
        assert_eq!(clamp(-5.0, -1.0, 1.0), -1.0);
        assert_eq!(clamp(0.3, -1.0, 1.0), 0.3);
    }
}
