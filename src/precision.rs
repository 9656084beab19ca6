//! Presentation-boundary rounding: f64 world in, exact decimal rounding out.
//!
//! Internal accumulation keeps full f64 precision; values are rounded only
//! when written to stored event fields or returned across the facade. The
//! reference implementation rounds with JS `toFixed`, i.e. midpoint away
//! from zero, which plain f64 arithmetic cannot reproduce exactly -- hence
//! the Decimal round trip.

use num_traits::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};

/// Decimal places kept for cost-like fields (trigger cost, deduction,
/// remaining balance).
pub const COST_DECIMALS: u32 = 2;
/// Decimal places kept for time-like fields (instants, intervals).
pub const TIME_DECIMALS: u32 = 3;

/// Convert f64 to Decimal (lossy but sufficient for the simulation range).
pub fn to_decimal(v: f64) -> Decimal {
    Decimal::from_f64(v).unwrap_or(Decimal::ZERO)
}

/// Convert Decimal back to f64.
pub fn from_decimal(d: Decimal) -> f64 {
    d.to_f64().unwrap_or(0.0)
}

fn round_dp(v: f64, dp: u32) -> f64 {
    // Non-finite input passes through untouched; callers clamp.
    if !v.is_finite() {
        return v;
    }
    from_decimal(to_decimal(v).round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero))
}

/// Round a cost-like value to its storage precision (2 decimals).
pub fn round_cost(v: f64) -> f64 {
    round_dp(v, COST_DECIMALS)
}

/// Round a time-like value to its storage precision (3 decimals).
pub fn round_time(v: f64) -> f64 {
    round_dp(v, TIME_DECIMALS)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
