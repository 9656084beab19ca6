// Costline Engine - Time/Cost Inverter
// Numeric integration of the roster recovery rate along the backward
// clock: given a span, how much recovers (accumulate); given a required
// amount, how long it takes (solve_for_duration). The rate is piecewise
// constant over modifier and charge windows, so a fixed fine step with an
// exact final partial step is both simple and accurate.

use thiserror::Error;
use tracing::warn;

use crate::rate::total_recovery_rate;
use crate::store::RuleStore;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Integration step in seconds.
pub const TIME_STEP: f64 = 0.001;
/// Rates below this are treated as stalled for the final partial step.
pub const RATE_EPSILON: f64 = 1e-9;
/// Solve bound: a single interval longer than this aborts the pass.
pub const MAX_SOLVE_SECONDS: f64 = 3_600.0;

#[derive(Debug, Error, PartialEq)]
pub enum SolveError {
    /// The required amount cannot recover within the solve bound; the
    /// roster rate is effectively stalled.
    #[error("recovery stalled: {required} units not recovered after {elapsed} s")]
    RecoveryStalled { required: f64, elapsed: f64 },
}

// ---------------------------------------------------------------------------
// Integration
// ---------------------------------------------------------------------------

/// Resource recovered over `duration` seconds ending as the clock reaches
/// `end_instant - duration`, i.e. walking backward from `end_instant`.
/// The final step shrinks to the remaining span so fractional durations
/// integrate exactly.
pub fn accumulate(store: &RuleStore, duration: f64, end_instant: f64) -> f64 {
    if duration <= 0.0 {
        return 0.0;
    }
    let mut recovered = 0.0;
    let mut instant = end_instant;
    let mut remaining = duration;
    while remaining > 0.0 {
        let step = remaining.min(TIME_STEP);
        recovered += total_recovery_rate(store, Some(instant)) * step;
        instant -= step;
        remaining -= step;
    }
    recovered
}

/// Seconds of backward clock needed to recover `required_cost`, starting
/// at `start_instant`. Steps at `TIME_STEP` and finishes with an exact
/// partial step `(required - recovered) / rate`, so the result is not
/// quantized to the step size. Zero-rate stretches are walked through
/// (a modifier window may open further down the clock); if the total
/// elapsed span exceeds `MAX_SOLVE_SECONDS` the solve aborts instead of
/// spinning forever.
pub fn solve_for_duration(
    store: &RuleStore,
    required_cost: f64,
    start_instant: f64,
) -> Result<f64, SolveError> {
    if required_cost <= 0.0 {
        return Ok(0.0);
    }
    let mut recovered = 0.0;
    let mut elapsed = 0.0;
    let mut instant = start_instant;
    loop {
        let rate = total_recovery_rate(store, Some(instant));
        if rate > RATE_EPSILON && recovered + rate * TIME_STEP >= required_cost {
            return Ok(elapsed + (required_cost - recovered) / rate);
        }
        recovered += rate * TIME_STEP;
        elapsed += TIME_STEP;
        instant -= TIME_STEP;
        if elapsed > MAX_SOLVE_SECONDS {
            warn!(required_cost, elapsed, "solve bound exceeded");
            return Err(SolveError::RecoveryStalled {
                required: required_cost,
                elapsed,
            });
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EffectDirection, MagnitudeKind, RuleKind};

    fn flat_rate_store(rate: f64) -> RuleStore {
        let mut store = RuleStore::new();
        store.add_character("Alice", rate, 3.0, 0.0, false).unwrap();
        store
    }

    #[test]
    fn test_accumulate_constant_rate() {
        let store = flat_rate_store(0.07);
        let recovered = accumulate(&store, 10.0, 100.0);
        assert!((recovered - 0.7).abs() < 1e-6, "{recovered}");
    }

    #[test]
    fn test_accumulate_fractional_duration() {
        let store = flat_rate_store(0.07);
        let recovered = accumulate(&store, 0.0005, 100.0);
        assert!((recovered - 0.07 * 0.0005).abs() < 1e-12, "{recovered}");
    }

    #[test]
    fn test_accumulate_zero_and_negative_duration() {
        let store = flat_rate_store(0.07);
        assert_eq!(accumulate(&store, 0.0, 100.0), 0.0);
        assert_eq!(accumulate(&store, -5.0, 100.0), 0.0);
    }

    #[test]
    fn test_solve_constant_rate() {
        let store = flat_rate_store(0.07);
        let elapsed = solve_for_duration(&store, 3.0, 240.0).unwrap();
        assert!((elapsed - 3.0 / 0.07).abs() < 1e-6, "{elapsed}");
    }

    #[test]
    fn test_solve_non_positive_required_is_instant() {
        let store = flat_rate_store(0.07);
        assert_eq!(solve_for_duration(&store, 0.0, 240.0), Ok(0.0));
        assert_eq!(solve_for_duration(&store, -1.0, 240.0), Ok(0.0));
    }

    #[test]
    fn test_solve_respects_rate_windows() {
        let mut store = flat_rate_store(0.07);
        let a = store.characters[0].id;
        // double the rate on [200, 240): the first 40 s recover at 0.14
        store
            .add_rule(RuleKind::RateModifier {
                target_character_ids: vec![a],
                activation_time: Some(240.0),
                duration: 40.0,
                magnitude_kind: MagnitudeKind::Percentage,
                magnitude: 100.0,
                direction: EffectDirection::Increase,
            })
            .unwrap();
        // 40 s * 0.14 = 5.6, then (7.0 - 5.6) / 0.07 = 20 s more
        let elapsed = solve_for_duration(&store, 7.0, 240.0).unwrap();
        assert!((elapsed - 60.0).abs() < 1e-3, "{elapsed}");
    }

    #[test]
    fn test_solve_crosses_zero_rate_stretch() {
        let mut store = flat_rate_store(0.07);
        let a = store.characters[0].id;
        // rate is zeroed on [90, 100); recovery resumes below 90
        store
            .add_rule(RuleKind::RateModifier {
                target_character_ids: vec![a],
                activation_time: Some(100.0),
                duration: 10.0,
                magnitude_kind: MagnitudeKind::Flat,
                magnitude: 1.0,
                direction: EffectDirection::Decrease,
            })
            .unwrap();
        let elapsed = solve_for_duration(&store, 0.7, 100.0).unwrap();
        // 10 dead seconds plus 10 s at 0.07
        assert!((elapsed - 20.0).abs() < 1e-3, "{elapsed}");
    }

    #[test]
    fn test_solve_stalls_on_zero_rate() {
        let store = flat_rate_store(0.0);
        let err = solve_for_duration(&store, 1.0, 100.0).unwrap_err();
        match err {
            SolveError::RecoveryStalled { required, elapsed } => {
                assert_eq!(required, 1.0);
                assert!(elapsed > MAX_SOLVE_SECONDS);
            }
        }
    }

    #[test]
    fn test_accumulate_inverts_solve() {
        let store = flat_rate_store(0.07);
        let elapsed = solve_for_duration(&store, 2.5, 180.0).unwrap();
        let recovered = accumulate(&store, elapsed, 180.0);
        assert!((recovered - 2.5).abs() < 1e-6, "{recovered}");
    }
}
