// Costline Engine - Recovery Rate Resolver
// Per-character recovery rate at an instant, folding in windowed rate
// modifiers, the global booster percentage, and event-bound continuous
// charge windows.

use std::cmp::Ordering;

use crate::store::RuleStore;
use crate::types::{EffectDirection, EntityId, MagnitudeKind, RuleKind};

// ---------------------------------------------------------------------------
// Window tests
// ---------------------------------------------------------------------------

/// A modifier with activation instant `a` and duration `d` is active on
/// the half-open window `[a - d, a)`. `None` activation is always active.
pub fn modifier_window_contains(activation: Option<f64>, duration: f64, instant: f64) -> bool {
    match activation {
        None => true,
        Some(a) => instant >= a - duration && instant < a,
    }
}

/// A continuous charge bound to an event firing at `event_time` is active
/// on `[event_time - delay - duration, event_time - delay)`.
pub fn charge_window_contains(event_time: f64, delay: f64, duration: f64, instant: f64) -> bool {
    let end = event_time - delay;
    instant >= end - duration && instant < end
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// One modifier competing for its (direction, magnitude-kind) slot.
struct Candidate {
    activation: Option<f64>,
    /// Position in the rule list; later-added wins ties.
    index: usize,
    magnitude: f64,
}

/// Latest activation wins; `None` (always-active) loses to any timed
/// modifier; remaining ties go to the later-added rule.
fn pick_winner(mut candidates: Vec<Candidate>) -> f64 {
    candidates.sort_by(|a, b| {
        let ka = a.activation.unwrap_or(f64::NEG_INFINITY);
        let kb = b.activation.unwrap_or(f64::NEG_INFINITY);
        kb.partial_cmp(&ka)
            .unwrap_or(Ordering::Equal)
            .then(b.index.cmp(&a.index))
    });
    candidates.first().map(|c| c.magnitude).unwrap_or(0.0)
}

/// Strongest active continuous-charge boost for a character: bindings are
/// ranked by their target event's time, latest first, and the first one
/// whose window contains the instant wins. Bindings to deleted events are
/// ignored here (the recalculation pass reports them).
fn continuous_boost(store: &RuleStore, character_id: EntityId, instant: f64) -> f64 {
    let mut bound: Vec<(f64, f64, f64, f64)> = store
        .continuous_charges
        .iter()
        .filter_map(|cc| {
            let event = store.event(cc.target_event_id)?;
            if event.character_id != character_id {
                return None;
            }
            Some((event.time, cc.delay, cc.duration, cc.recovery_boost))
        })
        .collect();
    bound.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
    bound
        .iter()
        .find(|(time, delay, duration, _)| charge_window_contains(*time, *delay, *duration, instant))
        .map(|(_, _, _, boost)| *boost)
        .unwrap_or(0.0)
}

/// Effective recovery rate of one character at `instant`. `None` asks for
/// the steady-state rate with every modifier considered active (used by
/// efficiency summaries). Unknown characters resolve to 0.
///
/// rate = max(0, (base + flat + continuous) * (1 + pct / 100))
///
/// where `pct` is the booster percentage plus the winning percentage
/// modifiers and `flat` the winning flat modifiers, one winner per
/// (direction, magnitude-kind) slot.
pub fn resolve_rate(store: &RuleStore, character_id: EntityId, instant: Option<f64>) -> f64 {
    let Some(character) = store.character(character_id) else {
        return 0.0;
    };

    let mut slots: [Vec<Candidate>; 4] = [Vec::new(), Vec::new(), Vec::new(), Vec::new()];
    for (index, rule) in store.rules.iter().enumerate() {
        let RuleKind::RateModifier {
            target_character_ids,
            activation_time,
            duration,
            magnitude_kind,
            magnitude,
            direction,
        } = &rule.kind
        else {
            continue;
        };
        if !target_character_ids.contains(&character_id) {
            continue;
        }
        let active = match instant {
            Some(t) => modifier_window_contains(*activation_time, *duration, t),
            None => true,
        };
        if !active {
            continue;
        }
        let slot = match (direction, magnitude_kind) {
            (EffectDirection::Increase, MagnitudeKind::Percentage) => 0,
            (EffectDirection::Decrease, MagnitudeKind::Percentage) => 1,
            (EffectDirection::Increase, MagnitudeKind::Flat) => 2,
            (EffectDirection::Decrease, MagnitudeKind::Flat) => 3,
        };
        slots[slot].push(Candidate {
            activation: *activation_time,
            index,
            magnitude: *magnitude,
        });
    }
    let [pct_inc, pct_dec, flat_inc, flat_dec] = slots.map(pick_winner);

    let mut pct = store.booster().map_or(0.0, |b| b.increase_value);
    pct += pct_inc - pct_dec;

    let mut flat = flat_inc - flat_dec;
    if let Some(t) = instant {
        flat += continuous_boost(store, character_id, t);
    }

    let mult = 1.0 + pct / 100.0;
    ((character.base_recovery_rate + flat) * mult).max(0.0)
}

/// Roster-wide recovery rate: the sum over every character.
pub fn total_recovery_rate(store: &RuleStore, instant: Option<f64>) -> f64 {
    store
        .characters
        .iter()
        .map(|c| resolve_rate(store, c.id, instant))
        .sum()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
