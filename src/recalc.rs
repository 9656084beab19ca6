// Costline Engine - Timeline Recalculation
// Walks the event sequence top to bottom, deriving each row's clock time,
// interval, charged deduction, and remaining balance. Sequence order is
// authoritative; declared times of normal rows are recomputed, passive
// rows keep theirs. The running balance is carried at full precision and
// rounded only when written into event fields.

use tracing::{debug, warn};

use crate::cost::{apply_cost, ChargeContext, RunCounters};
use crate::precision::{round_cost, round_time};
use crate::solver::{accumulate, solve_for_duration, SolveError};
use crate::store::RuleStore;
use crate::types::{RecalcOutcome, Warning, SURGE_PASSIVE_BONUS, SURGE_PASSIVE_NAME};

/// Recalculate every event row from scratch. Reference errors (deleted
/// characters, dangling anchors or bindings) are reported as warnings and
/// skipped; only a stalled solve aborts the pass, and an aborted pass
/// restores the stored rows to their pre-pass state.
pub fn recalculate_all(
    store: &mut RuleStore,
    counters: &mut RunCounters,
) -> Result<RecalcOutcome, SolveError> {
    counters.reset();
    let mut warnings = Vec::new();
    // Rows are settled in place so rate windows see live times; keep the
    // pre-pass rows so an aborted pass can roll back.
    let rows_before = store.events.clone();

    for cc in &store.continuous_charges {
        if store.event(cc.target_event_id).is_none() {
            warnings.push(Warning::DanglingContinuousCharge {
                target_event_id: cc.target_event_id,
            });
        }
    }

    let cap = store.total_cap;
    // Balance and clock carried at full precision between rows.
    let mut prev_remaining = 0.0_f64;
    let mut prev_time = store.initialization_time;
    let mut first_settled = true;
    let mut final_balance = 0.0_f64;

    for index in 0..store.events.len() {
        let event = store.events[index].clone();

        let Some(character) = store.character(event.character_id).cloned() else {
            warn!(event_id = event.id, character_id = event.character_id, "event references unknown character");
            warnings.push(Warning::UnknownCharacter {
                event_id: event.id,
                character_id: event.character_id,
            });
            continue;
        };

        if first_settled {
            // Sentinel row: declared cost and the initialization clock,
            // nothing charged yet.
            let remaining = event.cost.clamp(0.0, cap);
            let row = &mut store.events[index];
            row.time = round_time(store.initialization_time);
            row.time_interval = 0.0;
            row.cost_deduction = 0.0;
            row.remaining_cost = round_cost(remaining);
            prev_remaining = remaining;
            prev_time = store.initialization_time;
            final_balance = remaining;
            first_settled = false;
            continue;
        }

        if event.is_passive() {
            // Passive rows keep their declared clock time; the balance
            // they observe is derived by integrating up to that instant.
            let interval = (prev_time - event.time).max(0.0);
            let recovered = accumulate(store, interval, prev_time);
            let observed = (prev_remaining + recovered).min(cap);
            let mut remaining = observed;
            // every passive row of the surge character refunds the bonus,
            // whichever special action it carries
            if character.name == SURGE_PASSIVE_NAME {
                remaining = (remaining + SURGE_PASSIVE_BONUS).min(cap);
            }
            let row = &mut store.events[index];
            row.cost = round_cost(observed);
            row.time_interval = round_time(interval);
            row.cost_deduction = 0.0;
            row.remaining_cost = round_cost(remaining);
            prev_remaining = remaining;
            prev_time = event.time;
            final_balance = remaining;
            continue;
        }

        // Normal row: solve for how long the declared trigger cost takes
        // to recover from the previous balance.
        let required = event.cost - prev_remaining;
        let interval = if required <= 0.0 {
            0.0
        } else {
            match solve_for_duration(store, required, prev_time) {
                Ok(interval) => interval,
                Err(e) => {
                    store.events = rows_before;
                    counters.reset();
                    return Err(e);
                }
            }
        };
        let time = prev_time - interval;

        let use_count = counters.next_use_count(character.id);
        let charged = apply_cost(
            store,
            character.id,
            character.skill_cost_at(use_count),
            ChargeContext::Event(event.id),
            counters,
            use_count,
            &mut warnings,
        );
        // Cannot deduct more than was available at the trigger instant.
        let deduction = charged.min(event.cost);
        let remaining = (event.cost - deduction).clamp(0.0, cap);

        debug!(
            event_id = event.id,
            character = %character.name,
            interval,
            charged,
            "event settled"
        );
        let row = &mut store.events[index];
        row.time = round_time(time);
        row.time_interval = round_time(interval);
        row.cost_deduction = round_cost(deduction);
        row.remaining_cost = round_cost(remaining);
        prev_remaining = remaining;
        prev_time = time;
        final_balance = remaining;
    }

    Ok(RecalcOutcome {
        events: store.events.clone(),
        final_balance: round_cost(final_balance),
        warnings,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
