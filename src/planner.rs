// Costline Engine - Planning Helpers
// Steady-state efficiency summaries and a greedy skill-order plan:
// simulate the balance forward over a span and fire the cheapest
// affordable skill at each opportunity.

use std::cmp::Ordering;

use serde::Serialize;

use crate::cost::{apply_cost, ChargeContext, RunCounters};
use crate::precision::{round_cost, round_time};
use crate::rate::{resolve_rate, total_recovery_rate};
use crate::solver::TIME_STEP;
use crate::store::RuleStore;
use crate::types::{EntityId, ACTION_SKILL};

/// One step of a planned skill rotation. Times are seconds elapsed from
/// the start of the plan window.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedAction {
    pub time: f64,
    pub character_id: EntityId,
    pub character_name: String,
    pub action: String,
    pub cost_before: f64,
    pub cost_used: f64,
    pub cost_after: f64,
}

/// Steady-state effective recovery rate of one character with every
/// modifier considered active, rounded for presentation.
pub fn cost_efficiency(store: &RuleStore, character_id: EntityId) -> f64 {
    round_cost(resolve_rate(store, character_id, None))
}

/// Roster-wide steady-state recovery rate.
pub fn total_cost_efficiency(store: &RuleStore) -> f64 {
    round_cost(total_recovery_rate(store, None))
}

/// Greedy rotation over `duration` seconds starting from an empty
/// balance at the initialization instant: the balance accumulates at the
/// live roster rate and the cheapest affordable skill fires as soon as
/// it can. Zero-cost uses are excluded, otherwise a fully reduced skill
/// would fire unboundedly.
pub fn optimal_skill_order(store: &RuleStore, duration: f64) -> Vec<PlannedAction> {
    let mut counters = RunCounters::new();
    let mut plan = Vec::new();
    let mut balance = 0.0_f64;
    let mut elapsed = 0.0_f64;

    while elapsed <= duration {
        loop {
            let candidate = store
                .characters
                .iter()
                .filter_map(|c| {
                    let next_use = counters.peek_use_count(c.id) + 1;
                    let mut scratch = counters.clone();
                    let mut probe_warnings = Vec::new();
                    let cost = apply_cost(
                        store,
                        c.id,
                        c.skill_cost_at(next_use),
                        ChargeContext::NoEvent,
                        &mut scratch,
                        next_use,
                        &mut probe_warnings,
                    );
                    (cost > 0.0 && cost <= balance).then_some((c, cost))
                })
                .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));
            let Some((character, _)) = candidate else {
                break;
            };

            let use_count = counters.next_use_count(character.id);
            let mut warnings = Vec::new();
            let cost = apply_cost(
                store,
                character.id,
                character.skill_cost_at(use_count),
                ChargeContext::NoEvent,
                &mut counters,
                use_count,
                &mut warnings,
            );
            plan.push(PlannedAction {
                time: round_time(elapsed),
                character_id: character.id,
                character_name: character.name.clone(),
                action: ACTION_SKILL.to_string(),
                cost_before: round_cost(balance),
                cost_used: cost,
                cost_after: round_cost(balance - cost),
            });
            balance -= cost;
        }

        let instant = store.initialization_time - elapsed;
        balance = (balance + total_recovery_rate(store, Some(instant)) * TIME_STEP)
            .min(store.total_cap);
        elapsed += TIME_STEP;
    }
    plan
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
