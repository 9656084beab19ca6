// Costline Engine
// Cost-axis timeline calculator: recovery-rate resolution, rule-driven
// cost derivation, numeric time/cost inversion, and full-timeline
// recalculation, behind a wasm facade for the web frontend and a plain
// Rust API for native use.

mod cost;
mod planner;
mod precision;
mod rate;
mod recalc;
mod solver;
mod store;
mod types;

pub use cost::{apply_cost, can_perform_action, feasibility_check, ChargeContext, CounterKey, RunCounters};
pub use planner::{cost_efficiency, optimal_skill_order, total_cost_efficiency, PlannedAction};
pub use precision::{round_cost, round_time, COST_DECIMALS, TIME_DECIMALS};
pub use rate::{resolve_rate, total_recovery_rate};
pub use recalc::recalculate_all;
pub use solver::{accumulate, solve_for_duration, SolveError, MAX_SOLVE_SECONDS, RATE_EPSILON, TIME_STEP};
pub use store::{RuleStore, ValidationError};
pub use types::*;

use wasm_bindgen::prelude::*;

// ─── Wasm Interface ──────────────────────────────────────────────────────────

/// One simulation session: the rule store plus the per-run counters the
/// last recalculation left behind.
#[wasm_bindgen]
pub struct CostlineSimulation {
    store: RuleStore,
    counters: RunCounters,
}

#[wasm_bindgen]
impl CostlineSimulation {
    /// Session seeded with the default roster.
    #[wasm_bindgen(constructor)]
    pub fn new() -> CostlineSimulation {
        console_error_panic_hook::set_once();
        CostlineSimulation {
            store: RuleStore::with_default_roster(),
            counters: RunCounters::new(),
        }
    }

    /// Session with an empty roster.
    pub fn empty() -> CostlineSimulation {
        console_error_panic_hook::set_once();
        CostlineSimulation {
            store: RuleStore::new(),
            counters: RunCounters::new(),
        }
    }

    // ─── Recalculation ───────────────────────────────────────────────────────

    /// Recalculate the whole timeline; returns the `RecalcOutcome` as a
    /// JS object, or throws on a stalled solve.
    pub fn recalculate_all(&mut self) -> Result<JsValue, JsValue> {
        let outcome = recalc::recalculate_all(&mut self.store, &mut self.counters)
            .map_err(|e| JsValue::from_str(&e.to_string()))?;
        Ok(serde_wasm_bindgen::to_value(&outcome).unwrap_or(JsValue::NULL))
    }

    pub fn reset_counters(&mut self) {
        self.counters.reset();
    }

    // ─── Rates and solving ───────────────────────────────────────────────────

    pub fn resolve_rate(&self, character_id: EntityId, instant: Option<f64>) -> f64 {
        rate::resolve_rate(&self.store, character_id, instant)
    }

    pub fn total_recovery_rate(&self, instant: Option<f64>) -> f64 {
        rate::total_recovery_rate(&self.store, instant)
    }

    pub fn accumulate(&self, duration: f64, end_instant: f64) -> f64 {
        solver::accumulate(&self.store, duration, end_instant)
    }

    pub fn solve_for_duration(
        &self,
        required_cost: f64,
        start_instant: f64,
    ) -> Result<f64, JsValue> {
        solver::solve_for_duration(&self.store, required_cost, start_instant)
            .map_err(|e| JsValue::from_str(&e.to_string()))
    }

    pub fn feasibility_check(&self, character_id: EntityId, base_cost: f64) -> f64 {
        cost::feasibility_check(&self.store, character_id, base_cost)
    }

    pub fn can_perform_action(&self, character_id: EntityId, balance: f64) -> bool {
        cost::can_perform_action(&self.store, character_id, &self.counters, balance)
    }

    // ─── Roster ──────────────────────────────────────────────────────────────

    pub fn add_character(
        &mut self,
        name: &str,
        base_recovery_rate: f64,
        skill_cost: f64,
        increase_value: f64,
        is_booster: bool,
    ) -> Result<EntityId, JsValue> {
        self.store
            .add_character(name, base_recovery_rate, skill_cost, increase_value, is_booster)
            .map_err(|e| JsValue::from_str(&e.to_string()))
    }

    pub fn update_character(
        &mut self,
        id: EntityId,
        name: &str,
        base_recovery_rate: f64,
        skill_cost: f64,
        increase_value: f64,
        is_booster: bool,
    ) -> Result<(), JsValue> {
        self.store
            .update_character(id, name, base_recovery_rate, skill_cost, increase_value, is_booster)
            .map_err(|e| JsValue::from_str(&e.to_string()))
    }

    pub fn delete_character(&mut self, id: EntityId) -> Result<(), JsValue> {
        self.store
            .delete_character(id)
            .map_err(|e| JsValue::from_str(&e.to_string()))
    }

    pub fn characters(&self) -> JsValue {
        serde_wasm_bindgen::to_value(&self.store.characters).unwrap_or(JsValue::NULL)
    }

    // ─── Rules ───────────────────────────────────────────────────────────────

    /// `kind` is a tagged `RuleKind` object, e.g.
    /// `{kind: "reduction", targetCharacterIds: [..], effectCount: 1, reductionValue: 1.0}`.
    pub fn add_rule(&mut self, kind: JsValue) -> Result<EntityId, JsValue> {
        let kind: RuleKind = serde_wasm_bindgen::from_value(kind)?;
        self.store
            .add_rule(kind)
            .map_err(|e| JsValue::from_str(&e.to_string()))
    }

    pub fn update_rule(&mut self, id: EntityId, kind: JsValue) -> Result<(), JsValue> {
        let kind: RuleKind = serde_wasm_bindgen::from_value(kind)?;
        self.store
            .update_rule(id, kind)
            .map_err(|e| JsValue::from_str(&e.to_string()))
    }

    pub fn delete_rule(&mut self, id: EntityId) -> Result<(), JsValue> {
        self.store
            .delete_rule(id)
            .map_err(|e| JsValue::from_str(&e.to_string()))
    }

    // ─── Timeline ────────────────────────────────────────────────────────────

    pub fn add_event(
        &mut self,
        character_id: EntityId,
        action: &str,
        cost: f64,
        time: f64,
    ) -> Result<EntityId, JsValue> {
        self.store
            .add_event(character_id, action, cost, time)
            .map_err(|e| JsValue::from_str(&e.to_string()))
    }

    pub fn update_event(&mut self, id: EntityId, cost: f64, time: f64) -> Result<(), JsValue> {
        self.store
            .update_event(id, cost, time)
            .map_err(|e| JsValue::from_str(&e.to_string()))
    }

    pub fn delete_event(&mut self, id: EntityId) -> Result<(), JsValue> {
        self.store
            .delete_event(id)
            .map_err(|e| JsValue::from_str(&e.to_string()))
    }

    pub fn delete_events(&mut self, ids: Vec<EntityId>) {
        self.store.delete_events(&ids);
    }

    pub fn events(&self) -> JsValue {
        serde_wasm_bindgen::to_value(&self.store.events).unwrap_or(JsValue::NULL)
    }

    pub fn add_continuous_charge(
        &mut self,
        target_event_id: EntityId,
        delay: f64,
        duration: f64,
        recovery_boost: f64,
    ) -> Result<(), JsValue> {
        self.store
            .add_continuous_charge(target_event_id, delay, duration, recovery_boost)
            .map_err(|e| JsValue::from_str(&e.to_string()))
    }

    pub fn clear_continuous_charges(&mut self) {
        self.store.clear_continuous_charges();
    }

    // ─── Settings ────────────────────────────────────────────────────────────

    pub fn set_total_cap(&mut self, cap: f64) -> Result<(), JsValue> {
        self.store
            .set_total_cap(cap)
            .map_err(|e| JsValue::from_str(&e.to_string()))
    }

    pub fn set_initialization_time(&mut self, instant: f64) {
        self.store.set_initialization_time(instant);
    }

    // ─── Planning ────────────────────────────────────────────────────────────

    pub fn optimal_skill_order(&self, duration: f64) -> JsValue {
        let plan = planner::optimal_skill_order(&self.store, duration);
        serde_wasm_bindgen::to_value(&plan).unwrap_or(JsValue::NULL)
    }

    pub fn cost_efficiency(&self, character_id: EntityId) -> f64 {
        planner::cost_efficiency(&self.store, character_id)
    }

    pub fn total_cost_efficiency(&self) -> f64 {
        planner::total_cost_efficiency(&self.store)
    }

    // ─── Persistence ─────────────────────────────────────────────────────────

    pub fn export_json(&self) -> String {
        self.store.export_json()
    }

    pub fn import_json(&mut self, json: &str) -> Result<(), JsValue> {
        self.store =
            RuleStore::import_json(json).map_err(|e| JsValue::from_str(&e.to_string()))?;
        self.counters.reset();
        Ok(())
    }

    pub fn snapshot(&self) -> JsValue {
        serde_wasm_bindgen::to_value(&self.store.snapshot()).unwrap_or(JsValue::NULL)
    }
}

impl Default for CostlineSimulation {
    fn default() -> Self {
        Self::new()
    }
}

// Native-side access for benches and embedding without the wasm ABI.
impl CostlineSimulation {
    pub fn store(&self) -> &RuleStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut RuleStore {
        &mut self.store
    }

    pub fn counters_mut(&mut self) -> &mut RunCounters {
        &mut self.counters
    }
}
