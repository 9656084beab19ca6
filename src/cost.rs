// Costline Engine - Rule Application
// Charged-cost derivation for one skill use: the water-support synthetic
// first-use reduction, budgeted reduction rules (newest wins, one per
// use), and cost overrides. Counters live outside the store so a pass can
// reset them without touching persisted state.

use std::collections::HashMap;

use crate::precision::round_cost;
use crate::store::RuleStore;
use crate::types::{
    EntityId, RuleKind, Warning, ACTION_FEE_CUT, WATER_SUPPORT_NAME, WATER_SUPPORT_REDUCTION,
};

// ---------------------------------------------------------------------------
// Run counters
// ---------------------------------------------------------------------------

/// Keys for per-run bookkeeping. Typed keys instead of stitched strings
/// so a rule id can never collide with a character id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CounterKey {
    /// Times a reduction rule has fired this run.
    Reduction(EntityId),
    /// Times the water-support synthetic reduction fired for a character.
    SupportReduction(EntityId),
    /// Skill uses by a character this run.
    UseCount(EntityId),
}

/// Per-recalculation counters; reset at the start of every pass.
#[derive(Debug, Clone, Default)]
pub struct RunCounters {
    map: HashMap<CounterKey, u32>,
}

impl RunCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.map.clear();
    }

    pub fn get(&self, key: CounterKey) -> u32 {
        self.map.get(&key).copied().unwrap_or(0)
    }

    pub fn increment(&mut self, key: CounterKey) -> u32 {
        let entry = self.map.entry(key).or_insert(0);
        *entry += 1;
        *entry
    }

    /// Record one more skill use and return the 1-based use count.
    pub fn next_use_count(&mut self, character_id: EntityId) -> u32 {
        self.increment(CounterKey::UseCount(character_id))
    }

    /// Use count so far without recording a use.
    pub fn peek_use_count(&self, character_id: EntityId) -> u32 {
        self.get(CounterKey::UseCount(character_id))
    }
}

// ---------------------------------------------------------------------------
// Application context
// ---------------------------------------------------------------------------

/// Where a cost derivation happens. Event-anchored rules need a sequence
/// position to compare against; the other contexts have none.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeContext {
    /// Settling a concrete timeline event: anchors compare by position.
    Event(EntityId),
    /// Pre-commit feasibility probe: anchors gate on existence only.
    PreValidation,
    /// Hypothetical use outside the timeline (planning): only anchor-less
    /// reductions apply.
    NoEvent,
}

// ---------------------------------------------------------------------------
// Cost derivation
// ---------------------------------------------------------------------------

/// Whether the water-support marker row unlocks the synthetic first-use
/// reduction for this context.
fn support_marker_active(store: &RuleStore, ctx: ChargeContext) -> bool {
    let Some(support) = store.character_by_name(WATER_SUPPORT_NAME) else {
        return false;
    };
    let marker_pos = store
        .events
        .iter()
        .position(|e| e.character_id == support.id && e.action == ACTION_FEE_CUT);
    let Some(marker_pos) = marker_pos else {
        return false;
    };
    match ctx {
        ChargeContext::Event(event_id) => match store.event_position(event_id) {
            Some(pos) => marker_pos < pos,
            None => true,
        },
        ChargeContext::PreValidation | ChargeContext::NoEvent => true,
    }
}

/// Whether an anchored reduction rule applies in this context. Pushes a
/// warning (and skips the rule) when the anchor event is gone.
fn anchor_applies(
    store: &RuleStore,
    rule_id: EntityId,
    anchor_event_id: Option<EntityId>,
    ctx: ChargeContext,
    warnings: &mut Vec<Warning>,
) -> bool {
    let Some(anchor) = anchor_event_id else {
        return true;
    };
    if ctx == ChargeContext::NoEvent {
        return false;
    }
    let Some(anchor_pos) = store.event_position(anchor) else {
        warnings.push(Warning::MissingAnchorEvent {
            rule_id,
            anchor_event_id: anchor,
        });
        return false;
    };
    match ctx {
        ChargeContext::Event(event_id) => match store.event_position(event_id) {
            Some(pos) => anchor_pos < pos,
            None => true,
        },
        _ => true,
    }
}

/// Charged cost for one skill use after reductions and overrides.
///
/// Resolution order:
/// 1. the water-support synthetic reduction, on a character's first use
///    while the marker row is in force (one-shot per character per run);
/// 2. the newest reduction rule targeting the character; if its budget is
///    spent the synthetic reduction (when unlocked) stands instead;
/// 3. a cost override anchored to the event replaces the result outright
///    (last-added wins);
/// 4. clamp at zero and round to storage precision.
pub fn apply_cost(
    store: &RuleStore,
    character_id: EntityId,
    base_cost: f64,
    ctx: ChargeContext,
    counters: &mut RunCounters,
    use_count: u32,
    warnings: &mut Vec<Warning>,
) -> f64 {
    let mut reduction = 0.0;
    let mut support_active = false;

    let is_support = store
        .character_by_name(WATER_SUPPORT_NAME)
        .is_some_and(|s| s.id == character_id);
    if !is_support
        && use_count == 1
        && counters.get(CounterKey::SupportReduction(character_id)) == 0
        && support_marker_active(store, ctx)
    {
        reduction = WATER_SUPPORT_REDUCTION;
        support_active = true;
    }

    // Newest rule wins; only the first match is considered.
    let selected = store.rules.iter().rev().find(|rule| {
        matches!(&rule.kind, RuleKind::Reduction { target_character_ids, anchor_event_id, .. }
            if target_character_ids.contains(&character_id)
                && anchor_applies(store, rule.id, *anchor_event_id, ctx, warnings))
    });
    if let Some(rule) = selected {
        if let RuleKind::Reduction {
            effect_count,
            reduction_value,
            ..
        } = &rule.kind
        {
            if counters.get(CounterKey::Reduction(rule.id)) < *effect_count {
                counters.increment(CounterKey::Reduction(rule.id));
                reduction = *reduction_value;
                support_active = false;
            }
            // exhausted budget: the synthetic reduction, if unlocked,
            // stays in effect
        }
    }
    if support_active {
        counters.increment(CounterKey::SupportReduction(character_id));
    }

    let mut cost = base_cost - reduction;

    if let ChargeContext::Event(event_id) = ctx {
        let override_value = store
            .rules
            .iter()
            .rev()
            .find_map(|rule| match &rule.kind {
                RuleKind::Override {
                    anchor_event_id,
                    change_value,
                } if *anchor_event_id == event_id => Some(*change_value),
                _ => None,
            });
        if let Some(value) = override_value {
            cost = value;
        }
    }

    round_cost(cost.max(0.0))
}

/// Pre-commit probe: the cost a first use would charge right now, without
/// consuming any budgets. Diagnostics are discarded; the caller only
/// wants the number.
pub fn feasibility_check(store: &RuleStore, character_id: EntityId, base_cost: f64) -> f64 {
    let mut scratch = RunCounters::new();
    let mut warnings = Vec::new();
    apply_cost(
        store,
        character_id,
        base_cost,
        ChargeContext::PreValidation,
        &mut scratch,
        1,
        &mut warnings,
    )
}

/// Whether a character could fire their next skill use from the given
/// balance. Counters are cloned; probing never consumes budgets.
pub fn can_perform_action(
    store: &RuleStore,
    character_id: EntityId,
    counters: &RunCounters,
    balance: f64,
) -> bool {
    let Some(character) = store.character(character_id) else {
        return false;
    };
    let next_use = counters.peek_use_count(character_id) + 1;
    let mut scratch = counters.clone();
    let mut warnings = Vec::new();
    let cost = apply_cost(
        store,
        character_id,
        character.skill_cost_at(next_use),
        ChargeContext::NoEvent,
        &mut scratch,
        next_use,
        &mut warnings,
    );
    balance >= cost
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ACTION_SKILL;

    fn apply(
        store: &RuleStore,
        character_id: EntityId,
        base_cost: f64,
        ctx: ChargeContext,
        counters: &mut RunCounters,
        use_count: u32,
    ) -> (f64, Vec<Warning>) {
        let mut warnings = Vec::new();
        let cost = apply_cost(
            store,
            character_id,
            base_cost,
            ctx,
            counters,
            use_count,
            &mut warnings,
        );
        (cost, warnings)
    }

    fn store_with_support() -> (RuleStore, EntityId, EntityId) {
        let mut store = RuleStore::new();
        let support = store
            .add_character(WATER_SUPPORT_NAME, 0.07, 3.0, 20.2, true)
            .unwrap();
        let a = store.add_character("Alice", 0.07, 3.0, 0.0, false).unwrap();
        (store, support, a)
    }

    #[test]
    fn test_no_rules_passthrough() {
        let (store, _, a) = store_with_support();
        let mut counters = RunCounters::new();
        let (cost, warnings) = apply(&store, a, 3.0, ChargeContext::NoEvent, &mut counters, 1);
        assert_eq!(cost, 3.0);
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_support_marker_reduces_first_use_after_marker() {
        let (mut store, support, a) = store_with_support();
        store.add_event(support, ACTION_FEE_CUT, 0.0, 100.0).unwrap();
        let ev = store.add_event(a, ACTION_SKILL, 3.0, 80.0).unwrap();
        let mut counters = RunCounters::new();

        let (cost, _) = apply(&store, a, 3.0, ChargeContext::Event(ev), &mut counters, 1);
        assert_eq!(cost, 2.0);

        // one-shot: the same character's next first-use probe pays full
        let (cost2, _) = apply(&store, a, 3.0, ChargeContext::Event(ev), &mut counters, 1);
        assert_eq!(cost2, 3.0);
    }

    #[test]
    fn test_support_marker_must_precede_event() {
        let (mut store, support, a) = store_with_support();
        let ev = store.add_event(a, ACTION_SKILL, 3.0, 120.0).unwrap();
        store.add_event(support, ACTION_FEE_CUT, 0.0, 100.0).unwrap();
        let mut counters = RunCounters::new();
        let (cost, _) = apply(&store, a, 3.0, ChargeContext::Event(ev), &mut counters, 1);
        assert_eq!(cost, 3.0);
    }

    #[test]
    fn test_support_reduction_skips_support_itself_and_later_uses() {
        let (mut store, support, a) = store_with_support();
        store.add_event(support, ACTION_FEE_CUT, 0.0, 100.0).unwrap();
        let ev = store.add_event(a, ACTION_SKILL, 3.0, 80.0).unwrap();
        let sv = store.add_event(support, ACTION_SKILL, 3.0, 70.0).unwrap();
        let mut counters = RunCounters::new();

        let (support_cost, _) =
            apply(&store, support, 3.0, ChargeContext::Event(sv), &mut counters, 1);
        assert_eq!(support_cost, 3.0);

        let (second_use, _) = apply(&store, a, 3.0, ChargeContext::Event(ev), &mut counters, 2);
        assert_eq!(second_use, 3.0);
    }

    #[test]
    fn test_reduction_rule_budget_exhausts() {
        let (mut store, _, a) = store_with_support();
        store
            .add_rule(RuleKind::Reduction {
                target_character_ids: vec![a],
                effect_count: 2,
                reduction_value: 1.5,
                anchor_event_id: None,
            })
            .unwrap();
        let mut counters = RunCounters::new();
        let costs: Vec<f64> = (0..3)
            .map(|_| {
                apply(&store, a, 3.0, ChargeContext::NoEvent, &mut counters, 2).0
            })
            .collect();
        assert_eq!(costs, vec![1.5, 1.5, 3.0]);
    }

    #[test]
    fn test_newest_rule_wins() {
        let (mut store, _, a) = store_with_support();
        store
            .add_rule(RuleKind::Reduction {
                target_character_ids: vec![a],
                effect_count: 5,
                reduction_value: 0.5,
                anchor_event_id: None,
            })
            .unwrap();
        store
            .add_rule(RuleKind::Reduction {
                target_character_ids: vec![a],
                effect_count: 5,
                reduction_value: 2.0,
                anchor_event_id: None,
            })
            .unwrap();
        let mut counters = RunCounters::new();
        let (cost, _) = apply(&store, a, 3.0, ChargeContext::NoEvent, &mut counters, 2);
        assert_eq!(cost, 1.0);
    }

    #[test]
    fn test_exhausted_rule_falls_back_to_support_reduction() {
        let (mut store, support, a) = store_with_support();
        store.add_event(support, ACTION_FEE_CUT, 0.0, 100.0).unwrap();
        let ev = store.add_event(a, ACTION_SKILL, 3.0, 80.0).unwrap();
        let rule = store
            .add_rule(RuleKind::Reduction {
                target_character_ids: vec![a],
                effect_count: 1,
                reduction_value: 2.5,
                anchor_event_id: None,
            })
            .unwrap();
        let mut counters = RunCounters::new();
        counters.increment(CounterKey::Reduction(rule));

        // rule budget already spent; the synthetic 1.0 reduction stands
        let (cost, _) = apply(&store, a, 3.0, ChargeContext::Event(ev), &mut counters, 1);
        assert_eq!(cost, 2.0);
    }

    #[test]
    fn test_rule_beats_support_reduction_and_preserves_its_shot() {
        let (mut store, support, a) = store_with_support();
        store.add_event(support, ACTION_FEE_CUT, 0.0, 100.0).unwrap();
        let ev = store.add_event(a, ACTION_SKILL, 3.0, 80.0).unwrap();
        store
            .add_rule(RuleKind::Reduction {
                target_character_ids: vec![a],
                effect_count: 1,
                reduction_value: 2.5,
                anchor_event_id: None,
            })
            .unwrap();
        let mut counters = RunCounters::new();

        let (cost, _) = apply(&store, a, 3.0, ChargeContext::Event(ev), &mut counters, 1);
        assert_eq!(cost, 0.5);
        // support one-shot was not consumed by the rule win
        assert_eq!(counters.get(CounterKey::SupportReduction(a)), 0);
    }

    #[test]
    fn test_missing_anchor_warns_and_skips() {
        let (mut store, _, a) = store_with_support();
        let anchor = store.add_event(a, ACTION_SKILL, 3.0, 100.0).unwrap();
        let ev = store.add_event(a, ACTION_SKILL, 3.0, 80.0).unwrap();
        let rule = store
            .add_rule(RuleKind::Reduction {
                target_character_ids: vec![a],
                effect_count: 5,
                reduction_value: 1.0,
                anchor_event_id: Some(anchor),
            })
            .unwrap();
        // delete the anchor out from under the rule, bypassing cascade
        store.events.retain(|e| e.id != anchor);

        let mut counters = RunCounters::new();
        let (cost, warnings) = apply(&store, a, 3.0, ChargeContext::Event(ev), &mut counters, 2);
        assert_eq!(cost, 3.0);
        assert_eq!(
            warnings,
            vec![Warning::MissingAnchorEvent {
                rule_id: rule,
                anchor_event_id: anchor,
            }]
        );
    }

    #[test]
    fn test_anchored_rule_only_applies_after_anchor() {
        let (mut store, _, a) = store_with_support();
        let before = store.add_event(a, ACTION_SKILL, 3.0, 120.0).unwrap();
        let anchor = store.add_event(a, ACTION_SKILL, 3.0, 100.0).unwrap();
        let after = store.add_event(a, ACTION_SKILL, 3.0, 80.0).unwrap();
        store
            .add_rule(RuleKind::Reduction {
                target_character_ids: vec![a],
                effect_count: 5,
                reduction_value: 1.0,
                anchor_event_id: Some(anchor),
            })
            .unwrap();
        let mut counters = RunCounters::new();
        let (cost_before, _) =
            apply(&store, a, 3.0, ChargeContext::Event(before), &mut counters, 2);
        assert_eq!(cost_before, 3.0);
        let (cost_after, _) = apply(&store, a, 3.0, ChargeContext::Event(after), &mut counters, 2);
        assert_eq!(cost_after, 2.0);
        // planning context never sees anchored rules
        let (cost_plan, _) = apply(&store, a, 3.0, ChargeContext::NoEvent, &mut counters, 2);
        assert_eq!(cost_plan, 3.0);
    }

    #[test]
    fn test_override_replaces_and_last_wins() {
        let (mut store, _, a) = store_with_support();
        let ev = store.add_event(a, ACTION_SKILL, 3.0, 80.0).unwrap();
        store
            .add_rule(RuleKind::Override { anchor_event_id: ev, change_value: 2.0 })
            .unwrap();
        store
            .add_rule(RuleKind::Override { anchor_event_id: ev, change_value: 0.5 })
            .unwrap();
        let mut counters = RunCounters::new();
        let (cost, _) = apply(&store, a, 3.0, ChargeContext::Event(ev), &mut counters, 2);
        assert_eq!(cost, 0.5);
        // overrides never apply outside an event context
        let (plan_cost, _) = apply(&store, a, 3.0, ChargeContext::NoEvent, &mut counters, 2);
        assert_eq!(plan_cost, 3.0);
    }

    #[test]
    fn test_cost_clamped_and_rounded() {
        let (mut store, _, a) = store_with_support();
        store
            .add_rule(RuleKind::Reduction {
                target_character_ids: vec![a],
                effect_count: 5,
                reduction_value: 10.0,
                anchor_event_id: None,
            })
            .unwrap();
        let mut counters = RunCounters::new();
        let (cost, _) = apply(&store, a, 3.0, ChargeContext::NoEvent, &mut counters, 2);
        assert_eq!(cost, 0.0);
    }

    #[test]
    fn test_feasibility_check_consumes_nothing() {
        let (mut store, support, a) = store_with_support();
        store.add_event(support, ACTION_FEE_CUT, 0.0, 100.0).unwrap();
        store
            .add_rule(RuleKind::Reduction {
                target_character_ids: vec![a],
                effect_count: 1,
                reduction_value: 2.0,
                anchor_event_id: None,
            })
            .unwrap();
        assert_eq!(feasibility_check(&store, a, 3.0), 1.0);
        // repeated probes see the same answer
        assert_eq!(feasibility_check(&store, a, 3.0), 1.0);
    }

    #[test]
    fn test_can_perform_action_uses_scaled_cost() {
        let mut store = RuleStore::new();
        let a = store.add_character("Alice", 0.07, 3.0, 0.5, false).unwrap();
        let mut counters = RunCounters::new();
        counters.next_use_count(a);
        counters.next_use_count(a);
        // third use costs 3.0 + 0.5 * 2 = 4.0
        assert!(can_perform_action(&store, a, &counters, 4.0));
        assert!(!can_perform_action(&store, a, &counters, 3.9));
        assert_eq!(counters.peek_use_count(a), 2);
    }
}
