// Costline Engine - Rule Store
// In-memory roster, rule list, timeline, and continuous-charge bindings.
// Mutations validate before touching state; a failed add/edit never leaves
// the store partially changed.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::types::{
    Character, ContinuousCharge, EntityId, Rule, RuleKind, Snapshot, TimelineEvent,
    ACTION_SKILL, DEFAULT_TOTAL_CAP, SNAPSHOT_SCHEMA_VERSION,
};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Validation errors raised before any state mutation.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("character name {0:?} already exists")]
    DuplicateName(String),
    #[error("roster already has a booster character (id {0})")]
    BoosterConflict(EntityId),
    #[error("unknown character id {0}")]
    UnknownCharacter(EntityId),
    #[error("unknown event id {0}")]
    UnknownEvent(EntityId),
    #[error("unknown rule id {0}")]
    UnknownRule(EntityId),
    #[error("effect count must be at least 1")]
    NonPositiveEffectCount,
    #[error("override cost {value} exceeds trigger cost {trigger} of event {event_id}")]
    OverrideExceedsTriggerCost {
        event_id: EntityId,
        value: f64,
        trigger: f64,
    },
    #[error("total cap must be positive, got {0}")]
    NonPositiveCap(f64),
    #[error("duration must not be negative, got {0}")]
    NegativeDuration(f64),
    #[error("unsupported snapshot schema version {0}")]
    UnsupportedSchemaVersion(u32),
    #[error("malformed snapshot: {0}")]
    MalformedSnapshot(String),
}

// ---------------------------------------------------------------------------
// RuleStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleStore {
    pub characters: Vec<Character>,
    pub rules: Vec<Rule>,
    pub events: Vec<TimelineEvent>,
    pub continuous_charges: Vec<ContinuousCharge>,
    /// Global resource ceiling.
    pub total_cap: f64,
    /// Clock value assigned to the sentinel event at index 0.
    pub initialization_time: f64,
    next_id: EntityId,
}

impl Default for RuleStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleStore {
    pub fn new() -> Self {
        Self {
            characters: Vec::new(),
            rules: Vec::new(),
            events: Vec::new(),
            continuous_charges: Vec::new(),
            total_cap: DEFAULT_TOTAL_CAP,
            initialization_time: 0.0,
            next_id: 1,
        }
    }

    /// Store seeded with the reference roster shipped by the web app.
    /// Only the first percentage-boost entry keeps the booster flag, to
    /// satisfy the single-booster invariant.
    pub fn with_default_roster() -> Self {
        let mut store = Self::new();
        let roster: [(&str, f64, f64, f64, bool); 12] = [
            ("水白", 0.07, 3.0, 20.2, true),
            ("礼奈", 0.07, 6.0, 0.0, false),
            ("瞬", 0.07, 3.0, 0.0, false),
            ("妃咲", 0.07, 3.0, 20.2, false),
            ("未花", 0.07, 6.0, 0.0, false),
            ("若藻", 0.07, 4.0, 0.0, false),
            ("水星", 0.07, 5.0, 0.0, false),
            ("锅", 0.07, 2.0, 0.0, false),
            ("礼露", 0.07, 3.0, 0.0, false),
            ("圣娅", 0.07, 3.0, 0.0, false),
            ("圣娅（泳装）", 0.07, 3.0, 0.0, false),
            ("水花", 0.07, 2.0, 0.0, false),
        ];
        for (name, rate, cost, increase, booster) in roster {
            // Seeded names are unique and carry a single booster; adding
            // them cannot fail validation.
            let _ = store.add_character(name, rate, cost, increase, booster);
        }
        store
    }

    fn next_id(&mut self) -> EntityId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    // ─── Lookups ─────────────────────────────────────────────────────────────

    pub fn character(&self, id: EntityId) -> Option<&Character> {
        self.characters.iter().find(|c| c.id == id)
    }

    pub fn character_by_name(&self, name: &str) -> Option<&Character> {
        self.characters
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn booster(&self) -> Option<&Character> {
        self.characters.iter().find(|c| c.is_booster)
    }

    pub fn event(&self, id: EntityId) -> Option<&TimelineEvent> {
        self.events.iter().find(|e| e.id == id)
    }

    /// Position of an event in sequence order.
    pub fn event_position(&self, id: EntityId) -> Option<usize> {
        self.events.iter().position(|e| e.id == id)
    }

    pub fn rule(&self, id: EntityId) -> Option<&Rule> {
        self.rules.iter().find(|r| r.id == id)
    }

    // ─── Characters ──────────────────────────────────────────────────────────

    pub fn add_character(
        &mut self,
        name: &str,
        base_recovery_rate: f64,
        skill_cost: f64,
        increase_value: f64,
        is_booster: bool,
    ) -> Result<EntityId, ValidationError> {
        if let Some(existing) = self.character_by_name(name) {
            return Err(ValidationError::DuplicateName(existing.name.clone()));
        }
        if is_booster {
            if let Some(existing) = self.booster() {
                return Err(ValidationError::BoosterConflict(existing.id));
            }
        }
        let id = self.next_id();
        self.characters.push(Character {
            id,
            name: name.to_string(),
            base_recovery_rate,
            skill_cost,
            increase_value,
            is_booster,
        });
        debug!(id, name, "character added");
        Ok(id)
    }

    pub fn update_character(
        &mut self,
        id: EntityId,
        name: &str,
        base_recovery_rate: f64,
        skill_cost: f64,
        increase_value: f64,
        is_booster: bool,
    ) -> Result<(), ValidationError> {
        if self.character(id).is_none() {
            return Err(ValidationError::UnknownCharacter(id));
        }
        if let Some(other) = self
            .characters
            .iter()
            .find(|c| c.id != id && c.name.eq_ignore_ascii_case(name))
        {
            return Err(ValidationError::DuplicateName(other.name.clone()));
        }
        if is_booster {
            if let Some(other) = self.characters.iter().find(|c| c.is_booster && c.id != id) {
                return Err(ValidationError::BoosterConflict(other.id));
            }
        }
        // All checks passed; safe to mutate.
        let ch = self
            .characters
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(ValidationError::UnknownCharacter(id))?;
        ch.name = name.to_string();
        ch.base_recovery_rate = base_recovery_rate;
        ch.skill_cost = skill_cost;
        ch.increase_value = increase_value;
        ch.is_booster = is_booster;
        Ok(())
    }

    /// Delete a character, cascading to everything that references it:
    /// its timeline events (and rules/bindings anchored to them), rules
    /// that only targeted it, and its entry in multi-target rule lists.
    pub fn delete_character(&mut self, id: EntityId) -> Result<(), ValidationError> {
        if self.character(id).is_none() {
            return Err(ValidationError::UnknownCharacter(id));
        }
        let removed_events: Vec<EntityId> = self
            .events
            .iter()
            .filter(|e| e.character_id == id)
            .map(|e| e.id)
            .collect();
        self.events.retain(|e| e.character_id != id);
        self.cascade_removed_events(&removed_events);

        self.rules.retain_mut(|rule| match &mut rule.kind {
            RuleKind::Reduction { target_character_ids, .. }
            | RuleKind::RateModifier { target_character_ids, .. } => {
                target_character_ids.retain(|&c| c != id);
                !target_character_ids.is_empty()
            }
            RuleKind::Override { .. } => true,
        });

        self.characters.retain(|c| c.id != id);
        debug!(id, "character deleted with cascade");
        Ok(())
    }

    // ─── Rules ───────────────────────────────────────────────────────────────

    fn validate_rule_kind(&self, kind: &RuleKind) -> Result<(), ValidationError> {
        match kind {
            RuleKind::Reduction {
                target_character_ids,
                effect_count,
                anchor_event_id,
                ..
            } => {
                if *effect_count == 0 {
                    return Err(ValidationError::NonPositiveEffectCount);
                }
                for &cid in target_character_ids {
                    if self.character(cid).is_none() {
                        return Err(ValidationError::UnknownCharacter(cid));
                    }
                }
                if let Some(eid) = anchor_event_id {
                    if self.event(*eid).is_none() {
                        return Err(ValidationError::UnknownEvent(*eid));
                    }
                }
            }
            RuleKind::Override {
                anchor_event_id,
                change_value,
            } => {
                let event = self
                    .event(*anchor_event_id)
                    .ok_or(ValidationError::UnknownEvent(*anchor_event_id))?;
                if *change_value > event.cost {
                    return Err(ValidationError::OverrideExceedsTriggerCost {
                        event_id: *anchor_event_id,
                        value: *change_value,
                        trigger: event.cost,
                    });
                }
            }
            RuleKind::RateModifier {
                target_character_ids,
                duration,
                ..
            } => {
                if *duration < 0.0 {
                    return Err(ValidationError::NegativeDuration(*duration));
                }
                for &cid in target_character_ids {
                    if self.character(cid).is_none() {
                        return Err(ValidationError::UnknownCharacter(cid));
                    }
                }
            }
        }
        Ok(())
    }

    pub fn add_rule(&mut self, kind: RuleKind) -> Result<EntityId, ValidationError> {
        self.validate_rule_kind(&kind)?;
        let id = self.next_id();
        self.rules.push(Rule { id, kind });
        debug!(id, "rule added");
        Ok(id)
    }

    pub fn update_rule(&mut self, id: EntityId, kind: RuleKind) -> Result<(), ValidationError> {
        if self.rule(id).is_none() {
            return Err(ValidationError::UnknownRule(id));
        }
        self.validate_rule_kind(&kind)?;
        if let Some(rule) = self.rules.iter_mut().find(|r| r.id == id) {
            rule.kind = kind;
        }
        Ok(())
    }

    pub fn delete_rule(&mut self, id: EntityId) -> Result<(), ValidationError> {
        if self.rule(id).is_none() {
            return Err(ValidationError::UnknownRule(id));
        }
        self.rules.retain(|r| r.id != id);
        Ok(())
    }

    // ─── Timeline events ─────────────────────────────────────────────────────

    pub fn add_event(
        &mut self,
        character_id: EntityId,
        action: &str,
        cost: f64,
        time: f64,
    ) -> Result<EntityId, ValidationError> {
        if self.character(character_id).is_none() {
            return Err(ValidationError::UnknownCharacter(character_id));
        }
        let action = if action.is_empty() { ACTION_SKILL } else { action };
        let id = self.next_id();
        self.events.push(TimelineEvent {
            id,
            character_id,
            action: action.to_string(),
            cost,
            time,
            time_interval: 0.0,
            cost_deduction: 0.0,
            remaining_cost: 0.0,
            note: None,
            image_ref: None,
        });
        Ok(id)
    }

    pub fn update_event(
        &mut self,
        id: EntityId,
        cost: f64,
        time: f64,
    ) -> Result<(), ValidationError> {
        let event = self
            .events
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(ValidationError::UnknownEvent(id))?;
        event.cost = cost;
        event.time = time;
        Ok(())
    }

    pub fn annotate_event(
        &mut self,
        id: EntityId,
        note: Option<String>,
        image_ref: Option<String>,
    ) -> Result<(), ValidationError> {
        let event = self
            .events
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(ValidationError::UnknownEvent(id))?;
        event.note = note;
        event.image_ref = image_ref;
        Ok(())
    }

    pub fn delete_event(&mut self, id: EntityId) -> Result<(), ValidationError> {
        if self.event(id).is_none() {
            return Err(ValidationError::UnknownEvent(id));
        }
        self.events.retain(|e| e.id != id);
        self.cascade_removed_events(&[id]);
        Ok(())
    }

    /// Batch delete; unknown ids are ignored (the caller may hold a
    /// stale selection).
    pub fn delete_events(&mut self, ids: &[EntityId]) {
        self.events.retain(|e| !ids.contains(&e.id));
        self.cascade_removed_events(ids);
    }

    /// Drop rules anchored to removed events and bindings targeting them.
    fn cascade_removed_events(&mut self, removed: &[EntityId]) {
        if removed.is_empty() {
            return;
        }
        self.rules.retain(|rule| match &rule.kind {
            RuleKind::Override { anchor_event_id, .. } => !removed.contains(anchor_event_id),
            RuleKind::Reduction { anchor_event_id, .. } => match anchor_event_id {
                Some(eid) => !removed.contains(eid),
                None => true,
            },
            RuleKind::RateModifier { .. } => true,
        });
        self.continuous_charges
            .retain(|cc| !removed.contains(&cc.target_event_id));
    }

    // ─── Continuous charges / settings ───────────────────────────────────────

    pub fn add_continuous_charge(
        &mut self,
        target_event_id: EntityId,
        delay: f64,
        duration: f64,
        recovery_boost: f64,
    ) -> Result<(), ValidationError> {
        if self.event(target_event_id).is_none() {
            return Err(ValidationError::UnknownEvent(target_event_id));
        }
        if duration < 0.0 {
            return Err(ValidationError::NegativeDuration(duration));
        }
        self.continuous_charges.push(ContinuousCharge {
            target_event_id,
            delay,
            duration,
            recovery_boost,
        });
        Ok(())
    }

    pub fn clear_continuous_charges(&mut self) {
        self.continuous_charges.clear();
    }

    pub fn set_total_cap(&mut self, cap: f64) -> Result<(), ValidationError> {
        if !(cap > 0.0) {
            return Err(ValidationError::NonPositiveCap(cap));
        }
        self.total_cap = cap;
        Ok(())
    }

    pub fn set_initialization_time(&mut self, instant: f64) {
        self.initialization_time = instant;
    }

    // ─── Snapshot import/export ──────────────────────────────────────────────

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            characters: self.characters.clone(),
            rules: self.rules.clone(),
            events: self.events.clone(),
            continuous_charges: self.continuous_charges.clone(),
            total_cap: self.total_cap,
            initialization_time: self.initialization_time,
        }
    }

    /// Rebuild a store from a snapshot. Unknown cross-references inside
    /// the snapshot are tolerated here (they surface as recalculation
    /// warnings); only the schema version is gating.
    pub fn from_snapshot(snapshot: Snapshot) -> Result<Self, ValidationError> {
        if snapshot.schema_version > SNAPSHOT_SCHEMA_VERSION {
            return Err(ValidationError::UnsupportedSchemaVersion(
                snapshot.schema_version,
            ));
        }
        let max_id = snapshot
            .characters
            .iter()
            .map(|c| c.id)
            .chain(snapshot.rules.iter().map(|r| r.id))
            .chain(snapshot.events.iter().map(|e| e.id))
            .max()
            .unwrap_or(0);
        Ok(Self {
            characters: snapshot.characters,
            rules: snapshot.rules,
            events: snapshot.events,
            continuous_charges: snapshot.continuous_charges,
            total_cap: snapshot.total_cap,
            initialization_time: snapshot.initialization_time,
            next_id: max_id + 1,
        })
    }

    pub fn export_json(&self) -> String {
        // Snapshot serialization cannot fail: all fields are plain data.
        serde_json::to_string(&self.snapshot()).unwrap_or_default()
    }

    pub fn import_json(json: &str) -> Result<Self, ValidationError> {
        let snapshot: Snapshot = serde_json::from_str(json)
            .map_err(|e| ValidationError::MalformedSnapshot(e.to_string()))?;
        Self::from_snapshot(snapshot)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EffectDirection, MagnitudeKind};

    fn store_with_two() -> (RuleStore, EntityId, EntityId) {
        let mut store = RuleStore::new();
        let a = store.add_character("Alice", 0.07, 3.0, 0.0, false).unwrap();
        let b = store.add_character("Bea", 0.07, 4.0, 0.0, false).unwrap();
        (store, a, b)
    }

    #[test]
    fn test_duplicate_name_rejected_case_insensitive() {
        let (mut store, _, _) = store_with_two();
        let err = store.add_character("ALICE", 0.05, 2.0, 0.0, false);
        assert_eq!(err, Err(ValidationError::DuplicateName("Alice".into())));
        assert_eq!(store.characters.len(), 2);
    }

    #[test]
    fn test_single_booster_enforced() {
        let (mut store, a, b) = store_with_two();
        store.update_character(a, "Alice", 0.07, 3.0, 20.2, true).unwrap();
        let err = store.update_character(b, "Bea", 0.07, 4.0, 20.2, true);
        assert_eq!(err, Err(ValidationError::BoosterConflict(a)));
        // re-saving the same booster is fine
        store.update_character(a, "Alice", 0.07, 3.0, 25.0, true).unwrap();
    }

    #[test]
    fn test_override_exceeding_trigger_cost_rejected_without_mutation() {
        let (mut store, a, _) = store_with_two();
        let ev = store.add_event(a, ACTION_SKILL, 3.0, 0.0).unwrap();
        let rules_before = store.rules.clone();
        let err = store.add_rule(RuleKind::Override {
            anchor_event_id: ev,
            change_value: 5.0,
        });
        assert_eq!(
            err,
            Err(ValidationError::OverrideExceedsTriggerCost {
                event_id: ev,
                value: 5.0,
                trigger: 3.0,
            })
        );
        assert_eq!(store.rules, rules_before);
    }

    #[test]
    fn test_zero_effect_count_rejected() {
        let (mut store, a, _) = store_with_two();
        let err = store.add_rule(RuleKind::Reduction {
            target_character_ids: vec![a],
            effect_count: 0,
            reduction_value: 1.0,
            anchor_event_id: None,
        });
        assert_eq!(err, Err(ValidationError::NonPositiveEffectCount));
    }

    #[test]
    fn test_delete_character_cascades() {
        let (mut store, a, b) = store_with_two();
        let ev_a = store.add_event(a, ACTION_SKILL, 3.0, 0.0).unwrap();
        let ev_b = store.add_event(b, ACTION_SKILL, 4.0, 0.0).unwrap();
        store
            .add_rule(RuleKind::Reduction {
                target_character_ids: vec![a, b],
                effect_count: 1,
                reduction_value: 1.0,
                anchor_event_id: None,
            })
            .unwrap();
        store
            .add_rule(RuleKind::RateModifier {
                target_character_ids: vec![a],
                activation_time: Some(100.0),
                duration: 10.0,
                magnitude_kind: MagnitudeKind::Flat,
                magnitude: 0.05,
                direction: EffectDirection::Increase,
            })
            .unwrap();
        store.add_continuous_charge(ev_a, 1.0, 5.0, 0.1).unwrap();
        store
            .add_rule(RuleKind::Override { anchor_event_id: ev_a, change_value: 2.0 })
            .unwrap();

        store.delete_character(a).unwrap();

        assert!(store.character(a).is_none());
        assert!(store.event(ev_a).is_none());
        assert!(store.event(ev_b).is_some());
        // modifier targeting only `a` dropped; shared reduction keeps `b`
        assert_eq!(store.rules.len(), 1);
        assert!(store.rules[0].kind.targets(b));
        // binding and override anchored to the removed event are gone
        assert!(store.continuous_charges.is_empty());
    }

    #[test]
    fn test_delete_event_cascades_anchored_rules() {
        let (mut store, a, _) = store_with_two();
        let anchor = store.add_event(a, ACTION_SKILL, 3.0, 0.0).unwrap();
        store
            .add_rule(RuleKind::Reduction {
                target_character_ids: vec![a],
                effect_count: 2,
                reduction_value: 1.0,
                anchor_event_id: Some(anchor),
            })
            .unwrap();
        store
            .add_rule(RuleKind::Override { anchor_event_id: anchor, change_value: 1.0 })
            .unwrap();
        store.delete_event(anchor).unwrap();
        assert!(store.rules.is_empty());
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let (mut store, a, _) = store_with_two();
        store.add_event(a, ACTION_SKILL, 3.0, 240.0).unwrap();
        store.set_total_cap(12.0).unwrap();
        store.set_initialization_time(240.0);

        let json = store.export_json();
        let back = RuleStore::import_json(&json).unwrap();
        assert_eq!(back.characters, store.characters);
        assert_eq!(back.events, store.events);
        assert_eq!(back.total_cap, 12.0);
        assert_eq!(back.initialization_time, 240.0);

        // new ids continue past imported ones
        let mut back = back;
        let new_id = back.add_character("Cid", 0.07, 3.0, 0.0, false).unwrap();
        assert!(new_id > a);
    }

    #[test]
    fn test_newer_schema_rejected() {
        let mut snap = RuleStore::new().snapshot();
        snap.schema_version = SNAPSHOT_SCHEMA_VERSION + 1;
        assert_eq!(
            RuleStore::from_snapshot(snap),
            Err(ValidationError::UnsupportedSchemaVersion(
                SNAPSHOT_SCHEMA_VERSION + 1
            ))
        );
    }

    #[test]
    fn test_default_roster_single_booster() {
        let store = RuleStore::with_default_roster();
        assert_eq!(store.characters.len(), 12);
        assert_eq!(store.characters.iter().filter(|c| c.is_booster).count(), 1);
        assert!(store.character_by_name("水白").is_some());
    }

    #[test]
    fn test_malformed_snapshot_error() {
        let err = RuleStore::import_json("{not json");
        assert!(matches!(err, Err(ValidationError::MalformedSnapshot(_))));
    }
}
