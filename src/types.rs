// Costline Engine - Type Definitions
// Cost-axis timeline calculator core

use serde::{Deserialize, Serialize};

/// Shared id namespace across characters, rules, and timeline events.
/// The store hands out monotonically increasing ids, so id order equals
/// creation order.
pub type EntityId = u32;

// ─── Domain constants ────────────────────────────────────────────────────────

/// Action label for an ordinary actor-triggered skill use.
pub const ACTION_SKILL: &str = "技能";
/// Action label for the scripted recharge passive (special row).
pub const ACTION_RECHARGE: &str = "回费";
/// Action label for the fee-reduction marker passive (special row).
pub const ACTION_FEE_CUT: &str = "减费";

/// The water-type support character whose fee-cut marker grants every
/// other character a one-shot reduction on their first use.
pub const WATER_SUPPORT_NAME: &str = "水白";
/// Flat reduction granted by the water-type support.
pub const WATER_SUPPORT_REDUCTION: f64 = 1.0;

/// The character whose passive rows refund a flat bonus post-clamp.
pub const SURGE_PASSIVE_NAME: &str = "瞬";
/// Flat balance bonus added after one of that character's passive rows
/// settles.
pub const SURGE_PASSIVE_BONUS: f64 = 3.8;

/// Default global resource ceiling.
pub const DEFAULT_TOTAL_CAP: f64 = 10.0;

/// Current snapshot schema version. Older snapshots load with
/// `#[serde(default)]` fills; newer versions are rejected.
pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

/// Whether an action label marks a passive/special event (derived cost,
/// zero deduction).
pub fn is_passive_action(action: &str) -> bool {
    action == ACTION_RECHARGE || action == ACTION_FEE_CUT
}

// ─── Character ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Character {
    pub id: EntityId,
    /// Unique (case-insensitive) display name.
    pub name: String,
    /// Resource units recovered per second before modifiers.
    pub base_recovery_rate: f64,
    /// Base cost of one skill use.
    pub skill_cost: f64,
    /// For the booster character this is the global percentage boost;
    /// for everyone else it is the flat per-use skill cost increase.
    pub increase_value: f64,
    /// Marks the (at most one) global percentage-boost character.
    #[serde(default)]
    pub is_booster: bool,
}

impl Character {
    /// Skill cost for the n-th use (1-based).
    pub fn skill_cost_at(&self, use_count: u32) -> f64 {
        self.skill_cost + self.increase_value * use_count.saturating_sub(1) as f64
    }
}

// ─── Rule ────────────────────────────────────────────────────────────────────

/// Direction of a rate modifier's effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EffectDirection {
    Increase,
    Decrease,
}

/// How a rate modifier's magnitude is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MagnitudeKind {
    /// Additive percentage folded into the shared multiplier.
    Percentage,
    /// Flat units/second, scaled by the shared multiplier.
    Flat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: EntityId,
    #[serde(flatten)]
    pub kind: RuleKind,
}

/// Tagged rule variant. Only `Reduction` and `RateModifier` omit a
/// source character: they are not actor-initiated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum RuleKind {
    /// Flat cost reduction with a fire-count budget, applying to events
    /// after the anchor point in sequence order.
    Reduction {
        target_character_ids: Vec<EntityId>,
        /// How many times the rule may fire per recalculation run.
        effect_count: u32,
        reduction_value: f64,
        /// Events at or before this event in sequence order are not
        /// affected. `None` applies everywhere.
        #[serde(default)]
        anchor_event_id: Option<EntityId>,
    },
    /// Forces one specific event's charged cost to an explicit value.
    Override {
        anchor_event_id: EntityId,
        change_value: f64,
    },
    /// Time-windowed recovery-rate modifier. Active over the half-open
    /// window `[activation - duration, activation)`.
    RateModifier {
        target_character_ids: Vec<EntityId>,
        /// `None` means always active.
        #[serde(default)]
        activation_time: Option<f64>,
        duration: f64,
        magnitude_kind: MagnitudeKind,
        magnitude: f64,
        direction: EffectDirection,
    },
}

impl RuleKind {
    /// Whether this rule targets the given character.
    pub fn targets(&self, character_id: EntityId) -> bool {
        match self {
            RuleKind::Reduction { target_character_ids, .. }
            | RuleKind::RateModifier { target_character_ids, .. } => {
                target_character_ids.contains(&character_id)
            }
            RuleKind::Override { .. } => false,
        }
    }
}

// ─── TimelineEvent ───────────────────────────────────────────────────────────

/// One row of the descending timeline (most recent first). Insertion
/// order is sequence order; `time` counts down from the initialization
/// instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEvent {
    pub id: EntityId,
    pub character_id: EntityId,
    pub action: String,
    /// Resource level at the instant the event fires, before deduction.
    pub cost: f64,
    /// Seconds remaining on the clock when the event fires.
    pub time: f64,
    /// Seconds elapsed since the previous event.
    #[serde(default)]
    pub time_interval: f64,
    #[serde(default)]
    pub cost_deduction: f64,
    #[serde(default)]
    pub remaining_cost: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<String>,
}

impl TimelineEvent {
    pub fn is_passive(&self) -> bool {
        is_passive_action(&self.action)
    }
}

// ─── ContinuousCharge ────────────────────────────────────────────────────────

/// Flat recovery boost keyed to a timeline event rather than a rule:
/// active over `[target.time - delay - duration, target.time - delay)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinuousCharge {
    pub target_event_id: EntityId,
    pub delay: f64,
    pub duration: f64,
    pub recovery_boost: f64,
}

// ─── Diagnostics ─────────────────────────────────────────────────────────────

/// Non-fatal diagnostics surfaced by a recalculation pass. Reference
/// errors never raise; they are reported here so the presentation layer
/// can display them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Warning {
    /// An event references a character that no longer exists; the event
    /// was left unresolved.
    UnknownCharacter {
        event_id: EntityId,
        character_id: EntityId,
    },
    /// A reduction rule's anchor event is gone; the rule was treated as
    /// inactive.
    MissingAnchorEvent {
        rule_id: EntityId,
        anchor_event_id: EntityId,
    },
    /// A continuous-charge binding points at a deleted event.
    DanglingContinuousCharge { target_event_id: EntityId },
}

// ─── RecalcOutcome ───────────────────────────────────────────────────────────

/// Result of one full recalculation pass.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecalcOutcome {
    /// The fully settled event sequence (also written back to the store).
    pub events: Vec<TimelineEvent>,
    /// Balance after the last settled event, rounded for presentation.
    pub final_balance: f64,
    pub warnings: Vec<Warning>,
}

// ─── Snapshot ────────────────────────────────────────────────────────────────

fn default_schema_version() -> u32 {
    SNAPSHOT_SCHEMA_VERSION
}

fn default_total_cap() -> f64 {
    DEFAULT_TOTAL_CAP
}

/// Versioned persisted form of the whole store (file export and the
/// web app's local-storage path share this shape).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub characters: Vec<Character>,
    #[serde(default)]
    pub rules: Vec<Rule>,
    #[serde(default)]
    pub events: Vec<TimelineEvent>,
    #[serde(default)]
    pub continuous_charges: Vec<ContinuousCharge>,
    #[serde(default = "default_total_cap")]
    pub total_cap: f64,
    #[serde(default)]
    pub initialization_time: f64,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
