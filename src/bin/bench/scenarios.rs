// Scenario Definitions — seeded randomized stores of varying shape.
// All scenario logic lives here; the runner only builds, recalculates,
// and checks invariants.

use costline_engine::{EffectDirection, MagnitudeKind, RuleKind, RuleStore, ACTION_SKILL};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

// ─── Scenario Configuration ─────────────────────────────────────────────────

pub struct Scenario {
    pub name: &'static str,
    pub label: &'static str,
    pub category: &'static str,
    pub characters: usize,
    pub events: usize,
    pub modifiers: usize,
    pub reductions: usize,
    pub continuous_charges: usize,
    pub with_booster: bool,
}

pub fn scenarios() -> Vec<Scenario> {
    vec![
        Scenario {
            name: "BASELINE_SMALL",
            label: "Baseline small roster",
            category: "baseline",
            characters: 3,
            events: 8,
            modifiers: 0,
            reductions: 0,
            continuous_charges: 0,
            with_booster: false,
        },
        Scenario {
            name: "MODIFIER_HEAVY",
            label: "Modifier-heavy timeline",
            category: "rules",
            characters: 4,
            events: 12,
            modifiers: 10,
            reductions: 0,
            continuous_charges: 0,
            with_booster: true,
        },
        Scenario {
            name: "REDUCTION_CHAIN",
            label: "Stacked reduction rules",
            category: "rules",
            characters: 4,
            events: 12,
            modifiers: 2,
            reductions: 6,
            continuous_charges: 0,
            with_booster: false,
        },
        Scenario {
            name: "CONTINUOUS_CHARGE",
            label: "Event-bound charge windows",
            category: "rules",
            characters: 4,
            events: 10,
            modifiers: 2,
            reductions: 1,
            continuous_charges: 5,
            with_booster: false,
        },
        Scenario {
            name: "LONG_TIMELINE",
            label: "Long timeline, mixed rules",
            category: "scale",
            characters: 6,
            events: 40,
            modifiers: 6,
            reductions: 3,
            continuous_charges: 3,
            with_booster: true,
        },
    ]
}

// ─── Store Generation ───────────────────────────────────────────────────────

pub fn build_store(scenario: &Scenario, seed: u64) -> RuleStore {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut store = RuleStore::new();
    store.set_initialization_time(240.0);

    let mut ids = Vec::with_capacity(scenario.characters);
    for i in 0..scenario.characters {
        let rate = rng.gen_range(0.05..0.12);
        let cost = (rng.gen_range(2.0..6.0_f64) * 10.0).round() / 10.0;
        let booster = scenario.with_booster && i == 0;
        let increase = if booster { rng.gen_range(10.0..25.0) } else { 0.0 };
        let id = store
            .add_character(&format!("C{i:02}"), rate, cost, increase, booster)
            .expect("generated roster is valid");
        ids.push(id);
    }

    let mut event_ids = Vec::with_capacity(scenario.events);
    for _ in 0..scenario.events {
        let cid = ids[rng.gen_range(0..ids.len())];
        let cost = (rng.gen_range(1.5..5.0_f64) * 10.0).round() / 10.0;
        let eid = store
            .add_event(cid, ACTION_SKILL, cost, 0.0)
            .expect("character exists");
        event_ids.push(eid);
    }

    for _ in 0..scenario.modifiers {
        let target = ids[rng.gen_range(0..ids.len())];
        let increase = rng.gen_bool(0.8);
        store
            .add_rule(RuleKind::RateModifier {
                target_character_ids: vec![target],
                activation_time: Some(rng.gen_range(40.0..240.0)),
                duration: rng.gen_range(5.0..60.0),
                magnitude_kind: if increase {
                    MagnitudeKind::Percentage
                } else {
                    MagnitudeKind::Flat
                },
                magnitude: if increase {
                    rng.gen_range(10.0..80.0)
                } else {
                    // small flat dips so the roster never stalls
                    rng.gen_range(0.005..0.02)
                },
                direction: if increase {
                    EffectDirection::Increase
                } else {
                    EffectDirection::Decrease
                },
            })
            .expect("generated modifier is valid");
    }

    for _ in 0..scenario.reductions {
        let target = ids[rng.gen_range(0..ids.len())];
        store
            .add_rule(RuleKind::Reduction {
                target_character_ids: vec![target],
                effect_count: rng.gen_range(1..4),
                reduction_value: (rng.gen_range(0.5..1.5_f64) * 10.0).round() / 10.0,
                anchor_event_id: None,
            })
            .expect("generated reduction is valid");
    }

    for _ in 0..scenario.continuous_charges {
        // Bind to the opening event only: its clock settles before any
        // later row is solved, so a replay of the settled timeline sees
        // identical charge windows.
        store
            .add_continuous_charge(
                event_ids[0],
                rng.gen_range(0.0..2.0),
                rng.gen_range(3.0..15.0),
                rng.gen_range(0.02..0.08),
            )
            .expect("event exists");
    }

    store
}
