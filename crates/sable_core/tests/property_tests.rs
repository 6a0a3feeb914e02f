//! Property-based tests for sable_core.
//!
//! Uses proptest to verify invariants that must hold for ALL possible inputs,
//! not just hand-picked examples.

use chrono::Utc;
use proptest::prelude::*;
use std::collections::{BTreeMap, HashMap};

use sable_core::body::{BodyParam, BodyState};
use sable_core::decay::{
    decay_toward_baseline, homeostatic_pressure, valence_asymmetric_decay, DecayTable,
    DEFAULT_ASYMMETRY,
};
use sable_core::emotion::{Emotion, EmotionType};
use sable_core::memory::{Event, Memory, SomaticMarker};

// ============================================================================
// Strategies
// ============================================================================

fn arb_body_state() -> impl Strategy<Value = BodyState> {
    (
        prop::array::uniform10(0.0f32..=1.0),
        -1.0f32..=1.0,
    )
        .prop_map(|(vals, valence)| {
            let mut body = BodyState::default();
            for (param, v) in BodyParam::ALL.iter().zip(vals.iter()) {
                body.set(*param, *v);
            }
            body.valence = valence;
            body
        })
}

fn arb_emotion_type() -> impl Strategy<Value = EmotionType> {
    (0..EmotionType::ALL.len()).prop_map(|i| EmotionType::ALL[i])
}

fn arb_impact() -> impl Strategy<Value = BTreeMap<String, f32>> {
    prop::collection::btree_map(
        arb_emotion_type().prop_map(|t| t.as_str().to_string()),
        0.0f32..=1.0,
        0..6,
    )
}

// ============================================================================
// Decay curves
// ============================================================================

proptest! {
    /// One half-life halves the deviation from baseline.
    #[test]
    fn one_half_life_halves_deviation(
        v in -1.0f32..=1.0,
        b in -1.0f32..=1.0,
        hl in 1.0f32..100_000.0,
    ) {
        let out = decay_toward_baseline(v, b, hl, hl);
        prop_assert!((out - (b + (v - b) / 2.0)).abs() < 1e-4);
    }

    /// Very long gaps converge on the baseline.
    #[test]
    fn long_gap_reaches_baseline(
        v in -1.0f32..=1.0,
        b in -1.0f32..=1.0,
        hl in 1.0f32..1_000.0,
    ) {
        let out = decay_toward_baseline(v, b, hl, hl * 200.0);
        prop_assert!((out - b).abs() < 1e-4);
    }

    /// Negative valence always decays slower than the mirrored positive one.
    #[test]
    fn negativity_bias_holds(
        valence in 0.05f32..=1.0,
        hl in 10.0f32..10_000.0,
        elapsed in 1.0f32..10_000.0,
    ) {
        let neg = valence_asymmetric_decay(1.0, -valence, hl, elapsed, 0.0, DEFAULT_ASYMMETRY);
        let pos = valence_asymmetric_decay(1.0, valence, hl, elapsed, 0.0, DEFAULT_ASYMMETRY);
        prop_assert!(neg >= pos);
    }

    /// Homeostatic pressure is always a valid score.
    #[test]
    fn pressure_in_unit_range(
        cur in prop::collection::hash_map("[a-e]", -5.0f32..5.0, 0..5),
        base in prop::collection::hash_map("[a-e]", -5.0f32..5.0, 0..5),
        weights in prop::collection::hash_map("[a-e]", 0.0f32..3.0, 0..5),
    ) {
        let p = homeostatic_pressure(&cur, &base, &weights);
        prop_assert!((0.0..=1.0).contains(&p));
    }
}

#[test]
fn pressure_matches_worked_example() {
    let cur = HashMap::from([("energy".to_string(), 0.3), ("stress".to_string(), 0.8)]);
    let base = HashMap::from([("energy".to_string(), 0.7), ("stress".to_string(), 0.2)]);
    let w = HashMap::from([("energy".to_string(), 1.2), ("stress".to_string(), 1.0)]);
    let p = homeostatic_pressure(&cur, &base, &w);
    assert!((p - (0.4 * 1.2 + 0.6 * 1.0) / 2.2).abs() < 1e-5);
}

// ============================================================================
// Body state
// ============================================================================

proptest! {
    /// Decay and arbitrary changes always leave every parameter in range.
    #[test]
    fn body_stays_in_bounds(
        body in arb_body_state(),
        elapsed in 0.0f32..1_000_000.0,
        deltas in prop::collection::btree_map(0usize..10, -3.0f32..3.0, 0..10),
    ) {
        let table = DecayTable::new();
        let decayed = body.apply_decay(elapsed, &table);
        prop_assert!(decayed.validate().is_ok());

        let signature: sable_core::BodySignature = deltas
            .into_iter()
            .map(|(i, d)| (BodyParam::ALL[i], d))
            .collect();
        let changed = decayed.apply_body_changes(&signature);
        prop_assert!(changed.validate().is_ok());
        prop_assert!((0.0..=1.0).contains(&changed.homeostatic_pressure()));
    }

    /// Hunger never falls with time.
    #[test]
    fn hunger_is_monotone(body in arb_body_state(), elapsed in 0.0f32..100_000.0) {
        let next = body.apply_decay(elapsed, &DecayTable::new());
        prop_assert!(next.hunger >= body.hunger);
    }
}

// ============================================================================
// Emotions
// ============================================================================

proptest! {
    /// Zero elapsed leaves intensity untouched.
    #[test]
    fn emotion_decay_idempotent_at_zero(t in arb_emotion_type(), intensity in 0.0f32..=1.0) {
        let e = Emotion::new(t, intensity, "cause");
        let next = e.apply_decay_at(0.0, &DecayTable::new(), Utc::now());
        prop_assert_eq!(next.intensity, e.intensity);
    }

    /// Repeated decay never increases intensity.
    #[test]
    fn emotion_decay_monotonic(
        t in arb_emotion_type(),
        intensity in 0.0f32..=1.0,
        steps in prop::collection::vec(0.0f32..5_000.0, 1..10),
    ) {
        let table = DecayTable::new();
        let mut e = Emotion::new(t, intensity, "cause");
        for step in steps {
            let next = e.apply_decay_at(step, &table, Utc::now());
            prop_assert!(next.intensity <= e.intensity);
            if e.intensity >= table.get(t.as_str()).baseline {
                prop_assert!(next.intensity >= table.get(t.as_str()).baseline - 1e-6);
            }
            e = next;
        }
    }
}

// ============================================================================
// Memory
// ============================================================================

proptest! {
    /// Salience formula holds for any impact map.
    #[test]
    fn salience_formula(impact in arb_impact()) {
        let event = Event::new("something", None, impact.clone());
        let s = event.salience();
        if impact.is_empty() {
            prop_assert_eq!(s, 0.1);
        } else {
            let max = impact.values().cloned().fold(0.0f32, f32::max);
            let expected = (max * (1.0 + 0.1 * impact.len() as f32)).min(1.0);
            prop_assert!((s - expected).abs() < 1e-6);
        }
    }

    /// Access grows consolidation toward 1.0; decay never crosses the floor.
    #[test]
    fn consolidation_bounds(
        impact in arb_impact(),
        accesses in 0usize..50,
        days in prop::collection::vec(0.0f32..3650.0, 0..5),
    ) {
        let event = Event::new("something", None, impact);
        if let Some(mut memory) = Memory::encode(event, None, 0.5) {
            let mut last = memory.consolidation_level;
            for _ in 0..accesses {
                memory.access();
                prop_assert!(memory.consolidation_level >= last);
                prop_assert!(memory.consolidation_level <= 1.0);
                last = memory.consolidation_level;
            }
            let floor = memory.consolidation_floor();
            for d in days {
                let before = memory.consolidation_level;
                memory.decay(d);
                prop_assert!(memory.consolidation_level <= before);
                prop_assert!(memory.consolidation_level >= floor - 1e-6);
            }
        }
    }

    /// Reinforcement moves strength by exactly the documented steps.
    #[test]
    fn reinforcement_steps(
        valence in -1.0f32..=1.0,
        strength in 0.0f32..=1.0,
        outcome in -1.0f32..=1.0,
    ) {
        let mut marker = SomaticMarker::new("situation", EmotionType::Fear, valence, strength, None);
        let agreement = marker.agreement(outcome);
        marker.reinforce(outcome);
        if agreement > 0.5 {
            prop_assert!((marker.strength - (strength + 0.05).min(1.0)).abs() < 1e-6);
        } else {
            prop_assert!((marker.strength - (strength - 0.1).max(0.1)).abs() < 1e-6);
        }
        prop_assert_eq!(marker.reinforcement_count, 2);
    }
}
