//! Decay mathematics
//!
//! Pure functions shared by the body, emotion and memory layers. Nothing here
//! holds state: callers pass the elapsed wall-clock time and get a new value.
//!
//! The per-name decay table (half-life in seconds, resting baseline) is data.
//! The defaults below can be replaced at start-up by persisted records or by
//! the `[decay.<name>]` section of the config file.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::f32::consts::LN_2;

/// Half-life stretch factor for negative emotions (negativity bias).
pub const DEFAULT_ASYMMETRY: f32 = 1.3;

/// How strongly arousal slows or speeds decay.
pub const DEFAULT_AROUSAL_COUPLING: f32 = 0.5;

// ============================================================================
// Core curves
// ============================================================================

/// Move `value` toward `baseline`, halving the deviation every `half_life`.
///
/// A non-positive half-life means "already fully decayed". Zero or negative
/// elapsed time returns `value` unchanged.
pub fn decay_toward_baseline(value: f32, baseline: f32, half_life: f32, elapsed: f32) -> f32 {
    if half_life <= 0.0 {
        return baseline;
    }
    if elapsed <= 0.0 || elapsed.is_nan() {
        return value;
    }
    baseline + (value - baseline) * (-LN_2 * elapsed / half_life).exp()
}

/// Plain exponential decay toward zero, never below `min_value`.
pub fn exponential_decay(value: f32, half_life: f32, elapsed: f32, min_value: f32) -> f32 {
    decay_toward_baseline(value, 0.0, half_life, elapsed).max(min_value)
}

/// Effective half-life after the valence asymmetry is applied.
///
/// Negative valence stretches the half-life, positive valence shrinks it by
/// the same factor.
pub fn valence_adjusted_half_life(base_half_life: f32, valence: f32, asymmetry: f32) -> f32 {
    let factor = 1.0 + valence.abs() * (asymmetry - 1.0);
    if valence < 0.0 {
        base_half_life * factor
    } else {
        base_half_life / factor
    }
}

/// Decay an emotion's intensity with negativity bias: unpleasant emotions
/// outlast pleasant ones of the same intensity.
pub fn valence_asymmetric_decay(
    intensity: f32,
    valence: f32,
    base_half_life: f32,
    elapsed: f32,
    baseline: f32,
    asymmetry: f32,
) -> f32 {
    let half_life = valence_adjusted_half_life(base_half_life, valence, asymmetry);
    decay_toward_baseline(intensity, baseline, half_life, elapsed)
}

/// Decay where high arousal slows the fade and low arousal speeds it.
pub fn arousal_coupled_decay(
    intensity: f32,
    arousal: f32,
    base_half_life: f32,
    elapsed: f32,
    baseline: f32,
    coupling: f32,
) -> f32 {
    let half_life = base_half_life * (1.0 + coupling * (arousal - 0.5) * 2.0);
    decay_toward_baseline(intensity, baseline, half_life, elapsed)
}

/// Weighted mean distance from equilibrium, clamped to `[0, 1]`.
///
/// Parameters absent from `baselines` are ignored. A missing weight counts
/// as 1.0. Zero total weight yields 0.
pub fn homeostatic_pressure(
    current: &HashMap<String, f32>,
    baselines: &HashMap<String, f32>,
    weights: &HashMap<String, f32>,
) -> f32 {
    let mut weighted = 0.0;
    let mut total_weight = 0.0;

    for (name, value) in current {
        let Some(baseline) = baselines.get(name) else {
            continue;
        };
        let weight = weights.get(name).copied().unwrap_or(1.0);
        weighted += (value - baseline).abs() * weight;
        total_weight += weight;
    }

    if total_weight <= 0.0 {
        return 0.0;
    }
    (weighted / total_weight).clamp(0.0, 1.0)
}

// ============================================================================
// Decay table
// ============================================================================

/// Half-life (seconds) and resting baseline for one emotion or body parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecayConfig {
    pub half_life_secs: f32,
    pub baseline: f32,
}

impl DecayConfig {
    pub const fn new(half_life_secs: f32, baseline: f32) -> Self {
        Self {
            half_life_secs,
            baseline,
        }
    }
}

/// Used for any name without an entry.
pub const FALLBACK_DECAY: DecayConfig = DecayConfig::new(600.0, 0.1);

/// Built-in defaults. Primary emotions fade in minutes, background emotions
/// over tens of minutes to hours, body parameters over hours.
///
/// `tension` names both a background emotion and a body parameter. The one
/// entry serves both, so a `[decay.tension]` override moves them together.
pub const DEFAULT_DECAY_TABLE: &[(&str, DecayConfig)] = &[
    // Primary emotions
    ("fear", DecayConfig::new(120.0, 0.05)),
    ("anger", DecayConfig::new(180.0, 0.05)),
    ("joy", DecayConfig::new(300.0, 0.15)),
    ("sadness", DecayConfig::new(600.0, 0.1)),
    ("disgust", DecayConfig::new(240.0, 0.05)),
    ("surprise", DecayConfig::new(60.0, 0.05)),
    // Background emotions
    ("contentment", DecayConfig::new(3600.0, 0.4)),
    ("malaise", DecayConfig::new(7200.0, 0.1)),
    ("unease", DecayConfig::new(1800.0, 0.15)),
    ("tension", DecayConfig::new(1800.0, 0.2)),
    ("enthusiasm", DecayConfig::new(1200.0, 0.2)),
    ("discouragement", DecayConfig::new(3600.0, 0.15)),
    // Body parameters
    ("energy", DecayConfig::new(3600.0, 0.7)),
    ("stress", DecayConfig::new(1800.0, 0.2)),
    ("arousal", DecayConfig::new(600.0, 0.5)),
    ("valence", DecayConfig::new(1200.0, 0.1)),
    ("fatigue", DecayConfig::new(7200.0, 0.1)),
    ("pain", DecayConfig::new(3600.0, 0.0)),
];

/// Built-in default for `name`, or the fallback entry.
pub fn default_decay_config(name: &str) -> DecayConfig {
    DEFAULT_DECAY_TABLE
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, c)| *c)
        .unwrap_or(FALLBACK_DECAY)
}

/// Decay configuration with optional per-name overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecayTable {
    overrides: HashMap<String, DecayConfig>,
}

impl DecayTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from `(name, config)` overrides.
    pub fn with_overrides<I, S>(overrides: I) -> Self
    where
        I: IntoIterator<Item = (S, DecayConfig)>,
        S: Into<String>,
    {
        let mut table = Self::default();
        for (name, config) in overrides {
            table.set(name, config);
        }
        table
    }

    /// Override one entry. Non-finite values are dropped.
    pub fn set(&mut self, name: impl Into<String>, config: DecayConfig) {
        let name = name.into();
        if !config.half_life_secs.is_finite() || !config.baseline.is_finite() {
            tracing::warn!("Ignoring non-finite decay override for {}", name);
            return;
        }
        self.overrides.insert(name, config);
    }

    /// Merge another table's overrides into this one (the other one wins).
    pub fn merge(&mut self, other: &DecayTable) {
        for (name, config) in &other.overrides {
            self.overrides.insert(name.clone(), *config);
        }
    }

    pub fn get(&self, name: &str) -> DecayConfig {
        self.overrides
            .get(name)
            .copied()
            .unwrap_or_else(|| default_decay_config(name))
    }

    pub fn overrides(&self) -> &HashMap<String, DecayConfig> {
        &self.overrides
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn test_one_half_life_halves_deviation() {
        let v = decay_toward_baseline(0.9, 0.1, 600.0, 600.0);
        assert!(approx(v, 0.5), "got {}", v);
    }

    #[test]
    fn test_zero_half_life_returns_baseline() {
        assert_eq!(decay_toward_baseline(0.9, 0.2, 0.0, 10.0), 0.2);
        assert_eq!(decay_toward_baseline(0.9, 0.2, -5.0, 10.0), 0.2);
    }

    #[test]
    fn test_negative_elapsed_is_noop() {
        assert!(approx(decay_toward_baseline(0.9, 0.2, 60.0, -100.0), 0.9));
    }

    #[test]
    fn test_negativity_bias() {
        let negative = valence_asymmetric_decay(1.0, -0.8, 100.0, 100.0, 0.0, DEFAULT_ASYMMETRY);
        let positive = valence_asymmetric_decay(1.0, 0.8, 100.0, 100.0, 0.0, DEFAULT_ASYMMETRY);
        assert!(negative > positive);
        // hl 124s vs ~80.6s
        assert!(approx(negative, (-LN_2 * 100.0 / 124.0).exp()));
        assert!(approx(positive, (-LN_2 * 100.0 * 1.24 / 100.0).exp()));
    }

    #[test]
    fn test_arousal_coupling_direction() {
        let calm = arousal_coupled_decay(1.0, 0.1, 100.0, 100.0, 0.0, DEFAULT_AROUSAL_COUPLING);
        let neutral = arousal_coupled_decay(1.0, 0.5, 100.0, 100.0, 0.0, DEFAULT_AROUSAL_COUPLING);
        let excited = arousal_coupled_decay(1.0, 0.9, 100.0, 100.0, 0.0, DEFAULT_AROUSAL_COUPLING);
        assert!(calm < neutral);
        assert!(neutral < excited);
        assert!(approx(neutral, 0.5));
    }

    #[test]
    fn test_homeostatic_pressure_weighted_mean() {
        let current = HashMap::from([("energy".to_string(), 0.3), ("stress".to_string(), 0.8)]);
        let baselines = HashMap::from([("energy".to_string(), 0.7), ("stress".to_string(), 0.2)]);
        let weights = HashMap::from([("energy".to_string(), 1.2), ("stress".to_string(), 1.0)]);
        let p = homeostatic_pressure(&current, &baselines, &weights);
        assert!((p - 0.4909).abs() < 1e-3, "got {}", p);
    }

    #[test]
    fn test_homeostatic_pressure_ignores_unknown_and_empty() {
        let current = HashMap::from([("mystery".to_string(), 0.9)]);
        let baselines = HashMap::from([("energy".to_string(), 0.7)]);
        assert_eq!(homeostatic_pressure(&current, &baselines, &HashMap::new()), 0.0);
        assert_eq!(
            homeostatic_pressure(&HashMap::new(), &HashMap::new(), &HashMap::new()),
            0.0
        );
    }

    #[test]
    fn test_exponential_decay_floor() {
        assert_eq!(exponential_decay(0.8, 10.0, 1000.0, 0.2), 0.2);
        assert!(approx(exponential_decay(0.8, 10.0, 10.0, 0.0), 0.4));
    }

    #[test]
    fn test_table_defaults_and_overrides() {
        let mut table = DecayTable::new();
        assert_eq!(table.get("fear"), DecayConfig::new(120.0, 0.05));
        assert_eq!(table.get("pride"), FALLBACK_DECAY);

        table.set("fear", DecayConfig::new(30.0, 0.0));
        table.set("joy", DecayConfig::new(f32::NAN, 0.1));
        assert_eq!(table.get("fear"), DecayConfig::new(30.0, 0.0));
        assert_eq!(table.get("joy"), DecayConfig::new(300.0, 0.15));
    }

    #[test]
    fn test_table_merge_prefers_other() {
        let mut base = DecayTable::with_overrides([("fear", DecayConfig::new(10.0, 0.0))]);
        let other = DecayTable::with_overrides([("fear", DecayConfig::new(20.0, 0.1))]);
        base.merge(&other);
        assert_eq!(base.get("fear"), DecayConfig::new(20.0, 0.1));
    }
}
