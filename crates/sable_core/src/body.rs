//! Body state: the proto-self layer
//!
//! Ten bounded physiological parameters that drift back toward homeostatic
//! baselines between readings. A `BodyState` is never edited in place by the
//! engine: decay and external changes both produce a new value, and the
//! newest one is "current".

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use crate::decay::{decay_toward_baseline, DecayTable};
use crate::error::{check_range, sanitize_f32, ValidationError};

/// Hunger grows by this much per second of elapsed time.
pub const HUNGER_GROWTH_PER_SEC: f32 = 0.1 / 3600.0;

/// Signed body-parameter deltas, already scaled by intensity.
pub type BodySignature = BTreeMap<BodyParam, f32>;

// ============================================================================
// Parameters
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyParam {
    Energy,
    Stress,
    Arousal,
    Valence,
    Temperature,
    Tension,
    Fatigue,
    Pain,
    Hunger,
    HeartRate,
}

impl BodyParam {
    pub const ALL: [BodyParam; 10] = [
        BodyParam::Energy,
        BodyParam::Stress,
        BodyParam::Arousal,
        BodyParam::Valence,
        BodyParam::Temperature,
        BodyParam::Tension,
        BodyParam::Fatigue,
        BodyParam::Pain,
        BodyParam::Hunger,
        BodyParam::HeartRate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BodyParam::Energy => "energy",
            BodyParam::Stress => "stress",
            BodyParam::Arousal => "arousal",
            BodyParam::Valence => "valence",
            BodyParam::Temperature => "temperature",
            BodyParam::Tension => "tension",
            BodyParam::Fatigue => "fatigue",
            BodyParam::Pain => "pain",
            BodyParam::Hunger => "hunger",
            BodyParam::HeartRate => "heart_rate",
        }
    }

    /// Valid closed range.
    pub fn bounds(&self) -> (f32, f32) {
        match self {
            BodyParam::Valence => (-1.0, 1.0),
            _ => (0.0, 1.0),
        }
    }

    pub fn default_value(&self) -> f32 {
        match self {
            BodyParam::Energy => 0.7,
            BodyParam::Stress => 0.3,
            BodyParam::Arousal => 0.5,
            BodyParam::Valence => 0.1,
            BodyParam::Temperature => 0.5,
            BodyParam::Tension => 0.3,
            BodyParam::Fatigue => 0.2,
            BodyParam::Pain => 0.0,
            BodyParam::Hunger => 0.3,
            BodyParam::HeartRate => 0.5,
        }
    }

    /// Parameters that relax toward a baseline. Hunger grows instead;
    /// temperature and heart rate hold until changed.
    fn decays(&self) -> bool {
        !matches!(
            self,
            BodyParam::Temperature | BodyParam::HeartRate | BodyParam::Hunger
        )
    }

    fn clamp_value(&self, value: f32) -> f32 {
        let (lo, hi) = self.bounds();
        sanitize_f32(value, self.default_value()).clamp(lo, hi)
    }
}

impl fmt::Display for BodyParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BodyParam {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BodyParam::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownBodyParam(s.to_string()))
    }
}

// ============================================================================
// Background emotion
// ============================================================================

/// Coarse label summarizing the body state, independent of any trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackgroundEmotion {
    Vigor,
    Malaise,
    Unease,
    Discouragement,
    Contentment,
    Enthusiasm,
    Tension,
    Equanimity,
}

impl BackgroundEmotion {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackgroundEmotion::Vigor => "vigor",
            BackgroundEmotion::Malaise => "malaise",
            BackgroundEmotion::Unease => "unease",
            BackgroundEmotion::Discouragement => "discouragement",
            BackgroundEmotion::Contentment => "contentment",
            BackgroundEmotion::Enthusiasm => "enthusiasm",
            BackgroundEmotion::Tension => "tension",
            BackgroundEmotion::Equanimity => "equanimity",
        }
    }
}

impl fmt::Display for BackgroundEmotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Body state
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodyState {
    /// Assigned by the store on first save.
    pub id: Option<i64>,
    pub timestamp: DateTime<Utc>,

    pub energy: f32,
    /// -1.0 (unpleasant) to 1.0 (pleasant)
    pub valence: f32,
    pub stress: f32,
    pub arousal: f32,
    pub temperature: f32,
    pub tension: f32,
    pub fatigue: f32,
    pub pain: f32,
    pub hunger: f32,
    pub heart_rate: f32,
}

impl Default for BodyState {
    fn default() -> Self {
        Self::at(Utc::now())
    }
}

impl BodyState {
    /// Default state stamped with `timestamp`.
    pub fn at(timestamp: DateTime<Utc>) -> Self {
        Self {
            id: None,
            timestamp,
            energy: BodyParam::Energy.default_value(),
            valence: BodyParam::Valence.default_value(),
            stress: BodyParam::Stress.default_value(),
            arousal: BodyParam::Arousal.default_value(),
            temperature: BodyParam::Temperature.default_value(),
            tension: BodyParam::Tension.default_value(),
            fatigue: BodyParam::Fatigue.default_value(),
            pain: BodyParam::Pain.default_value(),
            hunger: BodyParam::Hunger.default_value(),
            heart_rate: BodyParam::HeartRate.default_value(),
        }
    }

    pub fn get(&self, param: BodyParam) -> f32 {
        match param {
            BodyParam::Energy => self.energy,
            BodyParam::Stress => self.stress,
            BodyParam::Arousal => self.arousal,
            BodyParam::Valence => self.valence,
            BodyParam::Temperature => self.temperature,
            BodyParam::Tension => self.tension,
            BodyParam::Fatigue => self.fatigue,
            BodyParam::Pain => self.pain,
            BodyParam::Hunger => self.hunger,
            BodyParam::HeartRate => self.heart_rate,
        }
    }

    /// Set a parameter, clamped to its range.
    pub fn set(&mut self, param: BodyParam, value: f32) {
        let value = param.clamp_value(value);
        match param {
            BodyParam::Energy => self.energy = value,
            BodyParam::Stress => self.stress = value,
            BodyParam::Arousal => self.arousal = value,
            BodyParam::Valence => self.valence = value,
            BodyParam::Temperature => self.temperature = value,
            BodyParam::Tension => self.tension = value,
            BodyParam::Fatigue => self.fatigue = value,
            BodyParam::Pain => self.pain = value,
            BodyParam::Hunger => self.hunger = value,
            BodyParam::HeartRate => self.heart_rate = value,
        }
    }

    /// Clamp every parameter into range, resetting NaN/Inf to defaults.
    pub fn normalize(&mut self) {
        for param in BodyParam::ALL {
            self.set(param, self.get(param));
        }
    }

    /// Parameter name → value, for display and pressure scoring.
    pub fn values(&self) -> BTreeMap<&'static str, f32> {
        BodyParam::ALL
            .iter()
            .map(|p| (p.as_str(), self.get(*p)))
            .collect()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        for param in BodyParam::ALL {
            let (lo, hi) = param.bounds();
            check_range(param.as_str(), self.get(param), lo, hi)?;
        }
        Ok(())
    }

    /// Seconds between this state's timestamp and `now`, never negative.
    pub fn elapsed_secs(&self, now: DateTime<Utc>) -> f32 {
        elapsed_secs_between(self.timestamp, now)
    }

    /// Relax toward baselines over `elapsed_secs`, stamped at `now`.
    pub fn apply_decay_at(
        &self,
        elapsed_secs: f32,
        table: &DecayTable,
        now: DateTime<Utc>,
    ) -> BodyState {
        let elapsed = if elapsed_secs.is_finite() {
            elapsed_secs.max(0.0)
        } else {
            0.0
        };
        let mut next = self.clone();
        next.id = None;
        next.timestamp = now;

        for param in BodyParam::ALL.iter().filter(|p| p.decays()) {
            let config = table.get(param.as_str());
            let value = decay_toward_baseline(
                self.get(*param),
                config.baseline,
                config.half_life_secs,
                elapsed,
            );
            next.set(*param, value);
        }
        next.set(
            BodyParam::Hunger,
            (self.hunger + HUNGER_GROWTH_PER_SEC * elapsed).min(1.0),
        );
        next
    }

    /// Relax toward baselines over `elapsed_secs`.
    pub fn apply_decay(&self, elapsed_secs: f32, table: &DecayTable) -> BodyState {
        self.apply_decay_at(elapsed_secs, table, Utc::now())
    }

    /// Add typed deltas and clamp.
    pub fn apply_body_changes(&self, deltas: &BodySignature) -> BodyState {
        let mut next = self.clone();
        next.id = None;
        next.timestamp = Utc::now();
        for (param, delta) in deltas {
            next.set(*param, self.get(*param) + sanitize_f32(*delta, 0.0));
        }
        next
    }

    /// Add deltas keyed by parameter name; unknown names are ignored.
    pub fn apply_named_changes(&self, deltas: &HashMap<String, f32>) -> BodyState {
        let typed: BodySignature = deltas
            .iter()
            .filter_map(|(name, delta)| match name.parse::<BodyParam>() {
                Ok(param) => Some((param, *delta)),
                Err(_) => {
                    tracing::debug!("Ignoring unknown body parameter '{}'", name);
                    None
                }
            })
            .collect();
        self.apply_body_changes(&typed)
    }

    /// Overall distance from the ideal resting state, in `[0, 1]`.
    ///
    /// The ideals are separate from the decay baselines even where they
    /// coincide.
    pub fn homeostatic_pressure(&self) -> f32 {
        let deviations = [
            (self.energy - 0.7).abs() * 1.2,
            (self.stress - 0.2).abs() * 1.0,
            (self.arousal - 0.5).abs() * 0.8,
            (self.valence - 0.2).abs() * 1.0,
            (self.tension - 0.2).abs() * 0.7,
            (self.fatigue - 0.1).abs() * 1.0,
            self.pain * 1.5,
            (self.hunger - 0.3).abs() * 0.6,
        ];
        let total: f32 = deviations.iter().sum();
        (total / deviations.len() as f32).clamp(0.0, 1.0)
    }

    /// Classify the state. Rules are checked in order; first match wins.
    pub fn background_emotion(&self) -> BackgroundEmotion {
        if self.energy > 0.7 && self.valence > 0.3 && self.stress < 0.3 {
            BackgroundEmotion::Vigor
        } else if self.energy < 0.3 && self.fatigue > 0.6 {
            BackgroundEmotion::Malaise
        } else if self.stress > 0.7 && self.tension > 0.6 {
            BackgroundEmotion::Unease
        } else if self.arousal < 0.3 && self.energy < 0.5 {
            BackgroundEmotion::Discouragement
        } else if self.valence > 0.4 && self.stress < 0.4 {
            BackgroundEmotion::Contentment
        } else if self.arousal > 0.7 && self.valence > 0.0 {
            BackgroundEmotion::Enthusiasm
        } else if self.arousal > 0.7 && self.valence < 0.0 {
            BackgroundEmotion::Tension
        } else {
            BackgroundEmotion::Equanimity
        }
    }
}

/// Non-negative seconds from `from` to `to`.
pub fn elapsed_secs_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f32 {
    let ms = (to - from).num_milliseconds().max(0);
    ms as f32 / 1000.0
}
