//! Emotion taxonomy, emotion events and feelings
//!
//! An [`Emotion`] is a bodily reaction with a cause; a [`Feeling`] is the
//! verbalized awareness of one. The taxonomy is closed: every lookup table is
//! an exhaustive `match` over [`EmotionType`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::body::{elapsed_secs_between, BodyParam, BodySignature};
use crate::decay::{valence_asymmetric_decay, DecayTable, DEFAULT_ASYMMETRY};
use crate::error::{check_range, check_unit, sanitize_f32, ValidationError};

/// Below this intensity an emotion leaves the active set.
pub const DECAYED_THRESHOLD: f32 = 0.05;

/// Awareness assigned to a feeling when none is given.
pub const DEFAULT_AWARENESS: f32 = 0.8;

// ============================================================================
// Taxonomy
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmotionCategory {
    Primary,
    Background,
    Social,
    Complex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmotionType {
    // Primary
    Fear,
    Anger,
    Sadness,
    Joy,
    Disgust,
    Surprise,
    // Background
    Contentment,
    Malaise,
    Unease,
    Tension,
    Enthusiasm,
    Discouragement,
    // Social
    Shame,
    Guilt,
    Pride,
    Admiration,
    Contempt,
    Compassion,
    // Complex
    Desire,
    Curiosity,
    Anticipation,
    Frustration,
}

impl EmotionType {
    pub const ALL: [EmotionType; 22] = [
        EmotionType::Fear,
        EmotionType::Anger,
        EmotionType::Sadness,
        EmotionType::Joy,
        EmotionType::Disgust,
        EmotionType::Surprise,
        EmotionType::Contentment,
        EmotionType::Malaise,
        EmotionType::Unease,
        EmotionType::Tension,
        EmotionType::Enthusiasm,
        EmotionType::Discouragement,
        EmotionType::Shame,
        EmotionType::Guilt,
        EmotionType::Pride,
        EmotionType::Admiration,
        EmotionType::Contempt,
        EmotionType::Compassion,
        EmotionType::Desire,
        EmotionType::Curiosity,
        EmotionType::Anticipation,
        EmotionType::Frustration,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EmotionType::Fear => "fear",
            EmotionType::Anger => "anger",
            EmotionType::Sadness => "sadness",
            EmotionType::Joy => "joy",
            EmotionType::Disgust => "disgust",
            EmotionType::Surprise => "surprise",
            EmotionType::Contentment => "contentment",
            EmotionType::Malaise => "malaise",
            EmotionType::Unease => "unease",
            EmotionType::Tension => "tension",
            EmotionType::Enthusiasm => "enthusiasm",
            EmotionType::Discouragement => "discouragement",
            EmotionType::Shame => "shame",
            EmotionType::Guilt => "guilt",
            EmotionType::Pride => "pride",
            EmotionType::Admiration => "admiration",
            EmotionType::Contempt => "contempt",
            EmotionType::Compassion => "compassion",
            EmotionType::Desire => "desire",
            EmotionType::Curiosity => "curiosity",
            EmotionType::Anticipation => "anticipation",
            EmotionType::Frustration => "frustration",
        }
    }

    pub fn category(&self) -> EmotionCategory {
        use EmotionType::*;
        match self {
            Fear | Anger | Sadness | Joy | Disgust | Surprise => EmotionCategory::Primary,
            Contentment | Malaise | Unease | Tension | Enthusiasm | Discouragement => {
                EmotionCategory::Background
            }
            Shame | Guilt | Pride | Admiration | Contempt | Compassion => EmotionCategory::Social,
            Desire | Curiosity | Anticipation | Frustration => EmotionCategory::Complex,
        }
    }

    pub fn default_valence(&self) -> f32 {
        use EmotionType::*;
        match self {
            Joy => 0.8,
            Contentment => 0.6,
            Enthusiasm => 0.7,
            Pride => 0.6,
            Admiration => 0.5,
            Compassion => 0.3,
            Surprise => 0.0,
            Curiosity => 0.2,
            Anticipation => 0.3,
            Desire => 0.4,
            Fear => -0.7,
            Anger => -0.6,
            Sadness => -0.7,
            Disgust => -0.6,
            Shame => -0.8,
            Guilt => -0.7,
            Contempt => -0.4,
            Malaise => -0.5,
            Unease => -0.4,
            Tension => -0.3,
            Discouragement => -0.6,
            Frustration => -0.5,
        }
    }

    pub fn default_arousal(&self) -> f32 {
        use EmotionType::*;
        match self {
            Fear => 0.9,
            Anger => 0.85,
            Surprise => 0.9,
            Enthusiasm => 0.8,
            Anticipation => 0.7,
            Frustration => 0.75,
            Tension => 0.7,
            Desire => 0.65,
            Joy => 0.6,
            Curiosity => 0.6,
            Unease => 0.6,
            Pride => 0.5,
            Disgust => 0.5,
            Guilt => 0.45,
            Compassion => 0.4,
            Admiration => 0.4,
            Contempt => 0.4,
            Shame => 0.4,
            Discouragement => 0.35,
            Sadness => 0.3,
            Contentment => 0.3,
            Malaise => 0.3,
        }
    }

    /// Unscaled body deltas for this type. Empty for types without one.
    pub fn signature_template(&self) -> &'static [(BodyParam, f32)] {
        use BodyParam as P;
        match self {
            EmotionType::Fear => &[
                (P::HeartRate, 0.9),
                (P::Tension, 0.8),
                (P::Temperature, 0.3),
                (P::Energy, -0.2),
                (P::Stress, 0.8),
            ],
            EmotionType::Anger => &[
                (P::HeartRate, 0.85),
                (P::Tension, 0.9),
                (P::Temperature, 0.8),
                (P::Energy, 0.3),
                (P::Stress, 0.7),
            ],
            EmotionType::Joy => &[
                (P::HeartRate, 0.7),
                (P::Tension, -0.2),
                (P::Energy, 0.4),
                (P::Stress, -0.3),
            ],
            EmotionType::Sadness => &[
                (P::HeartRate, 0.3),
                (P::Tension, 0.4),
                (P::Energy, -0.4),
                (P::Fatigue, 0.5),
            ],
            EmotionType::Contentment => &[
                (P::Tension, -0.3),
                (P::Stress, -0.4),
                (P::Energy, 0.2),
            ],
            _ => &[],
        }
    }

    /// Body deltas scaled by `intensity`.
    pub fn body_signature(&self, intensity: f32) -> BodySignature {
        self.signature_template()
            .iter()
            .map(|(param, delta)| (*param, delta * intensity))
            .collect()
    }
}

impl fmt::Display for EmotionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmotionType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        EmotionType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == needle)
            .ok_or_else(|| ValidationError::UnknownEmotionType(s.to_string()))
    }
}

// ============================================================================
// Emotion
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Emotion {
    pub id: Option<i64>,
    pub emotion_type: EmotionType,
    pub intensity: f32,
    pub valence: f32,
    pub arousal: f32,
    pub cause: String,
    pub body_signature: BodySignature,
    pub timestamp: DateTime<Utc>,
    pub decayed: bool,
}

impl Emotion {
    /// New emotion with the type's default valence/arousal and signature.
    /// Intensity is clamped to `[0, 1]`.
    pub fn new(emotion_type: EmotionType, intensity: f32, cause: impl Into<String>) -> Self {
        let intensity = sanitize_f32(intensity, 0.0).clamp(0.0, 1.0);
        Self {
            id: None,
            emotion_type,
            intensity,
            valence: emotion_type.default_valence(),
            arousal: emotion_type.default_arousal(),
            cause: cause.into(),
            body_signature: emotion_type.body_signature(intensity),
            timestamp: Utc::now(),
            decayed: false,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        check_unit("intensity", self.intensity)?;
        check_range("valence", self.valence, -1.0, 1.0)?;
        check_unit("arousal", self.arousal)?;
        for delta in self.body_signature.values() {
            check_range("body_signature", *delta, -1.0, 1.0)?;
        }
        Ok(())
    }

    /// Age by `elapsed_secs` and stamp with `now`.
    ///
    /// Intensity never increases and never decays below the type's baseline.
    pub fn apply_decay_at(
        &self,
        elapsed_secs: f32,
        table: &DecayTable,
        now: DateTime<Utc>,
    ) -> Emotion {
        let config = table.get(self.emotion_type.as_str());
        let decayed_value = valence_asymmetric_decay(
            self.intensity,
            self.valence,
            config.half_life_secs,
            elapsed_secs,
            config.baseline,
            DEFAULT_ASYMMETRY,
        );
        let intensity = sanitize_f32(decayed_value, 0.0)
            .min(self.intensity)
            .clamp(0.0, 1.0);

        Emotion {
            intensity,
            timestamp: now,
            decayed: self.decayed || intensity < DECAYED_THRESHOLD,
            ..self.clone()
        }
    }

    /// Age by the time since this emotion was last updated.
    pub fn apply_decay_since(&self, table: &DecayTable, now: DateTime<Utc>) -> Emotion {
        let elapsed = elapsed_secs_between(self.timestamp, now);
        self.apply_decay_at(elapsed, table, now)
    }
}

// ============================================================================
// Feeling
// ============================================================================

/// Verbal intensity bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntensityBand {
    Slightly,
    Somewhat,
    Moderately,
    Quite,
    Extremely,
}

impl IntensityBand {
    /// `[0,.2)` slightly … `[.8,1]` extremely.
    pub fn from_intensity(intensity: f32) -> Self {
        if intensity < 0.2 {
            IntensityBand::Slightly
        } else if intensity < 0.4 {
            IntensityBand::Somewhat
        } else if intensity < 0.6 {
            IntensityBand::Moderately
        } else if intensity < 0.8 {
            IntensityBand::Quite
        } else {
            IntensityBand::Extremely
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IntensityBand::Slightly => "slightly",
            IntensityBand::Somewhat => "somewhat",
            IntensityBand::Moderately => "moderately",
            IntensityBand::Quite => "quite",
            IntensityBand::Extremely => "extremely",
        }
    }
}

/// Conscious awareness of an emotion. Created once, never changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feeling {
    pub id: Option<i64>,
    pub emotion_id: Option<i64>,
    pub emotion_type: EmotionType,
    pub awareness_level: f32,
    pub verbalized: bool,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

impl Feeling {
    pub fn from_emotion(emotion: &Emotion, awareness_level: f32) -> Self {
        Self {
            id: None,
            emotion_id: emotion.id,
            emotion_type: emotion.emotion_type,
            awareness_level: sanitize_f32(awareness_level, DEFAULT_AWARENESS).clamp(0.0, 1.0),
            verbalized: true,
            description: describe(emotion),
            timestamp: Utc::now(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        check_unit("awareness_level", self.awareness_level)?;
        if self.description.trim().is_empty() {
            return Err(ValidationError::EmptyField("description"));
        }
        Ok(())
    }
}

/// "I feel {band} {type} about {cause}".
pub fn describe(emotion: &Emotion) -> String {
    let band = IntensityBand::from_intensity(emotion.intensity).as_str();
    let cause = emotion.cause.trim();
    if cause.is_empty() {
        format!("I feel {} {}", band, emotion.emotion_type)
    } else {
        format!("I feel {} {} about {}", band, emotion.emotion_type, cause)
    }
}
