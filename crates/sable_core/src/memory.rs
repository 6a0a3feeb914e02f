//! Events, autobiographical memories and somatic markers
//!
//! An [`Event`] is raw experience. A [`Memory`] wraps an event that was
//! emotionally salient enough to keep; its consolidation grows with rehearsal
//! and fades over days. A [`SomaticMarker`] is a learned situation → valence
//! association formed from highly salient memories.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::f32::consts::LN_2;

use crate::emotion::EmotionType;
use crate::error::{check_range, check_unit, sanitize_f32, ValidationError};

/// Salience below which an event is not remembered.
pub const ENCODE_THRESHOLD: f32 = 0.3;
/// Salience at which a memory joins the significant cache.
pub const SIGNIFICANT_THRESHOLD: f32 = 0.6;
/// Salience at which an encoded memory forms a somatic marker.
pub const MARKER_THRESHOLD: f32 = 0.7;
/// Salience of an event with no recorded emotional impact.
pub const BASELINE_SALIENCE: f32 = 0.1;
/// Base memory half-life in days, before salience/consolidation/rehearsal.
pub const MEMORY_BASE_HALF_LIFE_DAYS: f32 = 30.0;
/// Default identity relevance of a new memory.
pub const DEFAULT_IDENTITY_RELEVANCE: f32 = 0.5;

// ============================================================================
// Event
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: Option<i64>,
    pub description: String,
    pub context: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// Emotion-type name → intensity. Names are kept verbatim; unknown ones
    /// are skipped wherever a typed emotion is needed.
    pub emotional_impact: BTreeMap<String, f32>,
}

impl Event {
    /// New event; impact intensities are clamped to `[0, 1]`.
    pub fn new(
        description: impl Into<String>,
        context: Option<String>,
        emotional_impact: BTreeMap<String, f32>,
    ) -> Self {
        let emotional_impact = emotional_impact
            .into_iter()
            .map(|(name, v)| (name, sanitize_f32(v, 0.0).clamp(0.0, 1.0)))
            .collect();
        Self {
            id: None,
            description: description.into(),
            context,
            timestamp: Utc::now(),
            emotional_impact,
        }
    }

    /// `min(1, max * (1 + 0.1 * n))`, or the baseline for no impact.
    pub fn salience(&self) -> f32 {
        if self.emotional_impact.is_empty() {
            return BASELINE_SALIENCE;
        }
        let max = self
            .emotional_impact
            .values()
            .fold(0.0f32, |acc, v| acc.max(*v));
        let n = self.emotional_impact.len() as f32;
        (max * (1.0 + 0.1 * n)).min(1.0)
    }

    /// Impact entries whose names parse as emotion types.
    pub fn typed_impacts(&self) -> Vec<(EmotionType, f32)> {
        self.emotional_impact
            .iter()
            .filter_map(|(name, v)| name.parse::<EmotionType>().ok().map(|t| (t, *v)))
            .collect()
    }

    /// The strongest impact entry, if it names a known emotion type.
    /// Ties go to the first entry in name order.
    pub fn dominant_emotion(&self) -> Option<(EmotionType, f32)> {
        let mut best: Option<(&String, f32)> = None;
        for (name, v) in &self.emotional_impact {
            if best.map_or(true, |(_, b)| *v > b) {
                best = Some((name, *v));
            }
        }
        let (name, v) = best?;
        name.parse::<EmotionType>().ok().map(|t| (t, v))
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.description.trim().is_empty() {
            return Err(ValidationError::EmptyField("description"));
        }
        for v in self.emotional_impact.values() {
            check_unit("emotional_impact", *v)?;
        }
        Ok(())
    }
}

// ============================================================================
// Memory
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    pub id: Option<i64>,
    pub event: Event,
    pub emotional_salience: f32,
    pub access_count: u32,
    pub last_accessed: Option<DateTime<Utc>>,
    pub consolidation_level: f32,
    pub narrative_role: Option<String>,
    pub associated_emotions: Vec<String>,
    pub identity_relevance: f32,
    pub created_at: DateTime<Utc>,
    /// Relative path of an extended logbook entry, if one was written.
    pub logbook_path: Option<String>,
}

impl Memory {
    /// Encode `event` if it is salient enough to remember.
    pub fn encode(
        event: Event,
        narrative_role: Option<String>,
        identity_relevance: f32,
    ) -> Option<Memory> {
        let salience = event.salience();
        if salience < ENCODE_THRESHOLD {
            return None;
        }
        let associated_emotions = event.emotional_impact.keys().cloned().collect();
        Some(Memory {
            id: None,
            emotional_salience: salience,
            access_count: 0,
            last_accessed: None,
            consolidation_level: salience * 0.5,
            narrative_role,
            associated_emotions,
            identity_relevance: sanitize_f32(identity_relevance, DEFAULT_IDENTITY_RELEVANCE)
                .clamp(0.0, 1.0),
            created_at: Utc::now(),
            logbook_path: None,
            event,
        })
    }

    /// Lowest consolidation time-based decay can reach.
    pub fn consolidation_floor(&self) -> f32 {
        self.emotional_salience * 0.3
    }

    /// Rehearse: each access closes 5% of the remaining gap to 1.0.
    pub fn access(&mut self) {
        self.access_count = self.access_count.saturating_add(1);
        self.last_accessed = Some(Utc::now());
        let c = self.consolidation_level;
        self.consolidation_level = (c + 0.05 * (1.0 - c)).clamp(0.0, 1.0);
    }

    /// Effective half-life in days.
    pub fn half_life_days(&self) -> f32 {
        let rehearsal = (self.access_count as f32 * 0.1).min(2.0);
        MEMORY_BASE_HALF_LIFE_DAYS
            * (1.0 + 2.0 * self.emotional_salience)
            * (1.0 + self.consolidation_level)
            * (1.0 + rehearsal)
    }

    /// Fade consolidation over `days`. Never rises and never drops below
    /// `salience * 0.3` (unless it already sits below that).
    pub fn decay(&mut self, days: f32) {
        let days = if days.is_finite() { days.max(0.0) } else { 0.0 };
        let factor = (-LN_2 / self.half_life_days() * days).exp();
        let c = self.consolidation_level;
        let floor = self.consolidation_floor().min(c);
        self.consolidation_level = (c * factor).max(floor);
    }

    pub fn has_emotion(&self, emotion: EmotionType) -> bool {
        self.associated_emotions
            .iter()
            .any(|e| e.eq_ignore_ascii_case(emotion.as_str()))
    }

    /// One line of the life story: `[role] description (felt: a, b)`.
    pub fn narrative_line(&self) -> String {
        let mut line = String::new();
        if let Some(role) = self.narrative_role.as_deref().filter(|r| !r.is_empty()) {
            line.push_str(&format!("[{}] ", role));
        }
        line.push_str(&self.event.description);
        if !self.associated_emotions.is_empty() {
            line.push_str(&format!(" (felt: {})", self.associated_emotions.join(", ")));
        }
        line
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.event.validate()?;
        check_unit("emotional_salience", self.emotional_salience)?;
        check_unit("consolidation_level", self.consolidation_level)?;
        check_unit("identity_relevance", self.identity_relevance)?;
        Ok(())
    }
}

// ============================================================================
// Somatic marker
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SomaticMarker {
    pub id: Option<i64>,
    pub situation_pattern: String,
    pub emotion_type: EmotionType,
    pub valence: f32,
    pub strength: f32,
    pub reinforcement_count: u32,
    pub origin_memory_id: Option<i64>,
    pub last_activated: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl SomaticMarker {
    pub fn new(
        situation_pattern: impl Into<String>,
        emotion_type: EmotionType,
        valence: f32,
        strength: f32,
        origin_memory_id: Option<i64>,
    ) -> Self {
        Self {
            id: None,
            situation_pattern: situation_pattern.into(),
            emotion_type,
            valence: sanitize_f32(valence, 0.0).clamp(-1.0, 1.0),
            strength: sanitize_f32(strength, 0.5).clamp(0.0, 1.0),
            reinforcement_count: 1,
            origin_memory_id,
            last_activated: None,
            created_at: Utc::now(),
        }
    }

    /// `1 - |valence - outcome| / 2`, in `[0, 1]` for valid inputs.
    pub fn agreement(&self, outcome_valence: f32) -> f32 {
        1.0 - (self.valence - outcome_valence).abs() / 2.0
    }

    /// Learn from an outcome: agreement above 0.5 strengthens by 0.05 (cap
    /// 1.0), anything else weakens by 0.1 (floor 0.1).
    pub fn reinforce(&mut self, outcome_valence: f32) {
        let outcome = sanitize_f32(outcome_valence, self.valence).clamp(-1.0, 1.0);
        self.reinforcement_count = self.reinforcement_count.saturating_add(1);
        if self.agreement(outcome) > 0.5 {
            self.strength = (self.strength + 0.05).min(1.0);
        } else {
            self.strength = (self.strength - 0.1).max(0.1);
        }
    }

    /// Fire the marker: stamps `last_activated`, returns the scaled signal.
    pub fn activate(&mut self, multiplier: f32) -> f32 {
        self.last_activated = Some(Utc::now());
        self.strength * multiplier
    }

    /// Case-insensitive substring test, same semantics as `LIKE '%p%'`.
    pub fn matches(&self, pattern: &str) -> bool {
        self.situation_pattern
            .to_ascii_lowercase()
            .contains(&pattern.to_ascii_lowercase())
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.situation_pattern.trim().is_empty() {
            return Err(ValidationError::EmptyField("situation_pattern"));
        }
        check_range("valence", self.valence, -1.0, 1.0)?;
        check_unit("strength", self.strength)?;
        Ok(())
    }
}

/// First `max_chars` characters of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
