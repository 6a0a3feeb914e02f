//! Emotion engine
//!
//! Holds the live (not yet decayed) emotions, triggers new ones, derives
//! feelings from them and ages them out. Also fronts the somatic marker store.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sable_core::emotion::DEFAULT_AWARENESS;
use sable_core::{
    ConsciousnessStore, DecayTable, Emotion, EmotionType, Feeling, SomaticMarker,
};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::somatic::SomaticMarkerStore;

/// Neutral `(valence, arousal)` when nothing is active.
pub const NEUTRAL_VALENCE_AROUSAL: (f32, f32) = (0.0, 0.5);

pub struct EmotionEngine {
    store: Arc<dyn ConsciousnessStore>,
    decay: DecayTable,
    active: Vec<Emotion>,
    markers: SomaticMarkerStore,
}

impl EmotionEngine {
    pub fn new(store: Arc<dyn ConsciousnessStore>, decay: DecayTable) -> Self {
        Self {
            markers: SomaticMarkerStore::new(Arc::clone(&store)),
            store,
            decay,
            active: Vec::new(),
        }
    }

    /// Load the active set and the marker cache from the store.
    pub async fn load(&mut self) -> Result<()> {
        self.active = self
            .store
            .active_emotions()
            .await
            .context("Failed to load active emotions")?;
        self.markers.load().await?;
        tracing::debug!("Loaded {} active emotions", self.active.len());
        Ok(())
    }

    pub fn active_emotions(&self) -> &[Emotion] {
        &self.active
    }

    pub fn decay_table(&self) -> &DecayTable {
        &self.decay
    }

    pub fn set_decay_table(&mut self, decay: DecayTable) {
        self.decay = decay;
    }

    pub fn markers(&self) -> &SomaticMarkerStore {
        &self.markers
    }

    /// Create, persist and activate a new emotion. The caller applies its
    /// body signature to the body state.
    pub async fn trigger_emotion(
        &mut self,
        emotion_type: EmotionType,
        intensity: f32,
        cause: &str,
    ) -> Result<Emotion> {
        let mut emotion = Emotion::new(emotion_type, intensity, cause);
        emotion.id = Some(
            self.store
                .save_emotion(&emotion)
                .await
                .context("Failed to save emotion")?,
        );
        tracing::debug!(
            "Triggered {} at {:.2} ({})",
            emotion.emotion_type,
            emotion.intensity,
            emotion.cause
        );
        self.active.push(emotion.clone());
        Ok(emotion)
    }

    /// Derive and persist a feeling. The emotion itself is untouched.
    pub async fn feel_emotion(&self, emotion: &Emotion, awareness_level: f32) -> Result<Feeling> {
        let mut feeling = Feeling::from_emotion(emotion, awareness_level);
        feeling.id = Some(
            self.store
                .save_feeling(&feeling)
                .await
                .context("Failed to save feeling")?,
        );
        Ok(feeling)
    }

    /// Feel with the default awareness level.
    pub async fn feel(&self, emotion: &Emotion) -> Result<Feeling> {
        self.feel_emotion(emotion, DEFAULT_AWARENESS).await
    }

    /// Age every active emotion. With `elapsed_secs = None` each emotion
    /// uses the time since its own timestamp. Returns how many were retired.
    pub async fn apply_decay(&mut self, elapsed_secs: Option<f32>) -> Result<usize> {
        self.apply_decay_at(elapsed_secs, Utc::now()).await
    }

    pub async fn apply_decay_at(
        &mut self,
        elapsed_secs: Option<f32>,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let next: Vec<Emotion> = self
            .active
            .iter()
            .map(|e| match elapsed_secs {
                Some(secs) => e.apply_decay_at(secs, &self.decay, now),
                None => e.apply_decay_since(&self.decay, now),
            })
            .collect();

        for emotion in &next {
            self.store
                .update_emotion(emotion)
                .await
                .context("Failed to update decayed emotion")?;
            tracing::trace!(
                "{} decayed to {:.3}{}",
                emotion.emotion_type,
                emotion.intensity,
                if emotion.decayed { " (retired)" } else { "" }
            );
        }

        let before = next.len();
        self.active = next.into_iter().filter(|e| !e.decayed).collect();
        Ok(before - self.active.len())
    }

    /// Per-type intensity sums, each capped at 1.0.
    pub fn current_emotional_state(&self) -> BTreeMap<EmotionType, f32> {
        let mut state = BTreeMap::new();
        for emotion in self.active.iter().filter(|e| !e.decayed) {
            *state.entry(emotion.emotion_type).or_insert(0.0) += emotion.intensity;
        }
        for value in state.values_mut() {
            *value = f32::min(*value, 1.0);
        }
        state
    }

    /// Intensity-weighted mean valence and arousal.
    pub fn overall_valence_arousal(&self) -> (f32, f32) {
        let mut total = 0.0;
        let mut valence = 0.0;
        let mut arousal = 0.0;
        for emotion in self.active.iter().filter(|e| !e.decayed) {
            total += emotion.intensity;
            valence += emotion.valence * emotion.intensity;
            arousal += emotion.arousal * emotion.intensity;
        }
        if total <= 0.0 {
            return NEUTRAL_VALENCE_AROUSAL;
        }
        (valence / total, arousal / total)
    }

    // ========================================================================
    // Somatic markers
    // ========================================================================

    pub async fn get_somatic_marker_for_situation(
        &self,
        situation: &str,
        min_strength: f32,
    ) -> Result<Option<SomaticMarker>> {
        self.markers.for_situation(situation, min_strength).await
    }

    pub async fn create_somatic_marker(
        &mut self,
        situation_pattern: &str,
        emotion_type: EmotionType,
        valence: f32,
        strength: f32,
        origin_memory_id: Option<i64>,
    ) -> Result<SomaticMarker> {
        self.markers
            .create(situation_pattern, emotion_type, valence, strength, origin_memory_id)
            .await
    }

    pub async fn reinforce_somatic_marker(
        &mut self,
        marker: &mut SomaticMarker,
        outcome_valence: f32,
    ) -> Result<()> {
        self.markers.reinforce(marker, outcome_valence).await
    }

    pub async fn reinforce_somatic_marker_by_id(
        &mut self,
        id: i64,
        outcome_valence: f32,
    ) -> Result<Option<SomaticMarker>> {
        self.markers.reinforce_by_id(id, outcome_valence).await
    }

    pub async fn activate_somatic_marker(
        &mut self,
        marker: &mut SomaticMarker,
        multiplier: f32,
    ) -> Result<f32> {
        self.markers.activate(marker, multiplier).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sable_core::{DecayConfig, InMemoryStore};

    fn engine() -> EmotionEngine {
        EmotionEngine::new(Arc::new(InMemoryStore::new()), DecayTable::new())
    }

    #[tokio::test]
    async fn test_trigger_adds_to_active_set() {
        let mut engine = engine();
        let fear = engine
            .trigger_emotion(EmotionType::Fear, 0.9, "loud noise")
            .await
            .unwrap();
        assert!(fear.id.is_some());
        assert_eq!(engine.active_emotions().len(), 1);
        assert!((fear.body_signature[&sable_core::BodyParam::HeartRate] - 0.81).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_feel_does_not_mutate_emotion() {
        let mut engine = engine();
        let joy = engine.trigger_emotion(EmotionType::Joy, 0.5, "music").await.unwrap();
        let feeling = engine.feel(&joy).await.unwrap();
        assert_eq!(feeling.description, "I feel moderately joy about music");
        assert_eq!(feeling.emotion_id, joy.id);
        assert_eq!(engine.active_emotions()[0], joy);
    }

    #[tokio::test]
    async fn test_emotional_state_accumulates_and_caps() {
        let mut engine = engine();
        engine.trigger_emotion(EmotionType::Joy, 0.6, "a").await.unwrap();
        engine.trigger_emotion(EmotionType::Joy, 0.7, "b").await.unwrap();
        engine.trigger_emotion(EmotionType::Fear, 0.3, "c").await.unwrap();
        let state = engine.current_emotional_state();
        assert_eq!(state[&EmotionType::Joy], 1.0);
        assert!((state[&EmotionType::Fear] - 0.3).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_overall_valence_arousal() {
        let mut engine = engine();
        assert_eq!(engine.overall_valence_arousal(), (0.0, 0.5));

        engine.trigger_emotion(EmotionType::Joy, 0.5, "a").await.unwrap();
        engine.trigger_emotion(EmotionType::Fear, 0.5, "b").await.unwrap();
        let (v, a) = engine.overall_valence_arousal();
        assert!((v - 0.05).abs() < 1e-5, "valence {}", v);
        assert!((a - 0.75).abs() < 1e-5, "arousal {}", a);
    }

    #[tokio::test]
    async fn test_zero_intensity_is_neutral() {
        let mut engine = engine();
        engine.trigger_emotion(EmotionType::Joy, 0.0, "nothing").await.unwrap();
        assert_eq!(engine.overall_valence_arousal(), NEUTRAL_VALENCE_AROUSAL);
    }

    #[tokio::test]
    async fn test_decay_zero_is_identity() {
        let mut engine = engine();
        let e = engine.trigger_emotion(EmotionType::Anger, 0.8, "x").await.unwrap();
        let retired = engine.apply_decay(Some(0.0)).await.unwrap();
        assert_eq!(retired, 0);
        assert_eq!(engine.active_emotions()[0].intensity, e.intensity);
    }

    #[tokio::test]
    async fn test_decay_retires_and_persists() {
        let store = Arc::new(InMemoryStore::new());
        let table = DecayTable::with_overrides([("surprise", DecayConfig::new(1.0, 0.0))]);
        let mut engine = EmotionEngine::new(store.clone(), table);
        engine.trigger_emotion(EmotionType::Surprise, 0.9, "pop").await.unwrap();
        engine.trigger_emotion(EmotionType::Sadness, 0.9, "loss").await.unwrap();

        let retired = engine.apply_decay(Some(60.0)).await.unwrap();
        assert_eq!(retired, 1);
        assert_eq!(engine.active_emotions().len(), 1);
        assert_eq!(engine.active_emotions()[0].emotion_type, EmotionType::Sadness);

        let persisted = store.active_emotions().await.unwrap();
        assert_eq!(persisted.len(), 1);
        assert!(persisted[0].intensity < 0.9);
    }

    #[tokio::test]
    async fn test_decay_uses_each_timestamp_when_unspecified() {
        let mut engine = engine();
        let e = engine.trigger_emotion(EmotionType::Fear, 0.9, "x").await.unwrap();
        // one fear half-life stretched by valence -0.7: 120 * 1.21
        let later = e.timestamp + chrono::Duration::milliseconds(145_200);
        engine.apply_decay_at(None, later).await.unwrap();
        let now = engine.active_emotions()[0].intensity;
        assert!((now - (0.05 + 0.85 / 2.0)).abs() < 1e-3, "got {}", now);
        assert_eq!(engine.active_emotions()[0].timestamp, later);
    }

    #[tokio::test]
    async fn test_load_restores_active_set() {
        let store = Arc::new(InMemoryStore::new());
        let mut first = EmotionEngine::new(store.clone(), DecayTable::new());
        first.trigger_emotion(EmotionType::Pride, 0.6, "shipped").await.unwrap();

        let mut second = EmotionEngine::new(store, DecayTable::new());
        second.load().await.unwrap();
        assert_eq!(second.active_emotions().len(), 1);
    }

    #[tokio::test]
    async fn test_marker_round_trip_through_engine() {
        let mut engine = engine();
        let mut marker = engine
            .create_somatic_marker("job interview", EmotionType::Fear, -0.7, 0.8, None)
            .await
            .unwrap();
        engine.reinforce_somatic_marker(&mut marker, -0.7).await.unwrap();
        let found = engine
            .get_somatic_marker_for_situation("interview", 0.3)
            .await
            .unwrap()
            .unwrap();
        assert!((found.strength - 0.85).abs() < 1e-6);
    }
}
