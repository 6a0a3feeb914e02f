//! State coordinator - keeps the three layers consistent
//!
//! Owns the current body state, the emotion engine and the memory engine.
//! Nothing runs in the background: every read first replays the time that
//! passed since the last write (body homeostasis, emotion fading), and every
//! stimulus is routed through body, emotion, memory and somatic updates in a
//! fixed order.
//!
//! Lifecycle:
//!   open (load or create baseline) → get_current_state / add_emotion / add_event ...

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sable_core::memory::{truncate_chars, DEFAULT_IDENTITY_RELEVANCE, MARKER_THRESHOLD};
use sable_core::{
    BackgroundEmotion, BodyState, ConsciousnessStore, DecayTable, Emotion, EmotionType, Event,
    Feeling, Memory, MemoryQuery, SomaticMarker,
};
use sable_limbic::EmotionEngine;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::autobiography::{ContextWindow, ContextualMemories, MemoryEngine};

/// Characters of an event description kept as a somatic marker pattern.
pub const MARKER_PATTERN_CHARS: usize = 50;

/// One coherent reading of all three layers.
#[derive(Debug, Clone, Serialize)]
pub struct ConsciousnessSnapshot {
    pub body: BodyState,
    pub homeostatic_pressure: f32,
    pub background_emotion: BackgroundEmotion,
    pub active_emotions: Vec<Emotion>,
    pub emotional_state: BTreeMap<EmotionType, f32>,
    pub overall_valence: f32,
    pub overall_arousal: f32,
    pub identity_traits: BTreeMap<String, f32>,
    pub core_values: Vec<String>,
    pub significant_memories: usize,
    pub somatic_markers: usize,
    pub timestamp: DateTime<Utc>,
}

/// How `add_event` treats a new event.
#[derive(Debug, Clone)]
pub struct EventOptions {
    pub encode_memory: bool,
    pub narrative_role: Option<String>,
    pub identity_relevance: f32,
    /// Fan the impact map out into triggered emotions.
    pub trigger_emotions: bool,
}

impl Default for EventOptions {
    fn default() -> Self {
        Self {
            encode_memory: true,
            narrative_role: None,
            identity_relevance: DEFAULT_IDENTITY_RELEVANCE,
            trigger_emotions: true,
        }
    }
}

/// Everything `add_event` produced.
#[derive(Debug, Clone, Serialize)]
pub struct EventOutcome {
    pub event: Event,
    pub memory: Option<Memory>,
    pub marker: Option<SomaticMarker>,
    pub emotions: Vec<Emotion>,
}

pub struct StateCoordinator {
    store: Arc<dyn ConsciousnessStore>,
    config_decay: DecayTable,
    body: BodyState,
    emotions: EmotionEngine,
    memory: MemoryEngine,
    core_values: Vec<String>,
}

impl StateCoordinator {
    /// Load every layer from `store`. `config_decay` holds configured decay
    /// overrides and wins over the ones persisted in the store.
    pub async fn open(store: Arc<dyn ConsciousnessStore>, config_decay: DecayTable) -> Result<Self> {
        let mut coordinator = Self {
            emotions: EmotionEngine::new(Arc::clone(&store), DecayTable::new()),
            memory: MemoryEngine::new(Arc::clone(&store)),
            body: BodyState::default(),
            store,
            config_decay,
            core_values: Vec::new(),
        };
        coordinator.load().await?;
        Ok(coordinator)
    }

    async fn load(&mut self) -> Result<()> {
        let mut decay = self
            .store
            .decay_overrides()
            .await
            .context("Failed to load decay overrides")?;
        decay.merge(&self.config_decay);
        self.emotions.set_decay_table(decay);

        self.emotions.load().await?;
        self.memory.load().await?;

        match self
            .store
            .latest_body_state()
            .await
            .context("Failed to load body state")?
        {
            Some(body) => self.body = body,
            None => {
                tracing::info!("No body state found, starting from baseline");
                self.replace_body(BodyState::default()).await?;
            }
        }
        Ok(())
    }

    /// Establish the system. `force_reset` wipes every stored record first.
    /// `identity_traits`, when given, are written over the current profile.
    pub async fn initialize(
        &mut self,
        identity_traits: Option<&BTreeMap<String, f32>>,
        force_reset: bool,
    ) -> Result<()> {
        if force_reset {
            tracing::warn!("Resetting consciousness store");
            self.store.reset().await.context("Failed to reset store")?;
            self.load().await?;
        }
        if let Some(traits) = identity_traits {
            self.memory.set_identity_traits(traits).await?;
        }
        tracing::info!(
            "Consciousness initialized: {} active emotions, {} significant memories",
            self.emotions.active_emotions().len(),
            self.memory.significant_memories().len()
        );
        Ok(())
    }

    pub fn body(&self) -> &BodyState {
        &self.body
    }

    pub fn emotions(&self) -> &EmotionEngine {
        &self.emotions
    }

    pub fn memory(&self) -> &MemoryEngine {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut MemoryEngine {
        &mut self.memory
    }

    /// Values reported alongside the identity traits. Configured, not stored.
    pub fn set_core_values(&mut self, values: Vec<String>) {
        self.core_values = values;
    }

    pub fn core_values(&self) -> &[String] {
        &self.core_values
    }

    pub fn decay_table(&self) -> &DecayTable {
        self.emotions.decay_table()
    }

    /// Persist `next` as the current body state, then swap it in.
    async fn replace_body(&mut self, mut next: BodyState) -> Result<()> {
        next.id = Some(
            self.store
                .save_body_state(&next)
                .await
                .context("Failed to save body state")?,
        );
        self.body = next;
        Ok(())
    }

    fn body_caught_up(&self, now: DateTime<Utc>) -> BodyState {
        self.body
            .apply_decay_at(self.body.elapsed_secs(now), self.emotions.decay_table(), now)
    }

    // === Read path ===

    /// Replay elapsed time on body and emotions. Returns how many emotions
    /// were retired.
    pub async fn apply_automatic_decay(&mut self) -> Result<usize> {
        self.apply_automatic_decay_at(Utc::now()).await
    }

    pub async fn apply_automatic_decay_at(&mut self, now: DateTime<Utc>) -> Result<usize> {
        let next = self.body_caught_up(now);
        self.replace_body(next).await?;
        self.emotions.apply_decay_at(None, now).await
    }

    /// Decay everything to now and take a snapshot.
    pub async fn get_current_state(&mut self) -> Result<ConsciousnessSnapshot> {
        self.apply_automatic_decay().await?;
        Ok(self.snapshot())
    }

    /// Snapshot of the in-memory state without replaying time.
    pub fn snapshot(&self) -> ConsciousnessSnapshot {
        let (overall_valence, overall_arousal) = self.emotions.overall_valence_arousal();
        ConsciousnessSnapshot {
            body: self.body.clone(),
            homeostatic_pressure: self.body.homeostatic_pressure(),
            background_emotion: self.body.background_emotion(),
            active_emotions: self.emotions.active_emotions().to_vec(),
            emotional_state: self.emotions.current_emotional_state(),
            overall_valence,
            overall_arousal,
            identity_traits: self.memory.identity_profile().clone(),
            core_values: self.core_values.clone(),
            significant_memories: self.memory.significant_memories().len(),
            somatic_markers: self.emotions.markers().len(),
            timestamp: Utc::now(),
        }
    }

    // === Stimuli ===

    /// Trigger an emotion and let the body feel it.
    pub async fn add_emotion(
        &mut self,
        emotion_type: EmotionType,
        intensity: f32,
        cause: &str,
        create_feeling: bool,
    ) -> Result<(Emotion, Option<Feeling>)> {
        let caught_up = self.body_caught_up(Utc::now());
        let emotion = self
            .emotions
            .trigger_emotion(emotion_type, intensity, cause)
            .await?;

        let next = caught_up.apply_body_changes(&emotion.body_signature);
        self.replace_body(next).await?;

        let feeling = if create_feeling {
            Some(self.emotions.feel(&emotion).await?)
        } else {
            None
        };
        Ok((emotion, feeling))
    }

    /// Record something that happened and route its consequences.
    pub async fn add_event(
        &mut self,
        description: &str,
        context: Option<String>,
        emotional_impact: BTreeMap<String, f32>,
        options: EventOptions,
    ) -> Result<EventOutcome> {
        let event = self
            .memory
            .record_event(description, context, emotional_impact)
            .await?;

        let mut memory = None;
        let mut marker = None;
        if options.encode_memory {
            memory = self
                .memory
                .encode_memory(
                    event.clone(),
                    options.narrative_role.clone(),
                    options.identity_relevance,
                )
                .await?;
            if let Some(m) = &memory {
                marker = self.maybe_form_marker(m).await?;
            }
        }

        let mut emotions = Vec::new();
        if options.trigger_emotions {
            for name in event.emotional_impact.keys() {
                if name.parse::<EmotionType>().is_err() {
                    tracing::debug!("Skipping unknown emotion type '{}'", name);
                }
            }
            for (emotion_type, intensity) in event.typed_impacts() {
                let (emotion, _) = self
                    .add_emotion(emotion_type, intensity, &event.description, true)
                    .await?;
                emotions.push(emotion);
            }
        }

        Ok(EventOutcome {
            event,
            memory,
            marker,
            emotions,
        })
    }

    async fn maybe_form_marker(&mut self, memory: &Memory) -> Result<Option<SomaticMarker>> {
        if memory.emotional_salience < MARKER_THRESHOLD {
            return Ok(None);
        }
        let Some((emotion_type, _)) = memory.event.dominant_emotion() else {
            return Ok(None);
        };
        let marker = self
            .emotions
            .create_somatic_marker(
                &truncate_chars(&memory.event.description, MARKER_PATTERN_CHARS),
                emotion_type,
                emotion_type.default_valence(),
                memory.emotional_salience,
                memory.id,
            )
            .await?;
        Ok(Some(marker))
    }

    /// Apply named body deltas after catching the body up to now.
    pub async fn apply_body_changes(&mut self, changes: &HashMap<String, f32>) -> Result<&BodyState> {
        let next = self.body_caught_up(Utc::now()).apply_named_changes(changes);
        self.replace_body(next).await?;
        Ok(&self.body)
    }

    // === Memory & markers ===

    /// Memories at or above `min_salience`, optionally carrying `emotion`.
    pub async fn query_memories(
        &self,
        min_salience: f32,
        emotion: Option<EmotionType>,
    ) -> Result<Vec<Memory>> {
        match emotion {
            Some(t) => self.memory.memories_by_emotion(t, min_salience).await,
            None => {
                self.memory
                    .query_memories(&MemoryQuery::new(min_salience, 100))
                    .await
            }
        }
    }

    pub async fn contextual_memories(&self, window: &ContextWindow) -> Result<Vec<Memory>> {
        self.memory.contextual_memories(window).await
    }

    pub async fn contextual_sections(&self, window: &ContextWindow) -> Result<ContextualMemories> {
        self.memory.contextual_sections(window).await
    }

    /// Gut feeling for `situation`, if any marker is strong enough.
    pub async fn somatic_marker(
        &self,
        situation: &str,
        min_strength: f32,
    ) -> Result<Option<SomaticMarker>> {
        self.emotions
            .get_somatic_marker_for_situation(situation, min_strength)
            .await
    }

    /// Teach a marker from an outcome. `None` if no such marker.
    pub async fn reinforce_marker(
        &mut self,
        marker_id: i64,
        outcome_valence: f32,
    ) -> Result<Option<SomaticMarker>> {
        self.emotions
            .reinforce_somatic_marker_by_id(marker_id, outcome_valence)
            .await
    }

    pub async fn decay_memories(&mut self, days: f32) -> Result<usize> {
        self.memory.decay_memories(days).await
    }

    pub async fn set_identity_traits(&mut self, traits: &BTreeMap<String, f32>) -> Result<()> {
        self.memory.set_identity_traits(traits).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use sable_core::{BodyParam, InMemoryStore};

    fn impact(pairs: &[(&str, f32)]) -> BTreeMap<String, f32> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    async fn coordinator() -> (Arc<InMemoryStore>, StateCoordinator) {
        let store = Arc::new(InMemoryStore::new());
        let c = StateCoordinator::open(store.clone(), DecayTable::new())
            .await
            .unwrap();
        (store, c)
    }

    #[tokio::test]
    async fn test_open_creates_baseline_body() {
        let (store, c) = coordinator().await;
        assert_eq!(store.body_state_count().await, 1);
        assert!(c.body().id.is_some());
        assert!((c.body().energy - 0.7).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_core_values_in_snapshot() {
        let (_store, mut c) = coordinator().await;
        assert!(c.snapshot().core_values.is_empty());
        c.set_core_values(vec!["honesty".to_string(), "curiosity".to_string()]);
        let state = c.get_current_state().await.unwrap();
        assert_eq!(state.core_values, vec!["honesty", "curiosity"]);
        assert_eq!(c.core_values().len(), 2);
    }

    #[tokio::test]
    async fn test_fear_drives_body() {
        let (_store, mut c) = coordinator().await;
        let (emotion, feeling) = c
            .add_emotion(EmotionType::Fear, 0.9, "a snake", true)
            .await
            .unwrap();
        assert!((emotion.body_signature[&BodyParam::HeartRate] - 0.81).abs() < 1e-5);
        assert!((emotion.body_signature[&BodyParam::Tension] - 0.72).abs() < 1e-5);
        assert!((c.body().tension - 1.0).abs() < 1e-6);
        assert_eq!(feeling.unwrap().description, "I feel extremely fear about a snake");
    }

    #[tokio::test]
    async fn test_event_forms_memory_marker_and_emotions() {
        let (_store, mut c) = coordinator().await;
        let description = "Presented the project to the whole department and it went badly";
        let outcome = c
            .add_event(
                description,
                None,
                impact(&[("fear", 0.8), ("shame", 0.6), ("bogus", 0.9)]),
                EventOptions::default(),
            )
            .await
            .unwrap();

        let memory = outcome.memory.unwrap();
        assert!((memory.emotional_salience - 1.0).abs() < 1e-6);

        // "bogus" is the strongest entry but is not an emotion type
        assert!(outcome.marker.is_none());
        assert_eq!(outcome.emotions.len(), 2);
        assert_eq!(c.emotions().active_emotions().len(), 2);
        assert_eq!(c.memory().significant_memories().len(), 1);
    }

    #[tokio::test]
    async fn test_marker_uses_dominant_emotion() {
        let (_store, mut c) = coordinator().await;
        let description = "Presented the project to the whole department and it went badly";
        let outcome = c
            .add_event(
                description,
                None,
                impact(&[("fear", 0.8), ("shame", 0.6)]),
                EventOptions::default(),
            )
            .await
            .unwrap();

        let marker = outcome.marker.unwrap();
        assert_eq!(marker.emotion_type, EmotionType::Fear);
        assert_eq!(marker.situation_pattern.chars().count(), MARKER_PATTERN_CHARS);
        assert!((marker.valence - EmotionType::Fear.default_valence()).abs() < 1e-6);
        assert_eq!(marker.origin_memory_id, outcome.memory.unwrap().id);

        let found = c.somatic_marker("whole department", 0.3).await.unwrap().unwrap();
        assert_eq!(found.id, marker.id);

        let reinforced = c.reinforce_marker(marker.id.unwrap(), -0.8).await.unwrap().unwrap();
        assert_eq!(reinforced.reinforcement_count, 2);
    }

    #[tokio::test]
    async fn test_low_salience_event_is_not_remembered() {
        let (_store, mut c) = coordinator().await;
        let outcome = c
            .add_event("Checked the mail", None, impact(&[("surprise", 0.1)]), EventOptions::default())
            .await
            .unwrap();
        assert!(outcome.memory.is_none());
        assert!(outcome.marker.is_none());
        assert!(outcome.event.id.is_some());
    }

    #[tokio::test]
    async fn test_decay_replays_elapsed_time() {
        let (_store, mut c) = coordinator().await;
        c.add_emotion(EmotionType::Surprise, 0.9, "a bang", false)
            .await
            .unwrap();
        let stressed = c
            .apply_body_changes(&HashMap::from([("stress".to_string(), 0.6)]))
            .await
            .unwrap()
            .stress;

        let later = Utc::now() + Duration::hours(10);
        let retired = c.apply_automatic_decay_at(later).await.unwrap();
        assert!(c.body().stress < stressed);
        assert!(c.body().hunger > 0.3);

        // Surprise settles at its baseline instead of leaving the active set
        assert_eq!(retired, 0);
        let surprise = &c.emotions().active_emotions()[0];
        assert!((surprise.intensity - 0.05).abs() < 1e-4);
    }

    #[tokio::test]
    async fn test_snapshot_and_reset() {
        let (store, mut c) = coordinator().await;
        let traits = BTreeMap::from([("curiosity".to_string(), 0.8)]);
        c.initialize(Some(&traits), false).await.unwrap();
        c.add_emotion(EmotionType::Joy, 0.7, "good news", false)
            .await
            .unwrap();

        let snapshot = c.get_current_state().await.unwrap();
        assert_eq!(snapshot.active_emotions.len(), 1);
        assert!(snapshot.overall_valence > 0.0);
        assert_eq!(snapshot.identity_traits["curiosity"], 0.8);
        assert!(serde_json::to_string(&snapshot).unwrap().contains("\"joy\""));

        c.initialize(None, true).await.unwrap();
        let snapshot = c.get_current_state().await.unwrap();
        assert!(snapshot.active_emotions.is_empty());
        assert!(snapshot.identity_traits.is_empty());
        assert_eq!(store.feeling_count().await, 0);
    }
}
