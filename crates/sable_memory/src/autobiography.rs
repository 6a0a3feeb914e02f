//! Autobiographical memory (extended consciousness)
//!
//! Events become memories when they are emotionally salient. Memories
//! consolidate with rehearsal and fade over days; the most salient ones are
//! held in a small cache and make up the narrative self alongside a set of
//! identity traits.

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use sable_core::memory::{ENCODE_THRESHOLD, SIGNIFICANT_THRESHOLD};
use sable_core::{ConsciousnessStore, EmotionType, Event, Memory, MemoryQuery, MemorySort};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// How many significant memories stay cached.
pub const SIGNIFICANT_CACHE_SIZE: usize = 20;
/// Starting value of a trait first seen through `update_identity_trait`.
pub const NEUTRAL_TRAIT: f32 = 0.5;

const BY_EMOTION_LIMIT: usize = 50;

/// Shape of a contextual retrieval: the recent past plus defining moments.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContextWindow {
    pub max_total: usize,
    pub recent_limit: usize,
    pub salient_limit: usize,
    pub min_salience: f32,
    pub recent_days: i64,
}

impl Default for ContextWindow {
    fn default() -> Self {
        Self {
            max_total: 15,
            recent_limit: 10,
            salient_limit: 5,
            min_salience: ENCODE_THRESHOLD,
            recent_days: 7,
        }
    }
}

/// Result of a contextual retrieval.
#[derive(Debug, Clone, Default)]
pub struct ContextualMemories {
    /// Newest first, all inside the recent window.
    pub recent: Vec<Memory>,
    /// Most salient memories not already in `recent`.
    pub salient: Vec<Memory>,
}

impl ContextualMemories {
    pub fn len(&self) -> usize {
        self.recent.len() + self.salient.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_vec(self) -> Vec<Memory> {
        let mut all = self.recent;
        all.extend(self.salient);
        all
    }
}

pub struct MemoryEngine {
    store: Arc<dyn ConsciousnessStore>,
    significant: Vec<Memory>,
    identity_traits: BTreeMap<String, f32>,
}

impl MemoryEngine {
    pub fn new(store: Arc<dyn ConsciousnessStore>) -> Self {
        Self {
            store,
            significant: Vec::new(),
            identity_traits: BTreeMap::new(),
        }
    }

    /// Fill the significant cache and identity profile from the store.
    pub async fn load(&mut self) -> Result<()> {
        let query = MemoryQuery::new(SIGNIFICANT_THRESHOLD, SIGNIFICANT_CACHE_SIZE);
        self.significant = self
            .store
            .query_memories(&query)
            .await
            .context("Failed to load significant memories")?;
        self.identity_traits = self
            .store
            .identity_traits()
            .await
            .context("Failed to load identity traits")?;
        tracing::debug!(
            "Loaded {} significant memories, {} identity traits",
            self.significant.len(),
            self.identity_traits.len()
        );
        Ok(())
    }

    pub fn significant_memories(&self) -> &[Memory] {
        &self.significant
    }

    pub fn event_salience(&self, event: &Event) -> f32 {
        event.salience()
    }

    // === Encoding ===

    /// Persist a new event.
    pub async fn record_event(
        &self,
        description: &str,
        context: Option<String>,
        emotional_impact: BTreeMap<String, f32>,
    ) -> Result<Event> {
        let mut event = Event::new(description, context, emotional_impact);
        event.id = Some(
            self.store
                .save_event(&event)
                .await
                .context("Failed to save event")?,
        );
        Ok(event)
    }

    /// Turn `event` into a memory if it is salient enough. `None` otherwise.
    pub async fn encode_memory(
        &mut self,
        event: Event,
        narrative_role: Option<String>,
        identity_relevance: f32,
    ) -> Result<Option<Memory>> {
        let Some(mut memory) = Memory::encode(event, narrative_role, identity_relevance) else {
            tracing::debug!("Event below encoding threshold, not remembered");
            return Ok(None);
        };
        if memory.event.id.is_none() {
            memory.event.id = Some(
                self.store
                    .save_event(&memory.event)
                    .await
                    .context("Failed to save event")?,
            );
        }
        memory.id = Some(
            self.store
                .save_memory(&memory)
                .await
                .context("Failed to save memory")?,
        );
        tracing::debug!(
            "Encoded memory {:?} (salience {:.2})",
            memory.id,
            memory.emotional_salience
        );
        if memory.emotional_salience >= SIGNIFICANT_THRESHOLD {
            self.significant.push(memory.clone());
            self.resort_cache();
        }
        Ok(Some(memory))
    }

    fn resort_cache(&mut self) {
        MemoryQuery::default().sort(&mut self.significant);
        self.significant.truncate(SIGNIFICANT_CACHE_SIZE);
    }

    fn refresh_cached(&mut self, memory: &Memory) {
        if let Some(slot) = self.significant.iter_mut().find(|m| m.id == memory.id) {
            *slot = memory.clone();
        }
    }

    // === Rehearsal & fading ===

    /// Rehearse `memory` and persist it.
    pub async fn access_memory(&mut self, memory: &mut Memory) -> Result<()> {
        memory.access();
        self.store
            .update_memory(memory)
            .await
            .context("Failed to update accessed memory")?;
        self.refresh_cached(memory);
        Ok(())
    }

    /// Fetch by id (cache first), counting it as an access.
    pub async fn retrieve_memory(&mut self, id: i64) -> Result<Option<Memory>> {
        let Some(mut memory) = self.memory(id).await? else {
            return Ok(None);
        };
        self.access_memory(&mut memory).await?;
        Ok(Some(memory))
    }

    /// Fetch by id without rehearsing it.
    pub async fn memory(&self, id: i64) -> Result<Option<Memory>> {
        if let Some(cached) = self.significant.iter().find(|m| m.id == Some(id)) {
            return Ok(Some(cached.clone()));
        }
        self.store
            .get_memory(id)
            .await
            .context("Failed to load memory")
    }

    /// Fade one memory over `days` and persist it.
    pub async fn decay_memory(&mut self, memory: &mut Memory, days: f32) -> Result<()> {
        memory.decay(days);
        self.store
            .update_memory(memory)
            .await
            .context("Failed to update decayed memory")?;
        self.refresh_cached(memory);
        Ok(())
    }

    /// Fade every cached significant memory. Returns how many were touched.
    pub async fn decay_memories(&mut self, days: f32) -> Result<usize> {
        let mut next = self.significant.clone();
        for memory in &mut next {
            memory.decay(days);
            self.store
                .update_memory(memory)
                .await
                .context("Failed to update decayed memory")?;
        }
        let touched = next.len();
        self.significant = next;
        self.resort_cache();
        tracing::debug!("Decayed {} memories over {:.1} days", touched, days);
        Ok(touched)
    }

    // === Retrieval ===

    pub async fn query_memories(&self, query: &MemoryQuery) -> Result<Vec<Memory>> {
        self.store
            .query_memories(query)
            .await
            .context("Failed to query memories")
    }

    /// Memories that carry `emotion`, most salient first.
    pub async fn memories_by_emotion(
        &self,
        emotion: EmotionType,
        min_salience: f32,
    ) -> Result<Vec<Memory>> {
        let all = self
            .query_memories(&MemoryQuery::new(min_salience, usize::MAX))
            .await?;
        Ok(all
            .into_iter()
            .filter(|m| m.has_emotion(emotion))
            .take(BY_EMOTION_LIMIT)
            .collect())
    }

    pub async fn identity_relevant_memories(
        &self,
        min_relevance: f32,
        limit: usize,
    ) -> Result<Vec<Memory>> {
        self.query_memories(&MemoryQuery::new(0.0, limit).min_identity_relevance(min_relevance))
            .await
    }

    /// Recent memories (newest first) followed by the most salient older ones.
    pub async fn contextual_memories(&self, window: &ContextWindow) -> Result<Vec<Memory>> {
        Ok(self.contextual_sections(window).await?.into_vec())
    }

    /// Same retrieval as [`Self::contextual_memories`], keeping the two
    /// sections apart.
    pub async fn contextual_sections(&self, window: &ContextWindow) -> Result<ContextualMemories> {
        let since = Utc::now() - Duration::days(window.recent_days.max(0));
        let mut recent = self
            .query_memories(
                &MemoryQuery::new(window.min_salience, window.recent_limit)
                    .sorted_by(MemorySort::Recency)
                    .created_after(since),
            )
            .await?;

        let seen: HashSet<i64> = recent.iter().filter_map(|m| m.id).collect();
        let salient_pool = self
            .query_memories(&MemoryQuery::new(
                window.min_salience,
                window.salient_limit + seen.len(),
            ))
            .await?;

        recent.truncate(window.max_total);
        let room = window.max_total - recent.len();
        let salient = salient_pool
            .into_iter()
            .filter(|m| m.id.map_or(true, |id| !seen.contains(&id)))
            .take(window.salient_limit.min(room))
            .collect();
        Ok(ContextualMemories { recent, salient })
    }

    /// Memories whose description contains any whitespace-separated keyword.
    pub async fn search_memories(
        &self,
        keywords: &str,
        min_salience: f32,
        limit: usize,
    ) -> Result<Vec<Memory>> {
        if keywords.trim().is_empty() {
            return Ok(Vec::new());
        }
        self.query_memories(&MemoryQuery::new(min_salience, limit).keywords(keywords))
            .await
    }

    /// Link a memory to its logbook entry. `None` if the memory does not exist.
    pub async fn attach_logbook(&mut self, memory_id: i64, path: &str) -> Result<Option<Memory>> {
        let Some(mut memory) = self.memory(memory_id).await? else {
            return Ok(None);
        };
        memory.logbook_path = Some(path.to_string());
        self.store
            .update_memory(&memory)
            .await
            .context("Failed to attach logbook entry")?;
        self.refresh_cached(&memory);
        Ok(Some(memory))
    }

    // === Narrative self ===

    /// Chronological life story built from `memories`.
    pub fn construct_narrative(&self, memories: &[Memory]) -> String {
        if memories.is_empty() {
            return "No significant memories to form a narrative.".to_string();
        }
        let mut ordered: Vec<&Memory> = memories.iter().collect();
        ordered.sort_by_key(|m| m.created_at);
        ordered
            .iter()
            .map(|m| m.narrative_line())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn identity_profile(&self) -> &BTreeMap<String, f32> {
        &self.identity_traits
    }

    /// Replace the named traits, persisting each one.
    pub async fn set_identity_traits(&mut self, traits: &BTreeMap<String, f32>) -> Result<()> {
        for (name, value) in traits {
            let value = if value.is_finite() { value.clamp(0.0, 1.0) } else { NEUTRAL_TRAIT };
            self.store
                .save_identity_trait(name, value)
                .await
                .with_context(|| format!("Failed to save identity trait {}", name))?;
            self.identity_traits.insert(name.clone(), value);
        }
        Ok(())
    }

    /// Nudge one trait by `change`. Unknown traits start from neutral.
    pub async fn update_identity_trait(&mut self, name: &str, change: f32) -> Result<f32> {
        let current = self
            .identity_traits
            .get(name)
            .copied()
            .unwrap_or(NEUTRAL_TRAIT);
        let change = if change.is_finite() { change } else { 0.0 };
        let value = (current + change).clamp(0.0, 1.0);
        self.store
            .save_identity_trait(name, value)
            .await
            .with_context(|| format!("Failed to save identity trait {}", name))?;
        self.identity_traits.insert(name.to_string(), value);
        tracing::debug!("Identity trait {} {:.2} -> {:.2}", name, current, value);
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sable_core::InMemoryStore;

    fn impact(pairs: &[(&str, f32)]) -> BTreeMap<String, f32> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn engine() -> MemoryEngine {
        MemoryEngine::new(Arc::new(InMemoryStore::new()))
    }

    async fn remember(engine: &mut MemoryEngine, desc: &str, pairs: &[(&str, f32)]) -> Option<Memory> {
        let event = engine.record_event(desc, None, impact(pairs)).await.unwrap();
        engine.encode_memory(event, None, 0.5).await.unwrap()
    }

    #[tokio::test]
    async fn test_encoding_threshold() {
        let mut engine = engine();
        assert!(remember(&mut engine, "a dull afternoon", &[]).await.is_none());
        assert!(remember(&mut engine, "mild annoyance", &[("anger", 0.2)]).await.is_none());

        let m = remember(&mut engine, "close call", &[("fear", 0.5), ("anger", 0.5)])
            .await
            .unwrap();
        assert!((m.emotional_salience - 0.6).abs() < 1e-6);
        assert!((m.consolidation_level - 0.3).abs() < 1e-6);
        assert_eq!(engine.significant_memories().len(), 1);
    }

    #[tokio::test]
    async fn test_significant_cache_is_bounded_and_sorted() {
        let mut engine = engine();
        for i in 0..25 {
            let intensity = 0.6 + (i as f32) * 0.01;
            remember(&mut engine, &format!("event {}", i), &[("joy", intensity)]).await;
        }
        let cache = engine.significant_memories();
        assert_eq!(cache.len(), SIGNIFICANT_CACHE_SIZE);
        assert!(cache
            .windows(2)
            .all(|w| w[0].emotional_salience >= w[1].emotional_salience));
    }

    #[tokio::test]
    async fn test_retrieve_counts_access() {
        let mut engine = engine();
        let m = remember(&mut engine, "first day at school", &[("anxiety", 0.2), ("joy", 0.7)])
            .await
            .unwrap();
        let id = m.id.unwrap();

        let fetched = engine.retrieve_memory(id).await.unwrap().unwrap();
        assert_eq!(fetched.access_count, 1);
        assert!(fetched.consolidation_level > m.consolidation_level);

        let again = engine.retrieve_memory(id).await.unwrap().unwrap();
        assert_eq!(again.access_count, 2);
        assert!(engine.retrieve_memory(9999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_decay_memories_respects_floor() {
        let mut engine = engine();
        remember(&mut engine, "wedding", &[("joy", 1.0)]).await;
        let touched = engine.decay_memories(100_000.0).await.unwrap();
        assert_eq!(touched, 1);
        let m = &engine.significant_memories()[0];
        assert!((m.consolidation_level - m.consolidation_floor()).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_memories_by_emotion_and_search() {
        let mut engine = engine();
        remember(&mut engine, "Lost my keys", &[("frustration", 0.6)]).await;
        remember(&mut engine, "Found my keys", &[("joy", 0.6)]).await;
        remember(&mut engine, "Storm at night", &[("fear", 0.8)]).await;

        let joyful = engine.memories_by_emotion(EmotionType::Joy, 0.0).await.unwrap();
        assert_eq!(joyful.len(), 1);
        assert_eq!(joyful[0].event.description, "Found my keys");

        let keys = engine.search_memories("KEYS", 0.0, 10).await.unwrap();
        assert_eq!(keys.len(), 2);
        let either = engine.search_memories("storm lost", 0.0, 10).await.unwrap();
        assert_eq!(either.len(), 2);
        assert!(engine.search_memories("   ", 0.0, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_contextual_memories_excludes_duplicates() {
        let mut engine = engine();
        for i in 0..4 {
            remember(&mut engine, &format!("recent {}", i), &[("joy", 0.5)]).await;
        }
        let window = ContextWindow {
            max_total: 5,
            recent_limit: 2,
            salient_limit: 5,
            ..ContextWindow::default()
        };
        let found = engine.contextual_memories(&window).await.unwrap();
        assert_eq!(found.len(), 4);
        let ids: HashSet<i64> = found.iter().filter_map(|m| m.id).collect();
        assert_eq!(ids.len(), 4);

        let sections = engine.contextual_sections(&window).await.unwrap();
        assert_eq!(sections.recent.len(), 2);
        assert_eq!(sections.salient.len(), 2);
        assert_eq!(sections.recent[0].event.description, "recent 3");

        let tight = ContextWindow {
            max_total: 3,
            ..window
        };
        let sections = engine.contextual_sections(&tight).await.unwrap();
        assert_eq!((sections.recent.len(), sections.salient.len()), (2, 1));
    }

    #[tokio::test]
    async fn test_narrative_and_identity() {
        let mut engine = engine();
        assert_eq!(
            engine.construct_narrative(&[]),
            "No significant memories to form a narrative."
        );

        let event = engine
            .record_event("Moved to the coast", None, impact(&[("joy", 0.8)]))
            .await
            .unwrap();
        let m = engine
            .encode_memory(event, Some("turning point".into()), 0.9)
            .await
            .unwrap()
            .unwrap();
        let story = engine.construct_narrative(&[m]);
        assert_eq!(story, "[turning point] Moved to the coast (felt: joy)");

        assert!((engine.update_identity_trait("openness", 0.2).await.unwrap() - 0.7).abs() < 1e-6);
        assert!((engine.update_identity_trait("openness", 0.9).await.unwrap() - 1.0).abs() < 1e-6);
        assert_eq!(engine.identity_profile().len(), 1);

        let identity = engine.identity_relevant_memories(0.7, 30).await.unwrap();
        assert_eq!(identity.len(), 1);
    }

    #[tokio::test]
    async fn test_attach_logbook() {
        let store = Arc::new(InMemoryStore::new());
        let mut engine = MemoryEngine::new(store.clone());
        let m = remember(&mut engine, "a long talk", &[("trust", 0.7)]).await.unwrap();
        let id = m.id.unwrap();

        let linked = engine.attach_logbook(id, "2026/10/a-long-talk.md").await.unwrap().unwrap();
        assert_eq!(linked.logbook_path.as_deref(), Some("2026/10/a-long-talk.md"));
        let stored = store.get_memory(id).await.unwrap().unwrap();
        assert_eq!(stored.logbook_path, linked.logbook_path);
        assert!(engine.attach_logbook(777, "x.md").await.unwrap().is_none());
    }
}
