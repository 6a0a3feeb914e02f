//! Durable store contract
//!
//! The store is the system of record; the engines keep write-through caches
//! on top of it. Every record gets a stable integer id on first save and is
//! updated by that id afterwards.

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tokio::sync::RwLock;

use crate::body::BodyState;
use crate::decay::{DecayConfig, DecayTable};
use crate::emotion::{Emotion, Feeling};
use crate::memory::{Event, Memory, SomaticMarker};

// ============================================================================
// Memory queries
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemorySort {
    /// Salience, then consolidation, both descending.
    #[default]
    Salience,
    /// Newest first.
    Recency,
    /// Most rehearsed first.
    AccessCount,
}

impl fmt::Display for MemorySort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MemorySort::Salience => "salience",
            MemorySort::Recency => "recency",
            MemorySort::AccessCount => "access_count",
        })
    }
}

impl FromStr for MemorySort {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "salience" => Ok(MemorySort::Salience),
            "recency" => Ok(MemorySort::Recency),
            "access_count" => Ok(MemorySort::AccessCount),
            other => bail!("Unknown memory sort order: {}", other),
        }
    }
}

/// Filter and ordering for [`ConsciousnessStore::query_memories`].
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryQuery {
    pub min_salience: f32,
    pub min_identity_relevance: f32,
    pub limit: usize,
    pub sort_by: MemorySort,
    /// Only memories created at or after this instant.
    pub created_after: Option<DateTime<Utc>>,
    /// Any keyword found in the description (case-insensitive) matches.
    pub keywords: Vec<String>,
}

impl Default for MemoryQuery {
    fn default() -> Self {
        Self {
            min_salience: 0.0,
            min_identity_relevance: 0.0,
            limit: 100,
            sort_by: MemorySort::Salience,
            created_after: None,
            keywords: Vec::new(),
        }
    }
}

impl MemoryQuery {
    pub fn new(min_salience: f32, limit: usize) -> Self {
        Self {
            min_salience,
            limit,
            ..Self::default()
        }
    }

    pub fn sorted_by(mut self, sort_by: MemorySort) -> Self {
        self.sort_by = sort_by;
        self
    }

    pub fn min_identity_relevance(mut self, min: f32) -> Self {
        self.min_identity_relevance = min;
        self
    }

    pub fn created_after(mut self, after: DateTime<Utc>) -> Self {
        self.created_after = Some(after);
        self
    }

    /// Split `text` on whitespace into keywords.
    pub fn keywords(mut self, text: &str) -> Self {
        self.keywords = text.split_whitespace().map(str::to_string).collect();
        self
    }

    pub fn matches(&self, memory: &Memory) -> bool {
        if memory.emotional_salience < self.min_salience
            || memory.identity_relevance < self.min_identity_relevance
        {
            return false;
        }
        if let Some(after) = self.created_after {
            if memory.created_at < after {
                return false;
            }
        }
        if self.keywords.is_empty() {
            return true;
        }
        let description = memory.event.description.to_lowercase();
        self.keywords
            .iter()
            .any(|k| description.contains(&k.to_lowercase()))
    }

    /// Order `memories` in place according to `sort_by`. Ties break on id
    /// the same way the SQLite store does.
    pub fn sort(&self, memories: &mut [Memory]) {
        match self.sort_by {
            MemorySort::Salience => memories.sort_by(|a, b| {
                b.emotional_salience
                    .total_cmp(&a.emotional_salience)
                    .then(b.consolidation_level.total_cmp(&a.consolidation_level))
                    .then(a.id.cmp(&b.id))
            }),
            MemorySort::Recency => memories.sort_by(|a, b| {
                b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id))
            }),
            MemorySort::AccessCount => memories.sort_by(|a, b| {
                b.access_count
                    .cmp(&a.access_count)
                    .then(b.emotional_salience.total_cmp(&a.emotional_salience))
                    .then(a.id.cmp(&b.id))
            }),
        }
    }
}

// ============================================================================
// Contract
// ============================================================================

#[async_trait]
pub trait ConsciousnessStore: Send + Sync {
    async fn save_body_state(&self, state: &BodyState) -> Result<i64>;
    async fn latest_body_state(&self) -> Result<Option<BodyState>>;

    async fn save_emotion(&self, emotion: &Emotion) -> Result<i64>;
    async fn update_emotion(&self, emotion: &Emotion) -> Result<()>;
    /// Emotions not yet marked decayed, newest first.
    async fn active_emotions(&self) -> Result<Vec<Emotion>>;

    async fn save_feeling(&self, feeling: &Feeling) -> Result<i64>;

    async fn save_event(&self, event: &Event) -> Result<i64>;
    async fn get_event(&self, id: i64) -> Result<Option<Event>>;

    /// Saves the wrapped event first when it has no id yet.
    async fn save_memory(&self, memory: &Memory) -> Result<i64>;
    async fn update_memory(&self, memory: &Memory) -> Result<()>;
    async fn get_memory(&self, id: i64) -> Result<Option<Memory>>;
    async fn query_memories(&self, query: &MemoryQuery) -> Result<Vec<Memory>>;

    async fn save_somatic_marker(&self, marker: &SomaticMarker) -> Result<i64>;
    async fn update_somatic_marker(&self, marker: &SomaticMarker) -> Result<()>;
    /// Markers whose pattern contains `pattern` (case-insensitive), strongest first.
    async fn somatic_markers(
        &self,
        pattern: Option<&str>,
        min_strength: f32,
    ) -> Result<Vec<SomaticMarker>>;

    async fn decay_overrides(&self) -> Result<DecayTable>;
    async fn save_decay_config(&self, name: &str, config: DecayConfig) -> Result<()>;

    async fn identity_traits(&self) -> Result<BTreeMap<String, f32>>;
    async fn save_identity_trait(&self, name: &str, value: f32) -> Result<()>;

    /// Drop every record, leaving an empty store.
    async fn reset(&self) -> Result<()>;
}

// ============================================================================
// In-memory store
// ============================================================================

#[derive(Default)]
struct Tables {
    next_id: i64,
    body_states: Vec<BodyState>,
    emotions: BTreeMap<i64, Emotion>,
    feelings: BTreeMap<i64, Feeling>,
    events: BTreeMap<i64, Event>,
    memories: BTreeMap<i64, Memory>,
    markers: BTreeMap<i64, SomaticMarker>,
    decay: DecayTable,
    traits: BTreeMap<String, f32>,
}

impl Tables {
    fn allocate(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Process-local store for tests and ephemeral runs. Nothing survives a restart.
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of body states written so far.
    pub async fn body_state_count(&self) -> usize {
        self.tables.read().await.body_states.len()
    }

    /// Number of feelings written so far.
    pub async fn feeling_count(&self) -> usize {
        self.tables.read().await.feelings.len()
    }
}

fn require_id(id: Option<i64>, what: &str) -> Result<i64> {
    match id {
        Some(id) => Ok(id),
        None => bail!("Cannot update {} without an id", what),
    }
}

#[async_trait]
impl ConsciousnessStore for InMemoryStore {
    async fn save_body_state(&self, state: &BodyState) -> Result<i64> {
        let mut t = self.tables.write().await;
        let id = t.allocate();
        let mut state = state.clone();
        state.id = Some(id);
        t.body_states.push(state);
        Ok(id)
    }

    async fn latest_body_state(&self) -> Result<Option<BodyState>> {
        let t = self.tables.read().await;
        Ok(t.body_states.iter().max_by_key(|b| (b.timestamp, b.id)).cloned())
    }

    async fn save_emotion(&self, emotion: &Emotion) -> Result<i64> {
        let mut t = self.tables.write().await;
        let id = t.allocate();
        let mut emotion = emotion.clone();
        emotion.id = Some(id);
        t.emotions.insert(id, emotion);
        Ok(id)
    }

    async fn update_emotion(&self, emotion: &Emotion) -> Result<()> {
        let id = require_id(emotion.id, "emotion")?;
        let mut t = self.tables.write().await;
        match t.emotions.get_mut(&id) {
            Some(slot) => *slot = emotion.clone(),
            None => bail!("Emotion {} not found", id),
        }
        Ok(())
    }

    async fn active_emotions(&self) -> Result<Vec<Emotion>> {
        let t = self.tables.read().await;
        let mut active: Vec<Emotion> = t.emotions.values().filter(|e| !e.decayed).cloned().collect();
        active.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        Ok(active)
    }

    async fn save_feeling(&self, feeling: &Feeling) -> Result<i64> {
        let mut t = self.tables.write().await;
        let id = t.allocate();
        let mut feeling = feeling.clone();
        feeling.id = Some(id);
        t.feelings.insert(id, feeling);
        Ok(id)
    }

    async fn save_event(&self, event: &Event) -> Result<i64> {
        let mut t = self.tables.write().await;
        let id = t.allocate();
        let mut event = event.clone();
        event.id = Some(id);
        t.events.insert(id, event);
        Ok(id)
    }

    async fn get_event(&self, id: i64) -> Result<Option<Event>> {
        Ok(self.tables.read().await.events.get(&id).cloned())
    }

    async fn save_memory(&self, memory: &Memory) -> Result<i64> {
        let mut memory = memory.clone();
        if memory.event.id.is_none() {
            memory.event.id = Some(self.save_event(&memory.event).await?);
        }
        let mut t = self.tables.write().await;
        let id = t.allocate();
        memory.id = Some(id);
        t.memories.insert(id, memory);
        Ok(id)
    }

    async fn update_memory(&self, memory: &Memory) -> Result<()> {
        let id = require_id(memory.id, "memory")?;
        let mut t = self.tables.write().await;
        match t.memories.get_mut(&id) {
            Some(slot) => *slot = memory.clone(),
            None => bail!("Memory {} not found", id),
        }
        Ok(())
    }

    async fn get_memory(&self, id: i64) -> Result<Option<Memory>> {
        Ok(self.tables.read().await.memories.get(&id).cloned())
    }

    async fn query_memories(&self, query: &MemoryQuery) -> Result<Vec<Memory>> {
        let t = self.tables.read().await;
        let mut found: Vec<Memory> = t
            .memories
            .values()
            .filter(|m| query.matches(m))
            .cloned()
            .collect();
        query.sort(&mut found);
        found.truncate(query.limit);
        Ok(found)
    }

    async fn save_somatic_marker(&self, marker: &SomaticMarker) -> Result<i64> {
        let mut t = self.tables.write().await;
        let id = t.allocate();
        let mut marker = marker.clone();
        marker.id = Some(id);
        t.markers.insert(id, marker);
        Ok(id)
    }

    async fn update_somatic_marker(&self, marker: &SomaticMarker) -> Result<()> {
        let id = require_id(marker.id, "somatic marker")?;
        let mut t = self.tables.write().await;
        match t.markers.get_mut(&id) {
            Some(slot) => *slot = marker.clone(),
            None => bail!("Somatic marker {} not found", id),
        }
        Ok(())
    }

    async fn somatic_markers(
        &self,
        pattern: Option<&str>,
        min_strength: f32,
    ) -> Result<Vec<SomaticMarker>> {
        let t = self.tables.read().await;
        let mut found: Vec<SomaticMarker> = t
            .markers
            .values()
            .filter(|m| m.strength >= min_strength)
            .filter(|m| pattern.map_or(true, |p| m.matches(p)))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.strength.total_cmp(&a.strength));
        Ok(found)
    }

    async fn decay_overrides(&self) -> Result<DecayTable> {
        Ok(self.tables.read().await.decay.clone())
    }

    async fn save_decay_config(&self, name: &str, config: DecayConfig) -> Result<()> {
        self.tables.write().await.decay.set(name, config);
        Ok(())
    }

    async fn identity_traits(&self) -> Result<BTreeMap<String, f32>> {
        Ok(self.tables.read().await.traits.clone())
    }

    async fn save_identity_trait(&self, name: &str, value: f32) -> Result<()> {
        self.tables
            .write()
            .await
            .traits
            .insert(name.to_string(), value.clamp(0.0, 1.0));
        Ok(())
    }

    async fn reset(&self) -> Result<()> {
        *self.tables.write().await = Tables::default();
        Ok(())
    }
}
