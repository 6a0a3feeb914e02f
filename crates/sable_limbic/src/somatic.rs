//! Somatic marker store
//!
//! Damasio's "gut feelings": learned associations between a situation
//! pattern and the valence it tends to bring. Markers are formed from highly
//! salient memories and only change strength through reinforcement.
//!
//! Matching is case-insensitive substring containment on the stored pattern,
//! performed by the durable store.

use anyhow::{Context, Result};
use sable_core::{ConsciousnessStore, EmotionType, SomaticMarker};
use std::sync::Arc;

/// Minimum strength used when looking up a gut feeling without an explicit bound.
pub const DEFAULT_MIN_STRENGTH: f32 = 0.3;

/// Write-through cache of somatic markers over the durable store.
pub struct SomaticMarkerStore {
    store: Arc<dyn ConsciousnessStore>,
    cache: Vec<SomaticMarker>,
}

impl SomaticMarkerStore {
    pub fn new(store: Arc<dyn ConsciousnessStore>) -> Self {
        Self {
            store,
            cache: Vec::new(),
        }
    }

    /// Load every marker from the store into the cache.
    pub async fn load(&mut self) -> Result<()> {
        self.cache = self
            .store
            .somatic_markers(None, 0.0)
            .await
            .context("Failed to load somatic markers")?;
        tracing::debug!("Loaded {} somatic markers", self.cache.len());
        Ok(())
    }

    pub fn markers(&self) -> &[SomaticMarker] {
        &self.cache
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn get(&self, id: i64) -> Option<&SomaticMarker> {
        self.cache.iter().find(|m| m.id == Some(id))
    }

    /// Strongest marker whose pattern contains `situation`.
    pub async fn for_situation(
        &self,
        situation: &str,
        min_strength: f32,
    ) -> Result<Option<SomaticMarker>> {
        let found = self
            .store
            .somatic_markers(Some(situation), min_strength)
            .await
            .context("Failed to query somatic markers")?;
        Ok(found.into_iter().next())
    }

    /// Form a new marker and persist it.
    pub async fn create(
        &mut self,
        situation_pattern: &str,
        emotion_type: EmotionType,
        valence: f32,
        strength: f32,
        origin_memory_id: Option<i64>,
    ) -> Result<SomaticMarker> {
        let mut marker = SomaticMarker::new(
            situation_pattern,
            emotion_type,
            valence,
            strength,
            origin_memory_id,
        );
        marker.id = Some(
            self.store
                .save_somatic_marker(&marker)
                .await
                .context("Failed to save somatic marker")?,
        );
        tracing::debug!(
            "Formed somatic marker '{}' ({}, strength {:.2})",
            marker.situation_pattern,
            marker.emotion_type,
            marker.strength
        );
        self.cache.push(marker.clone());
        Ok(marker)
    }

    /// Apply the reinforcement rule to `marker` and persist the result.
    pub async fn reinforce(&mut self, marker: &mut SomaticMarker, outcome_valence: f32) -> Result<()> {
        marker.reinforce(outcome_valence);
        self.persist(marker).await
    }

    /// Reinforce a cached marker by id. `None` if no such marker.
    pub async fn reinforce_by_id(
        &mut self,
        id: i64,
        outcome_valence: f32,
    ) -> Result<Option<SomaticMarker>> {
        let Some(mut marker) = self.get(id).cloned() else {
            return Ok(None);
        };
        self.reinforce(&mut marker, outcome_valence).await?;
        Ok(Some(marker))
    }

    /// Fire `marker`, persisting its activation time. Returns the scaled signal.
    pub async fn activate(&mut self, marker: &mut SomaticMarker, multiplier: f32) -> Result<f32> {
        let signal = marker.activate(multiplier);
        self.persist(marker).await?;
        Ok(signal)
    }

    async fn persist(&mut self, marker: &SomaticMarker) -> Result<()> {
        self.store
            .update_somatic_marker(marker)
            .await
            .context("Failed to update somatic marker")?;
        match self.cache.iter_mut().find(|m| m.id == marker.id) {
            Some(slot) => *slot = marker.clone(),
            None => self.cache.push(marker.clone()),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sable_core::InMemoryStore;

    fn new_store() -> SomaticMarkerStore {
        SomaticMarkerStore::new(Arc::new(InMemoryStore::new()))
    }

    #[tokio::test]
    async fn test_create_and_lookup() {
        let mut markers = new_store();
        markers
            .create("Giving a talk to strangers", EmotionType::Fear, -0.7, 0.8, Some(1))
            .await
            .unwrap();
        markers
            .create("talk with an old friend", EmotionType::Joy, 0.8, 0.9, None)
            .await
            .unwrap();

        let best = markers.for_situation("talk", 0.3).await.unwrap().unwrap();
        assert_eq!(best.emotion_type, EmotionType::Joy);

        let only = markers.for_situation("strangers", 0.3).await.unwrap().unwrap();
        assert_eq!(only.origin_memory_id, Some(1));
        assert!(markers.for_situation("talk", 0.95).await.unwrap().is_none());
        assert_eq!(markers.len(), 2);
    }

    #[tokio::test]
    async fn test_reinforce_persists() {
        let store = Arc::new(InMemoryStore::new());
        let mut markers = SomaticMarkerStore::new(store.clone());
        let marker = markers
            .create("dark alley", EmotionType::Fear, -0.7, 0.5, None)
            .await
            .unwrap();
        let id = marker.id.unwrap();

        let updated = markers.reinforce_by_id(id, -0.7).await.unwrap().unwrap();
        assert!((updated.strength - 0.55).abs() < 1e-6);
        assert_eq!(updated.reinforcement_count, 2);

        let updated = markers.reinforce_by_id(id, 1.0).await.unwrap().unwrap();
        assert!((updated.strength - 0.45).abs() < 1e-6);

        let mut reloaded = SomaticMarkerStore::new(store);
        reloaded.load().await.unwrap();
        assert!((reloaded.get(id).unwrap().strength - 0.45).abs() < 1e-6);
        assert!(markers.reinforce_by_id(999, 0.0).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_activate_stamps_time() {
        let mut markers = new_store();
        let mut marker = markers
            .create("rain on the window", EmotionType::Contentment, 0.6, 0.6, None)
            .await
            .unwrap();
        let signal = markers.activate(&mut marker, 0.5).await.unwrap();
        assert!((signal - 0.3).abs() < 1e-6);
        assert!(markers.markers()[0].last_activated.is_some());
    }
}
