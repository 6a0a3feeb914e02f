//! Conversation hook: fold the latest exchange into the state.

use anyhow::Result;
use sable_analysis::conversation::{MEMORY_DESCRIPTION, MEMORY_ROLE};
use sable_analysis::{analyze_exchange, EmotionClassifier, HookInput};
use sable_core::EmotionType;
use sable_memory::{EventOptions, StateCoordinator};
use serde::Serialize;

/// What one hook run changed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HookReport {
    pub body_updates: usize,
    pub emotions: Vec<(EmotionType, f32)>,
    pub memory_id: Option<i64>,
}

/// Body changes first, then emotions (without feelings, the conversation
/// itself is the verbalization), then a memory if the exchange was strong
/// enough. Recording the memory triggers its emotions again, this time felt
/// and caused by the memory.
pub async fn process_exchange(
    coordinator: &mut StateCoordinator,
    classifier: &dyn EmotionClassifier,
    input: &HookInput,
) -> Result<HookReport> {
    let mut report = HookReport::default();
    if input.conversation.is_empty() {
        return Ok(report);
    }

    let analysis = analyze_exchange(classifier, &input.conversation).await;

    for changes in &analysis.body_changes {
        coordinator.apply_body_changes(changes).await?;
        report.body_updates += 1;
    }

    for (emotion_type, intensity) in analysis.triggered() {
        coordinator
            .add_emotion(emotion_type, intensity, &analysis.cause, false)
            .await?;
        report.emotions.push((emotion_type, intensity));
    }

    if analysis.is_memorable() {
        let outcome = coordinator
            .add_event(
                MEMORY_DESCRIPTION,
                Some(analysis.summary.clone()),
                analysis.emotions.clone(),
                EventOptions {
                    narrative_role: Some(MEMORY_ROLE.to_string()),
                    ..EventOptions::default()
                },
            )
            .await?;
        report.memory_id = outcome.memory.and_then(|m| m.id);
    }

    tracing::debug!(
        "Hook applied {} body updates, {} emotions",
        report.body_updates,
        report.emotions.len()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sable_analysis::{AnalysisResult, Message};
    use sable_core::{ConsciousnessStore, DecayTable, InMemoryStore};
    use std::collections::BTreeMap;
    use std::sync::Arc;

    /// Reports the same emotions for every text.
    struct Fixed(Vec<(&'static str, f32)>);

    #[async_trait]
    impl EmotionClassifier for Fixed {
        async fn analyze(&self, text: &str) -> AnalysisResult {
            AnalysisResult {
                text: text.to_string(),
                emotions: self.0.iter().map(|(k, v)| (k.to_string(), *v)).collect::<BTreeMap<_, _>>(),
                valence: 0.6,
                arousal: 0.8,
                keywords: Vec::new(),
            }
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    fn exchange() -> HookInput {
        HookInput {
            conversation: vec![
                Message {
                    role: "user".to_string(),
                    content: "We shipped the release!".to_string(),
                },
                Message {
                    role: "assistant".to_string(),
                    content: "That is wonderful news".to_string(),
                },
            ],
        }
    }

    async fn coordinator() -> (StateCoordinator, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let coord = StateCoordinator::open(store.clone(), DecayTable::new())
            .await
            .unwrap();
        (coord, store)
    }

    #[tokio::test]
    async fn test_memorable_exchange() {
        let (mut coord, store) = coordinator().await;
        let report = process_exchange(&mut coord, &Fixed(vec![("joy", 0.9)]), &exchange())
            .await
            .unwrap();

        assert_eq!(report.body_updates, 1);
        assert_eq!(report.emotions, vec![(EmotionType::Joy, 0.9)]);
        let id = report.memory_id.unwrap();

        let memory = store.get_memory(id).await.unwrap().unwrap();
        assert_eq!(memory.event.description, MEMORY_DESCRIPTION);
        assert_eq!(memory.narrative_role.as_deref(), Some(MEMORY_ROLE));
        assert_eq!(
            memory.event.context.as_deref(),
            Some("We shipped the release! | That is wonderful news")
        );
        // The direct trigger plus a felt one from the memory
        let active = store.active_emotions().await.unwrap();
        assert_eq!(active.len(), 2);
        assert!(active.iter().all(|e| e.emotion_type == EmotionType::Joy));
        assert!(active.iter().any(|e| e.cause == MEMORY_DESCRIPTION));
        assert_eq!(store.feeling_count().await, 1);
    }

    #[tokio::test]
    async fn test_memory_triggers_mildly_expressed_emotions() {
        let (mut coord, store) = coordinator().await;
        let report = process_exchange(
            &mut coord,
            &Fixed(vec![("joy", 0.9), ("curiosity", 0.35)]),
            &exchange(),
        )
        .await
        .unwrap();

        // Too mild to trigger directly, but part of the remembered impact
        assert_eq!(report.emotions, vec![(EmotionType::Joy, 0.9)]);
        assert!(report.memory_id.is_some());
        let curious: Vec<_> = store
            .active_emotions()
            .await
            .unwrap()
            .into_iter()
            .filter(|e| e.emotion_type == EmotionType::Curiosity)
            .collect();
        assert_eq!(curious.len(), 1);
        assert_eq!(curious[0].cause, MEMORY_DESCRIPTION);
        assert!((curious[0].intensity - 0.35).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_mild_exchange_is_not_remembered() {
        let (mut coord, store) = coordinator().await;
        let report = process_exchange(&mut coord, &Fixed(vec![("curiosity", 0.35)]), &exchange())
            .await
            .unwrap();
        assert!(report.emotions.is_empty());
        assert!(report.memory_id.is_none());
        assert!(store.active_emotions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_conversation_is_a_no_op() {
        let (mut coord, store) = coordinator().await;
        let before = store.body_state_count().await;
        let report = process_exchange(&mut coord, &Fixed(vec![("joy", 1.0)]), &HookInput::default())
            .await
            .unwrap();
        assert_eq!(report.body_updates, 0);
        assert_eq!(store.body_state_count().await, before);
    }
}
