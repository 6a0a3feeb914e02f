//! Conversation resonance
//!
//! Reads the most recent exchange of a conversation and decides how it
//! should move Sable: emotions the other speaker shows are answered with
//! resonant ones (fear is met with compassion, anger with curiosity), and
//! emotions Sable expresses itself are taken on directly. An exchange with
//! enough total feeling is worth remembering.

use sable_core::memory::truncate_chars;
use sable_core::EmotionType;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::classifier::EmotionClassifier;
use crate::impact::conversation_impact;

/// Other-speaker intensity that provokes a resonant response.
pub const RESONANCE_THRESHOLD: f32 = 0.4;
/// Intensity at which Sable's own expressed emotion is taken on.
pub const EXPRESSED_THRESHOLD: f32 = 0.3;
/// Intensity an emotion needs to actually be triggered.
pub const TRIGGER_THRESHOLD: f32 = 0.4;
/// Total intensity that makes an exchange memorable.
pub const MEMORABLE_THRESHOLD: f32 = 0.8;

pub const MEMORY_DESCRIPTION: &str = "Emotionally significant conversation exchange";
pub const MEMORY_ROLE: &str = "meaningful interaction";

/// Payload a conversation hook sends on stdin.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HookInput {
    #[serde(default)]
    pub conversation: Vec<Message>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    #[serde(default)]
    pub content: String,
}

impl Message {
    pub fn is_user(&self) -> bool {
        self.role == "user"
    }

    pub fn is_assistant(&self) -> bool {
        self.role == "assistant"
    }
}

/// Sable's resonant response to an emotion shown by someone else.
pub fn resonance(emotion: &str, intensity: f32) -> Option<(EmotionType, f32)> {
    if intensity <= RESONANCE_THRESHOLD {
        return None;
    }
    match emotion {
        "fear" | "sadness" => Some((EmotionType::Compassion, intensity * 0.6)),
        "anger" | "frustration" => Some((EmotionType::Curiosity, intensity * 0.5)),
        "joy" | "enthusiasm" => Some((EmotionType::Joy, intensity * 0.7)),
        "curiosity" => Some((EmotionType::Curiosity, intensity * 0.8)),
        _ => None,
    }
}

fn raise(map: &mut BTreeMap<String, f32>, name: &str, intensity: f32) {
    let slot = map.entry(name.to_string()).or_insert(0.0);
    *slot = slot.max(intensity);
}

/// What one exchange should do to the state.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExchangeAnalysis {
    /// Emotion name → strongest intensity seen, resonant or expressed.
    pub emotions: BTreeMap<String, f32>,
    /// Body deltas from each of Sable's own messages, in order.
    pub body_changes: Vec<HashMap<String, f32>>,
    /// Cause recorded on triggered emotions.
    pub cause: String,
    /// Condensed transcript of the exchange.
    pub summary: String,
}

impl ExchangeAnalysis {
    /// Emotions strong enough to trigger, with names that parse.
    pub fn triggered(&self) -> Vec<(EmotionType, f32)> {
        self.emotions
            .iter()
            .filter(|(_, v)| **v > TRIGGER_THRESHOLD)
            .filter_map(|(name, v)| match name.parse::<EmotionType>() {
                Ok(t) => Some((t, *v)),
                Err(_) => {
                    tracing::warn!("Skipping unknown emotion type '{}' from classifier", name);
                    None
                }
            })
            .collect()
    }

    pub fn total_intensity(&self) -> f32 {
        self.emotions.values().sum()
    }

    pub fn is_memorable(&self) -> bool {
        self.total_intensity() > MEMORABLE_THRESHOLD
    }
}

/// Analyse the last user/assistant pair of `conversation`.
pub async fn analyze_exchange(
    classifier: &dyn EmotionClassifier,
    conversation: &[Message],
) -> ExchangeAnalysis {
    let recent = &conversation[conversation.len().saturating_sub(2)..];
    let mut analysis = ExchangeAnalysis::default();

    for msg in recent.iter().filter(|m| m.is_user() && !m.content.is_empty()) {
        let result = classifier.analyze(&msg.content).await;
        for (name, intensity) in &result.emotions {
            if let Some((response, strength)) = resonance(name, *intensity) {
                raise(&mut analysis.emotions, response.as_str(), strength);
            }
        }
    }

    for msg in recent
        .iter()
        .filter(|m| m.is_assistant() && !m.content.is_empty())
    {
        let result = classifier.analyze(&msg.content).await;
        for (name, intensity) in &result.emotions {
            if *intensity > EXPRESSED_THRESHOLD {
                raise(&mut analysis.emotions, name, *intensity);
            }
        }
        analysis.body_changes.push(conversation_impact(&result, true));
    }

    analysis.cause = match recent.iter().find(|m| m.is_user()) {
        Some(user) => format!("Conversation: {}...", truncate_chars(&user.content, 50)),
        None => "Recent conversation exchange".to_string(),
    };
    let summary = recent
        .iter()
        .map(|m| truncate_chars(&m.content, 100))
        .collect::<Vec<_>>()
        .join(" | ");
    analysis.summary = truncate_chars(&summary, 500);
    analysis
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::AnalysisResult;
    use async_trait::async_trait;

    /// Answers from a fixed table keyed by the full text.
    struct TableClassifier(HashMap<&'static str, Vec<(&'static str, f32)>>);

    #[async_trait]
    impl EmotionClassifier for TableClassifier {
        async fn analyze(&self, text: &str) -> AnalysisResult {
            match self.0.get(text) {
                Some(emotions) => AnalysisResult {
                    text: text.to_string(),
                    emotions: emotions.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
                    valence: 0.3,
                    arousal: 0.7,
                    keywords: Vec::new(),
                },
                None => AnalysisResult::neutral(text, "unknown"),
            }
        }

        fn name(&self) -> &str {
            "table"
        }
    }

    fn msg(role: &str, content: &str) -> Message {
        Message {
            role: role.to_string(),
            content: content.to_string(),
        }
    }

    #[test]
    fn test_resonance_table() {
        let (t, v) = resonance("fear", 0.5).unwrap();
        assert_eq!(t, EmotionType::Compassion);
        assert!((v - 0.3).abs() < 1e-6);
        assert_eq!(resonance("frustration", 0.9).unwrap().0, EmotionType::Curiosity);
        assert_eq!(resonance("enthusiasm", 0.9).unwrap().0, EmotionType::Joy);
        assert!(resonance("fear", 0.4).is_none());
        assert!(resonance("disgust", 0.9).is_none());
    }

    #[tokio::test]
    async fn test_exchange_combines_resonance_and_expression() {
        let classifier = TableClassifier(HashMap::from([
            ("I'm scared about the surgery", vec![("fear", 0.9)]),
            ("That sounds frightening, I'm here", vec![("compassion", 0.8), ("unease", 0.2)]),
        ]));
        let conversation = vec![
            msg("user", "old message"),
            msg("user", "I'm scared about the surgery"),
            msg("assistant", "That sounds frightening, I'm here"),
        ];

        let a = analyze_exchange(&classifier, &conversation).await;
        // Resonant compassion 0.54 loses to the expressed 0.8
        assert_eq!(a.emotions.len(), 1);
        assert!((a.emotions["compassion"] - 0.8).abs() < 1e-6);
        assert_eq!(a.body_changes.len(), 1);
        assert_eq!(a.cause, "Conversation: I'm scared about the surgery...");
        assert_eq!(
            a.summary,
            "I'm scared about the surgery | That sounds frightening, I'm here"
        );
        assert_eq!(a.triggered(), vec![(EmotionType::Compassion, 0.8)]);
        assert!(!a.is_memorable());
    }

    #[tokio::test]
    async fn test_memorable_exchange_and_unknown_names() {
        let classifier = TableClassifier(HashMap::from([
            ("We did it!", vec![("joy", 1.0)]),
            ("This is wonderful", vec![("joy", 0.9), ("elation", 0.6)]),
        ]));
        let conversation = vec![msg("user", "We did it!"), msg("assistant", "This is wonderful")];

        let a = analyze_exchange(&classifier, &conversation).await;
        assert!(a.is_memorable());
        let triggered = a.triggered();
        assert_eq!(triggered.len(), 1);
        assert_eq!(triggered[0].0, EmotionType::Joy);
        assert!(a.emotions.contains_key("elation"));
    }

    #[tokio::test]
    async fn test_empty_conversation() {
        let classifier = TableClassifier(HashMap::new());
        let a = analyze_exchange(&classifier, &[]).await;
        assert!(a.emotions.is_empty());
        assert_eq!(a.cause, "Recent conversation exchange");
        assert!(a.summary.is_empty());
    }

    #[test]
    fn test_hook_input_parses() {
        let input: HookInput = serde_json::from_str(
            r#"{"session": {"id": "abc"}, "conversation": [{"role": "user", "content": "hi"}, {"role": "assistant"}]}"#,
        )
        .unwrap();
        assert_eq!(input.conversation.len(), 2);
        assert!(input.conversation[1].content.is_empty());
    }
}
