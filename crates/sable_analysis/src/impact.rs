//! Conversation → body mapping
//!
//! How talking moves the body: arousal lifts arousal and heart rate, valence
//! shifts mood and energy, strong emotion adds stress, and the conversation
//! itself costs a little energy (more when speaking than when listening).

use std::collections::HashMap;

use crate::classifier::AnalysisResult;

const SPEAKING_COST: f32 = 0.05;
const LISTENING_COST: f32 = 0.02;

/// Body parameter deltas for one analysed message.
pub fn conversation_impact(result: &AnalysisResult, as_speaker: bool) -> HashMap<String, f32> {
    let mut changes = HashMap::new();

    if result.arousal > 0.5 {
        changes.insert("arousal".to_string(), (result.arousal - 0.5) * 0.3);
        changes.insert("heart_rate".to_string(), (result.arousal - 0.5) * 0.2);
    }

    changes.insert("valence".to_string(), result.valence * 0.2);

    // Negative emotion drains less right away than positive emotion lifts
    let mut energy = if result.valence > 0.0 {
        result.valence * 0.1
    } else {
        result.valence * 0.05
    };

    let total = result.total_intensity();
    if total > 0.5 {
        changes.insert("stress".to_string(), (total - 0.5) * 0.2);
    }

    energy -= if as_speaker { SPEAKING_COST } else { LISTENING_COST };
    changes.insert("energy".to_string(), energy);
    changes
}
