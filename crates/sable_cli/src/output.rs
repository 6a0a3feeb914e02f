//! Rendering for the four output formats.
//!
//! `text` is for people at a terminal, `markdown` and `brief` are meant to be
//! pasted into a prompt by session hooks, `json` is for scripts.

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::ValueEnum;
use sable_analysis::AnalysisResult;
use sable_core::{Memory, SomaticMarker};
use sable_memory::{ConsciousnessSnapshot, ContextualMemories};
use serde_json::json;
use std::fmt::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Format {
    #[default]
    #[value(alias = "rich")]
    Text,
    Markdown,
    Brief,
    Json,
}

/// `some_trait` → `Some Trait`.
pub fn title_case(s: &str) -> String {
    s.split(|c: char| c == '_' || c.is_whitespace())
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

fn emotions_or_none(names: &[String], max: usize) -> String {
    if names.is_empty() {
        "none".to_string()
    } else {
        names.iter().take(max).cloned().collect::<Vec<_>>().join(", ")
    }
}

fn clip(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

// ============================================================================
// Status
// ============================================================================

pub fn status(s: &ConsciousnessSnapshot, format: Format) -> Result<String> {
    let b = &s.body;
    let mut out = String::new();
    match format {
        Format::Json => {
            let active: Vec<_> = s
                .active_emotions
                .iter()
                .map(|e| {
                    json!({
                        "id": e.id,
                        "type": e.emotion_type,
                        "intensity": e.intensity,
                        "valence": e.valence,
                        "arousal": e.arousal,
                        "cause": e.cause,
                        "timestamp": e.timestamp.to_rfc3339(),
                    })
                })
                .collect();
            let value = json!({
                "proto_self": {
                    "energy": b.energy,
                    "stress": b.stress,
                    "arousal": b.arousal,
                    "valence": b.valence,
                    "temperature": b.temperature,
                    "tension": b.tension,
                    "fatigue": b.fatigue,
                    "pain": b.pain,
                    "hunger": b.hunger,
                    "heart_rate": b.heart_rate,
                    "background_emotion": s.background_emotion,
                    "homeostatic_pressure": s.homeostatic_pressure,
                },
                "core_consciousness": {
                    "active_emotions": active,
                    "emotional_state": s.emotional_state,
                    "overall_valence": s.overall_valence,
                    "overall_arousal": s.overall_arousal,
                },
                "extended_consciousness": {
                    "identity_traits": s.identity_traits,
                    "core_values": s.core_values,
                    "num_significant_memories": s.significant_memories,
                    "num_somatic_markers": s.somatic_markers,
                },
                "timestamp": s.timestamp.to_rfc3339(),
            });
            out = serde_json::to_string_pretty(&value)?;
        }
        Format::Brief => {
            write!(
                out,
                "Sable's State: {} | Energy: {:.2} | Valence: {:+.2} | Arousal: {:.2}",
                title_case(s.background_emotion.as_str()),
                b.energy,
                s.overall_valence,
                s.overall_arousal
            )?;
            if !s.active_emotions.is_empty() {
                let list: Vec<String> = s
                    .active_emotions
                    .iter()
                    .take(3)
                    .map(|e| format!("{}({:.1})", e.emotion_type, e.intensity))
                    .collect();
                write!(out, "\nActive emotions: {}", list.join(", "))?;
            }
        }
        Format::Markdown => {
            writeln!(out, "## Sable's Current Consciousness State\n")?;
            writeln!(out, "### Proto-Self (Body State)")?;
            writeln!(
                out,
                "- **Energy**: {:.2} | **Arousal**: {:.2} | **Valence**: {:+.2}",
                b.energy, b.arousal, b.valence
            )?;
            writeln!(
                out,
                "- **Tension**: {:.2} | **Fatigue**: {:.2} | **Stress**: {:.2}",
                b.tension, b.fatigue, b.stress
            )?;
            writeln!(
                out,
                "- **Background emotion**: {}",
                title_case(s.background_emotion.as_str())
            )?;
            writeln!(out, "- **Homeostatic pressure**: {:.2}\n", s.homeostatic_pressure)?;

            if !s.active_emotions.is_empty() {
                writeln!(out, "### Core Consciousness (Active Emotions)")?;
                for e in &s.active_emotions {
                    writeln!(
                        out,
                        "- **{}** ({:.2}) - \"{}\"",
                        title_case(e.emotion_type.as_str()),
                        e.intensity,
                        e.cause
                    )?;
                }
                writeln!(out)?;
            }
            writeln!(
                out,
                "**Overall valence**: {:+.2} | **Overall arousal**: {:.2}\n",
                s.overall_valence, s.overall_arousal
            )?;

            writeln!(out, "### Extended Consciousness")?;
            if !s.identity_traits.is_empty() {
                let traits: Vec<String> = s
                    .identity_traits
                    .iter()
                    .map(|(k, v)| format!("{} ({:.2})", title_case(k), v))
                    .collect();
                writeln!(out, "- **Identity traits**: {}", traits.join(", "))?;
            }
            if !s.core_values.is_empty() {
                writeln!(out, "- **Core values**: {}", s.core_values.join(", "))?;
            }
            write!(out, "- **Significant memories**: {}", s.significant_memories)?;
        }
        Format::Text => {
            writeln!(out, "Sable's Consciousness State\n")?;
            writeln!(out, "Proto-Self (Body State)")?;
            for (name, value) in b.values() {
                writeln!(out, "  {:<22}{:.2}", title_case(name), value)?;
            }
            writeln!(out, "  {:<22}{}", "Background Emotion", s.background_emotion)?;
            writeln!(out, "  {:<22}{:.2}\n", "Homeostatic Pressure", s.homeostatic_pressure)?;

            if !s.active_emotions.is_empty() {
                writeln!(out, "Core Consciousness (Active Emotions)")?;
                for e in &s.active_emotions {
                    writeln!(
                        out,
                        "  {:<16}{:<10.2}{}",
                        e.emotion_type.as_str(),
                        e.intensity,
                        clip(&e.cause, 50)
                    )?;
                }
                writeln!(out)?;
            }
            writeln!(out, "Overall Valence: {:+.2}", s.overall_valence)?;
            writeln!(out, "Overall Arousal: {:.2}\n", s.overall_arousal)?;

            let traits = if s.identity_traits.is_empty() {
                "none".to_string()
            } else {
                s.identity_traits
                    .iter()
                    .map(|(k, v)| format!("{}: {:.2}", k, v))
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            writeln!(out, "Extended Consciousness")?;
            writeln!(out, "  Significant Memories: {}", s.significant_memories)?;
            writeln!(out, "  Somatic Markers: {}", s.somatic_markers)?;
            write!(out, "  Identity Traits: {}", traits)?;
            if !s.core_values.is_empty() {
                write!(out, "\n  Core Values: {}", s.core_values.join(", "))?;
            }
        }
    }
    Ok(out)
}

// ============================================================================
// Memories
// ============================================================================

fn memory_json(m: &Memory) -> serde_json::Value {
    json!({
        "id": m.id,
        "description": m.event.description,
        "context": m.event.context,
        "emotional_salience": m.emotional_salience,
        "consolidation_level": m.consolidation_level,
        "associated_emotions": m.associated_emotions,
        "narrative_role": m.narrative_role,
        "identity_relevance": m.identity_relevance,
        "access_count": m.access_count,
        "logbook_path": m.logbook_path,
        "timestamp": m.created_at.to_rfc3339(),
    })
}

const NO_MEMORIES: &str = "No memories found matching criteria";

pub fn memories(list: &[Memory], format: Format) -> Result<String> {
    if list.is_empty() {
        return Ok(match format {
            Format::Json => json!({"memories": [], "count": 0}).to_string(),
            _ => NO_MEMORIES.to_string(),
        });
    }

    let mut out = String::new();
    match format {
        Format::Json => {
            let value = json!({
                "count": list.len(),
                "memories": list.iter().map(memory_json).collect::<Vec<_>>(),
            });
            out = serde_json::to_string_pretty(&value)?;
        }
        Format::Brief => {
            write!(out, "Found {} memories:", list.len())?;
            for (i, m) in list.iter().enumerate() {
                write!(
                    out,
                    "\n{}. {}... | Salience: {:.2} | Emotions: {}",
                    i + 1,
                    clip(&m.event.description, 60),
                    m.emotional_salience,
                    emotions_or_none(&m.associated_emotions, usize::MAX)
                )?;
            }
        }
        Format::Markdown => {
            writeln!(out, "## Sable's Memories ({} found)", list.len())?;
            for (i, m) in list.iter().enumerate() {
                let role = m
                    .narrative_role
                    .as_deref()
                    .map(|r| format!(" - *{}*", r))
                    .unwrap_or_default();
                writeln!(out, "\n### Memory #{}{}", i + 1, role)?;
                writeln!(out, "{}\n", m.event.description)?;
                writeln!(
                    out,
                    "- **Salience**: {:.2} | **Consolidation**: {:.2}",
                    m.emotional_salience, m.consolidation_level
                )?;
                writeln!(
                    out,
                    "- **Emotions**: {}",
                    emotions_or_none(&m.associated_emotions, usize::MAX)
                )?;
                write!(out, "- **Times accessed**: {}", m.access_count)?;
                if let Some(path) = &m.logbook_path {
                    write!(out, "\n- **Extended entry**: `{}`", path)?;
                }
                writeln!(out)?;
            }
            out = out.trim_end().to_string();
        }
        Format::Text => {
            writeln!(out, "Found {} memories", list.len())?;
            for (i, m) in list.iter().enumerate() {
                let role = m
                    .narrative_role
                    .as_deref()
                    .map(|r| format!(" - {}", r))
                    .unwrap_or_default();
                let id = m.id.map(|id| format!(" [id {}]", id)).unwrap_or_default();
                writeln!(out, "\nMemory #{}{}{}", i + 1, role, id)?;
                writeln!(out, "  {}", m.event.description)?;
                writeln!(
                    out,
                    "  Salience: {:.2} | Consolidation: {:.2}",
                    m.emotional_salience, m.consolidation_level
                )?;
                writeln!(
                    out,
                    "  Emotions: {}",
                    emotions_or_none(&m.associated_emotions, usize::MAX)
                )?;
                write!(out, "  Times accessed: {}", m.access_count)?;
                if let Some(path) = &m.logbook_path {
                    write!(out, "\n  Logbook: {}", path)?;
                }
                writeln!(out)?;
            }
            out = out.trim_end().to_string();
        }
    }
    Ok(out)
}

/// Contextual retrieval. Markdown keeps the recent and defining sections
/// apart; every other format renders the combined list.
pub fn contextual(
    ctx: &ContextualMemories,
    recent_days: i64,
    format: Format,
    now: DateTime<Utc>,
) -> Result<String> {
    if format != Format::Markdown || ctx.is_empty() {
        return memories(&ctx.clone().into_vec(), format);
    }

    let mut out = String::new();
    writeln!(out, "## Sable's Memories (Recent Context + Defining Moments)")?;
    if !ctx.recent.is_empty() {
        writeln!(
            out,
            "\n### Recent Context ({} memories, last {} days)",
            ctx.recent.len(),
            recent_days
        )?;
        for (i, m) in ctx.recent.iter().enumerate() {
            let days = (now - m.created_at).num_days();
            let when = if days <= 0 {
                "today".to_string()
            } else {
                format!("{}d ago", days)
            };
            writeln!(out, "{}. [{}] {}...", i + 1, when, clip(&m.event.description, 80))?;
            writeln!(
                out,
                "   *Salience: {:.2} | Emotions: {}*",
                m.emotional_salience,
                emotions_or_none(&m.associated_emotions, 3)
            )?;
        }
    }
    if !ctx.salient.is_empty() {
        writeln!(out, "\n### Defining Memories ({} memories)", ctx.salient.len())?;
        for (i, m) in ctx.salient.iter().enumerate() {
            let role = m
                .narrative_role
                .as_deref()
                .map(|r| format!(" - *{}*", r))
                .unwrap_or_default();
            writeln!(out, "{}. {}...{}", i + 1, clip(&m.event.description, 80), role)?;
            writeln!(
                out,
                "   *Salience: {:.2} | Emotions: {}*",
                m.emotional_salience,
                emotions_or_none(&m.associated_emotions, 3)
            )?;
        }
    }
    Ok(out.trim_end().to_string())
}

// ============================================================================
// Analysis & markers
// ============================================================================

pub fn analysis(r: &AnalysisResult, format: Format) -> Result<String> {
    let mut out = String::new();
    match format {
        Format::Json => out = serde_json::to_string_pretty(r)?,
        Format::Brief => {
            let emotions = if r.emotions.is_empty() {
                "none".to_string()
            } else {
                r.emotions
                    .iter()
                    .map(|(k, v)| format!("{}({:.1})", k, v))
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            write!(
                out,
                "Emotions: {} | Valence: {:+.2} | Arousal: {:.2}",
                emotions, r.valence, r.arousal
            )?;
        }
        Format::Markdown => {
            writeln!(out, "## Emotion Analysis\n")?;
            writeln!(out, "**Text**: {}\n", r.text)?;
            if r.emotions.is_empty() {
                writeln!(out, "*No emotions detected*\n")?;
            } else {
                writeln!(out, "### Detected Emotions")?;
                for (k, v) in &r.emotions {
                    writeln!(out, "- **{}**: {:.2}", title_case(k), v)?;
                }
                writeln!(out)?;
            }
            write!(out, "**Valence**: {:+.2} | **Arousal**: {:.2}", r.valence, r.arousal)?;
            if !r.keywords.is_empty() {
                write!(out, "\n\n**Keywords**: {}", r.keywords.join(", "))?;
            }
        }
        Format::Text => {
            writeln!(out, "Emotion Analysis\n")?;
            writeln!(out, "Text: {}\n", r.text)?;
            if r.emotions.is_empty() {
                writeln!(out, "No emotions detected")?;
            } else {
                writeln!(out, "Detected Emotions")?;
                for (k, v) in &r.emotions {
                    writeln!(out, "  {:<16}{:.2}", k, v)?;
                }
            }
            writeln!(out, "\nValence: {:+.2}", r.valence)?;
            write!(out, "Arousal: {:.2}", r.arousal)?;
            if !r.keywords.is_empty() {
                write!(out, "\nKeywords: {}", r.keywords.join(", "))?;
            }
        }
    }
    Ok(out)
}

pub fn marker(m: Option<&SomaticMarker>, format: Format) -> Result<String> {
    let Some(m) = m else {
        return Ok(match format {
            Format::Json => "null".to_string(),
            _ => "No somatic marker for this situation".to_string(),
        });
    };
    let feeling = if m.valence >= 0.0 { "good" } else { "bad" };
    Ok(match format {
        Format::Json => serde_json::to_string_pretty(m)?,
        Format::Brief => format!(
            "Gut feeling: {} ({}, valence {:+.2}, strength {:.2})",
            feeling, m.emotion_type, m.valence, m.strength
        ),
        Format::Markdown => format!(
            "### Somatic Marker\n- **Pattern**: {}\n- **Emotion**: {} | **Valence**: {:+.2} | **Strength**: {:.2}\n- **Reinforced**: {} times",
            m.situation_pattern,
            title_case(m.emotion_type.as_str()),
            m.valence,
            m.strength,
            m.reinforcement_count
        ),
        Format::Text => format!(
            "Somatic marker #{}\n  Pattern: {}\n  Emotion: {}\n  Valence: {:+.2}\n  Strength: {:.2}\n  Reinforced: {} times\n  Gut feeling: {}",
            m.id.unwrap_or_default(),
            m.situation_pattern,
            m.emotion_type,
            m.valence,
            m.strength,
            m.reinforcement_count,
            feeling
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sable_core::{Emotion, EmotionType, Event};
    use std::collections::BTreeMap;

    fn memory(desc: &str, emotions: &[(&str, f32)]) -> Memory {
        let impact: BTreeMap<String, f32> =
            emotions.iter().map(|(k, v)| (k.to_string(), *v)).collect();
        Memory::encode(Event::new(desc, None, impact), None, 0.5).unwrap()
    }

    fn snapshot() -> ConsciousnessSnapshot {
        let body = sable_core::BodyState::default();
        let mut fear = Emotion::new(EmotionType::Fear, 0.9, "a snake");
        fear.id = Some(1);
        ConsciousnessSnapshot {
            homeostatic_pressure: body.homeostatic_pressure(),
            background_emotion: body.background_emotion(),
            body,
            active_emotions: vec![fear],
            emotional_state: BTreeMap::from([(EmotionType::Fear, 0.9)]),
            overall_valence: -0.8,
            overall_arousal: 0.9,
            identity_traits: BTreeMap::from([("intellectual_curiosity".to_string(), 0.8)]),
            core_values: vec!["honesty".to_string(), "care".to_string()],
            significant_memories: 2,
            somatic_markers: 1,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("intellectual_curiosity"), "Intellectual Curiosity");
        assert_eq!(title_case("joy"), "Joy");
        assert_eq!(title_case(""), "");
    }

    #[test]
    fn test_status_formats() {
        let s = snapshot();
        let brief = status(&s, Format::Brief).unwrap();
        assert!(brief.contains("Valence: -0.80"));
        assert!(brief.contains("Active emotions: fear(0.9)"));

        let md = status(&s, Format::Markdown).unwrap();
        assert!(md.starts_with("## Sable's Current Consciousness State"));
        assert!(md.contains("- **Fear** (0.90) - \"a snake\""));
        assert!(md.contains("Intellectual Curiosity (0.80)"));
        assert!(md.contains("- **Core values**: honesty, care"));

        let value: serde_json::Value =
            serde_json::from_str(&status(&s, Format::Json).unwrap()).unwrap();
        assert_eq!(value["core_consciousness"]["active_emotions"][0]["type"], "fear");
        assert_eq!(value["extended_consciousness"]["num_significant_memories"], 2);
        assert_eq!(value["extended_consciousness"]["core_values"][1], "care");

        let text = status(&s, Format::Text).unwrap();
        assert!(text.contains("Somatic Markers: 1"));
        assert!(text.ends_with("Core Values: honesty, care"));
    }

    #[test]
    fn test_memories_formats() {
        assert_eq!(memories(&[], Format::Brief).unwrap(), NO_MEMORIES);
        assert_eq!(
            memories(&[], Format::Json).unwrap(),
            r#"{"count":0,"memories":[]}"#
        );

        let mut m = memory("Saw the northern lights", &[("joy", 0.9), ("surprise", 0.6)]);
        m.logbook_path = Some("logbook/x.md".to_string());
        let list = vec![m];

        let brief = memories(&list, Format::Brief).unwrap();
        assert!(brief.starts_with("Found 1 memories:"));
        assert!(brief.contains("Emotions: joy, surprise"));

        let md = memories(&list, Format::Markdown).unwrap();
        assert!(md.contains("### Memory #1"));
        assert!(md.contains("- **Extended entry**: `logbook/x.md`"));

        let value: serde_json::Value =
            serde_json::from_str(&memories(&list, Format::Json).unwrap()).unwrap();
        assert_eq!(value["count"], 1);
        assert_eq!(value["memories"][0]["logbook_path"], "logbook/x.md");
    }

    #[test]
    fn test_contextual_markdown_sections() {
        let ctx = ContextualMemories {
            recent: vec![memory("Fixed the flaky test", &[("joy", 0.5)])],
            salient: vec![memory("First day on the job", &[("anticipation", 0.9)])],
        };
        let md = contextual(&ctx, 7, Format::Markdown, Utc::now()).unwrap();
        assert!(md.contains("### Recent Context (1 memories, last 7 days)"));
        assert!(md.contains("1. [today] Fixed the flaky test..."));
        assert!(md.contains("### Defining Memories (1 memories)"));

        let brief = contextual(&ctx, 7, Format::Brief, Utc::now()).unwrap();
        assert!(brief.starts_with("Found 2 memories:"));
    }

    #[test]
    fn test_analysis_and_marker() {
        let r = AnalysisResult {
            text: "I can't wait".to_string(),
            emotions: BTreeMap::from([("anticipation".to_string(), 0.8)]),
            valence: 0.6,
            arousal: 0.7,
            keywords: vec!["excited".to_string()],
        };
        assert_eq!(
            analysis(&r, Format::Brief).unwrap(),
            "Emotions: anticipation(0.8) | Valence: +0.60 | Arousal: 0.70"
        );
        assert!(analysis(&r, Format::Markdown)
            .unwrap()
            .contains("- **Anticipation**: 0.80"));

        assert_eq!(marker(None, Format::Json).unwrap(), "null");
        let m = SomaticMarker::new("dark alley", EmotionType::Fear, -0.8, 0.7, None);
        assert!(marker(Some(&m), Format::Brief).unwrap().starts_with("Gut feeling: bad"));
    }
}
