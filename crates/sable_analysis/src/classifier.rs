use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use sable_core::config::ClassifierConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::process::Command;

const SYSTEM_PROMPT: &str = r#"You analyse the emotional content of text using Damasio's account of emotion.

Emotion types you may report:
- primary: fear, anger, sadness, joy, disgust, surprise
- background: contentment, malaise, unease, tension, enthusiasm, discouragement
- social: shame, guilt, pride, admiration, contempt, compassion
- complex: desire, curiosity, anticipation, frustration

Report every emotion present with an intensity between 0.0 and 1.0, the overall
valence (-1.0 very negative to 1.0 very positive) and arousal (0.0 calm to 1.0
highly activated). Account for implicit tone, negation ("not afraid"), sarcasm
and intensity modifiers ("a bit nervous" vs "terrified").

Reply with a single JSON object and nothing else:
{"emotions": {"fear": 0.7, "curiosity": 0.5}, "valence": -0.3, "arousal": 0.7, "reasoning": "one sentence"}"#;

/// Emotional reading of one piece of text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub text: String,
    /// Emotion name → intensity in `[0, 1]`. Names are not validated here.
    pub emotions: BTreeMap<String, f32>,
    pub valence: f32,
    pub arousal: f32,
    pub keywords: Vec<String>,
}

impl AnalysisResult {
    /// Neutral reading used whenever classification fails.
    pub fn neutral(text: &str, reason: &str) -> Self {
        Self {
            text: text.to_string(),
            emotions: BTreeMap::new(),
            valence: 0.0,
            arousal: 0.5,
            keywords: vec![format!("[Fallback: {}]", reason)],
        }
    }

    pub fn is_neutral(&self) -> bool {
        self.emotions.is_empty() && self.valence == 0.0 && self.arousal == 0.5
    }

    /// Sum of all reported intensities.
    pub fn total_intensity(&self) -> f32 {
        self.emotions.values().sum()
    }
}

#[async_trait]
pub trait EmotionClassifier: Send + Sync {
    /// Never fails: any problem yields [`AnalysisResult::neutral`].
    async fn analyze(&self, text: &str) -> AnalysisResult;

    fn name(&self) -> &str;
}

#[derive(Deserialize)]
struct RawAnalysis {
    #[serde(default)]
    emotions: BTreeMap<String, f32>,
    valence: Option<f32>,
    arousal: Option<f32>,
    #[serde(default)]
    reasoning: String,
}

fn clamp_or(value: Option<f32>, fallback: f32, min: f32, max: f32) -> f32 {
    match value {
        Some(v) if v.is_finite() => v.clamp(min, max),
        _ => fallback,
    }
}

/// Parse the JSON object between the first `{` and the last `}` of `output`.
pub fn parse_response(text: &str, output: &str) -> Result<AnalysisResult> {
    let (Some(start), Some(end)) = (output.find('{'), output.rfind('}')) else {
        bail!("No JSON found in response");
    };
    if end < start {
        bail!("No JSON found in response");
    }
    let raw: RawAnalysis =
        serde_json::from_str(&output[start..=end]).context("Failed to parse classifier JSON")?;

    let emotions = raw
        .emotions
        .into_iter()
        .filter(|(_, v)| v.is_finite())
        .map(|(name, v)| (name.trim().to_lowercase(), v.clamp(0.0, 1.0)))
        .collect();
    let reasoning = raw.reasoning.trim();
    Ok(AnalysisResult {
        text: text.to_string(),
        emotions,
        valence: clamp_or(raw.valence, 0.0, -1.0, 1.0),
        arousal: clamp_or(raw.arousal, 0.5, 0.0, 1.0),
        keywords: if reasoning.is_empty() {
            Vec::new()
        } else {
            vec![reasoning.to_string()]
        },
    })
}

/// Classifier backed by an external command that prints a JSON analysis.
pub struct CommandClassifier {
    command: String,
    args: Vec<String>,
    model: String,
    timeout: Duration,
}

impl CommandClassifier {
    pub fn new(config: &ClassifierConfig) -> Self {
        Self {
            command: config.command.clone(),
            args: config.args.clone(),
            model: config.model.clone(),
            timeout: Duration::from_secs(config.timeout_secs.max(1)),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn run(&self, text: &str) -> Result<String> {
        let prompt = format!(
            "Analyse the emotional content of this text:\n\n\"{}\"\n\nReturn the JSON analysis.",
            text
        );
        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args).arg("--system-prompt").arg(SYSTEM_PROMPT);
        if !self.model.is_empty() {
            cmd.arg("--model").arg(&self.model);
        }
        cmd.arg(prompt).kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(res) => res.with_context(|| format!("Failed to run classifier '{}'", self.command))?,
            Err(_) => bail!("Classifier timed out after {:?}", self.timeout),
        };

        if !output.status.success() {
            bail!(
                "Classifier failed with status {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl EmotionClassifier for CommandClassifier {
    async fn analyze(&self, text: &str) -> AnalysisResult {
        let result = match self.run(text).await {
            Ok(stdout) => parse_response(text, stdout.trim()),
            Err(e) => Err(e),
        };
        match result {
            Ok(analysis) => analysis,
            Err(e) => {
                tracing::warn!("Emotion classification fell back to neutral: {:#}", e);
                AnalysisResult::neutral(text, &format!("{:#}", e))
            }
        }
    }

    fn name(&self) -> &str {
        &self.command
    }
}
