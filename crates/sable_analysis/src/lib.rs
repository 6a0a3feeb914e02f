//! # Sable analysis
//!
//! Turns conversation text into emotional signals:
//!
//! - [`EmotionClassifier`]: text → emotion map, valence, arousal
//! - [`conversation_impact`]: analysis → body parameter deltas
//! - [`analyze_exchange`]: the last exchange of a conversation → resonant
//!   emotions, body changes and an optional memory

pub mod classifier;
pub mod conversation;
pub mod impact;

pub use classifier::{AnalysisResult, CommandClassifier, EmotionClassifier};
pub use conversation::{analyze_exchange, resonance, ExchangeAnalysis, HookInput, Message};
pub use impact::conversation_impact;
