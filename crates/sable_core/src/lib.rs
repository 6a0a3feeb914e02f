//! # Sable core
//!
//! Data model and pure dynamics for the three-layer state engine:
//!
//! - **Body** (proto-self): bounded physiological parameters that relax
//!   toward homeostatic baselines
//! - **Emotion** (core consciousness): typed emotion events and the feelings
//!   derived from them
//! - **Memory** (extended consciousness): events, autobiographical memories
//!   and somatic markers
//!
//! State is never ticked in the background. Every reader passes the elapsed
//! wall-clock time and receives a new value.

pub mod body;
pub mod config;
pub mod decay;
pub mod emotion;
pub mod error;
pub mod memory;
pub mod store;

pub use body::{BackgroundEmotion, BodyParam, BodySignature, BodyState};
pub use config::SableConfig;
pub use decay::{DecayConfig, DecayTable};
pub use emotion::{Emotion, EmotionCategory, EmotionType, Feeling, IntensityBand};
pub use error::ValidationError;
pub use memory::{Event, Memory, SomaticMarker};
pub use store::{ConsciousnessStore, InMemoryStore, MemoryQuery, MemorySort};
