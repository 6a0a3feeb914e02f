//! # Sable limbic layer (core consciousness)
//!
//! Fast, non-verbal emotional processing:
//!
//! - **Emotions**: triggered with a cause, carry a body signature, decay with
//!   negativity bias and leave the active set once faint
//! - **Feelings**: verbalized awareness derived from an emotion
//! - **Somatic markers**: learned situation → valence associations
//!
//! Based on Damasio's account of core consciousness and the somatic marker
//! hypothesis.

mod engine;
mod somatic;

pub use engine::{EmotionEngine, NEUTRAL_VALENCE_AROUSAL};
pub use somatic::{SomaticMarkerStore, DEFAULT_MIN_STRENGTH};
