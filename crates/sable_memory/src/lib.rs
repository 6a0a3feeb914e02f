//! # Sable memory layer (extended consciousness)
//!
//! Autobiographical memory, the durable SQLite store and the coordinator that
//! ties body, emotions and memory together.

pub mod autobiography;
pub mod coordinator;
pub mod sqlite;

pub use autobiography::{ContextWindow, ContextualMemories, MemoryEngine, SIGNIFICANT_CACHE_SIZE};
pub use coordinator::{ConsciousnessSnapshot, EventOptions, EventOutcome, StateCoordinator};
pub use sqlite::SqliteStore;
