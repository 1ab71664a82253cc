//! Layered memory substrate: the structured journal (source of truth), the
//! vector store (semantic recall), the KV state store, and the dual-write
//! hub that keeps them consistent — journal-first, always.

mod embedding;
mod hub;
mod journal;
mod kv;
mod vector;

pub use embedding::{EmbedClient, fit_dimension, hash_embedding};
pub use hub::MemoryHub;
pub use journal::{ConversationRecord, Event, EventKind, EventStatus, Journal};
pub use kv::StateStore;
pub use vector::{MemoryHit, MemoryKind, VectorMemory};
