//! Storage backends.
//!
//! [`structured`] is the primary, transactional store with secondary indexes.
//! [`flat`] is the key-value fallback and the durability backstop that is
//! written after every change, whatever the primary backend.

pub mod flat;
pub mod structured;

pub use flat::{FileStore, KeyValueStore, MemoryStore};
pub use structured::{StoreSource, StructuredStore};
