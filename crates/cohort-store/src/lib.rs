//! cohort-store — Embedding-store backends.
//!
//! Ships the in-memory reference implementation of
//! [`cohort_core::EmbeddingStore`]. Durable backends (a remote vector
//! database) implement the same trait and drop in behind it.

pub mod memory;

pub use memory::InMemoryStore;
