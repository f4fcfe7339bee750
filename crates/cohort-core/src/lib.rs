//! cohort-core — Face identity-resolution engine.
//!
//! Data model for face embeddings and their payloads, batch clustering
//! (DBSCAN on cosine distance), clustering quality evaluation, and the
//! incremental nearest-neighbor resolver, all behind an embedding-store
//! seam so vector backends stay swappable.

pub mod clustering;
pub mod evaluator;
pub mod resolver;
pub mod store;
pub mod types;

pub use clustering::{ClusterOutcome, ClusterParams};
pub use evaluator::{ClusterMetrics, QualityBand};
pub use store::{DistanceMetric, EmbeddingStore, PayloadPatch, PointFilter, StoreError};
pub use types::{BoundingBox, ClusterConfidence, Embedding, FacePayload, FaceRecord};
