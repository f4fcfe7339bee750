//! Embedding-store seam.
//!
//! The clustering engine and the resolver only ever talk to the vector
//! database through [`EmbeddingStore`], so backends can be swapped without
//! touching identity-resolution logic. `cohort-store` ships the in-memory
//! reference implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::types::{ClusterConfidence, Embedding, FacePayload, FaceRecord};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("collection not found: {0}")]
    CollectionNotFound(String),
    #[error("dimension mismatch: collection expects {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    /// Retry-eligible: timeouts, connection resets, overloaded backend.
    #[error("transient store error: {0}")]
    Transient(String),
    #[error("store error: {0}")]
    Other(String),
}

/// Distance metric a collection is provisioned with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceMetric {
    Cosine,
}

/// Server-side filter applied to enumeration and nearest-neighbor queries.
#[derive(Debug, Clone, Default)]
pub struct PointFilter {
    /// Restrict to one tenant/event partition.
    pub group_id: Option<String>,
    /// Only points that already carry a person-id.
    pub labeled_only: bool,
    /// Exclude a single point, typically the query record itself.
    pub exclude_id: Option<Uuid>,
}

impl PointFilter {
    pub fn group(group_id: impl Into<String>) -> Self {
        Self {
            group_id: Some(group_id.into()),
            ..Self::default()
        }
    }

    pub fn matches(&self, id: Uuid, payload: &FacePayload) -> bool {
        if let Some(group) = &self.group_id {
            if payload.group_id != *group {
                return false;
            }
        }
        if self.labeled_only && !payload.is_labeled() {
            return false;
        }
        if self.exclude_id == Some(id) {
            return false;
        }
        true
    }
}

/// One nearest-neighbor hit. Scores are cosine similarity, ranked
/// monotonically decreasing.
#[derive(Debug, Clone)]
pub struct ScoredPoint {
    pub id: Uuid,
    pub score: f32,
    pub payload: FacePayload,
}

/// One page of an enumeration. `next` is `None` on the final page; any
/// other value is an opaque cursor that stays stable across pages.
#[derive(Debug, Clone)]
pub struct PointPage {
    pub points: Vec<FaceRecord>,
    pub next: Option<u64>,
}

/// Partial payload update. Only `Some` fields are written; the vector and
/// all other payload fields are untouched.
#[derive(Debug, Clone, Default)]
pub struct PayloadPatch {
    pub person_id: Option<String>,
    pub cluster_timestamp: Option<DateTime<Utc>>,
    pub cluster_confidence: Option<ClusterConfidence>,
    pub cluster_threshold: Option<f32>,
}

impl PayloadPatch {
    pub fn apply(&self, payload: &mut FacePayload) {
        if let Some(person_id) = &self.person_id {
            payload.person_id = Some(person_id.clone());
        }
        if let Some(ts) = self.cluster_timestamp {
            payload.cluster_timestamp = Some(ts);
        }
        if let Some(confidence) = self.cluster_confidence {
            payload.cluster_confidence = Some(confidence);
        }
        if let Some(threshold) = self.cluster_threshold {
            payload.cluster_threshold = Some(threshold);
        }
    }
}

/// Durable vector collection with point-level payload.
#[async_trait]
pub trait EmbeddingStore: Send + Sync {
    /// Create `name` with the given dimensionality and metric if absent.
    /// Idempotent: an existing, matching collection is not an error.
    async fn ensure_collection(
        &self,
        name: &str,
        dim: usize,
        metric: DistanceMetric,
    ) -> Result<(), StoreError>;

    /// Insert or replace points by id.
    async fn upsert(&self, collection: &str, records: Vec<FaceRecord>) -> Result<(), StoreError>;

    /// Cursor-paged enumeration of points matching `filter`.
    async fn enumerate(
        &self,
        collection: &str,
        filter: &PointFilter,
        cursor: Option<u64>,
        limit: usize,
    ) -> Result<PointPage, StoreError>;

    /// Top-`limit` nearest neighbors of `query` under the collection
    /// metric, ranked by decreasing score.
    async fn search(
        &self,
        collection: &str,
        query: &Embedding,
        filter: &PointFilter,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, StoreError>;

    /// Apply `patch` to every point in `ids`. Returns how many points were
    /// updated; unknown ids are skipped, not errors.
    async fn patch_payload(
        &self,
        collection: &str,
        ids: &[Uuid],
        patch: &PayloadPatch,
    ) -> Result<usize, StoreError>;

    /// Number of points matching `filter`.
    async fn count(&self, collection: &str, filter: &PointFilter) -> Result<usize, StoreError>;
}

/// Drain every page of an enumeration into memory.
///
/// Batch clustering is O(n²) anyway, so materializing the scope is not the
/// bottleneck; callers bound scope per group instead.
pub async fn enumerate_all(
    store: &dyn EmbeddingStore,
    collection: &str,
    filter: &PointFilter,
    page_size: usize,
) -> Result<Vec<FaceRecord>, StoreError> {
    let mut records = Vec::new();
    let mut cursor = None;
    loop {
        let page = store
            .enumerate(collection, filter, cursor, page_size)
            .await?;
        records.extend(page.points);
        match page.next {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }
    Ok(records)
}
