//! In-memory embedding store.
//!
//! Full-scan cosine ranking and index-based cursor pagination. Intended
//! for tests and single-process batch runs; the trait contract (ranking
//! order, cursor stability, patch semantics) is the same one a remote
//! backend must honor.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use cohort_core::store::{
    DistanceMetric, EmbeddingStore, PayloadPatch, PointFilter, PointPage, ScoredPoint, StoreError,
};
use cohort_core::types::{Embedding, FaceRecord};

struct Collection {
    dim: usize,
    points: Vec<FaceRecord>,
    index: HashMap<Uuid, usize>,
}

impl Collection {
    fn new(dim: usize) -> Self {
        Self {
            dim,
            points: Vec::new(),
            index: HashMap::new(),
        }
    }
}

/// Vector collections held behind a process-local lock.
#[derive(Default)]
pub struct InMemoryStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EmbeddingStore for InMemoryStore {
    async fn ensure_collection(
        &self,
        name: &str,
        dim: usize,
        _metric: DistanceMetric,
    ) -> Result<(), StoreError> {
        let mut collections = self.collections.write().await;
        match collections.get(name) {
            Some(existing) if existing.dim != dim => Err(StoreError::DimensionMismatch {
                expected: existing.dim,
                got: dim,
            }),
            Some(_) => Ok(()),
            None => {
                tracing::info!(collection = name, dim, "created collection");
                collections.insert(name.to_string(), Collection::new(dim));
                Ok(())
            }
        }
    }

    async fn upsert(&self, collection: &str, records: Vec<FaceRecord>) -> Result<(), StoreError> {
        let mut collections = self.collections.write().await;
        let coll = collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?;

        for record in records {
            if record.embedding.dim() != coll.dim {
                return Err(StoreError::DimensionMismatch {
                    expected: coll.dim,
                    got: record.embedding.dim(),
                });
            }
            match coll.index.get(&record.id) {
                Some(&pos) => coll.points[pos] = record,
                None => {
                    coll.index.insert(record.id, coll.points.len());
                    coll.points.push(record);
                }
            }
        }
        Ok(())
    }

    async fn enumerate(
        &self,
        collection: &str,
        filter: &PointFilter,
        cursor: Option<u64>,
        limit: usize,
    ) -> Result<PointPage, StoreError> {
        let collections = self.collections.read().await;
        let coll = collections
            .get(collection)
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?;

        // Cursor is an index into the underlying point vector, which only
        // ever grows; pages stay stable across interleaved upserts.
        let start = cursor.unwrap_or(0) as usize;
        let mut points = Vec::new();
        let mut pos = start;
        while pos < coll.points.len() && points.len() < limit {
            let record = &coll.points[pos];
            if filter.matches(record.id, &record.payload) {
                points.push(record.clone());
            }
            pos += 1;
        }

        let next = (pos < coll.points.len()).then_some(pos as u64);
        Ok(PointPage { points, next })
    }

    async fn search(
        &self,
        collection: &str,
        query: &Embedding,
        filter: &PointFilter,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, StoreError> {
        let collections = self.collections.read().await;
        let coll = collections
            .get(collection)
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?;

        let mut hits: Vec<ScoredPoint> = coll
            .points
            .iter()
            .filter(|record| filter.matches(record.id, &record.payload))
            .map(|record| ScoredPoint {
                id: record.id,
                score: query.similarity(&record.embedding),
                payload: record.payload.clone(),
            })
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn patch_payload(
        &self,
        collection: &str,
        ids: &[Uuid],
        patch: &PayloadPatch,
    ) -> Result<usize, StoreError> {
        let mut collections = self.collections.write().await;
        let coll = collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?;

        let mut updated = 0;
        for id in ids {
            if let Some(&pos) = coll.index.get(id) {
                patch.apply(&mut coll.points[pos].payload);
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn count(&self, collection: &str, filter: &PointFilter) -> Result<usize, StoreError> {
        let collections = self.collections.read().await;
        let coll = collections
            .get(collection)
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?;

        Ok(coll
            .points
            .iter()
            .filter(|record| filter.matches(record.id, &record.payload))
            .count())
    }
}
