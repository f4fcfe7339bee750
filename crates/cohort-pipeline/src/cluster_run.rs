//! Batch clustering runner.
//!
//! Loads every embedding in scope, clusters with density-based grouping at
//! the configured threshold, then writes person ids back in one pass per
//! cluster. Each run is a full re-label of its scope: previously assigned
//! person ids inside the scope are overwritten, so the latest run is the
//! sole authority for its scope.

use chrono::Utc;
use uuid::Uuid;

use cohort_core::clustering::{self, ClusterParams};
use cohort_core::evaluator;
use cohort_core::store::{enumerate_all, PayloadPatch, PointFilter};
use cohort_core::types::{ClusterConfidence, Embedding};
use cohort_core::EmbeddingStore;

use crate::jobs::{new_job_id, ClusterJob, JobId, JobStatus, JobStore};

const DEFAULT_PAGE_SIZE: usize = 1000;

#[derive(Debug, Clone)]
pub struct ClusterRunParams {
    /// Scope to one group, or the whole collection when `None`.
    pub group_id: Option<String>,
    pub collection: String,
    pub threshold: f32,
    pub min_cluster_size: usize,
    pub page_size: usize,
}

impl ClusterRunParams {
    pub fn new(collection: impl Into<String>, group_id: Option<String>, threshold: f32) -> Self {
        Self {
            group_id,
            collection: collection.into(),
            threshold,
            min_cluster_size: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Run one batch clustering job to completion and return its id. Progress
/// and results land in the registry.
pub async fn run_cluster_job(
    store: &dyn EmbeddingStore,
    registry: &dyn JobStore<ClusterJob>,
    params: ClusterRunParams,
) -> JobId {
    let job_id = new_job_id("cluster");
    let mut job = ClusterJob::new(
        job_id.clone(),
        params.group_id.clone(),
        &params.collection,
        params.threshold,
    );
    job.status = JobStatus::Processing;
    registry.insert(job_id.clone(), job).await;

    let filter = PointFilter {
        group_id: params.group_id.clone(),
        ..Default::default()
    };
    let records = match enumerate_all(store, &params.collection, &filter, params.page_size).await {
        Ok(records) => records,
        Err(err) => {
            tracing::error!(job = %job_id, error = %err, "scope enumeration failed");
            let message = err.to_string();
            registry
                .update(&job_id, Box::new(move |job| job.fail(message)))
                .await;
            return job_id;
        }
    };

    if records.is_empty() {
        tracing::info!(job = %job_id, "no faces in scope, nothing to cluster");
        registry
            .update(
                &job_id,
                Box::new(|job| {
                    job.status = JobStatus::Completed;
                    job.finished_at = Some(Utc::now());
                }),
            )
            .await;
        return job_id;
    }

    let embeddings: Vec<Embedding> = records.iter().map(|r| r.embedding.clone()).collect();
    let cluster_params = ClusterParams {
        threshold: params.threshold,
        min_cluster_size: params.min_cluster_size,
    };
    let outcome = clustering::cluster(&embeddings, &cluster_params);
    let metrics = evaluator::evaluate(&embeddings, &outcome.labels);
    tracing::info!(
        job = %job_id,
        faces = records.len(),
        clusters = outcome.num_clusters(),
        silhouette = metrics.silhouette_score,
        "clustering computed, writing labels"
    );

    // Dense per-run labels; a re-run relabels its whole scope, so earlier
    // assignments (batch or incremental) are fully superseded.
    let scope = params.group_id.as_deref().unwrap_or("all");
    let timestamp = Utc::now();
    let mut updated = 0usize;
    for (label, members) in &outcome.clusters {
        let person_id = format!("person_{scope}_{}", label + 1);
        let ids: Vec<Uuid> = members.iter().map(|&i| records[i].id).collect();
        let patch = PayloadPatch {
            person_id: Some(person_id.clone()),
            cluster_timestamp: Some(timestamp),
            cluster_confidence: Some(ClusterConfidence::High),
            cluster_threshold: Some(params.threshold),
        };
        match store.patch_payload(&params.collection, &ids, &patch).await {
            Ok(n) => updated += n,
            Err(err) => {
                tracing::warn!(
                    job = %job_id,
                    person = %person_id,
                    error = %err,
                    "label write failed for cluster"
                );
            }
        }
    }

    let total_faces = records.len();
    let clusters_found = outcome.num_clusters();
    registry
        .update(
            &job_id,
            Box::new(move |job| {
                job.total_faces = total_faces;
                job.clusters_found = clusters_found;
                job.faces_updated = updated;
                job.metrics = Some(metrics);
                job.status = JobStatus::Completed;
                job.finished_at = Some(Utc::now());
            }),
        )
        .await;
    job_id
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::BTreeSet;

    use cohort_core::store::DistanceMetric;
    use cohort_core::types::{BoundingBox, FacePayload, FaceRecord};
    use cohort_store::InMemoryStore;

    use crate::jobs::InMemoryJobStore;

    fn unit_at(deg: f32) -> Embedding {
        let rad = deg.to_radians();
        Embedding::new(vec![rad.cos(), rad.sin()])
    }

    fn record(group: &str, path: &str, deg: f32) -> FaceRecord {
        let payload = FacePayload::new(
            group,
            path,
            0,
            0.9,
            BoundingBox {
                x: 0,
                y: 0,
                w: 10,
                h: 10,
            },
        );
        FaceRecord::new(unit_at(deg), payload)
    }

    async fn seeded_store() -> InMemoryStore {
        let store = InMemoryStore::new();
        store
            .ensure_collection("faces", 2, DistanceMetric::Cosine)
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_two_bundles_become_two_persons() {
        let store = seeded_store().await;
        // Two tight bundles, ~90° apart. τ = 0.8 → eps = 0.2 ≈ 36.9°.
        let records = vec![
            record("g", "a.jpg", 0.0),
            record("g", "b.jpg", 5.0),
            record("g", "c.jpg", 10.0),
            record("g", "d.jpg", 90.0),
            record("g", "e.jpg", 95.0),
        ];
        store.upsert("faces", records).await.unwrap();

        let registry = InMemoryJobStore::new();
        let job_id = run_cluster_job(
            &store,
            &registry,
            ClusterRunParams::new("faces", Some("g".to_string()), 0.8),
        )
        .await;

        let job = registry.get(&job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.total_faces, 5);
        assert_eq!(job.clusters_found, 2);
        assert_eq!(job.faces_updated, 5);
        let metrics = job.metrics.unwrap();
        assert_eq!(metrics.total_persons, 2);
        assert_eq!(metrics.max_faces_per_person, 3);

        let labeled = enumerate_all(
            &store,
            "faces",
            &PointFilter {
                labeled_only: true,
                ..Default::default()
            },
            100,
        )
        .await
        .unwrap();
        assert_eq!(labeled.len(), 5);
        let persons: BTreeSet<String> = labeled
            .iter()
            .filter_map(|r| r.payload.person_id.clone())
            .collect();
        assert_eq!(persons.len(), 2);
        for person in &persons {
            assert!(person.starts_with("person_g_"), "got {person}");
        }
        // Every labeled face carries the run's threshold and timestamp.
        for r in &labeled {
            assert_eq!(r.payload.cluster_threshold, Some(0.8));
            assert!(r.payload.cluster_timestamp.is_some());
        }
    }

    #[tokio::test]
    async fn test_empty_scope_completes_with_zeroes() {
        let store = seeded_store().await;
        let registry = InMemoryJobStore::new();
        let job_id = run_cluster_job(
            &store,
            &registry,
            ClusterRunParams::new("faces", Some("nobody".to_string()), 0.8),
        )
        .await;

        let job = registry.get(&job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.total_faces, 0);
        assert_eq!(job.clusters_found, 0);
        assert!(job.metrics.is_none());
        assert!(job.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_run_supersedes_previous_labels() {
        let store = seeded_store().await;
        let records = vec![record("g", "a.jpg", 0.0), record("g", "b.jpg", 3.0)];
        let ids: Vec<Uuid> = records.iter().map(|r| r.id).collect();
        store.upsert("faces", records).await.unwrap();

        // Pre-existing labels, e.g. from incremental resolution.
        let stale = PayloadPatch {
            person_id: Some("person_g_f3a91c2e".to_string()),
            ..Default::default()
        };
        store.patch_payload("faces", &ids, &stale).await.unwrap();

        let registry = InMemoryJobStore::new();
        run_cluster_job(
            &store,
            &registry,
            ClusterRunParams::new("faces", Some("g".to_string()), 0.8),
        )
        .await;

        let persons: BTreeSet<String> = enumerate_all(&store, "faces", &PointFilter::default(), 100)
            .await
            .unwrap()
            .iter()
            .filter_map(|r| r.payload.person_id.clone())
            .collect();
        // The run is authoritative for its scope: old labels are gone.
        assert_eq!(persons.len(), 1);
        assert!(persons.contains("person_g_1"));
    }

    #[tokio::test]
    async fn test_scope_leaves_other_groups_untouched() {
        let store = seeded_store().await;
        store
            .upsert(
                "faces",
                vec![record("g1", "a.jpg", 0.0), record("g2", "z.jpg", 40.0)],
            )
            .await
            .unwrap();

        let registry = InMemoryJobStore::new();
        run_cluster_job(
            &store,
            &registry,
            ClusterRunParams::new("faces", Some("g1".to_string()), 0.8),
        )
        .await;

        let all = enumerate_all(&store, "faces", &PointFilter::default(), 100)
            .await
            .unwrap();
        for r in &all {
            if r.payload.group_id == "g1" {
                assert!(r.payload.is_labeled());
            } else {
                assert!(!r.payload.is_labeled());
            }
        }
    }

    #[tokio::test]
    async fn test_missing_collection_fails_job() {
        let store = InMemoryStore::new();
        let registry = InMemoryJobStore::new();
        let job_id = run_cluster_job(
            &store,
            &registry,
            ClusterRunParams::new("ghost", None, 0.8),
        )
        .await;

        let job = registry.get(&job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.is_some());
    }
}
