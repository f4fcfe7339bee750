//! Incremental identity resolver.
//!
//! Assigns a person-id to one newly persisted, unlabeled face via
//! nearest-neighbor lookup against already-labeled embeddings. This path
//! only ever grows or attaches clusters, never merges them — repeated
//! incremental assignment can drift from what a full batch run would
//! produce, and batch runs are authoritative: they overwrite these labels
//! wholesale.
//!
//! Minted ids are collision-free (`person_{group}_{uuid}`), so concurrent
//! minting cannot collide; callers must still serialize resolution against
//! batch runs over the same group, since both rewrite person-ids.

use chrono::Utc;
use uuid::Uuid;

use crate::store::{EmbeddingStore, PayloadPatch, PointFilter, StoreError};
use crate::types::{ClusterConfidence, FaceRecord};

/// Default number of labeled neighbors to consider.
pub const DEFAULT_TOP_K: usize = 10;

/// Adopted matches scoring above this are tagged high-confidence.
pub const HIGH_CONFIDENCE_SCORE: f32 = 0.85;

#[derive(Debug, Clone, Copy)]
pub struct ResolverParams {
    /// Minimum similarity τ to adopt a neighbor's person-id.
    pub threshold: f32,
    /// Neighbors fetched per lookup.
    pub top_k: usize,
    /// Restrict candidates to the record's own group.
    pub scope_to_group: bool,
}

impl ResolverParams {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            top_k: DEFAULT_TOP_K,
            scope_to_group: true,
        }
    }
}

/// Outcome of resolving one record.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub person_id: String,
    pub confidence: ClusterConfidence,
    /// Best-match score when the id was adopted from a neighbor.
    pub matched_score: Option<f32>,
}

impl Resolution {
    pub fn is_minted(&self) -> bool {
        self.confidence == ClusterConfidence::New
    }
}

/// Mint a fresh, collision-free person-id for `group`.
pub fn mint_person_id(group: &str) -> String {
    format!("person_{group}_{}", Uuid::new_v4())
}

/// Resolve `record` against the labeled points in `collection` and patch
/// its payload with the assignment.
///
/// The highest-similarity labeled candidate with score ≥ τ wins; its
/// person-id is adopted with confidence High above
/// [`HIGH_CONFIDENCE_SCORE`], else Medium. With no candidate clearing τ,
/// a new person-id is minted with confidence New.
pub async fn resolve(
    store: &dyn EmbeddingStore,
    collection: &str,
    record: &FaceRecord,
    params: &ResolverParams,
) -> Result<Resolution, StoreError> {
    let filter = PointFilter {
        group_id: params
            .scope_to_group
            .then(|| record.payload.group_id.clone()),
        labeled_only: true,
        exclude_id: Some(record.id),
    };

    let hits = store
        .search(collection, &record.embedding, &filter, params.top_k)
        .await?;

    // Hits are ranked by decreasing score; the first labeled hit clearing
    // τ is the best adoptable candidate.
    let adopted = hits.iter().find_map(|hit| {
        if hit.score < params.threshold {
            return None;
        }
        hit.payload
            .person_id
            .clone()
            .map(|person_id| (person_id, hit.score))
    });

    let resolution = match adopted {
        Some((person_id, score)) => {
            let confidence = if score > HIGH_CONFIDENCE_SCORE {
                ClusterConfidence::High
            } else {
                ClusterConfidence::Medium
            };
            tracing::debug!(
                face = %record.id,
                person = %person_id,
                score,
                "adopted person-id from nearest neighbor"
            );
            Resolution {
                person_id,
                confidence,
                matched_score: Some(score),
            }
        }
        None => {
            let person_id = mint_person_id(&record.payload.group_id);
            tracing::debug!(face = %record.id, person = %person_id, "minted new person-id");
            Resolution {
                person_id,
                confidence: ClusterConfidence::New,
                matched_score: None,
            }
        }
    };

    let patch = PayloadPatch {
        person_id: Some(resolution.person_id.clone()),
        cluster_timestamp: Some(Utc::now()),
        cluster_confidence: Some(resolution.confidence),
        cluster_threshold: Some(params.threshold),
    };
    store
        .patch_payload(collection, &[record.id], &patch)
        .await?;

    Ok(resolution)
}
