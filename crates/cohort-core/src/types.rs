use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current [`FacePayload`] schema version. Bump when tagged fields change.
pub const PAYLOAD_VERSION: u32 = 1;

/// Face embedding vector (typically 512-dimensional for ArcFace-family models).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "arcface_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            values,
            model_version: None,
        }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Compute cosine similarity between two embeddings.
    ///
    /// Returns a value in [-1, 1]. Higher = more similar.
    /// A zero-norm operand yields 0.0 rather than NaN.
    pub fn similarity(&self, other: &Embedding) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 { dot / denom } else { 0.0 }
    }

    /// Cosine dissimilarity: 1 − similarity, clipped to [0, ∞) to absorb
    /// floating-point residue on near-identical vectors.
    pub fn distance(&self, other: &Embedding) -> f32 {
        (1.0 - self.similarity(other)).max(0.0)
    }

    /// Return an L2-normalized copy. A zero vector is returned unchanged.
    pub fn l2_normalized(&self) -> Embedding {
        let norm: f32 = self.values.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            Embedding {
                values: self.values.iter().map(|x| x / norm).collect(),
                model_version: self.model_version.clone(),
            }
        } else {
            self.clone()
        }
    }
}

/// Bounding box for a detected face, in source-image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

/// How a person-id assignment was made for a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterConfidence {
    /// Newly minted person-id, no prior neighbor cleared the threshold.
    New,
    /// Adopted from a neighbor with score in [τ, 0.85].
    Medium,
    /// Adopted from a neighbor with score above 0.85.
    High,
}

/// Versioned point payload stored alongside each embedding.
///
/// Tagged fields cover everything the pipeline writes; `extra` is an open
/// extension map for fields this crate does not interpret.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacePayload {
    pub version: u32,
    /// Tenant/event partition key.
    pub group_id: String,
    /// Source-image reference (local path or bucket URI).
    pub image_path: String,
    /// Index of this face within its source image.
    pub face_index: usize,
    /// Detection confidence in [0, 1].
    pub detection_confidence: f32,
    pub facial_area: BoundingBox,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_path: Option<String>,
    /// Identity label; absent until a resolver or batch run assigns one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub person_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_confidence: Option<ClusterConfidence>,
    /// Similarity threshold τ in effect when `person_id` was assigned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_threshold: Option<f32>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl FacePayload {
    pub fn new(
        group_id: impl Into<String>,
        image_path: impl Into<String>,
        face_index: usize,
        detection_confidence: f32,
        facial_area: BoundingBox,
    ) -> Self {
        Self {
            version: PAYLOAD_VERSION,
            group_id: group_id.into(),
            image_path: image_path.into(),
            face_index,
            detection_confidence,
            facial_area,
            thumbnail_path: None,
            person_id: None,
            cluster_timestamp: None,
            cluster_confidence: None,
            cluster_threshold: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn is_labeled(&self) -> bool {
        self.person_id.is_some()
    }
}

/// A face embedding plus its payload, keyed by a collection-unique id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceRecord {
    pub id: Uuid,
    pub embedding: Embedding,
    pub payload: FacePayload,
}

impl FaceRecord {
    pub fn new(embedding: Embedding, payload: FacePayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            embedding,
            payload,
        }
    }
}
