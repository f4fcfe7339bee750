//! Face detection/embedding seam and the remote model-service client.
//!
//! The model is an external collaborator: given an image it returns zero
//! or more regions with bounding box, detection confidence, and an
//! embedding. It may fail non-deterministically on malformed input, so
//! every call site treats it as fallible and retry-able. The model is
//! also assumed unsafe for concurrent invocation; the orchestrator
//! serializes calls behind a single-flight gate.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use cohort_core::types::{BoundingBox, Embedding};

#[derive(Error, Debug)]
pub enum ExtractError {
    /// The input could not be decoded as an image; retrying won't help.
    #[error("unreadable image: {0}")]
    Unreadable(String),
    /// Transient model-service failure; retry-eligible.
    #[error("model service error: {0}")]
    Service(String),
}

/// One detected face. `embedding` is `None` when detection succeeded but
/// embedding extraction failed for this region.
#[derive(Debug, Clone)]
pub struct DetectedFace {
    pub facial_area: BoundingBox,
    pub confidence: f32,
    pub embedding: Option<Embedding>,
}

#[async_trait]
pub trait FaceExtractor: Send + Sync {
    /// Detect faces in `image` and extract their embeddings.
    /// An image with no faces is Ok(vec![]), not an error.
    async fn extract(&self, image: &[u8]) -> Result<Vec<DetectedFace>, ExtractError>;
}

/// Optional thumbnail generation/upload. Failures are recorded on the job
/// and logged, never escalated to an image failure.
#[async_trait]
pub trait Thumbnailer: Send + Sync {
    /// Produce and store a thumbnail for `path`, returning its reference.
    async fn thumbnail(&self, path: &str, image: &[u8]) -> Result<String, String>;
}

#[derive(Debug, Deserialize)]
struct WireFacialArea {
    x: u32,
    y: u32,
    w: u32,
    h: u32,
}

#[derive(Debug, Deserialize)]
struct WireFace {
    facial_area: WireFacialArea,
    #[serde(default = "default_confidence")]
    confidence: f32,
    #[serde(default)]
    embedding: Option<Vec<f32>>,
}

fn default_confidence() -> f32 {
    1.0
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    faces: Vec<WireFace>,
}

/// HTTP client for the external detection/embedding service.
///
/// Posts the image as multipart to `{base_url}/get-embedding` and decodes
/// the face list. 4xx means the input itself was rejected; everything
/// else (5xx, transport) is transient.
pub struct RemoteExtractor {
    client: reqwest::Client,
    base_url: String,
}

impl RemoteExtractor {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl FaceExtractor for RemoteExtractor {
    async fn extract(&self, image: &[u8]) -> Result<Vec<DetectedFace>, ExtractError> {
        let part = reqwest::multipart::Part::bytes(image.to_vec()).file_name("image");
        let form = reqwest::multipart::Form::new().part("image", part);

        let response = self
            .client
            .post(format!("{}/get-embedding", self.base_url))
            .multipart(form)
            .send()
            .await
            .map_err(|e| ExtractError::Service(e.to_string()))?;

        let status = response.status();
        if status.is_client_error() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ExtractError::Unreadable(format!("{status}: {detail}")));
        }
        if !status.is_success() {
            return Err(ExtractError::Service(format!("status {status}")));
        }

        let wire: WireResponse = response
            .json()
            .await
            .map_err(|e| ExtractError::Service(format!("bad response body: {e}")))?;

        Ok(wire
            .faces
            .into_iter()
            .map(|face| DetectedFace {
                facial_area: BoundingBox {
                    x: face.facial_area.x,
                    y: face.facial_area.y,
                    w: face.facial_area.w,
                    h: face.facial_area.h,
                },
                confidence: face.confidence,
                embedding: face.embedding.map(Embedding::new),
            })
            .collect())
    }
}
