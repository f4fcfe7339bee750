use std::time::Duration;

/// Pipeline configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Vector collection name.
    pub collection: String,
    /// Embedding dimensionality the collection is provisioned with.
    pub embedding_dim: usize,
    /// Cosine similarity threshold τ for clustering and resolution.
    pub similarity_threshold: f32,
    /// Worker tasks processing images in parallel.
    pub workers: usize,
    /// Retries per external call (extraction, store write).
    pub max_retries: u32,
    /// Fixed delay between retry attempts.
    pub retry_delay_ms: u64,
    /// Per-unit timeout; a hung worker cannot stall the job.
    pub unit_timeout_secs: u64,
    /// Labeled neighbors fetched per incremental resolution.
    pub resolver_top_k: usize,
    /// Run the incremental resolver on each face right after persisting.
    pub resolve_on_ingest: bool,
    /// Base URL of the external detection/embedding service.
    pub extractor_url: String,
}

impl Config {
    /// Load configuration from `COHORT_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self {
            collection: std::env::var("COHORT_COLLECTION")
                .unwrap_or_else(|_| "face_embeddings".to_string()),
            embedding_dim: env_usize("COHORT_EMBEDDING_DIM", 512),
            similarity_threshold: env_f32("COHORT_SIMILARITY_THRESHOLD", 0.80),
            workers: env_usize("COHORT_WORKERS", 4),
            max_retries: env_u32("COHORT_MAX_RETRIES", 2),
            retry_delay_ms: env_u64("COHORT_RETRY_DELAY_MS", 250),
            unit_timeout_secs: env_u64("COHORT_UNIT_TIMEOUT_SECS", 120),
            resolver_top_k: env_usize("COHORT_RESOLVER_TOP_K", 10),
            resolve_on_ingest: std::env::var("COHORT_RESOLVE_ON_INGEST")
                .map(|v| v == "1")
                .unwrap_or(false),
            extractor_url: std::env::var("COHORT_EXTRACTOR_URL")
                .unwrap_or_else(|_| "http://localhost:8000".to_string()),
        }
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn unit_timeout(&self) -> Duration {
        Duration::from_secs(self.unit_timeout_secs)
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
