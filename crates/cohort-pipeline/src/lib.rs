//! Ingestion and clustering pipeline: job orchestration, worker pool,
//! retries, resumability, and the external-collaborator seams (image
//! source, face extractor, thumbnailer).

pub mod cluster_run;
pub mod config;
pub mod error;
pub mod extract;
pub mod jobs;
pub mod orchestrator;
pub mod resume;
pub mod retry;
pub mod source;

pub use cluster_run::{run_cluster_job, ClusterRunParams};
pub use config::Config;
pub use error::{SetupError, Stage, UnitError};
pub use extract::{DetectedFace, ExtractError, FaceExtractor, RemoteExtractor, Thumbnailer};
pub use jobs::{
    ClusterJob, ImageOutcome, IngestionJob, InMemoryJobStore, JobId, JobStatus, JobStore,
    ThumbnailFailure, UnitStatus,
};
pub use orchestrator::{IngestParams, Orchestrator};
pub use resume::{ResumeError, ResumeLog};
pub use retry::RetryPolicy;
pub use source::{DirSource, ImageSource, SourceError, StaticSource};
