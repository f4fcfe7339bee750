//! Ingestion orchestrator.
//!
//! Drives one digest job: provision the collection, enumerate the source,
//! skip units the resume log already has, then fan the remainder out to a
//! pool of worker tasks draining a shared queue. Each unit runs under a
//! timeout and reaches exactly one terminal outcome; unit failures are
//! isolated and never take the job down. Only enumeration and collection
//! provisioning are fatal.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use cohort_core::resolver::{self, ResolverParams};
use cohort_core::store::DistanceMetric;
use cohort_core::types::{FacePayload, FaceRecord};
use cohort_core::EmbeddingStore;

use crate::config::Config;
use crate::error::{Stage, UnitError};
use crate::extract::{FaceExtractor, Thumbnailer};
use crate::jobs::{
    new_job_id, ImageOutcome, IngestionJob, JobId, JobStore, ThumbnailFailure, UnitStatus,
};
use crate::resume::ResumeLog;
use crate::retry::{self, RetryPolicy};
use crate::source::ImageSource;

/// Per-job ingestion parameters.
#[derive(Debug, Clone)]
pub struct IngestParams {
    pub group_id: String,
    pub collection: String,
    pub embedding_dim: usize,
    pub threshold: f32,
    pub workers: usize,
    pub retry: RetryPolicy,
    pub unit_timeout: Duration,
    pub resolve_on_ingest: bool,
    pub resolver_top_k: usize,
}

impl IngestParams {
    pub fn from_config(config: &Config, group_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            collection: config.collection.clone(),
            embedding_dim: config.embedding_dim,
            threshold: config.similarity_threshold,
            workers: config.workers,
            retry: RetryPolicy::new(config.max_retries, config.retry_delay()),
            unit_timeout: config.unit_timeout(),
            resolve_on_ingest: config.resolve_on_ingest,
            resolver_top_k: config.resolver_top_k,
        }
    }
}

pub struct Orchestrator {
    store: Arc<dyn EmbeddingStore>,
    extractor: Arc<dyn FaceExtractor>,
    thumbnailer: Option<Arc<dyn Thumbnailer>>,
    registry: Arc<dyn JobStore<IngestionJob>>,
    /// The model is not assumed safe for concurrent invocation; extraction
    /// calls from all workers serialize behind this gate.
    extractor_gate: Mutex<()>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn EmbeddingStore>,
        extractor: Arc<dyn FaceExtractor>,
        registry: Arc<dyn JobStore<IngestionJob>>,
    ) -> Self {
        Self {
            store,
            extractor,
            thumbnailer: None,
            registry,
            extractor_gate: Mutex::new(()),
        }
    }

    pub fn with_thumbnailer(mut self, thumbnailer: Arc<dyn Thumbnailer>) -> Self {
        self.thumbnailer = Some(thumbnailer);
        self
    }

    /// Register a job and spawn its run in the background. Returns the job
    /// id immediately; poll the registry for progress.
    pub async fn submit(
        self: &Arc<Self>,
        params: IngestParams,
        source: Arc<dyn ImageSource>,
        resume: Arc<ResumeLog>,
    ) -> JobId {
        let job_id = new_job_id("digest");
        let job = IngestionJob::new(job_id.clone(), &params.group_id, &params.collection);
        self.registry.insert(job_id.clone(), job).await;

        let this = Arc::clone(self);
        let id = job_id.clone();
        tokio::spawn(async move {
            this.run(id, params, source, resume).await;
        });
        job_id
    }

    /// Register a job and drive it to completion before returning.
    pub async fn run_ingestion(
        self: &Arc<Self>,
        params: IngestParams,
        source: Arc<dyn ImageSource>,
        resume: Arc<ResumeLog>,
    ) -> JobId {
        let job_id = new_job_id("digest");
        let job = IngestionJob::new(job_id.clone(), &params.group_id, &params.collection);
        self.registry.insert(job_id.clone(), job).await;
        Arc::clone(self).run(job_id.clone(), params, source, resume).await;
        job_id
    }

    async fn run(
        self: Arc<Self>,
        job_id: JobId,
        params: IngestParams,
        source: Arc<dyn ImageSource>,
        resume: Arc<ResumeLog>,
    ) {
        self.registry
            .update(&job_id, Box::new(|job| job.mark_processing()))
            .await;

        if let Err(err) = self
            .store
            .ensure_collection(&params.collection, params.embedding_dim, DistanceMetric::Cosine)
            .await
        {
            tracing::error!(job = %job_id, error = %err, "collection provisioning failed");
            let message = err.to_string();
            self.registry
                .update(&job_id, Box::new(move |job| job.fail(message)))
                .await;
            return;
        }

        let paths = match source.list().await {
            Ok(paths) => paths,
            Err(err) => {
                tracing::error!(job = %job_id, error = %err, "source enumeration failed");
                let message = err.to_string();
                self.registry
                    .update(&job_id, Box::new(move |job| job.fail(message)))
                    .await;
                return;
            }
        };

        let total = paths.len();
        let mut pending = Vec::new();
        let mut skipped = 0usize;
        for path in paths {
            if resume.contains(&path).await {
                skipped += 1;
            } else {
                pending.push(path);
            }
        }
        self.registry
            .update(
                &job_id,
                Box::new(move |job| {
                    job.total_images = total;
                    job.record_skipped(skipped);
                }),
            )
            .await;
        tracing::info!(
            job = %job_id,
            group = %params.group_id,
            total,
            skipped,
            pending = pending.len(),
            "ingestion started"
        );

        let queue = Arc::new(Mutex::new(VecDeque::from(pending)));
        let params = Arc::new(params);
        let workers = params.workers.max(1);

        let mut handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            let this = Arc::clone(&self);
            let job_id = job_id.clone();
            let params = Arc::clone(&params);
            let source = Arc::clone(&source);
            let resume = Arc::clone(&resume);
            let queue = Arc::clone(&queue);
            handles.push(tokio::spawn(async move {
                this.worker_loop(&job_id, &params, source.as_ref(), &resume, &queue)
                    .await;
            }));
        }
        for handle in handles {
            if let Err(err) = handle.await {
                tracing::error!(job = %job_id, error = %err, "worker task panicked");
            }
        }

        self.registry
            .update(&job_id, Box::new(|job| job.finalize()))
            .await;
        if let Some(job) = self.registry.get(&job_id).await {
            tracing::info!(
                job = %job_id,
                succeeded = job.succeeded,
                no_faces = job.no_faces,
                failed = job.failed,
                skipped = job.skipped,
                faces = job.faces_persisted,
                retries = job.retry_total,
                "ingestion finished"
            );
        }
    }

    async fn worker_loop(
        &self,
        job_id: &str,
        params: &IngestParams,
        source: &dyn ImageSource,
        resume: &ResumeLog,
        queue: &Mutex<VecDeque<String>>,
    ) {
        loop {
            let path = { queue.lock().await.pop_front() };
            let Some(path) = path else { break };

            let outcome = match tokio::time::timeout(
                params.unit_timeout,
                self.process_unit(job_id, params, source, &path),
            )
            .await
            {
                Ok(outcome) => outcome,
                Err(_) => ImageOutcome {
                    path: path.clone(),
                    status: UnitStatus::Failed,
                    faces: 0,
                    error: Some(format!(
                        "unit exceeded timeout of {:?}",
                        params.unit_timeout
                    )),
                    failure_stage: Some(Stage::Timeout),
                    retries: 0,
                },
            };

            // Failed units stay out of the resume log so a re-run
            // re-drives exactly the failed subset.
            let completed = outcome.status != UnitStatus::Failed;
            self.registry
                .update(job_id, Box::new(move |job| job.record_outcome(outcome)))
                .await;
            if completed {
                if let Err(err) = resume.record(&path).await {
                    tracing::warn!(path = %path, error = %err, "resume log write failed");
                }
            }
        }
    }

    /// Process one image to a terminal outcome. Never panics the worker;
    /// every failure path returns an outcome.
    async fn process_unit(
        &self,
        job_id: &str,
        params: &IngestParams,
        source: &dyn ImageSource,
        path: &str,
    ) -> ImageOutcome {
        let mut retries = 0u32;

        let image = match source.fetch(path).await {
            Ok(bytes) => bytes,
            Err(err) => return failed_outcome(path, Stage::Read, 1, err.to_string(), retries),
        };

        // Thumbnails are best-effort: record the failure on the job and
        // keep going.
        let mut thumbnail_path = None;
        if let Some(thumbnailer) = &self.thumbnailer {
            match thumbnailer.thumbnail(path, &image).await {
                Ok(reference) => thumbnail_path = Some(reference),
                Err(err) => {
                    tracing::warn!(path = %path, error = %err, "thumbnail generation failed");
                    let failure = ThumbnailFailure {
                        path: path.to_string(),
                        error: err,
                    };
                    self.registry
                        .update(
                            job_id,
                            Box::new(move |job| job.thumbnail_failures.push(failure)),
                        )
                        .await;
                }
            }
        }

        let faces = match retry::attempt("extract_faces", &params.retry, || {
            let image = &image;
            async move {
                let _gate = self.extractor_gate.lock().await;
                self.extractor.extract(image).await
            }
        })
        .await
        {
            Ok((faces, attempts)) => {
                retries += attempts - 1;
                faces
            }
            Err((err, attempts)) => {
                retries += attempts - 1;
                return failed_outcome(path, Stage::Extraction, attempts, err.to_string(), retries);
            }
        };

        if faces.is_empty() {
            tracing::debug!(path = %path, "no faces detected");
            return ImageOutcome {
                path: path.to_string(),
                status: UnitStatus::NoFaces,
                faces: 0,
                error: None,
                failure_stage: None,
                retries,
            };
        }

        let mut persisted = 0usize;
        for (face_index, face) in faces.into_iter().enumerate() {
            // Detection without an embedding: the region is unusable.
            let Some(embedding) = face.embedding else {
                tracing::debug!(path = %path, face_index, "face detected without embedding");
                continue;
            };

            let mut payload = FacePayload::new(
                &params.group_id,
                path,
                face_index,
                face.confidence,
                face.facial_area,
            );
            payload.thumbnail_path = thumbnail_path.clone();
            let record = FaceRecord::new(embedding, payload);

            match retry::attempt("store_upsert", &params.retry, || {
                let record = record.clone();
                async move {
                    self.store
                        .upsert(&params.collection, vec![record])
                        .await
                }
            })
            .await
            {
                Ok((_, attempts)) => {
                    retries += attempts - 1;
                    persisted += 1;
                    if params.resolve_on_ingest {
                        self.resolve_face(params, &record).await;
                    }
                }
                Err((err, attempts)) => {
                    retries += attempts - 1;
                    return failed_outcome(path, Stage::StoreWrite, attempts, err.to_string(), retries);
                }
            }
        }

        if persisted == 0 {
            return ImageOutcome {
                path: path.to_string(),
                status: UnitStatus::NoFaces,
                faces: 0,
                error: None,
                failure_stage: None,
                retries,
            };
        }

        ImageOutcome {
            path: path.to_string(),
            status: UnitStatus::Success,
            faces: persisted,
            error: None,
            failure_stage: None,
            retries,
        }
    }

    /// Incremental identity resolution for a freshly persisted face.
    /// Resolution failures degrade the label, not the unit.
    async fn resolve_face(&self, params: &IngestParams, record: &FaceRecord) {
        let resolver_params = ResolverParams {
            threshold: params.threshold,
            top_k: params.resolver_top_k,
            scope_to_group: true,
        };
        match resolver::resolve(
            self.store.as_ref(),
            &params.collection,
            record,
            &resolver_params,
        )
        .await
        {
            Ok(resolution) => {
                tracing::debug!(
                    face = %record.id,
                    person = %resolution.person_id,
                    minted = resolution.is_minted(),
                    "face resolved"
                );
            }
            Err(err) => {
                tracing::warn!(face = %record.id, error = %err, "incremental resolution failed");
            }
        }
    }
}

fn failed_outcome(
    path: &str,
    stage: Stage,
    attempts: u32,
    message: String,
    retries: u32,
) -> ImageOutcome {
    let error = UnitError::new(path, stage, attempts, message);
    ImageOutcome {
        path: path.to_string(),
        status: UnitStatus::Failed,
        faces: 0,
        error: Some(error.to_string()),
        failure_stage: Some(stage),
        retries,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    use cohort_core::store::PointFilter;
    use cohort_core::types::{BoundingBox, Embedding};
    use cohort_store::InMemoryStore;

    use crate::extract::{DetectedFace, ExtractError};
    use crate::jobs::{InMemoryJobStore, JobStatus};
    use crate::source::StaticSource;

    /// Extractor scripted by image content:
    /// - bytes starting with "fail" always error (transient),
    /// - bytes starting with "empty" detect nothing,
    /// - bytes starting with "noembed" detect a face without an embedding,
    /// - anything else yields one face whose embedding is derived from the
    ///   first byte, so distinct images land apart and identical images
    ///   land together.
    struct ScriptedExtractor;

    fn face_for(bytes: &[u8]) -> DetectedFace {
        let lead = bytes.first().copied().unwrap_or(0) as f32;
        DetectedFace {
            facial_area: BoundingBox {
                x: 0,
                y: 0,
                w: 64,
                h: 64,
            },
            confidence: 0.95,
            embedding: Some(Embedding::new(vec![lead, 1.0])),
        }
    }

    #[async_trait]
    impl FaceExtractor for ScriptedExtractor {
        async fn extract(&self, image: &[u8]) -> Result<Vec<DetectedFace>, ExtractError> {
            if image.starts_with(b"fail") {
                return Err(ExtractError::Service("model down".into()));
            }
            if image.starts_with(b"empty") {
                return Ok(vec![]);
            }
            if image.starts_with(b"noembed") {
                return Ok(vec![DetectedFace {
                    embedding: None,
                    ..face_for(image)
                }]);
            }
            Ok(vec![face_for(image)])
        }
    }

    /// Fails the first `failures` calls, then behaves like the scripted
    /// extractor.
    struct FlakyExtractor {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl FaceExtractor for FlakyExtractor {
        async fn extract(&self, image: &[u8]) -> Result<Vec<DetectedFace>, ExtractError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
                return Err(ExtractError::Service("flaky".into()));
            }
            Ok(vec![face_for(image)])
        }
    }

    struct HangingExtractor;

    #[async_trait]
    impl FaceExtractor for HangingExtractor {
        async fn extract(&self, _image: &[u8]) -> Result<Vec<DetectedFace>, ExtractError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(vec![])
        }
    }

    struct FailingThumbnailer;

    #[async_trait]
    impl Thumbnailer for FailingThumbnailer {
        async fn thumbnail(&self, _path: &str, _image: &[u8]) -> Result<String, String> {
            Err("disk full".to_string())
        }
    }

    fn params(workers: usize) -> IngestParams {
        IngestParams {
            group_id: "g1".to_string(),
            collection: "faces".to_string(),
            embedding_dim: 2,
            threshold: 0.80,
            workers,
            retry: RetryPolicy::new(2, Duration::ZERO),
            unit_timeout: Duration::from_secs(5),
            resolve_on_ingest: false,
            resolver_top_k: 10,
        }
    }

    fn mixed_source() -> StaticSource {
        // 5 succeed, 2 detect nothing, 3 fail extraction.
        let mut images = HashMap::new();
        for i in 0..5u8 {
            images.insert(format!("ok_{i}.jpg"), vec![10 + i, 1, 2]);
        }
        images.insert("empty_a.jpg".to_string(), b"empty-a".to_vec());
        images.insert("empty_b.jpg".to_string(), b"empty-b".to_vec());
        for i in 0..3u8 {
            images.insert(format!("bad_{i}.jpg"), format!("fail-{i}").into_bytes());
        }
        StaticSource::new(images)
    }

    fn orchestrator(
        store: Arc<InMemoryStore>,
        extractor: Arc<dyn FaceExtractor>,
    ) -> (Arc<Orchestrator>, Arc<InMemoryJobStore<IngestionJob>>) {
        let registry = Arc::new(InMemoryJobStore::new());
        let orchestrator = Arc::new(Orchestrator::new(store, extractor, registry.clone()));
        (orchestrator, registry)
    }

    #[tokio::test]
    async fn test_counters_independent_of_worker_count() {
        for workers in [1usize, 8] {
            let store = Arc::new(InMemoryStore::new());
            let (orchestrator, registry) =
                orchestrator(store.clone(), Arc::new(ScriptedExtractor));

            let job_id = orchestrator
                .run_ingestion(
                    params(workers),
                    Arc::new(mixed_source()),
                    Arc::new(ResumeLog::in_memory()),
                )
                .await;

            let job = registry.get(&job_id).await.unwrap();
            assert_eq!(job.status, JobStatus::Completed, "workers={workers}");
            assert_eq!(job.total_images, 10);
            assert_eq!(job.failed, 3);
            assert_eq!(job.succeeded, 5);
            assert_eq!(job.no_faces, 2);
            assert_eq!(job.succeeded + job.no_faces, 7);
            assert_eq!(job.progress, 100);
            assert_eq!(job.faces_persisted, 5);
            // 3 failing units, 3 attempts each.
            assert_eq!(job.retry_total, 6);

            let count = store
                .count("faces", &PointFilter::default())
                .await
                .unwrap();
            assert_eq!(count, 5, "workers={workers}");
        }
    }

    #[tokio::test]
    async fn test_restart_skips_completed_units() {
        let dir = tempfile::tempdir().unwrap();
        let resume_path = dir.path().join("resume.json");
        let store = Arc::new(InMemoryStore::new());
        let (orchestrator, registry) = orchestrator(store.clone(), Arc::new(ScriptedExtractor));

        let first = orchestrator
            .run_ingestion(
                params(4),
                Arc::new(mixed_source()),
                Arc::new(ResumeLog::load(&resume_path).await.unwrap()),
            )
            .await;
        let job = registry.get(&first).await.unwrap();
        assert_eq!(job.succeeded + job.no_faces, 7);
        let count_before = store
            .count("faces", &PointFilter::default())
            .await
            .unwrap();
        assert_eq!(count_before, 5);

        // Simulated restart: fresh resume log from the same file, same
        // source and store. Completed units skip; only the failed subset
        // is re-driven.
        let second = orchestrator
            .run_ingestion(
                params(4),
                Arc::new(mixed_source()),
                Arc::new(ResumeLog::load(&resume_path).await.unwrap()),
            )
            .await;
        let job = registry.get(&second).await.unwrap();
        assert_eq!(job.skipped, 7);
        assert_eq!(job.failed, 3);
        assert_eq!(job.succeeded, 0);

        let count_after = store
            .count("faces", &PointFilter::default())
            .await
            .unwrap();
        assert_eq!(count_after, count_before);
    }

    #[tokio::test]
    async fn test_transient_extraction_failure_recovers() {
        let store = Arc::new(InMemoryStore::new());
        let extractor = Arc::new(FlakyExtractor {
            failures: 2,
            calls: AtomicU32::new(0),
        });
        let (orchestrator, registry) = orchestrator(store.clone(), extractor);

        let mut images = HashMap::new();
        images.insert("one.jpg".to_string(), vec![42, 1]);
        let job_id = orchestrator
            .run_ingestion(
                params(1),
                Arc::new(StaticSource::new(images)),
                Arc::new(ResumeLog::in_memory()),
            )
            .await;

        let job = registry.get(&job_id).await.unwrap();
        assert_eq!(job.succeeded, 1);
        assert_eq!(job.failed, 0);
        assert_eq!(job.retry_total, 2);
    }

    #[tokio::test]
    async fn test_hung_unit_times_out_without_stalling_job() {
        let store = Arc::new(InMemoryStore::new());
        let (orchestrator, registry) = orchestrator(store, Arc::new(HangingExtractor));

        let mut p = params(2);
        p.unit_timeout = Duration::from_millis(50);
        p.retry = RetryPolicy::none();
        let mut images = HashMap::new();
        images.insert("hang.jpg".to_string(), vec![1]);
        let job_id = orchestrator
            .run_ingestion(
                p,
                Arc::new(StaticSource::new(images)),
                Arc::new(ResumeLog::in_memory()),
            )
            .await;

        let job = registry.get(&job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.failed, 1);
        assert_eq!(job.outcomes[0].failure_stage, Some(Stage::Timeout));
    }

    #[tokio::test]
    async fn test_thumbnail_failure_never_escalates() {
        let store = Arc::new(InMemoryStore::new());
        let registry = Arc::new(InMemoryJobStore::new());
        let orchestrator = Arc::new(
            Orchestrator::new(store.clone(), Arc::new(ScriptedExtractor), registry.clone())
                .with_thumbnailer(Arc::new(FailingThumbnailer)),
        );

        let mut images = HashMap::new();
        images.insert("a.jpg".to_string(), vec![42, 1]);
        let job_id = orchestrator
            .run_ingestion(
                params(1),
                Arc::new(StaticSource::new(images)),
                Arc::new(ResumeLog::in_memory()),
            )
            .await;

        let job = registry.get(&job_id).await.unwrap();
        assert_eq!(job.succeeded, 1);
        assert_eq!(job.failed, 0);
        assert_eq!(job.thumbnail_failures.len(), 1);
        assert_eq!(job.thumbnail_failures[0].error, "disk full");
    }

    #[tokio::test]
    async fn test_detection_without_embedding_counts_as_no_faces() {
        let store = Arc::new(InMemoryStore::new());
        let (orchestrator, registry) = orchestrator(store.clone(), Arc::new(ScriptedExtractor));

        let mut images = HashMap::new();
        images.insert("n.jpg".to_string(), b"noembed".to_vec());
        let job_id = orchestrator
            .run_ingestion(
                params(1),
                Arc::new(StaticSource::new(images)),
                Arc::new(ResumeLog::in_memory()),
            )
            .await;

        let job = registry.get(&job_id).await.unwrap();
        assert_eq!(job.no_faces, 1);
        assert_eq!(job.faces_persisted, 0);
        let count = store
            .count("faces", &PointFilter::default())
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_resolve_on_ingest_links_duplicates() {
        let store = Arc::new(InMemoryStore::new());
        let (orchestrator, registry) = orchestrator(store.clone(), Arc::new(ScriptedExtractor));

        // Identical bytes produce identical embeddings.
        let mut images = HashMap::new();
        images.insert("dup_1.jpg".to_string(), vec![42, 1]);
        images.insert("dup_2.jpg".to_string(), vec![42, 1]);
        images.insert("dup_3.jpg".to_string(), vec![42, 1]);

        let mut p = params(1);
        p.resolve_on_ingest = true;
        let job_id = orchestrator
            .run_ingestion(
                p,
                Arc::new(StaticSource::new(images)),
                Arc::new(ResumeLog::in_memory()),
            )
            .await;

        let job = registry.get(&job_id).await.unwrap();
        assert_eq!(job.succeeded, 3);

        let filter = PointFilter {
            labeled_only: true,
            ..Default::default()
        };
        let records = cohort_core::store::enumerate_all(store.as_ref(), "faces", &filter, 100)
            .await
            .unwrap();
        assert_eq!(records.len(), 3);
        let persons: std::collections::BTreeSet<_> = records
            .iter()
            .filter_map(|r| r.payload.person_id.clone())
            .collect();
        assert_eq!(persons.len(), 1, "all duplicates share one person id");
    }

    #[tokio::test]
    async fn test_unlistable_source_fails_job() {
        let store = Arc::new(InMemoryStore::new());
        let (orchestrator, registry) = orchestrator(store, Arc::new(ScriptedExtractor));

        let job_id = orchestrator
            .run_ingestion(
                params(1),
                Arc::new(crate::source::DirSource::new("/definitely/not/here")),
                Arc::new(ResumeLog::in_memory()),
            )
            .await;

        let job = registry.get(&job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.is_some());
        assert_eq!(job.total_images, 0);
    }

    #[tokio::test]
    async fn test_empty_source_completes_immediately() {
        let store = Arc::new(InMemoryStore::new());
        let (orchestrator, registry) = orchestrator(store, Arc::new(ScriptedExtractor));

        let job_id = orchestrator
            .run_ingestion(
                params(4),
                Arc::new(StaticSource::default()),
                Arc::new(ResumeLog::in_memory()),
            )
            .await;

        let job = registry.get(&job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.total_images, 0);
        assert_eq!(job.progress, 100);
    }

    #[tokio::test]
    async fn test_submit_runs_in_background() {
        let store = Arc::new(InMemoryStore::new());
        let (orchestrator, registry) = orchestrator(store, Arc::new(ScriptedExtractor));

        let mut images = HashMap::new();
        images.insert("a.jpg".to_string(), vec![42, 1]);
        let job_id = orchestrator
            .submit(
                params(1),
                Arc::new(StaticSource::new(images)),
                Arc::new(ResumeLog::in_memory()),
            )
            .await;

        // The job exists immediately; completion follows shortly.
        assert!(registry.get(&job_id).await.is_some());
        for _ in 0..100 {
            if let Some(job) = registry.get(&job_id).await {
                if job.status.is_terminal() {
                    assert_eq!(job.status, JobStatus::Completed);
                    assert_eq!(job.succeeded, 1);
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job never reached a terminal state");
    }
}
