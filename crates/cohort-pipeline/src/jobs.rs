//! Job records and the job registry.
//!
//! Jobs are created at submission, mutated only by their owning
//! orchestrator task, and polled as snapshots. The registry is an
//! injectable trait so the process-local map can later back onto a
//! durable/shared store without touching the orchestrator.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use cohort_core::ClusterMetrics;

use crate::error::Stage;

pub type JobId = String;

pub fn new_job_id(kind: &str) -> JobId {
    format!("{kind}-{}", Uuid::new_v4())
}

/// Job lifecycle. Queued → Processing → {Completed, Failed}; the terminal
/// states accept no further transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Terminal outcome of one image unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    /// At least one face persisted.
    Success,
    /// Detection found none, or every post-detection embedding failed.
    NoFaces,
    /// Fatal for this unit after bounded retries.
    Failed,
}

/// Per-image outcome record, written exactly once when the unit reaches a
/// terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageOutcome {
    pub path: String,
    pub status: UnitStatus,
    /// Faces persisted (Success only).
    pub faces: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_stage: Option<Stage>,
    /// Retries spent across this unit's external calls.
    pub retries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThumbnailFailure {
    pub path: String,
    pub error: String,
}

/// Status record for one ingestion (digest) job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionJob {
    pub id: JobId,
    pub group_id: String,
    pub collection: String,
    pub status: JobStatus,
    /// 0–100, counting skipped (already-processed) units as done.
    pub progress: u8,
    pub total_images: usize,
    /// Units skipped because the resume log already had them.
    pub skipped: usize,
    pub succeeded: usize,
    pub no_faces: usize,
    pub failed: usize,
    pub faces_persisted: usize,
    pub retry_total: u32,
    /// Thumbnail problems are recorded here and never escalate.
    pub thumbnail_failures: Vec<ThumbnailFailure>,
    pub outcomes: Vec<ImageOutcome>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Set only on a fatal setup error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IngestionJob {
    pub fn new(id: JobId, group_id: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            id,
            group_id: group_id.into(),
            collection: collection.into(),
            status: JobStatus::Queued,
            progress: 0,
            total_images: 0,
            skipped: 0,
            succeeded: 0,
            no_faces: 0,
            failed: 0,
            faces_persisted: 0,
            retry_total: 0,
            thumbnail_failures: Vec::new(),
            outcomes: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
            error: None,
        }
    }

    fn terminal_units(&self) -> usize {
        self.skipped + self.succeeded + self.no_faces + self.failed
    }

    fn refresh_progress(&mut self) {
        if self.total_images > 0 {
            self.progress = (self.terminal_units() * 100 / self.total_images) as u8;
        }
    }

    /// Record one unit's terminal outcome and update counters/progress.
    /// Ignored if the job is already terminal.
    pub fn record_outcome(&mut self, outcome: ImageOutcome) {
        if self.status.is_terminal() {
            return;
        }
        match outcome.status {
            UnitStatus::Success => {
                self.succeeded += 1;
                self.faces_persisted += outcome.faces;
            }
            UnitStatus::NoFaces => self.no_faces += 1,
            UnitStatus::Failed => self.failed += 1,
        }
        self.retry_total += outcome.retries;
        self.outcomes.push(outcome);
        self.refresh_progress();
    }

    pub fn record_skipped(&mut self, count: usize) {
        self.skipped += count;
        self.refresh_progress();
    }

    pub fn mark_processing(&mut self) {
        if self.status == JobStatus::Queued {
            self.status = JobStatus::Processing;
        }
    }

    pub fn finalize(&mut self) {
        if self.status.is_terminal() {
            return;
        }
        self.status = JobStatus::Completed;
        self.progress = 100;
        self.finished_at = Some(Utc::now());
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        if self.status.is_terminal() {
            return;
        }
        self.status = JobStatus::Failed;
        self.error = Some(error.into());
        self.finished_at = Some(Utc::now());
    }
}

/// Status record for one batch clustering job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterJob {
    pub id: JobId,
    /// Scope: one group, or the whole collection when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    pub collection: String,
    pub threshold: f32,
    pub status: JobStatus,
    pub total_faces: usize,
    pub clusters_found: usize,
    pub faces_updated: usize,
    /// Quality signals; best-effort, never blocks the run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<ClusterMetrics>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ClusterJob {
    pub fn new(
        id: JobId,
        group_id: Option<String>,
        collection: impl Into<String>,
        threshold: f32,
    ) -> Self {
        Self {
            id,
            group_id,
            collection: collection.into(),
            threshold,
            status: JobStatus::Queued,
            total_faces: 0,
            clusters_found: 0,
            faces_updated: 0,
            metrics: None,
            started_at: Utc::now(),
            finished_at: None,
            error: None,
        }
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        if self.status.is_terminal() {
            return;
        }
        self.status = JobStatus::Failed;
        self.error = Some(error.into());
        self.finished_at = Some(Utc::now());
    }
}

/// Mutation applied to a job under the registry's lock.
pub type JobMutation<T> = Box<dyn FnOnce(&mut T) + Send>;

/// Injectable job store. Jobs live from submission until eviction; the
/// in-memory impl retains them for the process lifetime.
#[async_trait]
pub trait JobStore<T: Clone + Send + Sync + 'static>: Send + Sync {
    async fn insert(&self, id: JobId, job: T);
    async fn get(&self, id: &str) -> Option<T>;
    async fn list(&self) -> Vec<T>;
    /// Atomically mutate the job. Returns false if the id is unknown.
    async fn update(&self, id: &str, mutation: JobMutation<T>) -> bool;
    async fn remove(&self, id: &str) -> bool;
}

/// Process-wide registry backed by a locked map.
pub struct InMemoryJobStore<T> {
    jobs: RwLock<HashMap<JobId, T>>,
}

impl<T> InMemoryJobStore<T> {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
        }
    }
}

impl<T> Default for InMemoryJobStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Clone + Send + Sync + 'static> JobStore<T> for InMemoryJobStore<T> {
    async fn insert(&self, id: JobId, job: T) {
        self.jobs.write().await.insert(id, job);
    }

    async fn get(&self, id: &str) -> Option<T> {
        self.jobs.read().await.get(id).cloned()
    }

    async fn list(&self) -> Vec<T> {
        self.jobs.read().await.values().cloned().collect()
    }

    async fn update(&self, id: &str, mutation: JobMutation<T>) -> bool {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(id) {
            Some(job) => {
                mutation(job);
                true
            }
            None => false,
        }
    }

    async fn remove(&self, id: &str) -> bool {
        self.jobs.write().await.remove(id).is_some()
    }
}
