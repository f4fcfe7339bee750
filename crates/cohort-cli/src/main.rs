use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use cohort_core::QualityBand;
use cohort_pipeline::{
    run_cluster_job, ClusterRunParams, Config, DirSource, IngestParams, IngestionJob,
    InMemoryJobStore, JobStatus, JobStore, Orchestrator, RemoteExtractor, ResumeLog,
};
use cohort_store::InMemoryStore;

#[derive(Parser)]
#[command(name = "cohort", about = "Cohort face ingestion and identity clustering")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Digest a directory of images: detect faces, persist embeddings
    Digest {
        /// Directory to ingest
        dir: String,
        /// Group (tenant/album) the images belong to
        #[arg(short, long)]
        group: String,
        /// Resume log path; a re-run skips images it already completed
        #[arg(long)]
        resume_log: Option<String>,
        /// Worker tasks (overrides COHORT_WORKERS)
        #[arg(long)]
        workers: Option<usize>,
        /// Resolve each face against known persons as it lands
        #[arg(long)]
        resolve: bool,
    },
    /// Digest a directory, then cluster its faces into persons
    Cluster {
        /// Directory to ingest
        dir: String,
        /// Group (tenant/album) the images belong to
        #[arg(short, long)]
        group: String,
        /// Cosine similarity threshold (overrides COHORT_SIMILARITY_THRESHOLD)
        #[arg(short, long)]
        threshold: Option<f32>,
        /// Resume log path
        #[arg(long)]
        resume_log: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    match cli.command {
        Commands::Digest {
            dir,
            group,
            resume_log,
            workers,
            resolve,
        } => {
            let mut params = IngestParams::from_config(&config, &group);
            if let Some(workers) = workers {
                params.workers = workers;
            }
            params.resolve_on_ingest = params.resolve_on_ingest || resolve;

            let (job, _store) = digest(&config, params, &dir, resume_log.as_deref()).await?;
            println!("{}", serde_json::to_string_pretty(&job)?);
            if job.status == JobStatus::Failed {
                bail!(
                    "digest failed: {}",
                    job.error.as_deref().unwrap_or("unknown error")
                );
            }
        }
        Commands::Cluster {
            dir,
            group,
            threshold,
            resume_log,
        } => {
            let params = IngestParams::from_config(&config, &group);
            let (job, store) = digest(&config, params, &dir, resume_log.as_deref()).await?;
            if job.status == JobStatus::Failed {
                bail!(
                    "digest failed: {}",
                    job.error.as_deref().unwrap_or("unknown error")
                );
            }
            tracing::info!(
                faces = job.faces_persisted,
                failed = job.failed,
                "digest done, clustering"
            );

            let threshold = threshold.unwrap_or(config.similarity_threshold);
            let registry = InMemoryJobStore::new();
            let job_id = run_cluster_job(
                store.as_ref(),
                &registry,
                ClusterRunParams::new(&config.collection, Some(group), threshold),
            )
            .await;
            let job = registry
                .get(&job_id)
                .await
                .context("cluster job record missing")?;

            println!("{}", serde_json::to_string_pretty(&job)?);
            if let Some(metrics) = &job.metrics {
                let band = match metrics.quality_band() {
                    QualityBand::Good => "good",
                    QualityBand::Fair => "fair",
                    QualityBand::Poor => "poor",
                };
                println!(
                    "clustering quality: {band} (silhouette {:.3}, {} persons from {} faces)",
                    metrics.silhouette_score, metrics.total_persons, metrics.total_faces
                );
            }
            if job.status == JobStatus::Failed {
                bail!(
                    "clustering failed: {}",
                    job.error.as_deref().unwrap_or("unknown error")
                );
            }
        }
    }

    Ok(())
}

/// Run one digest over `dir` and return the finished job plus the store it
/// populated. The CLI binds the in-memory reference store; a networked
/// backend slots in through the same `EmbeddingStore` seam.
async fn digest(
    config: &Config,
    params: IngestParams,
    dir: &str,
    resume_log: Option<&str>,
) -> Result<(IngestionJob, Arc<InMemoryStore>)> {
    let store = Arc::new(InMemoryStore::new());
    let extractor = Arc::new(RemoteExtractor::new(config.extractor_url.clone()));
    let registry = Arc::new(InMemoryJobStore::new());
    let orchestrator = Arc::new(Orchestrator::new(
        store.clone(),
        extractor,
        registry.clone(),
    ));

    let resume = match resume_log {
        Some(path) => ResumeLog::load(path)
            .await
            .with_context(|| format!("loading resume log {path}"))?,
        None => ResumeLog::in_memory(),
    };

    let job_id = orchestrator
        .run_ingestion(params, Arc::new(DirSource::new(dir)), Arc::new(resume))
        .await;
    let job = registry
        .get(&job_id)
        .await
        .context("digest job record missing")?;
    Ok((job, store))
}
