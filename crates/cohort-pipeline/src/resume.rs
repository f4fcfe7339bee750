//! Resume log: the persisted already-processed set.
//!
//! Checked before a unit is worked and updated after it reaches a
//! terminal non-failed state, so a killed job can be re-run over the same
//! source without reprocessing completed images. Failed units are
//! deliberately not recorded; a re-run re-drives exactly the failed
//! subset. Persistence is a scoped critical section: acquire, mutate,
//! flush, release.

use std::collections::BTreeSet;
use std::path::PathBuf;

use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Error, Debug)]
pub enum ResumeError {
    #[error("resume log io: {0}")]
    Io(#[from] std::io::Error),
    #[error("resume log corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

pub struct ResumeLog {
    path: Option<PathBuf>,
    state: Mutex<BTreeSet<String>>,
}

impl ResumeLog {
    /// Load the set from `path`, starting empty if the file is absent.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, ResumeError> {
        let path = path.into();
        let state = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeSet::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path: Some(path),
            state: Mutex::new(state),
        })
    }

    /// Volatile log with no backing file; every run starts fresh.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Mutex::new(BTreeSet::new()),
        }
    }

    pub async fn contains(&self, path: &str) -> bool {
        self.state.lock().await.contains(path)
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.is_empty()
    }

    /// Mark `path` processed and flush to disk before releasing the lock.
    pub async fn record(&self, path: &str) -> Result<(), ResumeError> {
        let mut state = self.state.lock().await;
        if !state.insert(path.to_string()) {
            return Ok(());
        }
        if let Some(file) = &self.path {
            let bytes = serde_json::to_vec(&*state)?;
            // Write-then-rename so a crash mid-flush can't corrupt the log.
            let tmp = file.with_extension("tmp");
            tokio::fs::write(&tmp, &bytes).await?;
            tokio::fs::rename(&tmp, file).await?;
        }
        Ok(())
    }
}
