//! Image source seam.
//!
//! Enumeration and fetching of source images is an external-collaborator
//! concern; the orchestrator only sees this trait. A local-directory
//! source is provided; bucket/shared-drive sources implement the same
//! trait elsewhere.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

use crate::error::SetupError;

/// Extensions treated as images during enumeration.
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "tiff", "webp"];

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("read failed: {0}")]
    Read(String),
    #[error("not found: {0}")]
    NotFound(String),
}

#[async_trait]
pub trait ImageSource: Send + Sync {
    /// Enumerate image references in this source. Failure here is fatal
    /// for the job.
    async fn list(&self) -> Result<Vec<String>, SetupError>;

    /// Fetch the raw bytes of one enumerated image.
    async fn fetch(&self, path: &str) -> Result<Vec<u8>, SourceError>;
}

/// Recursive local-directory source.
///
/// Enumerates in sorted order for deterministic work lists; skips
/// `thumbnail/` directories so generated thumbnails are never re-ingested.
pub struct DirSource {
    root: PathBuf,
}

impl DirSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn is_image(path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                let ext = ext.to_ascii_lowercase();
                IMAGE_EXTENSIONS.iter().any(|known| *known == ext)
            })
            .unwrap_or(false)
    }
}

#[async_trait]
impl ImageSource for DirSource {
    async fn list(&self) -> Result<Vec<String>, SetupError> {
        let mut images = Vec::new();
        let mut pending = vec![self.root.clone()];

        if !self.root.is_dir() {
            return Err(SetupError::SourceUnavailable(format!(
                "directory not found: {}",
                self.root.display()
            )));
        }

        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir)
                .await
                .map_err(|e| SetupError::SourceUnavailable(format!("{}: {e}", dir.display())))?;
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| SetupError::SourceUnavailable(e.to_string()))?
            {
                let path = entry.path();
                if path.is_dir() {
                    if path.file_name().and_then(|n| n.to_str()) != Some("thumbnail") {
                        pending.push(path);
                    }
                } else if Self::is_image(&path) {
                    images.push(path.to_string_lossy().into_owned());
                }
            }
        }

        images.sort();
        Ok(images)
    }

    async fn fetch(&self, path: &str) -> Result<Vec<u8>, SourceError> {
        tokio::fs::read(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SourceError::NotFound(path.to_string())
            } else {
                SourceError::Read(format!("{path}: {e}"))
            }
        })
    }
}

/// Fixed in-memory source: a path → bytes map. Useful for tests and for
/// driving the pipeline from pre-fetched content.
#[derive(Default)]
pub struct StaticSource {
    images: HashMap<String, Vec<u8>>,
}

impl StaticSource {
    pub fn new(images: HashMap<String, Vec<u8>>) -> Self {
        Self { images }
    }

    pub fn insert(&mut self, path: impl Into<String>, bytes: Vec<u8>) {
        self.images.insert(path.into(), bytes);
    }
}

#[async_trait]
impl ImageSource for StaticSource {
    async fn list(&self) -> Result<Vec<String>, SetupError> {
        let mut paths: Vec<String> = self.images.keys().cloned().collect();
        paths.sort();
        Ok(paths)
    }

    async fn fetch(&self, path: &str) -> Result<Vec<u8>, SourceError> {
        self.images
            .get(path)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(path.to_string()))
    }
}
