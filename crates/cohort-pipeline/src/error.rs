use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fatal errors that abort a whole job before or during setup. Everything
/// else is isolated per unit and never takes the job down.
#[derive(Error, Debug)]
pub enum SetupError {
    #[error("source cannot be enumerated: {0}")]
    SourceUnavailable(String),
    #[error("collection provisioning failed: {0}")]
    Provisioning(#[from] cohort_core::StoreError),
}

/// Stage of per-image processing where a unit failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Read,
    Thumbnail,
    Extraction,
    StoreWrite,
    Timeout,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Read => "read",
            Stage::Thumbnail => "thumbnail",
            Stage::Extraction => "extraction",
            Stage::StoreWrite => "store_write",
            Stage::Timeout => "timeout",
        };
        f.write_str(s)
    }
}

/// Per-image failure, isolated to its unit. Carries enough context (path,
/// stage, attempt count) for callers to re-drive only the failed subset.
#[derive(Error, Debug, Clone)]
#[error("{stage} failed for {path} after {attempts} attempt(s): {message}")]
pub struct UnitError {
    pub path: String,
    pub stage: Stage,
    pub attempts: u32,
    pub message: String,
}

impl UnitError {
    pub fn new(
        path: impl Into<String>,
        stage: Stage,
        attempts: u32,
        message: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            stage,
            attempts,
            message: message.into(),
        }
    }
}
