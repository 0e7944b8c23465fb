//! JSON-backed job list and application settings.
//!
//! The engine only reads jobs; creating and editing them is somebody else's
//! job. Both files are optional: a missing or blank file yields an empty job
//! list or default settings.

use crate::encryption::normalize_extensions;
use crate::job::BackupJob;
use crate::utils::errors::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Supplies the jobs a caller may run
pub trait JobSource: Send + Sync {
    fn load_all(&self) -> Result<Vec<BackupJob>>;
}

/// Jobs stored as a JSON array of `BackupJob`
#[derive(Debug, Clone)]
pub struct JsonJobSource {
    path: PathBuf,
}

impl JsonJobSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl JobSource for JsonJobSource {
    fn load_all(&self) -> Result<Vec<BackupJob>> {
        let Some(content) = read_optional(&self.path)? else {
            return Ok(Vec::new());
        };

        let jobs: Vec<BackupJob> = serde_json::from_str(&content)?;

        let mut ids = HashSet::new();
        for job in &jobs {
            if job.id == 0 {
                return Err(EngineError::Config(format!(
                    "job '{}' in {} has no id",
                    job.name,
                    self.path.display()
                )));
            }
            if !ids.insert(job.id) {
                return Err(EngineError::Config(format!(
                    "duplicate job id {} in {}",
                    job.id,
                    self.path.display()
                )));
            }
        }

        debug!(path = %self.path.display(), count = jobs.len(), "Loaded jobs");
        Ok(jobs)
    }
}

/// User-level preferences shared by every job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppSettings {
    pub language: String,

    /// Format of the daily log as chosen by the user
    pub log_format: String,

    /// Fallback extension set for jobs that encrypt without their own list
    pub extensions_to_encrypt: Vec<String>,

    /// Process name or executable path that blocks backups while running
    pub business_software: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            log_format: "json".to_string(),
            extensions_to_encrypt: Vec::new(),
            business_software: String::new(),
        }
    }
}

impl AppSettings {
    /// Load settings, falling back to defaults when the file is absent
    pub fn load(path: &Path) -> Result<Self> {
        match read_optional(path)? {
            Some(content) => Ok(serde_json::from_str(&content)?),
            None => Ok(Self::default()),
        }
    }

    /// Give an encrypting job with no extension list the settings' list.
    ///
    /// An empty settings list keeps "encrypt everything".
    pub fn apply_to(&self, job: &mut BackupJob) {
        if job.encryption_enabled && normalize_extensions(&job.extensions_to_encrypt).is_empty() {
            job.extensions_to_encrypt = normalize_extensions(&self.extensions_to_encrypt);
        }
    }
}

/// Read a file, treating "missing" and "only whitespace" alike
fn read_optional(path: &Path) -> Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(content) if content.trim().is_empty() => Ok(None),
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}
