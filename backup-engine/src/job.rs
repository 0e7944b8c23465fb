//! Backup job description.
//!
//! A `BackupJob` is created and edited by the job store; once handed to the
//! engine for a run it is treated as read-only.

use crate::utils::errors::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Kind of backup performed by a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BackupType {
    /// Copy every source file unconditionally
    #[default]
    Full,
    /// Copy only files that are new or changed relative to the target
    Differential,
}

/// One user-defined backup task
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupJob {
    /// Unique positive identifier assigned by the job store
    pub id: u32,

    pub name: String,

    pub source_directory: PathBuf,

    pub target_directory: PathBuf,

    #[serde(rename = "type", default)]
    pub backup_type: BackupType,

    #[serde(default)]
    pub encryption_enabled: bool,

    /// Required when `encryption_enabled` is set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_key: Option<String>,

    /// Extensions to encrypt (case-insensitive). Empty means every file.
    #[serde(default)]
    pub extensions_to_encrypt: Vec<String>,
}

impl BackupJob {
    /// Create a job with encryption disabled
    pub fn new(
        id: u32,
        name: impl Into<String>,
        source_directory: impl Into<PathBuf>,
        target_directory: impl Into<PathBuf>,
        backup_type: BackupType,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            source_directory: source_directory.into(),
            target_directory: target_directory.into(),
            backup_type,
            encryption_enabled: false,
            encryption_key: None,
            extensions_to_encrypt: Vec::new(),
        }
    }

    /// Enable encryption with the given key and extension filter
    pub fn with_encryption(mut self, key: impl Into<String>, extensions: Vec<String>) -> Self {
        self.encryption_enabled = true;
        self.encryption_key = Some(key.into());
        self.extensions_to_encrypt = extensions;
        self
    }

    /// Check the fields a run depends on.
    pub fn validate(&self) -> Result<()> {
        if self.id == 0 {
            return Err(EngineError::Config("job id must be positive".to_string()));
        }
        if self.name.trim().is_empty() {
            return Err(EngineError::Config(format!("job {} has no name", self.id)));
        }
        if self.source_directory.as_os_str().is_empty() {
            return Err(EngineError::Config(format!("job '{}' has no source directory", self.name)));
        }
        if self.target_directory.as_os_str().is_empty() {
            return Err(EngineError::Config(format!("job '{}' has no target directory", self.name)));
        }
        if self.encryption_enabled && self.key().is_none() {
            return Err(EngineError::Config(format!(
                "job '{}' enables encryption without a key",
                self.name
            )));
        }
        Ok(())
    }

    /// Encryption key, ignoring blank values
    pub fn key(&self) -> Option<&str> {
        self.encryption_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
    }
}
