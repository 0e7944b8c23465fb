//! Durable sinks for live state and per-transfer history.
//!
//! `StatePersister` holds one near-real-time snapshot of a run; `LogPersister`
//! appends one record per attempted file transfer, grouped by calendar day.
//! Both are shared by every worker and must serialize concurrent writers.

pub mod json;
pub mod memory;
pub mod xml;

use crate::utils::errors::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub use json::{JsonLogPersister, JsonStatePersister};
pub use memory::{MemoryLogPersister, MemoryStatePersister};
pub use xml::XmlLogPersister;

/// Sentinel transfer time recorded for a failed operation
pub const FAILED_TRANSFER_MS: i64 = -1;

/// Run state recorded in a `StateEntry`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Active,
    Completed,
    Failed,
    Stopped,
    Blocked,
}

/// Snapshot of a run written to the single state location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateEntry {
    pub timestamp: DateTime<Utc>,
    pub backup_name: String,
    pub state: RunState,
    pub total_files: u64,
    pub total_size_bytes: u64,
    pub files_remaining: u64,
    pub size_remaining_bytes: u64,
    /// Always within 0..=100
    pub progress_pct: u8,
    pub current_source_path: PathBuf,
    pub current_target_path: PathBuf,
}

impl StateEntry {
    /// Zeroed entry for a job in the given state
    pub fn new(backup_name: &str, state: RunState) -> Self {
        Self {
            timestamp: Utc::now(),
            backup_name: backup_name.to_string(),
            state,
            total_files: 0,
            total_size_bytes: 0,
            files_remaining: 0,
            size_remaining_bytes: 0,
            progress_pct: 0,
            current_source_path: PathBuf::new(),
            current_target_path: PathBuf::new(),
        }
    }
}

/// One attempted file transfer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub backup_name: String,
    pub source_path: PathBuf,
    pub target_path: PathBuf,
    pub file_size_bytes: u64,
    /// Negative when the operation failed
    pub transfer_time_ms: i64,
    /// Present when the file was handed to the encryptor; negative on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_time_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LogEntry {
    pub fn transfer(
        backup_name: &str,
        source_path: PathBuf,
        target_path: PathBuf,
        file_size_bytes: u64,
        transfer_time_ms: i64,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            backup_name: backup_name.to_string(),
            source_path,
            target_path,
            file_size_bytes,
            transfer_time_ms,
            encryption_time_ms: None,
            error: None,
        }
    }

    /// Record of a failed operation
    pub fn failure(
        backup_name: &str,
        source_path: PathBuf,
        target_path: PathBuf,
        file_size_bytes: u64,
        error: impl Into<String>,
    ) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::transfer(
                backup_name,
                source_path,
                target_path,
                file_size_bytes,
                FAILED_TRANSFER_MS,
            )
        }
    }

    pub fn is_failure(&self) -> bool {
        self.transfer_time_ms < 0
    }
}

/// Sink for the live state snapshot.
///
/// Called once per file; a crash must leave either the previous or the new
/// complete snapshot, never a partial one.
#[async_trait]
pub trait StatePersister: Send + Sync {
    async fn write(&self, entry: &StateEntry) -> Result<()>;
}

/// Day-partitioned transfer history
#[async_trait]
pub trait LogPersister: Send + Sync {
    async fn append(&self, entry: &LogEntry) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_entry_serialization() {
        let entry = StateEntry::new("docs", RunState::Blocked);
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"backupName\":\"docs\""));
        assert!(json.contains("\"state\":\"Blocked\""));
        assert!(json.contains("\"progressPct\":0"));

        let back: StateEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn test_log_entry_optional_fields() {
        let entry = LogEntry::transfer("docs", "/s/a".into(), "/t/a".into(), 10, 3);
        let json = serde_json::to_string(&entry).unwrap();
        assert!(!json.contains("encryptionTimeMs"));
        assert!(!json.contains("error"));
        assert!(!entry.is_failure());

        let failed = LogEntry::failure("docs", "/s/a".into(), "/t/a".into(), 10, "denied");
        assert_eq!(failed.transfer_time_ms, FAILED_TRANSFER_MS);
        assert!(failed.is_failure());
        assert_eq!(failed.error.as_deref(), Some("denied"));
    }
}
