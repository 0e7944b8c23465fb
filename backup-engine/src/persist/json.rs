//! JSON file persisters.
//!
//! Every write goes to a sibling temporary file which is then renamed over the
//! destination, so readers only ever see a complete document.

use super::{LogEntry, LogPersister, StateEntry, StatePersister};
use crate::utils::errors::Result;
use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Writes the current `StateEntry` to a single JSON file
pub struct JsonStatePersister {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonStatePersister {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read back the last written snapshot, if any
    pub async fn read(&self) -> Result<Option<StateEntry>> {
        match fs::read_to_string(&self.path).await {
            Ok(content) if content.trim().is_empty() => Ok(None),
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl StatePersister for JsonStatePersister {
    async fn write(&self, entry: &StateEntry) -> Result<()> {
        let json = serde_json::to_vec_pretty(entry)?;

        let _guard = self.lock.lock().await;
        write_atomic(&self.path, &json).await?;
        Ok(())
    }
}

/// Appends `LogEntry` records to one JSON array file per calendar day
pub struct JsonLogPersister {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl JsonLogPersister {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            lock: Mutex::new(()),
        }
    }

    /// Daily file holding entries stamped at `timestamp` (`YYYY-MM-DD.json`)
    pub fn file_for(&self, timestamp: DateTime<Utc>) -> PathBuf {
        let day = timestamp.with_timezone(&Local).format("%Y-%m-%d");
        self.dir.join(format!("{day}.json"))
    }

    /// Read every entry of the day containing `timestamp`
    pub async fn read_day(&self, timestamp: DateTime<Utc>) -> Result<Vec<LogEntry>> {
        read_entries(&self.file_for(timestamp)).await
    }
}

#[async_trait]
impl LogPersister for JsonLogPersister {
    async fn append(&self, entry: &LogEntry) -> Result<()> {
        let path = self.file_for(entry.timestamp);

        let _guard = self.lock.lock().await;
        let mut entries = read_entries(&path).await?;
        entries.push(entry.clone());
        let json = serde_json::to_vec_pretty(&entries)?;
        write_atomic(&path, &json).await?;
        Ok(())
    }
}

async fn read_entries(path: &Path) -> Result<Vec<LogEntry>> {
    match fs::read_to_string(path).await {
        Ok(content) if content.trim().is_empty() => Ok(Vec::new()),
        Ok(content) => Ok(serde_json::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

/// Write `bytes` to a temporary sibling, flush it, then rename it over `path`.
pub(super) async fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).await?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let mut file = fs::File::create(&tmp).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    drop(file);

    fs::rename(&tmp, path).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::RunState;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_state_overwrites_single_file() -> Result<()> {
        let dir = TempDir::new()?;
        let persister = JsonStatePersister::new(dir.path().join("nested/state.json"));

        assert!(persister.read().await?.is_none());

        let mut entry = StateEntry::new("docs", RunState::Active);
        entry.total_files = 2;
        persister.write(&entry).await?;

        entry.state = RunState::Completed;
        entry.progress_pct = 100;
        persister.write(&entry).await?;

        let back = persister.read().await?.expect("state written");
        assert_eq!(back.state, RunState::Completed);
        assert_eq!(back.progress_pct, 100);
        assert!(!dir.path().join("nested/state.json.tmp").exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_state_writes_leave_one_complete_snapshot() -> Result<()> {
        let dir = TempDir::new()?;
        let persister = Arc::new(JsonStatePersister::new(dir.path().join("state.json")));

        let mut handles = Vec::new();
        for i in 0..20u64 {
            let persister = Arc::clone(&persister);
            handles.push(tokio::spawn(async move {
                let mut entry = StateEntry::new(&format!("job-{i}"), RunState::Active);
                entry.total_files = i;
                entry.files_remaining = i;
                persister.write(&entry).await
            }));
        }
        for handle in handles {
            handle.await.expect("write task panicked")?;
        }

        let back = persister.read().await?.expect("state written");
        assert!(back.total_files < 20);
        assert_eq!(back.backup_name, format!("job-{}", back.total_files));
        assert_eq!(back.files_remaining, back.total_files);
        assert!(!dir.path().join("state.json.tmp").exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_log_appends_to_daily_array() -> Result<()> {
        let dir = TempDir::new()?;
        let persister = JsonLogPersister::new(dir.path());

        let first = LogEntry::transfer("docs", "/s/a".into(), "/t/a".into(), 100, 4);
        let second = LogEntry::failure("docs", "/s/b".into(), "/t/b".into(), 50, "denied");
        persister.append(&first).await?;
        persister.append(&second).await?;

        let path = persister.file_for(first.timestamp);
        assert!(path.exists());
        let raw = std::fs::read_to_string(&path)?;
        assert!(raw.trim_start().starts_with('['));

        let entries = persister.read_day(first.timestamp).await?;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0], first);
        assert_eq!(entries[1].transfer_time_ms, -1);
        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_appends_are_not_lost() -> Result<()> {
        let dir = TempDir::new()?;
        let persister = Arc::new(JsonLogPersister::new(dir.path()));

        let mut handles = Vec::new();
        for i in 0..20u64 {
            let persister = Arc::clone(&persister);
            handles.push(tokio::spawn(async move {
                let entry = LogEntry::transfer(
                    &format!("job-{}", i % 4),
                    format!("/s/{i}").into(),
                    format!("/t/{i}").into(),
                    i,
                    1,
                );
                persister.append(&entry).await
            }));
        }
        for handle in handles {
            handle.await.expect("append task panicked")?;
        }

        let entries = persister.read_day(Utc::now()).await?;
        assert_eq!(entries.len(), 20);
        Ok(())
    }
}
