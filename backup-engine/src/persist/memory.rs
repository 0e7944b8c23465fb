//! In-memory persisters.
//!
//! Keep every write so callers can inspect a run's full history of snapshots.

use super::{LogEntry, LogPersister, StateEntry, StatePersister};
use crate::utils::errors::Result;
use async_trait::async_trait;
use std::sync::Mutex;

#[derive(Default)]
pub struct MemoryStatePersister {
    writes: Mutex<Vec<StateEntry>>,
}

impl MemoryStatePersister {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every snapshot written so far, oldest first
    pub fn writes(&self) -> Vec<StateEntry> {
        self.writes.lock().map(|w| w.clone()).unwrap_or_default()
    }

    pub fn last(&self) -> Option<StateEntry> {
        self.writes.lock().ok().and_then(|w| w.last().cloned())
    }
}

#[async_trait]
impl StatePersister for MemoryStatePersister {
    async fn write(&self, entry: &StateEntry) -> Result<()> {
        if let Ok(mut writes) = self.writes.lock() {
            writes.push(entry.clone());
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryLogPersister {
    entries: Mutex<Vec<LogEntry>>,
}

impl MemoryLogPersister {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LogPersister for MemoryLogPersister {
    async fn append(&self, entry: &LogEntry) -> Result<()> {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(entry.clone());
        }
        Ok(())
    }
}
