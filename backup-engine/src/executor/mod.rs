//! Backup engine - runs one job end-to-end.
//!
//! Ties together:
//! - Business-software guard (checked once, at job start)
//! - File selection (full or differential)
//! - Copy with timing, selective encryption
//! - State and log persistence, progress reporting
//!
//! Concurrency lives one level up in `JobExecution`; the engine itself is a
//! plain sequential loop that honors the reporter's cancellation signal and
//! pause gate between files.

pub mod selection;

use crate::encryption::EncryptionGate;
use crate::execution::ProgressSink;
use crate::fs::copy::{copy_file, sync_mtime};
use crate::guard::BusinessSoftwareGuard;
use crate::job::BackupJob;
use crate::persist::{LogEntry, LogPersister, RunState, StateEntry, StatePersister};
use crate::transfer::progress::{format_bytes, TransferProgress};
use crate::utils::errors::{EngineError, Result};
use chrono::Utc;
use selection::{select_files, SelectedFile};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Error text recorded when the guard refuses a run
pub const BLOCKED_MESSAGE: &str = "blocked by business software";

/// How a run that did not fail came to an end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Stopped,
    Blocked,
}

impl RunOutcome {
    pub fn run_state(self) -> RunState {
        match self {
            RunOutcome::Completed => RunState::Completed,
            RunOutcome::Stopped => RunState::Stopped,
            RunOutcome::Blocked => RunState::Blocked,
        }
    }
}

/// Runs backup jobs against shared persisters, guard and encryptor.
///
/// Cheap to clone; every worker gets its own handle to the same sinks.
#[derive(Clone)]
pub struct BackupEngine {
    state: Arc<dyn StatePersister>,
    log: Arc<dyn LogPersister>,
    guard: Arc<dyn BusinessSoftwareGuard>,
    encryption: EncryptionGate,
}

impl BackupEngine {
    pub fn new(
        state: Arc<dyn StatePersister>,
        log: Arc<dyn LogPersister>,
        guard: Arc<dyn BusinessSoftwareGuard>,
        encryption: EncryptionGate,
    ) -> Self {
        Self {
            state,
            log,
            guard,
            encryption,
        }
    }

    /// Run `job` to a terminal outcome.
    ///
    /// Per-file failures are logged and skipped. Errors that prevent the run
    /// from proceeding (invalid job, unreadable source, target root cannot be
    /// created) are recorded as a Failed state plus one failure log entry and
    /// then returned.
    pub async fn run(&self, job: &BackupJob, reporter: &dyn ProgressSink) -> Result<RunOutcome> {
        if self.is_blocked().await {
            info!(job = %job.name, "Backup refused, business software is running");
            self.record_blocked(job).await;
            return Ok(RunOutcome::Blocked);
        }

        match self.execute(job, reporter).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                error!(job = %job.name, error = %e, "Backup failed");
                self.record_failure(job, &e).await;
                Err(e)
            }
        }
    }

    async fn execute(&self, job: &BackupJob, reporter: &dyn ProgressSink) -> Result<RunOutcome> {
        job.validate()?;

        let selection = {
            let job = job.clone();
            tokio::task::spawn_blocking(move || select_files(&job))
                .await
                .map_err(|e| EngineError::Join(e.to_string()))??
        };

        tokio::fs::create_dir_all(&job.target_directory)
            .await
            .map_err(|source| EngineError::TargetCreation {
                path: job.target_directory.clone(),
                source,
            })?;

        info!(
            job = %job.name,
            kind = ?job.backup_type,
            files = selection.len(),
            size = %format_bytes(selection.total_bytes),
            "Starting backup"
        );

        let started = Instant::now();
        let mut progress = TransferProgress::new(selection.total_bytes, selection.len() as u64);
        let mut state = StateEntry::new(&job.name, RunState::Active);
        apply_progress(&mut state, &progress);
        if !selection.is_empty() {
            state.progress_pct = 0;
        }
        self.persist_state(&state).await;

        for file in &selection.files {
            if reporter.is_cancelled() {
                info!(job = %job.name, remaining = progress.files_remaining, "Stop requested, skipping remaining files");
                break;
            }

            reporter.on_file_started(&file.source, progress.files_remaining, progress.total_files);
            state.current_source_path = file.source.clone();
            state.current_target_path = file.target.clone();

            let entry = self.transfer_file(job, file).await;
            self.append_log(&entry).await;

            progress.file_done(file.size);
            apply_progress(&mut state, &progress);
            self.persist_state(&state).await;
            reporter.on_progress(state.progress_pct, progress.files_remaining);

            reporter.wait_if_paused().await;
        }

        let outcome = if reporter.is_cancelled() {
            RunOutcome::Stopped
        } else {
            progress.complete();
            RunOutcome::Completed
        };

        apply_progress(&mut state, &progress);
        state.state = outcome.run_state();
        self.persist_state(&state).await;

        info!(
            job = %job.name,
            outcome = ?outcome,
            processed = progress.files_processed(),
            total = progress.total_files,
            duration_ms = started.elapsed().as_millis() as u64,
            "Backup finished"
        );

        Ok(outcome)
    }

    /// Copy one file and encrypt it when in scope. Never fails the run.
    async fn transfer_file(&self, job: &BackupJob, file: &SelectedFile) -> LogEntry {
        let started = Instant::now();
        let bytes = match copy_file(&file.source, &file.target).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(file = %file.source.display(), error = %e, "Failed to copy file");
                return LogEntry::failure(
                    &job.name,
                    file.source.clone(),
                    file.target.clone(),
                    file.size,
                    e.to_string(),
                );
            }
        };
        let elapsed = started.elapsed().as_millis() as i64;
        debug!(file = %file.relative_path.display(), bytes, elapsed_ms = elapsed, "Copied");

        let mut entry = LogEntry::transfer(
            &job.name,
            file.source.clone(),
            file.target.clone(),
            bytes,
            elapsed,
        );

        if let Some(key) = job.key() {
            if self.encryption.should_encrypt(&file.target, job) {
                let encryption_ms = self.encryption.encrypt(&file.target, key).await;
                if encryption_ms < 0 {
                    warn!(file = %file.target.display(), code = encryption_ms, "Encryption failed, copy kept");
                } else {
                    // Encrypting in place bumps the target mtime
                    sync_mtime(&file.source, &file.target).await;
                }
                entry.encryption_time_ms = Some(encryption_ms);
            }
        }

        entry
    }

    async fn is_blocked(&self) -> bool {
        let guard = Arc::clone(&self.guard);
        match tokio::task::spawn_blocking(move || guard.is_blocked()).await {
            Ok(blocked) => blocked,
            Err(e) => {
                error!(error = %e, "Business software check panicked, refusing to run");
                true
            }
        }
    }

    async fn record_blocked(&self, job: &BackupJob) {
        self.persist_state(&StateEntry::new(&job.name, RunState::Blocked))
            .await;
        self.append_log(&LogEntry::failure(
            &job.name,
            job.source_directory.clone(),
            job.target_directory.clone(),
            0,
            BLOCKED_MESSAGE,
        ))
        .await;
    }

    async fn record_failure(&self, job: &BackupJob, err: &EngineError) {
        self.persist_state(&StateEntry::new(&job.name, RunState::Failed))
            .await;
        self.append_log(&LogEntry::failure(
            &job.name,
            job.source_directory.clone(),
            job.target_directory.clone(),
            0,
            err.to_string(),
        ))
        .await;
    }

    async fn persist_state(&self, entry: &StateEntry) {
        if let Err(e) = self.state.write(entry).await {
            warn!(job = %entry.backup_name, error = %e, "Failed to persist state");
        }
    }

    async fn append_log(&self, entry: &LogEntry) {
        if let Err(e) = self.log.append(entry).await {
            warn!(job = %entry.backup_name, error = %e, "Failed to append log entry");
        }
    }
}

fn apply_progress(state: &mut StateEntry, progress: &TransferProgress) {
    state.timestamp = Utc::now();
    state.total_files = progress.total_files;
    state.total_size_bytes = progress.total_bytes;
    state.files_remaining = progress.files_remaining;
    state.size_remaining_bytes = progress.bytes_remaining;
    state.progress_pct = progress.percent();
}
