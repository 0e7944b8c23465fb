//! Job execution handle - one concurrent worker per run.
//!
//! A `JobExecution` owns the run's cancellation token, its pause gate and the
//! observable snapshot. Control operations (pause/resume/stop) and observers
//! (snapshot, events, wait) work from any task; only the worker mutates the
//! counters.
//!
//! State machine:
//!
//! ```text
//! Idle -> Active <-> Paused
//!           |          |
//!           v          v
//!   Completed | Failed | Stopped | Blocked
//! ```
//!
//! Stop is also valid from Idle and finishes the execution as Stopped
//! without ever running it.

use crate::executor::{BackupEngine, RunOutcome};
use crate::job::BackupJob;
use crate::utils::errors::{EngineError, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, watch, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Instrument};
use uuid::Uuid;

/// Buffered events per execution before slow subscribers start lagging
const EVENT_CAPACITY: usize = 256;

/// Lifecycle of a single job run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExecutionState {
    Idle,
    Active,
    Paused,
    Completed,
    Failed,
    Stopped,
    Blocked,
}

impl ExecutionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExecutionState::Completed
                | ExecutionState::Failed
                | ExecutionState::Stopped
                | ExecutionState::Blocked
        )
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl From<RunOutcome> for ExecutionState {
    fn from(outcome: RunOutcome) -> Self {
        match outcome {
            RunOutcome::Completed => ExecutionState::Completed,
            RunOutcome::Stopped => ExecutionState::Stopped,
            RunOutcome::Blocked => ExecutionState::Blocked,
        }
    }
}

/// Current observable values of an execution
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionSnapshot {
    pub state: ExecutionState,
    pub total_files: u64,
    pub files_remaining: u64,
    pub progress_pct: u8,
    /// File name only, not the full path
    pub current_file: Option<String>,
    /// Set when the run finished Failed
    pub error: Option<String>,
}

impl Default for ExecutionSnapshot {
    fn default() -> Self {
        Self {
            state: ExecutionState::Idle,
            total_files: 0,
            files_remaining: 0,
            progress_pct: 0,
            current_file: None,
            error: None,
        }
    }
}

/// Change notification published by an execution
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all_fields = "camelCase")]
pub enum ExecutionEvent {
    #[serde(rename = "job:state")]
    StateChanged { job_id: u32, state: ExecutionState },

    #[serde(rename = "job:progress")]
    Progress {
        job_id: u32,
        progress_pct: u8,
        files_remaining: u64,
    },

    #[serde(rename = "job:file")]
    CurrentFile {
        job_id: u32,
        file_name: String,
        files_remaining: u64,
        total_files: u64,
    },
}

/// Reporter handed to the engine for one run
#[async_trait]
pub trait ProgressSink: Send + Sync {
    /// Called before `path` is touched
    fn on_file_started(&self, path: &Path, files_remaining: u64, total_files: u64);

    /// Called after each file with the recomputed percentage
    fn on_progress(&self, progress_pct: u8, files_remaining: u64);

    fn is_cancelled(&self) -> bool;

    /// Returns immediately unless paused; a Stop also releases the wait.
    async fn wait_if_paused(&self);
}

struct Inner {
    job: BackupJob,
    run_id: Uuid,
    cancel: CancellationToken,
    /// true = open (running), false = paused
    gate: watch::Sender<bool>,
    snapshot: watch::Sender<ExecutionSnapshot>,
    events: broadcast::Sender<ExecutionEvent>,
    started: AtomicBool,
}

/// Handle to one run of a job. Clones share the same run.
#[derive(Clone)]
pub struct JobExecution {
    inner: Arc<Inner>,
}

impl JobExecution {
    /// Create an Idle execution for `job`
    pub fn new(job: BackupJob) -> Self {
        let (gate, _) = watch::channel(true);
        let (snapshot, _) = watch::channel(ExecutionSnapshot::default());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            inner: Arc::new(Inner {
                job,
                run_id: Uuid::new_v4(),
                cancel: CancellationToken::new(),
                gate,
                snapshot,
                events,
                started: AtomicBool::new(false),
            }),
        }
    }

    pub fn job(&self) -> &BackupJob {
        &self.inner.job
    }

    pub fn job_id(&self) -> u32 {
        self.inner.job.id
    }

    pub fn run_id(&self) -> Uuid {
        self.inner.run_id
    }

    pub fn state(&self) -> ExecutionState {
        self.inner.snapshot.borrow().state
    }

    pub fn snapshot(&self) -> ExecutionSnapshot {
        self.inner.snapshot.borrow().clone()
    }

    /// Receive every change published after this call
    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.inner.events.subscribe()
    }

    /// Watch the snapshot for polling readers
    pub fn watch(&self) -> watch::Receiver<ExecutionSnapshot> {
        self.inner.snapshot.subscribe()
    }

    /// Idle -> Active, spawning the worker on the current runtime.
    pub fn start(&self, engine: BackupEngine) -> Result<()> {
        self.start_admitted(engine, None)
    }

    /// Start the worker; with `admission` it stays Idle until a permit is free.
    pub(crate) fn start_admitted(
        &self,
        engine: BackupEngine,
        admission: Option<Arc<Semaphore>>,
    ) -> Result<()> {
        let state = self.state();
        if state != ExecutionState::Idle || self.inner.started.swap(true, Ordering::SeqCst) {
            return Err(EngineError::InvalidTransition {
                from: state.to_string(),
                action: "start",
            });
        }

        if admission.is_none() {
            self.activate()?;
        }

        let span = tracing::info_span!(
            "job",
            job_id = self.job_id(),
            run_id = %self.run_id(),
        );
        tokio::spawn(self.clone().drive(engine, admission).instrument(span));
        Ok(())
    }

    /// Active -> Paused. Takes effect once the in-flight file finishes.
    pub fn pause(&self) -> Result<()> {
        if self.inner.cancel.is_cancelled() {
            return Err(EngineError::InvalidTransition {
                from: "stopping".to_string(),
                action: "pause",
            });
        }
        self.transition("pause", |s| s == ExecutionState::Active, ExecutionState::Paused)?;
        self.inner.gate.send_replace(false);
        info!(job_id = self.job_id(), "Pause requested");
        Ok(())
    }

    /// Paused -> Active
    pub fn resume(&self) -> Result<()> {
        self.transition("resume", |s| s == ExecutionState::Paused, ExecutionState::Active)?;
        self.inner.gate.send_replace(true);
        info!(job_id = self.job_id(), "Resumed");
        Ok(())
    }

    /// Request a cooperative stop from any non-terminal state.
    ///
    /// An Idle execution becomes Stopped at once. A running worker finishes
    /// its in-flight file, then ends Stopped.
    pub fn stop(&self) -> Result<()> {
        let state = self.state();
        if state.is_terminal() {
            return Err(EngineError::InvalidTransition {
                from: state.to_string(),
                action: "stop",
            });
        }

        self.inner.cancel.cancel();
        self.inner.gate.send_replace(true);
        let _ = self.transition("stop", |s| s == ExecutionState::Idle, ExecutionState::Stopped);
        info!(job_id = self.job_id(), "Stop requested");
        Ok(())
    }

    /// Wait for a terminal state and return the final snapshot.
    ///
    /// Never resolves for an execution that is neither started nor stopped.
    pub async fn wait(&self) -> ExecutionSnapshot {
        let mut rx = self.inner.snapshot.subscribe();
        let last = match rx.wait_for(|s| s.state.is_terminal()).await {
            Ok(snapshot) => snapshot.clone(),
            Err(_) => self.snapshot(),
        };
        last
    }

    async fn drive(self, engine: BackupEngine, admission: Option<Arc<Semaphore>>) {
        let _permit = match admission {
            Some(semaphore) => {
                tokio::select! {
                    permit = semaphore.acquire_owned() => match permit {
                        Ok(permit) => Some(permit),
                        Err(_) => {
                            self.finish(ExecutionState::Failed, Some("admission closed".to_string()));
                            return;
                        }
                    },
                    _ = self.inner.cancel.cancelled() => {
                        self.finish(ExecutionState::Stopped, None);
                        return;
                    }
                }
            }
            None => None,
        };

        if self.state() == ExecutionState::Idle && self.activate().is_err() {
            return;
        }
        if self.state().is_terminal() {
            return;
        }

        let reporter = ExecutionReporter {
            execution: self.clone(),
        };
        let job = self.inner.job.clone();

        // Inner task so a panicking run still reaches a terminal state
        let run = tokio::spawn(
            async move { engine.run(&job, &reporter).await }.in_current_span(),
        );

        match run.await {
            Ok(Ok(outcome)) => self.finish(outcome.into(), None),
            Ok(Err(e)) => self.finish(ExecutionState::Failed, Some(e.to_string())),
            Err(e) => {
                warn!(job_id = self.job_id(), error = %e, "Worker task aborted");
                self.finish(ExecutionState::Failed, Some(format!("worker task failed: {e}")));
            }
        }
    }

    fn activate(&self) -> Result<()> {
        self.transition("start", |s| s == ExecutionState::Idle, ExecutionState::Active)
    }

    fn transition(
        &self,
        action: &'static str,
        allowed: impl FnOnce(ExecutionState) -> bool,
        to: ExecutionState,
    ) -> Result<()> {
        let mut result = Ok(());
        let changed = self.inner.snapshot.send_if_modified(|snap| {
            if allowed(snap.state) {
                snap.state = to;
                true
            } else {
                result = Err(EngineError::InvalidTransition {
                    from: snap.state.to_string(),
                    action,
                });
                false
            }
        });

        if changed {
            self.publish(ExecutionEvent::StateChanged {
                job_id: self.job_id(),
                state: to,
            });
        }
        result
    }

    /// Move to a terminal state unless one was already reached.
    fn finish(&self, state: ExecutionState, error: Option<String>) {
        let changed = self.inner.snapshot.send_if_modified(|snap| {
            if snap.state.is_terminal() {
                return false;
            }
            snap.state = state;
            snap.error = error;
            if state == ExecutionState::Completed {
                snap.files_remaining = 0;
                snap.progress_pct = 100;
            }
            true
        });

        if changed {
            info!(job_id = self.job_id(), state = %state, "Execution finished");
            self.publish(ExecutionEvent::StateChanged {
                job_id: self.job_id(),
                state,
            });
        }
    }

    fn publish(&self, event: ExecutionEvent) {
        // No subscribers is fine
        let _ = self.inner.events.send(event);
    }
}

/// `ProgressSink` bound to one execution
struct ExecutionReporter {
    execution: JobExecution,
}

#[async_trait]
impl ProgressSink for ExecutionReporter {
    fn on_file_started(&self, path: &Path, files_remaining: u64, total_files: u64) {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        self.execution.inner.snapshot.send_modify(|snap| {
            snap.current_file = Some(file_name.clone());
            snap.files_remaining = files_remaining;
            snap.total_files = total_files;
        });
        self.execution.publish(ExecutionEvent::CurrentFile {
            job_id: self.execution.job_id(),
            file_name,
            files_remaining,
            total_files,
        });
    }

    fn on_progress(&self, progress_pct: u8, files_remaining: u64) {
        self.execution.inner.snapshot.send_modify(|snap| {
            snap.progress_pct = progress_pct;
            snap.files_remaining = files_remaining;
        });
        self.execution.publish(ExecutionEvent::Progress {
            job_id: self.execution.job_id(),
            progress_pct,
            files_remaining,
        });
    }

    fn is_cancelled(&self) -> bool {
        self.execution.inner.cancel.is_cancelled()
    }

    async fn wait_if_paused(&self) {
        let inner = &self.execution.inner;
        let mut gate = inner.gate.subscribe();
        tokio::select! {
            _ = gate.wait_for(|open| *open) => {}
            _ = inner.cancel.cancelled() => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encryption::{EncryptionGate, Encryptor};
    use crate::guard::NeverBlocked;
    use crate::job::BackupType;
    use crate::persist::{MemoryLogPersister, MemoryStatePersister, RunState};
    use std::fs;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Pauses the bound execution the first time it is asked to encrypt
    #[derive(Default)]
    struct PausingEncryptor {
        execution: Mutex<Option<JobExecution>>,
    }

    #[async_trait]
    impl Encryptor for PausingEncryptor {
        async fn encrypt(&self, _path: &Path, _key: &str) -> i64 {
            if let Some(execution) = self.execution.lock().unwrap().take() {
                execution.pause().unwrap();
            }
            0
        }
    }

    struct Fixture {
        dir: TempDir,
        log: Arc<MemoryLogPersister>,
        state: Arc<MemoryStatePersister>,
    }

    impl Fixture {
        fn new(files: usize) -> Self {
            let dir = TempDir::new().unwrap();
            let src = dir.path().join("src");
            fs::create_dir_all(&src).unwrap();
            for i in 0..files {
                fs::write(src.join(format!("f{i:02}.txt")), vec![b'x'; 10]).unwrap();
            }
            Self {
                dir,
                log: Arc::new(MemoryLogPersister::new()),
                state: Arc::new(MemoryStatePersister::new()),
            }
        }

        fn job(&self) -> BackupJob {
            BackupJob::new(
                7,
                "exec",
                self.dir.path().join("src"),
                self.dir.path().join("dst"),
                BackupType::Full,
            )
        }

        fn engine(&self, encryptor: Arc<dyn Encryptor>) -> BackupEngine {
            BackupEngine::new(
                self.state.clone(),
                self.log.clone(),
                Arc::new(NeverBlocked),
                EncryptionGate::new(encryptor),
            )
        }
    }

    async fn wait_for_state(execution: &JobExecution, state: ExecutionState) {
        let mut rx = execution.watch();
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| s.state == state))
            .await
            .expect("timed out waiting for state")
            .unwrap();
    }

    #[tokio::test]
    async fn test_run_to_completion_publishes_events() {
        let fx = Fixture::new(3);
        let execution = JobExecution::new(fx.job());
        let mut events = execution.subscribe();

        execution.start(fx.engine(Arc::new(PausingEncryptor::default()))).unwrap();
        let last = execution.wait().await;

        assert_eq!(last.state, ExecutionState::Completed);
        assert_eq!(last.progress_pct, 100);
        assert_eq!(last.files_remaining, 0);
        assert_eq!(last.total_files, 3);
        assert!(last
            .current_file
            .as_deref()
            .is_some_and(|name| name.starts_with('f') && name.ends_with(".txt")));

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        assert_eq!(
            seen.first(),
            Some(&ExecutionEvent::StateChanged {
                job_id: 7,
                state: ExecutionState::Active
            })
        );
        assert_eq!(
            seen.last(),
            Some(&ExecutionEvent::StateChanged {
                job_id: 7,
                state: ExecutionState::Completed
            })
        );
        let files = seen
            .iter()
            .filter(|e| matches!(e, ExecutionEvent::CurrentFile { .. }))
            .count();
        assert_eq!(files, 3);
    }

    #[tokio::test]
    async fn test_pause_then_stop_ends_after_in_flight_file() {
        let fx = Fixture::new(5);
        let encryptor = Arc::new(PausingEncryptor::default());
        let job = fx.job().with_encryption("k", vec![]);
        let execution = JobExecution::new(job);
        *encryptor.execution.lock().unwrap() = Some(execution.clone());

        execution.start(fx.engine(encryptor)).unwrap();
        wait_for_state(&execution, ExecutionState::Paused).await;

        // Parked at the gate after the first file
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fx.log.entries().len(), 1);
        assert_eq!(execution.state(), ExecutionState::Paused);

        execution.stop().unwrap();
        let last = execution.wait().await;

        assert_eq!(last.state, ExecutionState::Stopped);
        assert_eq!(fx.log.entries().len(), 1);
        assert_eq!(fx.state.last().unwrap().state, RunState::Stopped);
    }

    #[tokio::test]
    async fn test_pause_resume_completes() {
        let fx = Fixture::new(4);
        let encryptor = Arc::new(PausingEncryptor::default());
        let execution = JobExecution::new(fx.job().with_encryption("k", vec![]));
        *encryptor.execution.lock().unwrap() = Some(execution.clone());

        execution.start(fx.engine(encryptor)).unwrap();
        wait_for_state(&execution, ExecutionState::Paused).await;

        assert!(execution.pause().is_err());
        execution.resume().unwrap();
        let last = execution.wait().await;

        assert_eq!(last.state, ExecutionState::Completed);
        assert_eq!(fx.log.entries().len(), 4);
    }

    #[tokio::test]
    async fn test_invalid_transitions() {
        let fx = Fixture::new(1);
        let execution = JobExecution::new(fx.job());

        assert!(matches!(
            execution.pause(),
            Err(EngineError::InvalidTransition { action: "pause", .. })
        ));
        assert!(execution.resume().is_err());

        execution.stop().unwrap();
        assert_eq!(execution.state(), ExecutionState::Stopped);
        assert_eq!(execution.wait().await.state, ExecutionState::Stopped);

        assert!(execution.start(fx.engine(Arc::new(PausingEncryptor::default()))).is_err());
        assert!(execution.stop().is_err());
        assert!(fx.log.entries().is_empty());
    }

    #[tokio::test]
    async fn test_double_start_rejected() {
        let fx = Fixture::new(1);
        let execution = JobExecution::new(fx.job());
        let engine = fx.engine(Arc::new(PausingEncryptor::default()));

        execution.start(engine.clone()).unwrap();
        assert!(execution.start(engine).is_err());
        assert_eq!(execution.wait().await.state, ExecutionState::Completed);
    }

    #[tokio::test]
    async fn test_engine_error_finishes_failed() {
        let fx = Fixture::new(0);
        let mut job = fx.job();
        job.source_directory = fx.dir.path().join("missing");
        let execution = JobExecution::new(job);

        execution.start(fx.engine(Arc::new(PausingEncryptor::default()))).unwrap();
        let last = execution.wait().await;

        assert_eq!(last.state, ExecutionState::Failed);
        assert!(last.error.unwrap().contains("not found"));
    }

    #[test]
    fn test_event_serialization() {
        let event = ExecutionEvent::Progress {
            job_id: 1,
            progress_pct: 40,
            files_remaining: 3,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "job:progress");
        assert_eq!(json["payload"]["progressPct"], 40);
        assert_eq!(json["payload"]["jobId"], 1);
        assert_eq!(json["payload"]["filesRemaining"], 3);

        let file = ExecutionEvent::CurrentFile {
            job_id: 2,
            file_name: "a.txt".to_string(),
            files_remaining: 1,
            total_files: 2,
        };
        let json = serde_json::to_value(&file).unwrap();
        assert_eq!(json["type"], "job:file");
        assert_eq!(json["payload"]["fileName"], "a.txt");
        assert_eq!(json["payload"]["totalFiles"], 2);
        assert!(json["payload"].get("file_name").is_none());
    }
}
