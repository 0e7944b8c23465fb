//! Backup Engine Library
//!
//! Scheduled, resumable file-tree backups (full or differential) with per-job
//! pause/resume/stop control, live progress, selective encryption and a guard
//! that refuses to run while a business application is active.

pub mod encryption;
pub mod execution;
pub mod executor;
pub mod fs;
pub mod guard;
pub mod job;
pub mod orchestrator;
pub mod persist;
pub mod store;
pub mod transfer;
pub mod utils;

// Re-export commonly used types
pub use encryption::{EncryptionGate, Encryptor, ProcessEncryptor};
pub use execution::{ExecutionEvent, ExecutionSnapshot, ExecutionState, JobExecution, ProgressSink};
pub use executor::{BackupEngine, RunOutcome};
pub use guard::{BusinessSoftwareGuard, NeverBlocked, ProcessGuard};
pub use job::{BackupJob, BackupType};
pub use orchestrator::ParallelOrchestrator;
pub use persist::{LogEntry, LogPersister, RunState, StateEntry, StatePersister};
pub use store::{AppSettings, JobSource, JsonJobSource};
pub use utils::errors::EngineError;
pub type Result<T> = std::result::Result<T, EngineError>;
