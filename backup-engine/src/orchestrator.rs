//! Parallel orchestrator - one independent worker per job.
//!
//! Unbounded by default. `with_max_concurrent` adds admission control: every
//! execution is started at once but stays Idle until a semaphore permit frees
//! up, so only `n` engines run at the same time.

use crate::execution::JobExecution;
use crate::executor::BackupEngine;
use crate::job::BackupJob;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{info, warn};

pub struct ParallelOrchestrator {
    engine: BackupEngine,
    admission: Option<Arc<Semaphore>>,
    max_concurrent: Option<usize>,
}

impl ParallelOrchestrator {
    pub fn new(engine: BackupEngine) -> Self {
        Self {
            engine,
            admission: None,
            max_concurrent: None,
        }
    }

    /// Bound the number of simultaneously active workers (at least one)
    pub fn with_max_concurrent(engine: BackupEngine, max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            engine,
            admission: Some(Arc::new(Semaphore::new(max_concurrent))),
            max_concurrent: Some(max_concurrent),
        }
    }

    /// Start a fresh execution of `job` and return its handle.
    pub fn run_one(&self, job: BackupJob) -> JobExecution {
        let execution = JobExecution::new(job);
        if let Err(e) = execution.start_admitted(self.engine.clone(), self.admission.clone()) {
            // A fresh execution is always Idle
            warn!(job_id = execution.job_id(), error = %e, "Failed to start execution");
        }
        execution
    }

    /// Start one execution per job. Duplicate ids in `jobs` are skipped so a
    /// job never has two live runs from the same batch.
    pub fn run_all(&self, jobs: impl IntoIterator<Item = BackupJob>) -> Vec<JobExecution> {
        let mut seen = HashSet::new();
        let executions: Vec<JobExecution> = jobs
            .into_iter()
            .filter(|job| {
                let fresh = seen.insert(job.id);
                if !fresh {
                    warn!(job_id = job.id, "Duplicate job in batch, skipping");
                }
                fresh
            })
            .map(|job| self.run_one(job))
            .collect();

        info!(
            count = executions.len(),
            max_concurrent = self.max_concurrent,
            "Started executions"
        );
        executions
    }
}
