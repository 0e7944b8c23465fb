//! Command handlers: run, list, status.

use crate::selection::{parse_selection, resolve};
use anyhow::{bail, Result};
use backup_engine::persist::JsonStatePersister;
use backup_engine::transfer::progress::format_bytes;
use backup_engine::{
    AppSettings, BackupJob, ExecutionEvent, ExecutionSnapshot, ExecutionState, JobExecution,
    ParallelOrchestrator,
};
use futures_util::future::join_all;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Which jobs a `run` command targets
pub enum Target {
    All,
    Selection(String),
}

/// Runs selected jobs through the orchestrator and reports their progress
pub struct Runner {
    orchestrator: ParallelOrchestrator,
    settings: AppSettings,
    shutdown: CancellationToken,
}

impl Runner {
    pub fn new(
        orchestrator: ParallelOrchestrator,
        settings: AppSettings,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            orchestrator,
            settings,
            shutdown,
        }
    }

    /// Run the targeted jobs. Fails when any job finished Failed.
    pub async fn run(&self, jobs: &[BackupJob], target: Target, parallel: bool) -> Result<()> {
        let selected = match target {
            Target::All => jobs.to_vec(),
            Target::Selection(expr) => {
                let ids = parse_selection(&expr)?;
                let (found, missing) = resolve(&ids, jobs);
                for id in missing {
                    println!("Job {id} does not exist, skipping");
                }
                found
            }
        };

        if selected.is_empty() {
            println!("No jobs to run");
            return Ok(());
        }

        let selected: Vec<BackupJob> = selected
            .into_iter()
            .map(|mut job| {
                self.settings.apply_to(&mut job);
                job
            })
            .collect();

        info!(count = selected.len(), parallel, "Running jobs");

        let results = if parallel {
            let executions = self.orchestrator.run_all(selected);
            self.supervise(executions).await
        } else {
            let mut results = Vec::new();
            for job in selected {
                if self.shutdown.is_cancelled() {
                    println!("[{}] skipped, shutting down", job.name);
                    continue;
                }
                let execution = self.orchestrator.run_one(job);
                results.extend(self.supervise(vec![execution]).await);
            }
            results
        };

        print_summary(&results);

        let failed = results
            .iter()
            .filter(|(_, s)| s.state == ExecutionState::Failed)
            .count();
        if failed > 0 {
            bail!("{failed} job(s) failed");
        }
        Ok(())
    }

    /// Print progress until every execution is terminal; a shutdown signal
    /// stops them all first.
    async fn supervise(&self, executions: Vec<JobExecution>) -> Vec<(String, ExecutionSnapshot)> {
        let printers: Vec<JoinHandle<()>> = executions.iter().map(spawn_printer).collect();

        let waits = join_all(executions.iter().map(|e| e.wait()));
        tokio::pin!(waits);

        let snapshots = tokio::select! {
            snapshots = &mut waits => snapshots,
            _ = self.shutdown.cancelled() => {
                for execution in &executions {
                    if let Err(e) = execution.stop() {
                        warn!(job_id = execution.job_id(), error = %e, "Stop ignored");
                    }
                }
                waits.await
            }
        };

        for printer in printers {
            printer.abort();
        }

        executions
            .iter()
            .map(|e| e.job().name.clone())
            .zip(snapshots)
            .collect()
    }
}

fn spawn_printer(execution: &JobExecution) -> JoinHandle<()> {
    let mut events = execution.subscribe();
    let name = execution.job().name.clone();

    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(ExecutionEvent::CurrentFile {
                    file_name,
                    files_remaining,
                    total_files,
                    ..
                }) => {
                    let index = total_files.saturating_sub(files_remaining) + 1;
                    println!("[{name}] {index}/{total_files} {file_name}");
                }
                Ok(ExecutionEvent::Progress { progress_pct, .. }) => {
                    println!("[{name}] {progress_pct}%");
                }
                Ok(ExecutionEvent::StateChanged { state, .. }) => {
                    println!("[{name}] {state}");
                    if state.is_terminal() {
                        break;
                    }
                }
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn print_summary(results: &[(String, ExecutionSnapshot)]) {
    println!();
    for (name, snapshot) in results {
        match &snapshot.error {
            Some(error) => println!("{name}: {} ({error})", snapshot.state),
            None => println!(
                "{name}: {} - {}/{} files",
                snapshot.state,
                snapshot.total_files.saturating_sub(snapshot.files_remaining),
                snapshot.total_files
            ),
        }
    }
}

/// Print every configured job
pub fn list(jobs: &[BackupJob]) {
    if jobs.is_empty() {
        println!("No jobs configured");
        return;
    }

    for job in jobs {
        let encryption = if job.encryption_enabled {
            "encrypted"
        } else {
            "plain"
        };
        println!(
            "{:>3}  {:<20} {:?} ({encryption})  {} -> {}",
            job.id,
            job.name,
            job.backup_type,
            job.source_directory.display(),
            job.target_directory.display()
        );
    }
}

/// Print the last state snapshot written by any job
pub async fn status(state: &JsonStatePersister) -> Result<()> {
    let Some(entry) = state.read().await? else {
        println!("No backup has run yet");
        return Ok(());
    };

    println!("Job:        {}", entry.backup_name);
    println!("State:      {:?}", entry.state);
    println!("Updated:    {}", entry.timestamp.to_rfc3339());
    println!("Progress:   {}%", entry.progress_pct);
    println!(
        "Files:      {} of {} remaining",
        entry.files_remaining, entry.total_files
    );
    println!(
        "Size:       {} of {} remaining",
        format_bytes(entry.size_remaining_bytes),
        format_bytes(entry.total_size_bytes)
    );
    if !entry.current_source_path.as_os_str().is_empty() {
        println!(
            "Current:    {} -> {}",
            entry.current_source_path.display(),
            entry.current_target_path.display()
        );
    }
    Ok(())
}
