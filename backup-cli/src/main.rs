//! easysave - command-line front end for the backup engine.
//!
//! Loads jobs and settings, builds the engine with its persisters, process
//! guard and external encryptor, then runs the selected jobs.

mod commands;
mod config;
mod logger;
mod selection;
mod shutdown;

use anyhow::Result;
use backup_engine::persist::{JsonLogPersister, JsonStatePersister, XmlLogPersister};
use backup_engine::{
    AppSettings, BackupEngine, BusinessSoftwareGuard, EncryptionGate, JobSource, JsonJobSource,
    LogPersister, NeverBlocked, ParallelOrchestrator, ProcessEncryptor, ProcessGuard,
};
use clap::{Parser, Subcommand};
use commands::{Runner, Target};
use config::Config;
use shutdown::ShutdownCoordinator;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run jobs by id: "1", "1,3", "1;3" or "1-3"
    Run {
        /// Job selection expression
        #[arg(required_unless_present = "all")]
        selection: Option<String>,

        /// Run every configured job
        #[arg(long, conflicts_with = "selection")]
        all: bool,

        /// Run the selected jobs concurrently
        #[arg(short, long)]
        parallel: bool,
    },

    /// List configured jobs
    List,

    /// Show the last recorded backup state
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = if let Some(config_path) = &args.config {
        Config::from_file(config_path)?
    } else {
        Config::default()
    };

    // Initialize logging
    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    logger::init(log_level)?;

    tracing::debug!("Starting easysave v{}", env!("CARGO_PKG_VERSION"));

    let jobs = JsonJobSource::new(&config.paths.jobs_file).load_all()?;

    match args.command {
        Command::List => commands::list(&jobs),
        Command::Status => {
            commands::status(&JsonStatePersister::new(&config.paths.state_file)).await?
        }
        Command::Run {
            selection,
            all,
            parallel,
        } => {
            let settings = AppSettings::load(&config.paths.settings_file)?;
            let engine = build_engine(&config, &settings);

            let orchestrator = match config.run.max_concurrent_jobs {
                Some(max) => ParallelOrchestrator::with_max_concurrent(engine, max),
                None => ParallelOrchestrator::new(engine),
            };

            let shutdown = ShutdownCoordinator::new();
            shutdown.listen();

            let target = match selection {
                Some(expr) if !all => Target::Selection(expr),
                _ => Target::All,
            };

            Runner::new(orchestrator, settings, shutdown.token())
                .run(&jobs, target, parallel || config.run.parallel)
                .await?;
        }
    }

    Ok(())
}

fn build_engine(config: &Config, settings: &AppSettings) -> BackupEngine {
    let guard: Arc<dyn BusinessSoftwareGuard> = if settings.business_software.trim().is_empty() {
        Arc::new(NeverBlocked)
    } else {
        Arc::new(ProcessGuard::new(&settings.business_software))
    };

    BackupEngine::new(
        Arc::new(JsonStatePersister::new(&config.paths.state_file)),
        log_persister(&config.paths.log_dir, &settings.log_format),
        guard,
        EncryptionGate::new(Arc::new(ProcessEncryptor::new(
            config.encryption.program.clone(),
        ))),
    )
}

/// Daily log sink for the `log_format` setting; JSON unless "xml"
fn log_persister(log_dir: &Path, log_format: &str) -> Arc<dyn LogPersister> {
    match log_format.trim().to_lowercase().as_str() {
        "xml" => Arc::new(XmlLogPersister::new(log_dir)),
        "json" | "" => Arc::new(JsonLogPersister::new(log_dir)),
        other => {
            tracing::warn!(log_format = other, "Unknown log format, using json");
            Arc::new(JsonLogPersister::new(log_dir))
        }
    }
}
