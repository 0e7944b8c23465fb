//! Configuration management for the easysave CLI.
//!
//! Loads configuration from an optional TOML file. Every field has a default
//! under a base directory, so an empty file (or none at all) is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Base directory for every default path
const BASE_DIR: &str = "./easysave";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub log: LogConfig,
    pub encryption: EncryptionConfig,
    pub run: RunConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// JSON array of backup jobs
    #[serde(default = "default_jobs_file")]
    pub jobs_file: PathBuf,

    /// Application settings (language, log format, business software, ...)
    #[serde(default = "default_settings_file")]
    pub settings_file: PathBuf,

    /// Live state snapshot shared by every job
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,

    /// Directory holding one transfer log per day
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EncryptionConfig {
    /// External encryptor program, invoked as `<program> <file> <key>`
    #[serde(default)]
    pub program: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunConfig {
    /// Run selections in parallel unless told otherwise
    #[serde(default)]
    pub parallel: bool,

    /// Maximum simultaneously active jobs in parallel mode (unbounded if unset)
    #[serde(default)]
    pub max_concurrent_jobs: Option<usize>,
}

// Default values
fn default_jobs_file() -> PathBuf {
    Path::new(BASE_DIR).join("jobs.json")
}

fn default_settings_file() -> PathBuf {
    Path::new(BASE_DIR).join("settings.json")
}

fn default_state_file() -> PathBuf {
    Path::new(BASE_DIR).join("state.json")
}

fn default_log_dir() -> PathBuf {
    Path::new(BASE_DIR).join("logs")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            jobs_file: default_jobs_file(),
            settings_file: default_settings_file(),
            state_file: default_state_file(),
            log_dir: default_log_dir(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.log.level, "info");
        assert_eq!(config.paths.jobs_file, PathBuf::from("./easysave/jobs.json"));
        assert!(!config.run.parallel);
        assert!(config.run.max_concurrent_jobs.is_none());
        assert!(config.encryption.program.is_none());
    }

    #[test]
    fn test_partial_config() {
        let toml_str = r#"
            [paths]
            state_file = "/var/lib/easysave/state.json"

            [encryption]
            program = "/opt/cryptosoft/cryptosoft"

            [run]
            parallel = true
            max_concurrent_jobs = 2
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(
            config.paths.state_file,
            PathBuf::from("/var/lib/easysave/state.json")
        );
        assert_eq!(config.paths.log_dir, PathBuf::from("./easysave/logs"));
        assert_eq!(
            config.encryption.program,
            Some(PathBuf::from("/opt/cryptosoft/cryptosoft"))
        );
        assert!(config.run.parallel);
        assert_eq!(config.run.max_concurrent_jobs, Some(2));
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("easysave.toml");
        std::fs::write(&path, "[log]\nlevel = \"debug\"\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.log.level, "debug");
    }
}
