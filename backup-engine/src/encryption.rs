//! Selective encryption of copied files.
//!
//! The engine never transforms bytes itself. `EncryptionGate` decides whether a
//! copied file is in scope and hands it to an `Encryptor`, which reports the
//! elapsed time in milliseconds or a negative sentinel on failure.

use crate::job::BackupJob;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::process::Command;

/// Sentinel: the encryptor could not be started or waited on
pub const ENCRYPT_FAILED: i64 = -1;

/// Sentinel: no encryptor program configured, or it does not exist
pub const ENCRYPTOR_MISSING: i64 = -2;

/// External encryption capability
#[async_trait]
pub trait Encryptor: Send + Sync {
    /// Encrypt `path` in place with `key`.
    ///
    /// Returns elapsed milliseconds, or a negative value on failure. Never panics
    /// or returns an error.
    async fn encrypt(&self, path: &Path, key: &str) -> i64;
}

/// Runs an external encryption program as `<program> <path> <key>`
#[derive(Debug, Clone)]
pub struct ProcessEncryptor {
    program: Option<PathBuf>,
}

impl ProcessEncryptor {
    pub fn new(program: Option<PathBuf>) -> Self {
        Self { program }
    }
}

#[async_trait]
impl Encryptor for ProcessEncryptor {
    async fn encrypt(&self, path: &Path, key: &str) -> i64 {
        // Bare names are resolved through PATH by the spawn itself
        let Some(program) = self.program.as_ref() else {
            tracing::warn!(file = %path.display(), "Encryptor program not configured");
            return ENCRYPTOR_MISSING;
        };

        let started = Instant::now();
        let status = Command::new(program)
            .arg(path)
            .arg(key)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .await;

        match status {
            Ok(status) if status.success() => started.elapsed().as_millis() as i64,
            Ok(status) => {
                let code = status
                    .code()
                    .filter(|c| *c != 0)
                    .map(|c| -(c as i64).abs())
                    .unwrap_or(ENCRYPT_FAILED);
                tracing::warn!(file = %path.display(), code, "Encryptor exited with failure");
                code
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    file = %path.display(),
                    program = %program.display(),
                    "Encryptor program not found"
                );
                ENCRYPTOR_MISSING
            }
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "Failed to run encryptor");
                ENCRYPT_FAILED
            }
        }
    }
}

/// Decides which copied files are encrypted and invokes the encryptor
#[derive(Clone)]
pub struct EncryptionGate {
    encryptor: std::sync::Arc<dyn Encryptor>,
}

impl EncryptionGate {
    pub fn new(encryptor: std::sync::Arc<dyn Encryptor>) -> Self {
        Self { encryptor }
    }

    /// True when the job encrypts and `path`'s extension is in scope.
    ///
    /// An empty extension set puts every file in scope.
    pub fn should_encrypt(&self, path: &Path, job: &BackupJob) -> bool {
        if !job.encryption_enabled || job.key().is_none() {
            return false;
        }
        extension_in_scope(path, &job.extensions_to_encrypt)
    }

    /// Encrypt a copied file. Returns elapsed milliseconds or a negative sentinel.
    pub async fn encrypt(&self, path: &Path, key: &str) -> i64 {
        self.encryptor.encrypt(path, key).await
    }
}

/// Trim, drop blanks, ensure a leading dot, lowercase.
pub fn normalize_extensions(extensions: &[String]) -> Vec<String> {
    extensions
        .iter()
        .map(|e| e.trim())
        .filter(|e| !e.is_empty() && *e != ".")
        .map(|e| {
            if e.starts_with('.') {
                e.to_lowercase()
            } else {
                format!(".{}", e.to_lowercase())
            }
        })
        .collect()
}

fn extension_in_scope(path: &Path, extensions: &[String]) -> bool {
    let wanted = normalize_extensions(extensions);
    if wanted.is_empty() {
        return true;
    }

    let Some(ext) = path.extension() else {
        return false;
    };
    let ext = format!(".{}", ext.to_string_lossy().to_lowercase());
    wanted.iter().any(|w| *w == ext)
}
