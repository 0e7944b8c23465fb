//! File selection for full and differential backups.
//!
//! Full selects every regular file of the source tree. Differential compares
//! each source file against its mapped target path and keeps the ones that are
//! missing, differ in size, or differ in modification time beyond the
//! tolerance (same size + mtime heuristic rsync uses by default).

use crate::fs::metadata::needs_copy;
use crate::fs::walker::{walk_directory, FileInfo};
use crate::job::{BackupJob, BackupType};
use crate::utils::errors::{EngineError, Result};
use std::path::{Path, PathBuf};
use tracing::warn;

/// One file chosen for copy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedFile {
    /// Absolute source path
    pub source: PathBuf,

    /// Path relative to the job's source directory
    pub relative_path: PathBuf,

    /// Mapped path under the job's target directory
    pub target: PathBuf,

    /// Size in bytes at selection time
    pub size: u64,
}

/// Ordered set of files to copy and their aggregate size
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub files: Vec<SelectedFile>,
    pub total_bytes: u64,
}

impl Selection {
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Compute the files a run of `job` must copy, in enumeration order.
///
/// A missing or unreadable source directory is an error; a missing target
/// directory simply means every file is new.
pub fn select_files(job: &BackupJob) -> Result<Selection> {
    let source_root = &job.source_directory;
    check_source(source_root)?;

    let files = walk_directory(source_root).map_err(|e| {
        if e.path() != Some(source_root.as_path()) {
            return EngineError::Walk(e);
        }
        let path = source_root.clone();
        match e.into_io_error() {
            Some(source) => EngineError::SourceUnreadable { path, source },
            None => EngineError::SourceNotFound { path },
        }
    })?;

    let mut selection = Selection::default();
    for file in files {
        let target = job.target_directory.join(&file.relative_path);

        let selected = match job.backup_type {
            BackupType::Full => true,
            BackupType::Differential => is_changed(&file, &target),
        };

        if selected {
            selection.total_bytes += file.size;
            selection.files.push(SelectedFile {
                source: file.path,
                relative_path: file.relative_path,
                target,
                size: file.size,
            });
        }
    }

    Ok(selection)
}

fn check_source(root: &Path) -> Result<()> {
    match std::fs::metadata(root) {
        Ok(m) if m.is_dir() => {}
        Ok(_) => {
            return Err(EngineError::SourceNotFound {
                path: root.to_path_buf(),
            })
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(EngineError::SourceNotFound {
                path: root.to_path_buf(),
            })
        }
        Err(e) => {
            return Err(EngineError::SourceUnreadable {
                path: root.to_path_buf(),
                source: e,
            })
        }
    }

    std::fs::read_dir(root).map_err(|e| EngineError::SourceUnreadable {
        path: root.to_path_buf(),
        source: e,
    })?;
    Ok(())
}

fn is_changed(file: &FileInfo, target: &Path) -> bool {
    match needs_copy(&file.path, target) {
        Ok(changed) => changed,
        Err(e) => {
            warn!(file = %file.path.display(), error = %e, "Cannot stat source file, selecting it");
            true
        }
    }
}
