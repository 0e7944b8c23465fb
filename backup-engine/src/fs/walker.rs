//! Directory traversal for backup selection.
//!
//! Yields every regular file under a root, in the order the file system
//! enumerates them, together with its path relative to the root.

use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Information about a file discovered during walking
#[derive(Debug, Clone)]
pub struct FileInfo {
    /// Full path to the file
    pub path: PathBuf,

    /// Relative path from the root
    pub relative_path: PathBuf,

    /// File size in bytes
    pub size: u64,
}

impl FileInfo {
    /// Create FileInfo from a DirEntry.
    /// Symlinks are resolved to their target; links to directories and broken
    /// links yield None.
    fn from_entry(entry: &DirEntry, root: &Path) -> std::io::Result<Option<Self>> {
        let raw_metadata = entry.metadata()?;
        let path = entry.path().to_path_buf();
        let relative_path = path.strip_prefix(root).unwrap_or(&path).to_path_buf();

        let size = if raw_metadata.is_symlink() {
            match std::fs::metadata(&path) {
                Ok(resolved) if resolved.is_file() => resolved.len(),
                _ => return Ok(None),
            }
        } else if raw_metadata.is_file() {
            raw_metadata.len()
        } else {
            return Ok(None);
        };

        Ok(Some(Self {
            path,
            relative_path,
            size,
        }))
    }
}

/// Walk a directory tree and collect all regular files
///
/// # Returns
/// * `Ok(Vec<FileInfo>)` - Files in enumeration order
/// * `Err(walkdir::Error)` - If the root or a subdirectory cannot be read
pub fn walk_directory(root: &Path) -> Result<Vec<FileInfo>, walkdir::Error> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry?;

        if entry.file_type().is_dir() {
            continue;
        }

        match FileInfo::from_entry(&entry, root) {
            Ok(Some(file_info)) => files.push(file_info),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(path = %entry.path().display(), error = %e, "Skipping unreadable entry");
            }
        }
    }

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_walk_empty_directory() -> Result<(), Box<dyn std::error::Error>> {
        let temp_dir = TempDir::new()?;
        let files = walk_directory(temp_dir.path())?;
        assert_eq!(files.len(), 0);
        Ok(())
    }

    #[test]
    fn test_walk_with_subdirectories() -> Result<(), Box<dyn std::error::Error>> {
        let temp_dir = TempDir::new()?;

        fs::create_dir(temp_dir.path().join("subdir"))?;
        fs::write(temp_dir.path().join("file1.txt"), b"content1")?;
        fs::write(temp_dir.path().join("subdir/file2.txt"), b"content2")?;

        let files = walk_directory(temp_dir.path())?;
        assert_eq!(files.len(), 2);
        assert!(files
            .iter()
            .any(|f| f.relative_path == Path::new("subdir").join("file2.txt")));

        Ok(())
    }

    #[test]
    fn test_hidden_files_are_not_excluded() -> Result<(), Box<dyn std::error::Error>> {
        let temp_dir = TempDir::new()?;

        fs::write(temp_dir.path().join(".DS_Store"), b"kept")?;
        fs::create_dir(temp_dir.path().join(".git"))?;
        fs::write(temp_dir.path().join(".git/HEAD"), b"ref")?;

        let files = walk_directory(temp_dir.path())?;
        assert_eq!(files.len(), 2);

        Ok(())
    }

    #[test]
    fn test_missing_root_is_error() {
        let temp_dir = TempDir::new().unwrap();
        assert!(walk_directory(&temp_dir.path().join("absent")).is_err());
    }
}
