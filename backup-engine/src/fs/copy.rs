//! File copy preserving the source modification time.
//!
//! Differential selection compares modification times, so a copy must carry
//! the source mtime over or every later run would select the file again.

use filetime::FileTime;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Copy `src` to `dst`, creating parent directories. Returns bytes copied.
pub async fn copy_file(src: &Path, dst: &Path) -> io::Result<u64> {
    let src = src.to_path_buf();
    let dst = dst.to_path_buf();
    tokio::task::spawn_blocking(move || copy_file_blocking(&src, &dst))
        .await
        .map_err(io::Error::other)?
}

fn copy_file_blocking(src: &Path, dst: &Path) -> io::Result<u64> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)?;
    }

    let src_mtime = fs::metadata(src)?.modified().ok();
    let bytes = fs::copy(src, dst)?;

    if let Some(mtime) = src_mtime {
        set_mtime(dst, mtime);
    }

    Ok(bytes)
}

/// Re-apply the modification time of `src` to `dst`
pub async fn sync_mtime(src: &Path, dst: &Path) {
    let src: PathBuf = src.to_path_buf();
    let dst: PathBuf = dst.to_path_buf();
    let _ = tokio::task::spawn_blocking(move || {
        if let Ok(mtime) = fs::metadata(&src).and_then(|m| m.modified()) {
            set_mtime(&dst, mtime);
        }
    })
    .await;
}

fn set_mtime(path: &Path, mtime: SystemTime) {
    if let Err(e) = filetime::set_file_mtime(path, FileTime::from_system_time(mtime)) {
        tracing::debug!(path = %path.display(), error = %e, "Could not preserve modification time");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_copy_creates_parents_and_keeps_mtime() -> io::Result<()> {
        let dir = TempDir::new()?;
        let src = dir.path().join("a.txt");
        let dst = dir.path().join("out/deep/a.txt");
        fs::write(&src, b"Hello, World!")?;
        filetime::set_file_mtime(&src, FileTime::from_unix_time(1_600_000_000, 0))?;

        let bytes = copy_file(&src, &dst).await?;
        assert_eq!(bytes, 13);
        assert_eq!(fs::read_to_string(&dst)?, "Hello, World!");

        let dst_mtime = FileTime::from_last_modification_time(&fs::metadata(&dst)?);
        assert_eq!(dst_mtime.unix_seconds(), 1_600_000_000);
        Ok(())
    }

    #[tokio::test]
    async fn test_copy_missing_source_fails() {
        let dir = TempDir::new().unwrap();
        let result = copy_file(&dir.path().join("absent"), &dir.path().join("b")).await;
        assert!(result.is_err());
    }
}
