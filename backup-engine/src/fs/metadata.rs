//! Change detection between a source file and its backed-up copy.

use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};

/// Modification-time tolerance absorbing file system timestamp rounding
pub const MTIME_TOLERANCE: Duration = Duration::from_secs(1);

/// Size and modification time of a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStamp {
    /// File size in bytes
    pub size: u64,

    /// Last modified time
    pub modified: SystemTime,
}

impl FileStamp {
    /// Read the stamp of a file, following symlinks
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let metadata = fs::metadata(path)?;

        Ok(Self {
            size: metadata.len(),
            modified: metadata.modified()?,
        })
    }

    /// True when the two files differ in length or their modification times
    /// are further apart than `MTIME_TOLERANCE`.
    pub fn differs_from(&self, other: &FileStamp) -> bool {
        if self.size != other.size {
            return true;
        }

        let delta = match self.modified.duration_since(other.modified) {
            Ok(d) => d,
            Err(e) => e.duration(),
        };
        delta > MTIME_TOLERANCE
    }
}

/// Whether `source` must be copied over `target`.
///
/// A missing or unreadable target always requires a copy.
pub fn needs_copy(source: &Path, target: &Path) -> std::io::Result<bool> {
    let source_stamp = FileStamp::from_path(source)?;

    match FileStamp::from_path(target) {
        Ok(target_stamp) => Ok(source_stamp.differs_from(&target_stamp)),
        Err(_) => Ok(true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::FileTime;
    use tempfile::TempDir;

    fn stamp(size: u64, secs: u64, millis: u64) -> FileStamp {
        FileStamp {
            size,
            modified: SystemTime::UNIX_EPOCH + Duration::from_secs(secs) + Duration::from_millis(millis),
        }
    }

    #[test]
    fn test_stamp_tolerance() {
        assert!(!stamp(10, 100, 0).differs_from(&stamp(10, 100, 900)));
        assert!(!stamp(10, 101, 0).differs_from(&stamp(10, 100, 0)));
        assert!(stamp(10, 102, 0).differs_from(&stamp(10, 100, 0)));
        assert!(stamp(10, 100, 0).differs_from(&stamp(10, 101, 500)));
    }

    #[test]
    fn test_size_change_detected_with_same_mtime() {
        assert!(stamp(10, 100, 0).differs_from(&stamp(11, 100, 0)));
    }

    #[test]
    fn test_needs_copy() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let src = temp_dir.path().join("a.txt");
        let dst = temp_dir.path().join("b.txt");

        fs::write(&src, b"hello")?;
        assert!(needs_copy(&src, &dst)?);

        fs::write(&dst, b"hello")?;
        let mtime = FileTime::from_unix_time(1_700_000_000, 0);
        filetime::set_file_mtime(&src, mtime)?;
        filetime::set_file_mtime(&dst, mtime)?;
        assert!(!needs_copy(&src, &dst)?);

        filetime::set_file_mtime(&dst, FileTime::from_unix_time(1_700_000_005, 0))?;
        assert!(needs_copy(&src, &dst)?);

        Ok(())
    }
}
