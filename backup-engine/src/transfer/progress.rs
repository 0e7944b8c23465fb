//! Byte-level progress tracking for backup runs.
//!
//! Counts down files and bytes as each selected file is processed and derives
//! the completion percentage from bytes done.

/// Progress counters for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferProgress {
    /// Total bytes selected for the run
    pub total_bytes: u64,

    /// Bytes not processed yet (never below zero)
    pub bytes_remaining: u64,

    /// Total number of files selected
    pub total_files: u64,

    /// Number of files not processed yet
    pub files_remaining: u64,
}

impl TransferProgress {
    /// Create a new progress tracker
    pub fn new(total_bytes: u64, total_files: u64) -> Self {
        Self {
            total_bytes,
            bytes_remaining: total_bytes,
            total_files,
            files_remaining: total_files,
        }
    }

    /// Account for one processed file of `size` bytes, copied or not.
    pub fn file_done(&mut self, size: u64) {
        self.files_remaining = self.files_remaining.saturating_sub(1);
        self.bytes_remaining = self.bytes_remaining.saturating_sub(size);
    }

    /// Files processed so far
    pub fn files_processed(&self) -> u64 {
        self.total_files - self.files_remaining
    }

    /// Bytes processed so far
    pub fn bytes_done(&self) -> u64 {
        self.total_bytes - self.bytes_remaining
    }

    /// Rounded completion percentage; 100 when there is nothing to transfer
    pub fn percent(&self) -> u8 {
        if self.total_bytes == 0 {
            return 100;
        }
        let pct = (self.bytes_done() as f64 / self.total_bytes as f64 * 100.0).round();
        pct.clamp(0.0, 100.0) as u8
    }

    /// Force the counters to their completed values
    pub fn complete(&mut self) {
        self.files_remaining = 0;
        self.bytes_remaining = 0;
    }
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_progress_new() {
        let progress = TransferProgress::new(1000, 10);
        assert_eq!(progress.total_bytes, 1000);
        assert_eq!(progress.bytes_remaining, 1000);
        assert_eq!(progress.files_remaining, 10);
        assert_eq!(progress.percent(), 0);
    }

    #[test]
    fn test_percent_follows_bytes() {
        let mut progress = TransferProgress::new(150, 2);
        progress.file_done(100);
        assert_eq!(progress.percent(), 67);
        assert_eq!(progress.files_processed(), 1);
        progress.file_done(50);
        assert_eq!(progress.percent(), 100);
        assert_eq!(progress.files_remaining, 0);
    }

    #[test]
    fn test_remaining_bytes_clamped() {
        let mut progress = TransferProgress::new(10, 1);
        // file grew after selection
        progress.file_done(25);
        assert_eq!(progress.bytes_remaining, 0);
        assert_eq!(progress.percent(), 100);
    }

    #[test]
    fn test_empty_run_is_complete() {
        let progress = TransferProgress::new(0, 0);
        assert_eq!(progress.percent(), 100);
        assert_eq!(progress.files_remaining, 0);

        // zero-byte files still count down
        let mut progress = TransferProgress::new(0, 2);
        assert_eq!(progress.percent(), 100);
        progress.file_done(0);
        assert_eq!(progress.files_remaining, 1);
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0.00 B");
        assert_eq!(format_bytes(1023), "1023.00 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1024 * 1024), "1.00 MB");
    }
}
