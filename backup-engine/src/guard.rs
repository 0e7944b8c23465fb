//! Business-software guard.
//!
//! Backups must not run while a designated business application is active.
//! The engine asks the guard once, when a job starts.

use std::path::Path;
use std::sync::Mutex;
use sysinfo::System;

/// Decides whether a configured blocking process is currently running
pub trait BusinessSoftwareGuard: Send + Sync {
    fn is_blocked(&self) -> bool;
}

/// Guard for hosts without a configured business application
#[derive(Debug, Default, Clone, Copy)]
pub struct NeverBlocked;

impl BusinessSoftwareGuard for NeverBlocked {
    fn is_blocked(&self) -> bool {
        false
    }
}

/// Guard that scans the host process table.
///
/// The configured value may be a bare process name (`calc`) or a path to the
/// executable (`C:\Apps\calc.exe`); its file stem is matched
/// case-insensitively against running process names.
pub struct ProcessGuard {
    process_name: Option<String>,
    system: Mutex<System>,
}

impl ProcessGuard {
    pub fn new(configured: &str) -> Self {
        Self {
            process_name: normalize_process_name(configured),
            system: Mutex::new(System::new()),
        }
    }

    /// Normalized name being watched, if any
    pub fn process_name(&self) -> Option<&str> {
        self.process_name.as_deref()
    }
}

impl BusinessSoftwareGuard for ProcessGuard {
    fn is_blocked(&self) -> bool {
        let Some(wanted) = &self.process_name else {
            return false;
        };

        let mut system = match self.system.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        system.refresh_processes();

        let blocked = system
            .processes()
            .values()
            .any(|p| process_matches(p.name(), wanted));

        if blocked {
            tracing::info!(process = %wanted, "Business software is running");
        }
        blocked
    }
}

/// Reduce a configured name or path to a lowercase file stem.
fn normalize_process_name(configured: &str) -> Option<String> {
    let trimmed = configured.trim();
    if trimmed.is_empty() {
        return None;
    }

    // Accept both separators regardless of host platform
    let last = trimmed.rsplit(['/', '\\']).next().unwrap_or(trimmed);
    let stem = Path::new(last)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| last.to_string());

    if stem.is_empty() {
        None
    } else {
        Some(stem.to_lowercase())
    }
}

fn process_matches(running: &str, wanted: &str) -> bool {
    let running = running.to_lowercase();
    let running = running.strip_suffix(".exe").unwrap_or(&running);
    running == wanted
}
