//! Progress accounting for backup runs.

pub mod progress;
