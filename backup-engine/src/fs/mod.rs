//! File system helpers: tree walking, copying and change detection.

pub mod copy;
pub mod metadata;
pub mod walker;
