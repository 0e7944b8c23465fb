//! Custom error types for the backup engine.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Source directory not found: {}", path.display())]
    SourceNotFound { path: PathBuf },

    #[error("Source directory unreadable: {}: {source}", path.display())]
    SourceUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create target directory {}: {source}", path.display())]
    TargetCreation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("XML error: {0}")]
    Xml(String),

    #[error("Directory walk error: {0}")]
    Walk(#[from] walkdir::Error),


    #[error("Cannot {action} a job that is {from}")]
    InvalidTransition { from: String, action: &'static str },

    #[error("Worker task error: {0}")]
    Join(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
