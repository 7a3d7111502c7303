use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("Missing the absolute path to repository: {}", .0.display())]
    MissingCheckout(PathBuf),

    #[error("git {command} failed: {message}")]
    Git { command: String, message: String },

    #[error("Schedule parse error: {0}")]
    Schedule(String),

    #[error("Registry error: {0}")]
    Registry(String),

    #[error("Registry is locked by another process: {0}")]
    Locked(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TrackerError>;
