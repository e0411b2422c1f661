// src/error.rs
use std::path::PathBuf;
use thiserror::Error;

/// A required setting for one capability (search, LLM, mail) is absent or malformed.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} not configured")]
    Missing(&'static str),

    #[error("invalid value for {var}: {message}")]
    Invalid { var: &'static str, message: String },

    #[error("region registry: {0}")]
    Registry(String),
}

/// Failures of the spreadsheet store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Another process holds the artifact. Retryable.
    #[error("artifact {0} is locked by another process")]
    Locked(PathBuf),

    #[error("reading {path}: {message}")]
    Read { path: PathBuf, message: String },

    #[error("writing {path}: {message}")]
    Write { path: PathBuf, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn is_locked(&self) -> bool {
        matches!(self, StoreError::Locked(_))
    }
}
