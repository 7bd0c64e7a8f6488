//! Registry error types.

use thiserror::Error;

use tender_core::ConfigError;
use tender_waterfall::{RunError, RunStatus};

/// Errors that can occur during registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("a dispatch is already running for {0}")]
    Conflict(String),

    #[error("no run registered for {0}")]
    NotFound(String),

    #[error("handle for {0} refers to a run that has been replaced")]
    StaleHandle(String),

    #[error("run {key} is still {status}")]
    StillActive { key: String, status: RunStatus },

    #[error("snapshot error: {0}")]
    Snapshot(String),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("run error: {0}")]
    Run(#[from] RunError),
}

pub type RegistryResult<T> = Result<T, RegistryError>;
