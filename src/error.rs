//! Error types for FedIngest
//!
//! All errors in the pipeline are converted to `PipelineError`.
//! Expected conditions (duplicate delivery, tombstoned object, suspended
//! origin, lock contention) are *not* errors; handlers report those through
//! their return values instead.

use thiserror::Error;

/// Pipeline-wide error type
///
/// Only genuinely fatal conditions live here. A constraint violation
/// during the materialization transaction surfaces as `Database` and
/// rolls the whole write back.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Malformed envelope or reference
    #[error("Validation error: {0}")]
    Validation(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Remote fetch collaborator failure
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<config::ConfigError> for PipelineError {
    fn from(err: config::ConfigError) -> Self {
        PipelineError::Config(err.to_string())
    }
}

/// Result type alias using PipelineError
pub type Result<T> = std::result::Result<T, PipelineError>;
