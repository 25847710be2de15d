//! Context-manager error taxonomy.

use thiserror::Error;

/// Errors from the context manager.
#[derive(Debug, Error)]
pub enum ContextError {
    /// `set_profile` named a profile absent from a non-empty profiles map.
    #[error("unknown profile: {0}")]
    UnknownProfile(String),

    /// Budget construction failed validation (ratios, thresholds).
    #[error("invalid budget config: {0}")]
    InvalidConfig(String),
}

/// Convenience alias for `Result<T, ContextError>`.
pub type ContextResult<T> = Result<T, ContextError>;
