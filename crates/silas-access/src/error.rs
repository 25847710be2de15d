//! Access-controller error taxonomy.

use thiserror::Error;

/// Errors from the access controller.
#[derive(Debug, Error)]
pub enum AccessError {
    /// `default_level` (or a level named in `requires`) has no matching entry.
    #[error("unknown access level: {0}")]
    UnknownLevel(String),
}

/// Convenience alias for `Result<T, AccessError>`.
pub type AccessResult<T> = Result<T, AccessError>;
