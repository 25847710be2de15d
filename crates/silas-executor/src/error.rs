//! Executor error taxonomy.

use thiserror::Error;

/// Errors raised while resolving or ordering a work-item dependency closure.
///
/// These surface as `last_error` on a failed [`crate::WorkItemResult`]
/// rather than propagating, so this type is mostly used internally.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// `depends_on` (or, for the root, `tasks`) named an id the work-item
    /// store has no record of.
    #[error("missing dependency '{0}'")]
    MissingDependency(String),

    /// The dependency graph contains a cycle; `0` is the unresolved chain.
    #[error("circular dependency detected: {0}")]
    CircularDependency(String),
}

/// Convenience alias for `Result<T, ExecutorError>`.
pub type ExecutorResult<T> = Result<T, ExecutorError>;
