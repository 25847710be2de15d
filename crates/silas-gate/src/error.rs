//! Gate runner error taxonomy.

use thiserror::Error;

/// Errors from gate registration and compilation.
#[derive(Debug, Error)]
pub enum GateError {
    /// `register_provider` or a gate referenced a `check_type` with no provider.
    #[error("no provider registered for check_type '{0}'")]
    UnknownProvider(String),

    /// A gate named `after_step` as its trigger but omitted the step index.
    #[error("gate '{0}' has trigger after_step but no after_step value")]
    MissingAfterStep(String),
}

/// Convenience alias for `Result<T, GateError>`. Named `GateOpResult` to
/// avoid colliding with `silas_core::GateResult` (a gate's evaluation outcome).
pub type GateOpResult<T> = Result<T, GateError>;
