//! The abstract error taxonomy shared across Silas crates.
//!
//! Individual components (sandbox, context, gate, executor, orchestrator)
//! define their own `thiserror` enums; each variant maps onto one of the
//! categories here. Only [`CoreError::SystemFault`] is expected to escape
//! the orchestrator — everything else converts to an explicit result field
//! (a gate action, a work-item status, a scorer circuit-breaker flag).

use thiserror::Error;

/// Abstract error categories used throughout the runtime.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Invalid limits, unknown profile, missing default profile. Raised at
    /// construction; fatal for the affected component only.
    #[error("config: {0}")]
    Config(String),

    /// Unknown sandbox id, unknown dependency, unknown skill.
    #[error("not found: {0}")]
    NotFound(String),

    /// Missing approval token or a verifier that rejected it.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Subprocess, LLM gate, scorer, or planner-consult timeout. Each caller
    /// has a defined fallback and should not usually propagate this variant.
    #[error("timeout: {0}")]
    Timeout(String),

    /// A gate provider threw or returned an invalid result.
    #[error("provider error: {0}")]
    ProviderError(String),

    /// One or more verification checks failed.
    #[error("verification failed: {0}")]
    VerificationFailed(String),

    /// Attempts, tokens, wall-time, or planner-call budget was consumed.
    #[error("budget exhausted: {0}")]
    BudgetExhausted(String),

    /// An upstream work item did not reach `done`.
    #[error("dependency failed: {0}")]
    DependencyFailed(String),

    /// Integrity failure (audit chain mismatch, signing error). Fatal: halt
    /// accepting new turns and audit before exit.
    #[error("system fault: {0}")]
    SystemFault(String),
}

/// Convenience alias for `Result<T, CoreError>`.
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_formats_are_stable() {
        assert_eq!(CoreError::NotFound("sandbox-1".into()).to_string(), "not found: sandbox-1");
        assert_eq!(
            CoreError::BudgetExhausted("tokens".into()).to_string(),
            "budget exhausted: tokens"
        );
    }
}
