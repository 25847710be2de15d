//! Orchestrator error taxonomy.

use thiserror::Error;

/// Errors raised while processing a turn or during startup rehydration.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("channel error: {0}")]
    Channel(String),
    #[error("proxy agent error: {0}")]
    Proxy(String),
    #[error("planner agent error: {0}")]
    Planner(String),
    #[error("context error: {0}")]
    Context(#[from] silas_context::ContextError),
    #[error("store error: {0}")]
    Store(#[from] silas_core::CoreError),
}

/// Convenience alias for `Result<T, OrchestratorError>`.
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;
