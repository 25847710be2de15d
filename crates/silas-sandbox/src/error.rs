//! Sandbox error taxonomy.

use thiserror::Error;

/// Errors from creating, executing in, or destroying a sandbox.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// A config limit was non-positive, or argv was rejected (empty, a
    /// string command, or a shell interpreter with `-c`).
    #[error("invalid sandbox config: {0}")]
    InvalidConfig(String),

    /// `network_access=false` was requested but a network namespace could
    /// not be created (fail-closed, I-8).
    #[error("network isolation unavailable on this host")]
    NetworkIsolationUnavailable,

    /// The sandbox id is unknown (never created, or already destroyed).
    #[error("unknown sandbox: {0}")]
    NotFound(String),

    /// Failed to create or remove the ephemeral working directory.
    #[error("sandbox io error: {0}")]
    Io(String),

    /// The child process could not be spawned.
    #[error("failed to spawn process: {0}")]
    Spawn(String),
}

/// Convenience alias for `Result<T, SandboxError>`.
pub type SandboxResult<T> = Result<T, SandboxError>;
