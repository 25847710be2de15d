//! Crypto error taxonomy.

use thiserror::Error;

/// Errors from signing, verifying, or consuming approval tokens.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Signature did not verify against the claimed issuer key.
    #[error("signature verification failed")]
    SignatureVerificationFailed,

    /// Token's `expires_at` (with clock-skew tolerance) is in the past.
    #[error("token expired at {0}")]
    Expired(String),

    /// Token's content hash does not match the work item it was presented for.
    #[error("token not bound to this work item")]
    NotBound,

    /// A single-use token was already consumed.
    #[error("token already consumed: {0}")]
    AlreadyConsumed(String),

    /// Malformed signing payload (truncated or corrupt).
    #[error("malformed token payload: {0}")]
    Malformed(String),
}

/// Convenience alias for `Result<T, CryptoError>`.
pub type CryptoResult<T> = Result<T, CryptoError>;
