//! Config error taxonomy.

use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Could not read the config file.
    #[error("failed to read config file: {0}")]
    Io(String),

    /// The config file's TOML could not be parsed.
    #[error("failed to parse config file: {0}")]
    Parse(String),

    /// A field failed validation.
    #[error("invalid config field '{field}': {message}")]
    Validation {
        /// Dotted path of the offending field.
        field: String,
        /// Human-readable explanation.
        message: String,
    },
}

/// Convenience alias for `Result<T, ConfigError>`.
pub type ConfigResult<T> = Result<T, ConfigError>;
