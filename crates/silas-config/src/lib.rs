//! Layered configuration for the Silas runtime: built-in defaults, an
//! optional TOML file, then `SILAS_*` environment overrides, followed by a
//! validation pass that must succeed before the runtime starts.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod error;
pub mod types;
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use types::Config;

use std::path::Path;

/// Load configuration: start from defaults, merge an optional TOML file,
/// apply `SILAS_*` environment overrides, then validate.
///
/// # Errors
/// Returns [`ConfigError::Io`] if `path` is set but unreadable,
/// [`ConfigError::Parse`] on malformed TOML, or a validation error.
pub fn load(path: Option<&Path>) -> ConfigResult<Config> {
    let mut config = Config::default();

    if let Some(path) = path {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        let file_config: Config = toml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config = file_config;
    }

    apply_env_overrides(&mut config);
    validate::validate(&config)?;
    Ok(config)
}

/// Apply `SILAS_*` environment overrides on top of a loaded config. Only a
/// handful of hot-path knobs are overridable this way; structural config
/// (profiles, gates, access levels) is file-only.
fn apply_env_overrides(config: &mut Config) {
    if let Ok(level) = std::env::var("SILAS_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Ok(dir) = std::env::var("SILAS_DATA_DIR") {
        config.runtime.data_dir = dir;
    }
}
