//! Validation pass run once after loading and before the runtime starts.

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

/// Validate every section; the first failure is returned.
///
/// # Errors
/// A [`ConfigError::Validation`] naming the first invalid field.
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_sandbox(config)?;
    validate_context(config)?;
    validate_executor(config)?;
    validate_access(config)?;
    validate_logging(config)?;
    Ok(())
}

fn err(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::Validation { field: field.to_string(), message: message.into() }
}

fn validate_sandbox(config: &Config) -> ConfigResult<()> {
    let s = &config.sandbox;
    if s.default_max_memory_mb == 0 {
        return Err(err("sandbox.default_max_memory_mb", "must be positive"));
    }
    if s.default_max_cpu_seconds == 0 {
        return Err(err("sandbox.default_max_cpu_seconds", "must be positive"));
    }
    if s.base_dir.trim().is_empty() {
        return Err(err("sandbox.base_dir", "must not be empty"));
    }
    Ok(())
}

fn validate_context(config: &Config) -> ConfigResult<()> {
    let budget = &config.context.budget;
    budget
        .validate()
        .map_err(|message| err("context.budget", message))?;
    if budget.total == 0 {
        return Err(err("context.budget.total", "must be positive"));
    }
    if !(0.0..=1.0).contains(&budget.eviction_threshold_pct) {
        return Err(err("context.budget.eviction_threshold_pct", "must be in [0,1]"));
    }
    if !(0.0..=1.0).contains(&budget.scorer_threshold_pct) {
        return Err(err("context.budget.scorer_threshold_pct", "must be in [0,1]"));
    }
    if config.context.n_fail == 0 {
        return Err(err("context.n_fail", "must be positive"));
    }
    Ok(())
}

fn validate_executor(config: &Config) -> ConfigResult<()> {
    let b = &config.executor.default_budget;
    if b.max_attempts == 0 {
        return Err(err("executor.default_budget.max_attempts", "must be positive"));
    }
    if b.max_tokens == 0 {
        return Err(err("executor.default_budget.max_tokens", "must be positive"));
    }
    if b.max_wall_time_seconds == 0 {
        return Err(err("executor.default_budget.max_wall_time_seconds", "must be positive"));
    }
    Ok(())
}

fn validate_access(config: &Config) -> ConfigResult<()> {
    let access = &config.access;
    if access.levels.is_empty() {
        return Err(err("access.levels", "must define at least one level"));
    }
    if !access.levels.iter().any(|l| l.name == access.default_level) {
        return Err(err("access.default_level", "must name a defined level"));
    }
    for level in &access.levels {
        if level.requires.iter().any(|req| req.trim().is_empty()) {
            return Err(err("access.levels[].requires", "gate name must not be empty"));
        }
    }
    Ok(())
}

fn validate_logging(config: &Config) -> ConfigResult<()> {
    const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
    if !LEVELS.contains(&config.logging.level.as_str()) {
        return Err(err("logging.level", format!("must be one of {LEVELS:?}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn profile_sum_081_fails() {
        let mut config = Config::default();
        config.context.budget.profiles.insert(
            "default".to_string(),
            silas_core::budget::Profile { chronicle_pct: 0.31, memory_pct: 0.30, workspace_pct: 0.20 },
        );
        assert!(validate_context(&config).is_err());
    }

    #[test]
    fn unknown_default_level_fails() {
        let mut config = Config::default();
        config.access.default_level = "ghost".to_string();
        assert!(validate_access(&config).is_err());
    }
}
