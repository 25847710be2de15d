//! The root configuration tree, one section per component.

use serde::{Deserialize, Serialize};
use silas_core::budget::{Budget, Profile, TokenBudget};
use std::collections::HashMap;

/// Root configuration, deserialized from TOML with every field defaulted so
/// a bare `[runtime]`-less file is still valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub runtime: RuntimeConfig,
    pub sandbox: SandboxConfig,
    pub context: ContextConfig,
    pub gates: GatesConfig,
    pub executor: ExecutorConfig,
    pub access: AccessConfig,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            runtime: RuntimeConfig::default(),
            sandbox: SandboxConfig::default(),
            context: ContextConfig::default(),
            gates: GatesConfig::default(),
            executor: ExecutorConfig::default(),
            access: AccessConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Top-level runtime paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub data_dir: String,
    /// How long a turn waits for a human verdict on an approval card before
    /// the request is treated as denied.
    pub approval_wait_secs: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig { data_dir: "data".into(), approval_wait_secs: 300 }
    }
}

/// Sandbox manager defaults applied when a work item doesn't override them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    pub base_dir: String,
    pub default_max_memory_mb: u64,
    pub default_max_cpu_seconds: u64,
    pub default_network_access: bool,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        SandboxConfig {
            base_dir: "data/sandbox".into(),
            default_max_memory_mb: 512,
            default_max_cpu_seconds: 30,
            default_network_access: false,
        }
    }
}

/// Tier-2 eviction strategy selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier2Strategy {
    Local,
    AdvisoryLlm,
}

/// Context manager budgets, profiles, and circuit-breaker parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    pub budget: TokenBudget,
    pub tier2_strategy: Tier2Strategy,
    pub n_fail: u32,
    pub t_cool_secs: u64,
}

impl Default for ContextConfig {
    fn default() -> Self {
        let mut profiles = HashMap::new();
        profiles.insert(
            "default".to_string(),
            Profile { chronicle_pct: 0.30, memory_pct: 0.30, workspace_pct: 0.20 },
        );
        ContextConfig {
            budget: TokenBudget {
                total: 32_000,
                system_max: 2_000,
                profiles,
                default_profile: "default".to_string(),
                eviction_threshold_pct: 0.90,
                scorer_threshold_pct: 0.75,
                mask_after_turns: 5,
            },
            tier2_strategy: Tier2Strategy::Local,
            n_fail: 3,
            t_cool_secs: 300,
        }
    }
}

/// Gate-runner configuration: built-in output gate thresholds and escalation overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatesConfig {
    pub taint_ceiling: String,
    pub length_limit_tokens: u32,
    pub length_limit_mode: String,
    pub pii_escalation: Option<String>,
}

impl Default for GatesConfig {
    fn default() -> Self {
        GatesConfig {
            taint_ceiling: "external".to_string(),
            length_limit_tokens: 4_000,
            length_limit_mode: "truncate".to_string(),
            pii_escalation: None,
        }
    }
}

/// Default work-item execution budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub default_budget: Budget,
    pub verification_output_truncate_chars: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        ExecutorConfig {
            default_budget: Budget {
                max_attempts: 3,
                max_tokens: 20_000,
                max_wall_time_seconds: 300,
                max_planner_calls: 2,
            },
            verification_output_truncate_chars: 1_000,
        }
    }
}

/// Access-level hierarchy for the access controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    pub default_level: String,
    pub levels: Vec<AccessLevelConfig>,
}

impl Default for AccessConfig {
    fn default() -> Self {
        AccessConfig {
            default_level: "anonymous".to_string(),
            levels: vec![
                AccessLevelConfig { name: "anonymous".into(), requires: vec![], tools: vec![], expires_after_secs: None },
                AccessLevelConfig { name: "authenticated".into(), requires: vec!["login".into()], tools: vec![], expires_after_secs: None },
                AccessLevelConfig { name: "trusted".into(), requires: vec!["login".into(), "mfa".into()], tools: vec![], expires_after_secs: Some(3_600) },
                AccessLevelConfig { name: "owner".into(), requires: vec!["login".into(), "mfa".into(), "owner_key".into()], tools: vec!["*".into()], expires_after_secs: None },
            ],
        }
    }
}

/// One access level: the gates required to reach it and the tools it unlocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessLevelConfig {
    pub name: String,
    pub requires: Vec<String>,
    pub tools: Vec<String>,
    pub expires_after_secs: Option<u64>,
}

/// `tracing` configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig { level: "info".to_string(), json: false }
    }
}
