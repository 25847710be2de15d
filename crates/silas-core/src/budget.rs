//! Token budgets and zone-allocation profiles for the context manager, and
//! the multi-dimensional execution budget for the work-item executor.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Named tuple of per-zone percentages summing to at most `0.80`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub chronicle_pct: f64,
    pub memory_pct: f64,
    pub workspace_pct: f64,
}

impl Profile {
    /// `true` if each ratio is within `[0, 1]` and the sum does not exceed `0.80` (B-2).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        let in_range = |p: f64| (0.0..=1.0).contains(&p);
        in_range(self.chronicle_pct)
            && in_range(self.memory_pct)
            && in_range(self.workspace_pct)
            && self.chronicle_pct + self.memory_pct + self.workspace_pct <= 0.80
    }
}

/// Per-scope token budget: totals, named profiles, and the thresholds that
/// drive masking and eviction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenBudget {
    pub total: u32,
    pub system_max: u32,
    pub profiles: HashMap<String, Profile>,
    pub default_profile: String,
    /// Fraction of `total` above which tier-2 (and then the aggressive
    /// heuristic) kicks in after tier-1 has run.
    pub eviction_threshold_pct: f64,
    /// Fraction of `total` the advisory scorer stops at once reached.
    pub scorer_threshold_pct: f64,
    pub mask_after_turns: u64,
}

impl TokenBudget {
    /// Validate every profile and the presence of the default profile.
    ///
    /// # Errors
    /// Returns a description of the first invalid profile, or of a missing
    /// default, suitable for wrapping in `ConfigError`.
    pub fn validate(&self) -> Result<(), String> {
        if !self.profiles.is_empty() && !self.profiles.contains_key(&self.default_profile) {
            return Err(format!(
                "default profile '{}' not present in profiles map",
                self.default_profile
            ));
        }
        for (name, profile) in &self.profiles {
            if !profile.is_valid() {
                return Err(format!(
                    "profile '{name}' ratios must each be in [0,1] and sum to <= 0.80"
                ));
            }
        }
        Ok(())
    }

    /// Budget for the system zone: always `system_max`.
    #[must_use]
    pub fn system_budget(&self) -> u32 {
        self.system_max
    }

    /// Budget for an evictable zone under a given profile:
    /// `floor((total - min(system_used, system_max)) * pct)`.
    #[must_use]
    pub fn zone_budget(&self, profile: &Profile, zone: crate::types::Zone, system_used: u32) -> u32 {
        let available = self.total.saturating_sub(system_used.min(self.system_max)) as f64;
        let pct = match zone {
            crate::types::Zone::System => return self.system_max,
            crate::types::Zone::Chronicle => profile.chronicle_pct,
            crate::types::Zone::Memory => profile.memory_pct,
            crate::types::Zone::Workspace => profile.workspace_pct,
        };
        (available * pct).floor() as u32
    }
}

/// Work-item execution budget: bounds on attempts, tokens, wall time, and
/// planner consultations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Budget {
    pub max_attempts: u32,
    pub max_tokens: u64,
    pub max_wall_time_seconds: u64,
    pub max_planner_calls: u32,
}

/// Consumption accumulated against a [`Budget`] while executing a work item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BudgetUsed {
    pub attempts: u32,
    pub tokens: u64,
    pub wall_time_seconds: u64,
    pub planner_calls: u32,
    pub executor_runs: u32,
}

impl BudgetUsed {
    /// `true` once any dimension of `budget` has been consumed.
    #[must_use]
    pub fn is_exhausted(&self, budget: &Budget) -> bool {
        self.attempts >= budget.max_attempts
            || self.tokens >= budget.max_tokens
            || self.wall_time_seconds >= budget.max_wall_time_seconds
    }

    /// Merge another item's consumed budget into this one (dependency closure aggregation).
    pub fn merge(&mut self, other: &BudgetUsed) {
        self.attempts += other.attempts;
        self.tokens += other.tokens;
        self.wall_time_seconds += other.wall_time_seconds;
        self.planner_calls += other.planner_calls;
        self.executor_runs += other.executor_runs;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_boundary_080_is_valid() {
        let p = Profile { chronicle_pct: 0.30, memory_pct: 0.30, workspace_pct: 0.20 };
        assert!(p.is_valid());
    }

    #[test]
    fn profile_boundary_081_is_invalid() {
        let p = Profile { chronicle_pct: 0.30, memory_pct: 0.30, workspace_pct: 0.21 };
        assert!(!p.is_valid());
    }

    #[test]
    fn budget_used_merges() {
        let mut acc = BudgetUsed::default();
        acc.merge(&BudgetUsed { attempts: 2, tokens: 100, wall_time_seconds: 5, planner_calls: 1, executor_runs: 1 });
        acc.merge(&BudgetUsed { attempts: 1, tokens: 50, wall_time_seconds: 2, planner_calls: 0, executor_runs: 1 });
        assert_eq!(acc.attempts, 3);
        assert_eq!(acc.tokens, 150);
        assert_eq!(acc.executor_runs, 2);
    }
}
