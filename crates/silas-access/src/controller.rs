//! Deterministic, per-connection access controller.

use crate::error::{AccessError, AccessResult};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use silas_config::types::{AccessConfig, AccessLevelConfig};
use silas_core::Taint;
use std::collections::{HashMap, HashSet};

const LEVEL_ORDER: [&str; 4] = ["anonymous", "authenticated", "trusted", "owner"];

struct AccessState {
    level_name: String,
    verified_gates: HashSet<String>,
    customer_context: Option<serde_json::Map<String, serde_json::Value>>,
    granted_at: Option<DateTime<Utc>>,
}

impl AccessState {
    fn new(level_name: impl Into<String>) -> Self {
        AccessState { level_name: level_name.into(), verified_gates: HashSet::new(), customer_context: None, granted_at: None }
    }
}

/// A point-in-time view of a connection's access state, for diagnostics.
#[derive(Debug, Clone)]
pub struct AccessSnapshot {
    pub level_name: String,
    pub verified_gates: Vec<String>,
    pub customer_context: Option<serde_json::Map<String, serde_json::Value>>,
    pub granted_at: Option<DateTime<Utc>>,
}

/// Tracks which access level each connection has earned, promoting a
/// connection as it clears gates and demoting it back to the default level
/// once its current level's grant has expired. The workspace owner's
/// connection (or any message tainted `Owner`) always resolves to `owner`
/// and bypasses gate tracking entirely.
pub struct AccessController {
    owner_id: String,
    default_level: String,
    levels: HashMap<String, AccessLevelConfig>,
    state_by_connection: DashMap<String, AccessState>,
}

impl AccessController {
    /// Build a controller from a validated [`AccessConfig`]. Fails if
    /// `config.default_level` has no matching entry in `config.levels`.
    pub fn new(owner_id: impl Into<String>, config: &AccessConfig) -> AccessResult<Self> {
        let levels = Self::build_levels(config);
        if !levels.contains_key(&config.default_level) {
            return Err(AccessError::UnknownLevel(config.default_level.clone()));
        }
        Ok(AccessController {
            owner_id: owner_id.into(),
            default_level: config.default_level.clone(),
            levels,
            state_by_connection: DashMap::new(),
        })
    }

    fn build_levels(config: &AccessConfig) -> HashMap<String, AccessLevelConfig> {
        config.levels.iter().map(|l| (l.name.clone(), l.clone())).collect()
    }

    /// Replace the level table. If `reset_non_owner_state` is set, every
    /// connection other than the owner's loses its tracked progress, so the
    /// new requirements apply from scratch instead of grandfathering gates
    /// already verified under the old table.
    pub fn update_access_levels(&mut self, config: &AccessConfig, reset_non_owner_state: bool) -> AccessResult<()> {
        let levels = Self::build_levels(config);
        if !levels.contains_key(&config.default_level) {
            return Err(AccessError::UnknownLevel(config.default_level.clone()));
        }
        self.levels = levels;
        self.default_level = config.default_level.clone();

        if reset_non_owner_state {
            self.state_by_connection.retain(|connection_id, _| connection_id == &self.owner_id);
        }
        Ok(())
    }

    /// Record that `connection_id` passed `gate_name`, returning its
    /// resulting access level (promoted if this gate completes a level's
    /// requirements). A no-op promotion-wise for the owner's connection.
    pub fn gate_passed(
        &self,
        connection_id: &str,
        gate_name: &str,
        taint: Option<Taint>,
        customer_context: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> String {
        if self.is_owner(connection_id, taint) {
            self.ensure_owner_state(connection_id);
            return "owner".to_string();
        }

        let mut state = self.state_by_connection.entry(connection_id.to_string()).or_insert_with(|| AccessState::new(self.default_level.clone()));
        self.downgrade_if_expired(&mut state);

        state.verified_gates.insert(gate_name.to_string());
        let next_level = self.highest_reachable_level(&state.verified_gates);
        if self.rank(&next_level) > self.rank(&state.level_name) {
            state.level_name = next_level;
            state.granted_at = Some(Utc::now());
            if let Some(ctx) = customer_context {
                state.customer_context = Some(ctx);
            }
        }
        state.level_name.clone()
    }

    /// The access level currently held by `connection_id`.
    #[must_use]
    pub fn get_access_level(&self, connection_id: &str, taint: Option<Taint>) -> String {
        if self.is_owner(connection_id, taint) {
            self.ensure_owner_state(connection_id);
            return "owner".to_string();
        }
        let mut state = self.state_by_connection.entry(connection_id.to_string()).or_insert_with(|| AccessState::new(self.default_level.clone()));
        self.downgrade_if_expired(&mut state);
        state.level_name.clone()
    }

    /// The tool names unlocked by `connection_id`'s current access level.
    #[must_use]
    pub fn get_allowed_tools(&self, connection_id: &str, taint: Option<Taint>) -> Vec<String> {
        let level = self.get_access_level(connection_id, taint);
        self.levels.get(&level).map(|l| l.tools.clone()).unwrap_or_default()
    }

    /// Narrow `tool_names` to those `connection_id` is allowed to invoke.
    /// A level whose tools include `"*"` passes every name through unchanged.
    #[must_use]
    pub fn filter_tools(&self, connection_id: &str, tool_names: &[String], taint: Option<Taint>) -> Vec<String> {
        let allowed = self.get_allowed_tools(connection_id, taint);
        if allowed.iter().any(|t| t == "*") {
            return tool_names.to_vec();
        }
        let allowed_set: HashSet<&str> = allowed.iter().map(String::as_str).collect();
        tool_names.iter().filter(|name| allowed_set.contains(name.as_str())).cloned().collect()
    }

    /// The customer context attached at the connection's last promotion, if
    /// any. Always `None` for the owner, who carries no customer context.
    #[must_use]
    pub fn get_customer_context(&self, connection_id: &str, taint: Option<Taint>) -> Option<serde_json::Map<String, serde_json::Value>> {
        if self.is_owner(connection_id, taint) {
            return None;
        }
        let mut state = self.state_by_connection.entry(connection_id.to_string()).or_insert_with(|| AccessState::new(self.default_level.clone()));
        self.downgrade_if_expired(&mut state);
        state.customer_context.clone()
    }

    /// A diagnostic snapshot of `connection_id`'s tracked state.
    #[must_use]
    pub fn state_snapshot(&self, connection_id: &str) -> AccessSnapshot {
        let state = self.state_by_connection.entry(connection_id.to_string()).or_insert_with(|| AccessState::new(self.default_level.clone()));
        let mut verified_gates: Vec<String> = state.verified_gates.iter().cloned().collect();
        verified_gates.sort();
        AccessSnapshot {
            level_name: state.level_name.clone(),
            verified_gates,
            customer_context: state.customer_context.clone(),
            granted_at: state.granted_at,
        }
    }

    fn ensure_owner_state(&self, connection_id: &str) {
        let mut entry = self.state_by_connection.entry(connection_id.to_string()).or_insert_with(|| AccessState::new("owner"));
        entry.level_name = "owner".to_string();
        if entry.granted_at.is_none() {
            entry.granted_at = Some(Utc::now());
        }
    }

    fn downgrade_if_expired(&self, state: &mut AccessState) {
        let Some(level) = self.levels.get(&state.level_name) else { return };
        let Some(expires_after_secs) = level.expires_after_secs else { return };
        let Some(granted_at) = state.granted_at else { return };
        if expires_after_secs == 0 {
            return;
        }
        let deadline = granted_at + ChronoDuration::seconds(expires_after_secs as i64);
        if Utc::now() < deadline {
            return;
        }
        state.level_name = self.default_level.clone();
        state.granted_at = None;
        state.customer_context = None;
        state.verified_gates.clear();
    }

    fn highest_reachable_level(&self, verified_gates: &HashSet<String>) -> String {
        let mut highest = self.default_level.clone();
        for level_name in self.ordered_levels() {
            if level_name == "owner" {
                continue;
            }
            let Some(level) = self.levels.get(&level_name) else { continue };
            let requirements_met = level.requires.iter().all(|r| verified_gates.contains(r));
            if requirements_met && self.rank(&level_name) >= self.rank(&highest) {
                highest = level_name;
            }
        }
        highest
    }

    fn ordered_levels(&self) -> Vec<String> {
        let mut known: Vec<String> = LEVEL_ORDER.iter().filter(|n| self.levels.contains_key(**n)).map(|n| (*n).to_string()).collect();
        let mut custom: Vec<String> = self.levels.keys().filter(|n| !LEVEL_ORDER.contains(&n.as_str())).cloned().collect();
        custom.sort();
        known.append(&mut custom);
        known
    }

    fn rank(&self, level_name: &str) -> usize {
        LEVEL_ORDER.iter().position(|n| *n == level_name).unwrap_or(LEVEL_ORDER.len())
    }

    fn is_owner(&self, connection_id: &str, taint: Option<Taint>) -> bool {
        connection_id == self.owner_id || matches!(taint, Some(Taint::Owner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AccessConfig {
        AccessConfig::default()
    }

    #[test]
    fn owner_connection_always_resolves_to_owner() {
        let ctl = AccessController::new("owner-1", &config()).unwrap();
        assert_eq!(ctl.get_access_level("owner-1", None), "owner");
        assert_eq!(ctl.get_allowed_tools("owner-1", None), vec!["*".to_string()]);
    }

    #[test]
    fn gate_passed_promotes_through_the_hierarchy() {
        let ctl = AccessController::new("owner-1", &config()).unwrap();
        assert_eq!(ctl.get_access_level("conn-1", None), "anonymous");
        let level = ctl.gate_passed("conn-1", "login", None, None);
        assert_eq!(level, "authenticated");
        let level = ctl.gate_passed("conn-1", "mfa", None, None);
        assert_eq!(level, "trusted");
    }

    #[test]
    fn gate_passed_never_demotes() {
        let ctl = AccessController::new("owner-1", &config()).unwrap();
        ctl.gate_passed("conn-1", "login", None, None);
        ctl.gate_passed("conn-1", "mfa", None, None);
        assert_eq!(ctl.get_access_level("conn-1", None), "trusted");
        ctl.gate_passed("conn-1", "mfa", None, None);
        assert_eq!(ctl.get_access_level("conn-1", None), "trusted");
    }

    #[test]
    fn filter_tools_passes_everything_for_wildcard_level() {
        let ctl = AccessController::new("owner-1", &config()).unwrap();
        let tools = vec!["shell".to_string(), "browse".to_string()];
        assert_eq!(ctl.filter_tools("owner-1", &tools, None), tools);
        assert!(ctl.filter_tools("conn-1", &tools, None).is_empty());
    }

    #[test]
    fn external_taint_does_not_grant_owner() {
        let ctl = AccessController::new("owner-1", &config()).unwrap();
        assert_eq!(ctl.get_access_level("conn-1", Some(Taint::External)), "anonymous");
    }

    #[test]
    fn owner_taint_grants_owner_for_any_connection() {
        let ctl = AccessController::new("owner-1", &config()).unwrap();
        assert_eq!(ctl.get_access_level("conn-1", Some(Taint::Owner)), "owner");
    }

    #[test]
    fn new_rejects_unknown_default_level() {
        let mut cfg = config();
        cfg.default_level = "nonexistent".to_string();
        assert!(AccessController::new("owner-1", &cfg).is_err());
    }
}
