//! The `ContextManager`: per-scope storage across four zones, profile-driven
//! budgets, masking, and eviction.

use crate::error::{ContextError, ContextResult};
use crate::eviction::{self, EvictionBatch};
use crate::masking;
use crate::render;
use crate::scorer::{ScoringContext, Tier2Scorer};
use dashmap::DashMap;
use silas_core::{ContextItem, ContextSubscription, Scope, TokenBudget, Zone};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

struct ScopeState {
    items: Vec<ContextItem>,
    subscriptions: Vec<ContextSubscription>,
    profile: String,
}

impl ScopeState {
    fn new(default_profile: &str) -> Self {
        ScopeState { items: Vec::new(), subscriptions: Vec::new(), profile: default_profile.to_string() }
    }
}

/// Owns every scope's context items and subscriptions, enforcing one shared
/// [`TokenBudget`] policy. Operations on a single scope are serialized by an
/// internal per-scope lock; distinct scopes never block one another.
pub struct ContextManager {
    budget: TokenBudget,
    scorer: Arc<dyn Tier2Scorer>,
    scopes: DashMap<Scope, Mutex<ScopeState>>,
}

impl ContextManager {
    /// # Errors
    /// Returns [`ContextError::InvalidConfig`] if `budget` fails validation.
    pub fn new(budget: TokenBudget, scorer: Arc<dyn Tier2Scorer>) -> ContextResult<Self> {
        budget.validate().map_err(ContextError::InvalidConfig)?;
        Ok(ContextManager { budget, scorer, scopes: DashMap::new() })
    }

    fn scope_entry(&self, scope: &Scope) -> dashmap::mapref::one::Ref<'_, Scope, Mutex<ScopeState>> {
        self.scopes
            .entry(scope.clone())
            .or_insert_with(|| Mutex::new(ScopeState::new(&self.budget.default_profile)));
        self.scopes.get(scope).expect("just inserted")
    }

    /// Append `item` to its zone within `scope`.
    pub fn add(&self, scope: &Scope, item: ContextItem) {
        let entry = self.scope_entry(scope);
        let mut state = entry.lock().expect("scope mutex poisoned");
        state.items.push(item);
    }

    /// Remove the item with `ctx_id` from `scope`. Returns `true` if found.
    pub fn drop_item(&self, scope: &Scope, ctx_id: Uuid) -> bool {
        let entry = self.scope_entry(scope);
        let mut state = entry.lock().expect("scope mutex poisoned");
        let before = state.items.len();
        state.items.retain(|i| i.ctx_id != ctx_id);
        state.items.len() != before
    }

    /// Snapshot of every item currently in `zone` within `scope`.
    #[must_use]
    pub fn get_zone(&self, scope: &Scope, zone: Zone) -> Vec<ContextItem> {
        let entry = self.scope_entry(scope);
        let state = entry.lock().expect("scope mutex poisoned");
        state.items.iter().filter(|i| i.zone == zone).cloned().collect()
    }

    /// Register a subscription for `scope`.
    pub fn subscribe(&self, scope: &Scope, subscription: ContextSubscription) {
        let entry = self.scope_entry(scope);
        let mut state = entry.lock().expect("scope mutex poisoned");
        state.subscriptions.push(subscription);
    }

    /// Deactivate and remove the subscription with `id`. Returns `true` if found.
    pub fn unsubscribe(&self, scope: &Scope, id: Uuid) -> bool {
        let entry = self.scope_entry(scope);
        let mut state = entry.lock().expect("scope mutex poisoned");
        let before = state.subscriptions.len();
        state.subscriptions.retain(|s| s.id != id);
        state.subscriptions.len() != before
    }

    /// Switch `scope`'s active budget profile.
    ///
    /// # Errors
    /// [`ContextError::UnknownProfile`] if `profiles` is non-empty and does
    /// not contain `name`.
    pub fn set_profile(&self, scope: &Scope, name: &str) -> ContextResult<()> {
        if !self.budget.profiles.is_empty() && !self.budget.profiles.contains_key(name) {
            return Err(ContextError::UnknownProfile(name.to_string()));
        }
        let entry = self.scope_entry(scope);
        let mut state = entry.lock().expect("scope mutex poisoned");
        state.profile = name.to_string();
        Ok(())
    }

    /// Apply observation masking, then render the flat text block for `scope`.
    #[must_use]
    pub fn render(&self, scope: &Scope, current_turn: u64) -> String {
        let entry = self.scope_entry(scope);
        let mut state = entry.lock().expect("scope mutex poisoned");
        for item in &mut state.items {
            masking::mask_if_stale(item, current_turn, self.budget.mask_after_turns);
        }
        render::render(&state.items)
    }

    /// Current token usage per zone for `scope`.
    #[must_use]
    pub fn token_usage(&self, scope: &Scope) -> HashMap<Zone, u32> {
        let entry = self.scope_entry(scope);
        let state = entry.lock().expect("scope mutex poisoned");
        let mut usage = HashMap::new();
        for item in &state.items {
            *usage.entry(item.zone).or_insert(0u32) += item.tokens;
        }
        usage
    }

    /// Run masking then two-tier eviction against every evictable zone for
    /// `scope`, applying each returned batch immediately. Returns the
    /// batches actually applied, in the order they ran, for audit logging.
    pub async fn enforce_budget(
        &self,
        scope: &Scope,
        current_turn: u64,
        scoring_ctx: &ScoringContext,
    ) -> Vec<EvictionBatch> {
        let profile_name;
        let system_used;
        {
            let entry = self.scope_entry(scope);
            let mut state = entry.lock().expect("scope mutex poisoned");
            for item in &mut state.items {
                masking::mask_if_stale(item, current_turn, self.budget.mask_after_turns);
            }
            profile_name = state.profile.clone();
            system_used = state.items.iter().filter(|i| i.zone == Zone::System).map(|i| i.tokens).sum();
        }

        let profile = match self.budget.profiles.get(&profile_name) {
            Some(p) => *p,
            None => return Vec::new(),
        };

        let zone_budgets: HashMap<Zone, u32> =
            Zone::EVICTION_PRIORITY.iter().map(|&zone| (zone, self.budget.zone_budget(&profile, zone, system_used))).collect();

        let items = {
            let entry = self.scope_entry(scope);
            let state = entry.lock().expect("scope mutex poisoned");
            state.items.clone()
        };

        let batches = eviction::evict(
            &items,
            &zone_budgets,
            self.budget.total,
            self.budget.eviction_threshold_pct,
            self.scorer.as_ref(),
            scoring_ctx,
        )
        .await;

        if !batches.is_empty() {
            let entry = self.scope_entry(scope);
            let mut state = entry.lock().expect("scope mutex poisoned");
            for batch in &batches {
                let ids: std::collections::HashSet<Uuid> = batch.ids.iter().copied().collect();
                state.items.retain(|i| !ids.contains(&i.ctx_id));
            }
        }
        batches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scorer::LocalScorer;
    use silas_core::{ContextKind, Profile, Taint};
    use std::collections::HashMap as Map;

    fn budget() -> TokenBudget {
        let mut profiles = Map::new();
        profiles.insert(
            "default".to_string(),
            Profile { chronicle_pct: 0.3, memory_pct: 0.3, workspace_pct: 0.2 },
        );
        TokenBudget {
            total: 1000,
            system_max: 100,
            profiles,
            default_profile: "default".to_string(),
            eviction_threshold_pct: 0.8,
            scorer_threshold_pct: 0.6,
            mask_after_turns: 3,
        }
    }

    fn manager() -> ContextManager {
        ContextManager::new(budget(), Arc::new(LocalScorer)).unwrap()
    }

    fn item(zone: Zone, tokens: u32, turn: u64) -> ContextItem {
        ContextItem::new(zone, "payload text".repeat(10), tokens, turn, "user", Taint::Owner, ContextKind::Message)
    }

    #[test]
    fn add_and_get_zone_roundtrip() {
        let mgr = manager();
        let scope = Scope::owner();
        let i = item(Zone::Chronicle, 10, 1);
        let id = i.ctx_id;
        mgr.add(&scope, i);
        let got = mgr.get_zone(&scope, Zone::Chronicle);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].ctx_id, id);
    }

    #[test]
    fn drop_removes_item() {
        let mgr = manager();
        let scope = Scope::owner();
        let i = item(Zone::Workspace, 10, 1);
        let id = i.ctx_id;
        mgr.add(&scope, i);
        assert!(mgr.drop_item(&scope, id));
        assert!(mgr.get_zone(&scope, Zone::Workspace).is_empty());
    }

    #[test]
    fn set_profile_rejects_unknown_name() {
        let mgr = manager();
        let scope = Scope::owner();
        assert!(matches!(mgr.set_profile(&scope, "nonexistent"), Err(ContextError::UnknownProfile(_))));
        assert!(mgr.set_profile(&scope, "default").is_ok());
    }

    #[test]
    fn render_masks_stale_tool_results_first() {
        let mgr = manager();
        let scope = Scope::owner();
        let stale = ContextItem::new(Zone::Workspace, "big output".into(), 20, 1, "bash", Taint::Owner, ContextKind::ToolResult);
        mgr.add(&scope, stale);
        let rendered = mgr.render(&scope, 10);
        assert!(rendered.contains("[Result of bash"));
    }

    #[tokio::test]
    async fn enforce_budget_evicts_down_to_zone_budget() {
        let mgr = manager();
        let scope = Scope::owner();
        for t in 0..20u64 {
            mgr.add(&scope, item(Zone::Workspace, 30, t));
        }
        let ctx = ScoringContext::default();
        let applied = mgr.enforce_budget(&scope, 20, &ctx).await;
        assert!(!applied.is_empty());
        let usage = mgr.token_usage(&scope);
        let workspace_used = usage.get(&Zone::Workspace).copied().unwrap_or(0);
        let profile = Profile { chronicle_pct: 0.3, memory_pct: 0.3, workspace_pct: 0.2 };
        // Tier 1 brings the zone down to its own full budget, not a
        // threshold-scaled fraction of it.
        let zone_budget = budget().zone_budget(&profile, Zone::Workspace, 0);
        assert!(workspace_used <= zone_budget);
    }

    #[tokio::test]
    async fn enforce_budget_runs_tier2_across_zones_when_scope_exceeds_threshold() {
        let mgr = manager();
        let scope = Scope::owner();
        // System usage at its own cap shrinks every other zone's budget but
        // counts toward scope-wide usage too. Chronicle/memory/workspace are
        // each filled to exactly their own (now-shrunk) zone budget, so tier
        // 1 has nothing to do, yet the scope-wide total still exceeds
        // `eviction_threshold_pct * total` — only tier 2, run across all
        // three zones at once, can bring it back under.
        mgr.add(&scope, item(Zone::System, 100, 0));
        for t in 0..3u64 {
            mgr.add(&scope, item(Zone::Chronicle, 90, t));
            mgr.add(&scope, item(Zone::Memory, 90, t));
        }
        mgr.add(&scope, item(Zone::Workspace, 90, 0));
        mgr.add(&scope, item(Zone::Workspace, 90, 1));

        let ctx = ScoringContext::default();
        let applied = mgr.enforce_budget(&scope, 5, &ctx).await;
        assert!(!applied.iter().any(|b| b.tier == crate::eviction::EvictionTier::Tier1Deterministic));
        assert!(applied.iter().any(|b| b.tier == crate::eviction::EvictionTier::Tier2Scored));
        let usage = mgr.token_usage(&scope);
        let total_used: u32 = usage.values().sum();
        let target = (budget().total as f64 * budget().eviction_threshold_pct).floor() as u32;
        assert!(total_used <= target);
    }
}
