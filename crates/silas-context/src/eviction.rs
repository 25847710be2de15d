//! Two-tier eviction: tier-1 deterministic heuristic,
//! tier-2 scored (local or advisory-LLM), and an aggressive heuristic
//! fallback that always converges.

use crate::scorer::{ScoringContext, Tier2Scorer};
use silas_core::{ContextItem, Zone};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Why a batch of ids was evicted, for audit logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionTier {
    Tier1Deterministic,
    Tier2Scored,
    AggressiveHeuristic,
}

/// One eviction decision: which ids, and which tier decided it.
#[derive(Debug, Clone)]
pub struct EvictionBatch {
    pub tier: EvictionTier,
    pub ids: Vec<Uuid>,
}

/// Candidates for eviction: items that are neither in the system zone nor pinned.
fn evictable(items: &[ContextItem]) -> Vec<&ContextItem> {
    items.iter().filter(|i| !i.zone.is_system() && !i.pinned).collect()
}

fn total_tokens(items: &[&ContextItem]) -> u32 {
    items.iter().map(|i| i.tokens).sum()
}

/// Run the full eviction policy against every zone of one scope's current
/// items. Tier 1 brings each evictable zone under its own `zone_budgets`
/// entry; if scope-wide usage still exceeds `eviction_threshold * total_budget`
/// afterward, tier 2 (and then the aggressive heuristic) runs across every
/// evictable zone together. Returns the ordered list of batches actually
/// applied; the caller removes the named ids from its store after each batch.
pub async fn evict(
    items: &[ContextItem],
    zone_budgets: &HashMap<Zone, u32>,
    total_budget: u32,
    eviction_threshold: f64,
    scorer: &dyn Tier2Scorer,
    scoring_ctx: &ScoringContext,
) -> Vec<EvictionBatch> {
    let scope_target = (total_budget as f64 * eviction_threshold).floor() as u32;
    let mut batches = Vec::new();
    let mut removed: HashSet<Uuid> = HashSet::new();

    let remaining = |removed: &HashSet<Uuid>| -> Vec<&ContextItem> {
        items.iter().filter(|i| !removed.contains(&i.ctx_id)).collect()
    };
    let evictable_remaining = |removed: &HashSet<Uuid>| -> Vec<&ContextItem> {
        evictable(items).into_iter().filter(|i| !removed.contains(&i.ctx_id)).collect()
    };

    // Tier 1: deterministic heuristic, per zone, each down to its own full
    // zone budget. Ascending (relevance, turn, created_at, ctx_id).
    let mut tier1_ids = Vec::new();
    for zone in Zone::EVICTION_PRIORITY {
        let Some(&zone_budget) = zone_budgets.get(&zone) else { continue };
        let mut in_zone: Vec<&ContextItem> =
            evictable_remaining(&removed).into_iter().filter(|i| i.zone == zone).collect();
        let mut zone_usage = total_tokens(&in_zone);
        if zone_usage <= zone_budget {
            continue;
        }
        in_zone.sort_by(|a, b| a.eviction_cmp(b));
        for item in in_zone {
            if zone_usage <= zone_budget {
                break;
            }
            zone_usage = zone_usage.saturating_sub(item.tokens);
            removed.insert(item.ctx_id);
            tier1_ids.push(item.ctx_id);
        }
    }
    if !tier1_ids.is_empty() {
        batches.push(EvictionBatch { tier: EvictionTier::Tier1Deterministic, ids: tier1_ids });
    }

    // Tier 2: scored, only if scope-wide usage still exceeds the threshold.
    let scope_usage = total_tokens(&remaining(&removed));
    if scope_usage > scope_target {
        let candidates = evictable_remaining(&removed);
        let pool: Vec<ContextItem> = candidates.into_iter().cloned().collect();
        let ids = scorer.select_evictions(&pool, scoring_ctx, scope_usage, scope_target).await;
        if !ids.is_empty() {
            removed.extend(ids.iter().copied());
            batches.push(EvictionBatch { tier: EvictionTier::Tier2Scored, ids });
        }
    }

    // Aggressive heuristic: guarantees convergence across the evictable zones
    // in priority order chronicle -> memory -> workspace, oldest first.
    let scope_usage = total_tokens(&remaining(&removed));
    if scope_usage > scope_target {
        let candidates = evictable_remaining(&removed);
        let mut ids = Vec::new();
        let mut budget_left = scope_usage.saturating_sub(scope_target);
        for zone in Zone::EVICTION_PRIORITY {
            if budget_left == 0 {
                break;
            }
            let mut in_zone: Vec<&ContextItem> = candidates.iter().copied().filter(|i| i.zone == zone).collect();
            in_zone.sort_by(|a, b| a.created_at.cmp(&b.created_at));
            for item in in_zone {
                if budget_left == 0 {
                    break;
                }
                ids.push(item.ctx_id);
                budget_left = budget_left.saturating_sub(item.tokens.min(budget_left));
            }
        }
        if !ids.is_empty() {
            batches.push(EvictionBatch { tier: EvictionTier::AggressiveHeuristic, ids });
        }
    }

    batches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scorer::LocalScorer;
    use chrono::Utc;
    use silas_core::{ContextKind, Taint};

    fn item(zone: Zone, relevance: f64, turn: u64, tokens: u32) -> ContextItem {
        ContextItem {
            ctx_id: Uuid::new_v4(),
            zone,
            content: "x".repeat(tokens as usize * 4),
            tokens,
            created_at: Utc::now(),
            turn_number: turn,
            source: "s".into(),
            taint: Taint::Owner,
            kind: ContextKind::Message,
            relevance,
            pinned: false,
            masked: false,
            original_tokens: None,
        }
    }

    #[tokio::test]
    async fn tier1_evicts_lowest_relevance_first() {
        let low = item(Zone::Workspace, 0.1, 1, 50);
        let high = item(Zone::Workspace, 0.9, 1, 50);
        let items = vec![low.clone(), high.clone()];
        let scorer = LocalScorer;
        let ctx = ScoringContext::default();
        let zone_budgets = HashMap::from([(Zone::Workspace, 60)]);
        let batches = evict(&items, &zone_budgets, 1000, 0.8, &scorer, &ctx).await;
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].tier, EvictionTier::Tier1Deterministic);
        assert_eq!(batches[0].ids, vec![low.ctx_id]);
    }

    #[tokio::test]
    async fn pinned_and_system_items_are_never_selected() {
        let pinned = item(Zone::Workspace, 0.0, 1, 1000).pinned();
        let system = item(Zone::System, 0.0, 1, 1000);
        let items = vec![pinned, system];
        let scorer = LocalScorer;
        let ctx = ScoringContext::default();
        let zone_budgets = HashMap::from([(Zone::Workspace, 10)]);
        let batches = evict(&items, &zone_budgets, 10, 0.8, &scorer, &ctx).await;
        assert!(batches.is_empty());
    }

    #[tokio::test]
    async fn under_budget_evicts_nothing() {
        let single = item(Zone::Workspace, 0.5, 1, 10);
        let items = vec![single];
        let scorer = LocalScorer;
        let ctx = ScoringContext::default();
        let zone_budgets = HashMap::from([(Zone::Workspace, 1000)]);
        let batches = evict(&items, &zone_budgets, 1000, 0.8, &scorer, &ctx).await;
        assert!(batches.is_empty());
    }

    #[tokio::test]
    async fn tier2_runs_across_zones_when_scope_usage_exceeds_threshold() {
        // Each zone is within its own per-zone budget after tier 1, but
        // combined scope usage still exceeds the scope-wide threshold, so
        // tier 2 must see candidates from both zones at once.
        let chronicle_item = item(Zone::Chronicle, 0.1, 1, 40);
        let memory_item = item(Zone::Memory, 0.2, 1, 40);
        let items = vec![chronicle_item.clone(), memory_item.clone()];
        let scorer = LocalScorer;
        let ctx = ScoringContext::default();
        let zone_budgets = HashMap::from([(Zone::Chronicle, 50), (Zone::Memory, 50)]);
        let batches = evict(&items, &zone_budgets, 50, 0.8, &scorer, &ctx).await;
        assert!(batches.iter().any(|b| b.tier == EvictionTier::Tier2Scored));
        let evicted: HashSet<Uuid> = batches.iter().flat_map(|b| b.ids.iter().copied()).collect();
        assert!(evicted.contains(&chronicle_item.ctx_id));
    }
}
