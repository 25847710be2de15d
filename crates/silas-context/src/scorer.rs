//! Tier-2 (scored) eviction strategies: a deterministic local scorer and an
//! advisory LLM scorer behind a circuit breaker. Both implement
//! [`Tier2Scorer`], so callers can swap strategies without touching the
//! eviction pipeline that drives them.

use async_trait::async_trait;
use silas_core::{ContextItem, Taint, Zone};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Everything the scorer needs beyond the candidate items themselves.
#[derive(Debug, Clone, Default)]
pub struct ScoringContext {
    pub current_goal: String,
    pub current_taint: Taint,
    /// ctx_ids referenced earlier in the turn (reference bonus factor).
    pub referenced_ids: HashSet<Uuid>,
    /// The last three chronicle entries, each truncated to 180 chars.
    pub recent_chronicle: Vec<String>,
}

/// Structured scorer reply: `{keep_groups, evict_groups}`, each a list of
/// `{reason, block_ids}` groups. Only `evict_groups` is honored.
#[derive(Debug, Clone, Default, serde::Deserialize, serde::Serialize)]
pub struct ScorerOutput {
    pub keep_groups: Vec<ScorerGroup>,
    pub evict_groups: Vec<ScorerGroup>,
}

/// One reasoned group of context ids within a [`ScorerOutput`].
#[derive(Debug, Clone, Default, serde::Deserialize, serde::Serialize)]
pub struct ScorerGroup {
    pub reason: String,
    pub block_ids: Vec<Uuid>,
}

/// A pluggable tier-2 eviction strategy. Given the evictable candidates
/// (non-system, non-pinned) and the current/target token totals, returns
/// the ids to evict, in the order they should be removed.
#[async_trait]
pub trait Tier2Scorer: Send + Sync {
    async fn select_evictions(
        &self,
        items: &[ContextItem],
        ctx: &ScoringContext,
        current_total_tokens: u32,
        target_total_tokens: u32,
    ) -> Vec<Uuid>;
}

/// Fixed per-zone priority table used by the recency/zone weighted score.
fn zone_factor(zone: Zone) -> f64 {
    match zone {
        Zone::System => 1.0,
        Zone::Memory => 0.5,
        Zone::Chronicle => 0.4,
        Zone::Workspace => 0.3,
    }
}

const WEIGHT_RECENCY: f64 = 0.25;
const WEIGHT_ZONE: f64 = 0.20;
const WEIGHT_TAINT: f64 = 0.15;
const WEIGHT_KEYWORD: f64 = 0.25;
const WEIGHT_REFERENCE: f64 = 0.15;

fn keyword_tokenizer(text: &str) -> HashSet<String> {
    static WORD_RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    let re = WORD_RE.get_or_init(|| regex::Regex::new(r"[a-zA-Z0-9_]+").expect("static regex"));
    re.find_iter(text).map(|m| m.as_str().to_lowercase()).collect()
}

/// Deterministic local scorer: a weighted-sum strategy over recency, zone
/// priority, taint match, keyword overlap, and reference count.
#[derive(Debug, Default)]
pub struct LocalScorer;

impl LocalScorer {
    fn score(&self, item: &ContextItem, ctx: &ScoringContext, current_turn: u64, max_age: u64, query_words: &HashSet<String>) -> f64 {
        let age = current_turn.saturating_sub(item.turn_number);
        let recency = if max_age == 0 { 1.0 } else { 1.0 - (age as f64 / max_age as f64) };
        let zone = zone_factor(item.zone);
        let taint = if item.taint == ctx.current_taint {
            1.0
        } else if item.taint == Taint::Owner {
            0.5
        } else {
            0.0
        };
        let item_words = keyword_tokenizer(&item.content);
        let overlap = if query_words.is_empty() {
            0.0
        } else {
            let shared = query_words.intersection(&item_words).count() as f64;
            (shared / query_words.len() as f64).min(1.0)
        };
        let reference = if ctx.referenced_ids.contains(&item.ctx_id) { 1.0 } else { 0.0 };

        recency * WEIGHT_RECENCY
            + zone * WEIGHT_ZONE
            + taint * WEIGHT_TAINT
            + overlap * WEIGHT_KEYWORD
            + reference * WEIGHT_REFERENCE
    }
}

#[async_trait]
impl Tier2Scorer for LocalScorer {
    async fn select_evictions(
        &self,
        items: &[ContextItem],
        ctx: &ScoringContext,
        current_total_tokens: u32,
        target_total_tokens: u32,
    ) -> Vec<Uuid> {
        if items.is_empty() || current_total_tokens <= target_total_tokens {
            return Vec::new();
        }
        let query_words = keyword_tokenizer(&ctx.current_goal);
        let current_turn = items.iter().map(|i| i.turn_number).max().unwrap_or(0);
        let max_age = items.iter().map(|i| current_turn.saturating_sub(i.turn_number)).max().unwrap_or(0).max(1);

        let mut scored: Vec<(f64, &ContextItem)> = items
            .iter()
            .map(|item| (self.score(item, ctx, current_turn, max_age, &query_words), item))
            .collect();
        scored.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut removed_tokens = 0u32;
        let mut evicted = Vec::new();
        for (_, item) in scored {
            if current_total_tokens.saturating_sub(removed_tokens) <= target_total_tokens {
                break;
            }
            removed_tokens += item.tokens;
            evicted.push(item.ctx_id);
        }
        evicted
    }
}

/// Invokes an advisory LLM scorer. Modeled as its own small protocol (`run`)
/// so `silas-context` never depends on a concrete LLM client crate.
#[async_trait]
pub trait ScorerClient: Send + Sync {
    async fn run(&self, prompt: &str) -> Result<ScorerOutput, String>;
}

#[derive(Debug)]
struct BreakerState {
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

/// Skips an unreliable advisory scorer for a cooldown after `n_fail`
/// consecutive failures (timeout, invalid output, error), closing again on
/// the next success.
pub struct CircuitBreaker {
    n_fail: u32,
    cooldown: Duration,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(n_fail: u32, cooldown: Duration) -> Self {
        CircuitBreaker { n_fail, cooldown, state: Mutex::new(BreakerState { consecutive_failures: 0, opened_at: None }) }
    }

    /// `true` if the breaker is currently open (scorer should be skipped).
    #[must_use]
    pub fn is_open(&self) -> bool {
        let mut state = self.state.lock().expect("breaker mutex poisoned");
        match state.opened_at {
            Some(opened) if opened.elapsed() < self.cooldown => true,
            Some(_) => {
                // Cooldown elapsed: half-open, allow the next call through.
                state.opened_at = None;
                state.consecutive_failures = 0;
                false
            }
            None => false,
        }
    }

    fn record_success(&self) {
        let mut state = self.state.lock().expect("breaker mutex poisoned");
        state.consecutive_failures = 0;
        state.opened_at = None;
    }

    fn record_failure(&self) {
        let mut state = self.state.lock().expect("breaker mutex poisoned");
        state.consecutive_failures += 1;
        if state.consecutive_failures >= self.n_fail {
            state.opened_at = Some(Instant::now());
        }
    }
}

/// Advisory LLM-backed tier-2 scorer. Degrades to returning no evictions
/// (letting the caller fall through to the aggressive heuristic) when the
/// breaker is open, the call times out, or the reply is malformed.
pub struct AdvisoryLlmScorer {
    client: Box<dyn ScorerClient>,
    breaker: CircuitBreaker,
    timeout: Duration,
}

impl AdvisoryLlmScorer {
    #[must_use]
    pub fn new(client: Box<dyn ScorerClient>, n_fail: u32, cooldown: Duration, timeout: Duration) -> Self {
        AdvisoryLlmScorer { client, breaker: CircuitBreaker::new(n_fail, cooldown), timeout }
    }

    fn build_prompt(&self, items: &[ContextItem], ctx: &ScoringContext) -> String {
        let mut prompt = String::new();
        prompt.push_str(&format!("goal: {}\n", ctx.current_goal));
        for entry in ctx.recent_chronicle.iter().take(3) {
            prompt.push_str(&format!("recent: {}\n", truncate_chars(entry, 180)));
        }
        for item in items {
            prompt.push_str(&format!(
                "{} | {} | {:?} | turn {} | {} | {}tok | rel={:.2} | pinned={} :: {}\n",
                item.ctx_id,
                item.zone.as_str(),
                item.kind,
                item.turn_number,
                item.source,
                item.tokens,
                item.relevance,
                item.pinned,
                truncate_chars(&item.content, 200)
            ));
        }
        prompt
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

#[async_trait]
impl Tier2Scorer for AdvisoryLlmScorer {
    async fn select_evictions(
        &self,
        items: &[ContextItem],
        ctx: &ScoringContext,
        current_total_tokens: u32,
        target_total_tokens: u32,
    ) -> Vec<Uuid> {
        if items.is_empty() || current_total_tokens <= target_total_tokens || self.breaker.is_open() {
            return Vec::new();
        }

        let prompt = self.build_prompt(items, ctx);
        let candidate_ids: HashSet<Uuid> = items.iter().map(|i| i.ctx_id).collect();
        let tokens_by_id: HashMap<Uuid, u32> = items.iter().map(|i| (i.ctx_id, i.tokens)).collect();

        let outcome = tokio::time::timeout(self.timeout, self.client.run(&prompt)).await;

        match outcome {
            Ok(Ok(output)) => {
                self.breaker.record_success();
                let mut removed_tokens = 0u32;
                let mut evicted = Vec::new();
                for group in &output.evict_groups {
                    for id in &group.block_ids {
                        if !candidate_ids.contains(id) || evicted.contains(id) {
                            continue;
                        }
                        if current_total_tokens.saturating_sub(removed_tokens) <= target_total_tokens {
                            return evicted;
                        }
                        removed_tokens += tokens_by_id.get(id).copied().unwrap_or(0);
                        evicted.push(*id);
                    }
                }
                evicted
            }
            Ok(Err(_)) | Err(_) => {
                self.breaker.record_failure();
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use silas_core::ContextKind;

    fn item(turn: u64, content: &str, tokens: u32) -> ContextItem {
        ContextItem {
            ctx_id: Uuid::new_v4(),
            zone: Zone::Chronicle,
            content: content.into(),
            tokens,
            created_at: Utc::now(),
            turn_number: turn,
            source: "user".into(),
            taint: Taint::Owner,
            kind: ContextKind::Message,
            relevance: 0.5,
            pinned: false,
            masked: false,
            original_tokens: None,
        }
    }

    #[tokio::test]
    async fn local_scorer_prefers_evicting_irrelevant_item() {
        let keep = {
            let mut i = item(5, "deploy kubernetes cluster now", 100);
            i.turn_number = 5;
            i
        };
        let evict = {
            let mut i = item(5, "pizza is delicious food item", 100);
            i.turn_number = 5;
            i
        };
        let items = vec![keep.clone(), evict.clone()];
        let ctx = ScoringContext { current_goal: "deploy kubernetes".into(), ..Default::default() };
        let scorer = LocalScorer;
        let evicted = scorer.select_evictions(&items, &ctx, 200, 100).await;
        assert_eq!(evicted, vec![evict.ctx_id]);
    }

    struct FlakyClient;
    #[async_trait]
    impl ScorerClient for FlakyClient {
        async fn run(&self, _prompt: &str) -> Result<ScorerOutput, String> {
            Err("boom".to_string())
        }
    }

    #[tokio::test]
    async fn breaker_opens_after_n_failures() {
        let scorer = AdvisoryLlmScorer::new(Box::new(FlakyClient), 3, Duration::from_secs(300), Duration::from_millis(50));
        let items = vec![item(1, "a", 10)];
        let ctx = ScoringContext::default();
        for _ in 0..3 {
            let _ = scorer.select_evictions(&items, &ctx, 100, 0).await;
        }
        assert!(scorer.breaker.is_open());
    }
}
