//! Fake implementations of the `silas-orchestrator::ports` traits.

use async_trait::async_trait;
use std::sync::Mutex;

use silas_orchestrator::{PlanOutcome, PlannerAgent, ProxyAgent, QueueBridge, RouteDecision, Suggestion, SuggestionEngine};

/// A proxy agent that always returns a fixed, configurable route.
pub struct FakeProxyAgent {
    decision: RouteDecision,
}

impl FakeProxyAgent {
    #[must_use]
    pub fn responding(response: impl Into<String>) -> Self {
        FakeProxyAgent {
            decision: RouteDecision {
                route: "respond".to_string(),
                reason: String::new(),
                response: response.into(),
                interaction_register: "default".to_string(),
                interaction_mode: "default".to_string(),
                context_profile: "default".to_string(),
            },
        }
    }

    #[must_use]
    pub fn routing_to_planner(reason: impl Into<String>) -> Self {
        FakeProxyAgent {
            decision: RouteDecision {
                route: "planner".to_string(),
                reason: reason.into(),
                response: String::new(),
                interaction_register: "default".to_string(),
                interaction_mode: "default".to_string(),
                context_profile: "default".to_string(),
            },
        }
    }
}

#[async_trait]
impl ProxyAgent for FakeProxyAgent {
    async fn route(&self, _message: &str, _rendered_context: &str, _toolset: &[String]) -> Result<RouteDecision, String> {
        Ok(self.decision.clone())
    }
}

/// A planner agent that always returns a fixed, configurable plan.
pub struct FakePlannerAgent {
    outcome: PlanOutcome,
}

impl FakePlannerAgent {
    #[must_use]
    pub fn producing(work_item: silas_core::WorkItem, requires_approval: bool) -> Self {
        FakePlannerAgent { outcome: PlanOutcome { work_item, requires_approval } }
    }
}

#[async_trait]
impl PlannerAgent for FakePlannerAgent {
    async fn plan(&self, _goal: &str, _toolset: &[String]) -> Result<PlanOutcome, String> {
        Ok(self.outcome.clone())
    }
}

/// A suggestion engine that returns a fixed, configurable list once, then
/// nothing (mirrors a real engine not repeating the same suggestion).
pub struct FakeSuggestionEngine {
    queue: Mutex<Vec<Suggestion>>,
}

impl FakeSuggestionEngine {
    #[must_use]
    pub fn with_suggestions(suggestions: Vec<Suggestion>) -> Self {
        FakeSuggestionEngine { queue: Mutex::new(suggestions) }
    }

    #[must_use]
    pub fn empty() -> Self {
        FakeSuggestionEngine { queue: Mutex::new(Vec::new()) }
    }
}

#[async_trait]
impl SuggestionEngine for FakeSuggestionEngine {
    async fn suggest(&self, _connection_id: &str) -> Vec<Suggestion> {
        std::mem::take(&mut self.queue.lock().expect("fake suggestion engine mutex poisoned"))
    }
}

/// A queue bridge stand-in; `unavailable()` always falls back to the
/// procedural path, mirroring a queue worker that is not running.
pub struct FakeQueueBridge {
    reply: Result<Option<String>, String>,
}

impl FakeQueueBridge {
    #[must_use]
    pub fn unavailable() -> Self {
        FakeQueueBridge { reply: Ok(None) }
    }

    #[must_use]
    pub fn responding(text: impl Into<String>) -> Self {
        FakeQueueBridge { reply: Ok(Some(text.into())) }
    }
}

#[async_trait]
impl QueueBridge for FakeQueueBridge {
    async fn dispatch(&self, _trace_id: &str, _message: &str) -> Result<Option<String>, String> {
        self.reply.clone()
    }
}
