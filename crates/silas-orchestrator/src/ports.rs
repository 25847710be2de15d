//! Trait boundaries for the agent-facing collaborators the turn pipeline
//! calls through: the proxy router, the planner, the suggestion engine,
//! and an optional queue bridge for the execution-dispatch path.

use async_trait::async_trait;
use silas_core::WorkItem;

/// What the proxy agent decided to do with a turn.
#[derive(Debug, Clone)]
pub struct RouteDecision {
    pub route: String,
    pub reason: String,
    pub response: String,
    pub interaction_register: String,
    pub interaction_mode: String,
    pub context_profile: String,
}

/// Routes a rendered turn to a response or to the planner.
#[async_trait]
pub trait ProxyAgent: Send + Sync {
    async fn route(&self, message: &str, rendered_context: &str, toolset: &[String]) -> Result<RouteDecision, String>;
}

/// A plan produced by the planner agent for a routed turn.
#[derive(Debug, Clone)]
pub struct PlanOutcome {
    pub work_item: WorkItem,
    pub requires_approval: bool,
}

/// Produces an executable work item for a turn the proxy routed to planning.
#[async_trait]
pub trait PlannerAgent: Send + Sync {
    async fn plan(&self, goal: &str, toolset: &[String]) -> Result<PlanOutcome, String>;
}

/// A proactive suggestion surfaced outside the normal request/response flow.
#[derive(Debug, Clone)]
pub struct Suggestion {
    pub text: String,
    pub confidence: f64,
}

/// Generates proactive suggestions for a connection ahead of each turn.
#[async_trait]
pub trait SuggestionEngine: Send + Sync {
    async fn suggest(&self, connection_id: &str) -> Vec<Suggestion>;
}

/// Dispatches a turn through an external queue instead of the procedural
/// proxy/planner path. Implementations that are unavailable or not running
/// should return `Ok(None)` so the orchestrator falls back to the
/// procedural path.
#[async_trait]
pub trait QueueBridge: Send + Sync {
    async fn dispatch(&self, trace_id: &str, message: &str) -> Result<Option<String>, String>;
}
