//! Placeholder implementations of the agent-facing ports an LLM client
//! would normally back. `silas-cli` wires these by default since the LLM
//! client itself is an excluded external collaborator; a deployment with a
//! real model swaps these for its own `ProxyAgent`/`PlannerAgent`.

use async_trait::async_trait;
use silas_orchestrator::{PlanOutcome, PlannerAgent, ProxyAgent, Suggestion, SuggestionEngine};
use silas_core::{Budget, BudgetUsed, ExecutorType, OnStuck, WorkItem, WorkItemStatus};
use uuid::Uuid;

/// Routes every turn straight to a reply, echoing the rendered context back
/// rather than ever escalating to the planner.
pub struct EchoProxyAgent;

#[async_trait]
impl ProxyAgent for EchoProxyAgent {
    async fn route(&self, message: &str, _rendered_context: &str, _toolset: &[String]) -> Result<silas_orchestrator::RouteDecision, String> {
        Ok(silas_orchestrator::RouteDecision {
            route: "reply".to_string(),
            reason: "no LLM client configured; echoing the turn".to_string(),
            response: format!("(no model configured) you said: {message}"),
            interaction_register: "casual".to_string(),
            interaction_mode: "chat".to_string(),
            context_profile: "default".to_string(),
        })
    }
}

/// Produces a single inert `note` work item for whatever goal it is given.
/// Never requires approval, since there is no model output to vet.
pub struct StubPlannerAgent;

#[async_trait]
impl PlannerAgent for StubPlannerAgent {
    async fn plan(&self, goal: &str, _toolset: &[String]) -> Result<PlanOutcome, String> {
        let work_item = WorkItem {
            id: Uuid::new_v4().to_string(),
            item_type: "note".to_string(),
            title: "unplanned goal".to_string(),
            body: goal.to_string(),
            executor_type: ExecutorType::Skill,
            skills: Vec::new(),
            depends_on: Vec::new(),
            tasks: Vec::new(),
            status: WorkItemStatus::Pending,
            attempts: 0,
            budget: Budget { max_attempts: 1, max_tokens: 0, max_wall_time_seconds: 0, max_planner_calls: 0 },
            budget_used: BudgetUsed::default(),
            verification: Vec::new(),
            verification_results: Vec::new(),
            on_stuck: OnStuck::FailFast,
            approval_token: None,
            input_artifacts_from: Vec::new(),
            gates: Vec::new(),
            last_error: None,
        };
        Ok(PlanOutcome { work_item, requires_approval: false })
    }
}

/// Surfaces no proactive suggestions. A real deployment would drive this
/// from the personality/autonomy engine, which is out of scope here.
pub struct NoSuggestionEngine;

#[async_trait]
impl SuggestionEngine for NoSuggestionEngine {
    async fn suggest(&self, _connection_id: &str) -> Vec<Suggestion> {
        Vec::new()
    }
}
