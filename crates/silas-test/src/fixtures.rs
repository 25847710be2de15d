//! Test fixtures for common Silas types.

use silas_core::budget::{Budget, BudgetUsed};
use silas_core::ports::InboundMessage;
use silas_core::{ExecutorType, Gate, GateProviderKind, GateTrigger, OnStuck, Scope, WorkItem, WorkItemStatus};
use std::collections::HashMap;

/// A generous budget unlikely to be exhausted by a single test.
#[must_use]
pub fn test_budget() -> Budget {
    Budget { max_attempts: 5, max_tokens: 100_000, max_wall_time_seconds: 300, max_planner_calls: 3 }
}

/// A zeroed budget-used accumulator.
#[must_use]
pub fn test_budget_used() -> BudgetUsed {
    BudgetUsed::default()
}

/// A minimal skill-executor work item with no dependencies, verification,
/// or gates — the common case most executor tests start from.
#[must_use]
pub fn test_work_item(id: impl Into<String>) -> WorkItem {
    WorkItem {
        id: id.into(),
        item_type: "task".to_string(),
        title: "test work item".to_string(),
        body: "do the thing".to_string(),
        executor_type: ExecutorType::Skill,
        skills: Vec::new(),
        depends_on: Vec::new(),
        tasks: Vec::new(),
        status: WorkItemStatus::Pending,
        attempts: 0,
        budget: test_budget(),
        budget_used: BudgetUsed::default(),
        verification: Vec::new(),
        verification_results: Vec::new(),
        on_stuck: OnStuck::FailFast,
        approval_token: None,
        input_artifacts_from: Vec::new(),
        gates: Vec::new(),
        last_error: None,
    }
}

/// A shell work item running `command` with no verification or gates.
#[must_use]
pub fn test_shell_work_item(id: impl Into<String>, command: impl Into<String>) -> WorkItem {
    WorkItem { executor_type: ExecutorType::Shell, body: command.into(), ..test_work_item(id) }
}

/// A policy gate with a trivial always-continue predicate check.
#[must_use]
pub fn test_gate(name: impl Into<String>, trigger: GateTrigger) -> Gate {
    Gate {
        name: name.into(),
        trigger,
        after_step: None,
        provider: GateProviderKind::Predicate,
        check_type: "always_continue".to_string(),
        check: String::new(),
        config: HashMap::new(),
        extract_key: None,
        allowed_values: Vec::new(),
        approval_values: Vec::new(),
        min_value: None,
        max_value: None,
        on_block: silas_core::Escalation::BlockWithMessage { message: None },
        promote_to_policy: false,
    }
}

/// A blocking input gate, for exercising the input-gate early-return path.
#[must_use]
pub fn test_blocking_gate(name: impl Into<String>) -> Gate {
    Gate { on_block: silas_core::Escalation::BlockWithMessage { message: Some("blocked by policy".to_string()) }, ..test_gate(name, GateTrigger::EveryUserMessage) }
}

/// A non-owner scope, distinct from [`silas_core::Scope::owner`].
#[must_use]
pub fn test_connection_scope(connection_id: impl Into<String>) -> Scope {
    Scope::new(connection_id)
}

/// An inbound message with no reply threading.
#[must_use]
pub fn test_inbound_message(text: impl Into<String>) -> InboundMessage {
    InboundMessage { text: text.into(), reply_to: None }
}
