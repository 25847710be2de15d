//! Trait boundaries for the collaborators the executor consumes but does
//! not implement: the skill runtime, shell/python backends, external
//! verification, the planner-consult channel, and the replanner.

use crate::envelope::{ExecutionEnvelope, ExecutionResult};
use async_trait::async_trait;
use silas_core::VerificationCheck;

/// One step of a skill invocation's input.
#[derive(Debug, Clone)]
pub struct SkillInvocation {
    pub work_item_id: String,
    pub title: String,
    pub body: String,
    pub attempt: u32,
    pub depends_on: Vec<String>,
}

/// The outcome of running one named skill.
#[derive(Debug, Clone)]
pub struct SkillResult {
    pub success: bool,
    pub output: Option<String>,
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// Runs a named skill against a work item's attempt body.
#[async_trait]
pub trait SkillExecutor: Send + Sync {
    async fn execute(&self, skill_name: &str, invocation: &SkillInvocation) -> SkillResult;
}

/// A registered backend for a non-skill executor type (`shell`, `python`).
#[async_trait]
pub trait EphemeralExecutor: Send + Sync {
    async fn execute(&self, envelope: &ExecutionEnvelope) -> Result<ExecutionResult, String>;
}

/// One verification check's outcome.
#[derive(Debug, Clone)]
pub struct VerificationOutcome {
    pub name: String,
    pub passed: bool,
    pub reason: String,
}

/// A verification report: every check's outcome and whether all passed.
#[derive(Debug, Clone)]
pub struct VerificationReport {
    pub all_passed: bool,
    pub results: Vec<VerificationOutcome>,
}

/// Runs a work item's post-attempt verification checks in a dedicated,
/// short-lived sandbox.
#[async_trait]
pub trait VerificationRunner: Send + Sync {
    async fn run_checks(&self, checks: &[VerificationCheck]) -> Result<VerificationReport, String>;
}

/// Consults the planner for guidance once the normal retry loop is
/// exhausted.
#[async_trait]
pub trait ConsultPlannerManager: Send + Sync {
    /// `Ok(Some(guidance))` on advice, `Ok(None)` if the planner offered
    /// nothing actionable (e.g. a consult timeout), `Err` on a hard failure.
    async fn consult(&self, work_item_id: &str, failure_context: &str, trace_id: &str) -> Result<Option<String>, String>;
}

/// One entry in a work item's failure history, passed to the replanner.
#[derive(Debug, Clone)]
pub struct FailureEntry {
    pub phase: String,
    pub error: String,
    pub attempts: u32,
}

/// Triggers a replan once both the retry loop and the planner consult have
/// failed to recover a stuck work item.
#[async_trait]
pub trait ReplanManager: Send + Sync {
    /// `Ok(true)` if a replan was accepted and enqueued.
    async fn trigger_replan(
        &self,
        work_item_id: &str,
        original_goal: &str,
        failure_history: &[FailureEntry],
        trace_id: &str,
        current_depth: u32,
    ) -> Result<bool, String>;
}
