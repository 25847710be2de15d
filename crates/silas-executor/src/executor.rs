//! Dependency-ordered execution of a work item and its closure: per-id
//! retry/verify loop, approval gating, budget accounting, and stuck
//! recovery via planner consult and replan escalation.

use crate::dag;
use crate::envelope::ExecutionEnvelope;
use crate::ports::{
    ConsultPlannerManager, EphemeralExecutor, FailureEntry, ReplanManager, SkillExecutor, SkillInvocation, SkillResult,
    VerificationRunner,
};
use silas_core::ports::{ApprovalVerifier, AuditLog, WorkItemStore};
use silas_core::{BudgetUsed, ExecutorType, OnStuck, VerificationResult, WorkItem, WorkItemResult, WorkItemStatus};
use silas_sandbox::SandboxConfig;
use std::sync::Arc;
use uuid::Uuid;

/// Runs a work item's dependency closure to completion, one id at a time in
/// topological order, retrying and verifying each before moving on.
pub struct WorkItemExecutor {
    skill_executor: Arc<dyn SkillExecutor>,
    store: Arc<dyn WorkItemStore>,
    shell_backend: Arc<dyn EphemeralExecutor>,
    python_backend: Arc<dyn EphemeralExecutor>,
    approval_verifier: Option<Arc<dyn ApprovalVerifier>>,
    verification_runner: Option<Arc<dyn VerificationRunner>>,
    audit: Option<Arc<dyn AuditLog>>,
    consult_manager: Option<Arc<dyn ConsultPlannerManager>>,
    replan_manager: Option<Arc<dyn ReplanManager>>,
}

impl WorkItemExecutor {
    #[must_use]
    pub fn new(
        skill_executor: Arc<dyn SkillExecutor>,
        store: Arc<dyn WorkItemStore>,
        shell_backend: Arc<dyn EphemeralExecutor>,
        python_backend: Arc<dyn EphemeralExecutor>,
    ) -> Self {
        WorkItemExecutor {
            skill_executor,
            store,
            shell_backend,
            python_backend,
            approval_verifier: None,
            verification_runner: None,
            audit: None,
            consult_manager: None,
            replan_manager: None,
        }
    }

    #[must_use]
    pub fn with_approval_verifier(mut self, verifier: Arc<dyn ApprovalVerifier>) -> Self {
        self.approval_verifier = Some(verifier);
        self
    }

    #[must_use]
    pub fn with_verification_runner(mut self, runner: Arc<dyn VerificationRunner>) -> Self {
        self.verification_runner = Some(runner);
        self
    }

    #[must_use]
    pub fn with_audit(mut self, audit: Arc<dyn AuditLog>) -> Self {
        self.audit = Some(audit);
        self
    }

    #[must_use]
    pub fn with_consult_manager(mut self, manager: Arc<dyn ConsultPlannerManager>) -> Self {
        self.consult_manager = Some(manager);
        self
    }

    #[must_use]
    pub fn with_replan_manager(mut self, manager: Arc<dyn ReplanManager>) -> Self {
        self.replan_manager = Some(manager);
        self
    }

    /// Persists `item`, resolves its dependency closure, executes each id in
    /// topological order, and returns the root's aggregated result.
    pub async fn execute(&self, item: &WorkItem) -> WorkItemResult {
        let root_item = item.clone();
        self.persist(&root_item).await;

        let (items_by_id, prerequisites) = match dag::resolve_closure(self.store.as_ref(), &root_item).await {
            Ok(resolved) => resolved,
            Err(e) => return self.mark_failed(root_item, &e.to_string(), None).await,
        };
        let ordered_ids = match dag::topological_sort(&prerequisites) {
            Ok(ids) => ids,
            Err(e) => return self.mark_failed(root_item, &e.to_string(), None).await,
        };

        let mut aggregate = BudgetUsed::default();
        let mut execution_results: std::collections::HashMap<String, WorkItemResult> = std::collections::HashMap::new();

        for id in &ordered_ids {
            let work_item = items_by_id.get(id).expect("id came from items_by_id's own keys").clone();
            let deps = prerequisites.get(id).cloned().unwrap_or_default();
            let mut unmet: Vec<&String> = deps
                .iter()
                .filter(|dep_id| !matches!(execution_results.get(*dep_id), Some(r) if r.status == WorkItemStatus::Done))
                .collect();
            if !unmet.is_empty() {
                unmet.sort();
                let unmet_str = unmet.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ");
                return self.mark_failed(root_item, &format!("dependency not completed: {unmet_str}"), Some(aggregate)).await;
            }

            if work_item.status == WorkItemStatus::Done {
                let done_result = WorkItemResult {
                    id: work_item.id.clone(),
                    status: WorkItemStatus::Done,
                    last_error: None,
                    budget_used: work_item.budget_used,
                    summary: format!("Work item {} already complete.", work_item.id),
                };
                aggregate.merge(&done_result.budget_used);
                execution_results.insert(work_item.id.clone(), done_result);
                continue;
            }

            let result = self.execute_single(&work_item).await;
            aggregate.merge(&result.budget_used);
            let failed = result.status != WorkItemStatus::Done;
            execution_results.insert(work_item.id.clone(), result);
            if failed {
                let result = execution_results.remove(id).expect("just inserted");
                if *id == root_item.id {
                    return result;
                }
                let reason = result.last_error.clone().unwrap_or_else(|| result.summary.clone());
                return self.mark_failed(root_item, &format!("dependency {id} failed: {reason}"), Some(aggregate)).await;
            }
        }

        let summary = format!("Executed {} work item(s) successfully.", ordered_ids.len());
        if let Some(root_result) = execution_results.remove(&root_item.id) {
            return WorkItemResult { summary, budget_used: aggregate, ..root_result };
        }
        WorkItemResult { id: root_item.id.clone(), status: WorkItemStatus::Done, last_error: None, budget_used: aggregate, summary }
    }

    async fn execute_single(&self, item: &WorkItem) -> WorkItemResult {
        let mut work_item = item.clone();
        let mut used = work_item.budget_used;
        let max_attempts = work_item.budget.max_attempts.max(1);
        let mut last_error: Option<String> = None;

        let (approved, approval_reason) = self.check_execution_approval(&work_item).await;
        if !approved {
            self.audit_event(
                "execution_blocked_no_approval",
                serde_json::json!({"work_item_id": work_item.id, "reason": approval_reason}),
            )
            .await;
            return self.mark_blocked(work_item, &format!("execution_blocked_no_approval: {approval_reason}"), used).await;
        }

        for _ in 0..max_attempts {
            if used.is_exhausted(&work_item.budget) {
                last_error = Some("budget exhausted before attempt".to_string());
                break;
            }

            work_item.attempts += 1;
            used.attempts += 1;
            used.executor_runs += 1;
            work_item.status = WorkItemStatus::Running;
            work_item.budget_used = used;
            self.persist(&work_item).await;

            let attempt_body = build_attempt_body(&work_item, last_error.as_deref(), None);
            let (attempt_ok, attempt_error) = self.execute_attempt(&work_item, &mut used, &attempt_body).await;
            if !attempt_ok {
                last_error = Some(attempt_error.unwrap_or_else(|| "execution attempt failed".to_string()));
            }
            work_item.budget_used = used;

            if attempt_ok {
                let (verification_ok, verification_results, verification_error) = self.run_external_verification(&work_item).await;
                work_item.verification_results = verification_results;
                if !verification_ok {
                    last_error = Some(verification_error.unwrap_or_else(|| "verification failed".to_string()));
                    if used.is_exhausted(&work_item.budget) {
                        break;
                    }
                    continue;
                }

                work_item.status = WorkItemStatus::Done;
                self.persist(&work_item).await;
                return WorkItemResult {
                    id: work_item.id.clone(),
                    status: WorkItemStatus::Done,
                    last_error: None,
                    budget_used: used,
                    summary: format!("Work item {} completed.", work_item.id),
                };
            }

            if used.is_exhausted(&work_item.budget) {
                last_error = Some(last_error.unwrap_or_else(|| "budget exhausted".to_string()));
                break;
            }
        }

        if let Some(stuck_result) = self.attempt_stuck_recovery(&mut work_item, &mut used, last_error.clone()).await {
            return stuck_result;
        }

        work_item.status = WorkItemStatus::Failed;
        work_item.budget_used = used;
        self.persist(&work_item).await;
        WorkItemResult {
            id: work_item.id.clone(),
            status: WorkItemStatus::Failed,
            last_error,
            budget_used: used,
            summary: format!("Work item {} failed.", work_item.id),
        }
    }

    async fn execute_attempt(&self, work_item: &WorkItem, used: &mut BudgetUsed, attempt_body: &str) -> (bool, Option<String>) {
        if work_item.executor_type == ExecutorType::Skill {
            self.execute_skill_attempt(work_item, used, attempt_body).await
        } else {
            self.execute_registered_attempt(work_item, used).await
        }
    }

    async fn execute_skill_attempt(&self, work_item: &WorkItem, used: &mut BudgetUsed, attempt_body: &str) -> (bool, Option<String>) {
        if work_item.skills.is_empty() {
            used.tokens += estimate_tokens(Some(attempt_body), None);
            return (true, None);
        }

        for skill_name in &work_item.skills {
            let invocation = SkillInvocation {
                work_item_id: work_item.id.clone(),
                title: work_item.title.clone(),
                body: attempt_body.to_string(),
                attempt: work_item.attempts,
                depends_on: work_item.depends_on.clone(),
            };
            let SkillResult { success, output, error, duration_ms } = self.skill_executor.execute(skill_name, &invocation).await;
            used.tokens += estimate_tokens(output.as_deref(), error.as_deref());
            used.wall_time_seconds += duration_ms / 1000;
            if !success {
                return (false, Some(error.unwrap_or_else(|| format!("skill '{skill_name}' failed"))));
            }
        }
        (true, None)
    }

    async fn execute_registered_attempt(&self, work_item: &WorkItem, used: &mut BudgetUsed) -> (bool, Option<String>) {
        let backend: &Arc<dyn EphemeralExecutor> = match work_item.executor_type {
            ExecutorType::Shell => &self.shell_backend,
            ExecutorType::Python => &self.python_backend,
            ExecutorType::Skill => unreachable!("skill attempts are dispatched separately"),
        };

        let envelope = match build_execution_envelope(work_item) {
            Ok(envelope) => envelope,
            Err(e) => return (false, Some(e)),
        };

        let result = match backend.execute(&envelope).await {
            Ok(result) => result,
            Err(e) => return (false, Some(format!("{} executor error: {e}", executor_type_label(work_item.executor_type)))),
        };

        used.tokens += estimate_tokens(result.return_value.as_deref(), result.error.as_deref());
        used.wall_time_seconds += result.duration_seconds.max(0.0).round() as u64;

        if result.success {
            (true, None)
        } else {
            (false, Some(result.error.unwrap_or_else(|| format!("{} execution failed", executor_type_label(work_item.executor_type)))))
        }
    }

    async fn attempt_stuck_recovery(&self, work_item: &mut WorkItem, used: &mut BudgetUsed, last_error: Option<String>) -> Option<WorkItemResult> {
        if work_item.on_stuck != OnStuck::ConsultPlanner {
            return None;
        }

        let mut failure_context = last_error.unwrap_or_else(|| "unknown failure".to_string());
        let (guidance, guidance_error) = self.consult_planner(work_item, used, &failure_context).await;
        if let Some(guidance) = guidance {
            let guided_result = self.execute_guided_retry(work_item, used, &failure_context, &guidance).await;
            if guided_result.status == WorkItemStatus::Done {
                return Some(guided_result);
            }
            failure_context = guided_result.last_error.unwrap_or(failure_context);
        } else if let Some(guidance_error) = guidance_error {
            failure_context = format!("{failure_context}; {guidance_error}");
        }

        self.trigger_replan(work_item, used, &failure_context).await
    }

    async fn execute_guided_retry(&self, work_item: &mut WorkItem, used: &mut BudgetUsed, last_error: &str, guidance: &str) -> WorkItemResult {
        work_item.attempts += 1;
        used.attempts += 1;
        used.executor_runs += 1;
        work_item.status = WorkItemStatus::Running;
        work_item.budget_used = *used;
        self.persist(work_item).await;

        let attempt_body = build_attempt_body(work_item, Some(last_error), Some(guidance));
        let (attempt_ok, attempt_error) = self.execute_attempt(work_item, used, &attempt_body).await;
        let error = if attempt_ok {
            let (verification_ok, verification_results, verification_error) = self.run_external_verification(work_item).await;
            work_item.verification_results = verification_results;
            if verification_ok {
                work_item.status = WorkItemStatus::Done;
                work_item.budget_used = *used;
                self.persist(work_item).await;
                return WorkItemResult {
                    id: work_item.id.clone(),
                    status: WorkItemStatus::Done,
                    last_error: None,
                    budget_used: *used,
                    summary: format!("Work item {} completed with planner guidance.", work_item.id),
                };
            }
            verification_error.unwrap_or_else(|| "verification failed".to_string())
        } else {
            attempt_error.unwrap_or_else(|| "execution attempt failed".to_string())
        };

        work_item.status = WorkItemStatus::Failed;
        work_item.budget_used = *used;
        self.persist(work_item).await;
        WorkItemResult {
            id: work_item.id.clone(),
            status: WorkItemStatus::Failed,
            last_error: Some(error),
            budget_used: *used,
            summary: format!("Work item {} guided retry failed.", work_item.id),
        }
    }

    async fn consult_planner(&self, work_item: &mut WorkItem, used: &mut BudgetUsed, failure_context: &str) -> (Option<String>, Option<String>) {
        let Some(manager) = &self.consult_manager else { return (None, None) };
        if used.planner_calls >= work_item.budget.max_planner_calls {
            self.audit_event(
                "consult_planner_budget_exhausted",
                serde_json::json!({"work_item_id": work_item.id, "planner_calls": used.planner_calls, "max_planner_calls": work_item.budget.max_planner_calls}),
            )
            .await;
            return (None, Some("planner call budget exhausted".to_string()));
        }

        used.planner_calls += 1;
        work_item.budget_used = *used;
        self.persist(work_item).await;

        match manager.consult(&work_item.id, failure_context, &trace_id_for(&work_item.id)).await {
            Ok(Some(guidance)) => {
                self.audit_event("consult_planner_guidance_received", serde_json::json!({"work_item_id": work_item.id})).await;
                (Some(guidance), None)
            }
            Ok(None) => {
                self.audit_event("consult_planner_timeout", serde_json::json!({"work_item_id": work_item.id})).await;
                (None, Some("planner consult timed out".to_string()))
            }
            Err(e) => {
                self.audit_event("consult_planner_error", serde_json::json!({"work_item_id": work_item.id, "error": e})).await;
                (None, Some(format!("planner consult error: {e}")))
            }
        }
    }

    async fn trigger_replan(&self, work_item: &mut WorkItem, used: &mut BudgetUsed, failure_context: &str) -> Option<WorkItemResult> {
        let manager = self.replan_manager.as_ref()?;

        let failure_history = [FailureEntry { phase: "execution".to_string(), error: failure_context.to_string(), attempts: work_item.attempts }];
        let (replan_enqueued, failure_context) =
            match manager.trigger_replan(&work_item.id, &work_item.body, &failure_history, &trace_id_for(&work_item.id), 0).await {
                Ok(enqueued) => (enqueued, failure_context.to_string()),
                Err(e) => {
                    self.audit_event("replan_trigger_error", serde_json::json!({"work_item_id": work_item.id, "error": e})).await;
                    (false, format!("{failure_context}; replan trigger error: {e}"))
                }
            };

        work_item.budget_used = *used;
        if replan_enqueued {
            work_item.status = WorkItemStatus::Stuck;
            self.persist(work_item).await;
            self.audit_event("replan_triggered", serde_json::json!({"work_item_id": work_item.id})).await;
            return Some(WorkItemResult {
                id: work_item.id.clone(),
                status: WorkItemStatus::Stuck,
                last_error: Some(failure_context),
                budget_used: *used,
                summary: format!("Work item {} stuck; replan requested.", work_item.id),
            });
        }

        work_item.status = WorkItemStatus::Failed;
        self.persist(work_item).await;
        self.audit_event("recovery_exhausted", serde_json::json!({"work_item_id": work_item.id, "failure_context": failure_context})).await;
        Some(WorkItemResult {
            id: work_item.id.clone(),
            status: WorkItemStatus::Failed,
            last_error: Some(failure_context),
            budget_used: *used,
            summary: format!("Work item {} failed after recovery exhausted.", work_item.id),
        })
    }

    async fn run_external_verification(&self, work_item: &WorkItem) -> (bool, Vec<VerificationResult>, Option<String>) {
        if work_item.verification.is_empty() {
            return (true, Vec::new(), None);
        }
        let Some(runner) = &self.verification_runner else {
            return (false, Vec::new(), Some("verification runner unavailable".to_string()));
        };

        let report = match runner.run_checks(&work_item.verification).await {
            Ok(report) => report,
            Err(e) => return (false, Vec::new(), Some(format!("verification runner error: {e}"))),
        };

        let results: Vec<VerificationResult> =
            report.results.iter().map(|r| VerificationResult { name: r.name.clone(), passed: r.passed, detail: r.reason.clone() }).collect();

        if report.all_passed {
            (true, results, None)
        } else {
            let detail = report
                .results
                .iter()
                .filter(|r| !r.passed)
                .map(|r| format!("{}: {}", r.name, r.reason))
                .collect::<Vec<_>>()
                .join("; ");
            let detail = if detail.is_empty() { "unknown verification failure".to_string() } else { detail };
            (false, results, Some(format!("verification failed: {detail}")))
        }
    }

    async fn check_execution_approval(&self, work_item: &WorkItem) -> (bool, String) {
        let Some(token) = &work_item.approval_token else {
            return (false, "missing approval token".to_string());
        };
        let Some(verifier) = &self.approval_verifier else {
            return (false, "approval verifier unavailable".to_string());
        };
        match verifier.check(token, work_item).await {
            Ok((true, _)) => (true, "ok".to_string()),
            Ok((false, reason)) => (false, reason),
            Err(e) => (false, e.to_string()),
        }
    }

    async fn audit_event(&self, event: &str, data: serde_json::Value) {
        if let Some(audit) = &self.audit {
            if let Err(e) = audit.log(event, data).await {
                tracing::warn!(error = %e, event, "failed to write audit event");
            }
        }
    }

    async fn persist(&self, item: &WorkItem) {
        if let Err(e) = self.store.save(item).await {
            tracing::warn!(error = %e, id = %item.id, "failed to persist work item");
        }
        if let Err(e) = self.store.update_status(&item.id, item.status, item.budget_used).await {
            tracing::warn!(error = %e, id = %item.id, "failed to persist work item status");
        }
    }

    async fn mark_blocked(&self, mut root_item: WorkItem, error: &str, used: BudgetUsed) -> WorkItemResult {
        root_item.status = WorkItemStatus::Blocked;
        root_item.budget_used = used;
        self.persist(&root_item).await;
        WorkItemResult {
            id: root_item.id.clone(),
            status: WorkItemStatus::Blocked,
            last_error: Some(error.to_string()),
            budget_used: used,
            summary: format!("Work item {} blocked.", root_item.id),
        }
    }

    async fn mark_failed(&self, mut root_item: WorkItem, error: &str, used: Option<BudgetUsed>) -> WorkItemResult {
        let used = used.unwrap_or(root_item.budget_used);
        root_item.status = WorkItemStatus::Failed;
        root_item.budget_used = used;
        self.persist(&root_item).await;
        WorkItemResult {
            id: root_item.id.clone(),
            status: WorkItemStatus::Failed,
            last_error: Some(error.to_string()),
            budget_used: used,
            summary: format!("Work item {} failed.", root_item.id),
        }
    }
}

fn build_attempt_body(work_item: &WorkItem, previous_error: Option<&str>, planner_guidance: Option<&str>) -> String {
    if work_item.executor_type != ExecutorType::Skill {
        return work_item.body.clone();
    }

    let mut parts = vec![work_item.body.clone()];
    if work_item.attempts > 1 {
        if let Some(previous_error) = previous_error {
            parts.push(format!("Previous attempt {} failed:\n{previous_error}", work_item.attempts - 1));
        }
    }
    if let Some(guidance) = planner_guidance {
        parts.push(format!("Planner guidance:\n{guidance}"));
    }
    parts.join("\n\n")
}

fn build_execution_envelope(work_item: &WorkItem) -> Result<ExecutionEnvelope, String> {
    let action = match work_item.executor_type {
        ExecutorType::Shell => "shell_exec",
        ExecutorType::Python => "python_exec",
        ExecutorType::Skill => return Err("unsupported executor_type: skill".to_string()),
    };
    let timeout_seconds = work_item.budget.max_wall_time_seconds.max(1);
    let args = resolve_execution_args(work_item)?;
    Ok(ExecutionEnvelope {
        execution_id: format!("{}:{}", work_item.id, work_item.attempts),
        step_index: work_item.attempts.saturating_sub(1),
        task_description: work_item.body.clone(),
        action: action.to_string(),
        args,
        timeout_seconds,
        sandbox_config: SandboxConfig { network_access: false, max_cpu_seconds: timeout_seconds, max_memory_mb: 512, env: std::collections::HashMap::new() },
        credential_refs: std::collections::HashMap::new(),
        max_output_bytes: 1 << 20,
    })
}

fn resolve_execution_args(work_item: &WorkItem) -> Result<serde_json::Map<String, serde_json::Value>, String> {
    match work_item.executor_type {
        ExecutorType::Shell => {
            let command = resolve_shell_command(&work_item.body)?;
            let mut map = serde_json::Map::new();
            map.insert("command".to_string(), command);
            Ok(map)
        }
        ExecutorType::Python => {
            if let Some(serde_json::Value::Object(parsed)) = parse_json_body(&work_item.body) {
                let has_script = matches!(parsed.get("script"), Some(serde_json::Value::String(_)));
                let has_script_path = matches!(parsed.get("script_path"), Some(serde_json::Value::String(_)));
                if has_script || has_script_path {
                    return Ok(parsed);
                }
            }
            let script = work_item.body.trim();
            if script.is_empty() {
                return Err("python executor requires non-empty work item body".to_string());
            }
            let mut map = serde_json::Map::new();
            map.insert("script".to_string(), serde_json::Value::String(script.to_string()));
            Ok(map)
        }
        ExecutorType::Skill => Err("unsupported executor_type: skill".to_string()),
    }
}

fn resolve_shell_command(body: &str) -> Result<serde_json::Value, String> {
    let stripped = body.trim();
    if stripped.is_empty() {
        return Err("shell executor requires non-empty work item body".to_string());
    }

    match parse_json_body(stripped) {
        Some(serde_json::Value::Object(map)) => match map.get("command") {
            Some(v @ serde_json::Value::String(_)) => return Ok(v.clone()),
            Some(serde_json::Value::Array(items)) => {
                return Ok(serde_json::Value::Array(items.iter().map(value_to_string_value).collect()));
            }
            _ => {}
        },
        Some(serde_json::Value::Array(items)) => return Ok(serde_json::Value::Array(items.iter().map(value_to_string_value).collect())),
        _ => {}
    }
    Ok(serde_json::Value::String(stripped.to_string()))
}

fn value_to_string_value(v: &serde_json::Value) -> serde_json::Value {
    match v {
        serde_json::Value::String(_) => v.clone(),
        other => serde_json::Value::String(other.to_string()),
    }
}

fn parse_json_body(value: &str) -> Option<serde_json::Value> {
    serde_json::from_str(value).ok()
}

fn executor_type_label(executor_type: ExecutorType) -> &'static str {
    match executor_type {
        ExecutorType::Skill => "skill",
        ExecutorType::Shell => "shell",
        ExecutorType::Python => "python",
    }
}

fn trace_id_for(work_item_id: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, format!("silas:work-item:{work_item_id}").as_bytes()).to_string()
}

fn estimate_tokens(a: Option<&str>, b: Option<&str>) -> u64 {
    let chars = a.map_or(0, str::len) + b.map_or(0, str::len);
    ((chars as f64) / 3.5).ceil().max(1.0) as u64
}
