//! The per-connection turn pipeline: gate precompilation, suggestion
//! collection, input gates, chronicle/memory bookkeeping, budget
//! enforcement, routing through the proxy/planner, output gates, and
//! response dispatch — plus startup rehydration.

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::ports::{PlannerAgent, ProxyAgent, QueueBridge, SuggestionEngine};
use dashmap::DashMap;
use silas_access::AccessController;
use silas_context::{ContextManager, ScoringContext};
use silas_core::ports::{ApprovalVerifier, AuditLog, ChannelAdapter, ChronicleStore, InboundMessage, MemoryItem, MemoryStore, WorkItemStore};
use silas_core::{ContextItem, ContextKind, Gate, GateAction, GateTrigger, Scope, Taint, WorkItemStatus, Zone};
use silas_executor::WorkItemExecutor;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

const AUTO_RETRIEVE_MEMORY_LIMIT: usize = 5;
const REHYDRATE_CHRONICLE_LIMIT: usize = 50;
const REHYDRATE_MEMORY_LIMIT: usize = 10;
const SUGGESTION_CONFIDENCE_THRESHOLD: f64 = 0.80;

/// Parse an inbound reply as an approval verdict. Accepts the handful of
/// plain-language forms a human would actually type back.
fn parse_approval_reply(text: &str) -> Option<bool> {
    match text.trim().to_lowercase().as_str() {
        "approve" | "approved" | "yes" | "y" => Some(true),
        "deny" | "denied" | "no" | "n" | "reject" | "rejected" => Some(false),
        _ => None,
    }
}

struct ConnectionState {
    scope: Scope,
    turn_number: u64,
}

/// Owns every shared collaborator the turn pipeline calls through, and the
/// per-connection state (`scope`, `turn_number`) the pipeline mutates.
///
/// Distinct connections run concurrently; a connection's own turns are
/// serialized by its entry's `tokio::sync::Mutex`, held for the whole turn.
pub struct Orchestrator {
    channel: Arc<dyn ChannelAdapter>,
    context: Arc<ContextManager>,
    gates: Arc<silas_gate::GateRunner>,
    access: Arc<AccessController>,
    executor: Arc<WorkItemExecutor>,
    chronicle: Arc<dyn ChronicleStore>,
    memory: Arc<dyn MemoryStore>,
    audit: Arc<dyn AuditLog>,
    work_items: Arc<dyn WorkItemStore>,
    proxy: Arc<dyn ProxyAgent>,
    planner: Arc<dyn PlannerAgent>,
    suggestions: Arc<dyn SuggestionEngine>,
    queue_bridge: Option<Arc<dyn QueueBridge>>,
    system_gates: Vec<Gate>,
    known_tools: Vec<String>,
    owner_connection_id: String,
    connections: DashMap<String, Arc<Mutex<ConnectionState>>>,
    approval: Arc<dyn ApprovalVerifier>,
    approval_wait: chrono::Duration,
}

impl Orchestrator {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        channel: Arc<dyn ChannelAdapter>,
        context: Arc<ContextManager>,
        gates: Arc<silas_gate::GateRunner>,
        access: Arc<AccessController>,
        executor: Arc<WorkItemExecutor>,
        chronicle: Arc<dyn ChronicleStore>,
        memory: Arc<dyn MemoryStore>,
        audit: Arc<dyn AuditLog>,
        work_items: Arc<dyn WorkItemStore>,
        proxy: Arc<dyn ProxyAgent>,
        planner: Arc<dyn PlannerAgent>,
        suggestions: Arc<dyn SuggestionEngine>,
        system_gates: Vec<Gate>,
        known_tools: Vec<String>,
        owner_connection_id: impl Into<String>,
        approval: Arc<dyn ApprovalVerifier>,
        approval_wait: chrono::Duration,
    ) -> Self {
        Orchestrator {
            channel,
            context,
            gates,
            access,
            executor,
            chronicle,
            memory,
            audit,
            work_items,
            proxy,
            planner,
            suggestions,
            queue_bridge: None,
            system_gates,
            known_tools,
            owner_connection_id: owner_connection_id.into(),
            connections: DashMap::new(),
            approval,
            approval_wait,
        }
    }

    #[must_use]
    pub fn with_queue_bridge(mut self, bridge: Arc<dyn QueueBridge>) -> Self {
        self.queue_bridge = Some(bridge);
        self
    }

    fn scope_for(&self, connection_id: &str) -> Scope {
        if connection_id == self.owner_connection_id {
            Scope::owner()
        } else {
            Scope::new(connection_id)
        }
    }

    fn inbound_taint(&self, connection_id: &str) -> Taint {
        if connection_id == self.owner_connection_id {
            Taint::Owner
        } else {
            Taint::Auth
        }
    }

    async fn audit_event(&self, event: &str, data: serde_json::Value) {
        if let Err(e) = self.audit.log(event, data).await {
            tracing::warn!(error = %e, event, "failed to write audit event");
        }
    }

    /// Process one inbound message for `connection_id` through the full
    /// turn pipeline, returning the text sent back on the channel.
    pub async fn process_turn(&self, message: InboundMessage, connection_id: &str) -> OrchestratorResult<String> {
        // Clone the per-connection Arc out and drop the DashMap shard guard
        // immediately: the turn holds `conn_lock` across many `.await`
        // points, and a dashmap guard must never be held that long.
        let conn_lock = Arc::clone(
            self.connections
                .entry(connection_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(ConnectionState { scope: self.scope_for(connection_id), turn_number: 0 })))
                .value(),
        );
        let mut state = conn_lock.lock().await;

        state.turn_number += 1;
        let turn_number = state.turn_number;
        let scope = state.scope.clone();
        let inbound_taint = self.inbound_taint(connection_id);

        // Step 4: precompile the active gate set (system gates only; no
        // in-flight work item's own gates are tracked per-connection here).
        let active_gates = self.gates.precompile_turn_gates(&self.system_gates, &[]);
        self.audit_event("active_gates_precompiled", serde_json::json!({"turn_number": turn_number, "active_gate_count": active_gates.len()})).await;

        // Step 5: proactive suggestions, partitioned by confidence.
        let suggestions = self.suggestions.suggest(connection_id).await;
        let (high_confidence, low_confidence): (Vec<_>, Vec<_>) =
            suggestions.into_iter().partition(|s| s.confidence > SUGGESTION_CONFIDENCE_THRESHOLD);
        for suggestion in &low_confidence {
            let card = serde_json::json!({"text": suggestion.text, "confidence": suggestion.confidence});
            let _ = self.channel.send_suggestion(&connection_id.to_string(), &card).await;
        }

        // Step 6: input gates.
        let mut gate_context = serde_json::Map::new();
        gate_context.insert("message".to_string(), serde_json::Value::String(message.text.clone()));
        let (policy_results, _quality_results, _merged) = self.gates.check_gates(&active_gates, GateTrigger::EveryUserMessage, &gate_context);
        if let Some(blocked) = policy_results.iter().find(|r| r.action != GateAction::Continue) {
            let blocked_response = format!("Request blocked: {}", blocked.reason);
            self.channel.send(&connection_id.to_string(), &blocked_response, message.reply_to.as_deref()).await.map_err(|e| OrchestratorError::Channel(e.to_string()))?;
            self.audit_event("turn_processed", serde_json::json!({"turn_number": turn_number, "route": "blocked_input_gate"})).await;
            return Ok(blocked_response);
        }

        // Step 7: record inbound taint, append to chronicle.
        let inbound_item = ContextItem::new(Zone::Chronicle, format!("{connection_id}: {}", message.text), estimate_tokens(&message.text), turn_number, format!("channel:{connection_id}"), inbound_taint, ContextKind::Message);
        self.context.add(&scope, inbound_item.clone());
        self.chronicle.append(&scope, inbound_item).await?;

        // Step 8: auto-retrieve memories, ingest raw memory for the inbound message.
        for memory_item in self.memory.search_keyword(&message.text, AUTO_RETRIEVE_MEMORY_LIMIT, Some(connection_id)).await.unwrap_or_default() {
            let ctx = ContextItem::new(Zone::Memory, memory_item.content.clone(), estimate_tokens(&memory_item.content), turn_number, "memory:auto_retrieve", inbound_taint, ContextKind::Memory);
            self.context.add(&scope, ctx);
        }
        let _ = self.memory.store_raw(&scope, &message.text).await;

        // Step 9: enforce context budget, persisting evicted items to
        // long-term memory before their removal is visible downstream.
        self.enforce_budget_and_persist_evicted(&scope, turn_number, inbound_taint, &connection_id.to_string()).await;

        // Step 10: prepare (access-filtered) toolsets for the proxy/planner.
        let toolset = self.access.filter_tools(connection_id, &self.known_tools, Some(inbound_taint));

        // Step 11: queue bridge, else procedural proxy/planner path.
        let response_text = if let Some(bridge) = &self.queue_bridge {
            let trace_id = format!("{scope}:{turn_number}");
            match bridge.dispatch(&trace_id, &message.text).await {
                Ok(Some(text)) => text,
                Ok(None) | Err(_) => self.run_procedural_route(&scope, turn_number, &message.text, &toolset, connection_id).await?,
            }
        } else {
            self.run_procedural_route(&scope, turn_number, &message.text, &toolset, connection_id).await?
        };

        // Step 12: prepend high-confidence suggestions.
        let mut response_text = response_text;
        if !high_confidence.is_empty() {
            let prefix = high_confidence.iter().map(|s| s.text.as_str()).collect::<Vec<_>>().join(" ");
            response_text = format!("{prefix}\n\n{response_text}");
        }

        // Step 13: accumulated taint is the join of every source touched
        // this turn; tool-output taint is not separately tracked in this
        // workspace's turn pipeline, so the inbound taint stands in for it.
        let accumulated_taint = inbound_taint;

        // Step 14: output gates.
        let (response_text, output_gate_results) = self.gates.evaluate_output(&response_text, accumulated_taint, &active_gates);
        let output_gate_blocked = output_gate_results.iter().any(|r| r.action != GateAction::Continue);

        // Steps 15: memory queries/write ops the agent requested are not
        // modeled by the `RouteDecision` in this workspace (no structured
        // memory-op field on it), so this step is a no-op here.

        // Step 16: append response to chronicle, ingest as raw memory.
        let response_item = ContextItem::new(Zone::Chronicle, format!("Silas: {response_text}"), estimate_tokens(&response_text), turn_number, "agent:proxy", accumulated_taint, ContextKind::Message);
        self.context.add(&scope, response_item.clone());
        self.chronicle.append(&scope, response_item).await?;
        let _ = self.memory.store_raw(&scope, &response_text).await;

        // Step 17: dispatch.
        self.channel.send(&connection_id.to_string(), &response_text, message.reply_to.as_deref()).await.map_err(|e| OrchestratorError::Channel(e.to_string()))?;

        // Step 18: audit; lock released when `state` drops at function end.
        self.audit_event("turn_processed", serde_json::json!({"turn_number": turn_number, "route": if output_gate_blocked { "blocked_output_gate" } else { "ok" }})).await;

        Ok(response_text)
    }

    async fn run_procedural_route(
        &self,
        scope: &Scope,
        turn_number: u64,
        message_text: &str,
        toolset: &[String],
        connection_id: &str,
    ) -> OrchestratorResult<String> {
        let rendered_context = self.context.render(scope, turn_number);
        let routed = self.proxy.route(message_text, &rendered_context, toolset).await.map_err(OrchestratorError::Proxy)?;
        self.context.set_profile(scope, &routed.context_profile)?;

        if routed.route == "planner" {
            let plan = self.planner.plan(&routed.reason, toolset).await.map_err(OrchestratorError::Planner)?;
            if plan.requires_approval {
                return self.run_approval_gated_plan(scope, connection_id, plan.work_item).await;
            }
            let result = self.executor.execute(&plan.work_item).await;
            return Ok(if result.status == WorkItemStatus::Done { result.summary } else { format!("{}: {}", result.summary, result.last_error.unwrap_or_default()) });
        }

        Ok(routed.response)
    }

    /// Send the approval card and await the verdict, bounded by
    /// `approval_wait`. On approval, issue a token, bind it to the plan's
    /// work item, and run it through the executor. On denial, or on timeout
    /// (treated the same as denial), respond without executing.
    async fn run_approval_gated_plan(
        &self,
        scope: &Scope,
        connection_id: &str,
        work_item: silas_core::WorkItem,
    ) -> OrchestratorResult<String> {
        let _ = self.channel.send_approval_request(&connection_id.to_string(), &work_item).await;

        let verdict = self.await_approval_verdict(connection_id).await;
        match verdict {
            Some(true) => {
                let token = self.approval.issue_token(&work_item, "approve", scope).await?;
                let mut approved_item = work_item.clone();
                approved_item.approval_token = Some(token);
                let result = self.executor.execute(&approved_item).await;
                self.audit_event("approval_granted", serde_json::json!({"work_item_id": approved_item.id})).await;
                Ok(if result.status == WorkItemStatus::Done { result.summary } else { format!("{}: {}", result.summary, result.last_error.unwrap_or_default()) })
            }
            Some(false) => {
                self.audit_event("approval_denied", serde_json::json!({"work_item_id": work_item.id})).await;
                Ok(format!("Approval denied for: {}", work_item.title))
            }
            None => {
                self.audit_event("approval_timed_out", serde_json::json!({"work_item_id": work_item.id})).await;
                Ok(format!("Approval timed out for: {} (treated as denied)", work_item.title))
            }
        }
    }

    /// Block on the channel for the next message that parses as an approval
    /// verdict, re-prompting on anything else, until `approval_wait` elapses.
    /// Returns `None` once the deadline passes without a recognized verdict.
    async fn await_approval_verdict(&self, connection_id: &str) -> Option<bool> {
        let wait = self.approval_wait.to_std().ok()?;
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return None;
            }
            match tokio::time::timeout(remaining, self.channel.recv()).await {
                Ok(Ok((message, _))) => {
                    if let Some(decision) = parse_approval_reply(&message.text) {
                        return Some(decision);
                    }
                    let _ = self
                        .channel
                        .send(&connection_id.to_string(), "Please reply 'approve' or 'deny'.", None)
                        .await;
                }
                Ok(Err(_)) | Err(_) => return None,
            }
        }
    }

    async fn enforce_budget_and_persist_evicted(&self, scope: &Scope, turn_number: u64, taint: Taint, session: &str) {
        let mut snapshot: HashMap<Uuid, ContextItem> = HashMap::new();
        for zone in Zone::EVICTION_PRIORITY {
            for item in self.context.get_zone(scope, zone) {
                snapshot.insert(item.ctx_id, item);
            }
        }

        let scoring_ctx = ScoringContext { current_goal: String::new(), current_taint: taint, referenced_ids: std::collections::HashSet::new(), recent_chronicle: Vec::new() };
        let batches = self.context.enforce_budget(scope, turn_number, &scoring_ctx).await;
        for batch in &batches {
            for id in &batch.ids {
                let Some(item) = snapshot.get(id) else { continue };
                let memory_item = MemoryItem { id: Uuid::new_v4(), scope: scope.clone(), content: item.content.clone(), memory_type: "evicted_context".to_string(), access_count: 0, created_at: chrono::Utc::now() };
                if let Err(e) = self.memory.store(memory_item).await {
                    tracing::warn!(error = %e, ctx_id = %id, session, "failed to persist evicted context item");
                }
            }
        }
    }

    /// Install system-zone items, load recent chronicle history, restore
    /// in-progress work, and resume any work items left running across a
    /// restart. Call once before listening for new turns.
    pub async fn rehydrate(&self, system_items: &[(String, String)]) -> OrchestratorResult<()> {
        let owner_scope = Scope::owner();

        for (source, content) in system_items {
            let item = ContextItem::new(Zone::System, content.clone(), estimate_tokens(content), 0, source.clone(), Taint::Owner, ContextKind::System).pinned();
            self.context.add(&owner_scope, item);
        }

        let recent = self.chronicle.get_recent(&owner_scope, REHYDRATE_CHRONICLE_LIMIT).await?;
        let max_turn = recent.iter().map(|i| i.turn_number).max().unwrap_or(0);
        for item in recent {
            self.context.add(&owner_scope, item);
        }
        self.connections
            .entry(self.owner_connection_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(ConnectionState { scope: owner_scope.clone(), turn_number: 0 })))
            .value()
            .lock()
            .await
            .turn_number = max_turn;

        for memory_item in self.memory.list_recent(&owner_scope, REHYDRATE_MEMORY_LIMIT).await.unwrap_or_default() {
            let ctx = ContextItem::new(Zone::Memory, memory_item.content.clone(), estimate_tokens(&memory_item.content), max_turn, "memory:rehydrate", Taint::Owner, ContextKind::Memory);
            self.context.add(&owner_scope, ctx);
        }

        let rehydrated_notice = ContextItem::new(Zone::Chronicle, "[SYSTEM] Session rehydrated after restart.".to_string(), 8, max_turn, "system:rehydration", Taint::Owner, ContextKind::System);
        self.context.add(&owner_scope, rehydrated_notice.clone());
        self.chronicle.append(&owner_scope, rehydrated_notice).await?;

        for status in [WorkItemStatus::Running, WorkItemStatus::Stuck, WorkItemStatus::Pending] {
            for item in self.work_items.list_by_status(status).await.unwrap_or_default() {
                let result = self.executor.execute(&item).await;
                self.audit_event("work_item_resumed", serde_json::json!({"work_item_id": result.id, "status": format!("{:?}", result.status)})).await;
            }
        }

        Ok(())
    }
}

fn estimate_tokens(text: &str) -> u32 {
    ((text.len() as f64) / 3.5).ceil().max(1.0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use silas_access::AccessController;
    use silas_context::{ContextManager, LocalScorer};
    use silas_executor::WorkItemExecutor;
    use silas_gate::GateRunner;
    use silas_test::{
        test_work_item, FakeApprovalVerifier, FakeAuditLog, FakeChannel, FakeChronicleStore, FakeEphemeralExecutor,
        FakeMemoryStore, FakePlannerAgent, FakeProxyAgent, FakeQueueBridge, FakeSkillExecutor, FakeSuggestionEngine,
        FakeWorkItemStore,
    };
    use std::sync::Arc;

    #[allow(clippy::too_many_arguments)]
    fn build(
        channel: Arc<FakeChannel>,
        proxy: FakeProxyAgent,
        planner: FakePlannerAgent,
        approval: Arc<dyn silas_core::ports::ApprovalVerifier>,
    ) -> Orchestrator {
        let budget = silas_config::Config::default().context.budget;
        let context = Arc::new(ContextManager::new(budget, Arc::new(LocalScorer)).unwrap());
        let gates = Arc::new(GateRunner::new());
        let access = Arc::new(AccessController::new("stdio", &silas_config::types::AccessConfig::default()).unwrap());
        let executor = Arc::new(
            WorkItemExecutor::new(
                Arc::new(FakeSkillExecutor::succeeding("done")),
                Arc::new(FakeWorkItemStore::new()),
                Arc::new(FakeEphemeralExecutor::succeeding("ok")),
                Arc::new(FakeEphemeralExecutor::succeeding("ok")),
            )
            .with_approval_verifier(Arc::clone(&approval)),
        );

        Orchestrator::new(
            channel,
            context,
            gates,
            access,
            executor,
            Arc::new(FakeChronicleStore::new()),
            Arc::new(FakeMemoryStore::new()),
            Arc::new(FakeAuditLog::new()),
            Arc::new(FakeWorkItemStore::new()),
            Arc::new(proxy),
            Arc::new(planner),
            Arc::new(FakeSuggestionEngine::empty()),
            Vec::new(),
            Vec::new(),
            "stdio",
            approval,
            chrono::Duration::seconds(1),
        )
    }

    #[tokio::test]
    async fn approved_plan_runs_the_executor() {
        let channel = Arc::new(FakeChannel::new());
        channel.queue_inbound(InboundMessage { text: "approve".to_string(), reply_to: None }, "stdio");
        let orch = build(
            channel.clone(),
            FakeProxyAgent::routing_to_planner("needs a plan"),
            FakePlannerAgent::producing(test_work_item("wi-1"), true),
            Arc::new(FakeApprovalVerifier::granting()),
        );

        let reply = orch.process_turn(InboundMessage { text: "do it".to_string(), reply_to: None }, "stdio").await.unwrap();
        assert_eq!(reply, "Executed 1 work item(s) successfully.");
        assert_eq!(channel.approvals_sent().len(), 1);
    }

    #[tokio::test]
    async fn denied_plan_never_runs_the_executor() {
        let channel = Arc::new(FakeChannel::new());
        channel.queue_inbound(InboundMessage { text: "deny".to_string(), reply_to: None }, "stdio");
        let orch = build(
            channel.clone(),
            FakeProxyAgent::routing_to_planner("needs a plan"),
            FakePlannerAgent::producing(test_work_item("wi-2"), true),
            Arc::new(FakeApprovalVerifier::denying()),
        );

        let reply = orch.process_turn(InboundMessage { text: "do it".to_string(), reply_to: None }, "stdio").await.unwrap();
        assert!(reply.contains("Approval denied for"));
    }

    #[tokio::test]
    async fn no_verdict_before_ttl_is_treated_as_denied() {
        let channel = Arc::new(FakeChannel::new());
        // No inbound verdict queued: `recv` errors immediately, so the wait
        // loop gives up right away instead of sleeping out the full TTL.
        let orch = build(
            channel.clone(),
            FakeProxyAgent::routing_to_planner("needs a plan"),
            FakePlannerAgent::producing(test_work_item("wi-3"), true),
            Arc::new(FakeApprovalVerifier::granting()),
        );

        let reply = orch.process_turn(InboundMessage { text: "do it".to_string(), reply_to: None }, "stdio").await.unwrap();
        assert!(reply.contains("timed out"));
    }

    #[tokio::test]
    async fn unrecognized_reply_is_reprompted_before_the_real_verdict() {
        let channel = Arc::new(FakeChannel::new());
        channel.queue_inbound(InboundMessage { text: "maybe later".to_string(), reply_to: None }, "stdio");
        channel.queue_inbound(InboundMessage { text: "approve".to_string(), reply_to: None }, "stdio");
        let orch = build(
            channel.clone(),
            FakeProxyAgent::routing_to_planner("needs a plan"),
            FakePlannerAgent::producing(test_work_item("wi-4"), true),
            Arc::new(FakeApprovalVerifier::granting()),
        );

        let reply = orch.process_turn(InboundMessage { text: "do it".to_string(), reply_to: None }, "stdio").await.unwrap();
        assert_eq!(reply, "Executed 1 work item(s) successfully.");
        assert!(channel.sent_messages().iter().any(|(_, text, _)| text.contains("approve")));
    }

    #[tokio::test]
    async fn plan_without_approval_runs_directly() {
        let channel = Arc::new(FakeChannel::new());
        let orch = build(
            channel.clone(),
            FakeProxyAgent::routing_to_planner("no approval needed"),
            FakePlannerAgent::producing(test_work_item("wi-5"), false),
            Arc::new(FakeApprovalVerifier::granting()),
        );

        let reply = orch.process_turn(InboundMessage { text: "do it".to_string(), reply_to: None }, "stdio").await.unwrap();
        assert_eq!(reply, "Executed 1 work item(s) successfully.");
        assert!(channel.approvals_sent().is_empty());
    }

    #[tokio::test]
    async fn queue_bridge_reply_skips_the_procedural_route_entirely() {
        let channel = Arc::new(FakeChannel::new());
        let orch = build(
            channel.clone(),
            FakeProxyAgent::responding("unused"),
            FakePlannerAgent::producing(test_work_item("wi-6"), false),
            Arc::new(FakeApprovalVerifier::granting()),
        )
        .with_queue_bridge(Arc::new(FakeQueueBridge::responding("bridged answer")));

        let reply = orch.process_turn(InboundMessage { text: "hi".to_string(), reply_to: None }, "stdio").await.unwrap();
        assert_eq!(reply, "bridged answer");
    }
}
