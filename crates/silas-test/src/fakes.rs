//! Fake implementations of the `silas-core::ports` traits.
//!
//! Each fake stores captured state behind a `std::sync::Mutex` so it can be
//! inspected after the call under test returns, without requiring a tokio
//! runtime to construct or configure.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use uuid::Uuid;

use silas_core::ports::{
    ApprovalVerifier, AuditLog, ChannelAdapter, ChronicleStore, ConnectionId, InboundMessage, MemoryItem, MemoryStore,
    WorkItemStore,
};
use silas_core::{CoreError, CoreResult, Scope, WorkItem, WorkItemStatus};

/// A channel adapter that replays a queue of inbound messages and records
/// every outbound send.
#[derive(Default)]
pub struct FakeChannel {
    inbound: Mutex<VecDeque<(InboundMessage, ConnectionId)>>,
    sent: Mutex<Vec<(ConnectionId, String, Option<String>)>>,
    suggestions_sent: Mutex<Vec<(ConnectionId, serde_json::Value)>>,
    approvals_sent: Mutex<Vec<(ConnectionId, WorkItem)>>,
}

impl FakeChannel {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a message `recv` will return, oldest first.
    pub fn queue_inbound(&self, message: InboundMessage, connection_id: impl Into<String>) {
        self.inbound.lock().expect("fake channel mutex poisoned").push_back((message, connection_id.into()));
    }

    #[must_use]
    pub fn sent_messages(&self) -> Vec<(ConnectionId, String, Option<String>)> {
        self.sent.lock().expect("fake channel mutex poisoned").clone()
    }

    #[must_use]
    pub fn suggestions_sent(&self) -> Vec<(ConnectionId, serde_json::Value)> {
        self.suggestions_sent.lock().expect("fake channel mutex poisoned").clone()
    }

    #[must_use]
    pub fn approvals_sent(&self) -> Vec<(ConnectionId, WorkItem)> {
        self.approvals_sent.lock().expect("fake channel mutex poisoned").clone()
    }
}

#[async_trait]
impl ChannelAdapter for FakeChannel {
    async fn recv(&self) -> CoreResult<(InboundMessage, ConnectionId)> {
        self.inbound
            .lock()
            .expect("fake channel mutex poisoned")
            .pop_front()
            .ok_or_else(|| CoreError::NotFound("no queued inbound message".to_string()))
    }

    async fn send(&self, recipient: &ConnectionId, text: &str, reply_to: Option<&str>) -> CoreResult<()> {
        self.sent.lock().expect("fake channel mutex poisoned").push((recipient.clone(), text.to_string(), reply_to.map(str::to_string)));
        Ok(())
    }

    async fn send_suggestion(&self, recipient: &ConnectionId, card: &serde_json::Value) -> CoreResult<()> {
        self.suggestions_sent.lock().expect("fake channel mutex poisoned").push((recipient.clone(), card.clone()));
        Ok(())
    }

    async fn send_approval_request(&self, recipient: &ConnectionId, item: &WorkItem) -> CoreResult<()> {
        self.approvals_sent.lock().expect("fake channel mutex poisoned").push((recipient.clone(), item.clone()));
        Ok(())
    }
}

/// An in-memory, append-only chronicle store keyed by scope.
#[derive(Default)]
pub struct FakeChronicleStore {
    by_scope: Mutex<HashMap<String, Vec<silas_core::ContextItem>>>,
}

impl FakeChronicleStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChronicleStore for FakeChronicleStore {
    async fn append(&self, scope: &Scope, item: silas_core::ContextItem) -> CoreResult<()> {
        self.by_scope.lock().expect("fake chronicle mutex poisoned").entry(scope.as_str().to_string()).or_default().push(item);
        Ok(())
    }

    async fn get_recent(&self, scope: &Scope, limit: usize) -> CoreResult<Vec<silas_core::ContextItem>> {
        let guard = self.by_scope.lock().expect("fake chronicle mutex poisoned");
        let Some(items) = guard.get(scope.as_str()) else { return Ok(Vec::new()) };
        let start = items.len().saturating_sub(limit);
        Ok(items[start..].to_vec())
    }

    async fn prune_before(&self, cutoff: chrono::DateTime<chrono::Utc>) -> CoreResult<usize> {
        let mut guard = self.by_scope.lock().expect("fake chronicle mutex poisoned");
        let mut removed = 0;
        for items in guard.values_mut() {
            let before = items.len();
            items.retain(|i| i.created_at >= cutoff);
            removed += before - items.len();
        }
        Ok(removed)
    }
}

/// An in-memory long-term memory store.
#[derive(Default)]
pub struct FakeMemoryStore {
    items: Mutex<HashMap<Uuid, MemoryItem>>,
    raw: Mutex<Vec<(Scope, String)>>,
}

impl FakeMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn all(&self) -> Vec<MemoryItem> {
        self.items.lock().expect("fake memory mutex poisoned").values().cloned().collect()
    }

    #[must_use]
    pub fn raw_ingested(&self) -> Vec<(Scope, String)> {
        self.raw.lock().expect("fake memory mutex poisoned").clone()
    }
}

#[async_trait]
impl MemoryStore for FakeMemoryStore {
    async fn store(&self, item: MemoryItem) -> CoreResult<Uuid> {
        let id = item.id;
        self.items.lock().expect("fake memory mutex poisoned").insert(id, item);
        Ok(id)
    }

    async fn get(&self, id: Uuid) -> CoreResult<Option<MemoryItem>> {
        Ok(self.items.lock().expect("fake memory mutex poisoned").get(&id).cloned())
    }

    async fn update(&self, item: MemoryItem) -> CoreResult<()> {
        self.items.lock().expect("fake memory mutex poisoned").insert(item.id, item);
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> CoreResult<()> {
        self.items.lock().expect("fake memory mutex poisoned").remove(&id);
        Ok(())
    }

    async fn increment_access(&self, id: Uuid) -> CoreResult<()> {
        if let Some(item) = self.items.lock().expect("fake memory mutex poisoned").get_mut(&id) {
            item.access_count += 1;
        }
        Ok(())
    }

    async fn search_keyword(&self, query: &str, limit: usize, session: Option<&str>) -> CoreResult<Vec<MemoryItem>> {
        let guard = self.items.lock().expect("fake memory mutex poisoned");
        let matches = guard
            .values()
            .filter(|i| i.content.contains(query))
            .filter(|i| session.is_none_or(|s| i.scope.as_str() == s))
            .take(limit)
            .cloned()
            .collect();
        Ok(matches)
    }

    async fn search_session(&self, session: &str) -> CoreResult<Vec<MemoryItem>> {
        let guard = self.items.lock().expect("fake memory mutex poisoned");
        Ok(guard.values().filter(|i| i.scope.as_str() == session).cloned().collect())
    }

    async fn search_by_type(&self, memory_type: &str, limit: usize) -> CoreResult<Vec<MemoryItem>> {
        let guard = self.items.lock().expect("fake memory mutex poisoned");
        Ok(guard.values().filter(|i| i.memory_type == memory_type).take(limit).cloned().collect())
    }

    async fn list_recent(&self, scope: &Scope, limit: usize) -> CoreResult<Vec<MemoryItem>> {
        let guard = self.items.lock().expect("fake memory mutex poisoned");
        let mut matches: Vec<MemoryItem> = guard.values().filter(|i| &i.scope == scope).cloned().collect();
        matches.sort_by_key(|i| i.created_at);
        matches.reverse();
        matches.truncate(limit);
        Ok(matches)
    }

    async fn store_raw(&self, scope: &Scope, content: &str) -> CoreResult<Uuid> {
        self.raw.lock().expect("fake memory mutex poisoned").push((scope.clone(), content.to_string()));
        Ok(Uuid::new_v4())
    }

    async fn search_raw(&self, query: &str, limit: usize) -> CoreResult<Vec<MemoryItem>> {
        self.search_keyword(query, limit, None).await
    }
}

/// An in-memory work-item store keyed by id.
#[derive(Default)]
pub struct FakeWorkItemStore {
    items: Mutex<HashMap<String, WorkItem>>,
}

impl FakeWorkItemStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an item directly, bypassing `save`.
    pub fn seed(&self, item: WorkItem) {
        self.items.lock().expect("fake work item mutex poisoned").insert(item.id.clone(), item);
    }
}

#[async_trait]
impl WorkItemStore for FakeWorkItemStore {
    async fn save(&self, item: &WorkItem) -> CoreResult<()> {
        self.items.lock().expect("fake work item mutex poisoned").insert(item.id.clone(), item.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> CoreResult<Option<WorkItem>> {
        Ok(self.items.lock().expect("fake work item mutex poisoned").get(id).cloned())
    }

    async fn list_by_status(&self, status: WorkItemStatus) -> CoreResult<Vec<WorkItem>> {
        Ok(self.items.lock().expect("fake work item mutex poisoned").values().filter(|i| i.status == status).cloned().collect())
    }

    async fn list_by_parent(&self, id: &str) -> CoreResult<Vec<WorkItem>> {
        Ok(self.items.lock().expect("fake work item mutex poisoned").values().filter(|i| i.depends_on.iter().any(|d| d == id)).cloned().collect())
    }

    async fn update_status(&self, id: &str, status: WorkItemStatus, budget_used: silas_core::budget::BudgetUsed) -> CoreResult<()> {
        if let Some(item) = self.items.lock().expect("fake work item mutex poisoned").get_mut(id) {
            item.status = status;
            item.budget_used = budget_used;
        }
        Ok(())
    }
}

/// An append-only in-memory audit log. Does not actually hash-chain; callers
/// that need chain verification should assert on the recorded events instead.
#[derive(Default)]
pub struct FakeAuditLog {
    events: Mutex<Vec<(String, serde_json::Value)>>,
}

impl FakeAuditLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> Vec<(String, serde_json::Value)> {
        self.events.lock().expect("fake audit mutex poisoned").clone()
    }

    #[must_use]
    pub fn has_event(&self, event: &str) -> bool {
        self.events.lock().expect("fake audit mutex poisoned").iter().any(|(e, _)| e == event)
    }
}

#[async_trait]
impl AuditLog for FakeAuditLog {
    async fn log(&self, event: &str, data: serde_json::Value) -> CoreResult<Uuid> {
        self.events.lock().expect("fake audit mutex poisoned").push((event.to_string(), data));
        Ok(Uuid::new_v4())
    }

    async fn verify_chain(&self) -> CoreResult<(bool, usize)> {
        Ok((true, self.events.lock().expect("fake audit mutex poisoned").len()))
    }

    async fn write_checkpoint(&self) -> CoreResult<Uuid> {
        Ok(Uuid::new_v4())
    }

    async fn verify_from_checkpoint(&self, _checkpoint: Uuid) -> CoreResult<bool> {
        Ok(true)
    }
}

/// An approval verifier that grants or denies based on a fixed, queued
/// decision rather than checking any real token.
pub struct FakeApprovalVerifier {
    grant: bool,
}

impl FakeApprovalVerifier {
    #[must_use]
    pub fn granting() -> Self {
        FakeApprovalVerifier { grant: true }
    }

    #[must_use]
    pub fn denying() -> Self {
        FakeApprovalVerifier { grant: false }
    }
}

#[async_trait]
impl ApprovalVerifier for FakeApprovalVerifier {
    async fn check(&self, _token: &str, _work_item: &WorkItem) -> CoreResult<(bool, String)> {
        Ok((self.grant, if self.grant { "granted".to_string() } else { "denied".to_string() }))
    }

    async fn verify(&self, _token: &str, _work_item: &WorkItem, _spawned: Option<&str>) -> CoreResult<bool> {
        Ok(self.grant)
    }

    async fn issue_token(&self, _work_item: &WorkItem, _decision: &str, _scope: &Scope) -> CoreResult<String> {
        Ok(Uuid::new_v4().to_string())
    }
}
