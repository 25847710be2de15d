//! Trait boundaries for the collaborators Silas consumes but does not
//! implement: channel transport, chronicle/memory/work-item persistence,
//! the audit log, and the approval verifier. Each trait models only the
//! interface the runtime calls through — the collaborator's own durability,
//! wire format, and storage engine are out of scope for this workspace.

use crate::error::CoreResult;
use crate::types::{ContextItem, Scope};
use crate::work_item::{WorkItem, WorkItemStatus};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An inbound message delivered by a [`ChannelAdapter`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub text: String,
    pub reply_to: Option<String>,
}

/// A connection identifier assigned by the channel transport.
pub type ConnectionId = String;

/// The transport the orchestrator listens on and replies through.
///
/// Optional methods are modeled as default no-ops returning `false`/`None`
/// so the orchestrator can degrade gracefully when a concrete adapter does
/// not implement them, mirroring how richer notification methods are
/// optional capabilities of a frontend rather than required surface.
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    /// Block until the next inbound message arrives on any connection.
    async fn recv(&self) -> CoreResult<(InboundMessage, ConnectionId)>;

    /// Deliver `text` to `recipient`, optionally threaded under `reply_to`.
    async fn send(&self, recipient: &ConnectionId, text: &str, reply_to: Option<&str>) -> CoreResult<()>;

    /// `true` if this adapter can render a streaming response.
    fn supports_streaming(&self) -> bool {
        false
    }

    /// Start a streamed response; no-op unless [`supports_streaming`](Self::supports_streaming).
    async fn send_stream_start(&self, _recipient: &ConnectionId) -> CoreResult<()> {
        Ok(())
    }

    /// Append a chunk to a streamed response.
    async fn send_stream_chunk(&self, _recipient: &ConnectionId, _chunk: &str) -> CoreResult<()> {
        Ok(())
    }

    /// Finish a streamed response.
    async fn send_stream_end(&self, _recipient: &ConnectionId) -> CoreResult<()> {
        Ok(())
    }

    /// Present a proactive suggestion card. Degrades to a no-op.
    async fn send_suggestion(&self, _recipient: &ConnectionId, _card: &serde_json::Value) -> CoreResult<()> {
        Ok(())
    }

    /// Ask for approval of a work item. Degrades to a no-op (callers should
    /// treat a non-implementing adapter as "approval unavailable").
    async fn send_approval_request(&self, _recipient: &ConnectionId, _item: &WorkItem) -> CoreResult<()> {
        Ok(())
    }
}

/// Append-only per-scope conversational history.
#[async_trait]
pub trait ChronicleStore: Send + Sync {
    /// Append an item to `scope`'s chronicle.
    async fn append(&self, scope: &Scope, item: ContextItem) -> CoreResult<()>;

    /// The most recent `limit` items for `scope`, oldest first.
    async fn get_recent(&self, scope: &Scope, limit: usize) -> CoreResult<Vec<ContextItem>>;

    /// Remove entries older than `cutoff`; returns the number removed.
    async fn prune_before(&self, cutoff: chrono::DateTime<chrono::Utc>) -> CoreResult<usize>;
}

/// A retrievable long-term memory record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryItem {
    pub id: Uuid,
    pub scope: Scope,
    pub content: String,
    pub memory_type: String,
    pub access_count: u32,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Long-term memory storage and retrieval.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn store(&self, item: MemoryItem) -> CoreResult<Uuid>;
    async fn get(&self, id: Uuid) -> CoreResult<Option<MemoryItem>>;
    async fn update(&self, item: MemoryItem) -> CoreResult<()>;
    async fn delete(&self, id: Uuid) -> CoreResult<()>;
    async fn increment_access(&self, id: Uuid) -> CoreResult<()>;

    async fn search_keyword(&self, query: &str, limit: usize, session: Option<&str>) -> CoreResult<Vec<MemoryItem>>;
    async fn search_session(&self, session: &str) -> CoreResult<Vec<MemoryItem>>;
    async fn search_by_type(&self, memory_type: &str, limit: usize) -> CoreResult<Vec<MemoryItem>>;
    async fn list_recent(&self, scope: &Scope, limit: usize) -> CoreResult<Vec<MemoryItem>>;

    /// Ingest unindexed raw content (e.g. a full turn transcript) for later search.
    async fn store_raw(&self, scope: &Scope, content: &str) -> CoreResult<Uuid>;
    async fn search_raw(&self, query: &str, limit: usize) -> CoreResult<Vec<MemoryItem>>;
}

/// Persistence for work items and their status transitions.
#[async_trait]
pub trait WorkItemStore: Send + Sync {
    async fn save(&self, item: &WorkItem) -> CoreResult<()>;
    async fn get(&self, id: &str) -> CoreResult<Option<WorkItem>>;
    async fn list_by_status(&self, status: WorkItemStatus) -> CoreResult<Vec<WorkItem>>;
    async fn list_by_parent(&self, id: &str) -> CoreResult<Vec<WorkItem>>;
    async fn update_status(
        &self,
        id: &str,
        status: WorkItemStatus,
        budget_used: crate::budget::BudgetUsed,
    ) -> CoreResult<()>;

    /// Scope-filtered listings consumed during startup rehydration. A store
    /// that doesn't track these returns an empty list rather than erroring.
    async fn list_pending_batch_reviews(&self, _scope: &Scope) -> CoreResult<Vec<serde_json::Value>> {
        Ok(Vec::new())
    }
    async fn list_pending_suggestions(&self, _scope: &Scope) -> CoreResult<Vec<serde_json::Value>> {
        Ok(Vec::new())
    }
    async fn list_pending_autonomy_proposals(&self, _scope: &Scope) -> CoreResult<Vec<serde_json::Value>> {
        Ok(Vec::new())
    }
}

/// Append-only hash-chained audit log.
#[async_trait]
pub trait AuditLog: Send + Sync {
    /// Append `event` with arbitrary structured `data`; returns the new entry's id.
    async fn log(&self, event: &str, data: serde_json::Value) -> CoreResult<Uuid>;

    /// Verify the whole chain; returns `(ok, entry_count)`.
    async fn verify_chain(&self) -> CoreResult<(bool, usize)>;

    async fn write_checkpoint(&self) -> CoreResult<Uuid>;
    async fn verify_from_checkpoint(&self, checkpoint: Uuid) -> CoreResult<bool>;
}

/// Checks and issues capability/approval tokens bound to a work item.
#[async_trait]
pub trait ApprovalVerifier: Send + Sync {
    /// Side-effect-free check: does `token` currently authorize `work_item`?
    async fn check(&self, token: &str, work_item: &WorkItem) -> CoreResult<(bool, String)>;

    /// Verify and consume `token` for `work_item`, optionally recording a
    /// spawned child work-item id bound by the same approval.
    async fn verify(&self, token: &str, work_item: &WorkItem, spawned: Option<&str>) -> CoreResult<bool>;

    /// Issue a fresh token for `work_item` under `scope` given an approval `decision`.
    async fn issue_token(&self, work_item: &WorkItem, decision: &str, scope: &Scope) -> CoreResult<String>;
}
