//! Context items, subscriptions, and the scope identifier that partitions them.

use crate::taint::Taint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque isolation boundary for context, memory, and chronicle.
///
/// No operation may cross scopes; the owner scope carries privileged taint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Scope(String);

impl Scope {
    /// The reserved scope for the workspace owner.
    pub const OWNER: &'static str = "owner";

    /// Construct a scope from any string-like key.
    pub fn new(key: impl Into<String>) -> Self {
        Scope(key.into())
    }

    /// The canonical owner scope.
    #[must_use]
    pub fn owner() -> Self {
        Scope(Self::OWNER.to_string())
    }

    /// `true` if this is the owner scope.
    #[must_use]
    pub fn is_owner(&self) -> bool {
        self.0 == Self::OWNER
    }

    /// Borrow the underlying key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Scope {
    fn from(value: &str) -> Self {
        Scope(value.to_string())
    }
}

/// The four context partitions. Budgets and eviction apply per zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Zone {
    /// Pinned, never evicted: constitution, tool descriptions, config.
    System,
    /// Append-only conversational history.
    Chronicle,
    /// Retrieved long-term memories.
    Memory,
    /// Ephemeral working state (tool results, scratch notes).
    Workspace,
}

impl Zone {
    /// Render order used by [`render`](crate) and the default eviction priority.
    pub const RENDER_ORDER: [Zone; 4] = [Zone::System, Zone::Chronicle, Zone::Memory, Zone::Workspace];

    /// Evictable zones in the priority order used by the aggressive heuristic:
    /// chronicle first, then memory, then workspace.
    pub const EVICTION_PRIORITY: [Zone; 3] = [Zone::Chronicle, Zone::Memory, Zone::Workspace];

    /// `true` for the one zone that is never evicted.
    #[must_use]
    pub fn is_system(self) -> bool {
        matches!(self, Zone::System)
    }

    /// The lowercase name used in render headers and config keys.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Zone::System => "system",
            Zone::Chronicle => "chronicle",
            Zone::Memory => "memory",
            Zone::Workspace => "workspace",
        }
    }
}

/// The kind of payload a context item carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextKind {
    /// A chat message (user or agent).
    Message,
    /// A tool invocation's result; subject to observation masking.
    ToolResult,
    /// A retrieved long-term memory.
    Memory,
    /// System-authored content (constitution, tool manifest, config dump).
    System,
}

/// A single unit of context: a message, tool result, memory, or system item.
///
/// Mutated only by masking (see [`mask_if_stale`](Self::mask_if_stale));
/// otherwise immutable after creation until eviction or explicit drop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextItem {
    /// Unique within its scope.
    pub ctx_id: Uuid,
    pub zone: Zone,
    pub content: String,
    pub tokens: u32,
    pub created_at: DateTime<Utc>,
    pub turn_number: u64,
    pub source: String,
    pub taint: Taint,
    pub kind: ContextKind,
    /// Relevance in `[0, 1]`, used by both eviction tiers.
    pub relevance: f64,
    /// Pinned items are never evicted regardless of zone.
    pub pinned: bool,
    /// `true` once observation masking has replaced `content` with a placeholder.
    pub masked: bool,
    /// Original token count before masking, preserved for the placeholder text.
    pub original_tokens: Option<u32>,
}

impl ContextItem {
    /// Build a new, unmasked context item with a fresh id.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        zone: Zone,
        content: impl Into<String>,
        tokens: u32,
        turn_number: u64,
        source: impl Into<String>,
        taint: Taint,
        kind: ContextKind,
    ) -> Self {
        ContextItem {
            ctx_id: Uuid::new_v4(),
            zone,
            content: content.into(),
            tokens,
            created_at: Utc::now(),
            turn_number,
            source: source.into(),
            taint,
            kind,
            relevance: 0.5,
            pinned: false,
            masked: false,
            original_tokens: None,
        }
    }

    /// Mark the item pinned (exempt from both eviction tiers).
    #[must_use]
    pub fn pinned(mut self) -> Self {
        self.pinned = true;
        self
    }

    /// Ordering used by tier-1 eviction: ascending `(relevance, turn_number,
    /// created_at, ctx_id)` — the minimum is evicted first. `relevance` is
    /// compared with [`f64::total_cmp`] since scores are always finite.
    #[must_use]
    pub fn eviction_cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.relevance
            .total_cmp(&other.relevance)
            .then(self.turn_number.cmp(&other.turn_number))
            .then(self.created_at.cmp(&other.created_at))
            .then(self.ctx_id.cmp(&other.ctx_id))
    }
}

/// The type of a context subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionKind {
    /// Tracks a single file's content.
    File,
    /// Tracks a line range within a file.
    FileLines,
    /// Tracks the live results of a standing query.
    Query,
}

/// A registered subscription that materializes content into a zone.
///
/// Inactive subscriptions are purged; expired subscriptions materialize to
/// nothing on the next render.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextSubscription {
    pub id: Uuid,
    pub kind: SubscriptionKind,
    pub target: String,
    pub zone: Zone,
    pub created_at: DateTime<Utc>,
    pub content_hash: String,
    pub active: bool,
    pub tokens: u32,
    pub expires_at: Option<DateTime<Utc>>,
}

impl ContextSubscription {
    /// `true` if `now` is past `expires_at` (subscriptions without an expiry
    /// never expire).
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| now >= exp)
    }
}
