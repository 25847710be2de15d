//! Convenience re-exports for downstream crates.

pub use crate::budget::{Budget, BudgetUsed, Profile, TokenBudget};
pub use crate::error::{CoreError, CoreResult};
pub use crate::gate::{
    Escalation, Gate, GateAction, GateLane, GateProvider, GateProviderKind, GateResult,
    GateTrigger, ALLOWED_MUTATION_KEYS,
};
pub use crate::ports::{
    ApprovalVerifier, AuditLog, ChannelAdapter, ChronicleStore, ConnectionId, InboundMessage,
    MemoryItem, MemoryStore, WorkItemStore,
};
pub use crate::taint::Taint;
pub use crate::types::{ContextItem, ContextKind, ContextSubscription, Scope, SubscriptionKind, Zone};
pub use crate::work_item::{
    ExecutorType, OnStuck, VerificationCheck, VerificationExpectation, VerificationResult,
    WorkItem, WorkItemResult, WorkItemStatus,
};
