//! Core types shared across the Silas agent runtime: the taint lattice,
//! context and work-item data model, gate vocabulary, error taxonomy, and
//! the trait boundaries for external collaborators (channel, stores, audit,
//! approval verifier) that the runtime consumes but does not implement.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod budget;
pub mod error;
pub mod gate;
pub mod ports;
pub mod prelude;
pub mod taint;
pub mod types;
pub mod work_item;

pub use budget::{Budget, BudgetUsed, Profile, TokenBudget};
pub use error::{CoreError, CoreResult};
pub use gate::{Escalation, Gate, GateAction, GateLane, GateProvider, GateProviderKind, GateResult, GateTrigger};
pub use taint::Taint;
pub use types::{ContextItem, ContextKind, ContextSubscription, Scope, SubscriptionKind, Zone};
pub use work_item::{
    ExecutorType, OnStuck, VerificationCheck, VerificationExpectation, VerificationResult, WorkItem, WorkItemResult, WorkItemStatus,
};
