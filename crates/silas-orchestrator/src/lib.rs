//! The per-connection turn pipeline: gate precompilation, input/output
//! gates, chronicle and memory bookkeeping, context budget enforcement,
//! proxy/planner routing, and startup rehydration of prior sessions.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod error;
pub mod orchestrator;
pub mod ports;

pub use error::{OrchestratorError, OrchestratorResult};
pub use orchestrator::Orchestrator;
pub use ports::{PlanOutcome, PlannerAgent, ProxyAgent, QueueBridge, RouteDecision, Suggestion, SuggestionEngine};
