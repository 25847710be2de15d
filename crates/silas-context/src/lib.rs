//! Per-scope storage of context items across four zones, profile-driven
//! per-zone budgets, observation masking, and two-tier eviction.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod error;
pub mod eviction;
pub mod manager;
pub mod masking;
pub mod render;
pub mod scorer;

pub use error::{ContextError, ContextResult};
pub use eviction::{EvictionBatch, EvictionTier};
pub use manager::ContextManager;
pub use scorer::{AdvisoryLlmScorer, LocalScorer, ScorerClient, ScorerGroup, ScorerOutput, ScoringContext, Tier2Scorer};
