//! Two-lane gate evaluation: pluggable providers, sanitized policy
//! mutations, and the built-in output checks.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod context;
pub mod error;
pub mod output_gates;
pub mod predicate;
pub mod registry;
pub mod runner;

pub use error::{GateError, GateOpResult};
pub use predicate::PredicateProvider;
pub use registry::GateRegistry;
pub use runner::GateRunner;
