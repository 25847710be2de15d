//! Silas Test - shared fakes and fixtures for testing the agent runtime.
//!
//! Add to a crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! silas-test.workspace = true
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod executor_fakes;
pub mod fakes;
pub mod fixtures;
pub mod gate_fakes;
pub mod orchestrator_fakes;

pub use executor_fakes::*;
pub use fakes::*;
pub use fixtures::*;
pub use gate_fakes::*;
pub use orchestrator_fakes::*;
