//! Per-connection access level controller: gate-driven promotion, timed
//! demotion, and tool filtering for the workspace owner versus every other
//! connection.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod controller;
pub mod error;

pub use controller::{AccessController, AccessSnapshot};
pub use error::{AccessError, AccessResult};
