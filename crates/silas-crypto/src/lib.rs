//! Approval-token signing and verification, single-use replay protection,
//! and the content-hash primitive work items are bound to.
//!
//! Treat signing and hashing as primitives (ed25519, blake3) — this crate
//! does not implement cryptography, only the approval-token envelope and
//! nonce bookkeeping around it.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod error;
pub mod hash;
pub mod keypair;
pub mod nonce;
pub mod token;

pub use error::{CryptoError, CryptoResult};
pub use hash::ContentHash;
pub use keypair::KeyPair;
pub use nonce::NonceStore;
pub use token::{ApprovalToken, TokenBuilder};
