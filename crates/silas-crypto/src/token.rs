//! Approval tokens: opaque, ed25519-signed references bound to a work
//! item's content hash, with clock-skew-tolerant expiration and single-use
//! replay protection via [`crate::nonce::NonceStore`].

use crate::error::{CryptoError, CryptoResult};
use crate::hash::ContentHash;
use crate::keypair::KeyPair;
use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, VerifyingKey};
use uuid::Uuid;

const SIGNING_DATA_VERSION: u8 = 0x01;
/// Default tolerance applied when comparing `expires_at` against "now",
/// absorbing clock skew between the issuer and the verifying node.
pub const DEFAULT_CLOCK_SKEW_SECS: i64 = 30;

fn write_length_prefixed(buf: &mut Vec<u8>, data: &[u8]) {
    buf.extend_from_slice(&(data.len() as u32).to_le_bytes());
    buf.extend_from_slice(data);
}

/// An approval token authorizing one work item's execution.
#[derive(Debug, Clone)]
pub struct ApprovalToken {
    pub id: Uuid,
    pub work_item_hash: ContentHash,
    pub scope: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub issuer: VerifyingKey,
    pub single_use: bool,
    signature: Signature,
}

impl ApprovalToken {
    /// The versioned binary payload that is signed and verified. Any change
    /// to a field changes the signed bytes, so tampering invalidates the signature.
    fn signing_data(
        id: Uuid,
        work_item_hash: &ContentHash,
        scope: &str,
        issued_at: DateTime<Utc>,
        expires_at: Option<DateTime<Utc>>,
        issuer: &VerifyingKey,
        single_use: bool,
    ) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.push(SIGNING_DATA_VERSION);
        write_length_prefixed(&mut buf, id.as_bytes());
        write_length_prefixed(&mut buf, work_item_hash.as_bytes());
        buf.extend_from_slice(&issued_at.timestamp().to_le_bytes());
        match expires_at {
            Some(exp) => {
                buf.push(1);
                buf.extend_from_slice(&exp.timestamp().to_le_bytes());
            }
            None => buf.push(0),
        }
        write_length_prefixed(&mut buf, scope.as_bytes());
        buf.extend_from_slice(issuer.as_bytes());
        buf.push(u8::from(single_use));
        buf
    }

    /// Issue a token for `work_item_hash`, signed by `issuer`.
    #[must_use]
    pub fn create(
        issuer: &KeyPair,
        work_item_hash: ContentHash,
        scope: impl Into<String>,
        ttl: Option<chrono::Duration>,
        single_use: bool,
    ) -> Self {
        let id = Uuid::new_v4();
        let scope = scope.into();
        let issued_at = Utc::now();
        let expires_at = ttl.map(|d| issued_at + d);
        let issuer_key = issuer.verifying_key();
        let data = Self::signing_data(id, &work_item_hash, &scope, issued_at, expires_at, &issuer_key, single_use);
        let signature = issuer.sign(&data);
        ApprovalToken {
            id,
            work_item_hash,
            scope,
            issued_at,
            expires_at,
            issuer: issuer_key,
            single_use,
            signature,
        }
    }

    /// `true` if `now` is past `expires_at` plus `skew` seconds of tolerance.
    #[must_use]
    pub fn is_expired_with_skew(&self, now: DateTime<Utc>, skew_secs: i64) -> bool {
        match self.expires_at {
            Some(exp) => now > exp + chrono::Duration::seconds(skew_secs),
            None => false,
        }
    }

    /// `true` if expired using [`DEFAULT_CLOCK_SKEW_SECS`].
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.is_expired_with_skew(now, DEFAULT_CLOCK_SKEW_SECS)
    }

    fn verify_signature(&self) -> bool {
        let data = Self::signing_data(
            self.id,
            &self.work_item_hash,
            &self.scope,
            self.issued_at,
            self.expires_at,
            &self.issuer,
            self.single_use,
        );
        crate::keypair::verify_with_key(&self.issuer, &data, &self.signature)
    }

    /// Full validation: signature, binding to `work_item_hash`, not expired
    /// (within `skew_secs`). Does not check single-use consumption — see
    /// [`crate::nonce::NonceStore`] for that, composed by the caller so the
    /// check-and-consume step is atomic from the caller's perspective.
    ///
    /// # Errors
    /// The first validation failure encountered.
    pub fn validate_with_skew(&self, expected_work_item_hash: &ContentHash, now: DateTime<Utc>, skew_secs: i64) -> CryptoResult<()> {
        if !self.verify_signature() {
            return Err(CryptoError::SignatureVerificationFailed);
        }
        if &self.work_item_hash != expected_work_item_hash {
            return Err(CryptoError::NotBound);
        }
        if self.is_expired_with_skew(now, skew_secs) {
            return Err(CryptoError::Expired(self.id.to_string()));
        }
        Ok(())
    }

    /// [`validate_with_skew`](Self::validate_with_skew) with the default clock-skew tolerance.
    ///
    /// # Errors
    /// See [`validate_with_skew`](Self::validate_with_skew).
    pub fn validate(&self, expected_work_item_hash: &ContentHash, now: DateTime<Utc>) -> CryptoResult<()> {
        self.validate_with_skew(expected_work_item_hash, now, DEFAULT_CLOCK_SKEW_SECS)
    }
}

/// Fluent builder for [`ApprovalToken`].
pub struct TokenBuilder<'a> {
    issuer: &'a KeyPair,
    work_item_hash: ContentHash,
    scope: String,
    ttl: Option<chrono::Duration>,
    single_use: bool,
}

impl<'a> TokenBuilder<'a> {
    /// Start building a token for `issuer` bound to `work_item_hash`.
    #[must_use]
    pub fn new(issuer: &'a KeyPair, work_item_hash: ContentHash) -> Self {
        TokenBuilder {
            issuer,
            work_item_hash,
            scope: String::new(),
            ttl: None,
            single_use: true,
        }
    }

    /// Set the scope the token is valid within.
    #[must_use]
    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    /// Set a time-to-live after which the token expires.
    #[must_use]
    pub fn ttl(mut self, ttl: chrono::Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Mark the token as reusable (not single-use). Defaults to single-use.
    #[must_use]
    pub fn reusable(mut self) -> Self {
        self.single_use = false;
        self
    }

    /// Finalize and sign the token.
    #[must_use]
    pub fn build(self) -> ApprovalToken {
        ApprovalToken::create(self.issuer, self.work_item_hash, self.scope, self.ttl, self.single_use)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_token_passes_validation() {
        let kp = KeyPair::generate();
        let hash = ContentHash::of_work_item("w1", "do the thing");
        let token = TokenBuilder::new(&kp, hash).scope("owner").build();
        assert!(token.validate(&hash, Utc::now()).is_ok());
    }

    #[test]
    fn wrong_binding_is_rejected() {
        let kp = KeyPair::generate();
        let hash = ContentHash::of_work_item("w1", "do the thing");
        let other_hash = ContentHash::of_work_item("w2", "do another thing");
        let token = TokenBuilder::new(&kp, hash).build();
        assert!(matches!(token.validate(&other_hash, Utc::now()), Err(CryptoError::NotBound)));
    }

    #[test]
    fn expired_token_is_rejected() {
        let kp = KeyPair::generate();
        let hash = ContentHash::of_work_item("w1", "do the thing");
        let token = TokenBuilder::new(&kp, hash).ttl(chrono::Duration::seconds(-1000)).build();
        assert!(matches!(token.validate(&hash, Utc::now()), Err(CryptoError::Expired(_))));
    }

    #[test]
    fn skew_tolerates_small_clock_drift() {
        let kp = KeyPair::generate();
        let hash = ContentHash::of_work_item("w1", "do the thing");
        let token = TokenBuilder::new(&kp, hash).ttl(chrono::Duration::seconds(10)).build();
        let slightly_later = Utc::now() + chrono::Duration::seconds(15);
        assert!(token.validate(&hash, slightly_later).is_ok());
    }

    #[test]
    fn tampered_signature_is_rejected() {
        let kp = KeyPair::generate();
        let hash = ContentHash::of_work_item("w1", "do the thing");
        let mut token = TokenBuilder::new(&kp, hash).build();
        token.scope = "tampered".into();
        assert!(matches!(token.validate(&hash, Utc::now()), Err(CryptoError::SignatureVerificationFailed)));
    }
}
