//! An [`ApprovalVerifier`] backed by `silas-crypto`'s signed, single-use
//! [`ApprovalToken`]. Tokens are opaque ids at the trait boundary; the
//! signed token itself is kept in-process, keyed by that id.

use async_trait::async_trait;
use chrono::Utc;
use silas_core::ports::ApprovalVerifier;
use silas_core::{CoreError, CoreResult, Scope, WorkItem};
use silas_crypto::{ApprovalToken, ContentHash, KeyPair, NonceStore, TokenBuilder};
use std::collections::HashMap;
use std::sync::Mutex;

/// Issues and verifies approval tokens signed by a single in-process
/// [`KeyPair`], with replay protection for single-use tokens via
/// [`NonceStore`].
pub struct SignedApprovalVerifier {
    issuer: KeyPair,
    ttl: chrono::Duration,
    tokens: Mutex<HashMap<String, ApprovalToken>>,
    consumed: NonceStore,
}

impl SignedApprovalVerifier {
    #[must_use]
    pub fn new(issuer: KeyPair, ttl: chrono::Duration) -> Self {
        SignedApprovalVerifier { issuer, ttl, tokens: Mutex::new(HashMap::new()), consumed: NonceStore::new() }
    }

    fn lookup(&self, token: &str) -> CoreResult<ApprovalToken> {
        self.tokens
            .lock()
            .expect("approval token map mutex poisoned")
            .get(token)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("no approval token '{token}'")))
    }
}

#[async_trait]
impl ApprovalVerifier for SignedApprovalVerifier {
    async fn check(&self, token: &str, work_item: &WorkItem) -> CoreResult<(bool, String)> {
        let approval = self.lookup(token)?;
        let hash = ContentHash::of_work_item(&work_item.id, &work_item.body);
        match approval.validate(&hash, Utc::now()) {
            Ok(()) => Ok((true, "token valid".to_string())),
            Err(e) => Ok((false, e.to_string())),
        }
    }

    async fn verify(&self, token: &str, work_item: &WorkItem, _spawned: Option<&str>) -> CoreResult<bool> {
        let approval = self.lookup(token)?;
        let hash = ContentHash::of_work_item(&work_item.id, &work_item.body);
        if approval.validate(&hash, Utc::now()).is_err() {
            return Ok(false);
        }
        if approval.single_use && !self.consumed.try_consume(approval.id) {
            return Ok(false);
        }
        Ok(true)
    }

    async fn issue_token(&self, work_item: &WorkItem, decision: &str, scope: &Scope) -> CoreResult<String> {
        if decision != "approve" {
            return Err(CoreError::PermissionDenied(format!("decision '{decision}' does not authorize execution")));
        }
        let hash = ContentHash::of_work_item(&work_item.id, &work_item.body);
        let token = TokenBuilder::new(&self.issuer, hash).scope(scope.as_str()).ttl(self.ttl).build();
        let id = token.id.to_string();
        self.tokens.lock().expect("approval token map mutex poisoned").insert(id.clone(), token);
        Ok(id)
    }
}
