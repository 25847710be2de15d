//! Single-use nonce store guarding approval-token replay (I-10).

use dashmap::DashMap;
use uuid::Uuid;

/// Tracks which token ids have already been consumed.
///
/// Shared across the runtime as a single source of truth; internally
/// synchronized, so callers do not need an external lock.
#[derive(Debug, Default)]
pub struct NonceStore {
    consumed: DashMap<Uuid, ()>,
}

impl NonceStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        NonceStore::default()
    }

    /// Atomically check-and-mark `id` consumed. Returns `true` if this call
    /// is the first to consume `id` (the token may be used); `false` if it
    /// was already consumed (replay).
    #[must_use]
    pub fn try_consume(&self, id: Uuid) -> bool {
        self.consumed.insert(id, ()).is_none()
    }

    /// `true` if `id` has already been consumed.
    #[must_use]
    pub fn is_consumed(&self, id: Uuid) -> bool {
        self.consumed.contains_key(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_consume_is_rejected() {
        let store = NonceStore::new();
        let id = Uuid::new_v4();
        assert!(store.try_consume(id));
        assert!(!store.try_consume(id));
        assert!(store.is_consumed(id));
    }
}
