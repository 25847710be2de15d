//! An in-process, hash-chained [`AuditLog`]. Durable audit persistence is
//! the excluded storage layer's concern; this gives `silas start` a real
//! chain (each entry's hash folds in the previous one) rather than the
//! non-chaining fake `silas-test` uses for its own unit tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use silas_core::ports::AuditLog;
use silas_core::{CoreError, CoreResult};
use std::sync::Mutex;
use uuid::Uuid;

struct Entry {
    id: Uuid,
    event: String,
    data: serde_json::Value,
    timestamp: DateTime<Utc>,
    hash: [u8; 32],
}

fn entry_hash(prev: &[u8; 32], event: &str, data: &serde_json::Value, timestamp: DateTime<Utc>) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(prev);
    hasher.update(event.as_bytes());
    hasher.update(data.to_string().as_bytes());
    hasher.update(timestamp.timestamp_nanos_opt().unwrap_or_default().to_le_bytes().as_slice());
    *hasher.finalize().as_bytes()
}

/// Append-only audit log chaining each entry's hash into the next.
pub struct ChainedAuditLog {
    entries: Mutex<Vec<Entry>>,
}

impl ChainedAuditLog {
    #[must_use]
    pub fn new() -> Self {
        ChainedAuditLog { entries: Mutex::new(Vec::new()) }
    }
}

impl Default for ChainedAuditLog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuditLog for ChainedAuditLog {
    async fn log(&self, event: &str, data: serde_json::Value) -> CoreResult<Uuid> {
        let mut guard = self.entries.lock().expect("audit log mutex poisoned");
        let prev = guard.last().map_or([0u8; 32], |e| e.hash);
        let timestamp = Utc::now();
        let hash = entry_hash(&prev, event, &data, timestamp);
        let id = Uuid::new_v4();
        guard.push(Entry { id, event: event.to_string(), data, timestamp, hash });
        Ok(id)
    }

    async fn verify_chain(&self) -> CoreResult<(bool, usize)> {
        let guard = self.entries.lock().expect("audit log mutex poisoned");
        let mut prev = [0u8; 32];
        for entry in guard.iter() {
            let expected = entry_hash(&prev, &entry.event, &entry.data, entry.timestamp);
            if expected != entry.hash {
                return Ok((false, guard.len()));
            }
            prev = entry.hash;
        }
        Ok((true, guard.len()))
    }

    async fn write_checkpoint(&self) -> CoreResult<Uuid> {
        let guard = self.entries.lock().expect("audit log mutex poisoned");
        guard.last().map(|e| e.id).ok_or_else(|| CoreError::NotFound("audit log is empty".to_string()))
    }

    async fn verify_from_checkpoint(&self, checkpoint: Uuid) -> CoreResult<bool> {
        let guard = self.entries.lock().expect("audit log mutex poisoned");
        let Some(start) = guard.iter().position(|e| e.id == checkpoint) else {
            return Err(CoreError::NotFound(format!("no audit entry with id {checkpoint}")));
        };
        let mut prev = if start == 0 { [0u8; 32] } else { guard[start - 1].hash };
        for entry in &guard[start..] {
            let expected = entry_hash(&prev, &entry.event, &entry.data, entry.timestamp);
            if expected != entry.hash {
                return Ok(false);
            }
            prev = entry.hash;
        }
        Ok(true)
    }
}
