//! In-memory implementation of the transactional store for testing.
//!
//! Provides a deterministic, non-persistent store behind the production
//! traits, mirroring the engine's behavior without network or disk I/O:
//! snapshot reads (the whole map is cloned at `begin`), buffered write
//! sets, and first-committer-wins write-write conflict detection via
//! per-key commit versions. Deletions leave versioned tombstones so a
//! concurrent delete still conflicts with a racing write.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{KvEntry, Priority, StoreError, StoreTransaction, TransactionalStore};

#[derive(Debug, Clone)]
struct Versioned {
    /// `None` is a tombstone left by a committed delete.
    value: Option<Vec<u8>>,
    /// Commit sequence that last wrote this key.
    version: u64,
}

#[derive(Debug, Default)]
struct Shared {
    data: BTreeMap<Vec<u8>, Versioned>,
    commit_seq: u64,
}

/// Deterministic in-memory transactional store.
#[derive(Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Mutex<Shared>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all live entries, for state comparisons in tests.
    pub async fn dump(&self) -> BTreeMap<Vec<u8>, Vec<u8>> {
        let shared = self.shared.lock().await;
        shared
            .data
            .iter()
            .filter_map(|(k, v)| v.value.as_ref().map(|value| (k.clone(), value.clone())))
            .collect()
    }
}

#[async_trait]
impl TransactionalStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        let shared = self.shared.lock().await;
        Ok(Box::new(MemoryTransaction {
            store: Arc::clone(&self.shared),
            snapshot: shared.data.clone(),
            snapshot_seq: shared.commit_seq,
            writes: BTreeMap::new(),
            priority: Priority::Normal,
        }))
    }
}

/// One open transaction against a [`MemoryStore`].
struct MemoryTransaction {
    store: Arc<Mutex<Shared>>,
    snapshot: BTreeMap<Vec<u8>, Versioned>,
    snapshot_seq: u64,
    /// Buffered writes; `None` marks a pending delete.
    writes: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
    /// Accepted and ignored: the in-memory engine has no scheduler.
    #[allow(dead_code)]
    priority: Priority,
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        if let Some(pending) = self.writes.get(key) {
            return Ok(pending.clone());
        }
        Ok(self.snapshot.get(key).and_then(|v| v.value.clone()))
    }

    async fn set(&mut self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.writes.insert(key.to_vec(), Some(value.to_vec()));
        Ok(())
    }

    async fn delete(&mut self, key: &[u8]) -> Result<(), StoreError> {
        self.writes.insert(key.to_vec(), None);
        Ok(())
    }

    async fn scan(
        &self,
        start: &[u8],
        end_exclusive: &[u8],
        limit: usize,
    ) -> Result<Vec<KvEntry>, StoreError> {
        if start >= end_exclusive {
            return Ok(Vec::new());
        }
        let bounds = (Bound::Included(start), Bound::Excluded(end_exclusive));

        // Overlay the write set on the snapshot within the range.
        let mut merged: BTreeMap<Vec<u8>, Option<Vec<u8>>> = BTreeMap::new();
        for (key, versioned) in self.snapshot.range::<[u8], _>(bounds) {
            merged.insert(key.clone(), versioned.value.clone());
        }
        for (key, pending) in self.writes.range::<[u8], _>(bounds) {
            merged.insert(key.clone(), pending.clone());
        }

        Ok(merged
            .into_iter()
            .filter_map(|(key, value)| value.map(|value| KvEntry { key, value }))
            .take(limit)
            .collect())
    }

    fn set_priority(&mut self, priority: Priority) {
        self.priority = priority;
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let mut shared = self.store.lock().await;

        // First committer wins: any key we wrote that was committed to
        // after our snapshot aborts the whole transaction.
        for key in self.writes.keys() {
            if let Some(current) = shared.data.get(key) {
                if current.version > self.snapshot_seq {
                    return Err(StoreError::Conflict);
                }
            }
        }

        shared.commit_seq += 1;
        let version = shared.commit_seq;
        for (key, pending) in self.writes {
            shared.data.insert(
                key,
                Versioned {
                    value: pending,
                    version,
                },
            );
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}
