//! Transactional store seam.
//!
//! The expiration core runs against an externally supplied ordered
//! transactional storage engine. These traits capture exactly what it
//! consumes: snapshot-isolated transactions with atomic multi-key commit
//! and ordered range scans.
//!
//! Implementors must guarantee:
//! - reads within a transaction observe a consistent snapshot plus the
//!   transaction's own writes
//! - `commit` applies the whole write set atomically or not at all
//! - a failed `commit` leaves no effects (the transaction is gone either way)

mod memory;

use async_trait::async_trait;
use snafu::Snafu;

pub use memory::MemoryStore;

/// Errors from the underlying transactional store.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub))]
pub enum StoreError {
    /// Another transaction committed a conflicting write first.
    #[snafu(display("write-write conflict on commit"))]
    Conflict,

    /// The transaction was already committed or rolled back.
    #[snafu(display("transaction already closed"))]
    Closed,

    /// Engine-side failure (I/O, network, internal).
    #[snafu(display("storage backend error: {reason}"))]
    Backend {
        /// Backend-provided description.
        reason: String,
    },
}

/// Transaction priority relative to foreground traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Priority {
    /// Background work that must never starve interactive load.
    Low,
    /// Default foreground priority.
    #[default]
    Normal,
    /// Latency-critical work.
    High,
}

/// A key-value pair returned by a range scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvEntry {
    /// Full key bytes.
    pub key: Vec<u8>,
    /// Value bytes.
    pub value: Vec<u8>,
}

/// Handle to a transactional storage engine.
#[async_trait]
pub trait TransactionalStore: Send + Sync {
    /// Open a new transaction against the current snapshot.
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError>;
}

#[async_trait]
impl<T: TransactionalStore + ?Sized> TransactionalStore for std::sync::Arc<T> {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        (**self).begin().await
    }
}

/// One open transaction.
///
/// Mutations are buffered in the transaction's write set; nothing is
/// visible to other transactions until `commit` succeeds.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Read a value at the transaction's snapshot (own writes win).
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// Buffer a write.
    async fn set(&mut self, key: &[u8], value: &[u8]) -> Result<(), StoreError>;

    /// Buffer a deletion.
    async fn delete(&mut self, key: &[u8]) -> Result<(), StoreError>;

    /// Scan `[start, end_exclusive)` in ascending byte order, returning at
    /// most `limit` live entries as seen by this transaction.
    async fn scan(
        &self,
        start: &[u8],
        end_exclusive: &[u8],
        limit: usize,
    ) -> Result<Vec<KvEntry>, StoreError>;

    /// Tag the transaction's priority relative to foreground traffic.
    fn set_priority(&mut self, priority: Priority);

    /// Commit the write set atomically. A failed commit leaves no
    /// effects; the transaction is consumed either way.
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    /// Discard the write set.
    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
