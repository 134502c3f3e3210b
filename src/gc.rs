//! Payload reclamation seam.
//!
//! The expiration core never reclaims out-of-line payload blocks itself;
//! it requests reclamation through [`Reclaimer`] inside the sweep
//! transaction so the request commits or rolls back with everything else.
//! Reclamation must be idempotent: the same data key may be requested
//! again if a pass aborts after a racing overwrite.

use async_trait::async_trait;
use tracing::debug;

use crate::store::{StoreError, StoreTransaction};

/// Prefix under which pending reclamation marks are queued for the
/// external collector.
pub const GC_KEY_PREFIX: &[u8] = b"$sys:0:GC:";

/// Requests physical reclamation of an object incarnation's payload.
#[async_trait]
pub trait Reclaimer: Send + Sync {
    /// Request reclamation of `data_key` within the caller's transaction.
    ///
    /// Safe to call for keys already scheduled or already reclaimed.
    async fn reclaim(
        &self,
        txn: &mut dyn StoreTransaction,
        data_key: &[u8],
    ) -> Result<(), StoreError>;
}

/// Default reclaimer: queues a pending mark the external garbage
/// collector consumes later. Re-marking an already-queued key overwrites
/// the same mark, which keeps the operation idempotent.
#[derive(Debug, Clone, Copy, Default)]
pub struct GcQueue;

impl GcQueue {
    /// The pending-mark key for a data key.
    pub fn pending_key(data_key: &[u8]) -> Vec<u8> {
        let mut key = Vec::with_capacity(GC_KEY_PREFIX.len() + data_key.len());
        key.extend_from_slice(GC_KEY_PREFIX);
        key.extend_from_slice(data_key);
        key
    }
}

#[async_trait]
impl Reclaimer for GcQueue {
    async fn reclaim(
        &self,
        txn: &mut dyn StoreTransaction,
        data_key: &[u8],
    ) -> Result<(), StoreError> {
        txn.set(&Self::pending_key(data_key), &[]).await?;
        debug!(data_key = %String::from_utf8_lossy(data_key), "queued data key for gc");
        Ok(())
    }
}
