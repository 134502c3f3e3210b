//! Lease-based leader election for the sweep loop.
//!
//! Every replica runs the same periodic sweeper; a single well-known
//! lease key in the same transactional store decides which of them
//! actually sweeps each tick. There is no external lock service: the
//! lease is a read-then-write record and a lost commit race simply means
//! "not leader this tick".

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use tracing::{debug, warn};

use crate::error::{LeaseSnafu, Result, SerializationSnafu};
use crate::store::{StoreError, TransactionalStore};

/// Well-known lease key (persisted literal, required for compatibility).
pub const LEADER_LEASE_KEY: &[u8] = b"$sys:0:EXL:EXLeader";

/// Persisted lease record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LeaseRecord {
    /// Replica that holds the lease.
    pub holder_id: String,
    /// Unix milliseconds after which the lease may be taken over.
    pub expires_at_ms: u64,
}

impl LeaseRecord {
    /// True once the holder's claim has lapsed.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        self.expires_at_ms <= now_ms
    }
}

/// Try to acquire or renew the sweep lease for one tick.
///
/// Returns `Ok(true)` when this replica holds a valid lease after the
/// call. A lease held by another live replica, or a commit lost to a
/// concurrent contender, yields `Ok(false)` rather than an error. Store
/// failures surface so the scheduler can log and skip the tick.
pub async fn try_acquire(
    store: &dyn TransactionalStore,
    self_id: &str,
    lease_duration: Duration,
) -> Result<bool> {
    let now_ms = unix_now_ms();
    let mut txn = store.begin().await.context(LeaseSnafu)?;

    if let Some(raw) = txn.get(LEADER_LEASE_KEY).await.context(LeaseSnafu)? {
        match serde_json::from_slice::<LeaseRecord>(&raw) {
            Ok(record) if !record.is_expired(now_ms) && record.holder_id != self_id => {
                if let Err(err) = txn.rollback().await {
                    warn!(error = %err, "lease check rollback failed");
                }
                return Ok(false);
            }
            Ok(record) if record.is_expired(now_ms) && record.holder_id != self_id => {
                debug!(
                    previous_holder = %record.holder_id,
                    expired_at_ms = record.expires_at_ms,
                    "taking over expired sweep lease"
                );
            }
            Ok(_) => {} // our own lease, renew below
            Err(err) => {
                warn!(error = %err, "replacing unparseable sweep lease record");
            }
        }
    }

    let record = LeaseRecord {
        holder_id: self_id.to_string(),
        expires_at_ms: now_ms + lease_duration.as_millis() as u64,
    };
    let encoded = serde_json::to_vec(&record).context(SerializationSnafu)?;
    txn.set(LEADER_LEASE_KEY, &encoded).await.context(LeaseSnafu)?;

    match txn.commit().await {
        Ok(()) => Ok(true),
        Err(StoreError::Conflict) => {
            debug!(self_id, "lost sweep lease race to a concurrent contender");
            Ok(false)
        }
        Err(err) => Err(err).context(LeaseSnafu),
    }
}

pub(crate) fn unix_now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
