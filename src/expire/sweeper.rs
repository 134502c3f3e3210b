//! Background expiration sweep: periodic scheduler and bounded executor.
//!
//! Every replica runs this loop; the lease in [`crate::expire::leader`]
//! ensures only one of them sweeps per tick. One pass is one low-priority
//! transaction over the index prefix, capped by `batch_limit`, that
//! either commits whole or rolls back whole. Expiration is best-effort
//! and eventually correct: any failure is logged and retried implicitly
//! on the next tick.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use snafu::ResultExt;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::ExpireConfig;
use crate::error::{ExpireError, Result, StoreSnafu};
use crate::expire::{codec, leader, resolver};
use crate::gc::Reclaimer;
use crate::metrics;
use crate::store::{Priority, StoreTransaction, TransactionalStore};

/// Spawn the periodic sweep task.
///
/// Returns a [`CancellationToken`] that stops the loop. The task never
/// exits on its own: per-tick failures are logged and the next tick
/// retries from scratch.
pub fn spawn_expire_task(
    store: Arc<dyn TransactionalStore>,
    reclaimer: Arc<dyn Reclaimer>,
    config: ExpireConfig,
) -> CancellationToken {
    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();

    tokio::spawn(async move {
        run_expire_loop(store, reclaimer, config, cancel_clone).await;
    });

    cancel
}

async fn run_expire_loop(
    store: Arc<dyn TransactionalStore>,
    reclaimer: Arc<dyn Reclaimer>,
    config: ExpireConfig,
    cancel: CancellationToken,
) {
    let self_id = Uuid::new_v4().to_string();
    let mut ticker = interval(config.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(
        self_id,
        interval_ms = config.interval_ms,
        leader_lease_ms = config.leader_lease_ms,
        batch_limit = config.batch_limit,
        disable = config.disable,
        "expire task started"
    );

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!(self_id, "expire task shutting down");
                break;
            }
            _ = ticker.tick() => {
                run_expire_tick(store.as_ref(), reclaimer.as_ref(), &config, &self_id).await;
            }
        }
    }
}

/// One scheduler tick: leadership check, then at most one sweep pass.
///
/// Exposed so tests can drive ticks deterministically instead of waiting
/// on wall-clock intervals. Never returns an error; skipping a tick is
/// the whole failure-handling policy.
pub async fn run_expire_tick(
    store: &dyn TransactionalStore,
    reclaimer: &dyn Reclaimer,
    config: &ExpireConfig,
    self_id: &str,
) {
    if config.disable {
        return;
    }

    match leader::try_acquire(store, self_id, config.leader_lease()).await {
        Ok(true) => {}
        Ok(false) => {
            debug!(self_id, "not the sweep leader this tick");
            return;
        }
        Err(err) => {
            error!(self_id, error = %err, "sweep leader check failed");
            return;
        }
    }

    match run_expire(store, reclaimer, config.batch_limit).await {
        Ok(expired) => {
            debug!(self_id, expired, "sweep pass finished");
        }
        Err(err) => {
            error!(self_id, error = %err, "sweep pass failed");
        }
    }
}

/// One bounded sweep pass in one low-priority transaction.
///
/// Scans the index in ascending expiration order, resolves every due
/// entry up to `batch_limit`, deletes each handled entry, and commits
/// everything atomically. Stops at the first not-yet-due entry: scan
/// order makes everything after it not due either. Returns the number of
/// entries handled by the committed pass.
///
/// A commit failure propagates without an explicit rollback:
/// [`StoreTransaction::commit`] consumes the transaction and leaves no
/// effects when it fails.
pub async fn run_expire(
    store: &dyn TransactionalStore,
    reclaimer: &dyn Reclaimer,
    batch_limit: usize,
) -> Result<u64> {
    let mut txn = store.begin().await.context(StoreSnafu)?;
    txn.set_priority(Priority::Low);

    let (start, end) = codec::index_scan_range();
    let entries = match txn.scan(&start, &end, batch_limit).await {
        Ok(entries) => entries,
        Err(err) => {
            rollback_logged(txn).await;
            return Err(ExpireError::Store { source: err });
        }
    };

    let now = unix_now_ns();
    let mut expired: u64 = 0;

    for entry in &entries {
        let (ts, meta_key) = match codec::decode_index_key(&entry.key) {
            Ok(decoded) => decoded,
            Err(err) => {
                rollback_logged(txn).await;
                return Err(err);
            }
        };

        if ts > now {
            debug!(
                timestamp = ts,
                meta_key = %String::from_utf8_lossy(meta_key),
                "first entry not yet due, stopping scan"
            );
            break;
        }

        if let Err(err) = resolver::resolve_entry(txn.as_mut(), reclaimer, meta_key, &entry.value).await {
            rollback_logged(txn).await;
            return Err(err);
        }

        // The entry is handled this pass regardless of which resolver
        // branch fired.
        if let Err(err) = txn.delete(&entry.key).await {
            rollback_logged(txn).await;
            return Err(ExpireError::Store { source: err });
        }
        expired += 1;
    }

    txn.commit().await.context(StoreSnafu)?;

    // Post-commit only, so a rollback never skews the counter.
    if expired > 0 {
        metrics::record_expired(expired);
    }
    Ok(expired)
}

async fn rollback_logged(txn: Box<dyn StoreTransaction>) {
    if let Err(err) = txn.rollback().await {
        warn!(error = %err, "sweep pass rollback failed");
    }
}

pub(crate) fn unix_now_ns() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as i64
}
