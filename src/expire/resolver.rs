//! Per-entry expiration resolution.
//!
//! A due index entry can describe three different worlds, decided only
//! now, at resolution time:
//!
//! - the object is gone (explicit delete, bulk flush): reclaim the old
//!   incarnation's payload
//! - the object was overwritten (current id no longer matches the id the
//!   entry was written with): reclaim the old incarnation's payload and
//!   leave the live object alone
//! - the object is live and matching: a true expiration, so delete the
//!   metadata and reclaim payload for composite objects
//!
//! Whichever branch fires, the caller deletes the index entry in the
//! same transaction.

use snafu::ResultExt;
use tracing::{debug, error};

use crate::error::{Result, StoreSnafu};
use crate::gc::Reclaimer;
use crate::object::{self, DatabaseId, Object, ObjectType};
use crate::store::StoreTransaction;

/// Resolve one due index entry identified by `(meta_key, indexed_id)`,
/// where `indexed_id` is the identity token recorded when the entry was
/// written. Errors abort the caller's whole pass.
pub async fn resolve_entry(
    txn: &mut dyn StoreTransaction,
    reclaimer: &dyn Reclaimer,
    meta_key: &[u8],
    indexed_id: &[u8],
) -> Result<()> {
    let (namespace, db, _raw_key) = object::split_meta_key(meta_key)?;

    let Some(raw) = txn.get(meta_key).await.context(StoreSnafu)? else {
        // Deleted by another path after the entry was written; only the
        // old incarnation's payload is left to clean up.
        debug!(
            meta_key = %String::from_utf8_lossy(meta_key),
            "expired object already deleted, reclaiming stale payload"
        );
        return reclaim_data_key(txn, reclaimer, namespace, db, indexed_id).await;
    };
    let obj = Object::decode(&raw)?;

    if !same_incarnation(&obj.id, indexed_id) {
        // Key was deleted and recreated since the entry was written; the
        // entry is stale for the old incarnation. The live object keeps
        // its own (newer) entry and is not touched here.
        debug!(
            meta_key = %String::from_utf8_lossy(meta_key),
            "index entry is stale for an overwritten incarnation"
        );
        return reclaim_data_key(txn, reclaimer, namespace, db, indexed_id).await;
    }

    txn.delete(meta_key).await.context(StoreSnafu)?;
    debug!(
        meta_key = %String::from_utf8_lossy(meta_key),
        "deleted expired object metadata"
    );

    if obj.object_type == ObjectType::Inline {
        return Ok(());
    }
    // The stored token may be truncated; the payload lives under the
    // full current id.
    reclaim_data_key(txn, reclaimer, namespace, db, &obj.id).await
}

/// Identity comparison over the shorter of the two tokens: a token that
/// is a prefix of the other refers to the same incarnation (stored ids
/// may be truncated relative to live ids).
fn same_incarnation(current_id: &[u8], indexed_id: &[u8]) -> bool {
    let n = current_id.len().min(indexed_id.len());
    current_id[..n] == indexed_id[..n]
}

async fn reclaim_data_key(
    txn: &mut dyn StoreTransaction,
    reclaimer: &dyn Reclaimer,
    namespace: &[u8],
    db: DatabaseId,
    object_id: &[u8],
) -> Result<()> {
    let data_key = object::data_key(namespace, db, object_id);
    if let Err(err) = reclaimer.reclaim(txn, &data_key).await {
        error!(
            namespace = %String::from_utf8_lossy(namespace),
            db_id = db.value(),
            object_id = %String::from_utf8_lossy(object_id),
            error = %err,
            "payload reclamation request failed"
        );
        return Err(err).context(StoreSnafu);
    }
    debug!(
        object_id = %String::from_utf8_lossy(object_id),
        "requested payload reclamation"
    );
    Ok(())
}
