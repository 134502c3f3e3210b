//! Expiration index maintenance.
//!
//! Called by the object write path whenever an object's expiration
//! changes. Both operations run inside the caller's transaction and
//! commit nothing themselves; the index stays consistent with object
//! state exactly when the caller's own mutation does.

use snafu::ResultExt;

use crate::error::{Result, StoreSnafu};
use crate::expire::codec;
use crate::metrics::{self, IndexAction};
use crate::store::StoreTransaction;

/// Move an object's index entry from `old_at` to `new_at`.
///
/// `old_at > 0` deletes the old entry; `new_at > 0` writes a new entry
/// valued with `object_id`. Both zero is a no-op. Encoding failures
/// surface before any write is buffered.
pub async fn set_expiration(
    txn: &mut dyn StoreTransaction,
    meta_key: &[u8],
    object_id: &[u8],
    old_at: i64,
    new_at: i64,
) -> Result<()> {
    let old_key = if old_at > 0 {
        Some(codec::encode_index_key(meta_key, old_at)?)
    } else {
        None
    };
    let new_key = if new_at > 0 {
        Some(codec::encode_index_key(meta_key, new_at)?)
    } else {
        None
    };

    if let Some(key) = &old_key {
        txn.delete(key).await.context(StoreSnafu)?;
    }
    if let Some(key) = &new_key {
        txn.set(key, object_id).await.context(StoreSnafu)?;
    }

    let action = match (old_key.is_some(), new_key.is_some()) {
        (true, true) => Some(IndexAction::Updated),
        (true, false) => Some(IndexAction::Removed),
        (false, true) => Some(IndexAction::Added),
        (false, false) => None,
    };
    if let Some(action) = action {
        metrics::record_index_action(action);
    }
    Ok(())
}

/// Drop the index entry when an object is deleted outright.
///
/// No-op when the object never had an expiration.
pub async fn clear_expiration(
    txn: &mut dyn StoreTransaction,
    meta_key: &[u8],
    expire_at: i64,
) -> Result<()> {
    if expire_at == 0 {
        return Ok(());
    }
    let key = codec::encode_index_key(meta_key, expire_at)?;
    txn.delete(&key).await.context(StoreSnafu)?;
    metrics::record_index_action(IndexAction::Removed);
    Ok(())
}
