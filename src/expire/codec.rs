//! Expiration index key codec.
//!
//! Index keys map `(expiration time, meta key)` to an object identity
//! token, laid out as:
//!
//! ```text
//! "$sys:0:at:" ‖ <8-byte order-preserving big-endian timestamp> ‖ ":" ‖ <metaKey>
//! ```
//!
//! The timestamp encoding flips the sign bit so lexicographic byte order
//! equals numeric order; a prefix scan therefore yields entries in
//! ascending expiration order. Field offsets are derived from the prefix
//! and separator lengths.

use snafu::ensure;

use crate::error::{BadMetaKeySnafu, EncodingSnafu, Result};

/// Prefix of every expiration index key.
pub const INDEX_KEY_PREFIX: &[u8] = b"$sys:0:at:";
/// Separator between the encoded timestamp and the meta key.
pub const INDEX_KEY_SEPARATOR: &[u8] = b":";

const TIMESTAMP_WIDTH: usize = std::mem::size_of::<i64>();
const TIMESTAMP_OFFSET: usize = INDEX_KEY_PREFIX.len();
const META_KEY_OFFSET: usize = TIMESTAMP_OFFSET + TIMESTAMP_WIDTH + INDEX_KEY_SEPARATOR.len();

const SIGN_BIT: u64 = 1 << 63;

/// Encode a nanosecond timestamp into its order-preserving 8-byte form.
///
/// Expiration timestamps are zero or positive by contract; negative values
/// are not representable in the persisted layout.
pub fn encode_timestamp(ts: i64) -> Result<[u8; TIMESTAMP_WIDTH]> {
    ensure!(ts >= 0, EncodingSnafu { timestamp: ts });
    Ok(((ts as u64) ^ SIGN_BIT).to_be_bytes())
}

/// Inverse of [`encode_timestamp`].
pub fn decode_timestamp(bytes: [u8; TIMESTAMP_WIDTH]) -> i64 {
    (u64::from_be_bytes(bytes) ^ SIGN_BIT) as i64
}

/// Build the index key for `(meta_key, ts)`.
pub fn encode_index_key(meta_key: &[u8], ts: i64) -> Result<Vec<u8>> {
    let encoded = encode_timestamp(ts)?;
    let mut key = Vec::with_capacity(META_KEY_OFFSET + meta_key.len());
    key.extend_from_slice(INDEX_KEY_PREFIX);
    key.extend_from_slice(&encoded);
    key.extend_from_slice(INDEX_KEY_SEPARATOR);
    key.extend_from_slice(meta_key);
    Ok(key)
}

/// Split an index key back into `(timestamp, meta key)`.
pub fn decode_index_key(key: &[u8]) -> Result<(i64, &[u8])> {
    ensure!(
        key.len() >= META_KEY_OFFSET && key.starts_with(INDEX_KEY_PREFIX),
        BadMetaKeySnafu {
            reason: "not an expiration index key".to_string()
        }
    );
    let mut ts = [0u8; TIMESTAMP_WIDTH];
    ts.copy_from_slice(&key[TIMESTAMP_OFFSET..TIMESTAMP_OFFSET + TIMESTAMP_WIDTH]);
    Ok((decode_timestamp(ts), &key[META_KEY_OFFSET..]))
}

/// Scan bounds covering the whole index: `[prefix, prefix-successor)`.
pub fn index_scan_range() -> (Vec<u8>, Vec<u8>) {
    (INDEX_KEY_PREFIX.to_vec(), prefix_successor(INDEX_KEY_PREFIX))
}

/// Immediate lexicographic successor of a prefix, for exclusive scan ends.
fn prefix_successor(prefix: &[u8]) -> Vec<u8> {
    let mut end = prefix.to_vec();
    while let Some(&last) = end.last() {
        if last < u8::MAX {
            let idx = end.len() - 1;
            end[idx] = last + 1;
            return end;
        }
        end.pop();
    }
    // All 0xff: no bounded successor exists; unreachable for our prefix.
    Vec::new()
}
