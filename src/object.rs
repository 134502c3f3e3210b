//! Object model and persisted key layouts.
//!
//! An object's metadata is the single source of truth for its current
//! identity and expiration; the expiration index is derived from it.
//!
//! Persisted layouts (byte-exact, required for compatibility):
//! - meta key: `<namespace> ":" <3-byte db id> ":" "M" ":" <rawKey>`
//! - data key: `<namespace> ":" <3-byte db id> ":" "D" ":" <objectID>`
//!
//! All offsets are derived from the separator and field-width constants
//! below, never hard-coded.

use snafu::ensure;

use crate::error::{
    BadMetaKeySnafu, CorruptObjectSnafu, DatabaseIdRangeSnafu, ExpireError, Result,
};

/// Field separator in persisted keys.
pub const KEY_SEPARATOR: u8 = b':';
/// Type marker for object metadata keys.
pub const META_MARKER: u8 = b'M';
/// Type marker for out-of-line data keys.
pub const DATA_MARKER: u8 = b'D';
/// Persisted width of a database id.
pub const DATABASE_ID_LEN: usize = 3;

/// `expire_at` value meaning "never expires".
pub const NEVER_EXPIRES: i64 = 0;

const OBJECT_ID_LEN_WIDTH: usize = std::mem::size_of::<u16>();
const EXPIRE_AT_WIDTH: usize = std::mem::size_of::<i64>();

/// Storage class of an object's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectType {
    /// Value is stored inline with the metadata; deleting the metadata
    /// removes the object completely.
    Inline,
    /// Value lives in out-of-line data blocks under the object's data key.
    Composite,
}

impl ObjectType {
    fn to_byte(self) -> u8 {
        match self {
            ObjectType::Inline => 0,
            ObjectType::Composite => 1,
        }
    }

    fn from_byte(b: u8) -> Result<Self> {
        match b {
            0 => Ok(ObjectType::Inline),
            1 => Ok(ObjectType::Composite),
            other => CorruptObjectSnafu {
                reason: format!("unknown object type byte {other:#04x}"),
            }
            .fail(),
        }
    }
}

/// A stored logical entity, reduced to the fields the expiration core reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Object {
    /// Opaque identity token assigned at creation or overwrite;
    /// distinguishes incarnations of the same key.
    pub id: Vec<u8>,
    /// Storage class of the value.
    pub object_type: ObjectType,
    /// Nanosecond Unix timestamp; [`NEVER_EXPIRES`] means no expiration.
    pub expire_at: i64,
}

impl Object {
    /// True once the object's expiration time has passed.
    pub fn is_expired(&self, now: i64) -> bool {
        self.expire_at != NEVER_EXPIRES && self.expire_at <= now
    }

    /// Serialize to the persisted metadata value layout:
    /// `u16 BE id length ‖ id ‖ i64 BE expire_at ‖ type byte`.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(
            OBJECT_ID_LEN_WIDTH + self.id.len() + EXPIRE_AT_WIDTH + 1,
        );
        buf.extend_from_slice(&(self.id.len() as u16).to_be_bytes());
        buf.extend_from_slice(&self.id);
        buf.extend_from_slice(&self.expire_at.to_be_bytes());
        buf.push(self.object_type.to_byte());
        buf
    }

    /// Inverse of [`Object::encode`]; rejects truncated or oversized input.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        ensure!(
            buf.len() >= OBJECT_ID_LEN_WIDTH,
            CorruptObjectSnafu {
                reason: "missing id length".to_string()
            }
        );
        let id_len = u16::from_be_bytes([buf[0], buf[1]]) as usize;
        let expected = OBJECT_ID_LEN_WIDTH + id_len + EXPIRE_AT_WIDTH + 1;
        ensure!(
            buf.len() == expected,
            CorruptObjectSnafu {
                reason: format!("length {} does not match declared {expected}", buf.len())
            }
        );

        let id = buf[OBJECT_ID_LEN_WIDTH..OBJECT_ID_LEN_WIDTH + id_len].to_vec();
        let at_start = OBJECT_ID_LEN_WIDTH + id_len;
        let mut at = [0u8; EXPIRE_AT_WIDTH];
        at.copy_from_slice(&buf[at_start..at_start + EXPIRE_AT_WIDTH]);

        Ok(Object {
            id,
            object_type: ObjectType::from_byte(buf[expected - 1])?,
            expire_at: i64::from_be_bytes(at),
        })
    }
}

/// Namespace-scoped database identifier, persisted as exactly three
/// zero-padded ASCII decimal digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DatabaseId(u32);

impl DatabaseId {
    /// Largest id representable in the 3-digit persisted field.
    pub const MAX: u32 = 999;

    /// Construct a validated database id.
    pub fn new(id: u32) -> Result<Self> {
        ensure!(id <= Self::MAX, DatabaseIdRangeSnafu { id });
        Ok(Self(id))
    }

    /// Numeric value.
    pub fn value(self) -> u32 {
        self.0
    }

    /// Persisted 3-digit form.
    pub fn bytes(self) -> [u8; DATABASE_ID_LEN] {
        [
            b'0' + (self.0 / 100) as u8,
            b'0' + (self.0 / 10 % 10) as u8,
            b'0' + (self.0 % 10) as u8,
        ]
    }

    /// Parse the persisted 3-digit form.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        ensure!(
            bytes.len() == DATABASE_ID_LEN && bytes.iter().all(u8::is_ascii_digit),
            BadMetaKeySnafu {
                reason: "database id is not three decimal digits".to_string()
            }
        );
        let id = bytes
            .iter()
            .fold(0u32, |acc, &b| acc * 10 + u32::from(b - b'0'));
        Ok(Self(id))
    }
}

fn build_key(namespace: &[u8], db: DatabaseId, marker: u8, suffix: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(namespace.len() + DATABASE_ID_LEN + suffix.len() + 4);
    key.extend_from_slice(namespace);
    key.push(KEY_SEPARATOR);
    key.extend_from_slice(&db.bytes());
    key.push(KEY_SEPARATOR);
    key.push(marker);
    key.push(KEY_SEPARATOR);
    key.extend_from_slice(suffix);
    key
}

/// Build the metadata key for a raw user key.
pub fn meta_key(namespace: &[u8], db: DatabaseId, raw_key: &[u8]) -> Vec<u8> {
    build_key(namespace, db, META_MARKER, raw_key)
}

/// Build the physical data key for an object incarnation's payload.
pub fn data_key(namespace: &[u8], db: DatabaseId, object_id: &[u8]) -> Vec<u8> {
    build_key(namespace, db, DATA_MARKER, object_id)
}

/// Split a meta key into `(namespace, database id, raw key)`.
///
/// The raw-key offset is derived from the separator and id widths; the
/// `":M:"` section between id and raw key is validated, not skipped blind.
pub fn split_meta_key(key: &[u8]) -> Result<(&[u8], DatabaseId, &[u8])> {
    let sep = key
        .iter()
        .position(|&b| b == KEY_SEPARATOR)
        .ok_or_else(|| ExpireError::BadMetaKey {
            reason: "missing namespace separator".to_string(),
        })?;

    let id_start = sep + 1;
    let id_end = id_start + DATABASE_ID_LEN;
    // separator + marker + separator
    let raw_start = id_end + 3;
    ensure!(
        key.len() >= raw_start,
        BadMetaKeySnafu {
            reason: "key shorter than fixed layout".to_string()
        }
    );
    ensure!(
        key[id_end] == KEY_SEPARATOR
            && key[id_end + 1] == META_MARKER
            && key[id_end + 2] == KEY_SEPARATOR,
        BadMetaKeySnafu {
            reason: "missing metadata type marker".to_string()
        }
    );

    let db = DatabaseId::parse(&key[id_start..id_end])?;
    Ok((&key[..sep], db, &key[raw_start..]))
}
