//! Error types for expiration operations.
//!
//! Absent metadata is deliberately not an error: a missing object during
//! sweep is the normal stale-entry branch and `StoreTransaction::get`
//! reports it as `None`.

use snafu::Snafu;

use crate::store::StoreError;

/// Errors from the expiration core.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ExpireError {
    /// Timestamp cannot be represented in the fixed-width index encoding.
    #[snafu(display("timestamp {timestamp} not representable in index encoding"))]
    Encoding {
        /// The offending timestamp (nanoseconds).
        timestamp: i64,
    },

    /// Object metadata bytes do not decode.
    #[snafu(display("corrupt object metadata: {reason}"))]
    CorruptObject {
        /// What failed to decode.
        reason: String,
    },

    /// Meta key does not follow the `namespace:id:M:key` layout.
    #[snafu(display("malformed meta key: {reason}"))]
    BadMetaKey {
        /// Which part of the layout is violated.
        reason: String,
    },

    /// Database id outside the 3-digit persisted range.
    #[snafu(display("database id {id} out of range (0..=999)"))]
    DatabaseIdRange {
        /// The rejected id.
        id: u32,
    },

    /// Underlying store failure during a sweep pass.
    #[snafu(display("store error: {source}"))]
    Store {
        /// The underlying error.
        source: StoreError,
    },

    /// Underlying store failure during lease acquisition.
    #[snafu(display("lease error: {source}"))]
    Lease {
        /// The underlying error.
        source: StoreError,
    },

    /// Lease record serialization failure.
    #[snafu(display("lease record serialization error: {source}"))]
    Serialization {
        /// The underlying error.
        source: serde_json::Error,
    },
}

/// Result alias for expiration operations.
pub type Result<T, E = ExpireError> = std::result::Result<T, E>;
