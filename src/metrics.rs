//! Counter names and recording helpers for the expiration core.
//!
//! A side channel only: nothing here affects sweep behavior. Counters go
//! through the `metrics` facade; the embedding process installs whatever
//! recorder it exports from.

use metrics::{counter, describe_counter};

/// Index mutations and expirations, labelled by `action`
/// (`added` / `removed` / `updated` / `expired`).
pub const EXPIRE_KEYS_TOTAL: &str = "tamarack.expire.keys.total";

/// Register metric descriptions with the installed recorder.
pub fn describe() {
    describe_counter!(
        EXPIRE_KEYS_TOTAL,
        "Expiration index mutations and expired keys by action"
    );
}

/// Outcome of one index-maintainer call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexAction {
    /// A new index entry was written.
    Added,
    /// An existing index entry was deleted.
    Removed,
    /// An entry was moved to a new timestamp.
    Updated,
}

impl IndexAction {
    /// Label value for the `action` dimension.
    pub fn as_str(self) -> &'static str {
        match self {
            IndexAction::Added => "added",
            IndexAction::Removed => "removed",
            IndexAction::Updated => "updated",
        }
    }
}

/// Record one index mutation.
pub fn record_index_action(action: IndexAction) {
    counter!(EXPIRE_KEYS_TOTAL, "action" => action.as_str()).increment(1);
}

/// Record entries removed by a committed sweep pass.
///
/// Called post-commit only, so rollbacks never skew the count.
pub fn record_expired(count: u64) {
    counter!(EXPIRE_KEYS_TOTAL, "action" => "expired").increment(count);
}
