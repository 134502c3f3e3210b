//! End-to-end tests for the expiration sweep.
//!
//! Drives sweep passes deterministically against the in-memory store
//! with a recording reclaimer.
//!
//! # Test Coverage
//!
//! - Due-entry exactness: everything at or before "now" is handled, the
//!   first later entry stops the scan
//! - Batch limit bounds one pass; leftovers drain on later passes
//! - True expiration for inline and composite objects
//! - Stale entries from overwrites and from out-of-band deletes
//! - Atomicity under induced mid-pass failure
//! - Scheduler ticks: non-leader and disabled replicas mutate nothing

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tamarack::expire::codec;
use tamarack::expire::index;
use tamarack::expire::leader;
use tamarack::gc::GcQueue;
use tamarack::object::{self, DatabaseId, Object, ObjectType};
use tamarack::store::StoreError;
use tamarack::{
    run_expire, run_expire_tick, ExpireConfig, MemoryStore, Reclaimer, StoreTransaction,
    TransactionalStore,
};

/// Reclaimer that records every requested data key and queues the GC
/// mark like the real one.
#[derive(Default)]
struct RecordingReclaimer {
    calls: Mutex<Vec<Vec<u8>>>,
}

impl RecordingReclaimer {
    fn calls(&self) -> Vec<Vec<u8>> {
        self.calls.lock().expect("reclaimer mutex poisoned").clone()
    }
}

#[async_trait]
impl Reclaimer for RecordingReclaimer {
    async fn reclaim(
        &self,
        txn: &mut dyn StoreTransaction,
        data_key: &[u8],
    ) -> Result<(), StoreError> {
        self.calls
            .lock()
            .expect("reclaimer mutex poisoned")
            .push(data_key.to_vec());
        GcQueue.reclaim(txn, data_key).await
    }
}

/// Reclaimer that fails on the nth call (zero-based).
struct FailingReclaimer {
    fail_on: usize,
    calls: AtomicUsize,
}

impl FailingReclaimer {
    fn new(fail_on: usize) -> Self {
        Self {
            fail_on,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Reclaimer for FailingReclaimer {
    async fn reclaim(
        &self,
        txn: &mut dyn StoreTransaction,
        data_key: &[u8],
    ) -> Result<(), StoreError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n == self.fail_on {
            return Err(StoreError::Backend {
                reason: "injected reclamation failure".to_string(),
            });
        }
        GcQueue.reclaim(txn, data_key).await
    }
}

/// Opt-in log output while debugging: `RUST_LOG=debug cargo test`.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn db() -> DatabaseId {
    DatabaseId::new(1).expect("valid database id")
}

fn now_ns() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("clock before epoch")
        .as_nanos() as i64
}

/// Write an object and its index entry the way the object write path
/// does: metadata and index mutation in one committed transaction.
async fn put_object(
    store: &MemoryStore,
    raw_key: &[u8],
    id: &[u8],
    object_type: ObjectType,
    expire_at: i64,
) -> Vec<u8> {
    let meta_key = object::meta_key(b"ns", db(), raw_key);
    let obj = Object {
        id: id.to_vec(),
        object_type,
        expire_at,
    };

    let mut txn = store.begin().await.expect("begin");
    txn.set(&meta_key, &obj.encode()).await.expect("set meta");
    index::set_expiration(txn.as_mut(), &meta_key, id, 0, expire_at)
        .await
        .expect("index entry");
    txn.commit().await.expect("commit");
    meta_key
}

async fn live_keys(store: &MemoryStore) -> BTreeMap<Vec<u8>, Vec<u8>> {
    store.dump().await
}

fn index_entries(dump: &BTreeMap<Vec<u8>, Vec<u8>>) -> Vec<Vec<u8>> {
    dump.keys()
        .filter(|k| k.starts_with(codec::INDEX_KEY_PREFIX))
        .cloned()
        .collect()
}

// ============================================================================
// Sweep executor
// ============================================================================

#[tokio::test]
async fn empty_index_is_a_noop() {
    let store = MemoryStore::new();
    let reclaimer = RecordingReclaimer::default();

    let expired = run_expire(&store, &reclaimer, 100).await.expect("pass");
    assert_eq!(expired, 0);
    assert!(reclaimer.calls().is_empty());
    assert!(live_keys(&store).await.is_empty());
}

#[tokio::test]
async fn not_yet_due_entries_are_untouched() {
    let store = MemoryStore::new();
    let reclaimer = RecordingReclaimer::default();
    put_object(&store, b"future", b"id-f", ObjectType::Inline, now_ns() + 60_000_000_000).await;

    let before = live_keys(&store).await;
    let expired = run_expire(&store, &reclaimer, 100).await.expect("pass");

    assert_eq!(expired, 0);
    assert!(reclaimer.calls().is_empty());
    assert_eq!(live_keys(&store).await, before);
}

#[tokio::test]
async fn true_expiration_inline_removes_metadata_only() {
    let store = MemoryStore::new();
    let reclaimer = RecordingReclaimer::default();
    let meta_key = put_object(&store, b"k", b"id-1", ObjectType::Inline, 1).await;

    let expired = run_expire(&store, &reclaimer, 100).await.expect("pass");
    assert_eq!(expired, 1);

    let dump = live_keys(&store).await;
    assert!(!dump.contains_key(&meta_key));
    assert!(index_entries(&dump).is_empty());
    // Inline values live in the metadata; nothing to reclaim.
    assert!(reclaimer.calls().is_empty());
}

#[tokio::test]
async fn true_expiration_composite_reclaims_payload_once() {
    let store = MemoryStore::new();
    let reclaimer = RecordingReclaimer::default();
    let meta_key = put_object(&store, b"k", b"id-1", ObjectType::Composite, 1).await;

    let expired = run_expire(&store, &reclaimer, 100).await.expect("pass");
    assert_eq!(expired, 1);

    let dump = live_keys(&store).await;
    assert!(!dump.contains_key(&meta_key));
    assert!(index_entries(&dump).is_empty());
    assert_eq!(reclaimer.calls(), vec![object::data_key(b"ns", db(), b"id-1")]);

    // A second pass finds nothing left.
    let expired = run_expire(&store, &reclaimer, 100).await.expect("pass");
    assert_eq!(expired, 0);
    assert_eq!(reclaimer.calls().len(), 1);
}

#[tokio::test]
async fn truncated_stored_id_reclaims_the_full_data_key() {
    let store = MemoryStore::new();
    let reclaimer = RecordingReclaimer::default();
    let meta_key = object::meta_key(b"ns", db(), b"k");
    let obj = Object {
        id: b"abcdef".to_vec(),
        object_type: ObjectType::Composite,
        expire_at: 1,
    };

    // Stored identity tokens may be truncated relative to the live id;
    // a prefix still counts as the same incarnation.
    let mut txn = store.begin().await.expect("begin");
    txn.set(&meta_key, &obj.encode()).await.expect("set meta");
    index::set_expiration(txn.as_mut(), &meta_key, b"abc", 0, 1)
        .await
        .expect("index entry");
    txn.commit().await.expect("commit");

    let expired = run_expire(&store, &reclaimer, 100).await.expect("pass");
    assert_eq!(expired, 1);

    let dump = live_keys(&store).await;
    assert!(!dump.contains_key(&meta_key));
    assert!(index_entries(&dump).is_empty());
    // The payload lives under the full id, not the truncated token.
    assert_eq!(reclaimer.calls(), vec![object::data_key(b"ns", db(), b"abcdef")]);
}

#[tokio::test]
async fn stale_overwrite_reclaims_old_incarnation_only() {
    let store = MemoryStore::new();
    let reclaimer = RecordingReclaimer::default();
    let meta_key = put_object(&store, b"k", b"id-old", ObjectType::Composite, 1).await;

    // Overwrite: a new incarnation that never expires replaces the
    // metadata, but the race left the old index entry behind.
    let new_obj = Object {
        id: b"id-new".to_vec(),
        object_type: ObjectType::Composite,
        expire_at: 0,
    };
    let mut txn = store.begin().await.expect("begin");
    txn.set(&meta_key, &new_obj.encode()).await.expect("set");
    txn.commit().await.expect("commit");

    let expired = run_expire(&store, &reclaimer, 100).await.expect("pass");
    assert_eq!(expired, 1);

    let dump = live_keys(&store).await;
    // The live incarnation is untouched.
    assert_eq!(dump.get(&meta_key), Some(&new_obj.encode()));
    assert!(index_entries(&dump).is_empty());
    // Only the overwritten incarnation's payload is reclaimed.
    assert_eq!(reclaimer.calls(), vec![object::data_key(b"ns", db(), b"id-old")]);
}

#[tokio::test]
async fn stale_entry_for_deleted_object_reclaims_without_error() {
    let store = MemoryStore::new();
    let reclaimer = RecordingReclaimer::default();
    let meta_key = put_object(&store, b"k", b"id-gone", ObjectType::Inline, 1).await;

    // Bulk-flush style deletion that bypasses clear_expiration.
    let mut txn = store.begin().await.expect("begin");
    txn.delete(&meta_key).await.expect("delete");
    txn.commit().await.expect("commit");

    let expired = run_expire(&store, &reclaimer, 100).await.expect("pass");
    assert_eq!(expired, 1);

    let dump = live_keys(&store).await;
    assert!(index_entries(&dump).is_empty());
    assert_eq!(reclaimer.calls(), vec![object::data_key(b"ns", db(), b"id-gone")]);
}

#[tokio::test]
async fn batch_limit_bounds_one_pass_and_later_passes_drain() {
    let store = MemoryStore::new();
    let reclaimer = RecordingReclaimer::default();
    for i in 1..=5u8 {
        put_object(&store, &[b'k', i], &[b'i', i], ObjectType::Inline, i64::from(i)).await;
    }

    assert_eq!(run_expire(&store, &reclaimer, 2).await.expect("pass"), 2);
    let dump = live_keys(&store).await;
    assert_eq!(index_entries(&dump).len(), 3);

    assert_eq!(run_expire(&store, &reclaimer, 2).await.expect("pass"), 2);
    assert_eq!(run_expire(&store, &reclaimer, 2).await.expect("pass"), 1);
    assert_eq!(run_expire(&store, &reclaimer, 2).await.expect("pass"), 0);
    assert!(index_entries(&live_keys(&store).await).is_empty());
}

#[tokio::test]
async fn scan_stops_at_first_entry_past_now() {
    let store = MemoryStore::new();
    let reclaimer = RecordingReclaimer::default();
    let far_future = now_ns() + 3_600_000_000_000;
    put_object(&store, b"due-1", b"a", ObjectType::Inline, 1).await;
    put_object(&store, b"due-2", b"b", ObjectType::Inline, 2).await;
    let future_meta = put_object(&store, b"later", b"c", ObjectType::Inline, far_future).await;

    let expired = run_expire(&store, &reclaimer, 100).await.expect("pass");
    assert_eq!(expired, 2);

    let dump = live_keys(&store).await;
    assert!(dump.contains_key(&future_meta));
    assert_eq!(
        index_entries(&dump),
        vec![codec::encode_index_key(&future_meta, far_future).expect("key")]
    );
}

#[tokio::test]
async fn passes_handle_entries_in_expiration_order() {
    let store = MemoryStore::new();
    let reclaimer = RecordingReclaimer::default();
    // Inserted out of order; the index scan must return them by time.
    for (i, ts) in [40i64, 10, 30, 20].into_iter().enumerate() {
        put_object(&store, &[b'k', i as u8], b"id", ObjectType::Inline, ts).await;
    }

    // One at a time: the earliest remaining timestamp goes first.
    for expected in [&[b'k', 1u8], &[b'k', 3], &[b'k', 2], &[b'k', 0]] {
        let before = index_entries(&live_keys(&store).await);
        assert_eq!(run_expire(&store, &reclaimer, 1).await.expect("pass"), 1);
        let after = index_entries(&live_keys(&store).await);
        let handled: Vec<_> = before.iter().filter(|k| !after.contains(*k)).collect();
        let (_, meta) = codec::decode_index_key(handled[0]).expect("decode");
        assert_eq!(meta, object::meta_key(b"ns", db(), expected).as_slice());
    }
}

#[tokio::test]
async fn induced_failure_leaves_store_untouched() {
    init_tracing();
    let store = MemoryStore::new();
    for i in 1..=3u8 {
        put_object(&store, &[b'k', i], &[b'i', i], ObjectType::Composite, i64::from(i)).await;
    }
    let before = live_keys(&store).await;

    // Third reclamation fails; the first two entries were already
    // resolved in the same pass and must roll back with it.
    let reclaimer = FailingReclaimer::new(2);
    let err = run_expire(&store, &reclaimer, 100).await;
    assert!(err.is_err());
    assert_eq!(live_keys(&store).await, before);

    // A healthy pass afterwards drains everything.
    let ok = RecordingReclaimer::default();
    assert_eq!(run_expire(&store, &ok, 100).await.expect("pass"), 3);
    assert_eq!(ok.calls().len(), 3);
}

// ============================================================================
// Scheduler ticks
// ============================================================================

#[tokio::test]
async fn non_leader_tick_performs_zero_mutations() {
    let store = MemoryStore::new();
    let reclaimer = RecordingReclaimer::default();
    put_object(&store, b"k", b"id", ObjectType::Inline, 1).await;

    // Another replica holds the lease.
    assert!(leader::try_acquire(&store, "other", Duration::from_secs(60))
        .await
        .expect("acquire"));
    let before = live_keys(&store).await;

    let config = ExpireConfig::default();
    run_expire_tick(&store, &reclaimer, &config, "me").await;

    assert_eq!(live_keys(&store).await, before);
    assert!(reclaimer.calls().is_empty());
}

#[tokio::test]
async fn disabled_config_skips_even_the_lease() {
    let store = MemoryStore::new();
    let reclaimer = RecordingReclaimer::default();
    put_object(&store, b"k", b"id", ObjectType::Inline, 1).await;
    let before = live_keys(&store).await;

    let config = ExpireConfig {
        disable: true,
        ..ExpireConfig::default()
    };
    run_expire_tick(&store, &reclaimer, &config, "me").await;

    // No sweep, and no lease record written either.
    assert_eq!(live_keys(&store).await, before);
}

#[tokio::test]
async fn leader_tick_sweeps() {
    let store = MemoryStore::new();
    let reclaimer = RecordingReclaimer::default();
    let meta_key = put_object(&store, b"k", b"id", ObjectType::Inline, 1).await;

    let config = ExpireConfig::default();
    run_expire_tick(&store, &reclaimer, &config, "me").await;

    let dump = live_keys(&store).await;
    assert!(!dump.contains_key(&meta_key));
    assert!(index_entries(&dump).is_empty());
}

#[tokio::test]
async fn background_task_sweeps_and_shuts_down() {
    init_tracing();
    let store = MemoryStore::new();
    let meta_key = put_object(&store, b"k", b"id", ObjectType::Inline, 1).await;

    let config = ExpireConfig {
        interval_ms: 10,
        leader_lease_ms: 1_000,
        ..ExpireConfig::default()
    };
    let cancel = tamarack::spawn_expire_task(
        std::sync::Arc::new(store.clone()),
        std::sync::Arc::new(GcQueue),
        config,
    );

    // Eventually correct: poll until the sweep removes the object.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if !live_keys(&store).await.contains_key(&meta_key) {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "sweep never ran");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cancel.cancel();
}
