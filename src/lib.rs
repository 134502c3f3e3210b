//! Tamarack: transactional TTL expiration core for a distributed
//! key-value store.
//!
//! Built atop an externally supplied ordered transactional storage engine
//! (snapshot isolation, atomic multi-key commit, range scans), this crate
//! lets any stored object carry an expiration timestamp and guarantees
//! that expired objects, metadata and out-of-line payload alike, are
//! eventually and exactly-once removed, while every service replica runs
//! the same sweep loop concurrently.
//!
//! # Architecture
//!
//! - [`expire::codec`]: time-ordered secondary index key layout
//! - [`expire::index`]: index maintenance on the object write path
//! - [`expire::leader`]: lease-based sweep leadership, no external lock
//!   service
//! - [`expire::sweeper`]: periodic scheduler and bounded atomic sweep
//!   passes
//! - [`store`]: the transactional-engine seam plus a deterministic
//!   in-memory implementation for tests
//! - [`gc`]: payload reclamation seam consumed by the sweep
//!
//! Expiration is a background guarantee: failures delay cleanup, they
//! never corrupt it.

pub mod config;
pub mod error;
pub mod expire;
pub mod gc;
pub mod metrics;
pub mod object;
pub mod store;

pub use config::ExpireConfig;
pub use error::ExpireError;
pub use expire::sweeper::{run_expire, run_expire_tick, spawn_expire_task};
pub use gc::{GcQueue, Reclaimer};
pub use object::{Object, ObjectType};
pub use store::{MemoryStore, StoreError, StoreTransaction, TransactionalStore};
