//! Time-based key expiration.
//!
//! The expiration pipeline in write-to-removal order:
//!
//! 1. [`index`] keeps the time-ordered secondary index consistent with
//!    object writes, inside the writer's own transaction
//! 2. [`leader`] picks exactly one sweeping replica per lease period
//! 3. [`sweeper`] drives bounded, atomic sweep passes over the index
//! 4. [`resolver`] decides per entry whether it is a live expiration or a
//!    stale leftover of an overwrite/delete race
//!
//! [`codec`] defines the persisted index-key layout all of them share.

pub mod codec;
pub mod index;
pub mod leader;
pub mod sweeper;

mod resolver;
