//! Expiration sweep configuration.
//!
//! Deserializes from the embedding service's TOML config; every field has
//! a default so an absent `[expire]` section behaves sensibly.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default values for configuration.
mod defaults {
    pub fn interval_ms() -> u64 {
        1_000
    }

    pub fn leader_lease_ms() -> u64 {
        3_000
    }

    pub fn batch_limit() -> usize {
        256
    }
}

/// Configuration for the background expiration sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpireConfig {
    /// Skip all sweeping on this replica.
    #[serde(default)]
    pub disable: bool,

    /// Tick period in milliseconds.
    #[serde(default = "defaults::interval_ms")]
    pub interval_ms: u64,

    /// Sweep-leader lease duration in milliseconds. Should comfortably
    /// exceed the tick interval so leadership is renewed before lapsing.
    #[serde(default = "defaults::leader_lease_ms")]
    pub leader_lease_ms: u64,

    /// Maximum index entries handled per sweep pass; bounds transaction
    /// size and duration.
    #[serde(default = "defaults::batch_limit")]
    pub batch_limit: usize,
}

impl Default for ExpireConfig {
    fn default() -> Self {
        Self {
            disable: false,
            interval_ms: defaults::interval_ms(),
            leader_lease_ms: defaults::leader_lease_ms(),
            batch_limit: defaults::batch_limit(),
        }
    }
}

impl ExpireConfig {
    /// Tick period.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Leader lease duration.
    pub fn leader_lease(&self) -> Duration {
        Duration::from_millis(self.leader_lease_ms)
    }
}
