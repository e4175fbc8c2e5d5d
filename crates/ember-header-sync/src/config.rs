//! # Engine Configuration

use ember_types::{Hash, ZERO_HASH};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Header synchronization configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Directory the recovery buffer flushes into.
    pub recovery_dir: PathBuf,

    /// Serialized bytes the in-memory recovery buffer may hold before a
    /// flush is forced.
    pub buffer_limit: usize,

    /// Capacity of the tip limiter.
    pub tip_limit: usize,

    /// PoW depth assigned to freshly created anchors.
    pub init_pow_depth: u64,

    /// How far into the future a new anchor's timestamp may lie, seconds.
    pub new_anchor_future_limit_secs: u64,

    /// How far into the past a new anchor's timestamp may lie, seconds.
    pub new_anchor_past_limit_secs: u64,

    /// Retry cadence per anchor request, seconds.
    pub retry_interval_secs: u64,

    /// Headers requested per anchor, walking backwards from its hash.
    pub request_length: u64,

    /// Genesis hash the forest must linearize down to.
    pub genesis_hash: Hash,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            recovery_dir: PathBuf::from("headers-recovery"),
            buffer_limit: 32 * 1024 * 1024,
            tip_limit: 16 * 1024,
            init_pow_depth: 1024,
            new_anchor_future_limit_secs: 3600,
            new_anchor_past_limit_secs: 3600,
            retry_interval_secs: 5,
            request_length: 192,
            genesis_hash: ZERO_HASH,
        }
    }
}

impl SyncConfig {
    /// A config for testing (small limits, wide timestamp window).
    pub fn for_testing(recovery_dir: impl Into<PathBuf>) -> Self {
        Self {
            recovery_dir: recovery_dir.into(),
            buffer_limit: 8 * 1024,
            tip_limit: 10,
            init_pow_depth: 16,
            new_anchor_future_limit_secs: 3600,
            new_anchor_past_limit_secs: 3600,
            retry_interval_secs: 5,
            request_length: 192,
            genesis_hash: ZERO_HASH,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert_eq!(config.tip_limit, 16 * 1024);
        assert_eq!(config.init_pow_depth, 1024);
        assert_eq!(config.request_length, 192);
    }

    #[test]
    fn test_testing_config() {
        let config = SyncConfig::for_testing("/tmp/recovery");
        assert_eq!(config.tip_limit, 10);
        assert_eq!(config.recovery_dir, PathBuf::from("/tmp/recovery"));
    }
}
