//! # Ember Shared Types
//!
//! Primitive types shared across Ember subsystem crates: hashes, the
//! difficulty arithmetic type, and peer identities.

#![warn(missing_docs)]
#![warn(clippy::all)]

use serde::{Deserialize, Serialize};

pub use primitive_types::U256;

/// 32-byte Keccak-256 hash.
pub type Hash = [u8; 32];

/// The all-zero hash, used where no parent or uncle is referenced.
pub const ZERO_HASH: Hash = [0u8; 32];

/// Render the leading bytes of a hash for logs.
pub fn short_hex(hash: &Hash) -> String {
    hex::encode(&hash[..4])
}

/// Identity of a connected peer, assigned by the peer layer.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(pub u64);

impl PeerId {
    /// Reserved identity for headers re-presented from local recovery
    /// files. Never penalized.
    pub const RECOVERY: PeerId = PeerId(u64::MAX);

    /// True if this identity belongs to the local recovery replay rather
    /// than a remote peer.
    pub fn is_recovery(&self) -> bool {
        *self == Self::RECOVERY
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_recovery() {
            write!(f, "recovery")
        } else {
            write!(f, "peer-{}", self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_hex() {
        let mut h = ZERO_HASH;
        h[0] = 0xAB;
        h[1] = 0xCD;
        assert_eq!(short_hex(&h), "abcd0000");
    }

    #[test]
    fn test_peer_id_display() {
        assert_eq!(PeerId(7).to_string(), "peer-7");
        assert_eq!(PeerId::RECOVERY.to_string(), "recovery");
    }

    #[test]
    fn test_recovery_peer_is_reserved() {
        assert!(PeerId::RECOVERY.is_recovery());
        assert!(!PeerId(0).is_recovery());
    }
}
