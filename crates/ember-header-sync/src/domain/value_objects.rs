//! # Domain Value Objects
//!
//! Immutable values crossing the engine's boundaries: the penalty taxonomy,
//! outbound request and chain-delivery descriptors, and the ordering key of
//! the tip limiter.

use super::entities::BlockHeader;
use ember_types::{short_hex, Hash, PeerId, U256};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Fixed taxonomy of peer protocol violations.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Penalty {
    /// No violation.
    None,
    /// Header hash is in the bad-header set.
    BadBlock,
    /// The same header appeared twice in one batch.
    DuplicateHeader,
    /// Child block height is not parent height + 1.
    WrongChildBlockHeight,
    /// Child difficulty does not match the recalculation rule.
    WrongChildDifficulty,
    /// Proof-of-work seal check failed.
    InvalidSeal,
    /// New anchor timestamp too far in the future.
    TooFarFuture,
    /// New anchor timestamp too far in the past.
    TooFarPast,
}

impl std::fmt::Display for Penalty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Penalty::None => "None",
            Penalty::BadBlock => "BadBlock",
            Penalty::DuplicateHeader => "DuplicateHeader",
            Penalty::WrongChildBlockHeight => "WrongChildBlockHeight",
            Penalty::WrongChildDifficulty => "WrongChildDifficulty",
            Penalty::InvalidSeal => "InvalidSeal",
            Penalty::TooFarFuture => "TooFarFuture",
            Penalty::TooFarPast => "TooFarPast",
        };
        f.write_str(name)
    }
}

/// Penalty report attached to a peer, fire-and-forget on the penalty sink.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerPenalty {
    /// The offending peer.
    pub peer: PeerId,
    /// Violation kind.
    pub penalty: Penalty,
    /// Underlying structural detail, when one exists.
    pub details: Option<String>,
}

impl PeerPenalty {
    /// Build a report without detail text.
    pub fn new(peer: PeerId, penalty: Penalty) -> Self {
        Self {
            peer,
            penalty,
            details: None,
        }
    }

    /// Build a report carrying an underlying detail.
    pub fn with_details(peer: PeerId, penalty: Penalty, details: impl Into<String>) -> Self {
        Self {
            peer,
            penalty,
            details: Some(details.into()),
        }
    }
}

impl std::fmt::Display for PeerPenalty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.details {
            Some(details) => write!(f, "{}: {} ({})", self.peer, self.penalty, details),
            None => write!(f, "{}: {}", self.peer, self.penalty),
        }
    }
}

/// Outbound request for a run of headers ending at `hash` and walking
/// backwards through parents, `length` headers in total.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeaderRequest {
    /// Hash the peer should start from.
    pub hash: Hash,
    /// How many headers to return, walking parent links.
    pub length: u64,
}

/// A block-hash announcement from the peer layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockAnnouncement {
    /// Announced block hash.
    pub hash: Hash,
    /// Announced block height.
    pub number: u64,
}

/// A validated, height-contiguous run of headers delivered downstream when
/// the forest first linearizes down to genesis or a checkpoint.
#[derive(Clone, Debug)]
pub struct ChainRange {
    /// Headers, oldest first.
    pub headers: Vec<BlockHeader>,
    /// Height of the oldest header.
    pub from_height: u64,
    /// Height of the youngest header.
    pub to_height: u64,
}

/// Ordering key of the tip limiter: weakest cumulative difficulty first,
/// hash as the deterministic tie-breaker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TipKey {
    /// Cumulative difficulty of the tip.
    pub cumulative_difficulty: U256,
    /// Tip hash.
    pub hash: Hash,
}

impl Ord for TipKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cumulative_difficulty
            .cmp(&other.cumulative_difficulty)
            .then_with(|| self.hash.cmp(&other.hash))
    }
}

impl PartialOrd for TipKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Display for TipKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", short_hex(&self.hash), self.cumulative_difficulty)
    }
}

/// Snapshot of the engine state for callers and logs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SyncStatus {
    /// Number of anchors in the forest.
    pub anchor_count: usize,
    /// Number of tips in the forest.
    pub tip_count: usize,
    /// Whether the forest has linearized down to a hard-coded root.
    pub initiated: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_penalty_display() {
        assert_eq!(Penalty::DuplicateHeader.to_string(), "DuplicateHeader");
        assert_eq!(Penalty::TooFarPast.to_string(), "TooFarPast");
    }

    #[test]
    fn test_peer_penalty_display() {
        let report = PeerPenalty::with_details(PeerId(3), Penalty::InvalidSeal, "wrong nonce: 1");
        let text = report.to_string();
        assert!(text.contains("peer-3"));
        assert!(text.contains("InvalidSeal"));
        assert!(text.contains("wrong nonce"));
    }

    #[test]
    fn test_tip_key_orders_by_difficulty_first() {
        let weak = TipKey {
            cumulative_difficulty: U256::from(10u64),
            hash: [9u8; 32],
        };
        let strong = TipKey {
            cumulative_difficulty: U256::from(20u64),
            hash: [1u8; 32],
        };
        assert!(weak < strong);
    }

    #[test]
    fn test_tip_key_breaks_ties_by_hash() {
        let a = TipKey {
            cumulative_difficulty: U256::from(10u64),
            hash: [1u8; 32],
        };
        let b = TipKey {
            cumulative_difficulty: U256::from(10u64),
            hash: [2u8; 32],
        };
        assert!(a < b);
    }
}
