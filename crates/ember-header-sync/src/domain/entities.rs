//! # Domain Entities
//!
//! Core entities of the header forest: the consensus header as the engine
//! sees it, anchors (unresolved roots), tips (extensible headers), and the
//! chain segments produced by the classifier.

use ember_types::{Hash, U256, ZERO_HASH};
use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use sha3::{Digest, Keccak256};
use std::collections::HashSet;

/// Size of the consensus fields the engine carries without interpreting
/// (state roots, gas accounting, and similar).
pub const OPAQUE_LEN: usize = 160;

/// Block header, reduced to the fields the engine validates plus an opaque
/// region carried end-to-end.
#[serde_as]
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockHeader {
    /// Hash of the parent block.
    pub parent_hash: Hash,
    /// Hash of the uncle list, an input to difficulty recalculation.
    pub uncle_hash: Hash,
    /// Block height.
    pub number: u64,
    /// Unix timestamp.
    pub timestamp: u64,
    /// Proof-of-work nonce.
    pub nonce: u64,
    /// Block difficulty.
    pub difficulty: U256,
    /// Arbitrary extra data, bounded by the record codec.
    pub extra: Vec<u8>,
    /// Consensus fields the engine does not interpret.
    #[serde_as(as = "serde_with::Bytes")]
    pub opaque: [u8; OPAQUE_LEN],
}

impl Default for BlockHeader {
    fn default() -> Self {
        Self {
            parent_hash: ZERO_HASH,
            uncle_hash: ZERO_HASH,
            number: 0,
            timestamp: 0,
            nonce: 0,
            difficulty: U256::zero(),
            extra: Vec::new(),
            opaque: [0u8; OPAQUE_LEN],
        }
    }
}

impl BlockHeader {
    /// Derived header hash: Keccak-256 over the canonical field encoding.
    pub fn hash(&self) -> Hash {
        let mut hasher = Keccak256::new();
        hasher.update(self.parent_hash);
        hasher.update(self.uncle_hash);
        hasher.update(self.number.to_le_bytes());
        hasher.update(self.timestamp.to_le_bytes());
        hasher.update(self.nonce.to_le_bytes());
        let mut difficulty = [0u8; 32];
        self.difficulty.to_big_endian(&mut difficulty);
        hasher.update(difficulty);
        hasher.update(self.opaque);
        hasher.update(&self.extra);
        hasher.finalize().into()
    }
}

/// A header paired with its hash, computed once at ingestion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HashedHeader {
    /// Derived hash of `header`.
    pub hash: Hash,
    /// The header itself.
    pub header: BlockHeader,
}

impl HashedHeader {
    /// Hash a header.
    pub fn new(header: BlockHeader) -> Self {
        Self {
            hash: header.hash(),
            header,
        }
    }
}

/// The oldest header of a working subtree whose parent is not yet known.
#[derive(Clone, Debug)]
pub struct Anchor {
    /// Hash of the missing parent; the key the forest indexes anchors by.
    pub parent_hash: Hash,
    /// Hash of the anchor header itself.
    pub hash: Hash,
    /// Block height of the anchor header.
    pub block_height: u64,
    /// Timestamp of the anchor header.
    pub timestamp: u64,
    /// Difficulty of the anchor header.
    pub difficulty: U256,
    /// Accumulated difficulty from the chain root up to and including the
    /// anchor. Zero while the chain root is unknown.
    pub total_difficulty: U256,
    /// Descendants still to be seal-verified before the subtree is treated
    /// as trust-equivalent to a genesis-rooted chain.
    pub pow_depth: u64,
    /// Hashes of every tip reachable from this anchor.
    pub tip_hashes: HashSet<Hash>,
    /// Set once the subtree has been linearized down to genesis or a
    /// checkpoint; rejects further downward extension.
    pub frozen: bool,
}

/// An extensible header on one branch of an anchor's subtree.
///
/// Every header in the forest keeps a tip entry, so a later segment may
/// branch off an interior header as well as the youngest one.
#[derive(Clone, Debug)]
pub struct Tip {
    /// Hash of the anchor this tip descends from.
    pub anchor_hash: Hash,
    /// Anchor total difficulty plus the difficulty sum of the path from the
    /// anchor's child down to this tip.
    pub cumulative_difficulty: U256,
    /// Hard-coded checkpoint marker: the subtree below this tip must not be
    /// extended backwards.
    pub no_prepend: bool,
    /// The tip's header.
    pub header: BlockHeader,
}

impl Tip {
    /// Block height of the tip header.
    pub fn block_height(&self) -> u64 {
        self.header.number
    }

    /// Timestamp of the tip header.
    pub fn timestamp(&self) -> u64 {
        self.header.timestamp
    }

    /// Difficulty of the tip header.
    pub fn difficulty(&self) -> U256 {
        self.header.difficulty
    }

    /// Uncle hash of the tip header.
    pub fn uncle_hash(&self) -> Hash {
        self.header.uncle_hash
    }
}

/// A contiguous run of headers linked by `parent_hash`, oldest first.
///
/// The classifier may emit a segment whose headers branch (two children of
/// one parent); `linear_pieces` splits such a carrier into strict chains
/// before resolution.
#[derive(Clone, Debug, Default)]
pub struct ChainSegment {
    /// Segment headers, element 0 oldest.
    pub headers: Vec<HashedHeader>,
}

impl ChainSegment {
    /// Wrap a list of hashed headers.
    pub fn new(headers: Vec<HashedHeader>) -> Self {
        Self { headers }
    }

    /// Number of headers in the segment.
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    /// True when the segment holds no headers.
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// The oldest header, if any.
    pub fn oldest(&self) -> Option<&HashedHeader> {
        self.headers.first()
    }

    /// The youngest header, if any.
    pub fn youngest(&self) -> Option<&HashedHeader> {
        self.headers.last()
    }

    /// Split into maximal strict parent chains.
    ///
    /// Walking oldest to youngest, a header continues the current piece iff
    /// its parent hash equals the previous header's hash; otherwise it is
    /// appended to the piece ending in its parent, or starts a new piece.
    pub fn linear_pieces(self) -> Vec<ChainSegment> {
        let mut pieces: Vec<Vec<HashedHeader>> = Vec::new();
        for hashed in self.headers {
            let attach = pieces
                .iter_mut()
                .find(|piece| piece.last().map(|p| p.hash) == Some(hashed.header.parent_hash));
            match attach {
                Some(piece) => piece.push(hashed),
                None => pieces.push(vec![hashed]),
            }
        }
        pieces.into_iter().map(ChainSegment::new).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(number: u64, parent_hash: Hash, difficulty: u64) -> BlockHeader {
        BlockHeader {
            parent_hash,
            number,
            difficulty: U256::from(difficulty),
            ..Default::default()
        }
    }

    #[test]
    fn test_hash_changes_with_extra() {
        let mut a = BlockHeader::default();
        let mut b = BlockHeader::default();
        assert_eq!(a.hash(), b.hash());
        a.extra = b"one".to_vec();
        b.extra = b"two".to_vec();
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn test_hash_changes_with_nonce() {
        let a = BlockHeader::default();
        let b = BlockHeader {
            nonce: 1,
            ..Default::default()
        };
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn test_hashed_header_matches_header_hash() {
        let h = header(5, ZERO_HASH, 10);
        let hashed = HashedHeader::new(h.clone());
        assert_eq!(hashed.hash, h.hash());
    }

    #[test]
    fn test_linear_pieces_straight_chain() {
        let h1 = header(1, ZERO_HASH, 10);
        let h2 = header(2, h1.hash(), 1010);
        let seg = ChainSegment::new(vec![HashedHeader::new(h1), HashedHeader::new(h2)]);
        let pieces = seg.linear_pieces();
        assert_eq!(pieces.len(), 1);
        assert_eq!(pieces[0].len(), 2);
    }

    #[test]
    fn test_linear_pieces_split_branches() {
        let h1 = header(1, ZERO_HASH, 10);
        let h2 = header(2, h1.hash(), 1010);
        let h3 = BlockHeader {
            extra: b"different".to_vec(),
            ..header(2, h1.hash(), 1010)
        };
        // Branchy carrier: h2 and h3 are both children of h1.
        let seg = ChainSegment::new(vec![
            HashedHeader::new(h1.clone()),
            HashedHeader::new(h2),
            HashedHeader::new(h3),
        ]);
        let pieces = seg.linear_pieces();
        assert_eq!(pieces.len(), 2);
        assert_eq!(pieces[0].len(), 2);
        assert_eq!(pieces[0].oldest().unwrap().hash, h1.hash());
        assert_eq!(pieces[1].len(), 1);
    }

    #[test]
    fn test_segment_endpoints() {
        let h1 = header(1, ZERO_HASH, 10);
        let h2 = header(2, h1.hash(), 1010);
        let seg = ChainSegment::new(vec![
            HashedHeader::new(h1.clone()),
            HashedHeader::new(h2.clone()),
        ]);
        assert_eq!(seg.oldest().unwrap().hash, h1.hash());
        assert_eq!(seg.youngest().unwrap().hash, h2.hash());
        assert!(!seg.is_empty());
    }
}
