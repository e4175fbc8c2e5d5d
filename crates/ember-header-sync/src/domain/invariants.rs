//! # Domain Invariants
//!
//! Structural rules the forest must uphold after every mutation. Violation
//! of any of these is an engine bug, not a runtime condition; callers
//! treat a reported violation as fatal.

use super::forest::HeaderForest;
use ember_types::short_hex;

/// A broken structural rule, with enough context to locate it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InvariantViolation {
    /// A tip references an anchor that is not in the anchor index.
    DanglingAnchorRef {
        /// The offending tip hash, hex-abbreviated.
        tip: String,
    },
    /// An anchor lists a tip hash with no tip entry, or a tip points at an
    /// anchor that does not list it.
    TipSetMismatch {
        /// The offending anchor hash, hex-abbreviated.
        anchor: String,
    },
    /// The limiter key set differs from the tip index.
    LimiterDesync {
        /// Limiter entry count.
        limiter: usize,
        /// Tip index entry count.
        tips: usize,
    },
    /// An anchor with unknown total difficulty has no remaining PoW depth.
    UnrootedWithoutPowDepth {
        /// The offending anchor hash, hex-abbreviated.
        anchor: String,
    },
}

impl std::fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DanglingAnchorRef { tip } => {
                write!(f, "tip {tip} references a missing anchor")
            }
            Self::TipSetMismatch { anchor } => {
                write!(f, "anchor {anchor} tip set out of sync with tip index")
            }
            Self::LimiterDesync { limiter, tips } => {
                write!(f, "limiter holds {limiter} keys for {tips} tips")
            }
            Self::UnrootedWithoutPowDepth { anchor } => {
                write!(f, "unrooted anchor {anchor} has zero PoW depth")
            }
        }
    }
}

/// Every tip's anchor reference resolves, and the anchor lists the tip.
pub fn check_tip_anchor_links(forest: &HeaderForest) -> Result<(), InvariantViolation> {
    for (tip_hash, tip) in forest.tips() {
        let Some(anchor) = forest.anchor(&tip.anchor_hash) else {
            return Err(InvariantViolation::DanglingAnchorRef {
                tip: short_hex(tip_hash),
            });
        };
        if !anchor.tip_hashes.contains(tip_hash) {
            return Err(InvariantViolation::TipSetMismatch {
                anchor: short_hex(&tip.anchor_hash),
            });
        }
    }
    Ok(())
}

/// Every hash an anchor lists has a tip entry pointing back at it.
pub fn check_anchor_tip_sets(forest: &HeaderForest) -> Result<(), InvariantViolation> {
    for (anchor_hash, anchor) in forest.anchors() {
        for tip_hash in &anchor.tip_hashes {
            match forest.tip(tip_hash) {
                Some(tip) if tip.anchor_hash == *anchor_hash => {}
                _ => {
                    return Err(InvariantViolation::TipSetMismatch {
                        anchor: short_hex(anchor_hash),
                    })
                }
            }
        }
    }
    Ok(())
}

/// The limiter contains exactly one key per tip, with matching weights.
pub fn check_limiter_sync(forest: &HeaderForest) -> Result<(), InvariantViolation> {
    if forest.limiter().len() != forest.tip_count() {
        return Err(InvariantViolation::LimiterDesync {
            limiter: forest.limiter().len(),
            tips: forest.tip_count(),
        });
    }
    for key in forest.limiter().iter() {
        match forest.tip(&key.hash) {
            Some(tip) if tip.cumulative_difficulty == key.cumulative_difficulty => {}
            _ => {
                return Err(InvariantViolation::LimiterDesync {
                    limiter: forest.limiter().len(),
                    tips: forest.tip_count(),
                })
            }
        }
    }
    Ok(())
}

/// An anchor carrying no consensus weight must still owe seal
/// verifications.
pub fn check_pow_depth(forest: &HeaderForest) -> Result<(), InvariantViolation> {
    for (anchor_hash, anchor) in forest.anchors() {
        if anchor.total_difficulty.is_zero() && anchor.pow_depth == 0 {
            return Err(InvariantViolation::UnrootedWithoutPowDepth {
                anchor: short_hex(anchor_hash),
            });
        }
    }
    Ok(())
}

/// Run every structural audit.
pub fn check_all(forest: &HeaderForest) -> Result<(), InvariantViolation> {
    check_tip_anchor_links(forest)?;
    check_anchor_tip_sets(forest)?;
    check_limiter_sync(forest)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{BlockHeader, ChainSegment, HashedHeader};
    use ember_types::{U256, ZERO_HASH};

    fn header(number: u64, parent_hash: ember_types::Hash, difficulty: u64) -> HashedHeader {
        HashedHeader::new(BlockHeader {
            parent_hash,
            number,
            difficulty: U256::from(difficulty),
            ..Default::default()
        })
    }

    #[test]
    fn test_fresh_forest_is_consistent() {
        let forest = HeaderForest::new(10);
        assert!(check_all(&forest).is_ok());
    }

    #[test]
    fn test_grown_forest_is_consistent() {
        let mut forest = HeaderForest::new(10);
        let h1 = header(1, ZERO_HASH, 10);
        forest.add_header_as_tip(&h1, U256::from(2000u64));
        let h2 = header(2, h1.hash, 1010);
        let h3 = header(3, h2.hash, 2010);
        forest.extend_up(
            &ChainSegment::new(vec![h2.clone(), h3.clone()]),
            h1.hash,
            0,
        );

        let h9 = header(9, [9u8; 32], 90);
        forest.new_anchor(&ChainSegment::new(vec![h9]), 16);

        assert!(check_all(&forest).is_ok());
        assert!(check_pow_depth(&forest).is_ok());
    }

    #[test]
    fn test_consistent_after_eviction() {
        let mut forest = HeaderForest::new(2);
        let h1 = header(1, ZERO_HASH, 10);
        forest.add_header_as_tip(&h1, U256::from(2000u64));
        let h2 = header(2, h1.hash, 1010);
        let h3 = header(3, h2.hash, 2010);
        // Three tips against a capacity of two forces an eviction.
        forest.extend_up(&ChainSegment::new(vec![h2.clone(), h3]), h1.hash, 0);
        assert!(check_all(&forest).is_ok());
    }

    #[test]
    fn test_violation_display() {
        let violation = InvariantViolation::LimiterDesync { limiter: 3, tips: 4 };
        assert!(violation.to_string().contains("3 keys for 4 tips"));
    }
}
