//! # Segment Classification
//!
//! Reconstructs chain segments from an untrusted header batch. The on-wire
//! order is never trusted: headers are re-sorted by height and segments are
//! rebuilt from parent linkage alone. At most one penalty is produced per
//! batch, and a penalized batch yields no segments at all.

use crate::domain::{BlockHeader, ChainSegment, HashedHeader, Penalty};
use ember_types::{Hash, U256};
use std::collections::HashSet;

/// Split a peer-supplied batch into contiguous, uniquely-hashed segments.
///
/// Linked neighbours must satisfy the height increment and the difficulty
/// recalculation rule, checked through `calc_difficulty(child_timestamp,
/// parent_timestamp, parent_difficulty, parent_number, parent_hash,
/// parent_uncle_hash)`.
///
/// A batch may legitimately split into several segments (disjoint
/// branches), and a single segment may carry a branch point; the resolver
/// splits such carriers on insertion.
pub fn split_into_segments<F>(
    headers: Vec<BlockHeader>,
    bad_headers: &HashSet<Hash>,
    calc_difficulty: F,
) -> Result<Vec<ChainSegment>, Penalty>
where
    F: Fn(u64, u64, U256, u64, Hash, Hash) -> U256,
{
    if headers.is_empty() {
        return Ok(Vec::new());
    }
    let hashed: Vec<HashedHeader> = headers.into_iter().map(HashedHeader::new).collect();

    let mut seen = HashSet::with_capacity(hashed.len());
    for h in &hashed {
        if !seen.insert(h.hash) {
            return Err(Penalty::DuplicateHeader);
        }
    }
    if hashed.iter().any(|h| bad_headers.contains(&h.hash)) {
        return Err(Penalty::BadBlock);
    }

    // Youngest first; the hash breaks height ties deterministically.
    let mut sorted = hashed;
    sorted.sort_by(|a, b| {
        b.header
            .number
            .cmp(&a.header.number)
            .then_with(|| a.hash.cmp(&b.hash))
    });

    // Segments are built youngest-first and reversed at the end. A header
    // is the parent of every segment whose current oldest element links
    // down to it; several such segments merge into one branch carrier.
    let mut segments: Vec<Vec<HashedHeader>> = Vec::new();
    for hashed in sorted {
        let mut attached = Vec::new();
        for (idx, segment) in segments.iter().enumerate() {
            let child = segment.last().expect("segments are never empty");
            if child.header.parent_hash != hashed.hash {
                continue;
            }
            if child.header.number != hashed.header.number + 1 {
                return Err(Penalty::WrongChildBlockHeight);
            }
            let expected = calc_difficulty(
                child.header.timestamp,
                hashed.header.timestamp,
                hashed.header.difficulty,
                hashed.header.number,
                hashed.hash,
                hashed.header.uncle_hash,
            );
            if child.header.difficulty != expected {
                return Err(Penalty::WrongChildDifficulty);
            }
            attached.push(idx);
        }
        match attached.split_first() {
            None => segments.push(vec![hashed]),
            Some((&keep, rest)) => {
                for &idx in rest.iter().rev() {
                    let part = segments.remove(idx);
                    segments[keep].extend(part);
                }
                segments[keep].push(hashed);
            }
        }
    }

    Ok(segments
        .into_iter()
        .map(|mut headers| {
            headers.reverse();
            ChainSegment::new(headers)
        })
        .collect())
}
