//! # Header Forest
//!
//! The in-memory forest of working subtrees: anchors (unresolved roots)
//! indexed by their missing parent hash, and tips (every known header)
//! indexed by hash. All growth goes through the four resolver verbs —
//! Connect, ExtendDown, ExtendUp, NewAnchor — plus anchor invalidation and
//! the checkpoint/seed insertions.
//!
//! Indices kept in lockstep:
//! - `anchors`: anchor hash → [`Anchor`]
//! - `anchors_by_parent`: missing parent hash → anchor hashes (several
//!   anchors may wait on the same parent)
//! - `tips`: header hash → [`Tip`]
//! - the tip limiter, holding exactly one key per tip
//!
//! Consensus checks (seal, height and difficulty arithmetic, timestamp
//! windows) happen before these mutations are invoked; the forest itself
//! only restructures validated data.

use super::entities::{Anchor, BlockHeader, ChainSegment, HashedHeader, Tip};
use super::limiter::TipLimiter;
use super::value_objects::{ChainRange, TipKey};
use ember_types::{short_hex, Hash, U256};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// How a validated segment attaches to the current forest.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Attachment {
    /// The segment's youngest header is already a tip; nothing to do.
    AlreadyKnown,
    /// The segment bridges an existing tip to an existing anchor.
    Connect {
        /// Tip the segment's oldest new header attaches above.
        tip: Hash,
        /// Index of the first header not yet in the forest.
        new_from: usize,
        /// Anchor slot (missing parent hash) the segment supplies.
        anchor_slot: Hash,
        /// Index of the segment header that is the slot's parent.
        attach_index: usize,
    },
    /// The segment extends an anchor's subtree further back in history.
    ExtendDown {
        /// Anchor slot being resolved.
        anchor_slot: Hash,
        /// Index of the segment header that is the slot's parent, or
        /// `None` when the segment's root merely shares the slot.
        attach_index: Option<usize>,
    },
    /// The segment extends a tip towards higher block heights.
    ExtendUp {
        /// Tip the segment attaches above.
        tip: Hash,
        /// Index of the first header not yet in the forest.
        new_from: usize,
    },
    /// The segment is disconnected from everything known.
    NewAnchor,
}

/// Side effects of a forest mutation the request scheduler must mirror.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ForestDelta {
    /// Anchor slots that need a header request now (created or superseded).
    pub scheduled_slots: Vec<Hash>,
    /// Anchor slots with no remaining anchors; pending requests cancel.
    pub cancelled_slots: Vec<Hash>,
    /// Tips dropped by the limiter during this mutation.
    pub evicted_tips: Vec<Hash>,
}

/// The anchor/tip graph.
#[derive(Debug)]
pub struct HeaderForest {
    anchors: HashMap<Hash, Anchor>,
    anchors_by_parent: HashMap<Hash, Vec<Hash>>,
    tips: HashMap<Hash, Tip>,
    bad_headers: HashSet<Hash>,
    limiter: TipLimiter,
    initiated: bool,
}

impl HeaderForest {
    /// Create an empty forest bounded to `tip_limit` tips.
    pub fn new(tip_limit: usize) -> Self {
        Self {
            anchors: HashMap::new(),
            anchors_by_parent: HashMap::new(),
            tips: HashMap::new(),
            bad_headers: HashSet::new(),
            limiter: TipLimiter::new(tip_limit),
            initiated: false,
        }
    }

    /// Decide which resolver verb applies to a validated linear segment.
    pub fn classify(&self, segment: &ChainSegment) -> Attachment {
        let Some(youngest) = segment.youngest() else {
            return Attachment::AlreadyKnown;
        };
        if self.tips.contains_key(&youngest.hash) {
            // Hash equality pins the whole ancestor run, so the forest
            // already holds every header of this segment.
            return Attachment::AlreadyKnown;
        }
        let n = segment.len() - 1;

        let mut tip_attach = None;
        let mut new_from = 0;
        for j in (0..n).rev() {
            if self.tips.contains_key(&segment.headers[j].hash) {
                tip_attach = Some(segment.headers[j].hash);
                new_from = j + 1;
                break;
            }
        }
        let root_parent = segment.headers[0].header.parent_hash;
        if tip_attach.is_none() && self.tips.contains_key(&root_parent) {
            tip_attach = Some(root_parent);
        }

        let mut anchor_attach = None;
        for i in (new_from..=n).rev() {
            if self.anchors_by_parent.contains_key(&segment.headers[i].hash) {
                anchor_attach = Some(i);
                break;
            }
        }

        match (anchor_attach, tip_attach) {
            (Some(i), Some(tip)) => Attachment::Connect {
                tip,
                new_from,
                anchor_slot: segment.headers[i].hash,
                attach_index: i,
            },
            (Some(i), None) => Attachment::ExtendDown {
                anchor_slot: segment.headers[i].hash,
                attach_index: Some(i),
            },
            (None, Some(tip)) => Attachment::ExtendUp { tip, new_from },
            (None, None) => {
                if self.anchors_by_parent.contains_key(&root_parent) {
                    Attachment::ExtendDown {
                        anchor_slot: root_parent,
                        attach_index: None,
                    }
                } else {
                    Attachment::NewAnchor
                }
            }
        }
    }

    /// Glue the anchors waiting on `anchor_slot` onto the subtree of `tip`,
    /// inserting the segment's new headers in between.
    pub fn connect(
        &mut self,
        segment: &ChainSegment,
        tip: Hash,
        new_from: usize,
        anchor_slot: Hash,
        attach_index: usize,
    ) -> ForestDelta {
        let mut delta = ForestDelta::default();
        let (target_anchor, parent_cum) = {
            let attach = self
                .tips
                .get(&tip)
                .expect("connect attach tip missing from tip index");
            (attach.anchor_hash, attach.cumulative_difficulty)
        };
        let cums = self.append_tips(segment, new_from, target_anchor, parent_cum, &mut delta);
        let base_cum = cums[attach_index - new_from];
        self.absorb_slot(anchor_slot, base_cum, target_anchor, &mut delta);
        let inserted = (segment.len() - new_from) as u64;
        if let Some(anchor) = self.anchors.get_mut(&target_anchor) {
            anchor.pow_depth = anchor.pow_depth.saturating_sub(inserted);
        }
        debug!(
            tip = %short_hex(&tip),
            into = %short_hex(&target_anchor),
            inserted,
            "connected tip to anchor subtree"
        );
        delta
    }

    /// Move the anchors waiting on `anchor_slot` further back in history:
    /// the segment's oldest header becomes the new anchor and the old
    /// subtrees hang above it. With `attach_index` of `None`, the segment's
    /// root merely joins the slot as a sibling anchor.
    pub fn extend_down(
        &mut self,
        segment: &ChainSegment,
        anchor_slot: Hash,
        attach_index: Option<usize>,
        init_pow_depth: u64,
    ) -> ForestDelta {
        let mut delta = ForestDelta::default();
        if attach_index.is_some() && !self.slot_has_absorbable(&anchor_slot) {
            // Checkpoint or initiated subtree: backward extension is a
            // silent no-op.
            debug!(slot = %short_hex(&anchor_slot), "extend-down rejected by protected anchor");
            return delta;
        }

        let root = segment.headers[0].clone();
        self.install_anchor_root(&root, U256::zero(), init_pow_depth, false, &mut delta);
        let mut cums = vec![U256::zero()];
        cums.extend(self.append_tips(segment, 1, root.hash, U256::zero(), &mut delta));
        if let Some(i) = attach_index {
            let base_cum = cums[i];
            self.absorb_slot(anchor_slot, base_cum, root.hash, &mut delta);
        }
        if let Some(anchor) = self.anchors.get_mut(&root.hash) {
            anchor.pow_depth = anchor
                .pow_depth
                .saturating_sub((segment.len() - 1) as u64);
        }
        debug!(
            anchor = %short_hex(&root.hash),
            height = root.header.number,
            "anchor extended down"
        );
        delta
    }

    /// Append the segment's new headers above `tip`.
    pub fn extend_up(&mut self, segment: &ChainSegment, tip: Hash, new_from: usize) -> ForestDelta {
        let mut delta = ForestDelta::default();
        let (anchor_hash, parent_cum) = {
            let attach = self
                .tips
                .get(&tip)
                .expect("extend-up attach tip missing from tip index");
            (attach.anchor_hash, attach.cumulative_difficulty)
        };
        self.append_tips(segment, new_from, anchor_hash, parent_cum, &mut delta);
        let inserted = (segment.len() - new_from) as u64;
        if let Some(anchor) = self.anchors.get_mut(&anchor_hash) {
            anchor.pow_depth = anchor.pow_depth.saturating_sub(inserted);
        }
        debug!(tip = %short_hex(&tip), inserted, "tip extended up");
        delta
    }

    /// Introduce a disconnected segment: its oldest header becomes an
    /// anchor with unknown total difficulty, its headers become tips.
    pub fn new_anchor(&mut self, segment: &ChainSegment, init_pow_depth: u64) -> ForestDelta {
        let mut delta = ForestDelta::default();
        let root = segment.headers[0].clone();
        self.install_anchor_root(&root, U256::zero(), init_pow_depth, false, &mut delta);
        self.append_tips(segment, 1, root.hash, U256::zero(), &mut delta);
        if let Some(anchor) = self.anchors.get_mut(&root.hash) {
            anchor.pow_depth = anchor
                .pow_depth
                .saturating_sub((segment.len() - 1) as u64);
        }
        debug!(
            anchor = %short_hex(&root.hash),
            height = root.header.number,
            tips = segment.len(),
            "new anchor installed"
        );
        delta
    }

    /// Remove contradicted anchors and purge their subtrees. The peers that
    /// fed the purged subtrees are not penalized retroactively.
    pub fn invalidate_anchors(&mut self, anchor_slot: Hash, invalid: &[Hash]) -> ForestDelta {
        let mut delta = ForestDelta::default();
        for anchor_hash in invalid {
            let Some(anchor) = self.anchors.remove(anchor_hash) else {
                continue;
            };
            debug!(
                anchor = %short_hex(anchor_hash),
                height = anchor.block_height,
                "invalidating contradicted anchor"
            );
            for tip_hash in &anchor.tip_hashes {
                if let Some(tip) = self.tips.remove(tip_hash) {
                    self.limiter.remove(tip.cumulative_difficulty, *tip_hash);
                }
            }
        }
        if let Some(list) = self.anchors_by_parent.get_mut(&anchor_slot) {
            list.retain(|h| !invalid.contains(h));
            if list.is_empty() {
                self.anchors_by_parent.remove(&anchor_slot);
                delta.cancelled_slots.push(anchor_slot);
            }
        }
        delta
    }

    /// Seed a single header as its own anchor and tip with a known
    /// accumulated difficulty.
    pub fn add_header_as_tip(&mut self, header: &HashedHeader, total_difficulty: U256) {
        let mut delta = ForestDelta::default();
        self.install_anchor_root(header, total_difficulty, 0, false, &mut delta);
        debug!(
            tip = %short_hex(&header.hash),
            height = header.header.number,
            "header seeded as tip"
        );
    }

    /// Insert a hard-coded checkpoint header: an anchor and tip with a
    /// baked-in total difficulty that must never be extended backwards.
    pub fn add_hard_coded_anchor(&mut self, header: &HashedHeader, total_difficulty: U256) {
        let mut delta = ForestDelta::default();
        self.install_anchor_root(header, total_difficulty, 0, true, &mut delta);
        debug!(
            anchor = %short_hex(&header.hash),
            height = header.header.number,
            "hard-coded checkpoint anchor installed"
        );
    }

    /// Record a hash whose header (and descendants) must never enter the
    /// forest again.
    pub fn add_bad_header(&mut self, hash: Hash) {
        self.bad_headers.insert(hash);
    }

    /// The bad-header set, consulted by the segment classifier.
    pub fn bad_headers(&self) -> &HashSet<Hash> {
        &self.bad_headers
    }

    /// Whether the anchors waiting on `slot` may be moved further back.
    /// False when every one of them is a hard-coded checkpoint or an
    /// initiated subtree.
    pub fn can_extend_down(&self, slot: &Hash) -> bool {
        self.slot_has_absorbable(slot)
    }

    /// Detect whether some anchor now rests on one of the hard-coded roots
    /// with a gap-free chain to its best tip. Emits the chain once and
    /// freezes the subtree against further downward extension.
    pub fn try_initiate(&mut self, roots: &HashSet<Hash>) -> Option<ChainRange> {
        if self.initiated {
            return None;
        }
        let (anchor_hash, headers) = self.find_initiated_chain(roots)?;
        let anchor = self
            .anchors
            .get_mut(&anchor_hash)
            .expect("initiated anchor missing from anchor index");
        anchor.frozen = true;
        self.initiated = true;
        debug!(anchor = %short_hex(&anchor_hash), "subtree frozen after initiation");
        let from_height = headers.first().map(|h| h.number).unwrap_or_default();
        let to_height = headers.last().map(|h| h.number).unwrap_or_default();
        Some(ChainRange {
            headers,
            from_height,
            to_height,
        })
    }

    /// Whether the forest has already linearized down to a hard-coded root.
    pub fn initiated(&self) -> bool {
        self.initiated
    }

    /// Whether `hash` is a known tip.
    pub fn has_tip(&self, hash: &Hash) -> bool {
        self.tips.contains_key(hash)
    }

    /// Look up a tip.
    pub fn tip(&self, hash: &Hash) -> Option<&Tip> {
        self.tips.get(hash)
    }

    /// Look up an anchor by its own hash.
    pub fn anchor(&self, hash: &Hash) -> Option<&Anchor> {
        self.anchors.get(hash)
    }

    /// Anchor hashes waiting on a missing parent.
    pub fn anchors_waiting_on(&self, parent_hash: &Hash) -> &[Hash] {
        self.anchors_by_parent
            .get(parent_hash)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Number of tips.
    pub fn tip_count(&self) -> usize {
        self.tips.len()
    }

    /// Number of anchors.
    pub fn anchor_count(&self) -> usize {
        self.anchors.len()
    }

    /// Iterate all tips.
    pub fn tips(&self) -> impl Iterator<Item = (&Hash, &Tip)> {
        self.tips.iter()
    }

    /// Iterate all anchors.
    pub fn anchors(&self) -> impl Iterator<Item = (&Hash, &Anchor)> {
        self.anchors.iter()
    }

    /// The tip limiter, exposed for invariant audits.
    pub fn limiter(&self) -> &TipLimiter {
        &self.limiter
    }

    /// One-line summary for logs.
    pub fn anchor_state(&self) -> String {
        format!(
            "anchors={} slots={} tips={} initiated={}",
            self.anchors.len(),
            self.anchors_by_parent.len(),
            self.tips.len(),
            self.initiated
        )
    }

    // ------------------------------------------------------------------
    // internals
    // ------------------------------------------------------------------

    fn find_initiated_chain(&self, roots: &HashSet<Hash>) -> Option<(Hash, Vec<BlockHeader>)> {
        for (anchor_hash, anchor) in &self.anchors {
            // A subtree is root-resolved when its anchor sits directly on a
            // hard-coded root hash, or when the anchor itself is a
            // hard-coded checkpoint that has grown a descendant.
            let hard_coded = self
                .tips
                .get(anchor_hash)
                .map(|t| t.no_prepend)
                .unwrap_or(false);
            let rooted = roots.contains(&anchor.parent_hash)
                || (hard_coded && anchor.tip_hashes.len() > 1);
            if !rooted || anchor.frozen {
                continue;
            }
            let Some(best_tip) = anchor
                .tip_hashes
                .iter()
                .filter_map(|h| self.tips.get(h).map(|t| (t.cumulative_difficulty, *h)))
                .max()
                .map(|(_, h)| h)
            else {
                continue;
            };
            let mut headers = Vec::new();
            let mut cursor = best_tip;
            let complete = loop {
                let Some(tip) = self.tips.get(&cursor) else {
                    break false; // punctured by eviction
                };
                headers.push(tip.header.clone());
                if cursor == *anchor_hash {
                    break true;
                }
                cursor = tip.header.parent_hash;
            };
            if !complete {
                continue;
            }
            headers.reverse();
            let contiguous = headers
                .windows(2)
                .all(|pair| pair[1].number == pair[0].number + 1);
            if !contiguous {
                panic!("initiated chain has a height gap under anchor {}", short_hex(anchor_hash));
            }
            return Some((*anchor_hash, headers));
        }
        None
    }

    fn slot_has_absorbable(&self, slot: &Hash) -> bool {
        self.anchors_by_parent
            .get(slot)
            .map(|list| list.iter().any(|hash| !self.anchor_protected(hash)))
            .unwrap_or(false)
    }

    fn anchor_protected(&self, anchor_hash: &Hash) -> bool {
        let frozen = self
            .anchors
            .get(anchor_hash)
            .map(|a| a.frozen)
            .unwrap_or(true);
        let no_prepend = self
            .tips
            .get(anchor_hash)
            .map(|t| t.no_prepend)
            .unwrap_or(false);
        frozen || no_prepend
    }

    fn install_anchor_root(
        &mut self,
        root: &HashedHeader,
        total_difficulty: U256,
        pow_depth: u64,
        no_prepend: bool,
        delta: &mut ForestDelta,
    ) {
        let anchor = Anchor {
            parent_hash: root.header.parent_hash,
            hash: root.hash,
            block_height: root.header.number,
            timestamp: root.header.timestamp,
            difficulty: root.header.difficulty,
            total_difficulty,
            pow_depth,
            tip_hashes: HashSet::new(),
            frozen: false,
        };
        self.anchors.insert(root.hash, anchor);
        self.anchors_by_parent
            .entry(root.header.parent_hash)
            .or_default()
            .push(root.hash);
        if !no_prepend {
            delta.scheduled_slots.push(root.header.parent_hash);
        }
        self.insert_tip(root, root.hash, total_difficulty, no_prepend, delta);
    }

    /// Insert segment headers from `from` as tips under `anchor_hash`,
    /// chaining cumulative difficulty upward from `parent_cum`. Returns the
    /// cumulative difficulty of each inserted header, in segment order.
    fn append_tips(
        &mut self,
        segment: &ChainSegment,
        from: usize,
        anchor_hash: Hash,
        mut parent_cum: U256,
        delta: &mut ForestDelta,
    ) -> Vec<U256> {
        let mut cums = Vec::with_capacity(segment.len() - from);
        for hashed in &segment.headers[from..] {
            let cum = parent_cum + hashed.header.difficulty;
            self.insert_tip(hashed, anchor_hash, cum, false, delta);
            cums.push(cum);
            parent_cum = cum;
        }
        cums
    }

    fn insert_tip(
        &mut self,
        hashed: &HashedHeader,
        anchor_hash: Hash,
        cumulative_difficulty: U256,
        no_prepend: bool,
        delta: &mut ForestDelta,
    ) {
        if let Some(stale) = self.tips.remove(&hashed.hash) {
            // Absorption overwrite: drop the stale entry everywhere first.
            self.limiter.remove(stale.cumulative_difficulty, hashed.hash);
            if let Some(anchor) = self.anchors.get_mut(&stale.anchor_hash) {
                anchor.tip_hashes.remove(&hashed.hash);
            }
        }
        self.tips.insert(
            hashed.hash,
            Tip {
                anchor_hash,
                cumulative_difficulty,
                no_prepend,
                header: hashed.header.clone(),
            },
        );
        if let Some(anchor) = self.anchors.get_mut(&anchor_hash) {
            anchor.tip_hashes.insert(hashed.hash);
        }
        if let Some(evicted) = self.limiter.insert(TipKey {
            cumulative_difficulty,
            hash: hashed.hash,
        }) {
            self.drop_evicted_tip(evicted.hash, delta);
        }
    }

    fn drop_evicted_tip(&mut self, hash: Hash, delta: &mut ForestDelta) {
        let Some(tip) = self.tips.remove(&hash) else {
            return;
        };
        debug!(tip = %short_hex(&hash), "tip evicted by limiter");
        delta.evicted_tips.push(hash);
        let anchor_hash = tip.anchor_hash;
        let orphaned = match self.anchors.get_mut(&anchor_hash) {
            Some(anchor) => {
                anchor.tip_hashes.remove(&hash);
                anchor.tip_hashes.is_empty()
            }
            None => false,
        };
        if orphaned {
            // No tip remains: nothing will extend this anchor, so no
            // request for its parent should stay pending either.
            if let Some(slot) = self.remove_anchor(anchor_hash) {
                delta.cancelled_slots.push(slot);
            }
        }
    }

    fn remove_anchor(&mut self, anchor_hash: Hash) -> Option<Hash> {
        let anchor = self.anchors.remove(&anchor_hash)?;
        let slot = anchor.parent_hash;
        if let Some(list) = self.anchors_by_parent.get_mut(&slot) {
            list.retain(|h| *h != anchor_hash);
            if list.is_empty() {
                self.anchors_by_parent.remove(&slot);
                return Some(slot);
            }
        }
        None
    }

    /// Re-root every absorbable anchor waiting on `slot` under
    /// `target_anchor`, reconciling cumulative difficulties against
    /// `base_cum` (the accumulated difficulty at the slot's parent header).
    fn absorb_slot(
        &mut self,
        slot: Hash,
        base_cum: U256,
        target_anchor: Hash,
        delta: &mut ForestDelta,
    ) {
        let Some(anchor_hashes) = self.anchors_by_parent.get(&slot).cloned() else {
            return;
        };
        let mut kept = Vec::new();
        for anchor_hash in anchor_hashes {
            if self.anchor_protected(&anchor_hash) {
                kept.push(anchor_hash);
                continue;
            }
            let Some(absorbed) = self.anchors.remove(&anchor_hash) else {
                continue;
            };
            let new_total = base_cum + absorbed.difficulty;
            for tip_hash in &absorbed.tip_hashes {
                let Some(tip) = self.tips.get(tip_hash) else {
                    continue; // evicted mid-absorption
                };
                let path = tip
                    .cumulative_difficulty
                    .checked_sub(absorbed.total_difficulty)
                    .expect("tip cumulative difficulty below its anchor total");
                let new_cum = new_total + path;
                let old_cum = tip.cumulative_difficulty;
                self.limiter.remove(old_cum, *tip_hash);
                {
                    let tip = self
                        .tips
                        .get_mut(tip_hash)
                        .expect("tip disappeared during absorption");
                    tip.cumulative_difficulty = new_cum;
                    tip.anchor_hash = target_anchor;
                }
                if let Some(anchor) = self.anchors.get_mut(&target_anchor) {
                    anchor.tip_hashes.insert(*tip_hash);
                }
                if let Some(evicted) = self.limiter.insert(TipKey {
                    cumulative_difficulty: new_cum,
                    hash: *tip_hash,
                }) {
                    self.drop_evicted_tip(evicted.hash, delta);
                }
            }
            debug!(
                absorbed = %short_hex(&anchor_hash),
                into = %short_hex(&target_anchor),
                "anchor absorbed"
            );
        }
        if kept.is_empty() {
            self.anchors_by_parent.remove(&slot);
            delta.cancelled_slots.push(slot);
        } else {
            self.anchors_by_parent.insert(slot, kept);
        }
    }
}
