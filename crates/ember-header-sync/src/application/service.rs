//! # Header Sync Service
//!
//! Application service orchestrating the engine: classifies incoming
//! batches, validates them against the consensus ports, applies the
//! resolver verbs to the forest, mirrors graph changes into the request
//! scheduler, persists accepted headers through the recovery buffer, and
//! watches for initiation.
//!
//! The service is driven either directly through [`HeaderSyncApi`] or by
//! the cooperative [`run`](HeaderSyncService::run) loop, which owns the
//! whole engine state; no locking is involved.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::adapters::checkpoints::load_checkpoint_file;
use crate::adapters::recovery::RecoveryBuffer;
use crate::algorithms::split_into_segments;
use crate::config::SyncConfig;
use crate::domain::{
    Attachment, BlockAnnouncement, BlockHeader, ChainSegment, ForestDelta, HashedHeader,
    HeaderForest, HeaderRequest, PeerPenalty, Penalty, RequestScheduler, SyncError, SyncStatus,
};
use crate::events::SyncMessage;
use crate::ports::inbound::HeaderSyncApi;
use crate::ports::outbound::{ChainEventSink, Clock, ConsensusRules, HeaderRequestSink, PenaltySink};
use ember_types::{short_hex, Hash, PeerId, U256};

/// The header synchronization engine.
pub struct HeaderSyncService<R, C, Q, P, E>
where
    R: ConsensusRules,
    C: Clock,
    Q: HeaderRequestSink,
    P: PenaltySink,
    E: ChainEventSink,
{
    config: SyncConfig,
    rules: R,
    clock: C,
    request_sink: Q,
    penalty_sink: P,
    chain_sink: E,
    forest: HeaderForest,
    scheduler: RequestScheduler,
    recovery: RecoveryBuffer,
    initiation_roots: HashSet<Hash>,
    recovering: bool,
}

impl<R, C, Q, P, E> HeaderSyncService<R, C, Q, P, E>
where
    R: ConsensusRules,
    C: Clock,
    Q: HeaderRequestSink,
    P: PenaltySink,
    E: ChainEventSink,
{
    /// Create an engine around its external collaborators.
    pub fn new(
        config: SyncConfig,
        rules: R,
        clock: C,
        request_sink: Q,
        penalty_sink: P,
        chain_sink: E,
    ) -> Self {
        let forest = HeaderForest::new(config.tip_limit);
        let scheduler = RequestScheduler::new(config.retry_interval_secs);
        let recovery = RecoveryBuffer::new(config.recovery_dir.clone(), config.buffer_limit);
        let initiation_roots = [config.genesis_hash].into_iter().collect();
        Self {
            config,
            rules,
            clock,
            request_sink,
            penalty_sink,
            chain_sink,
            forest,
            scheduler,
            recovery,
            initiation_roots,
            recovering: false,
        }
    }

    /// Replay the recovery directory, falling back to the hard-coded
    /// checkpoint file when nothing was recovered. Returns whether any
    /// header was replayed.
    pub fn bootstrap(&mut self, checkpoint_path: Option<&Path>) -> Result<bool, SyncError> {
        let recovered = self.recover_from_files()?;
        if !recovered {
            if let Some(path) = checkpoint_path {
                self.load_hard_coded_checkpoints(path)?;
            }
        }
        info!(state = %self.forest.anchor_state(), "engine bootstrapped");
        Ok(recovered)
    }

    /// Seed a header with a known accumulated difficulty. This is how a
    /// locally trusted header (typically genesis) enters a fresh engine.
    pub fn seed_header_as_tip(&mut self, header: BlockHeader, total_difficulty: U256) {
        let hashed = HashedHeader::new(header);
        self.forest.add_header_as_tip(&hashed, total_difficulty);
    }

    /// Record a hash that must never enter the forest again.
    pub fn add_bad_header(&mut self, hash: Hash) {
        self.forest.add_bad_header(hash);
    }

    /// One-line state summary for logs.
    pub fn anchor_state(&self) -> String {
        self.forest.anchor_state()
    }

    /// Drive the engine until the message channel closes or shutdown is
    /// signalled. Each message is processed to completion; the scheduler
    /// tick emits pending header requests at the retry cadence. The
    /// in-memory recovery buffer is flushed on the way out.
    pub async fn run(
        mut self,
        mut messages: mpsc::Receiver<SyncMessage>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker =
            tokio::time::interval(Duration::from_secs(self.config.retry_interval_secs.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(state = %self.forest.anchor_state(), "header sync loop started");
        loop {
            tokio::select! {
                message = messages.recv() => match message {
                    Some(message) => self.dispatch(message),
                    None => {
                        info!("message channel closed, shutting down");
                        break;
                    }
                },
                _ = ticker.tick() => {
                    let now = self.clock.unix_now();
                    self.poll_requests(now);
                }
                _ = shutdown.changed() => {
                    info!("shutdown signal received");
                    break;
                }
            }
        }
        let now = self.clock.unix_now();
        self.flush_buffer(now);
    }

    fn dispatch(&mut self, message: SyncMessage) {
        match message {
            SyncMessage::NewBlock { header, peer } => self.handle_new_block(header, peer),
            SyncMessage::NewBlockHashes {
                announcements,
                peer,
            } => self.handle_new_block_hashes(announcements, peer),
            SyncMessage::BlockHeaders { headers, peer } => self.handle_headers(headers, peer),
        }
    }

    // ------------------------------------------------------------------
    // segment processing
    // ------------------------------------------------------------------

    fn process_segment(&mut self, segment: ChainSegment, peer: PeerId) {
        if segment.is_empty() {
            return;
        }
        let now = self.clock.unix_now();

        let mut attachment = self.forest.classify(&segment);
        if let Some((slot, attach_index)) = anchor_attach_point(&attachment) {
            let invalid = self.contradicted_anchors(&segment, slot, attach_index);
            if !invalid.is_empty() {
                warn!(
                    slot = %short_hex(&slot),
                    count = invalid.len(),
                    "invalidating anchors contradicted by incoming segment"
                );
                let delta = self.forest.invalidate_anchors(slot, &invalid);
                self.apply_delta(delta, now);
                attachment = self.forest.classify(&segment);
            }
        }

        let new_from = match attachment {
            Attachment::AlreadyKnown => {
                debug!(peer = %peer, "segment already known");
                return;
            }
            Attachment::Connect { new_from, .. } | Attachment::ExtendUp { new_from, .. } => {
                new_from
            }
            Attachment::ExtendDown { .. } | Attachment::NewAnchor => 0,
        };

        if let Attachment::Connect { tip, .. } | Attachment::ExtendUp { tip, .. } = attachment {
            if new_from == 0 {
                let child = segment.oldest().expect("segment checked non-empty");
                if let Err((penalty, details)) = self.check_attach_link(tip, child) {
                    self.penalize(peer, penalty, Some(details));
                    return;
                }
            }
        }

        for hashed in &segment.headers[new_from..] {
            if let Err(err) = self.rules.verify_seal(&hashed.header) {
                self.penalize(peer, Penalty::InvalidSeal, Some(err.to_string()));
                return;
            }
        }

        if let Attachment::ExtendDown {
            anchor_slot,
            attach_index: Some(_),
        } = attachment
        {
            if !self.forest.can_extend_down(&anchor_slot) {
                // Hard-coded or initiated subtree: silently refuse to grow
                // backwards, and keep the segment out of the buffer.
                debug!(slot = %short_hex(&anchor_slot), "backward extension rejected");
                return;
            }
        }

        if matches!(attachment, Attachment::NewAnchor) && !peer.is_recovery() {
            let timestamp = segment.oldest().expect("segment checked non-empty").header.timestamp;
            if timestamp > now + self.config.new_anchor_future_limit_secs {
                self.penalize(
                    peer,
                    Penalty::TooFarFuture,
                    Some(format!("anchor timestamp {timestamp}, now {now}")),
                );
                return;
            }
            if timestamp + self.config.new_anchor_past_limit_secs < now {
                self.penalize(
                    peer,
                    Penalty::TooFarPast,
                    Some(format!("anchor timestamp {timestamp}, now {now}")),
                );
                return;
            }
        }

        let delta = match attachment {
            Attachment::AlreadyKnown => unreachable!("handled above"),
            Attachment::Connect {
                tip,
                new_from,
                anchor_slot,
                attach_index,
            } => {
                debug!(peer = %peer, tip = %short_hex(&tip), "segment connects tip to anchor");
                self.forest.connect(&segment, tip, new_from, anchor_slot, attach_index)
            }
            Attachment::ExtendDown {
                anchor_slot,
                attach_index,
            } => {
                debug!(peer = %peer, slot = %short_hex(&anchor_slot), "segment extends anchor down");
                self.forest
                    .extend_down(&segment, anchor_slot, attach_index, self.config.init_pow_depth)
            }
            Attachment::ExtendUp { tip, new_from } => {
                debug!(peer = %peer, tip = %short_hex(&tip), "segment extends tip up");
                self.forest.extend_up(&segment, tip, new_from)
            }
            Attachment::NewAnchor => {
                debug!(peer = %peer, "segment forms a new anchor");
                self.forest.new_anchor(&segment, self.config.init_pow_depth)
            }
        };
        self.apply_delta(delta, now);

        if !self.recovering {
            for hashed in &segment.headers[new_from..] {
                self.recovery.append(&hashed.header);
            }
            if self.recovery.should_flush() {
                self.flush_buffer(now);
            }
        }

        if let Some(range) = self.forest.try_initiate(&self.initiation_roots) {
            info!(
                from = range.from_height,
                to = range.to_height,
                headers = range.headers.len(),
                "chain initiated down to hard-coded root"
            );
            if let Some(oldest) = range.headers.first() {
                self.scheduler.cancel(&oldest.parent_hash);
            }
            self.chain_sink.send_chain(range);
        }
    }

    /// Anchors in `slot` whose claimed linkage contradicts the segment
    /// header they would now sit on.
    fn contradicted_anchors(
        &self,
        segment: &ChainSegment,
        slot: Hash,
        attach_index: usize,
    ) -> Vec<Hash> {
        let parent = &segment.headers[attach_index];
        self.forest
            .anchors_waiting_on(&slot)
            .to_vec()
            .into_iter()
            .filter(|anchor_hash| {
                let Some(anchor) = self.forest.anchor(anchor_hash) else {
                    return false;
                };
                if anchor.block_height != parent.header.number + 1 {
                    return true;
                }
                let expected = self.rules.calc_difficulty(
                    anchor.timestamp,
                    parent.header.timestamp,
                    parent.header.difficulty,
                    parent.header.number,
                    parent.hash,
                    parent.header.uncle_hash,
                );
                anchor.difficulty != expected
            })
            .collect()
    }

    /// Height and difficulty arithmetic for a segment root attaching above
    /// an existing tip.
    fn check_attach_link(
        &self,
        tip_hash: Hash,
        child: &HashedHeader,
    ) -> Result<(), (Penalty, String)> {
        let parent = self
            .forest
            .tip(&tip_hash)
            .expect("attach tip missing from tip index");
        if child.header.number != parent.header.number + 1 {
            return Err((
                Penalty::WrongChildBlockHeight,
                format!(
                    "expected {}, got {}",
                    parent.header.number + 1,
                    child.header.number
                ),
            ));
        }
        let expected = self.rules.calc_difficulty(
            child.header.timestamp,
            parent.header.timestamp,
            parent.header.difficulty,
            parent.header.number,
            tip_hash,
            parent.header.uncle_hash,
        );
        if child.header.difficulty != expected {
            return Err((
                Penalty::WrongChildDifficulty,
                format!("expected {}, got {}", expected, child.header.difficulty),
            ));
        }
        Ok(())
    }

    fn apply_delta(&mut self, delta: ForestDelta, now: u64) {
        // Within one verb, slots are scheduled before evictions can cancel
        // them again; applying in that order keeps the scheduler exact.
        for slot in delta.scheduled_slots {
            self.scheduler.schedule(slot, now);
        }
        for slot in &delta.cancelled_slots {
            self.scheduler.cancel(slot);
        }
    }

    fn penalize(&self, peer: PeerId, penalty: Penalty, details: Option<String>) {
        if peer.is_recovery() {
            debug!(penalty = %penalty, "violation during recovery replay ignored");
            return;
        }
        let report = PeerPenalty {
            peer,
            penalty,
            details,
        };
        warn!(penalty = %report, "peer penalized");
        self.penalty_sink.send_penalty(report);
    }

    fn flush_buffer(&mut self, now: u64) {
        match self.recovery.flush(now) {
            Ok(Some(path)) => debug!(file = %path.display(), "recovery buffer flushed"),
            Ok(None) => {}
            Err(err) => {
                // In-memory state is retained; the next flush may succeed.
                error!(error = %err, "recovery flush failed");
            }
        }
    }

    // ------------------------------------------------------------------
    // startup
    // ------------------------------------------------------------------

    fn recover_from_files(&mut self) -> Result<bool, SyncError> {
        let files = RecoveryBuffer::flush_files(&self.config.recovery_dir)?;
        if files.is_empty() {
            return Ok(false);
        }
        self.recovering = true;
        let mut replayed = 0usize;
        for file in files {
            match RecoveryBuffer::read_headers(&file) {
                Ok(headers) => {
                    replayed += headers.len();
                    self.handle_headers(headers, PeerId::RECOVERY);
                }
                Err(err) => {
                    error!(file = %file.display(), error = %err, "recovery file unreadable, skipping");
                }
            }
        }
        self.recovering = false;
        info!(headers = replayed, "recovery replay complete");
        Ok(replayed > 0)
    }

    fn load_hard_coded_checkpoints(&mut self, path: &Path) -> Result<(), SyncError> {
        let checkpoints = load_checkpoint_file(path)?;
        let count = checkpoints.len();
        for (header, total_difficulty) in checkpoints {
            let hashed = HashedHeader::new(header);
            self.initiation_roots.insert(hashed.hash);
            self.forest.add_hard_coded_anchor(&hashed, total_difficulty);
        }
        if count > 0 {
            info!(checkpoints = count, "hard-coded checkpoints inserted");
        }
        Ok(())
    }
}

fn anchor_attach_point(attachment: &Attachment) -> Option<(Hash, usize)> {
    match attachment {
        Attachment::Connect {
            anchor_slot,
            attach_index,
            ..
        } => Some((*anchor_slot, *attach_index)),
        Attachment::ExtendDown {
            anchor_slot,
            attach_index: Some(index),
        } => Some((*anchor_slot, *index)),
        _ => None,
    }
}

impl<R, C, Q, P, E> HeaderSyncApi for HeaderSyncService<R, C, Q, P, E>
where
    R: ConsensusRules,
    C: Clock,
    Q: HeaderRequestSink,
    P: PenaltySink,
    E: ChainEventSink,
{
    fn handle_headers(&mut self, headers: Vec<BlockHeader>, peer: PeerId) {
        let count = headers.len();
        let split = {
            let rules = &self.rules;
            split_into_segments(
                headers,
                self.forest.bad_headers(),
                |child_ts, parent_ts, parent_difficulty, parent_number, parent_hash, parent_uncle| {
                    rules.calc_difficulty(
                        child_ts,
                        parent_ts,
                        parent_difficulty,
                        parent_number,
                        parent_hash,
                        parent_uncle,
                    )
                },
            )
        };
        match split {
            Ok(segments) => {
                debug!(peer = %peer, headers = count, segments = segments.len(), "header batch classified");
                for segment in segments {
                    for piece in segment.linear_pieces() {
                        self.process_segment(piece, peer);
                    }
                }
            }
            Err(penalty) => self.penalize(peer, penalty, None),
        }
    }

    fn handle_new_block(&mut self, header: BlockHeader, peer: PeerId) {
        let height = header.number;
        debug!(peer = %peer, height, "new block header received");
        self.handle_headers(vec![header], peer);
    }

    fn handle_new_block_hashes(&mut self, announcements: Vec<BlockAnnouncement>, peer: PeerId) {
        for announcement in announcements {
            if self.forest.has_tip(&announcement.hash) {
                continue;
            }
            debug!(
                peer = %peer,
                hash = %short_hex(&announcement.hash),
                height = announcement.number,
                "requesting announced header"
            );
            self.request_sink.send_request(HeaderRequest {
                hash: announcement.hash,
                length: 1,
            });
        }
    }

    fn poll_requests(&mut self, now: u64) {
        for slot in self.scheduler.poll(now) {
            let anchor_hashes = self.forest.anchors_waiting_on(&slot).to_vec();
            for anchor_hash in anchor_hashes {
                self.request_sink.send_request(HeaderRequest {
                    hash: anchor_hash,
                    length: self.config.request_length,
                });
            }
        }
    }

    fn status(&self) -> SyncStatus {
        SyncStatus {
            anchor_count: self.forest.anchor_count(),
            tip_count: self.forest.tip_count(),
            initiated: self.forest.initiated(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::invariants;
    use crate::ports::outbound::{FixedClock, MockConsensusRules, RecordingSink};
    use ember_types::ZERO_HASH;
    use tempfile::TempDir;

    type TestService =
        HeaderSyncService<MockConsensusRules, FixedClock, RecordingSink, RecordingSink, RecordingSink>;

    struct Harness {
        service: TestService,
        sink: RecordingSink,
        _dir: TempDir,
    }

    fn harness() -> Harness {
        harness_with(MockConsensusRules::default(), FixedClock(0))
    }

    fn harness_with(rules: MockConsensusRules, clock: FixedClock) -> Harness {
        let dir = TempDir::new().unwrap();
        let config = SyncConfig::for_testing(dir.path());
        let sink = RecordingSink::new();
        let service = HeaderSyncService::new(
            config,
            rules,
            clock,
            sink.clone(),
            sink.clone(),
            sink.clone(),
        );
        Harness {
            service,
            sink,
            _dir: dir,
        }
    }

    fn header(number: u64, parent_hash: Hash, difficulty: u64) -> BlockHeader {
        BlockHeader {
            parent_hash,
            number,
            difficulty: U256::from(difficulty),
            ..Default::default()
        }
    }

    fn peer() -> PeerId {
        PeerId(1)
    }

    #[test]
    fn test_empty_batch_is_silent() {
        let mut h = harness();
        h.service.handle_headers(vec![], peer());
        assert!(h.sink.penalties().is_empty());
        assert_eq!(h.service.status().tip_count, 0);
    }

    #[test]
    fn test_duplicate_header_penalized() {
        let mut h = harness();
        let header = header(5, ZERO_HASH, 0);
        h.service.handle_headers(vec![header.clone(), header], peer());
        let penalties = h.sink.penalties();
        assert_eq!(penalties.len(), 1);
        assert_eq!(penalties[0].penalty, Penalty::DuplicateHeader);
        assert_eq!(penalties[0].peer, peer());
        assert_eq!(h.service.status().tip_count, 0);
    }

    #[test]
    fn test_bad_header_penalized() {
        let mut h = harness();
        let header = header(5, ZERO_HASH, 0);
        h.service.add_bad_header(header.hash());
        h.service.handle_new_block(header, peer());
        let penalties = h.sink.penalties();
        assert_eq!(penalties.len(), 1);
        assert_eq!(penalties[0].penalty, Penalty::BadBlock);
    }

    #[test]
    fn test_prepend_single_header_to_tip() {
        let mut h = harness();
        let h1 = header(1, ZERO_HASH, 10);
        h.service.seed_header_as_tip(h1.clone(), U256::from(2000u64));

        let h2 = header(2, h1.hash(), 1010);
        h.service.handle_headers(vec![h2.clone()], peer());
        assert!(h.sink.penalties().is_empty());
        assert_eq!(h.service.status().tip_count, 2);
        assert_eq!(
            h.service.forest.tip(&h2.hash()).unwrap().cumulative_difficulty,
            U256::from(3010u64)
        );
    }

    #[test]
    fn test_prepend_chain_to_highest_tip() {
        let mut h = harness();
        let h1 = header(1, ZERO_HASH, 10);
        h.service.seed_header_as_tip(h1.clone(), U256::from(2000u64));
        let h2 = header(2, h1.hash(), 1010);
        h.service.handle_headers(vec![h2.clone()], peer());

        let h3 = header(3, h2.hash(), 2010);
        let h4 = header(4, h3.hash(), 3010);
        h.service.handle_headers(vec![h3, h4.clone()], peer());
        assert!(h.sink.penalties().is_empty());
        assert_eq!(h.service.status().tip_count, 4);
        assert_eq!(
            h.service.forest.tip(&h4.hash()).unwrap().cumulative_difficulty,
            U256::from(2000u64 + 1010 + 2010 + 3010)
        );
        assert!(invariants::check_all(&h.service.forest).is_ok());
    }

    #[test]
    fn test_wrong_child_height_at_attach_link() {
        let mut h = harness();
        let h1 = header(1, ZERO_HASH, 10);
        h.service.seed_header_as_tip(h1.clone(), U256::from(2000u64));

        let bad = header(3, h1.hash(), 1010); // height 3 above height 1
        h.service.handle_headers(vec![bad], peer());
        let penalties = h.sink.penalties();
        assert_eq!(penalties.len(), 1);
        assert_eq!(penalties[0].penalty, Penalty::WrongChildBlockHeight);
        assert_eq!(h.service.status().tip_count, 1);
    }

    #[test]
    fn test_wrong_child_difficulty_at_attach_link() {
        let mut h = harness();
        let h1 = header(1, ZERO_HASH, 10);
        h.service.seed_header_as_tip(h1.clone(), U256::from(2000u64));

        let bad = header(2, h1.hash(), 4020); // expected 1010
        h.service.handle_headers(vec![bad], peer());
        let penalties = h.sink.penalties();
        assert_eq!(penalties.len(), 1);
        assert_eq!(penalties[0].penalty, Penalty::WrongChildDifficulty);
        assert_eq!(h.service.status().tip_count, 1);
    }

    #[test]
    fn test_invalid_seal_leaves_tip_set_unchanged() {
        let mut h = harness_with(MockConsensusRules::rejecting_nonzero_nonce(), FixedClock(0));
        let h1 = header(1, ZERO_HASH, 10);
        h.service.seed_header_as_tip(h1.clone(), U256::from(2000u64));

        let mut sealed = header(2, h1.hash(), 1010);
        sealed.nonce = 1;
        h.service.handle_headers(vec![sealed], peer());
        let penalties = h.sink.penalties();
        assert_eq!(penalties.len(), 1);
        assert_eq!(penalties[0].penalty, Penalty::InvalidSeal);
        assert_eq!(h.service.status().tip_count, 1);
    }

    #[test]
    fn test_new_anchor_too_far_future() {
        let mut h = harness_with(MockConsensusRules::default(), FixedClock(10_000));
        let mut distant = header(5, [7u8; 32], 50);
        distant.timestamp = 10_000 + 3600 + 1;
        h.service.handle_headers(vec![distant], peer());
        assert_eq!(h.sink.penalties()[0].penalty, Penalty::TooFarFuture);
        assert_eq!(h.service.status().anchor_count, 0);
    }

    #[test]
    fn test_new_anchor_too_far_past() {
        let mut h = harness_with(MockConsensusRules::default(), FixedClock(10_000));
        let distant = header(5, [7u8; 32], 50); // timestamp 0
        h.service.handle_headers(vec![distant], peer());
        assert_eq!(h.sink.penalties()[0].penalty, Penalty::TooFarPast);
        assert_eq!(h.service.status().anchor_count, 0);
    }

    #[test]
    fn test_new_anchor_schedules_request() {
        let mut h = harness();
        let h5 = header(5, [7u8; 32], 50);
        let h6 = header(6, h5.hash(), 1050);
        h.service.handle_headers(vec![h5.clone(), h6], peer());
        assert_eq!(h.service.status().anchor_count, 1);

        h.service.poll_requests(0);
        let requests = h.sink.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].hash, h5.hash());
        assert_eq!(requests[0].length, 192);

        // Nothing more until the retry interval elapses.
        h.service.poll_requests(1);
        assert_eq!(h.sink.requests().len(), 1);
        h.service.poll_requests(5);
        assert_eq!(h.sink.requests().len(), 2);
    }

    #[test]
    fn test_new_block_hashes_requests_unknown_only() {
        let mut h = harness();
        let h1 = header(1, ZERO_HASH, 10);
        h.service.seed_header_as_tip(h1.clone(), U256::from(2000u64));

        let unknown = [9u8; 32];
        h.service.handle_new_block_hashes(
            vec![
                BlockAnnouncement {
                    hash: h1.hash(),
                    number: 1,
                },
                BlockAnnouncement {
                    hash: unknown,
                    number: 9,
                },
            ],
            peer(),
        );
        let requests = h.sink.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].hash, unknown);
        assert_eq!(requests[0].length, 1);
    }

    #[test]
    fn test_extend_down_reschedules_request() {
        let mut h = harness();
        let h4 = header(4, [6u8; 32], 40);
        let h5 = header(5, h4.hash(), 50);
        h.service.handle_headers(vec![h5], peer());
        h.service.poll_requests(0);
        assert_eq!(h.sink.requests().len(), 1);

        // The anchor moves down to h4; the old slot is cancelled and the
        // new one fires immediately.
        h.service.handle_headers(vec![h4.clone()], peer());
        h.service.poll_requests(0);
        let requests = h.sink.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].hash, h4.hash());
        assert!(invariants::check_all(&h.service.forest).is_ok());
    }

    #[test]
    fn test_initiation_emits_chain_once() {
        let genesis = header(0, ZERO_HASH, 1);
        let genesis_hash = genesis.hash();
        let mut h = {
            let dir = TempDir::new().unwrap();
            let mut config = SyncConfig::for_testing(dir.path());
            config.genesis_hash = genesis_hash;
            let sink = RecordingSink::new();
            let service = HeaderSyncService::new(
                config,
                MockConsensusRules::default(),
                FixedClock(0),
                sink.clone(),
                sink.clone(),
                sink.clone(),
            );
            Harness {
                service,
                sink,
                _dir: dir,
            }
        };

        let h1 = header(1, genesis_hash, 10);
        let h2 = header(2, h1.hash(), 1010);
        h.service.handle_headers(vec![h1, h2], peer());

        let chains = h.sink.chains();
        assert_eq!(chains.len(), 1);
        assert_eq!(chains[0].from_height, 1);
        assert_eq!(chains[0].to_height, 2);
        assert!(h.service.status().initiated);

        // Further growth does not re-emit.
        let h3 = header(3, chains[0].headers[1].hash(), 2010);
        h.service.handle_headers(vec![h3], peer());
        assert_eq!(h.sink.chains().len(), 1);
    }

    #[test]
    fn test_recovery_replay_reconstructs_forest() {
        let dir = TempDir::new().unwrap();
        let config = SyncConfig::for_testing(dir.path());

        let h5 = header(5, [7u8; 32], 50);
        let h6 = header(6, h5.hash(), 1050);
        let (anchors, tips) = {
            let sink = RecordingSink::new();
            let mut service = HeaderSyncService::new(
                config.clone(),
                MockConsensusRules::default(),
                FixedClock(0),
                sink.clone(),
                sink.clone(),
                sink,
            );
            service.handle_headers(vec![h5.clone(), h6.clone()], peer());
            service.flush_buffer(100);
            (service.status().anchor_count, service.status().tip_count)
        };

        let sink = RecordingSink::new();
        let mut recovered = HeaderSyncService::new(
            config,
            MockConsensusRules::default(),
            FixedClock(1_000_000), // far from the header timestamps
            sink.clone(),
            sink.clone(),
            sink.clone(),
        );
        assert!(recovered.bootstrap(None).unwrap());
        assert_eq!(recovered.status().anchor_count, anchors);
        assert_eq!(recovered.status().tip_count, tips);
        assert_eq!(
            recovered
                .forest
                .tip(&h6.hash())
                .unwrap()
                .cumulative_difficulty,
            U256::from(1050u64)
        );
        // Replay never penalizes.
        assert!(sink.penalties().is_empty());
        assert!(invariants::check_all(&recovered.forest).is_ok());
    }

    #[test]
    fn test_bootstrap_inserts_checkpoints_when_no_recovery() {
        use crate::adapters::checkpoints::write_checkpoint_file;

        let dir = TempDir::new().unwrap();
        let config = SyncConfig::for_testing(dir.path().join("recovery"));
        let checkpoint = header(100, [9u8; 32], 500);
        let path = dir.path().join("hard-coded-headers.dat");
        write_checkpoint_file(&path, &[(checkpoint.clone(), U256::from(70_000u64))]).unwrap();

        let sink = RecordingSink::new();
        let mut service = HeaderSyncService::new(
            config,
            MockConsensusRules::default(),
            FixedClock(0),
            sink.clone(),
            sink.clone(),
            sink.clone(),
        );
        assert!(!service.bootstrap(Some(&path)).unwrap());
        assert_eq!(service.status().anchor_count, 1);
        let tip = service.forest.tip(&checkpoint.hash()).unwrap();
        assert!(tip.no_prepend);
        assert_eq!(tip.cumulative_difficulty, U256::from(70_000u64));
        // No backward request for a hard-coded anchor.
        service.poll_requests(0);
        assert!(sink.requests().is_empty());
    }

    #[test]
    fn test_chain_resolving_to_checkpoint_initiates() {
        use crate::adapters::checkpoints::write_checkpoint_file;

        let dir = TempDir::new().unwrap();
        let config = SyncConfig::for_testing(dir.path().join("recovery"));
        let checkpoint = header(100, [9u8; 32], 500);
        let path = dir.path().join("hard-coded-headers.dat");
        write_checkpoint_file(&path, &[(checkpoint.clone(), U256::from(70_000u64))]).unwrap();

        let sink = RecordingSink::new();
        let mut service = HeaderSyncService::new(
            config,
            MockConsensusRules::default(),
            FixedClock(0),
            sink.clone(),
            sink.clone(),
            sink.clone(),
        );
        service.bootstrap(Some(&path)).unwrap();

        let h101 = header(101, checkpoint.hash(), 1500);
        service.handle_headers(vec![h101], peer());
        let chains = sink.chains();
        assert_eq!(chains.len(), 1);
        // The emitted chain reaches down to the checkpoint itself.
        assert_eq!(chains[0].from_height, 100);
        assert_eq!(chains[0].to_height, 101);
        assert!(service.status().initiated);
    }
}
