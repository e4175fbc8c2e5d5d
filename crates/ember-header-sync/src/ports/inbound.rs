//! # Inbound Ports
//!
//! API trait the peer layer drives the engine through. The engine owns its
//! forest and processes one message to completion at a time, so the
//! handlers are synchronous; the dispatcher loop in `application` awaits
//! the channels around them.

use crate::domain::{BlockAnnouncement, BlockHeader, SyncStatus};
use ember_types::PeerId;

/// Header synchronization API - inbound port.
pub trait HeaderSyncApi {
    /// Ingest a header batch from one peer.
    fn handle_headers(&mut self, headers: Vec<BlockHeader>, peer: PeerId);

    /// Ingest a freshly mined block's header as a single-header segment.
    fn handle_new_block(&mut self, header: BlockHeader, peer: PeerId);

    /// Ingest block-hash announcements, requesting each unknown hash.
    fn handle_new_block_hashes(&mut self, announcements: Vec<BlockAnnouncement>, peer: PeerId);

    /// Emit header requests for every anchor whose deadline has passed.
    fn poll_requests(&mut self, now: u64);

    /// Current engine state.
    fn status(&self) -> SyncStatus;
}
