//! Inbound message types delivered by the peer layer.

use crate::domain::{BlockAnnouncement, BlockHeader};
use ember_types::PeerId;

/// Messages the dispatcher loop consumes.
#[derive(Clone, Debug)]
pub enum SyncMessage {
    /// A freshly propagated block; its header enters as a one-element
    /// segment.
    NewBlock {
        /// The block's header.
        header: BlockHeader,
        /// Originating peer.
        peer: PeerId,
    },
    /// Hash announcements; unknown hashes turn into length-1 requests.
    NewBlockHashes {
        /// Announced hashes with their claimed heights.
        announcements: Vec<BlockAnnouncement>,
        /// Originating peer.
        peer: PeerId,
    },
    /// A header batch answering an earlier request.
    BlockHeaders {
        /// The batch, in untrusted wire order.
        headers: Vec<BlockHeader>,
        /// Originating peer.
        peer: PeerId,
    },
}
