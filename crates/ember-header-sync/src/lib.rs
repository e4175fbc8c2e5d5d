//! # Ember Header Sync
//!
//! Peer-to-peer block-header synchronization engine for a proof-of-work
//! chain. Header batches from untrusted peers are re-sorted, validated
//! against consensus rules, and assembled into an in-memory forest of
//! anchors (unresolved roots) and tips (extensible headers) that
//! eventually linearizes into one continuous chain from genesis, or from a
//! hard-coded checkpoint, up to the network tip.
//!
//! The engine penalizes protocol violations, schedules backward header
//! requests for every unresolved anchor, and persists accepted headers in
//! a flat recovery buffer replayed at startup. Transaction execution,
//! serving headers to other peers, and the blockchain database live in
//! other subsystems; the engine reaches them only through its outbound
//! ports.
//!
//! ## Module Structure
//!
//! ```text
//! ember-header-sync/
//! ├── domain/          # BlockHeader, forest, tip limiter, scheduler, codec
//! ├── algorithms/      # segment classification
//! ├── ports/           # API trait (inbound) + collaborator traits (outbound)
//! ├── application/     # HeaderSyncService and the dispatcher loop
//! ├── adapters/        # recovery files, checkpoints, channel sinks, clock
//! ├── events.rs        # inbound peer messages
//! └── config.rs        # SyncConfig
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapters;
pub mod algorithms;
pub mod application;
pub mod config;
pub mod domain;
pub mod events;
pub mod ports;

// Re-exports
pub use adapters::{
    load_checkpoint_file, write_checkpoint_file, ChannelChainSink, ChannelPenaltySink,
    ChannelRequestSink, RecoveryBuffer, SystemClock,
};
pub use algorithms::split_into_segments;
pub use application::HeaderSyncService;
pub use config::SyncConfig;
pub use domain::{
    Anchor, Attachment, BlockAnnouncement, BlockHeader, ChainRange, ChainSegment, CodecError,
    HashedHeader, HeaderForest, HeaderRequest, PeerPenalty, Penalty, SealError, SyncError,
    SyncStatus, Tip,
};
pub use events::SyncMessage;
pub use ports::{
    ChainEventSink, Clock, ConsensusRules, FixedClock, HeaderRequestSink, HeaderSyncApi,
    MockConsensusRules, PenaltySink, RecordingSink,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
