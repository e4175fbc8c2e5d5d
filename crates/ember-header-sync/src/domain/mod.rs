//! Core domain of the header synchronization engine: entities, the header
//! forest and its bounded tip set, the request scheduler, the recovery
//! record codec, and the penalty taxonomy.

pub mod codec;
pub mod entities;
pub mod errors;
pub mod forest;
pub mod invariants;
pub mod limiter;
pub mod scheduler;
pub mod value_objects;

pub use codec::{decode_header, encode_header, MAX_EXTRA_LEN, RECORD_LEN};
pub use entities::{Anchor, BlockHeader, ChainSegment, HashedHeader, Tip, OPAQUE_LEN};
pub use errors::{CodecError, SealError, SyncError};
pub use forest::{Attachment, ForestDelta, HeaderForest};
pub use invariants::InvariantViolation;
pub use limiter::TipLimiter;
pub use scheduler::RequestScheduler;
pub use value_objects::{
    BlockAnnouncement, ChainRange, HeaderRequest, PeerPenalty, Penalty, SyncStatus, TipKey,
};
