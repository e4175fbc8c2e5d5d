//! # Domain Errors
//!
//! Error types for the header synchronization engine.
//!
//! Peer protocol violations are *not* errors; they are represented by the
//! penalty taxonomy in `value_objects`. The variants here cover structural
//! problems in local state: the recovery codec, recovery-file I/O, and
//! malformed internal calls.

use thiserror::Error;

/// Structural failure in the fixed-width header codec.
///
/// A codec failure while reading recovery state means the flush file is
/// corrupt; it is never attributed to a peer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The `extra` field does not fit the fixed record layout.
    #[error("extra data too long: {len} > {max}")]
    ExtraTooLong {
        /// Actual length of the extra field.
        len: usize,
        /// Maximum the record layout can hold.
        max: usize,
    },

    /// The input slice is shorter than one full record.
    #[error("truncated header record: {got} of {need} bytes")]
    TruncatedRecord {
        /// Bytes available.
        got: usize,
        /// Bytes a record requires.
        need: usize,
    },

    /// The embedded extra length field is out of range.
    #[error("corrupt extra length field: {len}")]
    CorruptExtraLength {
        /// The embedded length value.
        len: u32,
    },
}

/// Seal (proof-of-work) verification failure reported by the consensus
/// rules port.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid seal: {0}")]
pub struct SealError(pub String);

/// Engine error type.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Recovery-buffer or checkpoint record could not be decoded.
    #[error("header codec: {0}")]
    Codec(#[from] CodecError),

    /// Recovery-buffer or checkpoint file I/O failed.
    #[error("recovery I/O: {0}")]
    Io(#[from] std::io::Error),
}
