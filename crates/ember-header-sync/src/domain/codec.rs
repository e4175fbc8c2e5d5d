//! # Header Record Codec
//!
//! Fixed-width serialization of a block header for the recovery buffer and
//! the hard-coded checkpoint file. Every header occupies exactly
//! [`RECORD_LEN`] bytes so that flush files can be replayed by reading
//! whole records, and truncation is detectable by a simple length check.
//!
//! Record layout:
//!
//! ```text
//! offset  len  field
//!      0   32  parent_hash
//!     32   32  uncle_hash
//!     64    8  number            (u64 LE)
//!     72    8  timestamp         (u64 LE)
//!     80    8  nonce             (u64 LE)
//!     88   32  difficulty        (U256 BE)
//!    120  160  opaque
//!    280    4  extra length      (u32 LE)
//!    284  256  extra, zero-padded
//! ```

use super::entities::{BlockHeader, OPAQUE_LEN};
use super::errors::CodecError;
use ember_types::U256;

/// Serialized size of one header record.
pub const RECORD_LEN: usize = 540;

/// Maximum length of the `extra` field a record can hold.
pub const MAX_EXTRA_LEN: usize = 256;

const NUMBER_OFFSET: usize = 64;
const TIMESTAMP_OFFSET: usize = 72;
const NONCE_OFFSET: usize = 80;
const DIFFICULTY_OFFSET: usize = 88;
const OPAQUE_OFFSET: usize = 120;
const EXTRA_LEN_OFFSET: usize = 280;
const EXTRA_OFFSET: usize = 284;

/// Serialize a header into a fixed-width record.
pub fn encode_header(header: &BlockHeader) -> Result<[u8; RECORD_LEN], CodecError> {
    if header.extra.len() > MAX_EXTRA_LEN {
        return Err(CodecError::ExtraTooLong {
            len: header.extra.len(),
            max: MAX_EXTRA_LEN,
        });
    }
    let mut record = [0u8; RECORD_LEN];
    record[..32].copy_from_slice(&header.parent_hash);
    record[32..64].copy_from_slice(&header.uncle_hash);
    record[NUMBER_OFFSET..NUMBER_OFFSET + 8].copy_from_slice(&header.number.to_le_bytes());
    record[TIMESTAMP_OFFSET..TIMESTAMP_OFFSET + 8].copy_from_slice(&header.timestamp.to_le_bytes());
    record[NONCE_OFFSET..NONCE_OFFSET + 8].copy_from_slice(&header.nonce.to_le_bytes());
    header
        .difficulty
        .to_big_endian(&mut record[DIFFICULTY_OFFSET..DIFFICULTY_OFFSET + 32]);
    record[OPAQUE_OFFSET..OPAQUE_OFFSET + OPAQUE_LEN].copy_from_slice(&header.opaque);
    record[EXTRA_LEN_OFFSET..EXTRA_LEN_OFFSET + 4]
        .copy_from_slice(&(header.extra.len() as u32).to_le_bytes());
    record[EXTRA_OFFSET..EXTRA_OFFSET + header.extra.len()].copy_from_slice(&header.extra);
    Ok(record)
}

/// Deserialize one fixed-width record back into a header.
pub fn decode_header(record: &[u8]) -> Result<BlockHeader, CodecError> {
    if record.len() < RECORD_LEN {
        return Err(CodecError::TruncatedRecord {
            got: record.len(),
            need: RECORD_LEN,
        });
    }
    let extra_len = u32::from_le_bytes(
        record[EXTRA_LEN_OFFSET..EXTRA_LEN_OFFSET + 4]
            .try_into()
            .expect("slice length is 4"),
    );
    if extra_len as usize > MAX_EXTRA_LEN {
        return Err(CodecError::CorruptExtraLength { len: extra_len });
    }

    let mut parent_hash = [0u8; 32];
    parent_hash.copy_from_slice(&record[..32]);
    let mut uncle_hash = [0u8; 32];
    uncle_hash.copy_from_slice(&record[32..64]);
    let mut opaque = [0u8; OPAQUE_LEN];
    opaque.copy_from_slice(&record[OPAQUE_OFFSET..OPAQUE_OFFSET + OPAQUE_LEN]);

    Ok(BlockHeader {
        parent_hash,
        uncle_hash,
        number: u64::from_le_bytes(
            record[NUMBER_OFFSET..NUMBER_OFFSET + 8]
                .try_into()
                .expect("slice length is 8"),
        ),
        timestamp: u64::from_le_bytes(
            record[TIMESTAMP_OFFSET..TIMESTAMP_OFFSET + 8]
                .try_into()
                .expect("slice length is 8"),
        ),
        nonce: u64::from_le_bytes(
            record[NONCE_OFFSET..NONCE_OFFSET + 8]
                .try_into()
                .expect("slice length is 8"),
        ),
        difficulty: U256::from_big_endian(&record[DIFFICULTY_OFFSET..DIFFICULTY_OFFSET + 32]),
        opaque,
        extra: record[EXTRA_OFFSET..EXTRA_OFFSET + extra_len as usize].to_vec(),
    })
}
