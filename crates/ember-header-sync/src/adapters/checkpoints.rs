//! # Hard-Coded Checkpoint File
//!
//! Loader for the optional checkpoint file read at startup: a sequence of
//! fixed-width header records, each followed by its baked-in total
//! difficulty. Every record seeds a `no_prepend` anchor that the forest
//! must never extend backwards.

use crate::domain::{decode_header, encode_header, BlockHeader, SyncError, RECORD_LEN};
use ember_types::U256;
use std::fs;
use std::io::Write;
use std::path::Path;
use tracing::warn;

/// One checkpoint record: header bytes plus a 32-byte big-endian total.
pub const CHECKPOINT_RECORD_LEN: usize = RECORD_LEN + 32;

/// Load the checkpoint file. A missing file reads as no checkpoints; a
/// corrupt tail is logged and dropped.
pub fn load_checkpoint_file(path: &Path) -> Result<Vec<(BlockHeader, U256)>, SyncError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err.into()),
    };
    let mut checkpoints = Vec::with_capacity(bytes.len() / CHECKPOINT_RECORD_LEN);
    for record in bytes.chunks_exact(CHECKPOINT_RECORD_LEN) {
        match decode_header(&record[..RECORD_LEN]) {
            Ok(header) => {
                let total = U256::from_big_endian(&record[RECORD_LEN..]);
                checkpoints.push((header, total));
            }
            Err(err) => {
                warn!(file = %path.display(), error = %err, "corrupt checkpoint record, dropping file tail");
                break;
            }
        }
    }
    if bytes.len() % CHECKPOINT_RECORD_LEN != 0 {
        warn!(file = %path.display(), "truncated trailing checkpoint record dropped");
    }
    Ok(checkpoints)
}

/// Write a checkpoint file in the load format.
pub fn write_checkpoint_file(
    path: &Path,
    checkpoints: &[(BlockHeader, U256)],
) -> Result<(), SyncError> {
    let mut file = fs::File::create(path)?;
    for (header, total) in checkpoints {
        let record = encode_header(header)?;
        file.write_all(&record)?;
        let mut total_bytes = [0u8; 32];
        total.to_big_endian(&mut total_bytes);
        file.write_all(&total_bytes)?;
    }
    file.sync_all()?;
    Ok(())
}
