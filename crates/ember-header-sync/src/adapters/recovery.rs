//! # Recovery Buffer
//!
//! Durable write-ahead buffer for accepted headers. Headers accumulate in
//! memory and are flushed as fixed-width records to a timestamp-named file
//! once the serialized size crosses the configured limit; the write goes
//! through a temp file and an atomic rename. At startup the flush files
//! are replayed in filename order, tolerating truncated or corrupt tails.

use crate::domain::{decode_header, encode_header, BlockHeader, SyncError, RECORD_LEN};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const FLUSH_FILE_EXT: &str = "dat";

/// In-memory header buffer with flush-file persistence.
#[derive(Debug)]
pub struct RecoveryBuffer {
    dir: PathBuf,
    buffer_limit: usize,
    pending: Vec<BlockHeader>,
    pending_bytes: usize,
    flush_seq: u64,
}

impl RecoveryBuffer {
    /// Create a buffer flushing into `dir` once `buffer_limit` serialized
    /// bytes accumulate.
    pub fn new(dir: impl Into<PathBuf>, buffer_limit: usize) -> Self {
        Self {
            dir: dir.into(),
            buffer_limit,
            pending: Vec::new(),
            pending_bytes: 0,
            flush_seq: 0,
        }
    }

    /// Append an accepted header.
    pub fn append(&mut self, header: &BlockHeader) {
        self.pending.push(header.clone());
        self.pending_bytes += RECORD_LEN;
    }

    /// Number of buffered headers awaiting a flush.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Whether the buffered bytes have crossed the flush limit.
    pub fn should_flush(&self) -> bool {
        self.pending_bytes >= self.buffer_limit
    }

    /// Write the buffered headers to a new flush file named by
    /// `timestamp`. Returns the file path, or `None` when the buffer was
    /// empty. The in-memory buffer is retained on failure.
    pub fn flush(&mut self, timestamp: u64) -> Result<Option<PathBuf>, SyncError> {
        if self.pending.is_empty() {
            return Ok(None);
        }
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(format!(
            "headers-{:016}-{:04}.{}",
            timestamp, self.flush_seq, FLUSH_FILE_EXT
        ));
        let temp_path = path.with_extension("tmp");
        {
            let mut file = fs::File::create(&temp_path)?;
            for header in &self.pending {
                match encode_header(header) {
                    Ok(record) => file.write_all(&record)?,
                    Err(err) => {
                        // The forest accepted it, so only the flat record
                        // layout can refuse it; the header is simply not
                        // made durable.
                        warn!(height = header.number, error = %err, "header skipped during flush");
                    }
                }
            }
            file.sync_all()?;
        }
        fs::rename(&temp_path, &path)?;
        debug!(file = %path.display(), headers = self.pending.len(), "recovery buffer flushed");
        self.pending.clear();
        self.pending_bytes = 0;
        self.flush_seq += 1;
        Ok(Some(path))
    }

    /// Enumerate the flush files of a recovery directory in replay order.
    /// A missing directory reads as no files.
    pub fn flush_files(dir: &Path) -> Result<Vec<PathBuf>, SyncError> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().map(|ext| ext == FLUSH_FILE_EXT).unwrap_or(false))
            .collect();
        files.sort();
        Ok(files)
    }

    /// Read every whole record of one flush file. Truncated or corrupt
    /// tails are logged and dropped; recovery is best-effort.
    pub fn read_headers(path: &Path) -> Result<Vec<BlockHeader>, SyncError> {
        let bytes = fs::read(path)?;
        let mut headers = Vec::with_capacity(bytes.len() / RECORD_LEN);
        for record in bytes.chunks_exact(RECORD_LEN) {
            match decode_header(record) {
                Ok(header) => headers.push(header),
                Err(err) => {
                    warn!(file = %path.display(), error = %err, "corrupt record, dropping file tail");
                    break;
                }
            }
        }
        let remainder = bytes.len() % RECORD_LEN;
        if remainder != 0 {
            warn!(file = %path.display(), bytes = remainder, "truncated trailing record dropped");
        }
        Ok(headers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_types::U256;
    use tempfile::TempDir;

    fn header(number: u64, difficulty: u64) -> BlockHeader {
        BlockHeader {
            number,
            difficulty: U256::from(difficulty),
            extra: number.to_string().into_bytes(),
            ..Default::default()
        }
    }

    #[test]
    fn test_flush_and_replay_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut buffer = RecoveryBuffer::new(dir.path(), 1024);
        let headers: Vec<BlockHeader> = (1..=5).map(|n| header(n, n * 100)).collect();
        for h in &headers {
            buffer.append(h);
        }
        let path = buffer.flush(42).unwrap().unwrap();
        assert_eq!(buffer.pending_len(), 0);

        let replayed = RecoveryBuffer::read_headers(&path).unwrap();
        assert_eq!(replayed, headers);
    }

    #[test]
    fn test_flush_empty_buffer_is_noop() {
        let dir = TempDir::new().unwrap();
        let mut buffer = RecoveryBuffer::new(dir.path(), 1024);
        assert!(buffer.flush(42).unwrap().is_none());
        assert!(RecoveryBuffer::flush_files(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn test_should_flush_tracks_serialized_size() {
        let dir = TempDir::new().unwrap();
        let mut buffer = RecoveryBuffer::new(dir.path(), RECORD_LEN * 2);
        buffer.append(&header(1, 10));
        assert!(!buffer.should_flush());
        buffer.append(&header(2, 20));
        assert!(buffer.should_flush());
    }

    #[test]
    fn test_flush_files_sorted_by_name() {
        let dir = TempDir::new().unwrap();
        let mut buffer = RecoveryBuffer::new(dir.path(), 1024);
        buffer.append(&header(1, 10));
        buffer.flush(100).unwrap();
        buffer.append(&header(2, 20));
        buffer.flush(200).unwrap();
        let files = RecoveryBuffer::flush_files(dir.path()).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0] < files[1]);
    }

    #[test]
    fn test_missing_directory_reads_as_empty() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("never-created");
        assert!(RecoveryBuffer::flush_files(&missing).unwrap().is_empty());
    }

    #[test]
    fn test_truncated_file_keeps_whole_records() {
        let dir = TempDir::new().unwrap();
        let mut buffer = RecoveryBuffer::new(dir.path(), 1024);
        buffer.append(&header(1, 10));
        buffer.append(&header(2, 20));
        let path = buffer.flush(7).unwrap().unwrap();

        // Chop the file mid-record.
        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..RECORD_LEN + 10]).unwrap();

        let replayed = RecoveryBuffer::read_headers(&path).unwrap();
        assert_eq!(replayed.len(), 1);
        assert_eq!(replayed[0], header(1, 10));
    }

    #[test]
    fn test_replaying_prefix_is_safe() {
        let dir = TempDir::new().unwrap();
        let mut buffer = RecoveryBuffer::new(dir.path(), 1024);
        buffer.append(&header(1, 10));
        buffer.flush(1).unwrap();
        buffer.append(&header(2, 20));
        buffer.flush(2).unwrap();

        // Reading only the first file yields the first flush alone.
        let files = RecoveryBuffer::flush_files(dir.path()).unwrap();
        let replayed = RecoveryBuffer::read_headers(&files[0]).unwrap();
        assert_eq!(replayed, vec![header(1, 10)]);
    }
}
