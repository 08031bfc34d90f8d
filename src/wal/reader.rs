//! WAL replay

use super::{sealed_path, WalRecord};
use crate::{Result, StorageError};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Reads a log file back into records at startup
pub struct WalReader {
    path: PathBuf,
}

impl WalReader {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Decode records sequentially from the log.
    ///
    /// A sealed segment left behind by a crash mid-flush replays first; its
    /// records are older than anything in the active segment, so sequence
    /// order is preserved end to end.
    ///
    /// Within a segment, a checksum mismatch or a short tail stops replay at
    /// that point and keeps everything decoded so far. A torn final write is
    /// expected after a crash and is not an error; anything before it is
    /// intact because records were acknowledged in order.
    pub fn replay(&self) -> Result<Vec<WalRecord>> {
        let mut records = Vec::new();
        for path in [sealed_path(&self.path), self.path.clone()] {
            if path.exists() {
                self.replay_segment(&path, &mut records)?;
            }
        }
        Ok(records)
    }

    fn replay_segment(&self, path: &Path, records: &mut Vec<WalRecord>) -> Result<()> {
        let data = fs::read(path)?;
        let mut pos = 0;

        while pos < data.len() {
            match WalRecord::decode(&data[pos..]) {
                Ok((record, consumed)) => {
                    records.push(record);
                    pos += consumed;
                }
                Err(StorageError::ChecksumMismatch { .. }) => {
                    warn!(
                        segment = %path.display(),
                        offset = pos,
                        recovered = records.len(),
                        "WAL checksum mismatch, truncating replay"
                    );
                    break;
                }
                Err(StorageError::InvalidFormat(_)) => {
                    // Torn tail from an interrupted append
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }
}
