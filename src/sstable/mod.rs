//! SSTable (Sorted String Table) implementation
//!
//! Each table is an immutable directory:
//! - `data.bin` — header, compressed data blocks, sparse index, key range,
//!   bloom filter, footer
//! - `metadata.json` — sidecar with format version, whole-file SHA-256 and
//!   schema fingerprint, validated before the data file is trusted

mod bloom;
mod builder;
mod reader;

pub use bloom::BloomFilter;
pub use builder::TableBuilder;
pub use reader::{TableIter, TableReader};

pub(crate) use reader::sha256_hex;

use crate::types::{Level, SeqNo};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Table file format version
pub const FORMAT_VERSION: u32 = 1;

/// Identifies the entry encoding this build reads and writes
pub const SCHEMA_FINGERPRINT: &str = "stratakv/entry/v1";

/// Data file name inside a table directory
pub const DATA_FILE: &str = "data.bin";

/// Sidecar file name inside a table directory
pub const META_FILE: &str = "metadata.json";

/// Magic bytes at the start and end of `data.bin`
pub const MAGIC: &[u8; 4] = b"STKV";

/// Sidecar contents, written last so a complete sidecar implies a complete
/// data file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SidecarMeta {
    pub format_version: u32,
    /// Hex SHA-256 of `data.bin`
    pub checksum: String,
    pub schema_fingerprint: String,
    pub table_id: u64,
    pub level: u8,
    pub entry_count: u64,
}

/// In-memory table metadata
#[derive(Debug, Clone)]
pub struct TableMeta {
    /// Table directory
    pub dir: PathBuf,
    /// Unique ID, also orders tables by age
    pub id: u64,
    /// Level in the tree
    pub level: Level,
    /// Number of entries
    pub entry_count: usize,
    /// Size of `data.bin` in bytes
    pub file_size: u64,
    /// Highest sequence number in the table
    pub max_seq: SeqNo,
    /// Smallest key
    pub min_key: Vec<u8>,
    /// Largest key
    pub max_key: Vec<u8>,
}

impl TableMeta {
    /// Whether the table's key range intersects `[start, end)`.
    /// An empty `end` means unbounded.
    pub fn overlaps_range(&self, start: &[u8], end: Option<&[u8]>) -> bool {
        if self.max_key.as_slice() < start {
            return false;
        }
        match end {
            Some(end) => self.min_key.as_slice() < end,
            None => true,
        }
    }

    /// Whether the table's key range intersects another table's range
    pub fn overlaps_table(&self, other: &TableMeta) -> bool {
        self.min_key <= other.max_key && other.min_key <= self.max_key
    }
}

/// One sparse-index slot describing a data block
#[derive(Debug, Clone)]
pub(crate) struct IndexEntry {
    /// First key in the block
    pub first_key: Vec<u8>,
    /// Block frame offset in `data.bin`
    pub offset: u64,
    /// Block frame length in bytes
    pub len: u32,
    /// Number of entries in the block
    pub entry_count: u32,
}

/// Table build configuration
#[derive(Debug, Clone)]
pub struct TableConfig {
    /// Target uncompressed block size in bytes
    pub block_size: usize,
    /// Enable per-block LZ4 compression
    pub compression: bool,
    /// Bloom filter bits per key
    pub bloom_bits_per_key: usize,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            block_size: crate::defaults::BLOCK_SIZE,
            compression: true,
            bloom_bits_per_key: crate::defaults::BLOOM_BITS_PER_KEY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(min: &[u8], max: &[u8]) -> TableMeta {
        TableMeta {
            dir: PathBuf::new(),
            id: 1,
            level: Level::L1,
            entry_count: 0,
            file_size: 0,
            max_seq: 0,
            min_key: min.to_vec(),
            max_key: max.to_vec(),
        }
    }

    #[test]
    fn test_overlaps_range() {
        let m = meta(b"c", b"g");
        assert!(m.overlaps_range(b"a", Some(b"d")));
        assert!(m.overlaps_range(b"e", None));
        assert!(!m.overlaps_range(b"h", None));
        // End bound is exclusive
        assert!(!m.overlaps_range(b"a", Some(b"c")));
        assert!(m.overlaps_range(b"g", Some(b"z")));
    }

    #[test]
    fn test_overlaps_table() {
        assert!(meta(b"a", b"d").overlaps_table(&meta(b"c", b"f")));
        assert!(meta(b"a", b"d").overlaps_table(&meta(b"d", b"f")));
        assert!(!meta(b"a", b"c").overlaps_table(&meta(b"d", b"f")));
    }
}
