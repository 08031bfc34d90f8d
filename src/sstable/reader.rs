//! SSTable reader
//!
//! Validates the sidecar before trusting the data file, then serves point
//! lookups through the sparse index and a small block cache. Readers are
//! shared through `Arc`; a reader marked retired deletes its directory when
//! the last reference drops.

use super::{
    BloomFilter, IndexEntry, SidecarMeta, TableMeta, DATA_FILE, FORMAT_VERSION, MAGIC, META_FILE,
    SCHEMA_FINGERPRINT,
};
use crate::types::{Entry, Level};
use crate::{Result, StorageError};
use bytes::Buf;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Footer length: entry count, max seq, three section offset/size pairs,
/// trailing magic
const FOOTER_LEN: u64 = 8 * 8 + 4;

/// Maximum cached blocks per reader
const CACHE_BLOCKS: usize = 32;

/// Read handle for one immutable table
pub struct TableReader {
    meta: TableMeta,
    data_path: PathBuf,
    index: Vec<IndexEntry>,
    bloom: Arc<BloomFilter>,
    cache: RwLock<BTreeMap<u64, Arc<Vec<Entry>>>>,
    retired: AtomicBool,
}

impl TableReader {
    /// Open a table directory, validating the sidecar and the whole-file
    /// digest before parsing anything out of `data.bin`.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let sidecar = read_sidecar(&dir)?;

        let data_path = dir.join(DATA_FILE);
        let actual = sha256_hex(&data_path)?;
        if actual != sidecar.checksum {
            return Err(StorageError::DigestMismatch {
                expected: sidecar.checksum,
                actual,
            });
        }

        let level = Level::from_number(sidecar.level).ok_or_else(|| {
            StorageError::InvalidFormat(format!("invalid level {}", sidecar.level))
        })?;

        let mut file = File::open(&data_path)?;
        let file_size = file.metadata()?.len();
        if file_size < 8 + FOOTER_LEN {
            return Err(StorageError::InvalidFormat("data file too small".into()));
        }

        // Header
        let mut header = [0u8; 8];
        file.read_exact(&mut header)?;
        if &header[0..4] != MAGIC {
            return Err(StorageError::InvalidFormat("bad header magic".into()));
        }

        // Footer
        file.seek(SeekFrom::End(-(FOOTER_LEN as i64)))?;
        let mut footer = vec![0u8; FOOTER_LEN as usize];
        file.read_exact(&mut footer)?;
        if &footer[footer.len() - 4..] != MAGIC {
            return Err(StorageError::InvalidFormat("bad footer magic".into()));
        }

        let mut cursor = std::io::Cursor::new(&footer[..]);
        let entry_count = cursor.get_u64_le();
        let max_seq = cursor.get_u64_le();
        let index_offset = cursor.get_u64_le();
        let index_size = cursor.get_u64_le();
        let range_offset = cursor.get_u64_le();
        let range_size = cursor.get_u64_le();
        let bloom_offset = cursor.get_u64_le();
        let bloom_size = cursor.get_u64_le();

        let index = parse_index(&read_section(&mut file, index_offset, index_size)?)?;
        let (min_key, max_key) = parse_range(&read_section(&mut file, range_offset, range_size)?)?;
        let bloom = parse_bloom(&read_section(&mut file, bloom_offset, bloom_size)?)?;

        let meta = TableMeta {
            dir,
            id: sidecar.table_id,
            level,
            entry_count: entry_count as usize,
            file_size,
            max_seq,
            min_key,
            max_key,
        };

        Ok(Self {
            meta,
            data_path,
            index,
            bloom: Arc::new(bloom),
            cache: RwLock::new(BTreeMap::new()),
            retired: AtomicBool::new(false),
        })
    }

    pub fn meta(&self) -> &TableMeta {
        &self.meta
    }

    /// Shared handle to the table's bloom filter
    pub fn bloom(&self) -> Arc<BloomFilter> {
        Arc::clone(&self.bloom)
    }

    /// Fast existence pre-check
    pub fn may_contain(&self, key: &[u8]) -> bool {
        self.bloom.may_contain(key)
    }

    /// Point lookup. Returns the stored entry, tombstones included.
    pub fn get(&self, key: &[u8]) -> Result<Option<Entry>> {
        if key < self.meta.min_key.as_slice() || key > self.meta.max_key.as_slice() {
            return Ok(None);
        }

        let idx = self
            .index
            .partition_point(|b| b.first_key.as_slice() <= key);
        if idx == 0 {
            return Ok(None);
        }

        let entries = self.read_block(idx - 1)?;
        match entries.binary_search_by(|e| e.key.as_slice().cmp(key)) {
            Ok(pos) => Ok(Some(entries[pos].clone())),
            Err(_) => Ok(None),
        }
    }

    /// Entries with keys in `[start, end)`, ascending
    pub fn range_entries(&self, start: &[u8], end: Option<&[u8]>) -> Result<Vec<Entry>> {
        if !self.meta.overlaps_range(start, end) {
            return Ok(Vec::new());
        }

        let first = self
            .index
            .partition_point(|b| b.first_key.as_slice() <= start)
            .saturating_sub(1);

        let mut out = Vec::new();
        for idx in first..self.index.len() {
            if let Some(end) = end {
                if self.index[idx].first_key.as_slice() >= end {
                    break;
                }
            }
            let entries = self.read_block(idx)?;
            for entry in entries.iter() {
                if entry.key.as_slice() < start {
                    continue;
                }
                if let Some(end) = end {
                    if entry.key.as_slice() >= end {
                        return Ok(out);
                    }
                }
                out.push(entry.clone());
            }
        }
        Ok(out)
    }

    /// Streaming iterator over all entries in key order
    pub fn iter(&self) -> TableIter<'_> {
        TableIter {
            reader: self,
            block_idx: 0,
            entries: Arc::new(Vec::new()),
            pos: 0,
            lower: None,
            upper: None,
        }
    }

    /// Streaming iterator over entries with keys in `[start, end)`.
    ///
    /// Loads one block at a time, so callers that stop early never pay for
    /// the rest of the range.
    pub fn range_iter(&self, start: &[u8], end: Option<&[u8]>) -> TableIter<'_> {
        let first = if self.meta.overlaps_range(start, end) {
            self.index
                .partition_point(|b| b.first_key.as_slice() <= start)
                .saturating_sub(1)
        } else {
            self.index.len()
        };
        TableIter {
            reader: self,
            block_idx: first,
            entries: Arc::new(Vec::new()),
            pos: 0,
            lower: Some(start.to_vec()),
            upper: end.map(|e| e.to_vec()),
        }
    }

    /// Mark the table for deletion once the last reference drops
    pub fn mark_retired(&self) {
        self.retired.store(true, Ordering::Release);
    }

    fn read_block(&self, idx: usize) -> Result<Arc<Vec<Entry>>> {
        let slot = &self.index[idx];
        if let Some(cached) = self.cache.read().get(&slot.offset) {
            return Ok(Arc::clone(cached));
        }

        let mut file = File::open(&self.data_path)?;
        let frame = read_section(&mut file, slot.offset, slot.len as u64)?;
        let entries = Arc::new(decode_block(&frame)?);

        let mut cache = self.cache.write();
        if cache.len() >= CACHE_BLOCKS {
            let oldest = *cache.keys().next().unwrap_or(&0);
            cache.remove(&oldest);
        }
        cache.insert(slot.offset, Arc::clone(&entries));
        Ok(entries)
    }
}

impl Drop for TableReader {
    fn drop(&mut self) {
        if self.retired.load(Ordering::Acquire) {
            if let Err(e) = fs::remove_dir_all(&self.meta.dir) {
                warn!(dir = %self.meta.dir.display(), error = %e, "failed to remove retired table");
            }
        }
    }
}

/// Iterator over a table's entries in key order, block by block.
///
/// With bounds set it skips entries below `lower` and ends at the first key
/// at or past `upper`.
pub struct TableIter<'a> {
    reader: &'a TableReader,
    block_idx: usize,
    entries: Arc<Vec<Entry>>,
    pos: usize,
    lower: Option<Vec<u8>>,
    upper: Option<Vec<u8>>,
}

impl Iterator for TableIter<'_> {
    type Item = Result<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.pos < self.entries.len() {
                let entry = self.entries[self.pos].clone();
                self.pos += 1;
                if let Some(lower) = &self.lower {
                    if entry.key < *lower {
                        continue;
                    }
                    // Sorted, so nothing later is below the bound either
                    self.lower = None;
                }
                if let Some(upper) = &self.upper {
                    if entry.key >= *upper {
                        self.exhaust();
                        return None;
                    }
                }
                return Some(Ok(entry));
            }
            if self.block_idx >= self.reader.index.len() {
                return None;
            }
            match self.reader.read_block(self.block_idx) {
                Ok(entries) => {
                    self.entries = entries;
                    self.pos = 0;
                    self.block_idx += 1;
                }
                Err(e) => {
                    self.exhaust();
                    return Some(Err(e));
                }
            }
        }
    }
}

impl TableIter<'_> {
    fn exhaust(&mut self) {
        self.block_idx = self.reader.index.len();
        self.pos = self.entries.len();
    }
}

fn read_sidecar(dir: &Path) -> Result<SidecarMeta> {
    let raw = fs::read(dir.join(META_FILE))?;
    let sidecar: SidecarMeta = serde_json::from_slice(&raw)
        .map_err(|e| StorageError::InvalidFormat(format!("unreadable sidecar: {e}")))?;

    if sidecar.format_version != FORMAT_VERSION {
        return Err(StorageError::UnsupportedFormatVersion {
            found: sidecar.format_version,
            supported: FORMAT_VERSION,
        });
    }
    if sidecar.schema_fingerprint != SCHEMA_FINGERPRINT {
        return Err(StorageError::SchemaMismatch {
            found: sidecar.schema_fingerprint,
            expected: SCHEMA_FINGERPRINT.to_string(),
        });
    }
    Ok(sidecar)
}

/// Hex SHA-256 of a file, read in chunks
pub(crate) fn sha256_hex(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().iter().map(|b| format!("{b:02x}")).collect())
}

fn read_section(file: &mut File, offset: u64, len: u64) -> Result<Vec<u8>> {
    file.seek(SeekFrom::Start(offset))?;
    let mut buf = vec![0u8; len as usize];
    file.read_exact(&mut buf)?;
    Ok(buf)
}

fn parse_index(data: &[u8]) -> Result<Vec<IndexEntry>> {
    let mut cursor = std::io::Cursor::new(data);
    if data.len() < 4 {
        return Err(StorageError::InvalidFormat("index section too short".into()));
    }
    let count = cursor.get_u32_le() as usize;
    let mut index = Vec::with_capacity(count);
    for _ in 0..count {
        if cursor.remaining() < 4 {
            return Err(StorageError::InvalidFormat("truncated index slot".into()));
        }
        let key_len = cursor.get_u32_le() as usize;
        if cursor.remaining() < key_len + 16 {
            return Err(StorageError::InvalidFormat("truncated index slot".into()));
        }
        let mut first_key = vec![0u8; key_len];
        cursor.copy_to_slice(&mut first_key);
        let offset = cursor.get_u64_le();
        let len = cursor.get_u32_le();
        let entry_count = cursor.get_u32_le();
        index.push(IndexEntry {
            first_key,
            offset,
            len,
            entry_count,
        });
    }
    Ok(index)
}

fn parse_range(data: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
    let mut cursor = std::io::Cursor::new(data);
    if data.len() < 8 {
        return Err(StorageError::InvalidFormat("range section too short".into()));
    }
    let min_len = cursor.get_u32_le() as usize;
    if cursor.remaining() < min_len + 4 {
        return Err(StorageError::InvalidFormat("truncated range section".into()));
    }
    let mut min_key = vec![0u8; min_len];
    cursor.copy_to_slice(&mut min_key);
    let max_len = cursor.get_u32_le() as usize;
    if cursor.remaining() < max_len {
        return Err(StorageError::InvalidFormat("truncated range section".into()));
    }
    let mut max_key = vec![0u8; max_len];
    cursor.copy_to_slice(&mut max_key);
    Ok((min_key, max_key))
}

fn parse_bloom(data: &[u8]) -> Result<BloomFilter> {
    let mut cursor = std::io::Cursor::new(data);
    if data.len() < 5 {
        return Err(StorageError::InvalidFormat("bloom section too short".into()));
    }
    let num_hashes = cursor.get_u8() as usize;
    let bits_len = cursor.get_u32_le() as usize;
    if cursor.remaining() < bits_len {
        return Err(StorageError::InvalidFormat("truncated bloom section".into()));
    }
    let mut bits = vec![0u8; bits_len];
    cursor.copy_to_slice(&mut bits);
    Ok(BloomFilter::from_bytes(bits, num_hashes))
}

fn decode_block(frame: &[u8]) -> Result<Vec<Entry>> {
    if frame.len() < 9 {
        return Err(StorageError::InvalidFormat("block frame too short".into()));
    }
    let mut cursor = std::io::Cursor::new(frame);
    let flag = cursor.get_u8();
    let payload_len = cursor.get_u32_le() as usize;
    if frame.len() < 9 + payload_len {
        return Err(StorageError::InvalidFormat("truncated block frame".into()));
    }

    let payload = &frame[5..5 + payload_len];
    let expected = {
        let mut c = std::io::Cursor::new(&frame[5 + payload_len..9 + payload_len]);
        c.get_u32_le()
    };
    let actual = crc32fast::hash(payload);
    if expected != actual {
        return Err(StorageError::ChecksumMismatch { expected, actual });
    }

    let serialized = if flag == 1 {
        lz4_flex::decompress_size_prepended(payload)
            .map_err(|e| StorageError::Corruption(format!("block decompression: {e}")))?
    } else {
        payload.to_vec()
    };

    bincode::deserialize(&serialized).map_err(|e| StorageError::InvalidFormat(e.to_string()))
}
