//! SSTable builder
//!
//! Consumes entries in ascending key order and streams them into `data.bin`:
//!
//! ```text
//! [magic][version]                        header
//! [flag][len][payload][crc32] ...         data blocks
//! [count][first_key,offset,len,entries]*  sparse index
//! [min_key][max_key]                      key range
//! [num_hashes][bits]                      bloom filter
//! [entry_count][max_seq][section offsets][magic]   footer
//! ```
//!
//! Every byte is fed through a SHA-256 hasher as it is written; the digest
//! lands in the `metadata.json` sidecar, which is written last (tmp + rename)
//! so a readable sidecar implies a complete data file.

use super::{
    BloomFilter, IndexEntry, SidecarMeta, TableConfig, TableMeta, DATA_FILE, FORMAT_VERSION,
    MAGIC, META_FILE, SCHEMA_FINGERPRINT,
};
use crate::types::{Entry, Level, SeqNo};
use crate::{Result, StorageError};
use bytes::{BufMut, BytesMut};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

/// Streaming table writer
pub struct TableBuilder {
    config: TableConfig,
    dir: PathBuf,
    id: u64,
    level: Level,
    writer: BufWriter<File>,
    hasher: Sha256,
    offset: u64,
    blocks: Vec<IndexEntry>,
    bloom: BloomFilter,
    current: Vec<Entry>,
    current_bytes: usize,
    entry_count: u64,
    max_seq: SeqNo,
    min_key: Option<Vec<u8>>,
    max_key: Vec<u8>,
}

impl TableBuilder {
    /// Start a new table in `dir`. `estimated_keys` sizes the bloom filter.
    pub fn new(
        dir: PathBuf,
        id: u64,
        level: Level,
        estimated_keys: usize,
        config: TableConfig,
    ) -> Result<Self> {
        fs::create_dir_all(&dir)?;
        let file = File::create(dir.join(DATA_FILE))?;
        let bloom = BloomFilter::new(estimated_keys.max(1), config.bloom_bits_per_key);

        let mut builder = Self {
            config,
            dir,
            id,
            level,
            writer: BufWriter::new(file),
            hasher: Sha256::new(),
            offset: 0,
            blocks: Vec::new(),
            bloom,
            current: Vec::new(),
            current_bytes: 0,
            entry_count: 0,
            max_seq: 0,
            min_key: None,
            max_key: Vec::new(),
        };

        let mut header = BytesMut::with_capacity(8);
        header.put_slice(MAGIC);
        header.put_u32_le(FORMAT_VERSION);
        builder.emit(&header)?;

        Ok(builder)
    }

    /// Append an entry. Keys must arrive in strictly ascending order.
    pub fn add(&mut self, entry: Entry) -> Result<()> {
        if entry.key <= self.max_key && self.entry_count > 0 {
            return Err(StorageError::InvalidFormat(format!(
                "keys out of order: {:?} after {:?}",
                entry.key, self.max_key
            )));
        }

        self.bloom.add(&entry.key);
        if self.min_key.is_none() {
            self.min_key = Some(entry.key.clone());
        }
        self.max_key = entry.key.clone();
        self.max_seq = self.max_seq.max(entry.seq);
        self.entry_count += 1;

        self.current_bytes += entry.size();
        self.current.push(entry);

        if self.current_bytes >= self.config.block_size {
            self.write_block()?;
        }
        Ok(())
    }

    /// Whether nothing has been added yet
    pub fn is_empty(&self) -> bool {
        self.entry_count == 0
    }

    /// Finish the table: flush the last block, write index, range, bloom,
    /// footer and the sidecar. Returns the table's metadata.
    pub fn finish(mut self) -> Result<TableMeta> {
        if self.is_empty() {
            return Err(StorageError::InvalidFormat(
                "cannot finish an empty table".into(),
            ));
        }
        if !self.current.is_empty() {
            self.write_block()?;
        }

        // Sparse index
        let index_offset = self.offset;
        let mut buf = BytesMut::new();
        buf.put_u32_le(self.blocks.len() as u32);
        for block in &self.blocks {
            buf.put_u32_le(block.first_key.len() as u32);
            buf.put_slice(&block.first_key);
            buf.put_u64_le(block.offset);
            buf.put_u32_le(block.len);
            buf.put_u32_le(block.entry_count);
        }
        self.emit(&buf)?;
        let index_size = self.offset - index_offset;

        // Key range
        let range_offset = self.offset;
        let min_key = self.min_key.clone().unwrap_or_default();
        let mut buf = BytesMut::new();
        buf.put_u32_le(min_key.len() as u32);
        buf.put_slice(&min_key);
        buf.put_u32_le(self.max_key.len() as u32);
        buf.put_slice(&self.max_key);
        self.emit(&buf)?;
        let range_size = self.offset - range_offset;

        // Bloom filter
        let bloom_offset = self.offset;
        let mut buf = BytesMut::new();
        buf.put_u8(self.bloom.num_hashes() as u8);
        buf.put_u32_le(self.bloom.as_bytes().len() as u32);
        buf.put_slice(self.bloom.as_bytes());
        self.emit(&buf)?;
        let bloom_size = self.offset - bloom_offset;

        // Footer
        let mut buf = BytesMut::with_capacity(68);
        buf.put_u64_le(self.entry_count);
        buf.put_u64_le(self.max_seq);
        buf.put_u64_le(index_offset);
        buf.put_u64_le(index_size);
        buf.put_u64_le(range_offset);
        buf.put_u64_le(range_size);
        buf.put_u64_le(bloom_offset);
        buf.put_u64_le(bloom_size);
        buf.put_slice(MAGIC);
        self.emit(&buf)?;

        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;

        let digest = self.hasher.finalize();
        let checksum: String = digest.iter().map(|b| format!("{b:02x}")).collect();

        let sidecar = SidecarMeta {
            format_version: FORMAT_VERSION,
            checksum,
            schema_fingerprint: SCHEMA_FINGERPRINT.to_string(),
            table_id: self.id,
            level: self.level.number(),
            entry_count: self.entry_count,
        };
        let tmp = self.dir.join(format!("{META_FILE}.tmp"));
        let json = serde_json::to_vec_pretty(&sidecar)
            .map_err(|e| StorageError::InvalidFormat(e.to_string()))?;
        fs::write(&tmp, json)?;
        fs::rename(&tmp, self.dir.join(META_FILE))?;

        Ok(TableMeta {
            dir: self.dir,
            id: self.id,
            level: self.level,
            entry_count: self.entry_count as usize,
            file_size: self.offset,
            max_seq: self.max_seq,
            min_key,
            max_key: self.max_key,
        })
    }

    /// Discard the partially written table and remove its directory
    pub fn abandon(self) -> Result<()> {
        drop(self.writer);
        fs::remove_dir_all(&self.dir)?;
        Ok(())
    }

    fn write_block(&mut self) -> Result<()> {
        let entries = std::mem::take(&mut self.current);
        self.current_bytes = 0;

        let first_key = entries[0].key.clone();
        let entry_count = entries.len() as u32;
        let serialized = bincode::serialize(&entries)
            .map_err(|e| StorageError::InvalidFormat(e.to_string()))?;

        let (flag, payload) = if self.config.compression {
            (1u8, lz4_flex::compress_prepend_size(&serialized))
        } else {
            (0u8, serialized)
        };

        let mut buf = BytesMut::with_capacity(payload.len() + 9);
        buf.put_u8(flag);
        buf.put_u32_le(payload.len() as u32);
        buf.put_slice(&payload);
        buf.put_u32_le(crc32fast::hash(&payload));

        let offset = self.offset;
        self.emit(&buf)?;
        self.blocks.push(IndexEntry {
            first_key,
            offset,
            len: buf.len() as u32,
            entry_count,
        });
        Ok(())
    }

    fn emit(&mut self, data: &[u8]) -> Result<()> {
        self.writer.write_all(data)?;
        self.hasher.update(data);
        self.offset += data.len() as u64;
        Ok(())
    }
}
