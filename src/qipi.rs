//! Point-lookup index
//!
//! One bucket per on-disk table, grouped by level and kept in the same order
//! as the level's table list. Each bucket shares the table's bloom filter, so
//! a lookup can rule a table out without touching its file. The index lives
//! next to the level membership inside one atomically swapped value, which
//! keeps a bucket from ever describing a table the level no longer has.

use crate::sstable::{BloomFilter, TableReader};
use crate::types::Level;
use std::sync::Arc;

/// Bloom handle for one table
#[derive(Clone)]
pub struct Bucket {
    table_id: u64,
    filter: Arc<BloomFilter>,
}

impl Bucket {
    pub fn table_id(&self) -> u64 {
        self.table_id
    }

    /// False only when the key is definitely absent from the table
    pub fn may_contain(&self, key: &[u8]) -> bool {
        self.filter.may_contain(key)
    }
}

/// Per-level bucket lists mirroring level membership
#[derive(Clone, Default)]
pub struct PointIndex {
    levels: [Vec<Bucket>; 3],
}

impl PointIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a level's buckets from its current table list. Bucket order
    /// mirrors table order so the read path can zip the two.
    pub fn rebuild_level(&mut self, level: Level, tables: &[Arc<TableReader>]) {
        self.levels[level.index()] = tables
            .iter()
            .map(|t| Bucket {
                table_id: t.meta().id,
                filter: t.bloom(),
            })
            .collect();
    }

    /// Buckets for a level, same order as the level's tables
    pub fn buckets(&self, level: Level) -> &[Bucket] {
        &self.levels[level.index()]
    }
}
