//! Storage engine - coordinates WAL, MemTable, tables and compaction

mod lsm;

pub use lsm::LsmEngine;

use crate::compaction::CompactionConfig;
use crate::sstable::TableConfig;
use crate::wal::SyncPolicy;
use serde::Serialize;
use std::path::PathBuf;

/// Engine configuration. Every recognized option lives here; unknown knobs
/// are a compile error, not a silently ignored dictionary key.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Data directory, created if missing
    pub data_dir: PathBuf,
    /// MemTable size limit in MB before flush
    pub memtable_size_mb: usize,
    /// WAL durability policy
    pub sync_policy: SyncPolicy,
    /// Table build options
    pub table: TableConfig,
    /// Compaction trigger thresholds
    pub compaction: CompactionConfig,
}

impl EngineConfig {
    pub fn new<P: Into<PathBuf>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            memtable_size_mb: crate::defaults::MEMTABLE_SIZE_MB,
            sync_policy: SyncPolicy::Immediate,
            table: TableConfig::default(),
            compaction: CompactionConfig::default(),
        }
    }
}

/// Point-in-time view of engine size and maintenance counters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stats {
    /// MemTable plus all table files, in MB
    pub total_size_mb: f64,
    /// Approximate MemTable size in MB
    pub memtable_size_mb: f64,
    /// Keys currently buffered in the MemTable
    pub memtable_keys: usize,
    pub l1_sstables: usize,
    pub l2_sstables: usize,
    pub l3_sstables: usize,
    pub l1_size_mb: f64,
    pub l2_size_mb: f64,
    pub l3_size_mb: f64,
    pub l1_keys: usize,
    pub l2_keys: usize,
    pub l3_keys: usize,
    /// MemTable flushes since open
    pub flushes: u64,
    /// Completed compaction rounds since open
    pub compactions: u64,
}
