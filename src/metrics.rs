//! Lookup and maintenance counters.
//!
//! A [`MetricsCollector`] is an explicit instance handed to the engine at
//! construction. It carries no global state, so two engines in one process
//! never share counters.

use crate::types::Level;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Atomic counters recorded on the read and maintenance paths
#[derive(Debug, Default)]
pub struct MetricsCollector {
    total_lookups: AtomicU64,
    memtable_hits: AtomicU64,
    l1_hits: AtomicU64,
    l2_hits: AtomicU64,
    l3_hits: AtomicU64,
    misses: AtomicU64,
    bloom_rejections: AtomicU64,
    buckets_scanned: AtomicU64,
    buckets_skipped: AtomicU64,
    read_errors: AtomicU64,
    flushes: AtomicU64,
    compactions: AtomicU64,
}

impl MetricsCollector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_lookup(&self) {
        self.total_lookups.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_memtable_hit(&self) {
        self.memtable_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_level_hit(&self, level: Level) {
        let counter = match level {
            Level::L1 => &self.l1_hits,
            Level::L2 => &self.l2_hits,
            Level::L3 => &self.l3_hits,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// A bloom filter ruled out a bucket, so its table was not touched
    pub fn record_bloom_rejection(&self) {
        self.bloom_rejections.fetch_add(1, Ordering::Relaxed);
        self.buckets_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bucket_scanned(&self) {
        self.buckets_scanned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_read_error(&self) {
        self.read_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_flush(&self) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_compaction(&self) {
        self.compactions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn flushes(&self) -> u64 {
        self.flushes.load(Ordering::Relaxed)
    }

    pub fn compactions(&self) -> u64 {
        self.compactions.load(Ordering::Relaxed)
    }

    /// Point-in-time copy of all counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_lookups: self.total_lookups.load(Ordering::Relaxed),
            memtable_hits: self.memtable_hits.load(Ordering::Relaxed),
            l1_hits: self.l1_hits.load(Ordering::Relaxed),
            l2_hits: self.l2_hits.load(Ordering::Relaxed),
            l3_hits: self.l3_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            bloom_rejections: self.bloom_rejections.load(Ordering::Relaxed),
            buckets_scanned: self.buckets_scanned.load(Ordering::Relaxed),
            buckets_skipped: self.buckets_skipped.load(Ordering::Relaxed),
            read_errors: self.read_errors.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            compactions: self.compactions.load(Ordering::Relaxed),
        }
    }
}

/// Serializable view of the counters, for external collectors
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub total_lookups: u64,
    pub memtable_hits: u64,
    pub l1_hits: u64,
    pub l2_hits: u64,
    pub l3_hits: u64,
    pub misses: u64,
    pub bloom_rejections: u64,
    pub buckets_scanned: u64,
    pub buckets_skipped: u64,
    pub read_errors: u64,
    pub flushes: u64,
    pub compactions: u64,
}
