//! Background compaction
//!
//! Merge policy: L1 accumulates whole flushed MemTables and may hold
//! overlapping tables; once it grows past its trigger, all of L1 plus the
//! overlapping part of L2 merge into L2. L2 spills its oldest table (plus
//! overlap) into L3 the same way, and an oversized L3 merges onto itself.
//! Tombstones are dropped only when the merge output lands in L3; anywhere
//! shallower they must keep shadowing older versions of the key.

mod merge;

pub use merge::MergeIterator;

use crate::types::Level;

const MB: u64 = 1024 * 1024;

/// Compaction trigger thresholds. These are tunables, not laws; the defaults
/// keep read amplification low for workloads that fit a few gigabytes.
#[derive(Debug, Clone)]
pub struct CompactionConfig {
    /// Merge L1 into L2 at this many tables
    pub l1_trigger_tables: usize,
    /// ... or at this total size (MB)
    pub l1_trigger_mb: u64,
    /// Merge the oldest L2 table into L3 at this many tables
    pub l2_trigger_tables: usize,
    /// ... or at this total size (MB)
    pub l2_trigger_mb: u64,
    /// Self-merge L3 at this many tables
    pub l3_trigger_tables: usize,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            l1_trigger_tables: crate::defaults::L1_COMPACTION_TRIGGER,
            l1_trigger_mb: 64,
            l2_trigger_tables: 8,
            l2_trigger_mb: 256,
            l3_trigger_tables: 8,
        }
    }
}

/// One scheduled merge: which level is over its trigger and where its
/// output goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct MergePlan {
    pub source: Level,
    pub target: Level,
}

/// Pick the shallowest level over its trigger, if any
pub(crate) fn select_source(
    config: &CompactionConfig,
    counts: [usize; 3],
    sizes: [u64; 3],
) -> Option<MergePlan> {
    if counts[0] >= config.l1_trigger_tables || sizes[0] >= config.l1_trigger_mb * MB {
        return Some(MergePlan {
            source: Level::L1,
            target: Level::L2,
        });
    }
    if counts[1] >= config.l2_trigger_tables || sizes[1] >= config.l2_trigger_mb * MB {
        return Some(MergePlan {
            source: Level::L2,
            target: Level::L3,
        });
    }
    if counts[2] >= config.l3_trigger_tables {
        return Some(MergePlan {
            source: Level::L3,
            target: Level::L3,
        });
    }
    None
}
