//! Core data types shared across the engine

use serde::{Deserialize, Serialize};

/// Monotonic sequence number assigned to every write
pub type SeqNo = u64;

/// A single versioned key-value record.
///
/// A `None` value is a tombstone: it shadows any older value for the same key
/// until compaction into the deepest level discards both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Record key
    pub key: Vec<u8>,
    /// Record value, `None` for tombstones
    pub value: Option<Vec<u8>>,
    /// Sequence number, higher wins
    pub seq: SeqNo,
}

impl Entry {
    /// Create a live entry
    pub fn put(key: Vec<u8>, value: Vec<u8>, seq: SeqNo) -> Self {
        Self {
            key,
            value: Some(value),
            seq,
        }
    }

    /// Create a tombstone entry
    pub fn tombstone(key: Vec<u8>, seq: SeqNo) -> Self {
        Self {
            key,
            value: None,
            seq,
        }
    }

    /// Whether this entry is a tombstone
    pub fn is_tombstone(&self) -> bool {
        self.value.is_none()
    }

    /// Approximate in-memory size in bytes
    pub fn size(&self) -> usize {
        self.key.len() + self.value.as_ref().map_or(0, |v| v.len()) + std::mem::size_of::<SeqNo>()
    }
}

/// On-disk levels of the tree. L1 holds freshly flushed tables and may
/// overlap; L2 and L3 are key-disjoint within themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Level {
    L1,
    L2,
    L3,
}

impl Level {
    /// All levels, shallowest first (read order)
    pub const ALL: [Level; 3] = [Level::L1, Level::L2, Level::L3];

    /// Zero-based array index for this level
    pub fn index(self) -> usize {
        match self {
            Level::L1 => 0,
            Level::L2 => 1,
            Level::L3 => 2,
        }
    }

    /// Level number as stored in table metadata
    pub fn number(self) -> u8 {
        self.index() as u8 + 1
    }

    /// Parse a stored level number
    pub fn from_number(n: u8) -> Option<Level> {
        match n {
            1 => Some(Level::L1),
            2 => Some(Level::L2),
            3 => Some(Level::L3),
            _ => None,
        }
    }

    /// The level a merge out of this level writes into. L3 merges into itself.
    pub fn target(self) -> Level {
        match self {
            Level::L1 => Level::L2,
            Level::L2 => Level::L3,
            Level::L3 => Level::L3,
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "L{}", self.number())
    }
}
