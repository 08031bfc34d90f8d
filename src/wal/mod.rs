//! Write-Ahead Log for durability
//!
//! Every write is appended to `wal.log` before it touches the MemTable. When
//! a MemTable is sealed for flushing, the log is sealed with it (renamed to
//! `wal.log.sealed`) and a fresh `wal.log` takes new appends, so removing the
//! sealed segment after its flush can never race a concurrent write. On clean
//! close both files are removed; either surviving at open time signals an
//! unclean shutdown.

mod reader;
mod record;
mod writer;

pub use reader::WalReader;
pub use record::WalRecord;
pub use writer::WalWriter;

use std::path::{Path, PathBuf};

/// WAL log file name inside the data directory
pub const WAL_FILE: &str = "wal.log";

/// Path of the sealed companion segment for a log file
pub(crate) fn sealed_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".sealed");
    PathBuf::from(name)
}

/// WAL sync policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPolicy {
    /// Sync after every write (most durable, slowest)
    Immediate,
    /// Sync every N writes
    EveryN(usize),
    /// Sync every N milliseconds
    Interval { millis: u64 },
    /// Let the OS decide (fastest, may lose recent writes on crash)
    None,
}

/// WAL configuration
#[derive(Debug, Clone)]
pub struct WalConfig {
    /// Path to the log file
    pub path: PathBuf,
    /// Sync policy
    pub sync_policy: SyncPolicy,
}

impl Default for WalConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data").join(WAL_FILE),
            sync_policy: SyncPolicy::Immediate,
        }
    }
}
