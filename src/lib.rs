//! StrataKV - Embedded Ordered Key-Value Storage Engine
//!
//! An LSM-tree storage engine for applications that need fast sequenced
//! writes and ordered range scans without an external database process.
//!
//! # Architecture
//!
//! - **WAL (Write-Ahead Log)**: every write is durable before it is
//!   acknowledged; a surviving `wal.log` is replayed at open
//! - **MemTable**: concurrent in-memory skip list buffering recent writes
//! - **SSTables**: immutable sorted table directories on disk, three levels
//!   deep, each carrying a validated metadata sidecar
//! - **Compaction**: background merging that bounds read amplification and
//!   eventually discards deleted keys
//! - **Point index**: per-level bloom buckets that let a lookup skip tables
//!   that cannot contain the key
//!
//! # Example
//!
//! ```no_run
//! use stratakv::{EngineConfig, LsmEngine};
//!
//! # fn main() -> stratakv::Result<()> {
//! let engine = LsmEngine::open(EngineConfig::new("data"))?;
//! engine.put(b"user:1", b"alice")?;
//! assert_eq!(engine.get(b"user:1")?, Some(b"alice".to_vec()));
//! engine.close()?;
//! # Ok(())
//! # }
//! ```

pub mod compaction;
pub mod engine;
pub mod integrity;
pub mod memtable;
pub mod metrics;
pub mod qipi;
pub mod sstable;
pub mod wal;

mod error;
mod types;

pub use engine::{EngineConfig, LsmEngine, Stats};
pub use error::{Result, StorageError};
pub use metrics::{MetricsCollector, MetricsSnapshot};
pub use types::{Entry, Level, SeqNo};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values
pub mod defaults {
    /// MemTable size before flush (MB)
    pub const MEMTABLE_SIZE_MB: usize = 64;

    /// SSTable block size (4KB)
    pub const BLOCK_SIZE: usize = 4 * 1024;

    /// L1 tables before compaction into L2
    pub const L1_COMPACTION_TRIGGER: usize = 4;

    /// Bloom filter bits per key (~1% false positives)
    pub const BLOOM_BITS_PER_KEY: usize = 10;
}
