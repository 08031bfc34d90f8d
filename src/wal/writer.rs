//! WAL writer implementation

use super::{sealed_path, SyncPolicy, WalConfig, WalRecord};
use crate::Result;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::time::Instant;

/// Appends records to the log file.
///
/// Writes go straight to the file handle rather than through a `BufWriter`
/// so that `truncate` never races buffered bytes.
pub struct WalWriter {
    config: WalConfig,
    inner: Mutex<WalWriterInner>,
}

struct WalWriterInner {
    file: File,
    len: u64,
    writes_since_sync: usize,
    last_sync: Instant,
}

impl WalWriter {
    /// Open (or create) the log file for appending
    pub fn new(config: WalConfig) -> Result<Self> {
        if let Some(parent) = config.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.path)?;
        let len = file.metadata()?.len();

        let inner = WalWriterInner {
            file,
            len,
            writes_since_sync: 0,
            last_sync: Instant::now(),
        };

        Ok(Self {
            config,
            inner: Mutex::new(inner),
        })
    }

    /// Append a record, returning its offset in the log.
    ///
    /// When this returns under `SyncPolicy::Immediate`, the record is on disk.
    pub fn append(&self, record: &WalRecord) -> Result<u64> {
        let frame = record.encode()?;
        let mut inner = self.inner.lock();

        inner.file.write_all(&frame)?;
        let offset = inner.len;
        inner.len += frame.len() as u64;
        inner.writes_since_sync += 1;

        if self.should_sync(&inner) {
            inner.file.sync_all()?;
            inner.writes_since_sync = 0;
            inner.last_sync = Instant::now();
        }

        Ok(offset)
    }

    /// Force sync to disk
    pub fn sync(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.file.sync_all()?;
        inner.writes_since_sync = 0;
        inner.last_sync = Instant::now();
        Ok(())
    }

    /// Reset the log to zero length (after a successful flush)
    pub fn truncate(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.file.set_len(0)?;
        inner.file.sync_all()?;
        inner.len = 0;
        inner.writes_since_sync = 0;
        Ok(())
    }

    /// Seal the current log segment and start a fresh one.
    ///
    /// The active file is synced and renamed to its `.sealed` companion; new
    /// appends go to a fresh `wal.log`. The caller seals exactly when it seals
    /// a MemTable, so the sealed segment holds precisely the records that
    /// MemTable covers and can be deleted once that flush is durable.
    pub fn seal(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.file.sync_all()?;
        fs::rename(&self.config.path, sealed_path(&self.config.path))?;

        inner.file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.config.path)?;
        inner.len = 0;
        inner.writes_since_sync = 0;
        inner.last_sync = Instant::now();
        Ok(())
    }

    /// Remove the sealed segment after its MemTable has been flushed
    pub fn remove_sealed(&self) -> Result<()> {
        let _inner = self.inner.lock();
        remove_if_present(&sealed_path(&self.config.path))
    }

    /// Remove both log files on clean close. Missing files are fine.
    pub fn remove_log(&self) -> Result<()> {
        let _inner = self.inner.lock();
        remove_if_present(&self.config.path)?;
        remove_if_present(&sealed_path(&self.config.path))
    }

    /// Current log length in bytes
    pub fn len(&self) -> u64 {
        self.inner.lock().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when a sealed segment is waiting to be flushed
    pub fn has_sealed(&self) -> bool {
        sealed_path(&self.config.path).exists()
    }

    fn should_sync(&self, inner: &WalWriterInner) -> bool {
        match self.config.sync_policy {
            SyncPolicy::Immediate => true,
            SyncPolicy::EveryN(n) => inner.writes_since_sync >= n,
            SyncPolicy::Interval { millis } => {
                inner.last_sync.elapsed().as_millis() >= millis as u128
            }
            SyncPolicy::None => false,
        }
    }
}

fn remove_if_present(path: &std::path::Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
