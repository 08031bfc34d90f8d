//! LSM engine implementation
//!
//! Concurrency model: writes are serialized by a write mutex; `get` and
//! `scan` are lock-free apart from short read-locked handle clones (the
//! active MemTable, the sealed MemTable slot, the current `LevelSet`). A
//! full MemTable is sealed on the write path together with its WAL segment,
//! an O(1) handle swap, and handed to the background worker; the sealed
//! MemTable stays readable until the flushed table is published, so a write
//! acknowledged before a read began is always visible to it. Flush and
//! compaction both run on the worker thread and publish new level sets the
//! same clone-and-swap way. The bucket index is part of the `LevelSet`, so
//! filters and membership can never disagree.

use super::{EngineConfig, Stats};
use crate::compaction::{self, MergeIterator};
use crate::memtable::MemTable;
use crate::metrics::MetricsCollector;
use crate::qipi::PointIndex;
use crate::sstable::{TableBuilder, TableIter, TableReader};
use crate::types::{Entry, Level};
use crate::wal::{WalConfig, WalReader, WalRecord, WalWriter, WAL_FILE};
use crate::{Result, StorageError};
use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Subdirectory of the data dir holding table directories
const TABLES_DIR: &str = "tables";

/// Tables on disk plus the bucket index describing them. Published as one
/// immutable value behind a single `RwLock`.
#[derive(Clone)]
struct LevelSet {
    tables: [Vec<Arc<TableReader>>; 3],
    index: PointIndex,
}

impl LevelSet {
    fn empty() -> Self {
        Self {
            tables: [Vec::new(), Vec::new(), Vec::new()],
            index: PointIndex::new(),
        }
    }

    fn tables(&self, level: Level) -> &[Arc<TableReader>] {
        &self.tables[level.index()]
    }

    fn counts(&self) -> [usize; 3] {
        [
            self.tables[0].len(),
            self.tables[1].len(),
            self.tables[2].len(),
        ]
    }

    fn sizes(&self) -> [u64; 3] {
        let sum = |tables: &[Arc<TableReader>]| tables.iter().map(|t| t.meta().file_size).sum();
        [
            sum(&self.tables[0]),
            sum(&self.tables[1]),
            sum(&self.tables[2]),
        ]
    }

    fn key_counts(&self) -> [usize; 3] {
        let sum = |tables: &[Arc<TableReader>]| tables.iter().map(|t| t.meta().entry_count).sum();
        [
            sum(&self.tables[0]),
            sum(&self.tables[1]),
            sum(&self.tables[2]),
        ]
    }

    fn rebuild_index(&mut self, level: Level) {
        let tables = self.tables[level.index()].clone();
        self.index.rebuild_level(level, &tables);
    }
}

enum WorkerMsg {
    Flush,
    Trigger,
    Shutdown,
}

struct EngineInner {
    config: EngineConfig,
    metrics: Arc<MetricsCollector>,
    wal: WalWriter,
    memtable: RwLock<Arc<MemTable>>,
    /// Sealed MemTable awaiting flush. Readers consult it after the active
    /// MemTable and before the levels; it is cleared in the same critical
    /// section that publishes the flushed table, so its entries are visible
    /// somewhere at every instant.
    imm: RwLock<Option<Arc<MemTable>>>,
    levels: RwLock<Arc<LevelSet>>,
    /// Serializes put/delete/seal
    write_lock: Mutex<()>,
    /// Serializes flushes of the sealed MemTable
    flush_lock: Mutex<()>,
    /// Serializes compaction rounds
    compaction_lock: Mutex<()>,
    next_table_id: AtomicU64,
    next_memtable_id: AtomicU64,
    seq: AtomicU64,
    closed: AtomicBool,
    compaction_tx: Sender<WorkerMsg>,
}

/// Embedded ordered key-value store
pub struct LsmEngine {
    inner: Arc<EngineInner>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl LsmEngine {
    /// Open an engine with a fresh metrics collector
    pub fn open(config: EngineConfig) -> Result<Self> {
        Self::open_with_metrics(config, MetricsCollector::new())
    }

    /// Open an engine recording into the given collector.
    ///
    /// Loads surviving tables (directories that fail validation are skipped
    /// with a warning, never fatal), replays the log segments (a sealed one
    /// left by a crash mid-flush, then the active one) into a fresh MemTable
    /// and flushes it to L1 before truncating, then starts the background
    /// worker.
    pub fn open_with_metrics(
        config: EngineConfig,
        metrics: Arc<MetricsCollector>,
    ) -> Result<Self> {
        if config.memtable_size_mb == 0 {
            return Err(StorageError::Config(
                "memtable_size_mb must be positive".into(),
            ));
        }
        if config.table.block_size == 0 {
            return Err(StorageError::Config("block_size must be positive".into()));
        }

        let tables_dir = config.data_dir.join(TABLES_DIR);
        fs::create_dir_all(&tables_dir)?;

        let mut levels = LevelSet::empty();
        let mut max_table_id = 0u64;
        let mut max_seq = 0u64;
        for dir_entry in fs::read_dir(&tables_dir)? {
            let path = dir_entry?.path();
            if !path.is_dir() {
                continue;
            }
            if path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.contains(".corrupt"))
            {
                debug!(dir = %path.display(), "skipping quarantined table");
                continue;
            }
            match TableReader::open(&path) {
                Ok(reader) => {
                    let level = reader.meta().level;
                    max_table_id = max_table_id.max(reader.meta().id);
                    max_seq = max_seq.max(reader.meta().max_seq);
                    levels.tables[level.index()].push(Arc::new(reader));
                }
                Err(e) => {
                    warn!(dir = %path.display(), error = %e, "skipping unreadable table");
                }
            }
        }
        // L1 newest first; deeper levels by key range
        levels.tables[0].sort_by(|a, b| b.meta().id.cmp(&a.meta().id));
        for level in [Level::L2, Level::L3] {
            levels.tables[level.index()].sort_by(|a, b| a.meta().min_key.cmp(&b.meta().min_key));
        }
        for level in Level::ALL {
            levels.rebuild_index(level);
        }

        let wal_path = config.data_dir.join(WAL_FILE);
        let recovered = WalReader::new(&wal_path).replay()?;
        let wal = WalWriter::new(WalConfig {
            path: wal_path,
            sync_policy: config.sync_policy,
        })?;

        let (compaction_tx, compaction_rx) = crossbeam_channel::unbounded();
        let inner = Arc::new(EngineInner {
            config,
            metrics,
            wal,
            memtable: RwLock::new(Arc::new(MemTable::new(1))),
            imm: RwLock::new(None),
            levels: RwLock::new(Arc::new(levels)),
            write_lock: Mutex::new(()),
            flush_lock: Mutex::new(()),
            compaction_lock: Mutex::new(()),
            next_table_id: AtomicU64::new(max_table_id + 1),
            next_memtable_id: AtomicU64::new(1),
            seq: AtomicU64::new(max_seq),
            closed: AtomicBool::new(false),
            compaction_tx,
        });

        if !recovered.is_empty() {
            info!(records = recovered.len(), "replaying write-ahead log");
            let mem = MemTable::new(0);
            for record in recovered {
                inner.seq.fetch_max(record.seq, Ordering::SeqCst);
                mem.insert(Entry {
                    key: record.key,
                    value: record.value,
                    seq: record.seq,
                });
            }
            // Flush before truncating so recovery never narrows durability
            inner.flush_memtable(&mem)?;
            inner.wal.truncate()?;
            inner.wal.remove_sealed()?;
        }

        let worker = {
            let inner = Arc::clone(&inner);
            std::thread::Builder::new()
                .name("stratakv-compaction".into())
                .spawn(move || run_worker(inner, compaction_rx))?
        };
        // Pick up compaction debt left from the previous run
        let _ = inner.compaction_tx.send(WorkerMsg::Trigger);

        Ok(Self {
            inner,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Write a key-value pair
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.inner.write(key.to_vec(), Some(value.to_vec()))
    }

    /// Delete a key by writing a tombstone
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        self.inner.write(key.to_vec(), None)
    }

    /// Point lookup: MemTable first, then L1 newest-first, then L2, L3
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.inner.get(key)
    }

    /// Live key-value pairs with keys in `[start, end)`, ascending, at most
    /// `limit` of them. An empty `end` means unbounded.
    pub fn scan(&self, start: &[u8], end: &[u8], limit: usize) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        self.inner.scan(start, end, limit)
    }

    /// Flush buffered writes to L1. Synchronous: when this returns, the
    /// sealed and active MemTables have both been written out.
    pub fn flush(&self) -> Result<()> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(StorageError::Closed);
        }
        // Drain any seal already in flight, then seal and flush the rest
        self.inner.flush_imm()?;
        {
            let _guard = self.inner.write_lock.lock();
            self.inner.seal_locked()?;
        }
        self.inner.flush_imm()?;
        Ok(())
    }

    /// Run one synchronous compaction round. Returns whether a merge ran.
    pub fn compact(&self) -> Result<bool> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(StorageError::Closed);
        }
        self.inner.compact_round()
    }

    /// Size and maintenance counters
    pub fn get_stats(&self) -> Stats {
        self.inner.stats()
    }

    /// The engine's metrics collector
    pub fn metrics(&self) -> Arc<MetricsCollector> {
        Arc::clone(&self.inner.metrics)
    }

    /// Flush, stop the worker and remove the log files. After a clean close
    /// no log file remains. Idempotent.
    pub fn close(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        // Stop the worker first so the remaining flushes are ours alone
        let _ = self.inner.compaction_tx.send(WorkerMsg::Shutdown);
        if let Some(handle) = self.worker.lock().take() {
            let _ = handle.join();
        }
        self.inner.flush_imm()?;
        {
            let _guard = self.inner.write_lock.lock();
            self.inner.seal_locked()?;
        }
        self.inner.flush_imm()?;
        self.inner.wal.remove_log()?;
        info!("engine closed");
        Ok(())
    }
}

impl Drop for LsmEngine {
    fn drop(&mut self) {
        // No flush here: a dropped engine is indistinguishable from a crash
        // and recovery owns the WAL. Only stop the worker.
        if !self.inner.closed.swap(true, Ordering::SeqCst) {
            let _ = self.inner.compaction_tx.send(WorkerMsg::Shutdown);
        }
        if let Some(handle) = self.worker.lock().take() {
            let _ = handle.join();
        }
    }
}

impl EngineInner {
    fn tables_dir(&self) -> PathBuf {
        self.config.data_dir.join(TABLES_DIR)
    }

    fn memtable_limit(&self) -> usize {
        self.config.memtable_size_mb * 1024 * 1024
    }

    fn write(&self, key: Vec<u8>, value: Option<Vec<u8>>) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StorageError::Closed);
        }
        let _guard = self.write_lock.lock();

        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let record = WalRecord { seq, key, value };
        self.wal.append(&record)?;

        let WalRecord { seq, key, value } = record;
        let mem = self.memtable.read().clone();
        mem.insert(Entry { key, value, seq });

        // Sealing is an O(1) handle swap; the actual flush happens on the
        // worker thread. While a previous seal is still being flushed the
        // MemTable keeps absorbing writes past its limit.
        if mem.should_flush(self.memtable_limit()) && self.seal_locked()? {
            let _ = self.compaction_tx.send(WorkerMsg::Flush);
        }
        Ok(())
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.metrics.record_lookup();

        let mem = self.memtable.read().clone();
        if let Some(entry) = mem.get(key) {
            self.metrics.record_memtable_hit();
            return Ok(entry.value);
        }

        // A sealed MemTable holds acknowledged writes until its table lands
        let imm = self.imm.read().clone();
        if let Some(imm) = imm {
            if let Some(entry) = imm.get(key) {
                self.metrics.record_memtable_hit();
                return Ok(entry.value);
            }
        }

        let levels = self.levels.read().clone();
        for level in Level::ALL {
            let buckets = levels.index.buckets(level);
            for (table, bucket) in levels.tables(level).iter().zip(buckets) {
                if !bucket.may_contain(key) {
                    self.metrics.record_bloom_rejection();
                    continue;
                }
                self.metrics.record_bucket_scanned();
                match table.get(key) {
                    Ok(Some(entry)) => {
                        self.metrics.record_level_hit(level);
                        return Ok(entry.value);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        // One bad table must not take down the read path
                        self.metrics.record_read_error();
                        warn!(table = table.meta().id, error = %e, "table read failed, skipping");
                    }
                }
            }
        }

        self.metrics.record_miss();
        Ok(None)
    }

    fn scan(&self, start: &[u8], end: &[u8], limit: usize) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        // Pin the handles once; the scan sees a consistent snapshot even if
        // a flush or compaction lands mid-iteration
        let mem = self.memtable.read().clone();
        let imm = self.imm.read().clone();
        let levels = self.levels.read().clone();
        let end_bound = if end.is_empty() { None } else { Some(end) };

        // Heap merge over all sources, newest seq winning per key, stopping
        // as soon as `limit` live rows are out. Table sources stream one
        // block at a time, so a narrow limit over a wide range stays cheap.
        let mut sources: Vec<Box<dyn Iterator<Item = Result<Entry>> + '_>> = Vec::new();
        sources.push(Box::new(mem.range(start, end_bound).into_iter().map(Ok)));
        if let Some(imm) = &imm {
            sources.push(Box::new(imm.range(start, end_bound).into_iter().map(Ok)));
        }
        for level in Level::ALL {
            for table in levels.tables(level) {
                if !table.meta().overlaps_range(start, end_bound) {
                    continue;
                }
                sources.push(Box::new(TableRangeSource {
                    iter: table.range_iter(start, end_bound),
                    table_id: table.meta().id,
                    metrics: &self.metrics,
                }));
            }
        }

        let mut merge = MergeIterator::new(sources)?;
        let mut rows = Vec::new();
        while rows.len() < limit {
            match merge.next_entry()? {
                Some(entry) => {
                    if let Some(value) = entry.value {
                        rows.push((entry.key, value));
                    }
                }
                None => break,
            }
        }
        Ok(rows)
    }

    /// Seal the active MemTable and its WAL segment behind an O(1) handle
    /// swap. Caller holds the write lock. Returns false when there is
    /// nothing to seal or a previous seal is still being flushed.
    fn seal_locked(&self) -> Result<bool> {
        if self.imm.read().is_some() {
            return Ok(false);
        }
        let active = self.memtable.read().clone();
        if active.is_empty() {
            return Ok(false);
        }

        // Segment first: once the rename lands, the sealed log covers
        // exactly the sealed MemTable and new appends go to a fresh file
        self.wal.seal()?;
        *self.imm.write() = Some(active);
        let id = self.next_memtable_id.fetch_add(1, Ordering::SeqCst) + 1;
        *self.memtable.write() = Arc::new(MemTable::new(id));
        Ok(true)
    }

    /// Write the sealed MemTable out as an L1 table. Publishing the table
    /// and clearing the sealed slot happen in one critical section, so
    /// readers find every acknowledged write in the slot or in L1, never in
    /// neither. Returns false when no MemTable is sealed.
    fn flush_imm(&self) -> Result<bool> {
        let _guard = self.flush_lock.lock();
        let sealed = self.imm.read().clone();
        let Some(mem) = sealed else {
            return Ok(false);
        };

        let reader = self.build_l1_table(&mem)?;
        let meta = reader.meta().clone();

        // The table is durable; drop the sealed segment before clearing the
        // slot so a later seal can never rename over unflushed records
        self.wal.remove_sealed()?;

        {
            let mut guard = self.levels.write();
            let mut set = (**guard).clone();
            set.tables[Level::L1.index()].insert(0, reader);
            set.rebuild_index(Level::L1);
            *self.imm.write() = None;
            *guard = Arc::new(set);
        }

        self.metrics.record_flush();
        info!(
            table = meta.id,
            entries = meta.entry_count,
            bytes = meta.file_size,
            "flushed sealed memtable"
        );
        Ok(true)
    }

    /// Flush a recovered MemTable straight to L1 (open path, no seal)
    fn flush_memtable(&self, mem: &MemTable) -> Result<()> {
        let reader = self.build_l1_table(mem)?;
        let meta = reader.meta().clone();

        {
            let mut guard = self.levels.write();
            let mut set = (**guard).clone();
            set.tables[Level::L1.index()].insert(0, reader);
            set.rebuild_index(Level::L1);
            *guard = Arc::new(set);
        }

        self.metrics.record_flush();
        info!(
            table = meta.id,
            entries = meta.entry_count,
            bytes = meta.file_size,
            "flushed memtable"
        );
        Ok(())
    }

    /// Build one MemTable into a fully synced L1 table and reopen it
    fn build_l1_table(&self, mem: &MemTable) -> Result<Arc<TableReader>> {
        let id = self.next_table_id.fetch_add(1, Ordering::SeqCst);
        let dir = self.tables_dir().join(format!("sst_{id:020}"));

        let mut builder =
            TableBuilder::new(dir, id, Level::L1, mem.len(), self.config.table.clone())?;
        for entry in mem.iter_entries() {
            builder.add(entry)?;
        }
        let meta = builder.finish()?;
        Ok(Arc::new(TableReader::open(&meta.dir)?))
    }

    /// Run at most one merge. Returns whether anything was compacted.
    fn compact_round(&self) -> Result<bool> {
        let _guard = self.compaction_lock.lock();

        let snapshot = self.levels.read().clone();
        let Some(plan) =
            compaction::select_source(&self.config.compaction, snapshot.counts(), snapshot.sizes())
        else {
            return Ok(false);
        };

        // Source tables plus every target-level table their ranges touch
        let source: Vec<Arc<TableReader>> = match plan.source {
            Level::L1 | Level::L3 => snapshot.tables(plan.source).to_vec(),
            Level::L2 => snapshot
                .tables(Level::L2)
                .iter()
                .min_by_key(|t| t.meta().id)
                .cloned()
                .into_iter()
                .collect(),
        };
        if source.is_empty() {
            return Ok(false);
        }
        let mut inputs = source.clone();
        if plan.source != plan.target {
            for table in snapshot.tables(plan.target) {
                if source
                    .iter()
                    .any(|s| s.meta().overlaps_table(table.meta()))
                {
                    inputs.push(Arc::clone(table));
                }
            }
        }

        // Tombstones are final only once nothing deeper can hold the key
        let drop_tombstones = plan.target == Level::L3;
        let estimated: usize = inputs.iter().map(|t| t.meta().entry_count).sum();
        let id = self.next_table_id.fetch_add(1, Ordering::SeqCst);
        let dir = self.tables_dir().join(format!("sst_{id:020}"));
        let mut builder = TableBuilder::new(
            dir,
            id,
            plan.target,
            estimated,
            self.config.table.clone(),
        )?;

        let iters: Vec<_> = inputs.iter().map(|t| t.iter()).collect();
        let mut merge = match MergeIterator::new(iters) {
            Ok(merge) => merge,
            Err(e) => {
                let _ = builder.abandon();
                return Err(e);
            }
        };
        let merge_result: Result<()> = loop {
            match merge.next_entry() {
                Ok(Some(entry)) => {
                    if drop_tombstones && entry.is_tombstone() {
                        continue;
                    }
                    if let Err(e) = builder.add(entry) {
                        break Err(e);
                    }
                }
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            }
        };
        if let Err(e) = merge_result {
            let _ = builder.abandon();
            return Err(e);
        }

        let output = if builder.is_empty() {
            // Everything merged away (all inputs were tombstones)
            builder.abandon()?;
            None
        } else {
            let meta = builder.finish()?;
            Some(Arc::new(TableReader::open(&meta.dir)?))
        };

        let input_ids: HashSet<u64> = inputs.iter().map(|t| t.meta().id).collect();
        {
            let mut guard = self.levels.write();
            let mut set = (**guard).clone();
            for level in [plan.source, plan.target] {
                set.tables[level.index()].retain(|t| !input_ids.contains(&t.meta().id));
            }
            if let Some(out) = &output {
                let tables = &mut set.tables[plan.target.index()];
                tables.push(Arc::clone(out));
                tables.sort_by(|a, b| a.meta().min_key.cmp(&b.meta().min_key));
            }
            set.rebuild_index(plan.source);
            set.rebuild_index(plan.target);
            *guard = Arc::new(set);
        }

        // Inputs delete themselves once the last pinned snapshot lets go
        for table in &inputs {
            table.mark_retired();
        }
        self.metrics.record_compaction();
        info!(
            source = %plan.source,
            target = %plan.target,
            inputs = inputs.len(),
            output = output.as_ref().map(|t| t.meta().id),
            "compaction round complete"
        );
        Ok(true)
    }

    fn stats(&self) -> Stats {
        const MB: f64 = 1024.0 * 1024.0;
        let mem = self.memtable.read().clone();
        let imm = self.imm.read().clone();
        let levels = self.levels.read().clone();

        let sizes = levels.sizes();
        let counts = levels.counts();
        let keys = levels.key_counts();
        let table_bytes: u64 = sizes.iter().sum();

        // A sealed MemTable still counts as buffered until its table lands
        let mem_bytes = mem.approx_size() + imm.as_ref().map_or(0, |m| m.approx_size());
        let mem_keys = mem.len() + imm.as_ref().map_or(0, |m| m.len());

        Stats {
            total_size_mb: (mem_bytes as u64 + table_bytes) as f64 / MB,
            memtable_size_mb: mem_bytes as f64 / MB,
            memtable_keys: mem_keys,
            l1_sstables: counts[0],
            l2_sstables: counts[1],
            l3_sstables: counts[2],
            l1_size_mb: sizes[0] as f64 / MB,
            l2_size_mb: sizes[1] as f64 / MB,
            l3_size_mb: sizes[2] as f64 / MB,
            l1_keys: keys[0],
            l2_keys: keys[1],
            l3_keys: keys[2],
            flushes: self.metrics.flushes(),
            compactions: self.metrics.compactions(),
        }
    }
}

/// Range source over one table that degrades to empty on a read error, so a
/// bad table cannot take down a scan
struct TableRangeSource<'a> {
    iter: TableIter<'a>,
    table_id: u64,
    metrics: &'a MetricsCollector,
}

impl Iterator for TableRangeSource<'_> {
    type Item = Result<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.iter.next() {
            Some(Err(e)) => {
                self.metrics.record_read_error();
                warn!(table = self.table_id, error = %e, "table scan failed, skipping");
                None
            }
            other => other,
        }
    }
}

fn run_worker(inner: Arc<EngineInner>, rx: Receiver<WorkerMsg>) {
    while let Ok(msg) = rx.recv() {
        match msg {
            WorkerMsg::Shutdown => break,
            WorkerMsg::Flush => {
                flush_with_backoff(&inner);
                compact_all(&inner);
            }
            WorkerMsg::Trigger => compact_all(&inner),
        }
    }
    debug!("background worker stopped");
}

/// Flush the sealed MemTable, retrying transient failures (a full disk,
/// typically) until the flush lands or the engine closes. Writes keep
/// landing in the WAL and the active MemTable throughout.
fn flush_with_backoff(inner: &EngineInner) {
    let mut backoff = Duration::from_millis(50);
    loop {
        if inner.closed.load(Ordering::SeqCst) {
            return;
        }
        match inner.flush_imm() {
            Ok(_) => return,
            Err(e) if e.is_retryable() => {
                warn!(error = %e, "flush failed, retrying");
                std::thread::sleep(backoff);
                backoff = (backoff * 2).min(Duration::from_secs(1));
            }
            Err(e) => {
                // The sealed MemTable and its WAL segment stay put; the
                // data remains readable and recoverable
                error!(error = %e, "flush failed");
                return;
            }
        }
    }
}

fn compact_all(inner: &EngineInner) {
    let mut backoff = Duration::from_millis(50);
    let mut attempts = 0u32;
    loop {
        match inner.compact_round() {
            // A finished merge may have pushed the next level over its
            // trigger
            Ok(true) => {
                attempts = 0;
                backoff = Duration::from_millis(50);
            }
            Ok(false) => break,
            Err(e) if e.is_retryable() && attempts < 5 => {
                attempts += 1;
                warn!(error = %e, attempts, "compaction round failed, retrying");
                std::thread::sleep(backoff);
                backoff = (backoff * 2).min(Duration::from_secs(1));
            }
            Err(e) => {
                error!(error = %e, "compaction round failed");
                break;
            }
        }
    }
}
