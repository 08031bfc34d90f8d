//! In-memory write buffer
//!
//! A concurrent ordered map holding the newest version of each recently
//! written key. Readers share the table through an `Arc`; the engine swaps in
//! a fresh one at flush time while old readers finish against the retired
//! handle.

use crate::types::{Entry, SeqNo};
use crossbeam_skiplist::SkipMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};

/// MemTable backed by a lock-free skip list
pub struct MemTable {
    id: u64,
    map: SkipMap<Vec<u8>, Entry>,
    /// Approximate, only grows; replaced entries keep their old contribution
    /// until the table is flushed and dropped
    size_bytes: AtomicUsize,
}

impl MemTable {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            map: SkipMap::new(),
            size_bytes: AtomicUsize::new(0),
        }
    }

    /// Insert an entry, overwriting any older version of the key
    pub fn insert(&self, entry: Entry) {
        self.size_bytes.fetch_add(entry.size(), Ordering::Relaxed);
        self.map.insert(entry.key.clone(), entry);
    }

    /// Look up the newest entry for a key. A tombstone is returned as-is so
    /// the caller can stop searching older levels.
    pub fn get(&self, key: &[u8]) -> Option<Entry> {
        self.map.get(key).map(|e| e.value().clone())
    }

    /// Entries with keys in `[start, end)`, ascending. An empty/`None` end
    /// bound means unbounded.
    pub fn range(&self, start: &[u8], end: Option<&[u8]>) -> Vec<Entry> {
        let upper = match end {
            Some(end) => Bound::Excluded(end),
            None => Bound::Unbounded,
        };
        self.map
            .range::<[u8], _>((Bound::Included(start), upper))
            .map(|e| e.value().clone())
            .collect()
    }

    /// All entries in ascending key order (flush path)
    pub fn iter_entries(&self) -> Vec<Entry> {
        self.map.iter().map(|e| e.value().clone()).collect()
    }

    /// Highest sequence number in the table, 0 if empty
    pub fn max_seq(&self) -> SeqNo {
        self.map.iter().map(|e| e.value().seq).max().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Approximate memory footprint in bytes
    pub fn approx_size(&self) -> usize {
        self.size_bytes.load(Ordering::Relaxed)
    }

    /// Whether the table has reached the flush threshold
    pub fn should_flush(&self, limit: usize) -> bool {
        self.approx_size() >= limit
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let mem = MemTable::new(1);
        mem.insert(Entry::put(b"alpha".to_vec(), b"1".to_vec(), 1));
        mem.insert(Entry::put(b"beta".to_vec(), b"2".to_vec(), 2));

        assert_eq!(mem.get(b"alpha").unwrap().value, Some(b"1".to_vec()));
        assert!(mem.get(b"missing").is_none());
        assert_eq!(mem.len(), 2);
    }

    #[test]
    fn test_overwrite_keeps_newest() {
        let mem = MemTable::new(1);
        mem.insert(Entry::put(b"key".to_vec(), b"old".to_vec(), 1));
        mem.insert(Entry::put(b"key".to_vec(), b"new".to_vec(), 2));

        let entry = mem.get(b"key").unwrap();
        assert_eq!(entry.value, Some(b"new".to_vec()));
        assert_eq!(entry.seq, 2);
        assert_eq!(mem.len(), 1);
    }

    #[test]
    fn test_tombstone_visible() {
        let mem = MemTable::new(1);
        mem.insert(Entry::put(b"key".to_vec(), b"value".to_vec(), 1));
        mem.insert(Entry::tombstone(b"key".to_vec(), 2));

        assert!(mem.get(b"key").unwrap().is_tombstone());
    }

    #[test]
    fn test_range_bounds() {
        let mem = MemTable::new(1);
        for (i, key) in [b"a", b"b", b"c", b"d"].iter().enumerate() {
            mem.insert(Entry::put(key.to_vec(), b"v".to_vec(), i as u64 + 1));
        }

        let entries = mem.range(b"b", Some(b"d"));
        let keys: Vec<_> = entries.iter().map(|e| e.key.clone()).collect();
        assert_eq!(keys, vec![b"b".to_vec(), b"c".to_vec()]);

        let open_ended = mem.range(b"c", None);
        assert_eq!(open_ended.len(), 2);
    }

    #[test]
    fn test_iter_sorted() {
        let mem = MemTable::new(1);
        mem.insert(Entry::put(b"zeta".to_vec(), b"v".to_vec(), 1));
        mem.insert(Entry::put(b"alpha".to_vec(), b"v".to_vec(), 2));
        mem.insert(Entry::put(b"mu".to_vec(), b"v".to_vec(), 3));

        let keys: Vec<_> = mem.iter_entries().into_iter().map(|e| e.key).collect();
        assert_eq!(keys, vec![b"alpha".to_vec(), b"mu".to_vec(), b"zeta".to_vec()]);
        assert_eq!(mem.max_seq(), 3);
    }

    #[test]
    fn test_size_tracking() {
        let mem = MemTable::new(1);
        assert_eq!(mem.approx_size(), 0);
        assert!(!mem.should_flush(1));

        mem.insert(Entry::put(b"key".to_vec(), vec![0u8; 100], 1));
        assert!(mem.approx_size() >= 100);
        assert!(mem.should_flush(50));
        assert!(!mem.should_flush(10_000));
    }
}
