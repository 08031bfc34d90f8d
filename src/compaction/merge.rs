//! K-way merge over sorted entry streams

use crate::types::Entry;
use crate::Result;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

struct HeapItem {
    entry: Entry,
    source: usize,
}

impl Ord for HeapItem {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: reverse the key comparison so the
        // smallest key pops first. Among equal keys the highest sequence
        // number pops first; source index breaks exact ties.
        other
            .entry
            .key
            .cmp(&self.entry.key)
            .then(self.entry.seq.cmp(&other.entry.seq))
            .then(other.source.cmp(&self.source))
    }
}

impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for HeapItem {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapItem {}

/// Merges sorted fallible entry streams into one sorted, deduplicated stream.
/// For duplicate keys only the entry with the highest sequence number
/// survives.
pub struct MergeIterator<I: Iterator<Item = Result<Entry>>> {
    sources: Vec<I>,
    heap: BinaryHeap<HeapItem>,
}

impl<I: Iterator<Item = Result<Entry>>> MergeIterator<I> {
    pub fn new(mut sources: Vec<I>) -> Result<Self> {
        let mut heap = BinaryHeap::with_capacity(sources.len());
        for (source, iter) in sources.iter_mut().enumerate() {
            if let Some(entry) = iter.next().transpose()? {
                heap.push(HeapItem { entry, source });
            }
        }
        Ok(Self { sources, heap })
    }

    /// Next merged entry in ascending key order, or `None` when exhausted
    pub fn next_entry(&mut self) -> Result<Option<Entry>> {
        let Some(top) = self.heap.pop() else {
            return Ok(None);
        };
        self.advance(top.source)?;

        // Drain older versions of the same key
        while let Some(dup) = self.heap.peek() {
            if dup.entry.key != top.entry.key {
                break;
            }
            let dup = self.heap.pop().expect("peeked item present");
            self.advance(dup.source)?;
        }

        Ok(Some(top.entry))
    }

    fn advance(&mut self, source: usize) -> Result<()> {
        if let Some(entry) = self.sources[source].next().transpose()? {
            self.heap.push(HeapItem { entry, source });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(entries: Vec<Entry>) -> std::vec::IntoIter<Result<Entry>> {
        entries
            .into_iter()
            .map(Ok)
            .collect::<Vec<_>>()
            .into_iter()
    }

    fn drain<I: Iterator<Item = Result<Entry>>>(mut merge: MergeIterator<I>) -> Vec<Entry> {
        let mut out = Vec::new();
        while let Some(entry) = merge.next_entry().unwrap() {
            out.push(entry);
        }
        out
    }

    #[test]
    fn test_merge_sorted_order() {
        let a = source(vec![
            Entry::put(b"a".to_vec(), b"1".to_vec(), 1),
            Entry::put(b"c".to_vec(), b"3".to_vec(), 3),
        ]);
        let b = source(vec![
            Entry::put(b"b".to_vec(), b"2".to_vec(), 2),
            Entry::put(b"d".to_vec(), b"4".to_vec(), 4),
        ]);

        let merged = drain(MergeIterator::new(vec![a, b]).unwrap());
        let keys: Vec<_> = merged.iter().map(|e| e.key.clone()).collect();
        assert_eq!(
            keys,
            vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec(), b"d".to_vec()]
        );
    }

    #[test]
    fn test_highest_seq_wins() {
        let old = source(vec![
            Entry::put(b"key".to_vec(), b"old".to_vec(), 1),
            Entry::put(b"other".to_vec(), b"x".to_vec(), 2),
        ]);
        let new = source(vec![Entry::put(b"key".to_vec(), b"new".to_vec(), 5)]);

        let merged = drain(MergeIterator::new(vec![old, new]).unwrap());
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].value, Some(b"new".to_vec()));
        assert_eq!(merged[0].seq, 5);
    }

    #[test]
    fn test_tombstone_survives_merge() {
        let live = source(vec![Entry::put(b"key".to_vec(), b"value".to_vec(), 1)]);
        let dead = source(vec![Entry::tombstone(b"key".to_vec(), 2)]);

        let merged = drain(MergeIterator::new(vec![live, dead]).unwrap());
        assert_eq!(merged.len(), 1);
        assert!(merged[0].is_tombstone());
    }

    #[test]
    fn test_three_way_duplicates() {
        let a = source(vec![Entry::put(b"k".to_vec(), b"1".to_vec(), 1)]);
        let b = source(vec![Entry::put(b"k".to_vec(), b"2".to_vec(), 2)]);
        let c = source(vec![Entry::put(b"k".to_vec(), b"3".to_vec(), 3)]);

        let merged = drain(MergeIterator::new(vec![a, b, c]).unwrap());
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].seq, 3);
    }

    #[test]
    fn test_empty_sources() {
        let merged = drain(MergeIterator::new(vec![source(vec![]), source(vec![])]).unwrap());
        assert!(merged.is_empty());
    }

    #[test]
    fn test_error_propagates() {
        let bad: Vec<Result<Entry>> = vec![Err(crate::StorageError::Corruption("boom".into()))];
        let mut merge = MergeIterator::new(vec![bad.into_iter()]);
        assert!(merge.is_err() || merge.as_mut().unwrap().next_entry().is_err());
    }
}
