//! Memtable - In-memory sorted write buffer
//!
//! Holds recent writes until they are flushed to an SSTable. Keys are kept in
//! a BTreeMap so a flush can stream them out in sorted order.

use std::collections::BTreeMap;
use std::ops::Bound;

/// Entry value in the memtable
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemtableEntry {
    /// A live value
    Value(Vec<u8>),
    /// A live value that replaced a deletion of the same key.
    ///
    /// Only produced once the database reaches
    /// [`FormatMajorVersion::SetWithDelete`](rungkv_core::FormatMajorVersion::SetWithDelete).
    SetWithDelete(Vec<u8>),
    /// A tombstone marking deletion
    Tombstone,
}

impl MemtableEntry {
    /// Bytes this entry accounts for
    pub fn size(&self) -> usize {
        match self {
            MemtableEntry::Value(v) | MemtableEntry::SetWithDelete(v) => v.len() + 1,
            MemtableEntry::Tombstone => 1,
        }
    }

    /// The live value, or `None` for a tombstone
    pub fn value(&self) -> Option<&[u8]> {
        match self {
            MemtableEntry::Value(v) | MemtableEntry::SetWithDelete(v) => Some(v.as_slice()),
            MemtableEntry::Tombstone => None,
        }
    }
}

/// In-memory sorted write buffer
#[derive(Debug, Default)]
pub struct Memtable {
    data: BTreeMap<Vec<u8>, MemtableEntry>,
    size_bytes: u64,
    /// Sequence number of the last write applied
    sequence: u64,
}

impl Memtable {
    /// Empty memtable starting at sequence zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new Memtable whose sequence continues from `sequence`
    pub fn with_sequence(sequence: u64) -> Self {
        Self {
            sequence,
            ..Self::default()
        }
    }

    /// Inserts or updates a key-value pair.
    ///
    /// When `set_with_delete` is true and the key currently holds a
    /// tombstone, the write is recorded as [`MemtableEntry::SetWithDelete`].
    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>, set_with_delete: bool) {
        let shadows_delete = matches!(self.data.get(&key), Some(MemtableEntry::Tombstone));
        let entry = if set_with_delete && shadows_delete {
            MemtableEntry::SetWithDelete(value)
        } else {
            MemtableEntry::Value(value)
        };
        self.insert(key, entry);
    }

    /// Marks a key as deleted with a tombstone
    pub fn delete(&mut self, key: Vec<u8>) {
        self.insert(key, MemtableEntry::Tombstone);
    }

    fn insert(&mut self, key: Vec<u8>, entry: MemtableEntry) {
        let key_size = key.len() as u64;
        let new_size = entry.size() as u64;
        if let Some(old) = self.data.insert(key, entry) {
            self.size_bytes -= key_size + old.size() as u64;
        }
        self.size_bytes += key_size + new_size;
        self.sequence += 1;
    }

    /// Retrieves an entry by key
    pub fn get(&self, key: &[u8]) -> Option<&MemtableEntry> {
        self.data.get(key)
    }

    /// Returns the approximate size of the memtable in bytes
    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// Returns the number of entries in the memtable
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the memtable is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the sequence number of the last write
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Entries in key order
    pub fn iter(&self) -> impl Iterator<Item = (&Vec<u8>, &MemtableEntry)> {
        self.data.iter()
    }

    /// Returns an iterator over keys in `[start, end)`; `None` is unbounded
    pub fn range<'a>(
        &'a self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
    ) -> impl Iterator<Item = (&'a Vec<u8>, &'a MemtableEntry)> {
        // An inverted range is empty rather than a panic.
        let end = match (start, end) {
            (Some(s), Some(e)) if e < s => Some(s),
            _ => end,
        };
        let lower = start.map_or(Bound::Unbounded, |s| Bound::Included(s.to_vec()));
        let upper = end.map_or(Bound::Unbounded, |e| Bound::Excluded(e.to_vec()));
        self.data.range((lower, upper))
    }

    /// Consume the memtable, yielding entries in key order
    pub fn drain(self) -> impl Iterator<Item = (Vec<u8>, MemtableEntry)> {
        self.data.into_iter()
    }
}
