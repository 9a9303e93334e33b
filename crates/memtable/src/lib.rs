//! # Memtable
//!
//! An in-memory, sorted, mutable write buffer.
//!
//! The memtable buffers recent writes in a `BTreeMap` until the owning engine
//! decides to persist them as an immutable table file. The table builder only
//! ever sees it through [`Memtable::iter`], which yields entries in ascending
//! key order.
//!
//! ## Key properties
//! - **Sorted order**: entries are always in ascending key order.
//! - **Last write wins**: `put` on an existing key replaces its value.
//! - **Approximate size tracking**: key bytes + value bytes + a fixed per-entry
//!   node overhead, used for flush threshold decisions.
//!
//! ## Example
//! ```rust
//! use memtable::Memtable;
//!
//! let mut m = Memtable::new();
//! m.put(b"hello".to_vec(), b"world".to_vec());
//! assert_eq!(m.get(b"hello"), Some(b"world".as_slice()));
//!
//! m.put(b"hello".to_vec(), b"there".to_vec());
//! assert_eq!(m.get(b"hello"), Some(b"there".as_slice()));
//! ```

use std::collections::BTreeMap;

/// Estimated bookkeeping cost of one `BTreeMap` entry, in bytes.
pub const ENTRY_OVERHEAD: usize = 64;

/// An ordered, in-memory write buffer backed by a `BTreeMap`.
#[derive(Debug, Default)]
pub struct Memtable {
    map: BTreeMap<Vec<u8>, Vec<u8>>,
    approx_size: usize,
}

impl Memtable {
    /// Creates a new, empty memtable.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a key-value pair, replacing any previous value for `key`.
    ///
    /// `approx_size` is adjusted by the difference between the old and new
    /// value lengths on overwrite, or grows by key + value + overhead for a
    /// new key.
    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        let added = value.len();
        match self.map.get_mut(&key) {
            Some(old) => {
                self.approx_size = self.approx_size.saturating_sub(old.len());
                *old = value;
            }
            None => {
                self.approx_size = self
                    .approx_size
                    .saturating_add(key.len() + ENTRY_OVERHEAD);
                self.map.insert(key, value);
            }
        }
        self.approx_size = self.approx_size.saturating_add(added);
    }

    /// Returns the value stored for `key`, if any.
    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.map.get(key).map(Vec::as_slice)
    }

    /// Returns an iterator over all entries in **ascending key order**.
    ///
    /// This is the only view a table builder needs.
    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &[u8])> {
        self.map.iter().map(|(k, v)| (k.as_slice(), v.as_slice()))
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns `true` if the memtable contains zero entries.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Returns `true` if the memtable contains the given key.
    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.map.contains_key(key)
    }

    /// Returns the approximate memory footprint in bytes.
    ///
    /// The owning engine compares this against its flush threshold. It counts
    /// key and value bytes plus [`ENTRY_OVERHEAD`] per entry; allocator slack
    /// is not tracked.
    pub fn approx_size(&self) -> usize {
        self.approx_size
    }

    /// Removes all entries and resets `approx_size` to zero.
    pub fn clear(&mut self) {
        self.map.clear();
        self.approx_size = 0;
    }
}
