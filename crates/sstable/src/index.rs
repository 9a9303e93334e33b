//! The index block: each data block's greatest key mapped to its handle.
//!
//! The builder fills it one entry per flushed block and writes it as an
//! ordinary block whose values are encoded [`BlockHandle`]s. The reader
//! decodes it back into the same structure at open time.

use std::collections::BTreeMap;
use std::ops::Bound;

use crate::block::BlockIter;
use crate::error::{Result, TableError};
use crate::format::{encode_record, BlockHandle, BLOCK_HANDLE_BYTES};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IndexBlock {
    entries: BTreeMap<Vec<u8>, BlockHandle>,
}

impl IndexBlock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `handle` as the block whose greatest key is `last_key`.
    pub fn insert(&mut self, last_key: Vec<u8>, handle: BlockHandle) {
        self.entries.insert(last_key, handle);
    }

    /// Returns the only block that could hold `key`: the first one whose
    /// greatest key is not less than `key`.
    ///
    /// `None` means `key` is greater than every key in the table.
    pub fn find_block(&self, key: &[u8]) -> Option<(&[u8], BlockHandle)> {
        self.entries
            .range::<[u8], _>((Bound::Included(key), Bound::Unbounded))
            .next()
            .map(|(k, h)| (k.as_slice(), *h))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Block last-keys in ascending order.
    pub fn keys(&self) -> impl Iterator<Item = &[u8]> {
        self.entries.keys().map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &BlockHandle)> {
        self.entries.iter().map(|(k, h)| (k.as_slice(), h))
    }

    /// Serializes all entries, in ascending key order, as one block.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        for (key, handle) in &self.entries {
            encode_record(&mut buf, key, &handle.encode());
        }
        buf
    }

    /// Parses an encoded index block.
    ///
    /// Every value must be exactly one handle and keys must be strictly
    /// ascending; anything else is corruption.
    pub fn decode(block: &[u8]) -> Result<Self> {
        let mut entries = BTreeMap::new();
        let mut prev: Option<&[u8]> = None;
        for record in BlockIter::new(block) {
            let (key, mut value) = record?;
            if value.len() != BLOCK_HANDLE_BYTES {
                return Err(TableError::Corrupt("index value is not a block handle"));
            }
            if prev.is_some_and(|p| p >= key) {
                return Err(TableError::Corrupt("index keys out of order"));
            }
            let handle = BlockHandle::decode_from(&mut value)?;
            entries.insert(key.to_vec(), handle);
            prev = Some(key);
        }
        Ok(Self { entries })
    }

    /// Fails if any handle reaches past `limit` (the start of the footer,
    /// or of the index block for data handles).
    pub fn check_bounds(&self, limit: u64) -> Result<()> {
        for handle in self.entries.values() {
            if handle.end() > limit {
                return Err(TableError::InvalidHandle {
                    offset: handle.offset,
                    size: handle.size,
                });
            }
        }
        Ok(())
    }
}
