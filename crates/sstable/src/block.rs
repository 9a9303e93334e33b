//! Data blocks: the in-memory accumulator used while building, and the
//! record scan used when reading one back.

use crate::error::{Result, TableError};
use crate::format::{decode_record, encode_record, record_size, BlockHandle};

/// Records buffered for the data block currently being filled.
///
/// The block's file offset is tagged when its first record arrives, so the
/// handle is known even though the bytes hit disk only at flush time.
#[derive(Debug, Default)]
pub struct DataBlock {
    buf: Vec<u8>,
    last_key: Vec<u8>,
    offset: u64,
    entries: usize,
}

impl DataBlock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    /// Encoded size of the buffered records.
    pub fn size(&self) -> usize {
        self.buf.len()
    }

    pub fn entries(&self) -> usize {
        self.entries
    }

    /// Returns `true` if appending this record would carry a non-empty block
    /// past `threshold`.
    pub fn would_overflow(&self, key: &[u8], value: &[u8], threshold: usize) -> bool {
        !self.is_empty() && self.buf.len() + record_size(key, value) > threshold
    }

    /// Appends a record. The first record of a block fixes its offset.
    pub fn add(&mut self, offset: u64, key: &[u8], value: &[u8]) {
        if self.is_empty() {
            self.offset = offset;
        }
        encode_record(&mut self.buf, key, value);
        self.last_key.clear();
        self.last_key.extend_from_slice(key);
        self.entries += 1;
    }

    pub fn data(&self) -> &[u8] {
        &self.buf
    }

    /// Greatest (most recently added) key in the block.
    pub fn last_key(&self) -> &[u8] {
        &self.last_key
    }

    /// Handle for the buffered bytes at the tagged offset.
    pub fn handle(&self) -> Result<BlockHandle> {
        let size =
            u32::try_from(self.buf.len()).map_err(|_| TableError::RecordTooLarge(self.buf.len()))?;
        Ok(BlockHandle::new(self.offset, size))
    }

    /// Empties the buffer, keeping its allocation.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.last_key.clear();
        self.entries = 0;
    }
}

/// Iterator over the records of an encoded block.
///
/// Yields borrowed `(key, value)` slices. After the first decode error it
/// yields that error once and then stops.
pub struct BlockIter<'a> {
    rest: &'a [u8],
    failed: bool,
}

impl<'a> BlockIter<'a> {
    pub fn new(block: &'a [u8]) -> Self {
        Self {
            rest: block,
            failed: false,
        }
    }
}

impl<'a> Iterator for BlockIter<'a> {
    type Item = Result<(&'a [u8], &'a [u8])>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.rest.is_empty() {
            return None;
        }
        let item = decode_record(&mut self.rest);
        if item.is_err() {
            self.failed = true;
        }
        Some(item)
    }
}

/// Linear scan of a sorted block for `key`.
///
/// Stops at the first record whose key is greater than `key`, since no later
/// record can match.
pub fn find_in_block<'a>(block: &'a [u8], key: &[u8]) -> Result<Option<&'a [u8]>> {
    for record in BlockIter::new(block) {
        let (k, v) = record?;
        match k.cmp(key) {
            std::cmp::Ordering::Equal => return Ok(Some(v)),
            std::cmp::Ordering::Greater => return Ok(None),
            std::cmp::Ordering::Less => {}
        }
    }
    Ok(None)
}
