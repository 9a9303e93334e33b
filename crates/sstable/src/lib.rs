//! # SSTable — Sorted String Table
//!
//! Immutable, block-indexed table files: the persistence unit of a
//! log-structured storage engine.
//!
//! An [`SSTableBuilder`] accepts strictly ascending key/value pairs (usually
//! by draining a [`memtable::Memtable`]) and streams them to disk in data
//! blocks. An [`SSTableReader`] loads the footer and index eagerly and then
//! answers point lookups with one index search and one block read.
//! Tables are **write-once, read-many**.
//!
//! ## File layout
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │ DATA BLOCK 0 .. N-1                                  │
//! │                                                      │
//! │ key_len (u32) | key | val_len (u32) | val            │
//! │ ... repeated, ascending keys, no padding ...         │
//! ├──────────────────────────────────────────────────────┤
//! │ INDEX BLOCK (one record per data block)              │
//! │                                                      │
//! │ key_len (u32) | last_key | 12 (u32) | BlockHandle    │
//! ├──────────────────────────────────────────────────────┤
//! │ FOOTER (always last 20 bytes)                        │
//! │                                                      │
//! │ index_offset (u64) | index_size (u32) | magic (u64)  │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! All integers are little-endian. A [`BlockHandle`] is `offset (u64) |
//! size (u32)`. Blocks carry no header; their bounds come only from the
//! handle pointing at them.
//!
//! ## Example
//!
//! ```rust
//! use sstable::{SSTableBuilder, SSTableReader, TableOptions};
//!
//! # fn main() -> sstable::Result<()> {
//! let dir = tempfile::tempdir()?;
//! let path = dir.path().join("000001.sst");
//!
//! let mut builder = SSTableBuilder::try_open(&path, TableOptions::default())?;
//! builder.add(b"apple", b"red")?;
//! builder.add(b"banana", b"yellow")?;
//! builder.finish()?;
//!
//! let reader = SSTableReader::open(&path);
//! assert_eq!(reader.get(b"banana"), Some(b"yellow".to_vec()));
//! assert_eq!(reader.get(b"cherry"), None);
//! # Ok(())
//! # }
//! ```

mod block;
mod error;
mod format;
mod index;
mod options;
mod reader;
mod writer;

pub use block::{find_in_block, BlockIter, DataBlock};
pub use error::{Result, TableError};
pub use format::{
    decode_record, encode_record, record_size, BlockHandle, Footer, BLOCK_HANDLE_BYTES,
    FOOTER_BYTES, SSTABLE_MAGIC,
};
pub use index::IndexBlock;
pub use options::{TableOptions, DEFAULT_BLOCK_SIZE, DEMO_BLOCK_SIZE, MAX_BLOCK_SIZE};
pub use reader::SSTableReader;
pub use writer::SSTableBuilder;
