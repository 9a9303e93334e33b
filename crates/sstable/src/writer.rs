use anyhow::Context;
use memtable::Memtable;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use crate::block::DataBlock;
use crate::error::{Result, TableError};
use crate::format::{record_size, BlockHandle, Footer};
use crate::index::IndexBlock;
use crate::options::TableOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BuilderState {
    /// The file could not be created.
    Closed,
    Open,
    /// Hit an I/O error after opening. Still reported as open, but every
    /// call fails from here on.
    Failed,
    Finished,
}

/// Writes strictly ascending key/value pairs into a new table file.
///
/// Records are buffered into a [`DataBlock`] and streamed to disk whenever
/// the next record would carry the block past
/// [`TableOptions::block_size`]. [`finish`](SSTableBuilder::finish) writes the
/// last block, the index block, and the footer.
///
/// The file is created (or truncated) on open and closed when the builder
/// finishes, fails, or is dropped. A builder dropped before `finish` leaves
/// a prefix that no reader will accept.
pub struct SSTableBuilder {
    path: PathBuf,
    file: Option<File>,
    state: BuilderState,
    options: TableOptions,
    data_block: DataBlock,
    index: IndexBlock,
    last_key: Option<Vec<u8>>,
    /// Bytes written to `file` so far.
    offset: u64,
    num_entries: u64,
}

impl SSTableBuilder {
    /// Creates or truncates `path` and returns a builder ready for
    /// [`add`](SSTableBuilder::add).
    ///
    /// # Errors
    ///
    /// Returns [`TableError::Io`] if the file cannot be created.
    pub fn try_open<P: AsRef<Path>>(path: P, options: TableOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;
        Ok(Self::new(path, Some(file), options))
    }

    /// Like [`try_open`](SSTableBuilder::try_open), but never fails: a builder
    /// that could not open its file reports `is_open() == false` and rejects
    /// every call.
    pub fn open<P: AsRef<Path>>(path: P, options: TableOptions) -> Self {
        let path = path.as_ref();
        match Self::try_open(path, options) {
            Ok(builder) => builder,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot create sstable");
                Self::new(path.to_path_buf(), None, options)
            }
        }
    }

    fn new(path: PathBuf, file: Option<File>, options: TableOptions) -> Self {
        let state = if file.is_some() {
            BuilderState::Open
        } else {
            BuilderState::Closed
        };
        Self {
            path,
            file,
            state,
            options: options.with_block_size(options.block_size),
            data_block: DataBlock::new(),
            index: IndexBlock::new(),
            last_key: None,
            offset: 0,
            num_entries: 0,
        }
    }

    /// Flushes every entry of `mem`, in ascending key order, to a new table
    /// at `path`. Returns the final file size.
    pub fn write_from_memtable(
        path: &Path,
        mem: &Memtable,
        options: TableOptions,
    ) -> anyhow::Result<u64> {
        let mut builder = Self::try_open(path, options)
            .with_context(|| format!("creating sstable {}", path.display()))?;
        for (key, value) in mem.iter() {
            builder.add(key, value)?;
        }
        let size = builder
            .finish()
            .with_context(|| format!("finishing sstable {}", path.display()))?;
        Ok(size)
    }

    /// Appends one record.
    ///
    /// `key` must be strictly greater than every key added before it. A
    /// rejected record leaves the builder exactly as it was.
    ///
    /// # Errors
    ///
    /// - [`TableError::AlreadyFinished`] / [`TableError::NotOpen`] when the
    ///   builder no longer accepts writes.
    /// - [`TableError::OutOfOrder`] for a duplicate or descending key.
    /// - [`TableError::RecordTooLarge`] if the record cannot be encoded.
    /// - [`TableError::Io`] if flushing the previous block failed; the
    ///   builder is unusable afterwards.
    pub fn add(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.check_writable()?;

        if let Some(last) = &self.last_key {
            if key <= last.as_slice() {
                return Err(TableError::OutOfOrder {
                    key: key.to_vec(),
                    last: last.clone(),
                });
            }
        }

        let size = record_size(key, value);
        if key.len() > u32::MAX as usize
            || value.len() > u32::MAX as usize
            || size > u32::MAX as usize
        {
            return Err(TableError::RecordTooLarge(size));
        }

        if self
            .data_block
            .would_overflow(key, value, self.options.block_size)
        {
            self.flush_data_block()?;
        }

        self.data_block.add(self.offset, key, value);
        match &mut self.last_key {
            Some(last) => {
                last.clear();
                last.extend_from_slice(key);
            }
            None => self.last_key = Some(key.to_vec()),
        }
        self.num_entries += 1;
        Ok(())
    }

    /// Writes the pending data block, the index block and the footer, then
    /// closes the file. Returns the final file size.
    ///
    /// # Errors
    ///
    /// [`TableError::AlreadyFinished`] on a second call,
    /// [`TableError::NotOpen`] if the builder never opened or already
    /// failed, [`TableError::Io`] on write failure.
    pub fn finish(&mut self) -> Result<u64> {
        self.check_writable()?;
        self.flush_data_block()?;

        let index_bytes = self.index.encode();
        let index_size = u32::try_from(index_bytes.len())
            .map_err(|_| TableError::RecordTooLarge(index_bytes.len()))?;
        let footer = Footer::new(BlockHandle::new(self.offset, index_size));

        Self::append(&mut self.file, &mut self.offset, &index_bytes)
            .map_err(|e| self.degrade(e))?;
        Self::append(&mut self.file, &mut self.offset, &footer.encode())
            .map_err(|e| self.degrade(e))?;

        if let Some(file) = self.file.as_mut() {
            let synced = file.flush().and_then(|_| {
                if self.options.sync_on_finish {
                    file.sync_all()
                } else {
                    Ok(())
                }
            });
            if let Err(e) = synced {
                return Err(self.degrade(e.into()));
            }
        }

        self.file = None;
        self.state = BuilderState::Finished;
        info!(
            path = %self.path.display(),
            entries = self.num_entries,
            blocks = self.index.len(),
            bytes = self.offset,
            "sstable finished"
        );
        Ok(self.offset)
    }

    /// `true` once the file was created and until `finish` succeeds.
    ///
    /// A builder that hit an I/O error stays open but rejects every call;
    /// see [`is_failed`](SSTableBuilder::is_failed).
    pub fn is_open(&self) -> bool {
        matches!(self.state, BuilderState::Open | BuilderState::Failed)
    }

    /// `true` after a write error made the builder unusable.
    pub fn is_failed(&self) -> bool {
        self.state == BuilderState::Failed
    }

    pub fn is_finished(&self) -> bool {
        self.state == BuilderState::Finished
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn options(&self) -> &TableOptions {
        &self.options
    }

    /// Number of records accepted so far.
    pub fn num_entries(&self) -> u64 {
        self.num_entries
    }

    /// Number of data blocks written so far.
    pub fn num_blocks(&self) -> usize {
        self.index.len()
    }

    /// Bytes written to disk so far (buffered records not included).
    pub fn offset(&self) -> u64 {
        self.offset
    }

    fn check_writable(&self) -> Result<()> {
        match self.state {
            BuilderState::Open => Ok(()),
            BuilderState::Closed | BuilderState::Failed => Err(TableError::NotOpen),
            BuilderState::Finished => Err(TableError::AlreadyFinished),
        }
    }

    /// Writes the buffered block at its tagged offset and indexes it under
    /// its greatest key. No-op for an empty buffer.
    fn flush_data_block(&mut self) -> Result<()> {
        if self.data_block.is_empty() {
            return Ok(());
        }
        let handle = self.data_block.handle().map_err(|e| self.degrade(e))?;
        debug_assert_eq!(handle.offset, self.offset);

        Self::append(&mut self.file, &mut self.offset, self.data_block.data())
            .map_err(|e| self.degrade(e))?;

        debug!(
            offset = handle.offset,
            size = handle.size,
            entries = self.data_block.entries(),
            last_key_len = self.data_block.last_key().len(),
            "flushed data block"
        );
        self.index
            .insert(self.data_block.last_key().to_vec(), handle);
        self.data_block.clear();
        Ok(())
    }

    fn append(file: &mut Option<File>, offset: &mut u64, bytes: &[u8]) -> Result<()> {
        let file = file.as_mut().ok_or(TableError::NotOpen)?;
        file.write_all(bytes)?;
        *offset += bytes.len() as u64;
        Ok(())
    }

    /// Drops the file and refuses all further calls.
    fn degrade(&mut self, err: TableError) -> TableError {
        error!(path = %self.path.display(), error = %err, "sstable write failed");
        self.file = None;
        self.state = BuilderState::Failed;
        err
    }
}

impl Drop for SSTableBuilder {
    fn drop(&mut self) {
        if self.state == BuilderState::Open {
            warn!(
                path = %self.path.display(),
                "sstable builder dropped before finish; file is incomplete"
            );
        }
    }
}
