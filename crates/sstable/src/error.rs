use std::io;

use thiserror::Error;

/// Errors produced while building, opening, or reading an SSTable.
#[derive(Debug, Error)]
pub enum TableError {
    /// Underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A key was not strictly greater than the previously added key.
    #[error("key {key:?} is not greater than previous key {last:?}")]
    OutOfOrder { key: Vec<u8>, last: Vec<u8> },

    /// The builder has already written its footer.
    #[error("table already finished")]
    AlreadyFinished,

    /// The builder never opened its file or gave up after an I/O error, or the
    /// reader failed to load its index.
    #[error("table is not open")]
    NotOpen,

    /// A length does not fit the u32 fields of the on-disk format.
    #[error("record too large: {0} bytes")]
    RecordTooLarge(usize),

    #[error("file too small to hold a footer: {size} bytes")]
    FileTooSmall { size: u64 },

    #[error("bad magic number: {found:#018x}")]
    BadMagic { found: u64 },

    /// A decode ran past the end of its input.
    #[error("truncated {what}: need {needed} bytes, have {available}")]
    Truncated {
        what: &'static str,
        needed: usize,
        available: usize,
    },

    /// Structurally invalid contents not covered by a more specific variant.
    #[error("corrupt table: {0}")]
    Corrupt(&'static str),

    /// A block handle points outside the data region of the file.
    #[error("block handle out of range: offset {offset}, size {size}")]
    InvalidHandle { offset: u64, size: u32 },
}

impl TableError {
    /// Returns `true` for errors caused by damaged or foreign file contents.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            TableError::FileTooSmall { .. }
                | TableError::BadMagic { .. }
                | TableError::Truncated { .. }
                | TableError::Corrupt(_)
                | TableError::InvalidHandle { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, TableError>;
