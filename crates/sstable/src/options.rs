/// Default data block threshold in bytes.
pub const DEFAULT_BLOCK_SIZE: usize = 4 * 1024;

/// Largest usable threshold: a block's size must fit the u32 field of its
/// handle.
pub const MAX_BLOCK_SIZE: usize = u32::MAX as usize;

/// Tiny threshold useful for exercising block splits with a handful of keys.
pub const DEMO_BLOCK_SIZE: usize = 128;

/// Knobs for [`SSTableBuilder`](crate::SSTableBuilder).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableOptions {
    /// A data block is cut before a record that would push it past this many
    /// bytes. A single record larger than this still gets a block of its own.
    pub block_size: usize,
    /// Call `sync_all` on the file before `finish` returns.
    pub sync_on_finish: bool,
}

impl TableOptions {
    /// Sets the block threshold, capped at [`MAX_BLOCK_SIZE`].
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size.min(MAX_BLOCK_SIZE);
        self
    }

    pub fn with_sync_on_finish(mut self, sync: bool) -> Self {
        self.sync_on_finish = sync;
        self
    }
}

impl Default for TableOptions {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            sync_on_finish: true,
        }
    }
}
