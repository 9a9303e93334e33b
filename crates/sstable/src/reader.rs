use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, warn};

use crate::block::find_in_block;
use crate::error::{Result, TableError};
use crate::format::{footer_pos, read_block, read_footer, BlockHandle, Footer};
use crate::index::IndexBlock;

/// Reads a finished table file for point lookups.
///
/// On [`open`](SSTableReader::open) the footer and the whole **index block**
/// are loaded into memory. A lookup then costs one in-memory index search
/// plus one block read.
///
/// The reader owns its file handle for its whole lifetime. Lookups take
/// turns on the handle's cursor, so a reader can be shared across threads,
/// though concurrent lookups on one reader are serialized. Readers opened
/// separately on the same path never contend.
///
/// A reader whose footer or index fails to load is *invalid*: it holds no
/// file handle and every [`get`](SSTableReader::get) returns `None`.
pub struct SSTableReader {
    path: PathBuf,
    table: Option<LoadedTable>,
}

struct LoadedTable {
    file: Mutex<File>,
    file_size: u64,
    footer: Footer,
    index: IndexBlock,
}

impl LoadedTable {
    fn load(path: &Path) -> Result<Self> {
        let mut file = File::open(path)?;
        let file_size = file.metadata()?.len();

        let footer = read_footer(&mut file, file_size)?;
        let index_handle = footer.index_handle;
        if index_handle.end() > footer_pos(file_size) {
            return Err(TableError::InvalidHandle {
                offset: index_handle.offset,
                size: index_handle.size,
            });
        }

        let index_bytes = read_block(&mut file, &index_handle)?;
        let index = IndexBlock::decode(&index_bytes)?;
        // Data blocks all precede the index block.
        index.check_bounds(index_handle.offset)?;

        debug!(
            path = %path.display(),
            blocks = index.len(),
            bytes = file_size,
            "loaded sstable index"
        );
        Ok(Self {
            file: Mutex::new(file),
            file_size,
            footer,
            index,
        })
    }

    fn read_block(&self, handle: &BlockHandle) -> Result<Vec<u8>> {
        // Every read seeks first, so a panic mid-read leaves nothing to undo.
        let file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        read_block(&mut &*file, handle)
    }
}

impl SSTableReader {
    /// Opens `path` and loads its footer and index.
    ///
    /// # Validation
    ///
    /// - The file must be at least 20 bytes (footer size).
    /// - The footer magic must equal `0xDEAD_BEEF_CAFE_F00D`.
    /// - The index block must lie before the footer, decode cleanly, and
    ///   point only at bytes before itself.
    ///
    /// # Errors
    ///
    /// Returns the first I/O or format error hit while loading.
    pub fn try_open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let table = LoadedTable::load(&path)?;
        Ok(Self {
            path,
            table: Some(table),
        })
    }

    /// Like [`try_open`](SSTableReader::try_open), but a load failure yields an
    /// invalid reader instead of an error.
    pub fn open<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match Self::try_open(path) {
            Ok(reader) => reader,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot load sstable");
                Self {
                    path: path.to_path_buf(),
                    table: None,
                }
            }
        }
    }

    /// `true` if the footer and index loaded successfully.
    pub fn is_valid(&self) -> bool {
        self.table.is_some()
    }

    /// Point lookup. Read and decode errors count as not found.
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        match self.try_get(key) {
            Ok(value) => value,
            Err(e) if e.is_corruption() => {
                warn!(path = %self.path.display(), error = %e, "corrupt sstable block");
                None
            }
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "sstable lookup failed");
                None
            }
        }
    }

    /// Point lookup that reports why a lookup could not complete.
    ///
    /// 1. Find the first index entry whose key is not less than `key`. If
    ///    there is none, `key` is past the end of the table.
    /// 2. Read that block from disk.
    /// 3. Scan it until the key matches or a greater key shows up.
    ///
    /// # Errors
    ///
    /// [`TableError::NotOpen`] on an invalid reader, otherwise any I/O or
    /// decode error from the block read.
    pub fn try_get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let table = self.table.as_ref().ok_or(TableError::NotOpen)?;
        let Some((_, handle)) = table.index.find_block(key) else {
            return Ok(None);
        };
        let block = table.read_block(&handle)?;
        Ok(find_in_block(&block, key)?.map(<[u8]>::to_vec))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of data blocks (index entries). Zero for an invalid reader.
    pub fn block_count(&self) -> usize {
        self.table.as_ref().map_or(0, |t| t.index.len())
    }

    pub fn footer(&self) -> Option<&Footer> {
        self.table.as_ref().map(|t| &t.footer)
    }

    pub fn file_size(&self) -> Option<u64> {
        self.table.as_ref().map(|t| t.file_size)
    }

    /// Greatest key of each data block, ascending.
    pub fn index_keys(&self) -> impl Iterator<Item = &[u8]> {
        self.table.iter().flat_map(|t| t.index.keys())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::FOOTER_BYTES;
    use crate::options::TableOptions;
    use crate::SSTableBuilder;
    use anyhow::Result;
    use tempfile::tempdir;

    fn build(path: &Path, block_size: usize, pairs: &[(&str, &str)]) -> Result<()> {
        let opts = TableOptions::default()
            .with_block_size(block_size)
            .with_sync_on_finish(false);
        let mut b = SSTableBuilder::try_open(path, opts)?;
        for (k, v) in pairs {
            b.add(k.as_bytes(), v.as_bytes())?;
        }
        b.finish()?;
        Ok(())
    }

    // -------------------- Basic open & get --------------------

    #[test]
    fn open_and_get_entries() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("sample.sst");
        build(&path, 1, &[("a", "apple"), ("b", "banana"), ("c", "")])?;

        let reader = SSTableReader::try_open(&path)?;
        assert!(reader.is_valid());
        assert_eq!(reader.block_count(), 3);

        assert_eq!(reader.get(b"a"), Some(b"apple".to_vec()));
        assert_eq!(reader.get(b"b"), Some(b"banana".to_vec()));
        assert_eq!(reader.get(b"c"), Some(Vec::new()));
        assert_eq!(reader.get(b"nope"), None);
        Ok(())
    }

    #[test]
    fn index_keys_are_block_last_keys() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("keys.sst");
        // 10-byte records, two per 20-byte block.
        build(&path, 20, &[("a", "1"), ("b", "2"), ("c", "3"), ("d", "4"), ("e", "5")])?;

        let reader = SSTableReader::try_open(&path)?;
        let keys: Vec<_> = reader.index_keys().collect();
        assert_eq!(keys, vec![&b"b"[..], &b"d"[..], &b"e"[..]]);
        Ok(())
    }

    #[test]
    fn multiple_gets_same_reader() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("multi.sst");

        let pairs: Vec<(String, String)> = (0..100u32)
            .map(|i| (format!("k{:03}", i), format!("v{}", i)))
            .collect();
        let refs: Vec<(&str, &str)> = pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        build(&path, 64, &refs)?;

        let reader = SSTableReader::try_open(&path)?;
        assert!(reader.block_count() > 1);
        for _ in 0..2 {
            for (k, v) in &pairs {
                assert_eq!(reader.get(k.as_bytes()), Some(v.clone().into_bytes()));
            }
        }
        Ok(())
    }

    #[test]
    fn large_value_roundtrip() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("bigval.sst");

        let big = vec![b'x'; 500_000];
        let mut b = SSTableBuilder::try_open(&path, TableOptions::default())?;
        b.add(b"big", &big)?;
        b.finish()?;

        let reader = SSTableReader::try_open(&path)?;
        assert_eq!(reader.get(b"big").map(|v| v.len()), Some(500_000));
        Ok(())
    }

    #[test]
    fn empty_table_is_valid_and_empty() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("empty.sst");
        build(&path, 128, &[])?;

        let reader = SSTableReader::try_open(&path)?;
        assert!(reader.is_valid());
        assert_eq!(reader.block_count(), 0);
        assert_eq!(reader.file_size(), Some(FOOTER_BYTES as u64));
        assert!(reader.get(b"").is_none());
        Ok(())
    }

    #[test]
    fn one_reader_shared_by_threads() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("shared.sst");
        let pairs: Vec<(String, String)> = (0..200u32)
            .map(|i| (format!("k{:03}", i), format!("v{}", i)))
            .collect();
        let refs: Vec<(&str, &str)> = pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        build(&path, 64, &refs)?;

        let reader = SSTableReader::try_open(&path)?;
        std::thread::scope(|s| {
            for t in 0..4 {
                let reader = &reader;
                let pairs = &pairs;
                s.spawn(move || {
                    for (k, v) in pairs.iter().skip(t) {
                        assert_eq!(reader.get(k.as_bytes()), Some(v.clone().into_bytes()));
                    }
                });
            }
        });
        Ok(())
    }

    // -------------------- Validation errors --------------------

    #[test]
    fn open_file_too_small() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tiny.sst");
        std::fs::write(&path, b"short").unwrap();

        assert!(matches!(
            SSTableReader::try_open(&path),
            Err(TableError::FileTooSmall { size: 5 })
        ));
        let reader = SSTableReader::open(&path);
        assert!(!reader.is_valid());
        assert!(reader.get(b"short").is_none());
        let err = reader.try_get(b"x").unwrap_err();
        assert!(matches!(err, TableError::NotOpen));
        assert!(!err.is_corruption());
    }

    #[test]
    fn open_bad_magic() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("badmagic.sst");
        std::fs::write(&path, [0u8; FOOTER_BYTES]).unwrap();

        assert!(matches!(
            SSTableReader::try_open(&path),
            Err(TableError::BadMagic { found: 0 })
        ));
    }

    #[test]
    fn open_nonexistent_file() {
        let dir = tempdir().unwrap();
        let reader = SSTableReader::open(dir.path().join("no_such_file.sst"));
        assert!(!reader.is_valid());
        assert_eq!(reader.block_count(), 0);
        assert!(reader.footer().is_none());
        assert_eq!(reader.index_keys().count(), 0);
    }

    #[test]
    fn index_handle_past_footer_is_rejected() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("badindex.sst");

        let mut bytes = b"0123456789".to_vec();
        bytes.extend_from_slice(&Footer::new(BlockHandle::new(4, 100)).encode());
        std::fs::write(&path, &bytes)?;

        assert!(matches!(
            SSTableReader::try_open(&path),
            Err(TableError::InvalidHandle { offset: 4, size: 100 })
        ));
        Ok(())
    }

    #[test]
    fn corrupt_data_block_reads_as_missing() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("rot.sst");
        build(&path, 1, &[("a", "1"), ("b", "2")])?;

        // Inflate the key length of the first record ("a" block at offset 0).
        let mut bytes = std::fs::read(&path)?;
        bytes[..4].copy_from_slice(&1000u32.to_le_bytes());
        std::fs::write(&path, &bytes)?;

        let reader = SSTableReader::try_open(&path)?;
        assert!(reader.is_valid());
        assert!(reader.get(b"a").is_none());
        assert!(reader.try_get(b"a").unwrap_err().is_corruption());
        assert_eq!(reader.get(b"b"), Some(b"2".to_vec()));
        Ok(())
    }
}
