//! Binary codec shared by the builder and the reader.
//!
//! Every block (data or index) is a dense run of records:
//!
//! ```text
//! [key_len: u32 LE][key][value_len: u32 LE][value]
//! ```
//!
//! A [`BlockHandle`] is 12 bytes and the [`Footer`] is always the **last 20
//! bytes** of a table file:
//!
//! ```text
//! [index_offset: u64 LE][index_size: u32 LE][magic: u64 LE]
//! ```
//!
//! Decoders take `&mut &[u8]` and advance the view past what they consumed.
//! They never read past the end of the view; short input is reported as
//! [`TableError::Truncated`].

use byteorder::{ByteOrder, LittleEndian};
use std::io::{Read, Seek, SeekFrom};

use crate::error::{Result, TableError};

/// Magic number identifying a finished table file.
pub const SSTABLE_MAGIC: u64 = 0xDEAD_BEEF_CAFE_F00D;

/// Encoded size of a [`BlockHandle`]: 8 (`offset`) + 4 (`size`).
pub const BLOCK_HANDLE_BYTES: usize = 8 + 4;

/// Encoded size of a [`Footer`]: handle + 8 (`magic`).
pub const FOOTER_BYTES: usize = BLOCK_HANDLE_BYTES + 8;

const LEN_BYTES: usize = 4;

/// Pointer to a byte range inside a table file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockHandle {
    pub offset: u64,
    pub size: u32,
}

impl BlockHandle {
    pub fn new(offset: u64, size: u32) -> Self {
        Self { offset, size }
    }

    /// One past the last byte covered by this handle.
    pub fn end(&self) -> u64 {
        self.offset.saturating_add(u64::from(self.size))
    }

    pub fn encode(&self) -> [u8; BLOCK_HANDLE_BYTES] {
        let mut buf = [0u8; BLOCK_HANDLE_BYTES];
        LittleEndian::write_u64(&mut buf[..8], self.offset);
        LittleEndian::write_u32(&mut buf[8..], self.size);
        buf
    }

    /// Appends the 12-byte encoding to `dst`.
    pub fn encode_to(&self, dst: &mut Vec<u8>) {
        dst.extend_from_slice(&self.encode());
    }

    /// Decodes a handle from the front of `input` and advances it.
    pub fn decode_from(input: &mut &[u8]) -> Result<Self> {
        let raw = take(input, BLOCK_HANDLE_BYTES, "block handle")?;
        Ok(Self {
            offset: LittleEndian::read_u64(&raw[..8]),
            size: LittleEndian::read_u32(&raw[8..]),
        })
    }
}

/// Fixed trailer locating the index block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Footer {
    pub index_handle: BlockHandle,
}

impl Footer {
    pub fn new(index_handle: BlockHandle) -> Self {
        Self { index_handle }
    }

    pub fn encode(&self) -> [u8; FOOTER_BYTES] {
        let mut buf = [0u8; FOOTER_BYTES];
        buf[..BLOCK_HANDLE_BYTES].copy_from_slice(&self.index_handle.encode());
        LittleEndian::write_u64(&mut buf[BLOCK_HANDLE_BYTES..], SSTABLE_MAGIC);
        buf
    }

    /// Decodes a footer from the first [`FOOTER_BYTES`] of `input`.
    ///
    /// The magic is checked before the handle is looked at, so a foreign file
    /// never yields a handle.
    pub fn decode(input: &[u8]) -> Result<Self> {
        if input.len() < FOOTER_BYTES {
            return Err(TableError::Truncated {
                what: "footer",
                needed: FOOTER_BYTES,
                available: input.len(),
            });
        }
        let magic = LittleEndian::read_u64(&input[BLOCK_HANDLE_BYTES..FOOTER_BYTES]);
        if magic != SSTABLE_MAGIC {
            return Err(TableError::BadMagic { found: magic });
        }
        let mut handle_bytes = &input[..BLOCK_HANDLE_BYTES];
        let index_handle = BlockHandle::decode_from(&mut handle_bytes)?;
        Ok(Self { index_handle })
    }
}

/// Exact encoded length of one record.
pub fn record_size(key: &[u8], value: &[u8]) -> usize {
    LEN_BYTES + key.len() + LEN_BYTES + value.len()
}

/// Appends one record to `dst`.
///
/// Callers must keep `key` and `value` under `u32::MAX` bytes; the builder
/// rejects larger records before they reach this point.
pub fn encode_record(dst: &mut Vec<u8>, key: &[u8], value: &[u8]) {
    dst.reserve(record_size(key, value));
    put_len(dst, key.len());
    dst.extend_from_slice(key);
    put_len(dst, value.len());
    dst.extend_from_slice(value);
}

/// Decodes one record from the front of `input` and advances it.
///
/// Returned slices borrow from the original buffer.
pub fn decode_record<'a>(input: &mut &'a [u8]) -> Result<(&'a [u8], &'a [u8])> {
    let key_len = read_len(input, "key length")?;
    let key = take(input, key_len, "key")?;
    let value_len = read_len(input, "value length")?;
    let value = take(input, value_len, "value")?;
    Ok((key, value))
}

/// Byte offset where the footer starts. Saturates to 0 for tiny files.
pub fn footer_pos(filesize: u64) -> u64 {
    filesize.saturating_sub(FOOTER_BYTES as u64)
}

/// Reads and validates the footer of a file of length `filesize`.
pub fn read_footer<R: Read + Seek>(r: &mut R, filesize: u64) -> Result<Footer> {
    if filesize < FOOTER_BYTES as u64 {
        return Err(TableError::FileTooSmall { size: filesize });
    }
    r.seek(SeekFrom::Start(footer_pos(filesize)))?;
    let mut buf = [0u8; FOOTER_BYTES];
    r.read_exact(&mut buf)?;
    Footer::decode(&buf)
}

/// Reads exactly the byte range named by `handle`.
pub fn read_block<R: Read + Seek>(r: &mut R, handle: &BlockHandle) -> Result<Vec<u8>> {
    r.seek(SeekFrom::Start(handle.offset))?;
    let mut buf = vec![0u8; handle.size as usize];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

fn put_len(dst: &mut Vec<u8>, len: usize) {
    let mut buf = [0u8; LEN_BYTES];
    LittleEndian::write_u32(&mut buf, len as u32);
    dst.extend_from_slice(&buf);
}

fn read_len(input: &mut &[u8], what: &'static str) -> Result<usize> {
    let raw = take(input, LEN_BYTES, what)?;
    Ok(LittleEndian::read_u32(raw) as usize)
}

fn take<'a>(input: &mut &'a [u8], n: usize, what: &'static str) -> Result<&'a [u8]> {
    if input.len() < n {
        return Err(TableError::Truncated {
            what,
            needed: n,
            available: input.len(),
        });
    }
    let whole: &'a [u8] = *input;
    let (head, rest) = whole.split_at(n);
    *input = rest;
    Ok(head)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn handle_encoding_is_offset_then_size() {
        let h = BlockHandle::new(0x0102_0304_0506_0708, 0x0A0B_0C0D);
        let bytes = h.encode();
        assert_eq!(bytes.len(), BLOCK_HANDLE_BYTES);
        assert_eq!(&bytes[..8], &0x0102_0304_0506_0708u64.to_le_bytes());
        assert_eq!(&bytes[8..], &0x0A0B_0C0Du32.to_le_bytes());
    }

    #[test]
    fn handle_decode_advances_input() {
        let mut buf = Vec::new();
        BlockHandle::new(7, 9).encode_to(&mut buf);
        buf.extend_from_slice(b"tail");

        let mut view = buf.as_slice();
        let h = BlockHandle::decode_from(&mut view).unwrap();
        assert_eq!(h, BlockHandle::new(7, 9));
        assert_eq!(view, b"tail");
    }

    #[test]
    fn handle_decode_short_input_fails() {
        let mut view: &[u8] = &[0u8; BLOCK_HANDLE_BYTES - 1];
        let err = BlockHandle::decode_from(&mut view).unwrap_err();
        assert!(matches!(err, TableError::Truncated { what: "block handle", .. }));
    }

    #[test]
    fn footer_layout_and_magic() {
        let footer = Footer::new(BlockHandle::new(100, 36));
        let bytes = footer.encode();
        assert_eq!(bytes.len(), FOOTER_BYTES);
        assert_eq!(&bytes[BLOCK_HANDLE_BYTES..], &SSTABLE_MAGIC.to_le_bytes());
        assert_eq!(Footer::decode(&bytes).unwrap(), footer);
    }

    #[test]
    fn footer_rejects_any_magic_byte_flip() {
        let bytes = Footer::new(BlockHandle::new(1, 2)).encode();
        for i in BLOCK_HANDLE_BYTES..FOOTER_BYTES {
            let mut corrupt = bytes;
            corrupt[i] ^= 0xFF;
            assert!(matches!(
                Footer::decode(&corrupt),
                Err(TableError::BadMagic { .. })
            ));
        }
    }

    #[test]
    fn footer_rejects_short_input() {
        let bytes = Footer::new(BlockHandle::new(1, 2)).encode();
        assert!(matches!(
            Footer::decode(&bytes[..FOOTER_BYTES - 1]),
            Err(TableError::Truncated { what: "footer", .. })
        ));
    }

    #[test]
    fn record_size_matches_encoding() {
        let mut buf = Vec::new();
        encode_record(&mut buf, b"key", b"value");
        assert_eq!(buf.len(), record_size(b"key", b"value"));
        assert_eq!(record_size(b"", b""), 8);
    }

    #[test]
    fn decode_consecutive_records() {
        let mut buf = Vec::new();
        encode_record(&mut buf, b"a", b"1");
        encode_record(&mut buf, b"", b"empty-key");
        encode_record(&mut buf, b"c", b"");

        let mut view = buf.as_slice();
        assert_eq!(decode_record(&mut view).unwrap(), (&b"a"[..], &b"1"[..]));
        assert_eq!(decode_record(&mut view).unwrap(), (&b""[..], &b"empty-key"[..]));
        assert_eq!(decode_record(&mut view).unwrap(), (&b"c"[..], &b""[..]));
        assert!(view.is_empty());
    }

    #[test]
    fn decode_record_rejects_overlong_lengths() {
        let mut buf = Vec::new();
        encode_record(&mut buf, b"key", b"value");

        // Every strict prefix of a record is a truncation.
        for cut in 0..buf.len() {
            let mut view = &buf[..cut];
            assert!(decode_record(&mut view).is_err(), "prefix {} decoded", cut);
        }

        // A key length pointing past the buffer.
        let mut lying = buf.clone();
        lying[..4].copy_from_slice(&1000u32.to_le_bytes());
        let mut view = lying.as_slice();
        assert!(matches!(
            decode_record(&mut view),
            Err(TableError::Truncated { what: "key", .. })
        ));
    }

    #[test]
    fn read_footer_from_stream() {
        let mut file = b"some data bytes".to_vec();
        let footer = Footer::new(BlockHandle::new(5, 4));
        file.extend_from_slice(&footer.encode());
        let len = file.len() as u64;

        let mut cur = Cursor::new(file);
        assert_eq!(read_footer(&mut cur, len).unwrap(), footer);
        let block = read_block(&mut cur, &footer.index_handle).unwrap();
        assert_eq!(block, b"data");
    }

    #[test]
    fn read_footer_rejects_small_file() {
        let mut cur = Cursor::new(vec![0u8; 10]);
        assert!(matches!(
            read_footer(&mut cur, 10),
            Err(TableError::FileTooSmall { size: 10 })
        ));
    }

    #[test]
    fn footer_pos_saturates() {
        assert_eq!(footer_pos(5), 0);
        assert_eq!(footer_pos(120), 100);
    }
}
