//! MDF4 block framing
//!
//! Every block starts with a 24-byte header followed by its links and data:
//!
//! ```text
//! 0   id            4 bytes  "##XX"
//! 4   reserved      4 bytes
//! 8   length        u64      header + links + data
//! 16  link_count    u64
//! 24  links         link_count × u64 (absolute file offsets, 0 = nil)
//! ..  data
//! ```
//!
//! Blocks start on 8-byte boundaries. All integers are little-endian.

use crate::{Error, Result};

/// Size of the file identification block
pub const ID_BLOCK_SIZE: usize = 64;
/// Size of a block header
pub const HEADER_SIZE: usize = 24;
/// File identifier
pub const FILE_ID: &[u8; 8] = b"MDF     ";
/// Format version string
pub const VERSION_STR: &[u8; 8] = b"4.10    ";
/// Program identifier written into the ID block
pub const PROGRAM_ID: &[u8; 8] = b"jerez04 ";
/// Numeric format version
pub const VERSION_NUMBER: u16 = 410;

/// Block types used by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockId {
    /// Header
    Hd,
    /// File history
    Fh,
    /// Data group
    Dg,
    /// Channel group
    Cg,
    /// Channel
    Cn,
    /// Plain text
    Tx,
    /// XML metadata
    Md,
    /// Data
    Dt,
}

impl BlockId {
    /// Four-byte block tag
    #[must_use]
    pub const fn tag(self) -> &'static [u8; 4] {
        match self {
            Self::Hd => b"##HD",
            Self::Fh => b"##FH",
            Self::Dg => b"##DG",
            Self::Cg => b"##CG",
            Self::Cn => b"##CN",
            Self::Tx => b"##TX",
            Self::Md => b"##MD",
            Self::Dt => b"##DT",
        }
    }

    /// Parse a block tag
    #[must_use]
    pub fn from_tag(tag: &[u8]) -> Option<Self> {
        [
            Self::Hd,
            Self::Fh,
            Self::Dg,
            Self::Cg,
            Self::Cn,
            Self::Tx,
            Self::Md,
            Self::Dt,
        ]
        .into_iter()
        .find(|id| id.tag().as_slice() == tag)
    }
}

const fn padded(len: usize) -> usize {
    (len + 7) & !7
}

/// Append-only file image with link back-patching.
#[derive(Debug)]
pub struct BlockWriter {
    bytes: Vec<u8>,
}

impl Default for BlockWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockWriter {
    /// Start a file with its ID block
    #[must_use]
    pub fn new() -> Self {
        let mut bytes = Vec::with_capacity(1 << 16);
        bytes.extend_from_slice(FILE_ID);
        bytes.extend_from_slice(VERSION_STR);
        bytes.extend_from_slice(PROGRAM_ID);
        bytes.extend_from_slice(&[0; 4]);
        bytes.extend_from_slice(&VERSION_NUMBER.to_le_bytes());
        bytes.extend_from_slice(&[0; 30]);
        // Unfinalized flags (standard, custom)
        bytes.extend_from_slice(&0_u16.to_le_bytes());
        bytes.extend_from_slice(&0_u16.to_le_bytes());
        debug_assert_eq!(bytes.len(), ID_BLOCK_SIZE);
        Self { bytes }
    }

    /// Append a block and return its offset.
    pub fn push_block(&mut self, id: BlockId, links: &[u64], data: &[u8]) -> u64 {
        let offset = self.bytes.len() as u64;
        let length = HEADER_SIZE + links.len() * 8 + data.len();
        self.bytes.extend_from_slice(id.tag());
        self.bytes.extend_from_slice(&[0; 4]);
        self.bytes.extend_from_slice(&(length as u64).to_le_bytes());
        self.bytes.extend_from_slice(&(links.len() as u64).to_le_bytes());
        for link in links {
            self.bytes.extend_from_slice(&link.to_le_bytes());
        }
        self.bytes.extend_from_slice(data);
        self.bytes.resize(padded(self.bytes.len()), 0);
        offset
    }

    /// Append a text block (`TX` or `MD`), NUL-terminated and padded.
    pub fn push_text(&mut self, id: BlockId, text: &str) -> u64 {
        let mut data = Vec::with_capacity(padded(text.len() + 1));
        data.extend_from_slice(text.as_bytes());
        data.push(0);
        data.resize(padded(data.len()), 0);
        self.push_block(id, &[], &data)
    }

    /// Point link `index` of the block at `block` to `target`.
    ///
    /// # Errors
    ///
    /// Returns `Mdf4` if the link slot lies outside the written image.
    pub fn set_link(&mut self, block: u64, index: usize, target: u64) -> Result<()> {
        let at = usize::try_from(block)
            .map_err(|_| Error::Mdf4(format!("block offset {block} out of range")))?
            + HEADER_SIZE
            + index * 8;
        let slot = self
            .bytes
            .get_mut(at..at + 8)
            .ok_or_else(|| Error::Mdf4(format!("link {index} of block at {block} out of range")))?;
        slot.copy_from_slice(&target.to_le_bytes());
        Ok(())
    }

    /// Current file size
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True before any byte is written (never, the ID block is always present)
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Finished file image
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// A block borrowed from a file image.
#[derive(Debug, Clone)]
pub struct RawBlock<'a> {
    /// Block type
    pub id: BlockId,
    /// Offset in the file
    pub offset: u64,
    /// Link section
    pub links: Vec<u64>,
    /// Data section
    pub data: &'a [u8],
}

impl RawBlock<'_> {
    /// Link `index`, or 0 (nil) if the block has fewer links
    #[must_use]
    pub fn link(&self, index: usize) -> u64 {
        self.links.get(index).copied().unwrap_or(0)
    }
}

fn to_usize(value: u64, what: &str) -> Result<usize> {
    usize::try_from(value).map_err(|_| Error::Mdf4(format!("{what} {value} out of range")))
}

/// Read the block at `offset` and require its type to be `expected`.
///
/// # Errors
///
/// Returns `Mdf4` on a truncated block, an unknown or unexpected id, or a
/// link pointing past the end of the file.
pub fn read_block(bytes: &[u8], offset: u64, expected: BlockId) -> Result<RawBlock<'_>> {
    let start = to_usize(offset, "block offset")?;
    let header = bytes
        .get(start..start + HEADER_SIZE)
        .ok_or_else(|| Error::Mdf4(format!("truncated block header at offset {offset}")))?;

    let id = BlockId::from_tag(&header[..4]).ok_or_else(|| {
        Error::Mdf4(format!(
            "unknown block id '{}' at offset {offset}",
            String::from_utf8_lossy(&header[..4])
        ))
    })?;
    if id != expected {
        return Err(Error::Mdf4(format!(
            "expected {} block at offset {offset}, found {}",
            String::from_utf8_lossy(expected.tag()),
            String::from_utf8_lossy(id.tag())
        )));
    }

    let length = to_usize(le_u64(header, 8)?, "block length")?;
    let link_count = to_usize(le_u64(header, 16)?, "link count")?;
    let data_start = link_count
        .checked_mul(8)
        .and_then(|l| l.checked_add(HEADER_SIZE))
        .filter(|&d| d <= length)
        .ok_or_else(|| {
            Error::Mdf4(format!(
                "block at offset {offset}: {link_count} links do not fit in {length} bytes"
            ))
        })?;
    let block = bytes
        .get(start..start.saturating_add(length))
        .filter(|b| b.len() == length)
        .ok_or_else(|| Error::Mdf4(format!("truncated block at offset {offset}")))?;

    let links = (0..link_count)
        .map(|i| le_u64(block, HEADER_SIZE + i * 8))
        .collect::<Result<Vec<_>>>()?;
    if let Some(bad) = links.iter().find(|&&l| l != 0 && l >= bytes.len() as u64) {
        return Err(Error::Mdf4(format!(
            "block at offset {offset} links to {bad}, past end of file ({} bytes)",
            bytes.len()
        )));
    }

    Ok(RawBlock {
        id,
        offset,
        links,
        data: &block[data_start..],
    })
}

/// Text content of a `TX` or `MD` block (up to the first NUL).
///
/// # Errors
///
/// Returns `Mdf4` if the block is malformed or not UTF-8.
pub fn read_text(bytes: &[u8], offset: u64, expected: BlockId) -> Result<String> {
    let block = read_block(bytes, offset, expected)?;
    let end = block.data.iter().position(|&b| b == 0).unwrap_or(block.data.len());
    std::str::from_utf8(&block.data[..end])
        .map(str::to_string)
        .map_err(|e| Error::Mdf4(format!("text block at offset {offset} is not UTF-8: {e}")))
}

/// Text of an optional link: nil reads as the empty string.
///
/// # Errors
///
/// Same as [`read_text`].
pub fn read_optional_text(bytes: &[u8], offset: u64, expected: BlockId) -> Result<String> {
    if offset == 0 {
        Ok(String::new())
    } else {
        read_text(bytes, offset, expected)
    }
}

fn field<const N: usize>(data: &[u8], at: usize) -> Result<[u8; N]> {
    data.get(at..at + N)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| Error::Mdf4(format!("field at byte {at} past end of block data")))
}

/// Little-endian `u64` at `at`.
///
/// # Errors
///
/// Returns `Mdf4` if the slice is too short.
pub fn le_u64(data: &[u8], at: usize) -> Result<u64> {
    field::<8>(data, at).map(u64::from_le_bytes)
}

/// Little-endian `u32` at `at`.
///
/// # Errors
///
/// Returns `Mdf4` if the slice is too short.
pub fn le_u32(data: &[u8], at: usize) -> Result<u32> {
    field::<4>(data, at).map(u32::from_le_bytes)
}

/// Little-endian `u16` at `at`.
///
/// # Errors
///
/// Returns `Mdf4` if the slice is too short.
pub fn le_u16(data: &[u8], at: usize) -> Result<u16> {
    field::<2>(data, at).map(u16::from_le_bytes)
}

/// Little-endian `f64` at `at`.
///
/// # Errors
///
/// Returns `Mdf4` if the slice is too short.
pub fn le_f64(data: &[u8], at: usize) -> Result<f64> {
    field::<8>(data, at).map(f64::from_le_bytes)
}

/// Byte at `at`.
///
/// # Errors
///
/// Returns `Mdf4` if the slice is too short.
pub fn byte(data: &[u8], at: usize) -> Result<u8> {
    field::<1>(data, at).map(|[b]| b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_block_layout() {
        let bytes = BlockWriter::new().into_bytes();
        assert_eq!(bytes.len(), ID_BLOCK_SIZE);
        assert_eq!(&bytes[..8], FILE_ID);
        assert_eq!(&bytes[8..16], VERSION_STR);
        assert_eq!(le_u16(&bytes, 28).unwrap(), 410);
    }

    #[test]
    fn test_push_block_aligned_and_readable() {
        let mut w = BlockWriter::new();
        let tx = w.push_text(BlockId::Tx, "speed");
        assert_eq!(tx % 8, 0);
        let dg = w.push_block(BlockId::Dg, &[0, tx, 0, 0], &[8, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(dg % 8, 0);
        assert_eq!(w.len() % 8, 0);

        let bytes = w.into_bytes();
        let block = read_block(&bytes, dg, BlockId::Dg).unwrap();
        assert_eq!(block.links, vec![0, tx, 0, 0]);
        assert_eq!(block.data.len(), 8);
        assert_eq!(block.link(9), 0);
        assert_eq!(read_text(&bytes, tx, BlockId::Tx).unwrap(), "speed");
    }

    #[test]
    fn test_set_link_patches_slot() {
        let mut w = BlockWriter::new();
        let dg = w.push_block(BlockId::Dg, &[0, 0, 0, 0], &[0; 8]);
        let tx = w.push_text(BlockId::Tx, "x");
        w.set_link(dg, 2, tx).unwrap();
        assert!(w.set_link(dg, 500, tx).is_err());

        let bytes = w.into_bytes();
        assert_eq!(read_block(&bytes, dg, BlockId::Dg).unwrap().link(2), tx);
    }

    #[test]
    fn test_read_block_rejects_malformed() {
        let mut w = BlockWriter::new();
        let tx = w.push_text(BlockId::Tx, "abc");
        let bytes = w.into_bytes();

        // Wrong expected type
        assert!(matches!(read_block(&bytes, tx, BlockId::Md), Err(Error::Mdf4(_))));
        // Truncated
        assert!(read_block(&bytes[..bytes.len() - 4], tx, BlockId::Tx).is_err());
        // Unknown id
        let mut bad = bytes.clone();
        bad[tx as usize + 2..tx as usize + 4].copy_from_slice(b"ZZ");
        let err = read_block(&bad, tx, BlockId::Tx).unwrap_err();
        assert!(err.to_string().contains("unknown block id"));
    }

    #[test]
    fn test_link_past_end_rejected() {
        let mut w = BlockWriter::new();
        let dg = w.push_block(BlockId::Dg, &[1 << 40, 0, 0, 0], &[0; 8]);
        let bytes = w.into_bytes();
        let err = read_block(&bytes, dg, BlockId::Dg).unwrap_err();
        assert!(err.to_string().contains("past end of file"));
    }
}
