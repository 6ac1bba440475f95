//! Reading and validating segment files.

use std::{fs, path::PathBuf};

use bytes::Bytes;
use spectre_core::Result;
use tracing::warn;

use crate::block::{self, BlockHeader};

/// Location and size of one segment file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentMeta {
    /// Monotonic id within the hour
    pub id: u64,
    /// Absolute path of the segment file
    pub path: PathBuf,
    /// Byte length of the valid prefix
    pub len: u64,
}

/// One parsed block within a segment
#[derive(Debug, Clone)]
pub struct RawBlock {
    /// Byte offset of the block header within the segment
    pub offset: u64,
    /// Parsed header
    pub header: BlockHeader,
    /// Compressed payload bytes
    pub payload: Bytes,
}

/// A read-only view over a segment file's blocks
///
/// The file is read once into memory; segments are bounded by the rotation
/// target so this stays small. Corrupt blocks terminate iteration (a torn
/// tail cannot be re-synchronised), the caller decides whether that is a
/// skip or an error.
pub struct SegmentReader {
    bytes: Bytes,
}

impl SegmentReader {
    /// Open a segment, reading at most `len` bytes of it
    pub fn open(meta: &SegmentMeta) -> Result<Self> {
        let mut bytes = fs::read(&meta.path)?;
        if (bytes.len() as u64) > meta.len {
            bytes.truncate(meta.len as usize);
        }
        Ok(Self { bytes: Bytes::from(bytes) })
    }

    /// Wrap an already loaded segment image (used by archive import)
    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes: Bytes::from(bytes) }
    }

    /// Iterate the valid blocks in file order
    ///
    /// Stops at the first corrupt or truncated block; `corrupt` on the
    /// returned struct tells whether the tail was dropped.
    #[must_use]
    pub fn blocks(&self) -> SegmentBlocks {
        SegmentBlocks {
            bytes: self.bytes.clone(),
            offset: 0,
            corrupt: false,
        }
    }
}

/// Iterator over the blocks of one segment
pub struct SegmentBlocks {
    bytes: Bytes,
    offset: u64,
    /// Set when iteration stopped on a corrupt block rather than clean EOF
    pub corrupt: bool,
}

impl Iterator for SegmentBlocks {
    type Item = RawBlock;

    fn next(&mut self) -> Option<RawBlock> {
        let start = self.offset as usize;
        if start >= self.bytes.len() {
            return None;
        }
        let (header, header_len) = match BlockHeader::decode(&self.bytes[start..]) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(offset = start, error = %err, "corrupt block header, dropping segment tail");
                self.corrupt = true;
                self.offset = self.bytes.len() as u64;
                return None;
            }
        };
        let payload_start = start + header_len;
        let payload_end = payload_start + header.payload_len as usize;
        if payload_end > self.bytes.len() {
            warn!(offset = start, "truncated block payload, dropping segment tail");
            self.corrupt = true;
            self.offset = self.bytes.len() as u64;
            return None;
        }
        let block = RawBlock {
            offset: start as u64,
            header,
            payload: self.bytes.slice(payload_start..payload_end),
        };
        self.offset = payload_end as u64;
        Some(block)
    }
}

/// Validate a segment file and return the length of its good prefix
///
/// Used on restart for the open segment: every block's checksum is verified
/// and the file is measured up to the last block that passes. The caller
/// truncates to this length.
pub fn recover_len(path: &PathBuf) -> Result<u64> {
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };
    let mut good = 0u64;
    let mut offset = 0usize;
    while offset < bytes.len() {
        let Ok((header, header_len)) = BlockHeader::decode(&bytes[offset..]) else {
            break;
        };
        let payload_start = offset + header_len;
        let payload_end = payload_start + header.payload_len as usize;
        if payload_end > bytes.len() {
            break;
        }
        if block::decompress_payload(&header, &bytes[payload_start..payload_end]).is_err() {
            break;
        }
        offset = payload_end;
        good = offset as u64;
    }
    Ok(good)
}

/// Decode every event of a block, going through no cache
pub fn decode_block_events(raw: &RawBlock) -> Result<Vec<spectre_core::Event>> {
    let payload = block::decompress_payload(&raw.header, &raw.payload)?;
    block::decode_events(&payload)
}
