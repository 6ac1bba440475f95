//! On-disk block codec.
//!
//! A block is a self-describing unit inside a segment file:
//!
//! ```text
//! { magic "SPCB" | version u16 | minTs i64 | maxTs i64
//!   | kindsBitset [u8; 32] | nsBitsetLen u16 | nsBitset
//!   | payloadLen u32 | crc32 u32 }
//! <zstd-compressed payload of length-prefixed JSON events>
//! ```
//!
//! All integers are big-endian. The crc covers the compressed payload, so a
//! torn write is detected without decompressing. The bitsets are 256-bit
//! Bloom-style membership sets over kind and namespace; they may produce
//! false positives but never false negatives, which is exactly what scan
//! pushdown needs.

use std::hash::BuildHasher;

use ahash::RandomState;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use spectre_core::{Error, Event, Result, Timestamp};

/// Magic bytes opening every block
pub const BLOCK_MAGIC: &[u8; 4] = b"SPCB";
/// Current block format version
pub const BLOCK_VERSION: u16 = 1;

const BITSET_LEN: usize = 32;

// Fixed seeds: bit positions must be stable across restarts.
fn bitset_hasher() -> RandomState {
    RandomState::with_seeds(0x5350, 0x4354, 0x5245, 0x424c)
}

fn set_bit(bits: &mut [u8; BITSET_LEN], value: &str) {
    let idx = (bitset_hasher().hash_one(value) % (BITSET_LEN as u64 * 8)) as usize;
    bits[idx / 8] |= 1 << (idx % 8);
}

fn has_bit(bits: &[u8], value: &str) -> bool {
    let idx = (bitset_hasher().hash_one(value) % (bits.len() as u64 * 8)) as usize;
    bits[idx / 8] & (1 << (idx % 8)) != 0
}

/// Parsed block header
#[derive(Debug, Clone, PartialEq)]
pub struct BlockHeader {
    /// Smallest event timestamp in the block
    pub min_ts: Timestamp,
    /// Largest event timestamp in the block
    pub max_ts: Timestamp,
    /// Membership bitset over event kinds
    pub kinds: [u8; BITSET_LEN],
    /// Membership bitset over event namespaces
    pub namespaces: Vec<u8>,
    /// Compressed payload length in bytes
    pub payload_len: u32,
    /// CRC32 of the compressed payload
    pub crc32: u32,
}

impl BlockHeader {
    /// Serialized header size for this header
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        4 + 2 + 8 + 8 + BITSET_LEN + 2 + self.namespaces.len() + 4 + 4
    }

    /// Total block size (header plus payload)
    #[must_use]
    pub fn block_len(&self) -> usize {
        self.encoded_len() + self.payload_len as usize
    }

    /// Whether the block's time range intersects `[start, end]`
    #[must_use]
    pub fn overlaps(&self, start: Timestamp, end: Timestamp) -> bool {
        self.min_ts <= end && self.max_ts >= start
    }

    /// Whether any of the kinds may be present (false ⇒ definitely absent)
    #[must_use]
    pub fn may_contain_kind(&self, kinds: &[String]) -> bool {
        kinds.is_empty() || kinds.iter().any(|k| has_bit(&self.kinds, k))
    }

    /// Whether any of the namespaces may be present (false ⇒ definitely absent)
    #[must_use]
    pub fn may_contain_namespace(&self, namespaces: &[String]) -> bool {
        namespaces.is_empty() || namespaces.iter().any(|ns| has_bit(&self.namespaces, ns))
    }

    /// Decode a header from the front of `buf`
    ///
    /// Returns the header and the number of bytes it occupied, or
    /// `Corruption` if the magic, version or lengths are inconsistent.
    pub fn decode(buf: &[u8]) -> Result<(Self, usize)> {
        let fixed = 4 + 2 + 8 + 8 + BITSET_LEN + 2;
        if buf.len() < fixed {
            return Err(Error::Corruption("truncated block header".into()));
        }
        let mut cur = buf;
        let mut magic = [0u8; 4];
        cur.copy_to_slice(&mut magic);
        if &magic != BLOCK_MAGIC {
            return Err(Error::Corruption(format!("bad block magic {magic:02x?}")));
        }
        let version = cur.get_u16();
        if version != BLOCK_VERSION {
            return Err(Error::Corruption(format!("unsupported block version {version}")));
        }
        let min_ts = Timestamp::from_nanos(cur.get_i64());
        let max_ts = Timestamp::from_nanos(cur.get_i64());
        let mut kinds = [0u8; BITSET_LEN];
        cur.copy_to_slice(&mut kinds);
        let ns_len = cur.get_u16() as usize;
        if cur.remaining() < ns_len + 8 {
            return Err(Error::Corruption("truncated block header bitset".into()));
        }
        let mut namespaces = vec![0u8; ns_len];
        cur.copy_to_slice(&mut namespaces);
        let payload_len = cur.get_u32();
        let crc32 = cur.get_u32();
        let header = BlockHeader {
            min_ts,
            max_ts,
            kinds,
            namespaces,
            payload_len,
            crc32,
        };
        let len = header.encoded_len();
        Ok((header, len))
    }

    fn encode_into(&self, out: &mut BytesMut) {
        out.put_slice(BLOCK_MAGIC);
        out.put_u16(BLOCK_VERSION);
        out.put_i64(self.min_ts.as_nanos());
        out.put_i64(self.max_ts.as_nanos());
        out.put_slice(&self.kinds);
        out.put_u16(self.namespaces.len() as u16);
        out.put_slice(&self.namespaces);
        out.put_u32(self.payload_len);
        out.put_u32(self.crc32);
    }
}

/// Encode a run of events into one block
///
/// Events must be non-empty; the caller is responsible for ordering.
pub fn encode_block(events: &[Event]) -> Result<Bytes> {
    if events.is_empty() {
        return Err(Error::Validation("cannot encode an empty block".into()));
    }
    let mut raw = BytesMut::new();
    let mut min_ts = Timestamp::from_nanos(i64::MAX);
    let mut max_ts = Timestamp::from_nanos(i64::MIN);
    let mut kinds = [0u8; BITSET_LEN];
    let mut namespaces = [0u8; BITSET_LEN];
    for event in events {
        min_ts = min_ts.min(event.timestamp);
        max_ts = max_ts.max(event.timestamp);
        set_bit(&mut kinds, &event.resource.kind);
        set_bit(&mut namespaces, &event.resource.namespace);
        let body = serde_json::to_vec(event)?;
        raw.put_u32(body.len() as u32);
        raw.put_slice(&body);
    }
    let compressed = zstd::stream::encode_all(raw.as_ref(), 0)
        .map_err(|e| Error::Transient(format!("block compression failed: {e}")))?;
    let crc32 = crc32fast::hash(&compressed);
    let header = BlockHeader {
        min_ts,
        max_ts,
        kinds,
        namespaces: namespaces.to_vec(),
        payload_len: compressed.len() as u32,
        crc32,
    };
    let mut out = BytesMut::with_capacity(header.block_len());
    header.encode_into(&mut out);
    out.put_slice(&compressed);
    Ok(out.freeze())
}

/// Verify and decompress a block payload
pub fn decompress_payload(header: &BlockHeader, compressed: &[u8]) -> Result<Bytes> {
    if compressed.len() != header.payload_len as usize {
        return Err(Error::Corruption(format!(
            "payload length mismatch: header says {}, got {}",
            header.payload_len,
            compressed.len()
        )));
    }
    let actual = crc32fast::hash(compressed);
    if actual != header.crc32 {
        return Err(Error::Corruption(format!(
            "block checksum mismatch: expected {:08x}, got {actual:08x}",
            header.crc32
        )));
    }
    let raw = zstd::stream::decode_all(compressed)
        .map_err(|e| Error::Corruption(format!("block decompression failed: {e}")))?;
    Ok(Bytes::from(raw))
}

/// Decode the length-prefixed events out of a decompressed payload
pub fn decode_events(mut payload: &[u8]) -> Result<Vec<Event>> {
    let mut events = Vec::new();
    while payload.has_remaining() {
        if payload.remaining() < 4 {
            return Err(Error::Corruption("truncated event length prefix".into()));
        }
        let len = payload.get_u32() as usize;
        if payload.remaining() < len {
            return Err(Error::Corruption("truncated event body".into()));
        }
        let event: Event = serde_json::from_slice(&payload[..len])?;
        payload.advance(len);
        events.push(event);
    }
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::event;

    #[test]
    fn blocks_roundtrip() {
        let events = vec![
            event("Deployment", "prod", "d-1", 1_700_000_000),
            event("Pod", "default", "p-1", 1_700_000_060),
        ];
        let block = encode_block(&events).unwrap();
        let (header, header_len) = BlockHeader::decode(&block).unwrap();
        assert_eq!(header.min_ts, Timestamp::from_secs(1_700_000_000));
        assert_eq!(header.max_ts, Timestamp::from_secs(1_700_000_060));
        let payload = decompress_payload(&header, &block[header_len..]).unwrap();
        assert_eq!(decode_events(&payload).unwrap(), events);
    }

    #[test]
    fn bitsets_never_report_false_negatives() {
        let events = vec![event("Deployment", "prod", "d-1", 1_700_000_000)];
        let block = encode_block(&events).unwrap();
        let (header, _) = BlockHeader::decode(&block).unwrap();
        assert!(header.may_contain_kind(&["Deployment".to_string()]));
        assert!(header.may_contain_namespace(&["prod".to_string()]));
        // empty filters always pass
        assert!(header.may_contain_kind(&[]));
    }

    #[test]
    fn corrupt_payloads_are_detected() {
        let events = vec![event("Pod", "default", "p-1", 1_700_000_000)];
        let block = encode_block(&events).unwrap();
        let (header, header_len) = BlockHeader::decode(&block).unwrap();
        let mut payload = block[header_len..].to_vec();
        payload[0] ^= 0xff;
        let err = decompress_payload(&header, &payload).unwrap_err();
        assert!(matches!(err, Error::Corruption(_)));
    }

    #[test]
    fn bad_magic_is_corruption() {
        let err = BlockHeader::decode(b"NOPExxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx")
            .unwrap_err();
        assert!(matches!(err, Error::Corruption(_)));
    }
}
