//! Pack entry header codec.
//!
//! Each pack entry starts with a variable-length header: the first byte
//! carries the type in bits 4-6 and the low 4 bits of the inflated size;
//! the top bit of every byte marks continuation, each continuation byte
//! adding 7 more size bits. Delta entries follow the header with their
//! base reference (20-byte id for REF_DELTA, negative varint for
//! OFS_DELTA).

use grit_hash::ObjectId;

use crate::{PackError, OFS_DELTA, REF_DELTA};

/// How a pack entry finds its content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Whole object of the given pack type code (1-4).
    Whole(u8),
    /// Delta against the entry at an earlier absolute offset.
    OfsDelta { base_offset: u64 },
    /// Delta against the object with the given id.
    RefDelta { base: ObjectId },
}

/// A parsed entry header.
#[derive(Debug, Clone)]
pub struct EntryHeader {
    pub kind: EntryKind,
    /// Declared inflated size (content for whole objects, instruction
    /// stream for deltas).
    pub inflated_size: u64,
    /// Bytes consumed by the header including any base reference.
    pub header_len: usize,
}

/// Parse an entry header from `data`, the pack bytes starting at the
/// entry. `entry_offset` is the entry's absolute pack offset, needed to
/// resolve OFS_DELTA back-references and for error reporting.
pub fn parse_entry_header(data: &[u8], entry_offset: u64) -> Result<EntryHeader, PackError> {
    let corrupt = |reason: &str| PackError::CorruptEntry {
        offset: entry_offset,
        reason: reason.into(),
    };

    let mut pos = 0;
    let mut byte = *data.first().ok_or_else(|| corrupt("truncated header"))?;
    pos += 1;

    let type_code = (byte >> 4) & 0x07;
    let mut size: u64 = (byte & 0x0f) as u64;
    let mut shift = 4;
    while byte & 0x80 != 0 {
        byte = *data.get(pos).ok_or_else(|| corrupt("truncated header"))?;
        pos += 1;
        size |= ((byte & 0x7f) as u64) << shift;
        shift += 7;
    }

    let kind = match type_code {
        1..=4 => EntryKind::Whole(type_code),
        OFS_DELTA => {
            let mut c = *data.get(pos).ok_or_else(|| corrupt("truncated ofs-delta"))?;
            pos += 1;
            let mut back = (c & 0x7f) as u64;
            while c & 0x80 != 0 {
                back += 1;
                c = *data.get(pos).ok_or_else(|| corrupt("truncated ofs-delta"))?;
                pos += 1;
                back = (back << 7) + (c & 0x7f) as u64;
            }
            if back == 0 || back > entry_offset {
                return Err(corrupt("ofs-delta base offset out of range"));
            }
            EntryKind::OfsDelta {
                base_offset: entry_offset - back,
            }
        }
        REF_DELTA => {
            let end = pos + grit_hash::RAW_LEN;
            if end > data.len() {
                return Err(corrupt("truncated ref-delta base id"));
            }
            let base = ObjectId::from_bytes(&data[pos..end])
                .map_err(|_| corrupt("invalid ref-delta base id"))?;
            pos = end;
            EntryKind::RefDelta { base }
        }
        other => {
            return Err(PackError::CorruptEntry {
                offset: entry_offset,
                reason: format!("unknown object type code {other}"),
            })
        }
    };

    Ok(EntryHeader {
        kind,
        inflated_size: size,
        header_len: pos,
    })
}

/// Encode an entry header for the given pack type code and inflated size.
///
/// For delta entries the caller appends the base reference separately.
pub fn encode_entry_header(type_code: u8, size: u64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(10);
    let mut s = size;

    let mut c = (type_code << 4) | (s & 0x0f) as u8;
    s >>= 4;
    while s > 0 {
        buf.push(c | 0x80);
        c = (s & 0x7f) as u8;
        s >>= 7;
    }
    buf.push(c);
    buf
}

/// Encode an OFS_DELTA back-offset (distance from the delta entry back to
/// its base entry).
pub fn encode_ofs_delta_offset(back: u64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(10);
    let mut off = back;

    buf.push((off & 0x7f) as u8);
    off >>= 7;
    while off > 0 {
        off -= 1;
        buf.push(0x80 | (off & 0x7f) as u8);
        off >>= 7;
    }
    buf.reverse();
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_blob_header() {
        let data = encode_entry_header(3, 100);
        let entry = parse_entry_header(&data, 0).unwrap();
        assert_eq!(entry.kind, EntryKind::Whole(3));
        assert_eq!(entry.inflated_size, 100);
        assert_eq!(entry.header_len, data.len());
    }

    #[test]
    fn parse_single_byte_header() {
        // Commit (1), size 5: (1 << 4) | 5 = 0x15, no continuation.
        let entry = parse_entry_header(&[0x15], 0).unwrap();
        assert_eq!(entry.kind, EntryKind::Whole(1));
        assert_eq!(entry.inflated_size, 5);
        assert_eq!(entry.header_len, 1);
    }

    #[test]
    fn header_roundtrip_large_size() {
        for size in [0u64, 15, 16, 127, 128, 1_000_000, u32::MAX as u64 + 17] {
            let data = encode_entry_header(2, size);
            let entry = parse_entry_header(&data, 0).unwrap();
            assert_eq!(entry.kind, EntryKind::Whole(2));
            assert_eq!(entry.inflated_size, size, "size {size}");
        }
    }

    #[test]
    fn ofs_delta_roundtrip() {
        for back in [1u64, 127, 128, 255, 256, 1000, 100_000, 1_000_000] {
            let mut data = encode_entry_header(OFS_DELTA, 9);
            data.extend_from_slice(&encode_ofs_delta_offset(back));
            let entry = parse_entry_header(&data, 2_000_000).unwrap();
            assert_eq!(
                entry.kind,
                EntryKind::OfsDelta {
                    base_offset: 2_000_000 - back
                },
                "back {back}"
            );
        }
    }

    #[test]
    fn ofs_delta_before_pack_start() {
        let mut data = encode_entry_header(OFS_DELTA, 9);
        data.extend_from_slice(&encode_ofs_delta_offset(500));
        assert!(parse_entry_header(&data, 100).is_err());
    }

    #[test]
    fn ref_delta_carries_base_id() {
        let base = ObjectId::from_hex("e69de29bb2d1d6434b8b29ae775ad8c2e48c5391").unwrap();
        let mut data = encode_entry_header(REF_DELTA, 4);
        data.extend_from_slice(base.as_bytes());
        let entry = parse_entry_header(&data, 12).unwrap();
        assert_eq!(entry.kind, EntryKind::RefDelta { base });
        assert_eq!(entry.header_len, 1 + 20);
    }

    #[test]
    fn truncated_ref_delta() {
        let mut data = encode_entry_header(REF_DELTA, 4);
        data.extend_from_slice(&[0u8; 10]); // only half an id
        assert!(parse_entry_header(&data, 12).is_err());
    }

    #[test]
    fn unknown_type_code() {
        // Type 5 is reserved.
        let data = encode_entry_header(5, 1);
        assert!(parse_entry_header(&data, 0).is_err());
    }

    #[test]
    fn empty_input() {
        assert!(parse_entry_header(&[], 0).is_err());
    }
}
