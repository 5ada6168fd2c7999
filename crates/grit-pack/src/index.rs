//! Pack index (v2): atomic writer and mmap reader.
//!
//! Format:
//!
//! ```text
//! Header:  \377tOc (4 bytes) | version (4 bytes = 2)
//! Fanout:  256 × 4-byte big-endian cumulative counts
//! OIDs:    N × 20-byte sorted OIDs
//! CRC32:   N × 4-byte CRC32 of each entry's packed bytes
//! Offsets: N × 4-byte offsets (high bit set → index into 64-bit table)
//! 64-bit:  M × 8-byte offsets (only for offsets ≥ 2^31)
//! Trailer: 20-byte pack checksum | 20-byte index checksum
//! ```

use std::io::Write;
use std::path::{Path, PathBuf};

use grit_hash::{FanoutTable, ObjectId};
use grit_utils::tempfile::TempFile;
use memmap2::Mmap;
use sha1::{Digest, Sha1};

use crate::{PackError, IDX_SIGNATURE, IDX_VERSION};

/// One row of the index: id, pack offset, entry CRC-32.
pub type IndexEntry = (ObjectId, u64, u32);

/// Serialize a v2 pack index for the given entries.
///
/// Entries are sorted by id in place. Offsets ≥ 2^31 spill into the
/// extended 64-bit table.
pub fn index_bytes(entries: &mut [IndexEntry], pack_id: &ObjectId) -> Vec<u8> {
    entries.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));

    let mut buf = Vec::new();
    buf.extend_from_slice(&IDX_SIGNATURE);
    buf.extend_from_slice(&IDX_VERSION.to_be_bytes());

    let oids: Vec<ObjectId> = entries.iter().map(|e| e.0).collect();
    buf.extend_from_slice(&FanoutTable::build(&oids).to_bytes());

    for (oid, _, _) in entries.iter() {
        buf.extend_from_slice(oid.as_bytes());
    }
    for (_, _, crc) in entries.iter() {
        buf.extend_from_slice(&crc.to_be_bytes());
    }

    let mut large_offsets: Vec<u64> = Vec::new();
    for (_, offset, _) in entries.iter() {
        if *offset >= 0x8000_0000 {
            let ix = large_offsets.len() as u32;
            buf.extend_from_slice(&(0x8000_0000u32 | ix).to_be_bytes());
            large_offsets.push(*offset);
        } else {
            buf.extend_from_slice(&(*offset as u32).to_be_bytes());
        }
    }
    for offset in &large_offsets {
        buf.extend_from_slice(&offset.to_be_bytes());
    }

    buf.extend_from_slice(pack_id.as_bytes());

    let idx_checksum: [u8; 20] = Sha1::digest(&buf).into();
    buf.extend_from_slice(&idx_checksum);
    buf
}

/// Write a v2 pack index atomically: temp file in the target directory,
/// renamed into place only once fully written.
pub fn write_index(
    idx_path: &Path,
    entries: &mut [IndexEntry],
    pack_id: &ObjectId,
) -> Result<(), PackError> {
    let bytes = index_bytes(entries, pack_id);
    let mut tmp = TempFile::new_for(idx_path)?;
    tmp.write_all(&bytes)?;
    tmp.flush()?;
    tmp.persist(idx_path)?;
    Ok(())
}

/// Memory-mapped pack index (v2) providing id → offset lookup.
pub struct PackIndex {
    data: Mmap,
    num_objects: u32,
    oid_offset: usize,
    crc_offset: usize,
    offset32_offset: usize,
    offset64_offset: usize,
    idx_path: PathBuf,
}

impl PackIndex {
    /// Open and validate a pack index file.
    pub fn open(idx_path: impl AsRef<Path>) -> Result<Self, PackError> {
        let idx_path = idx_path.as_ref().to_path_buf();
        let file = std::fs::File::open(&idx_path)?;
        let data = unsafe { Mmap::map(&file)? };

        // Minimum size: header(8) + fanout(1024) + trailer(40).
        if data.len() < 8 + 1024 + 40 {
            return Err(PackError::InvalidIndex("file too small".into()));
        }
        if data[0..4] != IDX_SIGNATURE {
            return Err(PackError::InvalidIndex("bad signature".into()));
        }
        let version = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        if version != IDX_VERSION {
            return Err(PackError::InvalidIndex(format!(
                "unsupported version {version}, expected {IDX_VERSION}"
            )));
        }

        let fanout = FanoutTable::from_bytes(&data[8..8 + 1024])
            .map_err(|e| PackError::InvalidIndex(e.to_string()))?;
        let num_objects = fanout.total();

        let n = num_objects as usize;
        let oid_offset = 8 + 1024;
        let crc_offset = oid_offset + n * 20;
        let offset32_offset = crc_offset + n * 4;
        let offset64_offset = offset32_offset + n * 4;

        if data.len() < offset64_offset + 40 {
            return Err(PackError::InvalidIndex(format!(
                "file too small for {n} objects: {} bytes",
                data.len()
            )));
        }

        Ok(Self {
            data,
            num_objects,
            oid_offset,
            crc_offset,
            offset32_offset,
            offset64_offset,
            idx_path,
        })
    }

    /// Look up an id, returning its pack offset.
    pub fn lookup(&self, oid: &ObjectId) -> Option<u64> {
        let fanout = self.fanout_range(oid.first_byte());
        let target: &[u8] = oid.as_bytes();

        let mut low = fanout.start;
        let mut high = fanout.end;
        while low < high {
            let mid = low + (high - low) / 2;
            match self.oid_bytes_at(mid).cmp(target) {
                std::cmp::Ordering::Less => low = mid + 1,
                std::cmp::Ordering::Greater => high = mid,
                std::cmp::Ordering::Equal => return Some(self.offset_at(mid as u32)),
            }
        }
        None
    }

    /// The id at the given sorted position.
    pub fn oid_at(&self, ix: u32) -> ObjectId {
        let start = self.oid_offset + ix as usize * 20;
        ObjectId::from_bytes(&self.data[start..start + 20]).expect("valid id in index")
    }

    /// The pack offset at the given sorted position (64-bit aware).
    pub fn offset_at(&self, ix: u32) -> u64 {
        let val = self.read_u32(self.offset32_offset + ix as usize * 4);
        if val & 0x8000_0000 != 0 {
            let pos = self.offset64_offset + (val & 0x7FFF_FFFF) as usize * 8;
            u64::from_be_bytes([
                self.data[pos],
                self.data[pos + 1],
                self.data[pos + 2],
                self.data[pos + 3],
                self.data[pos + 4],
                self.data[pos + 5],
                self.data[pos + 6],
                self.data[pos + 7],
            ])
        } else {
            val as u64
        }
    }

    /// The entry CRC-32 at the given sorted position.
    pub fn crc32_at(&self, ix: u32) -> u32 {
        self.read_u32(self.crc_offset + ix as usize * 4)
    }

    pub fn num_objects(&self) -> u32 {
        self.num_objects
    }

    pub fn path(&self) -> &Path {
        &self.idx_path
    }

    /// Pack checksum stored in the trailer.
    pub fn pack_checksum(&self) -> ObjectId {
        let start = self.data.len() - 40;
        ObjectId::from_bytes(&self.data[start..start + 20]).expect("valid trailer")
    }

    /// The index file's own trailing checksum.
    pub fn index_checksum(&self) -> ObjectId {
        let start = self.data.len() - 20;
        ObjectId::from_bytes(&self.data[start..]).expect("valid trailer")
    }

    /// Iterate `(id, offset)` pairs in id order.
    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, u64)> + '_ {
        (0..self.num_objects).map(|ix| (self.oid_at(ix), self.offset_at(ix)))
    }

    fn fanout_range(&self, first_byte: u8) -> std::ops::Range<usize> {
        let end = self.read_u32(8 + first_byte as usize * 4) as usize;
        let start = if first_byte == 0 {
            0
        } else {
            self.read_u32(8 + (first_byte as usize - 1) * 4) as usize
        };
        start..end
    }

    fn oid_bytes_at(&self, ix: usize) -> &[u8] {
        let start = self.oid_offset + ix * 20;
        &self.data[start..start + 20]
    }

    fn read_u32(&self, pos: usize) -> u32 {
        u32::from_be_bytes([
            self.data[pos],
            self.data[pos + 1],
            self.data[pos + 2],
            self.data[pos + 3],
        ])
    }
}
