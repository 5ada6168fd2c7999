//! Index file (v2) reading.

use bstr::BString;
use grit_hash::ObjectId;
use grit_object::FileMode;
use sha1::{Digest, Sha1};

use crate::entry::{DirCacheEntry, Stage, StatData};
use crate::{DirCache, DirCacheError};

/// Magic bytes at the start of every index file.
pub(crate) const INDEX_SIGNATURE: &[u8; 4] = b"DIRC";
pub(crate) const INDEX_VERSION: u32 = 2;

/// Fixed-width stat prefix of the on-disk entry:
/// ctime(8) + mtime(8) + dev(4) + ino(4) + mode(4) + uid(4) + gid(4) + size(4).
const ONDISK_STAT_LEN: usize = 40;

/// On-disk entry size: the entry is padded with NULs to the next multiple
/// of 8 bytes, C git's layout.
pub(crate) fn ondisk_entry_size(name_len: usize) -> usize {
    (ONDISK_STAT_LEN + 20 + 2 + name_len + 8) & !7
}

/// Parse an index file from raw bytes.
pub(crate) fn parse_index(data: &[u8]) -> Result<DirCache, DirCacheError> {
    if data.len() < 12 + 20 {
        return Err(DirCacheError::InvalidHeader("index file too short".into()));
    }

    // Checksum first: the trailing 20 bytes hash everything before them.
    let content = &data[..data.len() - 20];
    let stored = &data[data.len() - 20..];
    let computed: [u8; 20] = Sha1::digest(content).into();
    if stored != computed {
        return Err(DirCacheError::ChecksumMismatch);
    }

    if &data[0..4] != INDEX_SIGNATURE {
        return Err(DirCacheError::InvalidHeader(format!(
            "bad signature: {:?}",
            &data[0..4]
        )));
    }
    let version = read_u32(&data[4..]);
    if version != INDEX_VERSION {
        return Err(DirCacheError::UnsupportedVersion(version));
    }
    let entry_count = read_u32(&data[8..]) as usize;

    let content_end = data.len() - 20;
    let mut cursor = 12;
    let mut entries = Vec::with_capacity(entry_count);

    for _ in 0..entry_count {
        let (entry, next) = parse_entry(data, cursor, content_end)?;
        entries.push(entry);
        cursor = next;
    }

    // Extensions are skipped; none are needed for iteration.

    // The reader trusts the writer's ordering only after checking it.
    for w in entries.windows(2) {
        if DirCacheEntry::cmp_key(&w[0], &w[1]) != std::cmp::Ordering::Less {
            return Err(DirCacheError::InvalidEntry {
                offset: 0,
                reason: format!("entries out of order near {:?}", w[1].path),
            });
        }
    }

    Ok(DirCache { entries })
}

fn parse_entry(
    data: &[u8],
    start: usize,
    content_end: usize,
) -> Result<(DirCacheEntry, usize), DirCacheError> {
    if start + ONDISK_STAT_LEN + 20 + 2 > content_end {
        return Err(DirCacheError::InvalidEntry {
            offset: start,
            reason: "entry too short".into(),
        });
    }

    let stat = StatData {
        ctime_secs: read_u32(&data[start..]),
        ctime_nsecs: read_u32(&data[start + 4..]),
        mtime_secs: read_u32(&data[start + 8..]),
        mtime_nsecs: read_u32(&data[start + 12..]),
        dev: read_u32(&data[start + 16..]),
        ino: read_u32(&data[start + 20..]),
        uid: read_u32(&data[start + 28..]),
        gid: read_u32(&data[start + 32..]),
        size: read_u32(&data[start + 36..]),
    };
    let mode_raw = read_u32(&data[start + 24..]);
    let mode = FileMode::from_raw(mode_raw).ok_or_else(|| DirCacheError::InvalidEntry {
        offset: start,
        reason: format!("invalid mode {mode_raw:o}"),
    })?;

    let mut cursor = start + ONDISK_STAT_LEN;
    let oid =
        ObjectId::from_bytes(&data[cursor..cursor + 20]).map_err(|_| DirCacheError::InvalidEntry {
            offset: start,
            reason: "invalid OID".into(),
        })?;
    cursor += 20;

    let flags = u16::from_be_bytes([data[cursor], data[cursor + 1]]);
    cursor += 2;
    let stage = Stage::from_u8(((flags >> 12) & 0x03) as u8)?;

    let nul_pos = data[cursor..content_end]
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| DirCacheError::InvalidEntry {
            offset: start,
            reason: "missing NUL in path".into(),
        })?;
    let path = BString::from(&data[cursor..cursor + nul_pos]);

    let next = start + ondisk_entry_size(nul_pos);
    if next > content_end {
        return Err(DirCacheError::InvalidEntry {
            offset: start,
            reason: "entry padding exceeds index bounds".into(),
        });
    }

    Ok((
        DirCacheEntry {
            path,
            oid,
            mode,
            stage,
            stat,
        },
        next,
    ))
}

fn read_u32(data: &[u8]) -> u32 {
    u32::from_be_bytes([data[0], data[1], data[2], data[3]])
}
