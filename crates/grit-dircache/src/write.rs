//! Index file (v2) writing.

use std::io::Write;
use std::path::Path;

use grit_utils::tempfile::TempFile;
use sha1::{Digest, Sha1};

use crate::read::{ondisk_entry_size, INDEX_SIGNATURE, INDEX_VERSION};
use crate::{DirCache, DirCacheError};

/// Serialize the dir-cache in index v2 format.
pub(crate) fn index_bytes(cache: &DirCache) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(INDEX_SIGNATURE);
    buf.extend_from_slice(&INDEX_VERSION.to_be_bytes());
    buf.extend_from_slice(&(cache.len() as u32).to_be_bytes());

    for e in cache.iter() {
        let start = buf.len();

        buf.extend_from_slice(&e.stat.ctime_secs.to_be_bytes());
        buf.extend_from_slice(&e.stat.ctime_nsecs.to_be_bytes());
        buf.extend_from_slice(&e.stat.mtime_secs.to_be_bytes());
        buf.extend_from_slice(&e.stat.mtime_nsecs.to_be_bytes());
        buf.extend_from_slice(&e.stat.dev.to_be_bytes());
        buf.extend_from_slice(&e.stat.ino.to_be_bytes());
        buf.extend_from_slice(&e.mode.raw().to_be_bytes());
        buf.extend_from_slice(&e.stat.uid.to_be_bytes());
        buf.extend_from_slice(&e.stat.gid.to_be_bytes());
        buf.extend_from_slice(&e.stat.size.to_be_bytes());
        buf.extend_from_slice(e.oid.as_bytes());

        // Flags: stage in bits 12-13, name length (capped) in the low 12.
        let name_len = e.path.len().min(0x0FFF) as u16;
        let flags = ((e.stage.as_u8() as u16) << 12) | name_len;
        buf.extend_from_slice(&flags.to_be_bytes());

        buf.extend_from_slice(&e.path);

        // NUL-pad to the next 8-byte boundary (at least one NUL).
        let target = start + ondisk_entry_size(e.path.len());
        buf.resize(target, 0);
    }

    let checksum: [u8; 20] = Sha1::digest(&buf).into();
    buf.extend_from_slice(&checksum);
    buf
}

/// Write the index file atomically: temp file beside the target, renamed
/// into place once complete.
pub(crate) fn write_index(cache: &DirCache, path: &Path) -> Result<(), DirCacheError> {
    let bytes = index_bytes(cache);
    let mut tmp = TempFile::new_for(path)?;
    tmp.write_all(&bytes)?;
    tmp.flush()?;
    tmp.persist(path)?;
    Ok(())
}
