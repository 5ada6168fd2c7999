//! Dir-cache: the flat, sorted index of staged paths.
//!
//! A `DirCache` is an immutable, strictly ordered list of
//! `(path, stage) → (mode, id, stat)` entries. It is built through
//! `DirCacheBuilder` (entries in any order, validated on finish) or read
//! from an index file, and projected into a virtual tree by the walker's
//! dir-cache iterator.

pub mod entry;
mod read;
mod write;

use std::cmp::Ordering;
use std::path::Path;

use bstr::BStr;

pub use entry::{DirCacheEntry, Stage, StatData};

/// Errors produced by dir-cache operations.
#[derive(Debug, thiserror::Error)]
pub enum DirCacheError {
    #[error("duplicate dir-cache entry: {path} (stage {stage})")]
    DuplicateEntry { path: bstr::BString, stage: u8 },

    #[error("invalid index header: {0}")]
    InvalidHeader(String),

    #[error("unsupported index version: {0}")]
    UnsupportedVersion(u32),

    #[error("index checksum mismatch")]
    ChecksumMismatch,

    #[error("invalid index entry at offset {offset}: {reason}")]
    InvalidEntry { offset: usize, reason: String },

    #[error(transparent)]
    Hash(#[from] grit_hash::HashError),

    #[error(transparent)]
    Util(#[from] grit_utils::UtilError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The flat staged-tree index.
///
/// Entries are strictly increasing under the path-then-stage comparator;
/// the only way to obtain one is through the builder or the file reader,
/// so iteration can rely on the ordering invariant.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DirCache {
    entries: Vec<DirCacheEntry>,
}

impl DirCache {
    /// Start building a dir-cache from scratch.
    pub fn builder() -> DirCacheBuilder {
        DirCacheBuilder::default()
    }

    /// Read a dir-cache from an index file (v2).
    pub fn read_from(path: impl AsRef<Path>) -> Result<Self, DirCacheError> {
        let file = std::fs::File::open(path.as_ref())?;
        let data = unsafe { memmap2::Mmap::map(&file)? };
        read::parse_index(&data)
    }

    /// Write the dir-cache to an index file (v2), atomically.
    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<(), DirCacheError> {
        write::write_index(self, path.as_ref())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry at a flat position.
    pub fn entry(&self, ix: usize) -> &DirCacheEntry {
        &self.entries[ix]
    }

    /// All entries in flat order.
    pub fn entries(&self) -> &[DirCacheEntry] {
        &self.entries
    }

    /// Find an entry by path and stage.
    pub fn get(&self, path: &BStr, stage: Stage) -> Option<&DirCacheEntry> {
        self.entries
            .binary_search_by(|e| {
                e.path
                    .as_slice()
                    .cmp(path.as_ref())
                    .then(e.stage.cmp(&stage))
            })
            .ok()
            .map(|ix| &self.entries[ix])
    }

    pub fn iter(&self) -> impl Iterator<Item = &DirCacheEntry> {
        self.entries.iter()
    }

    fn from_sorted(entries: Vec<DirCacheEntry>) -> Self {
        debug_assert!(entries
            .windows(2)
            .all(|w| DirCacheEntry::cmp_key(&w[0], &w[1]) == Ordering::Less));
        Self { entries }
    }
}

/// Accumulates entries in any order; `finish` sorts and validates.
#[derive(Debug, Default)]
pub struct DirCacheBuilder {
    entries: Vec<DirCacheEntry>,
}

impl DirCacheBuilder {
    pub fn add(&mut self, entry: DirCacheEntry) -> &mut Self {
        self.entries.push(entry);
        self
    }

    /// Sort and validate: duplicate `(path, stage)` pairs are rejected.
    pub fn finish(mut self) -> Result<DirCache, DirCacheError> {
        self.entries.sort_by(DirCacheEntry::cmp_key);
        for w in self.entries.windows(2) {
            if DirCacheEntry::cmp_key(&w[0], &w[1]) == Ordering::Equal {
                return Err(DirCacheError::DuplicateEntry {
                    path: w[1].path.clone(),
                    stage: w[1].stage.as_u8(),
                });
            }
        }
        Ok(DirCache::from_sorted(self.entries))
    }
}
