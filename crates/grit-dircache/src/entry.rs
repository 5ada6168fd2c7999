//! Dir-cache entry types.

use std::cmp::Ordering;

use bstr::BString;
use grit_hash::ObjectId;
use grit_object::FileMode;

use crate::DirCacheError;

/// Merge stage of a dir-cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    /// Normal entry (stage 0).
    Normal,
    /// Base version in a merge conflict (stage 1).
    Base,
    /// Ours version in a merge conflict (stage 2).
    Ours,
    /// Theirs version in a merge conflict (stage 3).
    Theirs,
}

impl Stage {
    pub fn as_u8(&self) -> u8 {
        match self {
            Stage::Normal => 0,
            Stage::Base => 1,
            Stage::Ours => 2,
            Stage::Theirs => 3,
        }
    }

    pub fn from_u8(n: u8) -> Result<Self, DirCacheError> {
        match n {
            0 => Ok(Stage::Normal),
            1 => Ok(Stage::Base),
            2 => Ok(Stage::Ours),
            3 => Ok(Stage::Theirs),
            _ => Err(DirCacheError::InvalidEntry {
                offset: 0,
                reason: format!("invalid stage: {n}"),
            }),
        }
    }
}

/// File system stat data cached per entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatData {
    pub ctime_secs: u32,
    pub ctime_nsecs: u32,
    pub mtime_secs: u32,
    pub mtime_nsecs: u32,
    pub dev: u32,
    pub ino: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u32,
}

/// A single flat entry: one staged file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirCacheEntry {
    /// Path relative to the repository root, `/`-separated.
    pub path: BString,
    /// Object id of the staged blob.
    pub oid: ObjectId,
    /// File mode.
    pub mode: FileMode,
    /// Merge stage.
    pub stage: Stage,
    /// Cached stat data.
    pub stat: StatData,
}

impl DirCacheEntry {
    /// A stage-0 entry with empty stat data.
    pub fn new(path: impl Into<BString>, mode: FileMode, oid: ObjectId) -> Self {
        Self {
            path: path.into(),
            oid,
            mode,
            stage: Stage::Normal,
            stat: StatData::default(),
        }
    }

    /// Flat ordering: path bytes unsigned, then stage.
    pub fn cmp_key(a: &DirCacheEntry, b: &DirCacheEntry) -> Ordering {
        a.path.cmp(&b.path).then(a.stage.cmp(&b.stage))
    }
}
