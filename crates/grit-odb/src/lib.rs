//! Object store seam for the grit git core.
//!
//! The pack parser, tree walker, and merge-base generator all talk to the
//! object store through the two traits defined here. Readers and inserters
//! are per-caller and single-threaded; obtain a fresh one per operation
//! rather than sharing across threads.

mod memory;

pub use memory::MemoryStore;

use grit_hash::ObjectId;
use grit_object::ObjectType;

/// Errors surfaced by object store access.
#[derive(Debug, thiserror::Error)]
pub enum OdbError {
    #[error("object not found: {0}")]
    Missing(ObjectId),

    #[error("object {oid} is a {actual}, expected {expected}")]
    IncorrectType {
        oid: ObjectId,
        expected: ObjectType,
        actual: ObjectType,
    },

    #[error("corrupt object {oid}: {reason}")]
    Corrupt { oid: ObjectId, reason: String },

    #[error(transparent)]
    Hash(#[from] grit_hash::HashError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A fully loaded object: its type and raw content bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectData {
    pub kind: ObjectType,
    pub data: Vec<u8>,
}

impl ObjectData {
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Read access to an object store.
///
/// Typed parsing is layered on top: callers `open` with a type hint and
/// hand the bytes to the `grit-object` parsers. Release is `Drop`.
pub trait ObjectReader {
    /// Load an object. With a type hint, a mismatching object fails with
    /// [`OdbError::IncorrectType`] instead of returning the wrong kind.
    fn open(&self, oid: &ObjectId, hint: Option<ObjectType>) -> Result<ObjectData, OdbError>;

    /// Does the store contain this object?
    fn has(&self, oid: &ObjectId) -> Result<bool, OdbError>;

    /// Shortest hex prefix of `oid`, at least `min_len` characters, that
    /// is unique among stored objects.
    fn abbreviate(&self, oid: &ObjectId, min_len: usize) -> Result<String, OdbError>;
}

/// Write access to an object store.
///
/// Inserts are durable only after `flush`. Inserting an object the store
/// already has is a no-op that still returns the id. Release is `Drop`.
pub trait ObjectInserter {
    /// Insert an object, returning its computed id.
    fn insert(&self, kind: ObjectType, data: &[u8]) -> Result<ObjectId, OdbError>;

    /// Durably publish all pending inserts.
    fn flush(&self) -> Result<(), OdbError>;
}
