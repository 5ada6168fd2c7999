use std::cell::RefCell;
use std::collections::HashMap;

use grit_hash::{Hasher, ObjectId, HEX_LEN};
use grit_object::ObjectType;

use crate::{ObjectData, ObjectInserter, ObjectReader, OdbError};

/// An in-memory object store.
///
/// Backs tests and thin-pack completion. Inserts stage into a pending map
/// until `flush` publishes them; readers only see published objects, so
/// the flush contract is exercised the same way a durable store would.
#[derive(Default)]
pub struct MemoryStore {
    published: RefCell<HashMap<ObjectId, (ObjectType, Vec<u8>)>>,
    pending: RefCell<HashMap<ObjectId, (ObjectType, Vec<u8>)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of published objects.
    pub fn len(&self) -> usize {
        self.published.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.published.borrow().is_empty()
    }

    /// All published ids, in unspecified order.
    pub fn ids(&self) -> Vec<ObjectId> {
        self.published.borrow().keys().copied().collect()
    }
}

impl ObjectReader for MemoryStore {
    fn open(&self, oid: &ObjectId, hint: Option<ObjectType>) -> Result<ObjectData, OdbError> {
        let published = self.published.borrow();
        let (kind, data) = published.get(oid).ok_or(OdbError::Missing(*oid))?;
        if let Some(expected) = hint {
            if *kind != expected {
                return Err(OdbError::IncorrectType {
                    oid: *oid,
                    expected,
                    actual: *kind,
                });
            }
        }
        Ok(ObjectData {
            kind: *kind,
            data: data.clone(),
        })
    }

    fn has(&self, oid: &ObjectId) -> Result<bool, OdbError> {
        Ok(self.published.borrow().contains_key(oid))
    }

    fn abbreviate(&self, oid: &ObjectId, min_len: usize) -> Result<String, OdbError> {
        let hex = oid.to_hex();
        let published = self.published.borrow();
        let mut len = min_len.clamp(1, HEX_LEN);
        while len < HEX_LEN {
            let prefix = &hex[..len];
            let ambiguous = published
                .keys()
                .any(|other| other != oid && other.starts_with_hex(prefix));
            if !ambiguous {
                return Ok(prefix.to_string());
            }
            len += 1;
        }
        Ok(hex)
    }
}

impl ObjectInserter for MemoryStore {
    fn insert(&self, kind: ObjectType, data: &[u8]) -> Result<ObjectId, OdbError> {
        let oid = Hasher::hash_object(kind.as_str(), data)?;
        if self.published.borrow().contains_key(&oid) {
            // Duplicate insert is a no-op.
            return Ok(oid);
        }
        self.pending
            .borrow_mut()
            .entry(oid)
            .or_insert_with(|| (kind, data.to_vec()));
        Ok(oid)
    }

    fn flush(&self) -> Result<(), OdbError> {
        let mut pending = self.pending.borrow_mut();
        self.published.borrow_mut().extend(pending.drain());
        Ok(())
    }
}
