use bstr::{BStr, BString};
use grit_hash::ObjectId;
use grit_object::{FileMode, ObjectType, Tree};
use grit_odb::ObjectReader;

use crate::iter::TreeIterator;
use crate::TreeWalkError;

/// Iterates one `tree` object in its stored (canonical) order.
pub struct CanonicalTreeIter {
    /// Full path and mode/id per entry, prefix applied.
    entries: Vec<(BString, FileMode, ObjectId)>,
    pos: usize,
}

impl CanonicalTreeIter {
    /// Open the given tree object as a walk root.
    pub fn new(reader: &dyn ObjectReader, tree: &ObjectId) -> Result<Self, TreeWalkError> {
        Self::with_prefix(reader, tree, BStr::new(b""))
    }

    fn with_prefix(
        reader: &dyn ObjectReader,
        tree: &ObjectId,
        prefix: &BStr,
    ) -> Result<Self, TreeWalkError> {
        let obj = reader.open(tree, Some(ObjectType::Tree))?;
        let parsed = Tree::parse(&obj.data)?;

        let entries = parsed
            .entries
            .into_iter()
            .map(|e| {
                let mut path = BString::from(prefix.as_ref() as &[u8]);
                path.extend_from_slice(&e.name);
                (path, e.mode, e.oid)
            })
            .collect();

        Ok(Self { entries, pos: 0 })
    }
}

impl TreeIterator for CanonicalTreeIter {
    fn eof(&self) -> bool {
        self.pos >= self.entries.len()
    }

    fn path(&self) -> &BStr {
        self.entries
            .get(self.pos)
            .map(|(p, _, _)| p.as_ref())
            .unwrap_or_else(|| BStr::new(b""))
    }

    fn mode(&self) -> FileMode {
        self.entries
            .get(self.pos)
            .map(|(_, m, _)| *m)
            .unwrap_or(FileMode::Missing)
    }

    fn oid(&self) -> ObjectId {
        self.entries
            .get(self.pos)
            .map(|(_, _, o)| *o)
            .unwrap_or(ObjectId::ZERO)
    }

    fn advance(&mut self) -> Result<(), TreeWalkError> {
        self.pos += 1;
        Ok(())
    }

    fn back(&mut self, n: usize) -> Result<(), TreeWalkError> {
        if n > self.pos {
            return Err(TreeWalkError::BackOutOfRange { n });
        }
        self.pos -= n;
        Ok(())
    }

    fn reset(&mut self) {
        self.pos = 0;
    }

    fn create_subtree_iterator(
        &self,
        reader: &dyn ObjectReader,
    ) -> Result<Box<dyn TreeIterator>, TreeWalkError> {
        let (path, mode, oid) = self
            .entries
            .get(self.pos)
            .ok_or(TreeWalkError::NotASubtree)?;
        if !mode.is_tree() {
            return Err(TreeWalkError::NotASubtree);
        }
        let mut prefix = path.clone();
        prefix.push(b'/');
        Ok(Box::new(Self::with_prefix(reader, oid, prefix.as_ref())?))
    }
}
