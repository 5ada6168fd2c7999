use bstr::BStr;
use grit_hash::ObjectId;
use grit_object::FileMode;
use grit_odb::ObjectReader;

use crate::TreeWalkError;

/// One sorted tree source.
///
/// An iterator owns its cursor: it is positioned at its first entry on
/// creation and reports `eof` once past the last. Paths are full paths
/// from the walk root, so sibling sources at the same depth compare
/// directly.
pub trait TreeIterator {
    /// Past the last entry at this depth?
    fn eof(&self) -> bool;

    /// Full path bytes of the current entry.
    fn path(&self) -> &BStr;

    /// Mode of the current entry.
    fn mode(&self) -> FileMode;

    /// Object id of the current entry. Synthesized subtrees report the
    /// zero id.
    fn oid(&self) -> ObjectId;

    /// Step past the current entry at the current depth.
    fn advance(&mut self) -> Result<(), TreeWalkError>;

    /// Step back `n` entries at the current depth. Backward traversal
    /// yields exactly the reverse of the forward traversal.
    fn back(&mut self, n: usize) -> Result<(), TreeWalkError>;

    /// Return to the first entry.
    fn reset(&mut self);

    /// An iterator positioned at the first entry inside the current
    /// subtree. Only valid when the current mode is a tree.
    fn create_subtree_iterator(
        &self,
        reader: &dyn ObjectReader,
    ) -> Result<Box<dyn TreeIterator>, TreeWalkError>;
}

/// A source with no entries, standing in for sources that lack the
/// subtree being walked.
#[derive(Debug, Default)]
pub struct EmptyIter;

impl TreeIterator for EmptyIter {
    fn eof(&self) -> bool {
        true
    }

    fn path(&self) -> &BStr {
        BStr::new(b"")
    }

    fn mode(&self) -> FileMode {
        FileMode::Missing
    }

    fn oid(&self) -> ObjectId {
        ObjectId::ZERO
    }

    fn advance(&mut self) -> Result<(), TreeWalkError> {
        Ok(())
    }

    fn back(&mut self, n: usize) -> Result<(), TreeWalkError> {
        if n == 0 {
            Ok(())
        } else {
            Err(TreeWalkError::BackOutOfRange { n })
        }
    }

    fn reset(&mut self) {}

    fn create_subtree_iterator(
        &self,
        _reader: &dyn ObjectReader,
    ) -> Result<Box<dyn TreeIterator>, TreeWalkError> {
        Ok(Box::new(EmptyIter))
    }
}
